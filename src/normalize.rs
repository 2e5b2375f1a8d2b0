// 🔤 Name Normalization
//
// Every adapter runs brand names through `normalize_brand_name` so that the
// same retailer reported by two providers collapses into one brand identity.

/// Trim and collapse internal runs of whitespace into single spaces
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case every whitespace-delimited token.
///
/// Within a token, leading non-word characters are kept as-is, the first word
/// character is upper-cased and the rest of the token is lower-cased:
/// "STORE y" -> "Store Y", "(the) shop" -> "(The) Shop", "o'NEIL" -> "O'neil".
pub fn title_case(input: &str) -> String {
    collapse_whitespace(input)
        .split(' ')
        .map(title_case_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_token(token: &str) -> String {
    let Some(start) = token.find(is_word_char) else {
        return token.to_string();
    };

    let (prefix, word) = token.split_at(start);
    let mut chars = word.chars();
    let mut out = String::with_capacity(token.len());
    out.push_str(prefix);
    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
    }
    out.push_str(&chars.as_str().to_lowercase());
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Canonical brand identity used by all adapters
pub fn normalize_brand_name(raw: &str) -> String {
    title_case(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Store \t  X \n"), "Store X");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_title_case_basic() {
        assert_eq!(title_case("store x"), "Store X");
        assert_eq!(title_case("STORE Y"), "Store Y");
        assert_eq!(title_case("jb hi-fi"), "Jb Hi-fi");
    }

    #[test]
    fn test_title_case_keeps_leading_punctuation() {
        assert_eq!(title_case("(the) shop"), "(The) Shop");
        assert_eq!(title_case("o'NEIL & sons"), "O'neil & Sons");
        assert_eq!(title_case("7-ELEVEN"), "7-eleven");
    }

    #[test]
    fn test_normalization_collapses_providers() {
        // Same retailer written two ways by two providers
        assert_eq!(
            normalize_brand_name("  THE  body shop "),
            normalize_brand_name("The Body Shop")
        );
    }
}
