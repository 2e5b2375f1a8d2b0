// 🛍️ Ultimate Adapter - static HTML catalog page
//
// Each brand is an element carrying the `blockContent_brands--item` class, a
// `data-title` attribute, and one class token per card it accepts:
//
//   <div class="col-12 blockContent_brands--item her active" data-title="Acme">

use super::SourceAdapter;
use crate::model::{AdapterResult, Source, SyncData, SyncRecord};
use crate::normalize::normalize_brand_name;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Class marking one brand element
pub const ITEM_CLASS: &str = "blockContent_brands--item";

/// Layout tokens that sit next to card tokens and mean nothing here
pub const STRUCTURAL_TOKENS: [&str; 6] = [
    "col-12",
    ITEM_CLASS,
    "has-overlay",
    "in-store",
    "online",
    "exchange-card",
];

// ============================================================================
// CARD DICTIONARY (closed)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UltimateCard {
    Birthday,
    ThankYou,
    Celebrate,
    JustForYou,
    Everyone,
    Him,
    Her,
    Home,
    Kids,
    Teens,
    Students,
    BabyMum,
    Shopping,
    ActiveWellness,
    Eats,
    GamingBites,
    BeautySpa,
    Thanks,
}

impl UltimateCard {
    pub const ALL: [UltimateCard; 18] = [
        UltimateCard::Birthday,
        UltimateCard::ThankYou,
        UltimateCard::Celebrate,
        UltimateCard::JustForYou,
        UltimateCard::Everyone,
        UltimateCard::Him,
        UltimateCard::Her,
        UltimateCard::Home,
        UltimateCard::Kids,
        UltimateCard::Teens,
        UltimateCard::Students,
        UltimateCard::BabyMum,
        UltimateCard::Shopping,
        UltimateCard::ActiveWellness,
        UltimateCard::Eats,
        UltimateCard::GamingBites,
        UltimateCard::BeautySpa,
        UltimateCard::Thanks,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            UltimateCard::Birthday => "Birthday",
            UltimateCard::ThankYou => "Thank You",
            UltimateCard::Celebrate => "Celebrate",
            UltimateCard::JustForYou => "Just For You",
            UltimateCard::Everyone => "Everyone",
            UltimateCard::Him => "Him",
            UltimateCard::Her => "Her",
            UltimateCard::Home => "Home",
            UltimateCard::Kids => "Kids",
            UltimateCard::Teens => "Teens",
            UltimateCard::Students => "Students",
            UltimateCard::BabyMum => "Baby & Mum",
            UltimateCard::Shopping => "Shopping",
            UltimateCard::ActiveWellness => "Active & Wellness",
            UltimateCard::Eats => "Eats",
            UltimateCard::GamingBites => "Gaming & Bites",
            UltimateCard::BeautySpa => "Beauty & Spa",
            UltimateCard::Thanks => "Thanks",
        }
    }

    /// Class tokens the catalog uses for this card
    pub fn tokens(&self) -> &'static [&'static str] {
        match self {
            UltimateCard::Birthday => &["birthday"],
            UltimateCard::ThankYou => &["thank-you"],
            UltimateCard::Celebrate => &["celebrate"],
            UltimateCard::JustForYou => &["just-for-you"],
            UltimateCard::Everyone => &["everyone"],
            UltimateCard::Him => &["him"],
            UltimateCard::Her => &["her"],
            UltimateCard::Home => &["home"],
            UltimateCard::Kids => &["kids"],
            UltimateCard::Teens => &["teens"],
            UltimateCard::Students => &["students"],
            UltimateCard::BabyMum => &["baby-mum"],
            UltimateCard::Shopping => &["shopping"],
            // the live page has used both spellings
            UltimateCard::ActiveWellness => &["active-wellness", "active"],
            UltimateCard::Eats => &["eats"],
            UltimateCard::GamingBites => &["gaming-bites"],
            UltimateCard::BeautySpa => &["beauty-spa"],
            UltimateCard::Thanks => &["thanks"],
        }
    }

    /// Stored card name, e.g. "Her (Ultimate)"
    pub fn card_name(&self) -> String {
        Source::Ultimate.card_name(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardToken {
    Structural,
    Card(UltimateCard),
    /// Not a card we know; ignored
    Unknown,
}

/// Total classification of a class token
pub fn classify_token(token: &str) -> CardToken {
    if STRUCTURAL_TOKENS.contains(&token) {
        return CardToken::Structural;
    }

    UltimateCard::ALL
        .into_iter()
        .find(|card| card.tokens().contains(&token))
        .map(CardToken::Card)
        .unwrap_or(CardToken::Unknown)
}

// ============================================================================
// HTML PARSING
// ============================================================================

const ITEM_SELECTOR: &str = ".blockContent_brands--item";

/// `<template>` content is inert markup, never part of the live catalog
fn inside_template(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|ancestor| ancestor.name() == "template")
}

/// What one scan of the catalog produced
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub data: SyncData,
    /// Brand elements found (with or without a title)
    pub elements: usize,
    /// Brand elements skipped for lack of a `data-title`
    pub untitled: usize,
    pub unknown_tokens: BTreeSet<String>,
}

/// Extract brands, cards and links from the catalog markup.
///
/// Comments and raw-text elements (`<script>`, `<style>`) never produce
/// elements, so only markup a browser would render is read.
pub fn parse_catalog(html: &str) -> Catalog {
    let mut catalog = Catalog::default();
    // an unparsable selector yields zero elements, which the adapter reports
    let Ok(selector) = Selector::parse(ITEM_SELECTOR) else {
        return catalog;
    };
    let document = Html::parse_document(html);

    for element in document.select(&selector) {
        if inside_template(&element) {
            continue;
        }
        catalog.elements += 1;

        // attribute values arrive with entities already decoded
        let brand = element
            .value()
            .attr("data-title")
            .map(normalize_brand_name)
            .unwrap_or_default();
        if brand.is_empty() {
            catalog.untitled += 1;
            continue;
        }

        let classes = element.value().attr("class").unwrap_or("");
        let mut cards = BTreeSet::new();
        for token in classes.split_whitespace() {
            match classify_token(token) {
                CardToken::Card(card) => {
                    cards.insert(card);
                }
                CardToken::Unknown => {
                    catalog.unknown_tokens.insert(token.to_string());
                }
                CardToken::Structural => {}
            }
        }

        catalog.data.brands.insert(brand.clone());
        for card in cards {
            catalog
                .data
                .push(SyncRecord::new(brand.clone(), card.card_name(), Source::Ultimate));
        }
    }

    catalog
}

// ============================================================================
// ADAPTER
// ============================================================================

pub struct UltimateAdapter {
    html_path: PathBuf,
}

impl UltimateAdapter {
    pub fn new(html_path: PathBuf) -> Self {
        UltimateAdapter { html_path }
    }
}

#[async_trait]
impl SourceAdapter for UltimateAdapter {
    fn source(&self) -> Source {
        Source::Ultimate
    }

    async fn fetch(&self) -> AdapterResult {
        let unit = self.html_path.display().to_string();
        info!(source = "ultimate", path = %unit, "reading Ultimate catalog");

        let html = match tokio::fs::read_to_string(&self.html_path).await {
            Ok(html) => html,
            Err(err) => {
                error!(source = "ultimate", path = %unit, error = %err, "cannot read catalog");
                return AdapterResult::failed(Source::Ultimate, unit, err.to_string());
            }
        };

        let catalog = parse_catalog(&html);
        info!(
            source = "ultimate",
            elements = catalog.elements,
            untitled = catalog.untitled,
            summary = %catalog.data.summary(),
            "catalog parsed"
        );
        if !catalog.unknown_tokens.is_empty() {
            debug!(
                source = "ultimate",
                tokens = ?catalog.unknown_tokens,
                "ignored unknown class tokens"
            );
        }

        if catalog.elements == 0 {
            warn!(
                source = "ultimate",
                path = %unit,
                "no brand elements found; page layout changed?"
            );
            return AdapterResult::failed(Source::Ultimate, unit, "no brand elements found");
        }

        let mut result = AdapterResult::new(Source::Ultimate);
        result.confirmed_cards = catalog.data.cards.clone();
        result.data = catalog.data;
        result
    }
}
