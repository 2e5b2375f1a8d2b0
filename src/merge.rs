// 🔀 Merge Stage - fold adapter results into one dataset
//
// Brands and cards are set-unions, records are concatenated. Card names carry
// the provider tag, so records from different providers never share a key.

use crate::model::{AdapterResult, SweepScope, SyncData};
use tracing::{debug, warn};

/// Merge every adapter result, full or partial, into one `SyncData`.
///
/// The sweep scope covers every source that fetched completely. A source that
/// failed only contributes the cards it still confirmed in full.
pub fn merge(results: &[AdapterResult]) -> SyncData {
    let mut merged = SyncData {
        sweep_scope: SweepScope::default(),
        ..SyncData::default()
    };

    for result in results {
        merged.brands.extend(result.data.brands.iter().cloned());
        merged.cards.extend(result.data.cards.iter().cloned());
        merged.records.extend(result.data.records.iter().cloned());

        if result.is_complete() {
            merged.sweep_scope.sources.insert(result.source);
        } else {
            warn!(
                source = %result.source,
                failures = result.failures.len(),
                confirmed_cards = result.confirmed_cards.len(),
                "source incomplete; sweeping confirmed cards only"
            );
            merged
                .sweep_scope
                .cards
                .extend(result.confirmed_cards.iter().cloned());
        }

        debug!(source = %result.source, summary = %result.data.summary(), "merged adapter output");
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Source, SyncRecord};

    fn tcn_result() -> AdapterResult {
        let mut result = AdapterResult::new(Source::Tcn);
        result.data.push(SyncRecord::new("Store X", "Acme (TCN)", Source::Tcn));
        result.data.push(SyncRecord::new("Store Y", "Acme (TCN)", Source::Tcn));
        result.confirmed_cards.insert("Acme (TCN)".to_string());
        result
    }

    fn ultimate_result() -> AdapterResult {
        let mut result = AdapterResult::new(Source::Ultimate);
        result.data.push(SyncRecord::new("Store X", "Her (Ultimate)", Source::Ultimate));
        result.data.brands.insert("No Cards Brand".to_string());
        result
    }

    #[test]
    fn test_unions_and_concatenates() {
        let merged = merge(&[tcn_result(), ultimate_result()]);

        assert_eq!(
            merged.brands.iter().cloned().collect::<Vec<_>>(),
            vec!["No Cards Brand", "Store X", "Store Y"]
        );
        assert_eq!(merged.cards.len(), 2);
        assert_eq!(merged.records.len(), 3);
        assert_eq!(merged.sweep_scope, SweepScope::everything());
    }

    #[test]
    fn test_failed_source_narrows_sweep_scope() {
        let mut tcn = tcn_result();
        tcn.record_failure("Other Card", 3, "gave up after 3 attempts");

        let merged = merge(&[tcn, ultimate_result()]);

        // Partial data is still merged
        assert_eq!(merged.records.len(), 3);
        assert!(merged.sweep_scope.sources.contains(&Source::Ultimate));
        assert!(!merged.sweep_scope.sources.contains(&Source::Tcn));
        assert!(merged.sweep_scope.cards.contains("Acme (TCN)"));
    }

    #[test]
    fn test_total_failure_sweeps_nothing_for_that_source() {
        let failed = AdapterResult::failed(Source::Ultimate, "catalog.html", "not found");

        let merged = merge(&[failed]);

        assert!(merged.records.is_empty());
        assert!(merged.sweep_scope.is_empty());
    }

    #[test]
    fn test_no_results() {
        let merged = merge(&[]);
        assert!(merged.brands.is_empty());
        assert!(merged.sweep_scope.is_empty());
    }
}
