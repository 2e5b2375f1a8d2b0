// 🏗️ Source Adapters
// One polymorphic capability, one concrete adapter per provider.
//
// Adding a provider:
// - Add a `Source` variant and implement `SourceAdapter` for it
// - Register it in `build_adapters`
// The merge stage and orchestrator never change.

pub mod tcn;
pub mod ultimate;

use crate::config::SyncConfig;
use crate::model::{AdapterResult, Source};
use anyhow::Result;
use async_trait::async_trait;

pub use tcn::{load_endpoints, HttpFetch, ReqwestFetcher, TcnAdapter, TcnEndpoint};
pub use ultimate::{classify_token, parse_catalog, CardToken, UltimateAdapter, UltimateCard};

/// SourceAdapter - pulls one provider and emits normalized records
///
/// `fetch` never returns an error: every failure is folded into the
/// `AdapterResult` so the run can continue with the other providers.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which provider this adapter reads
    fn source(&self) -> Source;

    /// Pull the provider's current data
    async fn fetch(&self) -> AdapterResult;
}

/// Build the adapters for every configured provider
pub fn build_adapters(config: &SyncConfig) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let fetcher = ReqwestFetcher::new(&config.tcn.user_agent, config.tcn.request_timeout())?;

    Ok(vec![
        Box::new(TcnAdapter::from_config(&config.tcn, config.retry.clone(), fetcher)),
        Box::new(UltimateAdapter::new(config.ultimate.html_path.clone())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_adapters_covers_every_source() {
        let adapters = build_adapters(&SyncConfig::default()).unwrap();
        let sources: Vec<Source> = adapters.iter().map(|a| a.source()).collect();

        assert_eq!(sources, Source::ALL.to_vec());
    }
}
