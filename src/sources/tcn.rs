// 🌐 TCN Adapter - JSON API, one endpoint per card
//
// Payload: { "response": { "brand": [ { "brand_name": "..." } ] } }
// Endpoints are fetched in small concurrent groups with a pause between
// groups; the provider throttles (HTTP 403) when hit too fast.

use super::SourceAdapter;
use crate::config::TcnConfig;
use crate::error::{FetchError, RetryError};
use crate::model::{AdapterResult, Source, SyncRecord};
use crate::normalize::{collapse_whitespace, normalize_brand_name};
use crate::retry::{self, RetryPolicy};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

// ============================================================================
// ENDPOINT LIST
// ============================================================================

/// One card offered by TCN and the URL listing the retailers that accept it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcnEndpoint {
    pub name: String,
    pub url: String,
}

/// Read the endpoint list (`data/tcn.json`)
pub async fn load_endpoints(path: &Path) -> Result<Vec<TcnEndpoint>, FetchError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Clone)]
enum Endpoints {
    File(PathBuf),
    Inline(Vec<TcnEndpoint>),
}

// ============================================================================
// HTTP SEAM
// ============================================================================

/// Minimal GET capability so the adapter can be driven without a network
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and return the body of a 2xx response
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        if let Some(err) = FetchError::from_status(response.status().as_u16()) {
            return Err(err);
        }

        Ok(response.text().await?)
    }
}

// ============================================================================
// PAYLOAD
// ============================================================================

#[derive(Debug, Deserialize)]
struct TcnResponse {
    response: TcnBrandList,
}

#[derive(Debug, Deserialize)]
struct TcnBrandList {
    brand: Vec<TcnRetailer>,
}

#[derive(Debug, Deserialize)]
struct TcnRetailer {
    brand_name: String,
}

/// Parse a payload into normalized, de-duplicated retailer names
pub fn parse_retailers(body: &str) -> Result<Vec<String>, FetchError> {
    let payload: TcnResponse = serde_json::from_str(body)?;

    let mut seen = HashSet::new();
    let retailers = payload
        .response
        .brand
        .into_iter()
        .map(|r| normalize_brand_name(&r.brand_name))
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.clone()))
        .collect();

    Ok(retailers)
}

// ============================================================================
// ADAPTER
// ============================================================================

pub struct TcnAdapter<F: HttpFetch = ReqwestFetcher> {
    endpoints: Endpoints,
    fetcher: F,
    retry: RetryPolicy,
    group_size: usize,
    group_pause: Duration,
}

impl<F: HttpFetch> TcnAdapter<F> {
    /// Adapter over an in-memory endpoint list with default pacing
    pub fn new(endpoints: Vec<TcnEndpoint>, fetcher: F) -> Self {
        let defaults = TcnConfig::default();
        TcnAdapter {
            endpoints: Endpoints::Inline(endpoints),
            fetcher,
            retry: RetryPolicy::default(),
            group_size: defaults.group_size,
            group_pause: defaults.group_pause(),
        }
    }

    /// Adapter reading its endpoint list from the configured file on every run
    pub fn from_config(config: &TcnConfig, retry: RetryPolicy, fetcher: F) -> Self {
        TcnAdapter {
            endpoints: Endpoints::File(config.endpoints_path.clone()),
            fetcher,
            retry,
            group_size: config.group_size.max(1),
            group_pause: config.group_pause(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_groups(mut self, group_size: usize, group_pause: Duration) -> Self {
        self.group_size = group_size.max(1);
        self.group_pause = group_pause;
        self
    }

    async fn resolve_endpoints(&self) -> Result<Vec<TcnEndpoint>, (String, FetchError)> {
        match &self.endpoints {
            Endpoints::Inline(list) => Ok(list.clone()),
            Endpoints::File(path) => load_endpoints(path)
                .await
                .map_err(|e| (path.display().to_string(), e)),
        }
    }

    async fn fetch_endpoint(&self, endpoint: &TcnEndpoint) -> Result<Vec<String>, RetryError> {
        let label = format!("tcn/{}", endpoint.name);
        let fetcher = &self.fetcher;
        let url = endpoint.url.as_str();

        retry::attempt(&self.retry, &label, move |_| async move {
            let body = fetcher.get_text(url).await?;
            parse_retailers(&body)
        })
        .await
    }
}

#[async_trait]
impl<F: HttpFetch> SourceAdapter for TcnAdapter<F> {
    fn source(&self) -> Source {
        Source::Tcn
    }

    async fn fetch(&self) -> AdapterResult {
        let started = Instant::now();

        let endpoints = match self.resolve_endpoints().await {
            Ok(endpoints) => endpoints,
            Err((unit, err)) => {
                error!(source = "tcn", unit = %unit, error = %err, "cannot load endpoint list");
                return AdapterResult::failed(Source::Tcn, unit, err.to_string());
            }
        };

        if endpoints.is_empty() {
            // A sweep over nothing would retire every stored TCN link
            warn!(source = "tcn", "endpoint list is empty; treating TCN as failed");
            return AdapterResult::failed(
                Source::Tcn,
                "endpoint list",
                "no TCN endpoints configured",
            );
        }

        let mut result = AdapterResult::new(Source::Tcn);
        let groups: Vec<&[TcnEndpoint]> = endpoints.chunks(self.group_size).collect();
        info!(
            source = "tcn",
            endpoints = endpoints.len(),
            groups = groups.len(),
            "fetching TCN data"
        );

        for (index, group) in groups.iter().enumerate() {
            info!(
                source = "tcn",
                group = index + 1,
                total = groups.len(),
                size = group.len(),
                "processing group"
            );

            let outcomes = join_all(group.iter().map(|ep| self.fetch_endpoint(ep))).await;

            for (endpoint, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok(retailers) => {
                        let card = Source::Tcn.card_name(&collapse_whitespace(&endpoint.name));
                        info!(source = "tcn", card = %card, retailers = retailers.len(), "fetched");

                        result.data.cards.insert(card.clone());
                        for retailer in retailers {
                            result.data.push(SyncRecord::new(retailer, card.clone(), Source::Tcn));
                        }
                        result.confirmed_cards.insert(card);
                    }
                    Err(err) => {
                        error!(
                            source = "tcn",
                            unit = %endpoint.name,
                            attempts = err.attempts(),
                            error = %err,
                            "endpoint skipped"
                        );
                        result.record_failure(
                            endpoint.name.clone(),
                            err.attempts(),
                            err.to_string(),
                        );
                    }
                }
            }

            if index + 1 < groups.len() {
                info!(
                    source = "tcn",
                    pause_ms = self.group_pause.as_millis() as u64,
                    "pausing before next group"
                );
                tokio::time::sleep(self.group_pause).await;
            }
        }

        info!(
            source = "tcn",
            summary = %result.data.summary(),
            failed = result.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "TCN fetch finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::io::Write;
    use std::sync::Mutex;

    /// Scripted replies per URL; the last reply repeats once the script runs out
    #[derive(Clone)]
    enum Reply {
        Body(&'static str),
        Status(u16),
    }

    #[derive(Default)]
    struct FakeFetcher {
        scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl FakeFetcher {
        fn reply(self, url: &str, replies: Vec<Reply>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), replies.into());
            self
        }

        fn calls(&self, url: &str) -> u32 {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl HttpFetch for FakeFetcher {
        async fn get_text(&self, url: &str) -> Result<String, FetchError> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

            let reply = {
                let mut scripts = self.scripts.lock().unwrap();
                let script = scripts.get_mut(url).expect("unscripted url");
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap()
                }
            };

            match reply {
                Reply::Body(body) => Ok(body.to_string()),
                Reply::Status(status) => Err(FetchError::from_status(status).unwrap()),
            }
        }
    }

    fn endpoint(name: &str, url: &str) -> TcnEndpoint {
        TcnEndpoint {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    const ACME_BODY: &str =
        r#"{"response":{"brand":[{"brand_name":"store x"},{"brand_name":"STORE Y"}]}}"#;

    #[test]
    fn test_parse_retailers_normalizes_and_dedupes() {
        let body = r#"{"response":{"brand":[
            {"brand_name":"store x"},
            {"brand_name":"  STORE   x "},
            {"brand_name":""},
            {"brand_name":"the body shop"}
        ]}}"#;

        let retailers = parse_retailers(body).unwrap();
        assert_eq!(retailers, vec!["Store X", "The Body Shop"]);
    }

    #[test]
    fn test_parse_retailers_rejects_wrong_shape() {
        assert!(matches!(
            parse_retailers(r#"{"response":{}}"#),
            Err(FetchError::Parse(_))
        ));
        assert!(matches!(parse_retailers("<html>"), Err(FetchError::Parse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_acme_example() {
        let fetcher = FakeFetcher::default().reply("http://tcn/acme", vec![Reply::Body(ACME_BODY)]);
        let adapter = TcnAdapter::new(vec![endpoint("Acme", "http://tcn/acme")], fetcher);

        let result = adapter.fetch().await;

        assert!(result.is_complete());
        assert_eq!(
            result.data.brands.iter().cloned().collect::<Vec<_>>(),
            vec!["Store X", "Store Y"]
        );
        assert_eq!(
            result.data.cards.iter().cloned().collect::<Vec<_>>(),
            vec!["Acme (TCN)"]
        );
        assert_eq!(result.data.records.len(), 2);
        assert!(result.data.records.iter().all(|r| r.source == Source::Tcn));
        assert!(result.confirmed_cards.contains("Acme (TCN)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_endpoint_is_retried_then_skipped() {
        let fetcher = FakeFetcher::default()
            .reply("http://tcn/acme", vec![Reply::Body(ACME_BODY)])
            .reply("http://tcn/blocked", vec![Reply::Status(403)]);
        let adapter = TcnAdapter::new(
            vec![
                endpoint("Acme", "http://tcn/acme"),
                endpoint("Blocked", "http://tcn/blocked"),
            ],
            fetcher,
        );

        let result = adapter.fetch().await;

        assert!(!result.is_complete());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].unit, "Blocked");
        assert_eq!(result.failures[0].attempts, 3);
        assert_eq!(adapter.fetcher.calls("http://tcn/blocked"), 3);

        // Partial data is still returned
        assert_eq!(result.data.records.len(), 2);
        assert!(!result.data.cards.contains("Blocked (TCN)"));
        assert!(!result.confirmed_cards.contains("Blocked (TCN)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_throttling() {
        let fetcher = FakeFetcher::default().reply(
            "http://tcn/acme",
            vec![Reply::Status(403), Reply::Status(503), Reply::Body(ACME_BODY)],
        );
        let adapter = TcnAdapter::new(vec![endpoint("Acme", "http://tcn/acme")], fetcher);

        let result = adapter.fetch().await;

        assert!(result.is_complete());
        assert_eq!(adapter.fetcher.calls("http://tcn/acme"), 3);
        assert_eq!(result.data.records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_payload_is_not_retried() {
        let fetcher =
            FakeFetcher::default().reply("http://tcn/bad", vec![Reply::Body("{not json")]);
        let adapter = TcnAdapter::new(vec![endpoint("Bad", "http://tcn/bad")], fetcher);

        let result = adapter.fetch().await;

        assert_eq!(adapter.fetcher.calls("http://tcn/bad"), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].attempts, 1);
        assert!(result.data.records.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_are_paced() {
        let urls = ["http://tcn/1", "http://tcn/2", "http://tcn/3", "http://tcn/4"];
        let mut fetcher = FakeFetcher::default();
        for url in urls {
            fetcher = fetcher.reply(url, vec![Reply::Body(r#"{"response":{"brand":[]}}"#)]);
        }
        let endpoints = urls
            .iter()
            .enumerate()
            .map(|(i, url)| endpoint(&format!("Card {}", i), url))
            .collect();
        let adapter = TcnAdapter::new(endpoints, fetcher).with_groups(3, Duration::from_secs(2));

        let started = Instant::now();
        let result = adapter.fetch().await;
        let elapsed = started.elapsed();

        // Two groups, one pause between them, none after the last
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(4));
        assert!(result.is_complete());
        assert_eq!(result.data.cards.len(), 4);
        assert!(result.data.records.is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoint_file_fails_whole_source() {
        let config = TcnConfig {
            endpoints_path: PathBuf::from("/nonexistent/tcn.json"),
            ..TcnConfig::default()
        };
        let adapter =
            TcnAdapter::from_config(&config, RetryPolicy::default(), FakeFetcher::default());

        let result = adapter.fetch().await;

        assert!(!result.is_complete());
        assert!(result.data.records.is_empty());
    }

    #[tokio::test]
    async fn test_empty_endpoint_list_fails_whole_source() {
        let adapter = TcnAdapter::new(vec![], FakeFetcher::default());

        let result = adapter.fetch().await;

        assert!(!result.is_complete());
        assert!(result.data.records.is_empty());

        // Nothing from TCN may be swept on such a run
        let merged = crate::merge::merge(&[result]);
        assert!(!merged.sweep_scope.sources.contains(&Source::Tcn));
        assert!(merged.sweep_scope.cards.is_empty());
    }

    #[tokio::test]
    async fn test_empty_endpoint_file_fails_whole_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        let config = TcnConfig {
            endpoints_path: file.path().to_path_buf(),
            ..TcnConfig::default()
        };
        let adapter =
            TcnAdapter::from_config(&config, RetryPolicy::default(), FakeFetcher::default());

        assert!(!adapter.fetch().await.is_complete());
    }

    #[tokio::test]
    async fn test_load_endpoints_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name":"Acme","url":"http://tcn/acme"}}]"#).unwrap();

        let endpoints = load_endpoints(file.path()).await.unwrap();
        assert_eq!(endpoints, vec![endpoint("Acme", "http://tcn/acme")]);
    }
}
