// 📜 Logging
//
// Filter precedence: GIFTCARD_SYNC_LOG, then RUST_LOG, then the config
// filter, then "info".

use crate::config::LoggingConfig;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;

pub const LOG_ENV: &str = "GIFTCARD_SYNC_LOG";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Resolve the filter directive from env and config
pub fn resolve_filter<F>(config: &LoggingConfig, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_ENV)
        .or_else(|| lookup("RUST_LOG"))
        .or_else(|| config.filter.clone())
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Install the global subscriber. Safe to call once per process.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let directive = resolve_filter(config, |key| std::env::var(key).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive {:?} ({}); defaulting to info", directive, err);
        EnvFilter::new("info")
    });

    let builder = fmt().with_env_filter(filter).with_target(false);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        let config = LoggingConfig {
            format: LogFormat::Pretty,
            filter: Some("warn".to_string()),
        };

        let both = |key: &str| match key {
            LOG_ENV => Some("debug".to_string()),
            "RUST_LOG" => Some("trace".to_string()),
            _ => None,
        };
        assert_eq!(resolve_filter(&config, both), "debug");

        let rust_log_only = |key: &str| (key == "RUST_LOG").then(|| "trace".to_string());
        assert_eq!(resolve_filter(&config, rust_log_only), "trace");

        assert_eq!(resolve_filter(&config, |_| None), "warn");
        assert_eq!(resolve_filter(&LoggingConfig::default(), |_| None), "info");
    }
}
