// ⚙️ Configuration
//
// Every field has a default, so an empty (or missing) TOML file is valid.
// Environment variables override the file for deploy-time secrets and paths.

use crate::logging::LogFormat;
use crate::retry::RetryPolicy;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "giftcard-sync.toml";

pub const ENV_DATABASE: &str = "GIFTCARD_SYNC_DB";
pub const ENV_SECRET: &str = "CRON_SECRET";
pub const ENV_BIND: &str = "GIFTCARD_SYNC_BIND";

/// Browser-like agent; the TCN API rejects obvious bots
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    /// Bearer token required by the webhook trigger
    pub webhook_secret: Option<String>,
    pub tcn: TcnConfig,
    pub ultimate: UltimateConfig,
    pub retry: RetryPolicy,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            database_path: PathBuf::from("local.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            webhook_secret: None,
            tcn: TcnConfig::default(),
            ultimate: UltimateConfig::default(),
            retry: RetryPolicy::default(),
            reconcile: ReconcileConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcnConfig {
    /// JSON list of `{ "name": ..., "url": ... }`
    pub endpoints_path: PathBuf,
    /// Endpoints fetched concurrently per group
    pub group_size: usize,
    /// Pause between groups
    pub group_pause_ms: u64,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for TcnConfig {
    fn default() -> Self {
        TcnConfig {
            endpoints_path: PathBuf::from("data/tcn.json"),
            group_size: 3,
            group_pause_ms: 2_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl TcnConfig {
    pub fn group_pause(&self) -> Duration {
        Duration::from_millis(self.group_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UltimateConfig {
    pub html_path: PathBuf,
}

impl Default for UltimateConfig {
    fn default() -> Self {
        UltimateConfig {
            html_path: PathBuf::from("data/ultimate/all-retailers.html"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Rows per write statement
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig { batch_size: 50 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// EnvFilter directive used when no env var is set
    pub filter: Option<String>,
}

impl SyncConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `giftcard-sync.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    SyncConfig::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(secret) = lookup(ENV_SECRET).filter(|v| !v.trim().is_empty()) {
            self.webhook_secret = Some(secret);
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.bind_addr = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tcn.group_size == 0 {
            bail!("tcn.group_size must be at least 1");
        }
        if self.reconcile.batch_size == 0 {
            bail!("reconcile.batch_size must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_provider_limits() {
        let config = SyncConfig::default();

        assert_eq!(config.tcn.group_size, 3);
        assert_eq!(config.tcn.group_pause(), Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.reconcile.batch_size, 50);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            database_path = "/tmp/brands.db"

            [tcn]
            group_size = 5

            [retry]
            max_attempts = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/brands.db"));
        assert_eq!(config.tcn.group_size, 5);
        assert_eq!(config.tcn.group_pause_ms, 2_000);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.reconcile.batch_size, 50);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE, "/data/prod.db"),
            (ENV_SECRET, "s3cret"),
            (ENV_BIND, ""),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/data/prod.db"));
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        // Empty values are ignored
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = SyncConfig::default();
        config.reconcile.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.tcn.group_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ultimate]\nhtml_path = \"catalog.html\"").unwrap();

        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ultimate.html_path, PathBuf::from("catalog.html"));

        assert!(SyncConfig::from_file(Path::new("/nonexistent/config.toml")).is_err());
    }
}
