use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::SnapshotDate;
use crate::error::IngestError;
use crate::feed::{Pagination, RetryPolicy};
use crate::normalize::NormalizeOptions;
use crate::persist::{PersistOptions, default_workers};
use crate::sqlite::{DEFAULT_TABLE, validate_table_name};

pub const DEFAULT_CONFIG_FILE: &str = "ratings-ingest.json";
pub const DEFAULT_TOKEN_ENV: &str = "RATINGS_API_TOKEN";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub snapshot_date: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default)]
    pub paginate: Option<bool>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub log_interval: Option<usize>,
    #[serde(default)]
    pub enrich_reasons: Option<bool>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub alert_webhook: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub endpoint: String,
    pub snapshot_date: Option<SnapshotDate>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub paginate: bool,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub feed: FeedSettings,
    pub persist: PersistOptions,
    pub normalize: NormalizeOptions,
    pub database: Utf8PathBuf,
    pub table: String,
    pub alert_webhook: Option<String>,
}

impl ResolvedConfig {
    /// Endpoint and token are only needed when talking to the feed.
    pub fn require_network(&self) -> Result<(&str, &str), IngestError> {
        if self.feed.endpoint.is_empty() {
            return Err(IngestError::InvalidConfig(
                "endpoint is required to fetch the feed".to_string(),
            ));
        }
        let token = self.feed.token.as_deref().ok_or_else(|| {
            IngestError::InvalidConfig(format!(
                "no API token: set `token` in the config or the {DEFAULT_TOKEN_ENV} variable"
            ))
        })?;
        Ok((&self.feed.endpoint, token))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file; without an explicit path a missing default file
    /// resolves to built-in defaults only when `allow_missing` is set.
    pub fn resolve(path: Option<&str>, allow_missing: bool) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            if allow_missing {
                return Self::resolve_config(Config::default());
            }
            return Err(IngestError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let snapshot_date = config
            .snapshot_date
            .as_deref()
            .map(str::parse::<SnapshotDate>)
            .transpose()?;

        let token_env = config
            .token_env
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string());
        let token = config
            .token
            .or_else(|| std::env::var(&token_env).ok())
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let retry = RetryPolicy {
            max_attempts: positive(config.max_attempts, 3, "max_attempts")?,
            base_delay: Duration::from_millis(config.retry_base_delay_ms.unwrap_or(200)),
        };
        let pagination = Pagination {
            page_size: positive(config.page_size, 1000, "page_size")?,
            max_pages: positive(config.max_pages, 10_000, "max_pages")?,
        };
        let persist = PersistOptions {
            batch_size: positive(config.batch_size, 10_000, "batch_size")?,
            workers: positive(config.workers, default_workers(), "workers")?,
            log_interval: positive(config.log_interval, 50_000, "log_interval")?,
        };

        let table = config.table.unwrap_or_else(|| DEFAULT_TABLE.to_string());
        validate_table_name(&table)?;

        Ok(ResolvedConfig {
            feed: FeedSettings {
                endpoint: config.endpoint.unwrap_or_default().trim().to_string(),
                snapshot_date,
                token,
                timeout: Duration::from_secs(positive(config.timeout_secs, 300, "timeout_secs")?),
                retry,
                paginate: config.paginate.unwrap_or(false),
                pagination,
            },
            persist,
            normalize: NormalizeOptions {
                enrich_reasons: config.enrich_reasons.unwrap_or(true),
            },
            database: Utf8PathBuf::from(config.database.unwrap_or_else(|| "ratings.db".to_string())),
            table,
            alert_webhook: config.alert_webhook.filter(|url| !url.trim().is_empty()),
        })
    }
}

fn positive<T>(value: Option<T>, default: T, name: &str) -> Result<T, IngestError>
where
    T: PartialOrd + Default + Copy,
{
    let value = value.unwrap_or(default);
    if value <= T::default() {
        return Err(IngestError::InvalidConfig(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.persist.batch_size, 10_000);
        assert_eq!(resolved.persist.log_interval, 50_000);
        assert_eq!(resolved.feed.retry.max_attempts, 3);
        assert_eq!(resolved.feed.timeout, Duration::from_secs(300));
        assert!(resolved.normalize.enrich_reasons);
        assert_eq!(resolved.table, DEFAULT_TABLE);
    }
}
