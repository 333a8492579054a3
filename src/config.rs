use crate::persistence::{DEFAULT_MAX_BACKUPS, RetryPolicy};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/storage";
const DEFAULT_AUTOSAVE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub autosave_interval: Duration,
    pub max_backups: usize,
    pub retry: RetryPolicy,
    pub storage_quota: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            autosave_interval: Duration::from_secs(DEFAULT_AUTOSAVE_SECS),
            max_backups: DEFAULT_MAX_BACKUPS,
            retry: RetryPolicy::default(),
            storage_quota: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retry_defaults = RetryPolicy::default();

        let verify_delay = parse_or(
            &lookup,
            "SAVE_VERIFY_DELAY_MS",
            retry_defaults.initial_delay.as_millis() as u64,
        );
        let autosave_secs = parse_or(&lookup, "AUTOSAVE_SECS", DEFAULT_AUTOSAVE_SECS).max(1);

        Self {
            port: parse_or(&lookup, "PORT", defaults.port),
            data_path: lookup("APP_DATA_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            autosave_interval: Duration::from_secs(autosave_secs),
            max_backups: parse_or(&lookup, "MAX_BACKUPS", defaults.max_backups),
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "SAVE_VERIFY_ATTEMPTS", retry_defaults.max_attempts)
                    .max(1),
                initial_delay: Duration::from_millis(verify_delay),
                max_delay: retry_defaults.max_delay,
            },
            storage_quota: lookup("STORAGE_QUOTA_BYTES").and_then(|raw| match raw.parse::<u64>() {
                Ok(quota) => Some(quota),
                Err(_) => {
                    warn!("ignoring invalid STORAGE_QUOTA_BYTES={raw:?}");
                    None
                }
            }),
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {key}={raw:?}, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_path, PathBuf::from("data/storage"));
        assert_eq!(config.autosave_interval, Duration::from_secs(30));
        assert_eq!(config.max_backups, 5);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.storage_quota, None);
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("APP_DATA_PATH", "/tmp/tracker"),
            ("AUTOSAVE_SECS", "5"),
            ("MAX_BACKUPS", "2"),
            ("SAVE_VERIFY_ATTEMPTS", "4"),
            ("SAVE_VERIFY_DELAY_MS", "10"),
            ("STORAGE_QUOTA_BYTES", "5242880"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_path, PathBuf::from("/tmp/tracker"));
        assert_eq!(config.autosave_interval, Duration::from_secs(5));
        assert_eq!(config.max_backups, 2);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.storage_quota, Some(5_242_880));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config(&[
            ("PORT", "eighty"),
            ("AUTOSAVE_SECS", "0"),
            ("SAVE_VERIFY_ATTEMPTS", "0"),
            ("STORAGE_QUOTA_BYTES", "lots"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.autosave_interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.storage_quota, None);
    }
}
