//! Controller configuration from environment variables.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `MANIFEST_PATH` | unset | YAML seed of nodes, resources, workloads and services |
//! | `WATCH_NAMESPACE` | all namespaces | Only drive workloads/services in this namespace |
//! | `METRICS_ADDR` | `0.0.0.0:8080` | Listen address for `/healthz`, `/readyz`, `/metrics` |
//! | `RETRY_MAX_ATTEMPTS` | `5` | Attempts per store operation |
//! | `BACKOFF_MIN_MS` | `100` | First retry / requeue delay |
//! | `BACKOFF_MAX_MS` | `30000` | Cap for retry / requeue delays |

use crate::error::ControllerError;
use crate::retry::RetryPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_MIN_MS: u64 = 100;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub manifest_path: Option<PathBuf>,
    pub namespace: Option<String>,
    pub metrics_addr: SocketAddr,
    pub retry: RetryPolicy,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let metrics_addr = parse_or(get("METRICS_ADDR"), "METRICS_ADDR", || {
            SocketAddr::from_str(DEFAULT_METRICS_ADDR)
                .map_err(|e| ControllerError::InvalidConfig(e.to_string()))
        })?;
        let max_attempts: u32 = parse_or(get("RETRY_MAX_ATTEMPTS"), "RETRY_MAX_ATTEMPTS", || {
            Ok(DEFAULT_RETRY_MAX_ATTEMPTS)
        })?;
        let min_ms: u64 = parse_or(get("BACKOFF_MIN_MS"), "BACKOFF_MIN_MS", || Ok(DEFAULT_BACKOFF_MIN_MS))?;
        let max_ms: u64 = parse_or(get("BACKOFF_MAX_MS"), "BACKOFF_MAX_MS", || Ok(DEFAULT_BACKOFF_MAX_MS))?;

        if max_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if min_ms > max_ms {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MIN_MS ({min_ms}) must not exceed BACKOFF_MAX_MS ({max_ms})"
            )));
        }

        Ok(Self {
            manifest_path: get("MANIFEST_PATH").map(PathBuf::from),
            namespace: get("WATCH_NAMESPACE"),
            metrics_addr,
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(min_ms),
                max_delay: Duration::from_millis(max_ms),
                ..RetryPolicy::default()
            },
        })
    }
}

fn parse_or<T, D>(value: Option<String>, key: &str, default: D) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, ControllerError>,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
        None => default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.manifest_path, None);
        assert_eq!(config.namespace, None);
        assert_eq!(config.metrics_addr.to_string(), DEFAULT_METRICS_ADDR);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("MANIFEST_PATH", "/etc/herd/seed.yaml"),
            ("WATCH_NAMESPACE", "prod"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
            ("RETRY_MAX_ATTEMPTS", "3"),
            ("BACKOFF_MIN_MS", "10"),
            ("BACKOFF_MAX_MS", "50"),
        ])
        .unwrap();
        assert_eq!(config.manifest_path, Some(PathBuf::from("/etc/herd/seed.yaml")));
        assert_eq!(config.namespace.as_deref(), Some("prod"));
        assert_eq!(config.metrics_addr.port(), 9100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("RETRY_MAX_ATTEMPTS", "many")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("RETRY_MAX_ATTEMPTS", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("BACKOFF_MIN_MS", "500"), ("BACKOFF_MAX_MS", "100")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("METRICS_ADDR", "not-an-address")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = config(&[("WATCH_NAMESPACE", ""), ("MANIFEST_PATH", "  ")]).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.manifest_path, None);
    }
}
