//! Runtime configuration loaded from the environment.

use std::env;
use std::time::Duration;

use thiserror::Error;

use stockflow_inventory::StockThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Thresholds given to snapshots created lazily by a movement.
    pub default_thresholds: StockThresholds,
    /// Bound on waiting for (and holding locks in) a transaction.
    pub tx_timeout: Duration,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            default_thresholds: StockThresholds {
                min_stock_level: 10,
                max_stock_level: 1000,
            },
            tx_timeout: Duration::from_millis(5000),
            database_url: None,
            db_max_connections: 10,
        }
    }
}

impl InventoryConfig {
    /// Load from `STOCKFLOW_*` variables and `DATABASE_URL`, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let min = parse(&lookup, "STOCKFLOW_DEFAULT_MIN_STOCK", defaults.default_thresholds.min_stock_level)?;
        let max = parse(&lookup, "STOCKFLOW_DEFAULT_MAX_STOCK", defaults.default_thresholds.max_stock_level)?;
        let default_thresholds = StockThresholds::new(min, max).map_err(|e| ConfigError::Invalid {
            name: "STOCKFLOW_DEFAULT_MIN_STOCK",
            value: format!("{min}/{max}"),
            reason: e.to_string(),
        })?;

        let timeout_ms: u64 = parse(&lookup, "STOCKFLOW_TX_TIMEOUT_MS", defaults.tx_timeout.as_millis() as u64)?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "STOCKFLOW_TX_TIMEOUT_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let db_max_connections = parse(&lookup, "STOCKFLOW_DB_MAX_CONNECTIONS", defaults.db_max_connections)?;

        Ok(Self {
            default_thresholds,
            tx_timeout: Duration::from_millis(timeout_ms),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            db_max_connections,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = InventoryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, InventoryConfig::default());
        assert_eq!(config.default_thresholds.min_stock_level, 10);
        assert_eq!(config.default_thresholds.max_stock_level, 1000);
        assert_eq!(config.tx_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = InventoryConfig::from_lookup(lookup(&[
            ("STOCKFLOW_DEFAULT_MIN_STOCK", "5"),
            ("STOCKFLOW_DEFAULT_MAX_STOCK", "0"),
            ("STOCKFLOW_TX_TIMEOUT_MS", "250"),
            ("DATABASE_URL", "postgres://localhost/stockflow"),
        ]))
        .unwrap();
        assert_eq!(config.default_thresholds.min_stock_level, 5);
        assert_eq!(config.default_thresholds.max_stock_level, 0);
        assert_eq!(config.tx_timeout, Duration::from_millis(250));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/stockflow"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(InventoryConfig::from_lookup(lookup(&[("STOCKFLOW_TX_TIMEOUT_MS", "soon")])).is_err());
        assert!(InventoryConfig::from_lookup(lookup(&[("STOCKFLOW_TX_TIMEOUT_MS", "0")])).is_err());
        assert!(InventoryConfig::from_lookup(lookup(&[
            ("STOCKFLOW_DEFAULT_MIN_STOCK", "50"),
            ("STOCKFLOW_DEFAULT_MAX_STOCK", "20"),
        ]))
        .is_err());
    }
}
