//! Engine configuration.
//!
//! `SyncConfig` is plain data: the host application builds it (or loads it from
//! JSON) and hands it to `GroupSync::new`. Every field has a default so a partial
//! JSON document is enough.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::limits::{
    LOCAL_OP_DELAY_MS, MAX_CACHED_ROSTERS, MAX_SEEN_SIGNALS, SIGNAL_CHANNEL_CAPACITY,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config parse failed: {0}")]
    Parse(String),

    #[error("Invalid config value for {field}: must be greater than zero")]
    Zero { field: &'static str },
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Simulated round-trip for mutations on local-only groups.
    pub local_op_delay_ms: u64,
    /// LRU capacity of the member-list cache.
    pub roster_cache_capacity: usize,
    /// How many envelope ids the listener remembers for de-duplication.
    pub signal_dedup_capacity: usize,
    /// Buffer size of each signal transport.
    pub channel_capacity: usize,
    /// Render the demo dataset when the catalog fetch fails.
    pub demo_fallback: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_op_delay_ms: LOCAL_OP_DELAY_MS,
            roster_cache_capacity: MAX_CACHED_ROSTERS,
            signal_dedup_capacity: MAX_SEEN_SIGNALS,
            channel_capacity: SIGNAL_CHANNEL_CAPACITY,
            demo_fallback: true,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject capacities that would make the caches or channels unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roster_cache_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "roster_cache_capacity",
            });
        }
        if self.signal_dedup_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "signal_dedup_capacity",
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "channel_capacity",
            });
        }
        Ok(())
    }

    pub fn local_op_delay(&self) -> Duration {
        Duration::from_millis(self.local_op_delay_ms)
    }
}

impl fmt::Display for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncConfig(local_delay={}ms, rosters={}, dedup={}, channel={}, demo={})",
            self.local_op_delay_ms,
            self.roster_cache_capacity,
            self.signal_dedup_capacity,
            self.channel_capacity,
            self.demo_fallback
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.demo_fallback);
        assert_eq!(config.local_op_delay(), Duration::from_millis(LOCAL_OP_DELAY_MS));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SyncConfig::from_json(r#"{"local_op_delay_ms": 0, "demo_fallback": false}"#)
            .unwrap();
        assert_eq!(config.local_op_delay_ms, 0);
        assert!(!config.demo_fallback);
        assert_eq!(config.roster_cache_capacity, MAX_CACHED_ROSTERS);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = SyncConfig::from_json(r#"{"roster_cache_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "roster_cache_capacity" }));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            SyncConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_display_summary() {
        let s = SyncConfig::default().to_string();
        assert!(s.contains("demo=true"));
    }
}
