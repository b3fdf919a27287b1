use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    pub poll: PollConfig,
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// pending / running のアイテムがある間のポーリング間隔
    pub active_interval_ms: u64,
    /// それ以外のときの間隔。0 はポーリングしない
    pub idle_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub stale_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub retry_on_unauthorized: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: 5_000,
            idle_interval_ms: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            stale_time_secs: 30,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            retry_on_unauthorized: true,
        }
    }
}

impl PollConfig {
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CONSOLE_SYNC_POLL_INTERVAL_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.poll.active_interval_ms = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("CONSOLE_SYNC_IDLE_POLL_INTERVAL_MS") {
            if let Some(value) = parse_u64(&v) {
                cfg.poll.idle_interval_ms = value;
            }
        }
        if let Ok(v) = std::env::var("CONSOLE_SYNC_CACHE_MAX_ENTRIES") {
            if let Some(value) = parse_usize(&v) {
                cfg.cache.max_entries = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("CONSOLE_SYNC_STALE_TIME_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.cache.stale_time_secs = value;
            }
        }
        if let Ok(v) = std::env::var("CONSOLE_SYNC_RETRY_UNAUTHORIZED") {
            cfg.remote.retry_on_unauthorized = parse_bool(&v, cfg.remote.retry_on_unauthorized);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll.active_interval_ms == 0 {
            return Err("Poll active_interval_ms must be greater than 0".to_string());
        }
        if self.cache.max_entries == 0 {
            return Err("Cache max_entries must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = SyncConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.poll.active_interval(), Duration::from_secs(5));
        assert!(cfg.poll.idle_interval().is_zero());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut cfg = SyncConfig::default();
        cfg.poll.active_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SyncConfig::default();
        cfg.cache.max_entries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_bool(" YES ", false));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("maybe", true));
        assert_eq!(parse_u64(" 250 "), Some(250));
        assert_eq!(parse_usize("-1"), None);
    }
}
