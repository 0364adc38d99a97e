// src/config.rs
//! Runtime configuration, read from the environment (`.env` supported via
//! dotenvy in the binary).

use std::path::PathBuf;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

/// Knobs the orchestrator needs for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-portal fetch deadline.
    pub fetch_timeout: Duration,
    /// Upper bound on concurrently fetching portals.
    pub max_concurrent_fetches: usize,
    /// Minimum relevance score for a new listing to be alerted (inclusive).
    /// Zero-score listings are never alerted regardless of this value.
    pub alert_threshold: i64,
    pub alerts_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 3,
            alert_threshold: 5,
            alerts_enabled: false,
        }
    }
}

/// Full service configuration for the binary.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub scan_interval: Duration,
    pub scan_on_startup: bool,
    pub pipeline: PipelineConfig,
    pub state_path: PathBuf,
    pub portals_file: PathBuf,
    pub keywords_file: PathBuf,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let hours: u64 = env_parse("SCAN_INTERVAL_HOURS", 4).max(1);
        Self {
            scan_interval: Duration::from_secs(hours * 3600),
            scan_on_startup: env_bool("SCAN_ON_STARTUP", true),
            pipeline: PipelineConfig {
                fetch_timeout: Duration::from_secs(env_parse("FETCH_TIMEOUT_SECS", 30).max(1)),
                max_concurrent_fetches: env_parse::<usize>("MAX_CONCURRENT_FETCHES", 3).max(1),
                alert_threshold: env_parse("ALERT_THRESHOLD", 5),
                alerts_enabled: env_bool("ALERTS_ENABLED", false),
            },
            state_path: PathBuf::from(
                std::env::var("STATE_PATH").unwrap_or_else(|_| "data/monitor_state.json".into()),
            ),
            portals_file: PathBuf::from(
                std::env::var("PORTALS_FILE").unwrap_or_else(|_| "data/portals.json".into()),
            ),
            keywords_file: PathBuf::from(
                std::env::var("KEYWORDS_FILE").unwrap_or_else(|_| "data/keywords.json".into()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_concurrent_fetches, 3);
        assert_eq!(cfg.alert_threshold, 5);
        assert!(!cfg.alerts_enabled);
    }

    #[test]
    fn env_bool_accepts_common_truthy_values() {
        assert!(!env_bool("LICITA_TEST_MISSING_VAR", false));
        assert!(env_bool("LICITA_TEST_MISSING_VAR", true));
    }
}
