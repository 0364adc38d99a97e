// src/error.rs
//! Error taxonomy of the pipeline.
//!
//! Fetch and normalization errors are absorbed into the run summary; only
//! store errors escalate to run failure, and nothing here ever terminates
//! the scheduling process.

use std::time::Duration;

use thiserror::Error;

/// Per-portal fetch failure. Isolated to the offending portal: the
/// orchestrator records it in `Run::portals_failed` and keeps going.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by portal (http {0})")]
    RateLimited(u16),

    #[error("unexpected markup: {0}")]
    Markup(String),

    #[error("invalid scraper config: {0}")]
    Config(String),
}

/// A single malformed raw item. Skipped and counted, never aborts the
/// portal's remaining items.
#[derive(Debug, Error)]
#[error("malformed listing: {0}")]
pub struct NormalizationError(pub String);

/// Persistence failure. Fatal to the current run: staged results are
/// discarded and recovered by rescraping on the next cycle, since nothing
/// was marked as seen.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Alert delivery failure. Post-persist and non-fatal: logged and flagged on
/// the run, persisted data is already durable.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("alert transport failed: {0}")]
    Transport(String),

    #[error("no alert sinks configured")]
    NoSinks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_messages_carry_cause() {
        let e = FetchError::Timeout(Duration::from_secs(30));
        assert_eq!(e.to_string(), "fetch timed out after 30s");

        let e = FetchError::RateLimited(429);
        assert_eq!(e.to_string(), "rate limited by portal (http 429)");
    }

    #[test]
    fn store_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = StoreError::from(io);
        assert!(e.to_string().contains("denied"));
    }
}
