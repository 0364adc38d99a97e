// src/notify/mod.rs
//! Alert delivery. The pipeline hands over the ranked, above-threshold new
//! listings of one run; everything past that point is fire-and-forget with
//! respect to the run's persisted results.

pub mod email;
pub mod webhook;

use crate::error::NotifyError;
use crate::model::Listing;

#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one run's alert batch: new listings, pre-sorted by relevance.
    async fn notify(&self, listings: &[Listing]) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Fan-out over the configured sinks. Per-sink failures are logged; the
/// batch counts as delivered if at least one sink accepted it.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl NotifierMux {
    /// Build from environment: email when SMTP vars are present, webhook
    /// when `ALERT_WEBHOOK_URL` is set. Either may be absent.
    pub fn from_env() -> Self {
        let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
        match email::EmailSink::from_env() {
            Ok(Some(sink)) => sinks.push(Box::new(sink)),
            Ok(None) => {}
            Err(e) => tracing::warn!(target: "notify", error = %e, "email sink disabled"),
        }
        if let Some(sink) = webhook::WebhookSink::from_env() {
            sinks.push(Box::new(sink));
        }
        if sinks.is_empty() {
            tracing::info!(target: "notify", "no alert sinks configured");
        }
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait::async_trait]
impl AlertSink for NotifierMux {
    async fn notify(&self, listings: &[Listing]) -> Result<(), NotifyError> {
        if self.sinks.is_empty() {
            return Err(NotifyError::NoSinks);
        }
        let mut delivered = 0usize;
        for sink in &self.sinks {
            match sink.notify(listings).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(
                        target: "notify",
                        sink = sink.name(),
                        count = listings.len(),
                        "alert batch delivered"
                    );
                }
                Err(e) => {
                    tracing::warn!(target: "notify", sink = sink.name(), error = %e, "alert delivery failed");
                }
            }
        }
        if delivered == 0 {
            return Err(NotifyError::Transport("all sinks failed".into()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

/// Plaintext digest shared by the email body and log output.
pub(crate) fn digest_text(listings: &[Listing]) -> String {
    let mut lines = vec![
        format!("{} nuevas licitaciones relevantes", listings.len()),
        "=".repeat(60),
        String::new(),
    ];
    for listing in listings.iter().take(20) {
        lines.push(format!("• {}", listing.title));
        lines.push(format!(
            "  relevancia {} — {}",
            listing.relevance_score,
            listing.matched_keywords.join(", ")
        ));
        if let Some(ts) = listing.published_at {
            lines.push(format!("  publicado {}", ts.format("%d/%m/%Y")));
        }
        lines.push(format!("  {}", listing.url));
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakySink {
        ok: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl AlertSink for FlakySink {
        async fn notify(&self, _listings: &[Listing]) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(())
            } else {
                Err(NotifyError::Transport("boom".into()))
            }
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn sample() -> Vec<Listing> {
        vec![Listing {
            external_id: None,
            portal_id: 1,
            title: "Compra de kits de ADN".into(),
            body: String::new(),
            published_at: None,
            url: "https://example.gov.ar/1".into(),
            content_hash: "h".into(),
            relevance_score: 5,
            matched_keywords: vec!["ADN".into()],
            status: crate::model::ListingStatus::New,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        }]
    }

    #[tokio::test]
    async fn one_healthy_sink_is_enough() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = NotifierMux::default();
        mux.push(Box::new(FlakySink {
            ok: false,
            calls: calls.clone(),
        }));
        mux.push(Box::new(FlakySink {
            ok: true,
            calls: calls.clone(),
        }));
        assert!(mux.notify(&sample()).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_sinks_failing_fails_the_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = NotifierMux::default();
        mux.push(Box::new(FlakySink { ok: false, calls }));
        assert!(mux.notify(&sample()).await.is_err());
    }

    #[test]
    fn digest_carries_title_score_and_terms() {
        let text = digest_text(&sample());
        assert!(text.contains("Compra de kits de ADN"));
        assert!(text.contains("relevancia 5 — ADN"));
    }
}
