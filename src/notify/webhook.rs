// src/notify/webhook.rs
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::error::NotifyError;
use crate::model::Listing;

use super::AlertSink;

pub struct WebhookSink {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("ALERT_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    count: usize,
    listings: Vec<WebhookItem<'a>>,
}

#[derive(Serialize)]
struct WebhookItem<'a> {
    title: &'a str,
    url: &'a str,
    relevance_score: i64,
    matched_keywords: &'a [String],
}

impl<'a> WebhookPayload<'a> {
    fn from_listings(listings: &'a [Listing]) -> Self {
        Self {
            count: listings.len(),
            listings: listings
                .iter()
                .take(20)
                .map(|l| WebhookItem {
                    title: &l.title,
                    url: &l.url,
                    relevance_score: l.relevance_score,
                    matched_keywords: &l.matched_keywords,
                })
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookSink {
    async fn notify(&self, listings: &[Listing]) -> Result<(), NotifyError> {
        let payload = WebhookPayload::from_listings(listings);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(NotifyError::Transport(format!("webhook http error: {e}")));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(NotifyError::Transport(format!(
                        "webhook request failed: {e}"
                    )));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn payload_is_capped_at_twenty_items() {
        let now = Utc::now();
        let listings: Vec<Listing> = (0..30)
            .map(|i| Listing {
                external_id: None,
                portal_id: 1,
                title: format!("Licitación {i}"),
                body: String::new(),
                published_at: None,
                url: format!("https://example.gov.ar/{i}"),
                content_hash: format!("h{i}"),
                relevance_score: 1,
                matched_keywords: vec![],
                status: crate::model::ListingStatus::New,
                first_seen_at: now,
                last_seen_at: now,
            })
            .collect();
        let payload = WebhookPayload::from_listings(&listings);
        assert_eq!(payload.count, 30);
        assert_eq!(payload.listings.len(), 20);
    }
}
