// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use crate::error::NotifyError;
use crate::model::Listing;

use super::{digest_text, AlertSink};

pub struct EmailSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSink {
    /// `Ok(None)` when SMTP is not configured at all; `Err` when it is
    /// configured but malformed.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("ALERT_EMAIL_FROM").context("ALERT_EMAIL_FROM missing")?;
        let to_addr = std::env::var("ALERT_EMAIL_TO").context("ALERT_EMAIL_TO missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid ALERT_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid ALERT_EMAIL_TO")?;

        Ok(Some(Self { mailer, from, to }))
    }
}

#[async_trait::async_trait]
impl AlertSink for EmailSink {
    async fn notify(&self, listings: &[Listing]) -> Result<(), NotifyError> {
        let subject = format!(
            "Licitaciones: {} nuevas relevantes — {}",
            listings.len(),
            chrono::Utc::now().format("%d/%m/%Y")
        );
        let body = digest_text(listings);

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifyError::Transport(format!("build email: {e}")))?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| NotifyError::Transport(format!("send email: {e}")))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
