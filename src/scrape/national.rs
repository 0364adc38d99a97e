// src/scrape/national.rs
//! National bulletin scraper. The national gazette publishes procurement
//! notices through per-section RSS feeds; one cycle reads the configured
//! feeds and maps their items into raw listings.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::FetchError;
use crate::model::Portal;

use super::{PortalScraper, RawListing};

pub const KIND: &str = "national-bulletin";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Typed view of `Portal::scraper_config` for this kind.
#[derive(Debug, Deserialize)]
struct NationalConfig {
    /// Feed paths relative to the portal URL, one per gazette section.
    #[serde(default = "default_feed_paths")]
    feed_paths: Vec<String>,
    #[serde(default = "default_max_items")]
    max_items: usize,
}

fn default_feed_paths() -> Vec<String> {
    vec!["/rss/avisos".to_string()]
}

fn default_max_items() -> usize {
    50
}

enum Mode {
    Http {
        feed_urls: Vec<String>,
        client: reqwest::Client,
    },
    Fixture(Vec<String>),
}

pub struct NationalBulletinScraper {
    mode: Mode,
    max_items: usize,
}

impl NationalBulletinScraper {
    pub fn from_portal(portal: &Portal) -> Result<Self, FetchError> {
        let cfg: NationalConfig = super::typed_config(portal, KIND)?;
        if cfg.feed_paths.is_empty() {
            return Err(FetchError::Config(format!("{KIND}: no feed paths")));
        }
        let base = portal.url.trim_end_matches('/');
        let feed_urls = cfg
            .feed_paths
            .iter()
            .map(|p| format!("{}/{}", base, p.trim_start_matches('/')))
            .collect();
        Ok(Self {
            mode: Mode::Http {
                feed_urls,
                client: reqwest::Client::new(),
            },
            max_items: cfg.max_items,
        })
    }

    /// Parse-only construction for tests: each string is one feed document.
    pub fn from_fixtures<S: Into<String>>(docs: Vec<S>) -> Self {
        Self {
            mode: Mode::Fixture(docs.into_iter().map(Into::into).collect()),
            max_items: default_max_items(),
        }
    }

    fn parse_feed(&self, xml: &str) -> Result<Vec<RawListing>, FetchError> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| FetchError::Markup(format!("rss parse failed: {e}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(title) = it.title.filter(|t| !t.trim().is_empty()) else {
                tracing::debug!(target: "scrape", kind = KIND, "feed item without title skipped");
                continue;
            };
            out.push(RawListing {
                external_id: it.guid.or_else(|| it.link.clone()),
                title,
                body: it.description.unwrap_or_default(),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                url: it.link.unwrap_or_default(),
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl PortalScraper for NationalBulletinScraper {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let mut out = Vec::new();
        match &self.mode {
            Mode::Fixture(docs) => {
                for doc in docs {
                    out.extend(self.parse_feed(doc)?);
                }
            }
            Mode::Http { feed_urls, client } => {
                for url in feed_urls {
                    let resp = client.get(url).send().await?;
                    if resp.status().as_u16() == 429 {
                        return Err(FetchError::RateLimited(429));
                    }
                    let body = resp.error_for_status()?.text().await?;
                    out.extend(self.parse_feed(&body)?);
                }
            }
        }
        out.truncate(self.max_items);
        Ok(out)
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Feeds in the wild embed HTML entities that are not valid XML; replace the
/// common ones before handing the document to the XML parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Avisos Oficiales</title>
    <item>
      <title>Licitaci&#243;n P&#250;blica 12/2026 &ndash; Reactivos de laboratorio</title>
      <link>https://boletin.example.gov.ar/avisos/12-2026</link>
      <guid>aviso-12-2026</guid>
      <pubDate>Mon, 17 Aug 2026 09:30:00 -0300</pubDate>
      <description>Adquisici&#243;n de reactivos&nbsp;para pericias.</description>
    </item>
    <item>
      <link>https://boletin.example.gov.ar/avisos/sin-titulo</link>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_items_and_skips_titleless() {
        let scraper = NationalBulletinScraper::from_fixtures(vec![FEED]);
        let items = scraper.fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id.as_deref(), Some("aviso-12-2026"));
        assert!(items[0].title.contains("Reactivos de laboratorio"));
        assert_eq!(
            items[0].url,
            "https://boletin.example.gov.ar/avisos/12-2026"
        );
        let ts = items[0].published_at.unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-08-17T12:30:00+00:00");
    }

    #[tokio::test]
    async fn malformed_feed_is_a_markup_error() {
        let scraper = NationalBulletinScraper::from_fixtures(vec!["<html>not rss</html>"]);
        let err = scraper.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Markup(_)));
    }

    #[test]
    fn config_defaults_apply_on_empty_object() {
        let portal = Portal {
            id: 1,
            name: "Boletín Oficial".into(),
            short_name: "boletin-nacional".into(),
            url: "https://boletin.example.gov.ar/".into(),
            level: crate::model::PortalLevel::National,
            scraper_kind: KIND.into(),
            scraper_config: serde_json::json!({}),
            is_enabled: true,
        };
        assert!(NationalBulletinScraper::from_portal(&portal).is_ok());
    }
}
