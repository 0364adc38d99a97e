// src/scrape/municipal.rs
//! Generic municipal scraper. Municipal sites share no template, so this
//! adapter probes a few well-known section paths, falls back to sniffing the
//! landing page's navigation for a procurement section, and extracts listing
//! links by heuristics. Finding nothing is common and not an error: the
//! adapter degrades to zero results.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;

use crate::error::FetchError;
use crate::model::Portal;

use super::{normalize_text, PortalScraper, RawListing};

pub const KIND: &str = "municipal-generic";

/// Words that mark a link as procurement-related, accent-stripped.
const SECTION_HINTS: &[&str] = &[
    "licitaci",
    "compras",
    "contrataci",
    "adquisici",
    "proveedores",
];

/// Words that mark an individual item as a tender-ish announcement.
const ITEM_HINTS: &[&str] = &["licit", "exped", "contrat", "compra", "adquisi"];

/// Typed view of `Portal::scraper_config` for this kind.
#[derive(Debug, Deserialize)]
struct MunicipalConfig {
    /// Candidate section paths probed before falling back to link sniffing.
    #[serde(default = "default_section_paths")]
    section_paths: Vec<String>,
    #[serde(default = "default_min_title_len")]
    min_title_len: usize,
    #[serde(default = "default_max_items")]
    max_items: usize,
}

fn default_section_paths() -> Vec<String> {
    vec![
        "/licitaciones".to_string(),
        "/compras-y-contrataciones".to_string(),
        "/compras".to_string(),
    ]
}
fn default_min_title_len() -> usize {
    10
}
fn default_max_items() -> usize {
    40
}

enum Mode {
    Http { client: reqwest::Client },
    /// Section page document served directly, bypassing discovery.
    Fixture(String),
}

pub struct MunicipalGenericScraper {
    mode: Mode,
    base_url: String,
    section_paths: Vec<String>,
    min_title_len: usize,
    max_items: usize,
}

impl MunicipalGenericScraper {
    pub fn from_portal(portal: &Portal) -> Result<Self, FetchError> {
        let cfg: MunicipalConfig = super::typed_config(portal, KIND)?;
        Ok(Self {
            mode: Mode::Http {
                client: reqwest::Client::new(),
            },
            base_url: portal.url.trim_end_matches('/').to_string(),
            section_paths: cfg.section_paths,
            min_title_len: cfg.min_title_len,
            max_items: cfg.max_items,
        })
    }

    pub fn from_fixture(base_url: &str, section_html: &str) -> Self {
        Self {
            mode: Mode::Fixture(section_html.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            section_paths: default_section_paths(),
            min_title_len: default_min_title_len(),
            max_items: default_max_items(),
        }
    }

    /// Probe configured paths, then sniff the landing page's links.
    async fn discover_section(&self, client: &reqwest::Client) -> Option<String> {
        for path in &self.section_paths {
            let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(target: "scrape", kind = KIND, %url, "section path hit");
                    return Some(url);
                }
                _ => continue,
            }
        }

        let landing = client
            .get(&self.base_url)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .text()
            .await
            .ok()?;
        find_section_link(&landing).and_then(|href| join_url(&self.base_url, &href))
    }

    fn extract(&self, page_url: &str, html: &str) -> Vec<RawListing> {
        let mut out = Vec::new();
        for (href, inner) in anchors(html) {
            let title = normalize_text(&inner);
            if title.chars().count() < self.min_title_len {
                continue;
            }
            let haystack = format!("{} {}", fold(&href), fold(&title));
            if !ITEM_HINTS.iter().any(|hint| haystack.contains(hint)) {
                continue;
            }
            let Some(url) = join_url(page_url, &href) else {
                continue;
            };
            out.push(RawListing {
                external_id: None,
                title,
                body: String::new(),
                published_at: None,
                url,
            });
            if out.len() >= self.max_items {
                break;
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl PortalScraper for MunicipalGenericScraper {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        match &self.mode {
            Mode::Fixture(html) => Ok(self.extract(&self.base_url, html)),
            Mode::Http { client } => {
                let Some(section_url) = self.discover_section(client).await else {
                    tracing::warn!(
                        target: "scrape",
                        kind = KIND,
                        base = %self.base_url,
                        "no procurement section detected, returning zero results"
                    );
                    return Ok(Vec::new());
                };
                let resp = client.get(&section_url).send().await?;
                if resp.status().as_u16() == 429 {
                    return Err(FetchError::RateLimited(429));
                }
                let html = resp.error_for_status()?.text().await?;
                Ok(self.extract(&section_url, &html))
            }
        }
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}

/// All `(href, inner_html)` anchor pairs of a document, in document order.
fn anchors(html: &str) -> Vec<(String, String)> {
    static RE_ANCHOR: OnceCell<Regex> = OnceCell::new();
    let re = RE_ANCHOR.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
    });
    re.captures_iter(html)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

/// First landing-page link that looks like the procurement section.
fn find_section_link(html: &str) -> Option<String> {
    for (href, inner) in anchors(html) {
        let haystack = format!("{} {}", fold(&href), fold(&normalize_text(&inner)));
        if SECTION_HINTS.iter().any(|hint| haystack.contains(hint)) {
            return Some(href);
        }
    }
    None
}

fn join_url(base: &str, href: &str) -> Option<String> {
    reqwest::Url::parse(base)
        .ok()?
        .join(href)
        .ok()
        .map(String::from)
}

fn fold(s: &str) -> String {
    crate::matcher::fold(s)
}
