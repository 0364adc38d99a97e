// src/scrape/mod.rs
//! Source adapters: one scraper per portal kind, behind a common contract.

pub mod municipal;
pub mod national;
pub mod provincial;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, NormalizationError};
use crate::model::Portal;

/// One-time metrics registration (so series show up if a recorder is installed).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "monitor_listings_found_total",
            "Raw listings returned by portal scrapers."
        );
        describe_counter!(
            "monitor_listings_new_total",
            "Listings that passed dedup and were persisted."
        );
        describe_counter!(
            "monitor_portal_errors_total",
            "Portal fetch failures (timeout, markup drift, rate limit)."
        );
        describe_counter!(
            "monitor_malformed_listings_total",
            "Raw items skipped during normalization."
        );
        describe_counter!("monitor_runs_total", "Completed monitoring runs.");
    });
}

/// A raw listing as returned by a scraper, before normalization and scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub external_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
}

/// Contract every portal scraper implements. A fetch returns the bounded
/// page window of one cycle, never the full archive; an empty result set is
/// not an error.
#[async_trait::async_trait]
pub trait PortalScraper: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError>;
    fn kind(&self) -> &'static str;
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }

    out
}

/// Normalize a raw listing in place. A listing without a usable title or URL
/// is malformed and gets skipped by the caller.
pub fn normalize_raw(mut raw: RawListing) -> Result<RawListing, NormalizationError> {
    raw.title = normalize_text(&raw.title);
    raw.body = normalize_text(&raw.body);
    raw.url = raw.url.trim().to_string();
    raw.external_id = raw
        .external_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    if raw.title.is_empty() {
        return Err(NormalizationError("empty title".into()));
    }
    if raw.url.is_empty() {
        return Err(NormalizationError("empty url".into()));
    }
    Ok(raw)
}

/// Parse a portal's opaque `scraper_config` into the adapter's typed config.
/// A missing/null config means "all defaults".
pub(crate) fn typed_config<T: serde::de::DeserializeOwned>(
    portal: &Portal,
    kind: &str,
) -> Result<T, FetchError> {
    let value = match &portal.scraper_config {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        v => v.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| FetchError::Config(format!("{kind}: {e}")))
}

type ScraperFactory =
    Box<dyn Fn(&Portal) -> Result<Arc<dyn PortalScraper>, FetchError> + Send + Sync>;

/// Registry mapping a scraper-kind tag to a constructor. Portals reference
/// scrapers by tag; unknown tags disable the portal for the run instead of
/// failing it.
pub struct ScraperRegistry {
    factories: HashMap<String, ScraperFactory>,
}

impl ScraperRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&Portal) -> Result<Arc<dyn PortalScraper>, FetchError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    /// Build the scraper for a portal. `None` means the tag is unknown
    /// (portal disabled for this run); `Some(Err)` means the tag is known
    /// but the portal's config is invalid.
    pub fn build(&self, portal: &Portal) -> Option<Result<Arc<dyn PortalScraper>, FetchError>> {
        self.factories
            .get(&portal.scraper_kind)
            .map(|factory| factory(portal))
    }

    pub fn known_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for ScraperRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register(national::KIND, |portal| {
            national::NationalBulletinScraper::from_portal(portal)
                .map(|s| Arc::new(s) as Arc<dyn PortalScraper>)
        });
        reg.register(provincial::KIND, |portal| {
            provincial::ProvincialPortalScraper::from_portal(portal)
                .map(|s| Arc::new(s) as Arc<dyn PortalScraper>)
        });
        reg.register(municipal::KIND, |portal| {
            municipal::MunicipalGenericScraper::from_portal(portal)
                .map(|s| Arc::new(s) as Arc<dyn PortalScraper>)
        });
        reg
    }
}

pub(crate) fn count_portal_error() {
    counter!("monitor_portal_errors_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, url: &str) -> RawListing {
        RawListing {
            external_id: None,
            title: title.into(),
            body: String::new(),
            published_at: None,
            url: url.into(),
        }
    }

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <b>Compra</b>&nbsp;de &quot;kits&quot;\n\n de ADN ";
        assert_eq!(normalize_text(s), "Compra de \"kits\" de ADN");
    }

    #[test]
    fn normalize_raw_rejects_empty_title() {
        let err = normalize_raw(raw("<p></p>", "https://example.gov.ar/1")).unwrap_err();
        assert!(err.to_string().contains("empty title"));
    }

    #[test]
    fn normalize_raw_drops_blank_external_id() {
        let mut r = raw("Licitación 7/2026", "https://example.gov.ar/7");
        r.external_id = Some("   ".into());
        let norm = normalize_raw(r).unwrap();
        assert_eq!(norm.external_id, None);
    }

    #[test]
    fn default_registry_knows_builtin_kinds() {
        let reg = ScraperRegistry::default();
        assert_eq!(
            reg.known_kinds(),
            vec!["municipal-generic", "national-bulletin", "provincial-portal"]
        );
    }

    #[test]
    fn unknown_kind_resolves_to_none() {
        let reg = ScraperRegistry::default();
        let portal = Portal {
            id: 1,
            name: "Mystery".into(),
            short_name: "mystery".into(),
            url: "https://example.gov.ar".into(),
            level: crate::model::PortalLevel::Municipal,
            scraper_kind: "not-a-scraper".into(),
            scraper_config: serde_json::Value::Null,
            is_enabled: true,
        };
        assert!(reg.build(&portal).is_none());
    }
}
