// src/scrape/provincial.rs
//! Provincial procurement portal scraper. These portals expose a JSON search
//! endpoint, but field names and envelope shape vary between installations,
//! so parsing is deliberately tolerant.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::FetchError;
use crate::model::Portal;

use super::{PortalScraper, RawListing};

pub const KIND: &str = "provincial-portal";

/// Typed view of `Portal::scraper_config` for this kind.
#[derive(Debug, Deserialize)]
struct ProvincialConfig {
    #[serde(default = "default_api_path")]
    api_path: String,
    #[serde(default = "default_page_size")]
    page_size: u32,
    /// Bounded page window per cycle; this is a poller, not an archiver.
    #[serde(default = "default_max_pages")]
    max_pages: u32,
}

fn default_api_path() -> String {
    "/api/licitaciones".to_string()
}
fn default_page_size() -> u32 {
    50
}
fn default_max_pages() -> u32 {
    2
}

// --- tolerant envelope/item shapes seen across installations ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchEnvelope {
    Flat { results: Vec<ApiItem> },
    Wrapped { data: Box<SearchEnvelope> },
    Items { items: Vec<ApiItem> },
    Bare(Vec<ApiItem>),
}

impl SearchEnvelope {
    fn into_items(self) -> Vec<ApiItem> {
        match self {
            SearchEnvelope::Flat { results } => results,
            SearchEnvelope::Items { items } => items,
            SearchEnvelope::Bare(items) => items,
            SearchEnvelope::Wrapped { data } => data.into_items(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    #[serde(alias = "idLicitacion", alias = "external_id")]
    id: Option<serde_json::Value>,
    #[serde(alias = "title", alias = "objeto", alias = "nombre")]
    titulo: Option<String>,
    #[serde(alias = "description", alias = "detalle", default)]
    descripcion: Option<String>,
    #[serde(alias = "fechaPublicacion", alias = "published_at")]
    fecha_publicacion: Option<String>,
    #[serde(alias = "link", alias = "urlDetalle")]
    url: Option<String>,
}

enum Mode {
    Http {
        api_url: String,
        client: reqwest::Client,
    },
    /// One document per page, in page order.
    Fixture(Vec<String>),
}

pub struct ProvincialPortalScraper {
    mode: Mode,
    base_url: String,
    page_size: u32,
    max_pages: u32,
}

impl ProvincialPortalScraper {
    pub fn from_portal(portal: &Portal) -> Result<Self, FetchError> {
        let cfg: ProvincialConfig = super::typed_config(portal, KIND)?;
        if cfg.page_size == 0 || cfg.max_pages == 0 {
            return Err(FetchError::Config(format!(
                "{KIND}: page_size and max_pages must be positive"
            )));
        }
        let base_url = portal.url.trim_end_matches('/').to_string();
        let api_url = format!("{}/{}", base_url, cfg.api_path.trim_start_matches('/'));
        Ok(Self {
            mode: Mode::Http {
                api_url,
                client: reqwest::Client::new(),
            },
            base_url,
            page_size: cfg.page_size,
            max_pages: cfg.max_pages,
        })
    }

    pub fn from_fixtures<S: Into<String>>(base_url: &str, pages: Vec<S>) -> Self {
        Self {
            mode: Mode::Fixture(pages.into_iter().map(Into::into).collect()),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }

    fn parse_page(&self, body: &str) -> Result<Vec<RawListing>, FetchError> {
        let envelope: SearchEnvelope = serde_json::from_str(body)
            .map_err(|e| FetchError::Markup(format!("search response parse failed: {e}")))?;

        let items = envelope.into_items();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let Some(titulo) = item.titulo.filter(|t| !t.trim().is_empty()) else {
                tracing::debug!(target: "scrape", kind = KIND, "item without title skipped");
                continue;
            };
            let external_id = item.id.map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
            let url = match item.url {
                Some(u) if !u.trim().is_empty() => u,
                _ => match &external_id {
                    Some(id) => format!("{}/licitaciones/{id}", self.base_url),
                    None => self.base_url.clone(),
                },
            };
            out.push(RawListing {
                external_id,
                title: titulo,
                body: item.descripcion.unwrap_or_default(),
                published_at: item.fecha_publicacion.as_deref().and_then(parse_date),
                url,
            });
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl PortalScraper for ProvincialPortalScraper {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let mut out = Vec::new();
        match &self.mode {
            Mode::Fixture(pages) => {
                for page in pages.iter().take(self.max_pages as usize) {
                    out.extend(self.parse_page(page)?);
                }
            }
            Mode::Http { api_url, client } => {
                for page in 1..=self.max_pages {
                    let resp = client
                        .get(api_url)
                        .query(&[("pagina", page), ("por_pagina", self.page_size)])
                        .send()
                        .await?;
                    if resp.status().as_u16() == 429 {
                        return Err(FetchError::RateLimited(429));
                    }
                    let body = resp.error_for_status()?.text().await?;
                    let items = self.parse_page(&body)?;
                    let page_len = items.len();
                    out.extend(items);
                    // Short page means we reached the end of the window.
                    if page_len < self.page_size as usize {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}

/// Portals report dates as RFC 3339, bare dates, or DD/MM/YYYY.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
      "results": [
        {"idLicitacion": 4410, "objeto": "Servicio de análisis de ADN",
         "detalle": "Pericias genéticas para el laboratorio central",
         "fechaPublicacion": "21/08/2026",
         "urlDetalle": "https://compras.example.gob.ar/proceso/4410"},
        {"id": "PBA-77", "titulo": "Insumos de balística"},
        {"descripcion": "registro sin título"}
      ]
    }"#;

    #[tokio::test]
    async fn parses_aliased_fields_and_fills_urls() {
        let scraper =
            ProvincialPortalScraper::from_fixtures("https://compras.example.gob.ar", vec![PAGE]);
        let items = scraper.fetch().await.unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].external_id.as_deref(), Some("4410"));
        assert_eq!(items[0].title, "Servicio de análisis de ADN");
        assert_eq!(
            items[0].published_at.unwrap().to_rfc3339(),
            "2026-08-21T00:00:00+00:00"
        );

        assert_eq!(items[1].external_id.as_deref(), Some("PBA-77"));
        assert_eq!(
            items[1].url,
            "https://compras.example.gob.ar/licitaciones/PBA-77"
        );
    }

    #[tokio::test]
    async fn wrapped_envelope_is_accepted() {
        let wrapped = r#"{"data": {"items": [{"titulo": "Compra de reactivos", "link": "https://x.gob.ar/1"}]}}"#;
        let scraper = ProvincialPortalScraper::from_fixtures("https://x.gob.ar", vec![wrapped]);
        let items = scraper.fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Compra de reactivos");
    }

    #[tokio::test]
    async fn garbage_page_is_a_markup_error() {
        let scraper = ProvincialPortalScraper::from_fixtures("https://x.gob.ar", vec!["<html>"]);
        assert!(matches!(
            scraper.fetch().await.unwrap_err(),
            FetchError::Markup(_)
        ));
    }
}
