// src/model.rs
//! Shared data model: portals, keywords, listings, runs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Administrative level of a portal. Sort order (national first) doubles as
/// the processing order within a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PortalLevel {
    National,
    Provincial,
    Municipal,
}

/// One configured procurement portal. `scraper_kind` must resolve to a
/// registered scraper; unknown kinds disable the portal for a run instead of
/// aborting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portal {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub url: String,
    pub level: PortalLevel,
    pub scraper_kind: String,
    /// Opaque per-portal configuration, interpreted only by the matching
    /// scraper factory (parsed into its typed config there).
    #[serde(default)]
    pub scraper_config: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// One weighted vocabulary entry. `priority` must be positive; higher means
/// more relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    #[serde(default)]
    pub category: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    New,
    Viewed,
    Favorited,
    Discarded,
}

/// A normalized procurement announcement. Produced only by the pipeline;
/// external consumers may mutate `status`, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub external_id: Option<String>,
    pub portal_id: i64,
    pub title: String,
    /// May be empty when the portal exposes only a title.
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
    /// Dedup identity key, see `dedup::content_hash`.
    pub content_hash: String,
    pub relevance_score: i64,
    /// Matched terms in vocabulary order, one entry per field hit.
    pub matched_keywords: Vec<String>,
    pub status: ListingStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

/// One orchestrator execution. Mutated only by the orchestrator; immutable
/// once `finished_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub portals_attempted: u32,
    pub portals_failed: BTreeSet<i64>,
    pub listings_found: u32,
    pub listings_new: u32,
    /// Set when alert delivery failed; never affects `status` (listings are
    /// already durable by the time notification happens).
    pub notify_failed: bool,
}

impl Run {
    pub fn begin(id: u64, trigger: RunTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            finished_at: None,
            trigger,
            status: RunStatus::Running,
            portals_attempted: 0,
            portals_failed: BTreeSet::new(),
            listings_found: 0,
            listings_new: 0,
            notify_failed: false,
        }
    }
}
