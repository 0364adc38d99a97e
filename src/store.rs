// src/store.rs
//! Persistence boundary. The pipeline consumes this narrow contract and
//! assumes each call is transactionally safe on its own; it never spans a
//! multi-call transaction over a whole run (crash mid-run is recovered by
//! the hash-known check on the next cycle).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{Keyword, Listing, Portal, Run};

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Enabled portals in stable processing order: level, then name, then id.
    async fn load_enabled_portals(&self) -> Result<Vec<Portal>, StoreError>;

    /// Vocabulary in stable evaluation order: priority desc, then term asc.
    async fn load_vocabulary(&self) -> Result<Vec<Keyword>, StoreError>;

    async fn is_known_hash(&self, portal_id: i64, hash: &str) -> Result<bool, StoreError>;

    /// Persist new listings; their hashes become known atomically with the write.
    async fn save_listings(&self, listings: &[Listing]) -> Result<(), StoreError>;

    /// Update `last_seen_at` of an already-known listing.
    async fn touch_listing(
        &self,
        portal_id: i64,
        hash: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn save_run(&self, run: &Run) -> Result<(), StoreError>;
}

fn sort_portals(portals: &mut Vec<Portal>) {
    portals.retain(|p| p.is_enabled);
    portals.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn sort_vocabulary(keywords: &mut [Keyword]) {
    keywords.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.term.cmp(&b.term)));
}

// ---------------------------------------------------------------------------
// In-memory store (tests, dry runs)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    portals: Vec<Portal>,
    keywords: Vec<Keyword>,
    listings: HashMap<(i64, String), Listing>,
    runs: Vec<Run>,
}

/// HashMap-backed store. Carries write-failure injection so tests can drive
/// the orchestrator's persistence-failure path.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub async fn set_portals(&self, portals: Vec<Portal>) {
        self.inner.write().await.portals = portals;
    }

    pub async fn set_keywords(&self, keywords: Vec<Keyword>) {
        self.inner.write().await.keywords = keywords;
    }

    /// When set, every mutating call fails with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn listings(&self) -> Vec<Listing> {
        let mut all: Vec<Listing> = self.inner.read().await.listings.values().cloned().collect();
        all.sort_by(|a, b| {
            a.portal_id
                .cmp(&b.portal_id)
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });
        all
    }

    pub async fn runs(&self) -> Vec<Run> {
        self.inner.read().await.runs.clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write failure injected".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn load_enabled_portals(&self) -> Result<Vec<Portal>, StoreError> {
        let mut portals = self.inner.read().await.portals.clone();
        sort_portals(&mut portals);
        Ok(portals)
    }

    async fn load_vocabulary(&self) -> Result<Vec<Keyword>, StoreError> {
        let mut keywords = self.inner.read().await.keywords.clone();
        sort_vocabulary(&mut keywords);
        Ok(keywords)
    }

    async fn is_known_hash(&self, portal_id: i64, hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .listings
            .contains_key(&(portal_id, hash.to_string())))
    }

    async fn save_listings(&self, listings: &[Listing]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        for listing in listings {
            inner
                .listings
                .insert((listing.portal_id, listing.content_hash.clone()), listing.clone());
        }
        Ok(())
    }

    async fn touch_listing(
        &self,
        portal_id: i64,
        hash: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if let Some(listing) = inner.listings.get_mut(&(portal_id, hash.to_string())) {
            listing.last_seen_at = seen_at;
        }
        Ok(())
    }

    async fn save_run(&self, run: &Run) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.write().await.runs.push(run.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON-file store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonState {
    #[serde(default)]
    portals: Vec<Portal>,
    #[serde(default)]
    keywords: Vec<Keyword>,
    #[serde(default)]
    listings: Vec<Listing>,
    #[serde(default)]
    runs: Vec<Run>,
}

struct JsonInner {
    state: JsonState,
    // Rebuilt on load, never serialized.
    hash_index: HashSet<(i64, String)>,
}

/// Whole-state JSON document on disk, rewritten after each mutating call.
/// Fits the hours-scale cadence and the modest listing volume of this
/// system; a database engine would slot in behind the same trait.
pub struct JsonStore {
    path: PathBuf,
    inner: RwLock<JsonInner>,
}

impl JsonStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => JsonState::default(),
            Err(e) => return Err(e.into()),
        };
        let hash_index = state
            .listings
            .iter()
            .map(|l| (l.portal_id, l.content_hash.clone()))
            .collect();
        Ok(Self {
            path,
            inner: RwLock::new(JsonInner { state, hash_index }),
        })
    }

    /// Replace the configuration entities (portal registry and/or
    /// vocabulary), leaving listings and run history untouched. `None`
    /// keeps the part already in the state file.
    pub async fn replace_registry(
        &self,
        portals: Option<Vec<Portal>>,
        keywords: Option<Vec<Keyword>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(portals) = portals {
            inner.state.portals = portals;
        }
        if let Some(keywords) = keywords {
            inner.state.keywords = keywords;
        }
        self.flush(&inner.state).await
    }

    async fn flush(&self, state: &JsonState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for JsonStore {
    async fn load_enabled_portals(&self) -> Result<Vec<Portal>, StoreError> {
        let mut portals = self.inner.read().await.state.portals.clone();
        sort_portals(&mut portals);
        Ok(portals)
    }

    async fn load_vocabulary(&self) -> Result<Vec<Keyword>, StoreError> {
        let mut keywords = self.inner.read().await.state.keywords.clone();
        sort_vocabulary(&mut keywords);
        Ok(keywords)
    }

    async fn is_known_hash(&self, portal_id: i64, hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .hash_index
            .contains(&(portal_id, hash.to_string())))
    }

    // Disk is the source of truth: a failed flush must leave the in-memory
    // state (hash index included) exactly as it was, or unwritten listings
    // would count as seen and never be rescraped.
    async fn save_listings(&self, listings: &[Listing]) -> Result<(), StoreError> {
        if listings.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        let base = inner.state.listings.len();
        inner.state.listings.extend_from_slice(listings);
        if let Err(e) = self.flush(&inner.state).await {
            inner.state.listings.truncate(base);
            return Err(e);
        }
        for listing in listings {
            inner
                .hash_index
                .insert((listing.portal_id, listing.content_hash.clone()));
        }
        Ok(())
    }

    async fn touch_listing(
        &self,
        portal_id: i64,
        hash: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let mut previous: Vec<(usize, DateTime<Utc>)> = Vec::new();
        for (idx, listing) in inner.state.listings.iter_mut().enumerate() {
            if listing.portal_id == portal_id && listing.content_hash == hash {
                previous.push((idx, listing.last_seen_at));
                listing.last_seen_at = seen_at;
            }
        }
        if previous.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.flush(&inner.state).await {
            for (idx, ts) in previous {
                inner.state.listings[idx].last_seen_at = ts;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn save_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.state.runs.push(run.clone());
        if let Err(e) = self.flush(&inner.state).await {
            inner.state.runs.pop();
            return Err(e);
        }
        Ok(())
    }
}
