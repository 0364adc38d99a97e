// src/dedup.rs
//! Content fingerprinting and duplicate detection.
//!
//! A listing's identity is the SHA-256 of its whitespace-collapsed,
//! case-folded title and body, scoped by portal. External ids are never
//! trusted as identity: portals re-publish and recycle them.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::store::Store;

/// Collapse whitespace and case-fold, so re-scrapes that differ only in
/// formatting hash identically while any substantive edit does not.
fn fold_for_hash(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable content hash of a normalized listing. The portal id is part of the
/// key: identical text on two portals is two distinct listings.
pub fn content_hash(portal_id: i64, title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(portal_id.to_le_bytes());
    hasher.update([0x1f]);
    hasher.update(fold_for_hash(title).as_bytes());
    hasher.update([0x1f]);
    hasher.update(fold_for_hash(body).as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Duplicate detection across the store plus the current run. The in-run
/// seen-set catches portals returning the same listing twice within one
/// fetch window without a store round-trip; durable recording happens when
/// the staged listings are persisted.
pub struct Deduplicator {
    store: Arc<dyn Store>,
    seen_this_run: HashSet<(i64, String)>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            seen_this_run: HashSet::new(),
        }
    }

    /// True iff this hash has never been recorded for this portal.
    pub async fn is_new(&self, portal_id: i64, hash: &str) -> Result<bool, StoreError> {
        if self.seen_this_run.contains(&(portal_id, hash.to_string())) {
            return Ok(false);
        }
        Ok(!self.store.is_known_hash(portal_id, hash).await?)
    }

    /// Mark a hash as seen for the remainder of the run.
    pub fn record_seen(&mut self, portal_id: i64, hash: &str) {
        self.seen_this_run.insert((portal_id, hash.to_string()));
    }
}
