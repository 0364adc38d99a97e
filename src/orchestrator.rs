// src/orchestrator.rs
//! One monitoring cycle: fetch enabled portals concurrently, dedup, score,
//! persist, notify, and close out the run record.
//!
//! Failure containment follows the run taxonomy: portal fetch errors stay
//! inside `Run::portals_failed`, malformed items are skipped and counted,
//! and only store errors fail the run. A failed run discards its staged
//! results; the next cycle rescrapes them because nothing was marked seen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::{Mutex, Semaphore};

use crate::config::PipelineConfig;
use crate::dedup::{content_hash, Deduplicator};
use crate::error::{FetchError, StoreError};
use crate::matcher::{rank, KeywordMatcher};
use crate::model::{Listing, ListingStatus, Portal, Run, RunStatus, RunTrigger};
use crate::notify::AlertSink;
use crate::scrape::{
    count_portal_error, ensure_metrics_described, normalize_raw, PortalScraper, ScraperRegistry,
};
use crate::store::Store;

/// Result of a `run_once` request. A trigger arriving while a run is active
/// is coalesced into `AlreadyRunning`: the in-flight run covers the same
/// ground, so nothing is queued.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Run),
    AlreadyRunning,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    registry: ScraperRegistry,
    notifier: Arc<dyn AlertSink>,
    cfg: PipelineConfig,
    /// Single-flight guard: the only path that starts a run is `run_once`,
    /// and it must hold this for the run's whole lifetime.
    run_lock: Mutex<()>,
    run_seq: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        registry: ScraperRegistry,
        notifier: Arc<dyn AlertSink>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            cfg,
            run_lock: Mutex::new(()),
            run_seq: AtomicU64::new(1),
        }
    }

    pub async fn run_once(&self, trigger: RunTrigger) -> RunOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::info!(target: "pipeline", ?trigger, "run already active, trigger coalesced");
            return RunOutcome::AlreadyRunning;
        };
        ensure_metrics_described();

        let id = self.run_seq.fetch_add(1, Ordering::SeqCst);
        let mut run = Run::begin(id, trigger, Utc::now());
        tracing::info!(target: "pipeline", run = run.id, ?trigger, "run started");

        if let Err(e) = self.execute(&mut run).await {
            tracing::error!(target: "pipeline", run = run.id, error = %e, "run failed at persistence");
            run.status = RunStatus::Failed;
        }
        run.finished_at = Some(Utc::now());
        counter!("monitor_runs_total").increment(1);

        // Best effort: a run record we cannot write is only an observability gap.
        if let Err(e) = self.store.save_run(&run).await {
            tracing::error!(target: "pipeline", run = run.id, error = %e, "run record not persisted");
        }

        tracing::info!(
            target: "pipeline",
            run = run.id,
            status = ?run.status,
            found = run.listings_found,
            new = run.listings_new,
            portals_failed = run.portals_failed.len(),
            "run finished"
        );
        RunOutcome::Completed(run)
    }

    async fn execute(&self, run: &mut Run) -> Result<(), StoreError> {
        // Snapshot configuration at run start; mid-run changes affect the
        // next run only.
        let portals = self.store.load_enabled_portals().await?;
        let vocabulary = self.store.load_vocabulary().await?;
        let matcher = KeywordMatcher::new(&vocabulary);
        if matcher.is_empty() {
            tracing::warn!(target: "pipeline", run = run.id, "empty vocabulary, all listings will score 0");
        }

        let jobs = self.resolve_scrapers(run, portals);
        let results = self.fetch_all(&jobs).await;

        // Results are processed in portal order regardless of fetch
        // completion order, so identical input yields identical output.
        let now = Utc::now();
        let mut dedup = Deduplicator::new(self.store.clone());
        let mut staged: Vec<Listing> = Vec::new();
        let mut touched: Vec<(i64, String)> = Vec::new();

        for ((portal, _), result) in jobs.iter().zip(results) {
            run.portals_attempted += 1;
            let raw_items = match result {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(
                        target: "pipeline",
                        run = run.id,
                        portal = %portal.short_name,
                        error = %e,
                        "portal fetch failed"
                    );
                    count_portal_error();
                    run.portals_failed.insert(portal.id);
                    continue;
                }
            };
            counter!("monitor_listings_found_total").increment(raw_items.len() as u64);

            for raw in raw_items {
                run.listings_found += 1;
                let norm = match normalize_raw(raw) {
                    Ok(norm) => norm,
                    Err(e) => {
                        tracing::debug!(
                            target: "pipeline",
                            portal = %portal.short_name,
                            error = %e,
                            "raw item skipped"
                        );
                        counter!("monitor_malformed_listings_total").increment(1);
                        continue;
                    }
                };
                let hash = content_hash(portal.id, &norm.title, &norm.body);
                if dedup.is_new(portal.id, &hash).await? {
                    let outcome = matcher.score(&norm.title, &norm.body);
                    staged.push(Listing {
                        external_id: norm.external_id,
                        portal_id: portal.id,
                        title: norm.title,
                        body: norm.body,
                        published_at: norm.published_at,
                        url: norm.url,
                        content_hash: hash.clone(),
                        relevance_score: outcome.score,
                        matched_keywords: outcome.matched,
                        status: ListingStatus::New,
                        first_seen_at: now,
                        last_seen_at: now,
                    });
                    dedup.record_seen(portal.id, &hash);
                    run.listings_new += 1;
                } else {
                    // Known content: refresh last_seen_at only. No
                    // re-scoring, no re-alerting.
                    touched.push((portal.id, hash));
                }
            }
        }

        // Rank before persisting so the stored order matches alert order.
        rank(&mut staged);
        self.store.save_listings(&staged).await?;
        for (portal_id, hash) in &touched {
            self.store.touch_listing(*portal_id, hash, now).await?;
        }
        counter!("monitor_listings_new_total").increment(staged.len() as u64);

        self.send_alerts(run, &staged).await;

        let failed = run.portals_failed.len() as u32;
        run.status = if run.portals_attempted > 0 && failed == run.portals_attempted {
            RunStatus::Failed
        } else if failed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        Ok(())
    }

    /// Resolve each portal's scraper. Unknown kinds disable the portal for
    /// this run; invalid configs of known kinds are per-portal failures.
    fn resolve_scrapers(
        &self,
        run: &mut Run,
        portals: Vec<Portal>,
    ) -> Vec<(Portal, Arc<dyn PortalScraper>)> {
        let mut jobs = Vec::with_capacity(portals.len());
        for portal in portals {
            match self.registry.build(&portal) {
                None => {
                    tracing::warn!(
                        target: "pipeline",
                        portal = %portal.short_name,
                        kind = %portal.scraper_kind,
                        known = ?self.registry.known_kinds(),
                        "unknown scraper kind, portal disabled for this run"
                    );
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        target: "pipeline",
                        portal = %portal.short_name,
                        error = %e,
                        "scraper construction failed"
                    );
                    count_portal_error();
                    run.portals_attempted += 1;
                    run.portals_failed.insert(portal.id);
                }
                Some(Ok(scraper)) => jobs.push((portal, scraper)),
            }
        }
        jobs
    }

    /// Fetch all portals concurrently, bounded by the configured limit and
    /// per-fetch timeout. Results come back in job order.
    async fn fetch_all(
        &self,
        jobs: &[(Portal, Arc<dyn PortalScraper>)],
    ) -> Vec<Result<Vec<crate::scrape::RawListing>, FetchError>> {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrent_fetches));
        let timeout = self.cfg.fetch_timeout;

        let handles: Vec<_> = jobs
            .iter()
            .map(|(_, scraper)| {
                let scraper = scraper.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    // The semaphore lives for the whole fetch phase and is
                    // never closed.
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    match tokio::time::timeout(timeout, scraper.fetch()).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout(timeout)),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Markup(format!("fetch task aborted: {e}"))),
            });
        }
        results
    }

    /// Alert on the new listings at or above the threshold. Zero-score
    /// listings are persisted for audit but never alerted. Delivery failure
    /// only flags the run: the listings are already durable.
    async fn send_alerts(&self, run: &mut Run, staged: &[Listing]) {
        if !self.cfg.alerts_enabled {
            return;
        }
        let alertable: Vec<Listing> = staged
            .iter()
            .filter(|l| l.relevance_score > 0 && l.relevance_score >= self.cfg.alert_threshold)
            .cloned()
            .collect();
        if alertable.is_empty() {
            return;
        }
        if let Err(e) = self.notifier.notify(&alertable).await {
            tracing::warn!(target: "pipeline", run = run.id, error = %e, "alert delivery failed");
            run.notify_failed = true;
        }
    }
}
