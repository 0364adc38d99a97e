// src/scheduler.rs
//! Fixed-interval driver around the orchestrator. One background task owns
//! the timer; manual triggers ride the same loop, so the orchestrator's
//! single-flight rule applies to both uniformly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::model::RunTrigger;
use crate::orchestrator::Orchestrator;

pub struct Scheduler {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the scheduling loop. `run_on_startup` decides whether the first
    /// cycle fires immediately or after one full interval.
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        interval: Duration,
        run_on_startup: bool,
    ) -> Self {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !run_on_startup {
                // interval()'s first tick completes immediately; swallow it.
                ticker.tick().await;
            }
            tracing::info!(target: "scheduler", interval_secs = interval.as_secs(), "scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        orchestrator.run_once(RunTrigger::Scheduled).await;
                        drain_pending(&mut trigger_rx);
                    }
                    Some(()) = trigger_rx.recv() => {
                        orchestrator.run_once(RunTrigger::Manual).await;
                        drain_pending(&mut trigger_rx);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!(target: "scheduler", "scheduler stopped");
        });

        Self {
            trigger_tx,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Request an out-of-band run. A trigger arriving while a run is active
    /// is coalesced into that run, never queued behind it.
    pub fn trigger_now(&self) {
        // A full channel means a run request is already pending; drop ours.
        let _ = self.trigger_tx.try_send(());
    }

    /// Signal shutdown and wait for the loop to exit. An in-flight run
    /// finishes first: the loop only observes the signal between runs, so no
    /// run is abandoned mid-persist.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(target: "scheduler", error = %e, "scheduler task join failed");
            }
        }
    }
}

/// Discard trigger requests that arrived during the run that just finished;
/// that run already covered them.
fn drain_pending(rx: &mut mpsc::Receiver<()>) {
    while rx.try_recv().is_ok() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::model::RunStatus;
    use crate::notify::NotifierMux;
    use crate::scrape::ScraperRegistry;
    use crate::store::MemoryStore;

    fn orchestrator(store: Arc<MemoryStore>) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            store,
            ScraperRegistry::empty(),
            Arc::new(NotifierMux::default()),
            PipelineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn manual_trigger_runs_between_ticks() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = Scheduler::start(
            orchestrator(store.clone()),
            Duration::from_secs(3600),
            false,
        );

        scheduler.trigger_now();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let runs = store.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].trigger, RunTrigger::Manual);
        assert_eq!(runs[0].status, RunStatus::Success);
    }

    #[tokio::test]
    async fn run_on_startup_fires_immediately() {
        let store = Arc::new(MemoryStore::default());
        let scheduler =
            Scheduler::start(orchestrator(store.clone()), Duration::from_secs(3600), true);

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        let runs = store.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].trigger, RunTrigger::Scheduled);
    }

    #[tokio::test]
    async fn stop_without_any_run_returns() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = Scheduler::start(orchestrator(store), Duration::from_secs(3600), false);
        scheduler.stop().await;
    }
}
