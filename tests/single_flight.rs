// tests/single_flight.rs
//! Only one run may be active at a time: concurrent triggers coalesce and
//! leave no duplicate-run artifacts behind.

use std::sync::Arc;
use std::time::Duration;

use licita_monitor::config::PipelineConfig;
use licita_monitor::error::FetchError;
use licita_monitor::model::{Portal, PortalLevel, RunTrigger};
use licita_monitor::notify::NotifierMux;
use licita_monitor::orchestrator::{Orchestrator, RunOutcome};
use licita_monitor::scheduler::Scheduler;
use licita_monitor::scrape::{PortalScraper, RawListing, ScraperRegistry};
use licita_monitor::store::MemoryStore;

struct SlowScraper;

#[async_trait::async_trait]
impl PortalScraper for SlowScraper {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(vec![RawListing {
            external_id: Some("slow-1".into()),
            title: "Licitación de equipamiento pericial".into(),
            body: String::new(),
            published_at: None,
            url: "https://example.gov.ar/slow-1".into(),
        }])
    }
    fn kind(&self) -> &'static str {
        "slow"
    }
}

fn build_orchestrator(store: Arc<MemoryStore>) -> Arc<Orchestrator> {
    let mut registry = ScraperRegistry::empty();
    registry.register("slow", |_p| {
        Ok(Arc::new(SlowScraper) as Arc<dyn PortalScraper>)
    });
    Arc::new(Orchestrator::new(
        store,
        registry,
        Arc::new(NotifierMux::default()),
        PipelineConfig::default(),
    ))
}

fn slow_portal() -> Portal {
    Portal {
        id: 1,
        name: "Lento".into(),
        short_name: "lento".into(),
        url: "https://lento.example.gov.ar".into(),
        level: PortalLevel::Municipal,
        scraper_kind: "slow".into(),
        scraper_config: serde_json::Value::Null,
        is_enabled: true,
    }
}

#[tokio::test]
async fn trigger_during_active_run_is_coalesced() {
    let store = Arc::new(MemoryStore::default());
    store.set_portals(vec![slow_portal()]).await;
    let orchestrator = build_orchestrator(store.clone());

    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_once(RunTrigger::Scheduled).await })
    };
    // let the first run take the lock and get into its slow fetch
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = orchestrator.run_once(RunTrigger::Manual).await;
    assert!(matches!(second, RunOutcome::AlreadyRunning));

    let first = background.await.unwrap();
    let RunOutcome::Completed(run) = first else {
        panic!("first run should complete");
    };
    assert_eq!(run.listings_new, 1);

    // exactly one run record and no double-counted listing
    assert_eq!(store.runs().await.len(), 1);
    assert_eq!(store.listings().await.len(), 1);
}

#[tokio::test]
async fn lock_is_released_between_runs() {
    let store = Arc::new(MemoryStore::default());
    store.set_portals(vec![slow_portal()]).await;
    let orchestrator = build_orchestrator(store.clone());

    let first = orchestrator.run_once(RunTrigger::Manual).await;
    assert!(matches!(first, RunOutcome::Completed(_)));

    let second = orchestrator.run_once(RunTrigger::Manual).await;
    let RunOutcome::Completed(run) = second else {
        panic!("second run should not be coalesced once the first finished");
    };
    // same content seen again: dedup keeps listings_new at zero
    assert_eq!(run.listings_new, 0);
    assert_eq!(store.runs().await.len(), 2);
}

#[tokio::test]
async fn trigger_during_scheduled_run_is_not_queued() {
    let store = Arc::new(MemoryStore::default());
    store.set_portals(vec![slow_portal()]).await;
    let orchestrator = build_orchestrator(store.clone());

    // run_on_startup puts the scheduler inside its slow first run right away
    let scheduler = Scheduler::start(orchestrator, Duration::from_secs(3600), true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    scheduler.trigger_now();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop().await;

    // the in-flight run covers the trigger: no second run after it
    assert_eq!(store.runs().await.len(), 1);
    assert_eq!(store.listings().await.len(), 1);
}

#[tokio::test]
async fn trigger_while_idle_still_runs() {
    let store = Arc::new(MemoryStore::default());
    store.set_portals(vec![slow_portal()]).await;
    let orchestrator = build_orchestrator(store.clone());

    let scheduler = Scheduler::start(orchestrator, Duration::from_secs(3600), false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    scheduler.trigger_now();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop().await;

    assert_eq!(store.runs().await.len(), 1);
}
