//! Tender monitor binary entrypoint.
//! Seeds the portal registry and vocabulary from JSON files, then hands the
//! loop to the scheduler until ctrl-c.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use licita_monitor::config::MonitorConfig;
use licita_monitor::model::{Keyword, Portal};
use licita_monitor::notify::NotifierMux;
use licita_monitor::orchestrator::Orchestrator;
use licita_monitor::scheduler::Scheduler;
use licita_monitor::scrape::ScraperRegistry;
use licita_monitor::store::{JsonStore, Store};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("licita_monitor=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => {
            let parsed = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(parsed))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = MonitorConfig::from_env();
    let store = Arc::new(
        JsonStore::open(&cfg.state_path)
            .await
            .context("opening state store")?,
    );

    // Declarative registry files override whatever the state file carried.
    let portals: Option<Vec<Portal>> = read_json(&cfg.portals_file).await?;
    let keywords: Option<Vec<Keyword>> = read_json(&cfg.keywords_file).await?;
    if portals.is_some() || keywords.is_some() {
        store
            .replace_registry(portals, keywords)
            .await
            .context("seeding registry")?;
    }

    let enabled = store.load_enabled_portals().await?;
    if enabled.is_empty() {
        tracing::warn!("no enabled portals configured, runs will be empty");
    } else {
        tracing::info!(portals = enabled.len(), "portal registry loaded");
    }

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        ScraperRegistry::default(),
        Arc::new(NotifierMux::from_env()),
        cfg.pipeline.clone(),
    ));
    let scheduler = Scheduler::start(orchestrator, cfg.scan_interval, cfg.scan_on_startup);

    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
    tracing::info!("shutdown requested, waiting for in-flight run");
    scheduler.stop().await;
    Ok(())
}
