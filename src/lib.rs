// src/lib.rs
// Public library surface for integration tests (and embedding in a host service).

pub mod config;
pub mod dedup;
pub mod error;
pub mod matcher;
pub mod model;
pub mod orchestrator;
pub mod scheduler;
pub mod scrape;
pub mod store;

// Alert delivery (email + webhook sinks)
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::{MonitorConfig, PipelineConfig};
pub use crate::error::{FetchError, NormalizationError, NotifyError, StoreError};
pub use crate::model::{Keyword, Listing, Portal, Run, RunStatus, RunTrigger};
pub use crate::notify::{AlertSink, NotifierMux};
pub use crate::orchestrator::{Orchestrator, RunOutcome};
pub use crate::scheduler::Scheduler;
pub use crate::scrape::{PortalScraper, RawListing, ScraperRegistry};
pub use crate::store::{JsonStore, MemoryStore, Store};
