//! Shared application state for the serving layer.
//!
//! Everything the handlers touch hangs off one Arc-cloned state value:
//! the coordinator with its injected stores, the durable database handle
//! for direct history reads, the LLM worker, and the request counters.

use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};

use crate::{
    config::Config,
    coordinator::SessionMemoryCoordinator,
    llm_worker::LlmWorker,
    memory::{DurableStore, FastStore, InMemoryFastStore},
    memory_db::MemoryDatabase,
};

/// Atomic counters for system metrics
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub recorded_messages: AtomicUsize,
    pub flushed_records: AtomicUsize,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicUsize::new(0),
            recorded_messages: AtomicUsize::new(0),
            flushed_records: AtomicUsize::new(0),
        }
    }

    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_recorded_messages(&self) -> usize {
        self.recorded_messages.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_flushed_records(&self, count: usize) -> usize {
        self.flushed_records.fetch_add(count, Ordering::Relaxed) + count
    }
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionMemoryCoordinator>,
    pub fast: Arc<dyn FastStore>,
    pub database: Arc<MemoryDatabase>,
    pub llm_worker: Arc<LlmWorker>,
    pub config: Arc<Config>,
    pub counters: Arc<AtomicCounters>,
}

impl AppState {
    pub fn new(config: Config, database: Arc<MemoryDatabase>) -> Self {
        let fast: Arc<dyn FastStore> = Arc::new(InMemoryFastStore::new());
        let durable: Arc<dyn DurableStore> = Arc::new(database.history.clone());
        let coordinator = Arc::new(SessionMemoryCoordinator::from_config(
            fast.clone(),
            durable,
            &config,
        ));
        let llm_worker = Arc::new(LlmWorker::new(
            config.llm_base_url.clone(),
            config.llm_model.clone(),
            config.llm_timeout_seconds,
        ));

        Self {
            coordinator,
            fast,
            database,
            llm_worker,
            config: Arc::new(config),
            counters: Arc::new(AtomicCounters::new()),
        }
    }
}
