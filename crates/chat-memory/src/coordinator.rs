//! Session memory lifecycle coordinator.
//!
//! Write-back policy between the fast store and the durable store: sessions
//! hydrate from durable history on load, accumulate turns in the bounded fast
//! working set, and flush back to durable storage at explicit backup points.
//! The coordinator is purely reactive — no timers, no retries, no internal
//! locking. Callers serialize operations per session and decide when to back
//! up (end of stream, disconnect, error).

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::memory::{DurableStore, FastStore, Record};

pub struct SessionMemoryCoordinator {
    fast: Arc<dyn FastStore>,
    durable: Arc<dyn DurableStore>,
    load_trim_limit: usize,
    active_trim_limit: usize,
}

impl SessionMemoryCoordinator {
    pub fn new(
        fast: Arc<dyn FastStore>,
        durable: Arc<dyn DurableStore>,
        load_trim_limit: usize,
        active_trim_limit: usize,
    ) -> Self {
        Self {
            fast,
            durable,
            load_trim_limit,
            active_trim_limit,
        }
    }

    pub fn from_config(fast: Arc<dyn FastStore>, durable: Arc<dyn DurableStore>, cfg: &Config) -> Self {
        Self::new(fast, durable, cfg.load_trim_limit, cfg.active_trim_limit)
    }

    /// Hydrate a session from durable history.
    ///
    /// Returns the full durable history while the fast store only retains the
    /// most recent `load_trim_limit` records: the caller gets everything for
    /// immediate prompt construction, the cache keeps a bounded window. A
    /// session with no durable history leaves the fast store untouched so
    /// that probing nonexistent sessions creates no empty keys.
    pub fn load_session(&self, owner_id: &str, session_id: &str) -> anyhow::Result<Vec<Record>> {
        let history = self.durable.fetch_all(owner_id, session_id)?;
        if history.is_empty() {
            debug!("No durable history for session {}, fast store untouched", session_id);
            return Ok(history);
        }

        for record in &history {
            self.fast.append(session_id, record.clone())?;
        }
        self.fast.trim(session_id, self.load_trim_limit)?;

        debug!(
            "Hydrated session {} from {} durable records (window {})",
            session_id,
            history.len(),
            self.load_trim_limit
        );
        Ok(history)
    }

    /// Append a turn to the session's working set, fast store only.
    ///
    /// Nothing is durable until the next `backup_session`; a crash in between
    /// loses every unflushed turn. `owner_id` is accepted for signature
    /// symmetry with the durable key scheme but the fast store keys by
    /// session id alone.
    pub fn record_message(
        &self,
        _owner_id: &str,
        session_id: &str,
        record: Record,
    ) -> anyhow::Result<()> {
        self.fast.append(session_id, record)?;
        self.fast.trim(session_id, self.active_trim_limit)?;
        Ok(())
    }

    /// Flush the working set to durable storage, then evict it.
    ///
    /// Records are appended one at a time in working-set order; there is no
    /// cross-record atomicity, so a failure mid-flush leaves a persisted
    /// prefix with the fast entry intact (the error propagates before the
    /// eviction). Calling this again with no intervening writes flushes an
    /// empty set and re-runs the idempotent eviction. Returns the number of
    /// records flushed.
    pub fn backup_session(&self, owner_id: &str, session_id: &str) -> anyhow::Result<usize> {
        let working_set = self.fast.fetch_all(session_id)?;
        for record in &working_set {
            self.durable.append(owner_id, session_id, record)?;
        }
        self.fast.delete(session_id)?;

        info!(
            "Backed up {} records for session {} (owner {})",
            working_set.len(),
            session_id,
            owner_id
        );
        Ok(working_set.len())
    }
}
