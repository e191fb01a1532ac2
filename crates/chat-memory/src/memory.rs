use serde::{Deserialize, Serialize};
use dashmap::DashMap;
use std::sync::Arc;

/// One conversational turn. The coordinator and stores move records around
/// without inspecting them; `metadata` carries whatever structured payload
/// the serving layer attaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Record {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            metadata: None,
        }
    }
}

/// Volatile ordered per-session record list.
///
/// Keyed by session id alone — owner scoping applies to durable lookups only,
/// so two owners reusing the same session id share a working set. The durable
/// store is the safety net that keeps their histories apart.
pub trait FastStore: Send + Sync {
    /// Append to the end of the session's list, preserving FIFO order.
    fn append(&self, session_id: &str, record: Record) -> anyhow::Result<()>;
    /// Oldest-first contents; empty if the session has no entry.
    fn fetch_all(&self, session_id: &str) -> anyhow::Result<Vec<Record>>;
    /// Keep only the most recent `limit` records.
    fn trim(&self, session_id: &str, limit: usize) -> anyhow::Result<()>;
    /// Remove the session entry entirely. Idempotent.
    fn delete(&self, session_id: &str) -> anyhow::Result<()>;
}

/// Persistent append log keyed by (owner, session), ordered by insertion.
pub trait DurableStore: Send + Sync {
    fn append(&self, owner_id: &str, session_id: &str, record: &Record) -> anyhow::Result<()>;
    fn fetch_all(&self, owner_id: &str, session_id: &str) -> anyhow::Result<Vec<Record>>;
    /// Remove the full history for the key, returning how many records went.
    fn delete_all(&self, owner_id: &str, session_id: &str) -> anyhow::Result<usize>;
}

/// Process-local fast store over a concurrent map. Loses everything on
/// restart, which is exactly the contract: the durable store is the source
/// of truth, this is the bounded performance cache in front of it.
#[derive(Clone)]
pub struct InMemoryFastStore {
    store: Arc<DashMap<String, Vec<Record>>>,
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently holding a working set.
    pub fn session_count(&self) -> usize {
        self.store.len()
    }
}

impl Default for InMemoryFastStore {
    fn default() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
        }
    }
}

impl FastStore for InMemoryFastStore {
    fn append(&self, session_id: &str, record: Record) -> anyhow::Result<()> {
        let mut entry = self.store.entry(session_id.to_string()).or_default();
        entry.push(record);
        Ok(())
    }

    fn fetch_all(&self, session_id: &str) -> anyhow::Result<Vec<Record>> {
        match self.store.get(session_id) {
            Some(records) => Ok(records.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn trim(&self, session_id: &str, limit: usize) -> anyhow::Result<()> {
        if let Some(mut entry) = self.store.get_mut(session_id) {
            let len = entry.len();
            if len > limit {
                entry.drain(..len - limit);
            }
        }
        Ok(())
    }

    fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        self.store.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str) -> Record {
        Record::user(content)
    }

    #[test]
    fn append_preserves_insertion_order() {
        let store = InMemoryFastStore::new();
        store.append("s1", record("a")).unwrap();
        store.append("s1", record("b")).unwrap();
        store.append("s1", record("c")).unwrap();

        let contents: Vec<String> = store
            .fetch_all("s1")
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn fetch_all_on_absent_session_is_empty() {
        let store = InMemoryFastStore::new();
        assert!(store.fetch_all("missing").unwrap().is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn trim_keeps_most_recent_records() {
        let store = InMemoryFastStore::new();
        for i in 0..5 {
            store.append("s1", record(&format!("m{}", i))).unwrap();
        }
        store.trim("s1", 2).unwrap();

        let contents: Vec<String> = store
            .fetch_all("s1")
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[test]
    fn trim_above_current_length_is_a_noop() {
        let store = InMemoryFastStore::new();
        store.append("s1", record("only")).unwrap();
        store.trim("s1", 10).unwrap();

        assert_eq!(store.fetch_all("s1").unwrap().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = InMemoryFastStore::new();
        store.append("s1", record("a")).unwrap();

        store.delete("s1").unwrap();
        store.delete("s1").unwrap();

        assert!(store.fetch_all("s1").unwrap().is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn sessions_are_independent() {
        let store = InMemoryFastStore::new();
        store.append("s1", record("one")).unwrap();
        store.append("s2", record("two")).unwrap();

        store.delete("s1").unwrap();

        assert!(store.fetch_all("s1").unwrap().is_empty());
        assert_eq!(store.fetch_all("s2").unwrap().len(), 1);
    }

    #[test]
    fn record_round_trips_through_json() {
        let original = Record {
            role: "user".to_string(),
            content: "hi".to_string(),
            metadata: Some(serde_json::json!({"client": "web"})),
        };

        let encoded = serde_json::to_string(&original).unwrap();
        let decoded: Record = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, original);
    }
}
