use crate::memory::{DurableStore, Record};
use crate::memory_db::schema::StoredRecord;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::{debug, info, warn};
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Owner-scoped append log over SQLite. Insertion id is the ordering key;
/// the record payload is stored as JSON text and passed through unchanged.
#[derive(Clone)]
pub struct HistoryStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl HistoryStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn append_record(
        &self,
        owner_id: &str,
        session_id: &str,
        record: &Record,
    ) -> anyhow::Result<i64> {
        let conn = self.get_conn()?;
        let payload = serde_json::to_string(record)
            .map_err(|e| anyhow::anyhow!("Record is not serializable: {}", e))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (owner_id, session_id, record, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, session_id, payload, now],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn fetch_records(&self, owner_id: &str, session_id: &str) -> anyhow::Result<Vec<Record>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT record FROM messages
             WHERE owner_id = ?1 AND session_id = ?2
             ORDER BY id",
        )?;
        let mut rows = stmt.query(params![owner_id, session_id])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            let record: Record = serde_json::from_str(&payload)
                .map_err(|e| anyhow::anyhow!("Corrupt record payload: {}", e))?;
            records.push(record);
        }

        debug!("Fetched {} records for owner {} session {}", records.len(), owner_id, session_id);
        Ok(records)
    }

    /// Full rows including insertion id and timestamp, for the history API.
    pub fn fetch_stored(
        &self,
        owner_id: &str,
        session_id: &str,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, session_id, record, created_at FROM messages
             WHERE owner_id = ?1 AND session_id = ?2
             ORDER BY id",
        )?;
        let mut rows = stmt.query(params![owner_id, session_id])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            let payload: String = row.get(3)?;
            let record: Record = serde_json::from_str(&payload)
                .map_err(|e| anyhow::anyhow!("Corrupt record payload: {}", e))?;

            let created_at = Self::parse_datetime_safe(&row.get::<_, String>(4)?)
                .unwrap_or_else(|| { warn!("Failed parse created_at"); Utc::now() });

            records.push(StoredRecord {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                session_id: row.get(2)?,
                record,
                created_at,
            });
        }

        Ok(records)
    }

    pub fn delete_history(&self, owner_id: &str, session_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM messages WHERE owner_id = ?1 AND session_id = ?2",
            params![owner_id, session_id],
        )?;
        info!("Deleted {} records for owner {} session {}", deleted, owner_id, session_id);
        Ok(deleted)
    }

    fn parse_datetime_safe(datetime_str: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(datetime_str)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl DurableStore for HistoryStore {
    fn append(&self, owner_id: &str, session_id: &str, record: &Record) -> anyhow::Result<()> {
        self.append_record(owner_id, session_id, record)?;
        Ok(())
    }

    fn fetch_all(&self, owner_id: &str, session_id: &str) -> anyhow::Result<Vec<Record>> {
        self.fetch_records(owner_id, session_id)
    }

    fn delete_all(&self, owner_id: &str, session_id: &str) -> anyhow::Result<usize> {
        self.delete_history(owner_id, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::MemoryDatabase;

    fn record(role: &str, content: &str) -> Record {
        Record {
            role: role.to_string(),
            content: content.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn append_then_fetch_preserves_order() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        db.history.append_record("u1", "s1", &record("user", "first")).unwrap();
        db.history.append_record("u1", "s1", &record("assistant", "second")).unwrap();
        db.history.append_record("u1", "s1", &record("user", "third")).unwrap();

        let contents: Vec<String> = db
            .history
            .fetch_records("u1", "s1")
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn histories_are_scoped_by_owner() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        db.history.append_record("u1", "shared", &record("user", "from u1")).unwrap();
        db.history.append_record("u2", "shared", &record("user", "from u2")).unwrap();

        let u1 = db.history.fetch_records("u1", "shared").unwrap();
        let u2 = db.history.fetch_records("u2", "shared").unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].content, "from u1");
        assert_eq!(u2.len(), 1);
        assert_eq!(u2[0].content, "from u2");
    }

    #[test]
    fn fetch_on_unknown_key_is_empty() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        assert!(db.history.fetch_records("nobody", "nothing").unwrap().is_empty());
    }

    #[test]
    fn delete_history_reports_count_and_is_idempotent() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        db.history.append_record("u1", "s1", &record("user", "a")).unwrap();
        db.history.append_record("u1", "s1", &record("user", "b")).unwrap();

        assert_eq!(db.history.delete_history("u1", "s1").unwrap(), 2);
        assert_eq!(db.history.delete_history("u1", "s1").unwrap(), 0);
        assert!(db.history.fetch_records("u1", "s1").unwrap().is_empty());
    }

    #[test]
    fn metadata_survives_the_round_trip() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let original = Record {
            role: "user".to_string(),
            content: "hi".to_string(),
            metadata: Some(serde_json::json!({"client": "ios", "turn": 3})),
        };
        db.history.append_record("u1", "s1", &original).unwrap();

        let fetched = db.history.fetch_records("u1", "s1").unwrap();
        assert_eq!(fetched[0], original);
    }

    #[test]
    fn fetch_stored_carries_insertion_ids() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        db.history.append_record("u1", "s1", &record("user", "a")).unwrap();
        db.history.append_record("u1", "s1", &record("assistant", "b")).unwrap();

        let stored = db.history.fetch_stored("u1", "s1").unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored[0].id < stored[1].id);
        assert_eq!(stored[1].record.content, "b");
    }

    #[test]
    fn records_survive_database_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let db = MemoryDatabase::new(&path).unwrap();
            db.history.append_record("u1", "s1", &record("user", "durable")).unwrap();
        }

        let db = MemoryDatabase::new(&path).unwrap();
        let fetched = db.history.fetch_records("u1", "s1").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content, "durable");
    }
}
