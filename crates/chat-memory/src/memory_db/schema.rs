use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::Record;

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    record TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_owner_session
    ON messages (owner_id, session_id);
";

/// A record as it sits in the durable log, with its insertion id and
/// server-side timestamp. The payload itself stays opaque.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub owner_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub record: Record,
    pub created_at: DateTime<Utc>,
}
