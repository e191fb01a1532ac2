//! Memory database module - SQLite-based durable storage for chat history
pub mod schema;
pub mod history_store;
pub use schema::*;
pub use history_store::HistoryStore;
use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

pub struct MemoryDatabase {
    pub history: HistoryStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening history database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            );
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        let pool = Arc::new(pool);
        info!("History database initialized successfully");
        Ok(Self {
            history: HistoryStore::new(Arc::clone(&pool)),
            pool,
        })
    }

    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        // A :memory: database lives and dies with its connection, so the
        // pool must hold exactly one.
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        let pool = Arc::new(pool);
        Ok(Self {
            history: HistoryStore::new(Arc::clone(&pool)),
            pool,
        })
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}
