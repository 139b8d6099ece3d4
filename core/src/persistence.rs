//! Persistence collaborators.
//!
//! RULE: The core only ever calls `get(key)` / `set(key, blob)` with JSON
//! blobs. It never assumes a backend. SQLite and in-memory stores are
//! provided; hosts may plug in their own.

use crate::error::SimResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

pub trait KvStore: Send {
    fn get(&self, key: &str) -> SimResult<Option<String>>;
    fn set(&mut self, key: &str, blob: &str) -> SimResult<()>;
}

/// Process-local store (tests, headless runs without `--db`).
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blobs: HashMap<String, String>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> u64 {
        self.writes
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> SimResult<Option<String>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> SimResult<()> {
        self.blobs.insert(key.to_string(), blob.to_string());
        self.writes += 1;
        Ok(())
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is best-effort; the default journal still works.
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
            log::warn!("{path}: WAL unavailable, using default journal: {e}");
        }
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let store = Self { conn: Connection::open_in_memory()? };
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_kv_store.sql"))?;
        Ok(())
    }

    pub fn key_count(&self) -> SimResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv_blob", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> SimResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_blob WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, blob: &str) -> SimResult<()> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO kv_blob (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, blob, now],
        )?;
        Ok(())
    }
}
