//! SQLite persistence layer.
//!
//! RULE: Only the store modules talk to the database.
//! Pipeline components call store methods — they never execute SQL directly.
//!
//! The store is shared between the API producer and the worker processes as
//! separate connections to the same file (WAL mode), which is why `reopen`
//! exists: each worker thread opens its own connection.

use crate::{
    error::PipelineResult,
    types::{UnixMillis, UserId},
};
use rusqlite::{params, Connection, OptionalExtension};

mod device;
mod job;
mod notification;
mod report;
mod station;
mod transaction;

pub use station::StationRow;

pub struct ComplianceStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for a file
}

impl ComplianceStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: concurrent readers while the producer or a worker writes.
        // Shared-memory and :memory: databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in unit-style tests; note that
    /// `reopen` on an in-memory store yields an isolated database).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// A new connection to the same database. Worker threads and the queue
    /// handle each get their own connection through this.
    pub fn reopen(&self) -> PipelineResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_reports.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_notifications.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_jobs.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Users ──────────────────────────────────────────────────

    pub fn insert_user(&self, name: &str, email: &str, role: &str, now: UnixMillis) -> PipelineResult<UserId> {
        self.conn.execute(
            "INSERT INTO user (name, email, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, email, role, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn user_exists(&self, user_id: UserId) -> PipelineResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM user WHERE id = ?1", params![user_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// First user carrying `role`, by rowid. Used to resolve the admin (and
    /// supervisor) notification targets.
    pub fn first_user_with_role(&self, role: &str) -> PipelineResult<Option<UserId>> {
        self.conn
            .query_row(
                "SELECT id FROM user WHERE role = ?1 ORDER BY id LIMIT 1",
                params![role],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}
