//! Repository for SQLite-backed reminder persistence.
//!
//! Implements the reminder store contract: insert, due scan, and
//! idempotent delete, all against the shared `Database`.

use std::sync::Arc;

use nudge_core::error::NudgeError;
use nudge_core::types::{Reminder, UserId};

use crate::db::Database;

/// Repository for pending reminders.
///
/// Reminders are append-only: a row exists from the moment intake completes
/// until it is delivered (or the recipient turns out to be permanently
/// unreachable), at which point it is deleted.
#[derive(Clone)]
pub struct ReminderRepository {
    db: Arc<Database>,
}

impl ReminderRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new reminder and return its assigned id.
    ///
    /// `due_at` is stored exactly as given; validation happens at intake.
    /// Empty text is permitted.
    pub fn insert(&self, user_id: UserId, text: &str, due_at: &str) -> Result<i64, NudgeError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reminders (user_id, text, due_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, text, due_at],
            )
            .map_err(|e| NudgeError::Storage(format!("Failed to insert reminder: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Return all reminders whose due time is at or before `now`.
    ///
    /// `now` must be in the same `YYYY-MM-DD HH:MM` form the due times are
    /// stored in; the comparison goes through SQLite's datetime() on both
    /// sides. Each returned reminder can be deleted independently.
    pub fn due_before(&self, now: &str) -> Result<Vec<Reminder>, NudgeError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, text, due_at, created_at
                     FROM reminders
                     WHERE datetime(due_at) <= datetime(?1)
                     ORDER BY id ASC",
                )
                .map_err(|e| NudgeError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![now], |row| Ok(row_to_reminder(row)))
                .map_err(|e| NudgeError::Storage(e.to_string()))?;

            let mut reminders = Vec::new();
            for row in rows {
                let reminder = row.map_err(|e| NudgeError::Storage(e.to_string()))??;
                reminders.push(reminder);
            }
            Ok(reminders)
        })
    }

    /// Delete a reminder by id. Idempotent: deleting an unknown id is not
    /// an error.
    pub fn delete(&self, id: i64) -> Result<(), NudgeError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM reminders WHERE id = ?1",
                rusqlite::params![id],
            )
            .map_err(|e| NudgeError::Storage(format!("Failed to delete reminder: {}", e)))?;
            Ok(())
        })
    }

    /// Find a reminder by id.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Reminder>, NudgeError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, text, due_at, created_at
                     FROM reminders WHERE id = ?1",
                )
                .map_err(|e| NudgeError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id], |row| Ok(row_to_reminder(row)))
                .optional()
                .map_err(|e| NudgeError::Storage(e.to_string()))?;

            match result {
                Some(reminder) => Ok(Some(reminder?)),
                None => Ok(None),
            }
        })
    }

    /// Count all pending reminders.
    pub fn count(&self) -> Result<u64, NudgeError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))
                .map_err(|e| NudgeError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn row_to_reminder(row: &rusqlite::Row<'_>) -> Result<Reminder, NudgeError> {
    let id: i64 = row.get(0).map_err(|e| NudgeError::Storage(e.to_string()))?;
    let user_id: i64 = row.get(1).map_err(|e| NudgeError::Storage(e.to_string()))?;
    let text: String = row.get(2).map_err(|e| NudgeError::Storage(e.to_string()))?;
    let due_at: String = row.get(3).map_err(|e| NudgeError::Storage(e.to_string()))?;
    let created_at: String = row.get(4).map_err(|e| NudgeError::Storage(e.to_string()))?;

    Ok(Reminder {
        id,
        user_id,
        text,
        due_at,
        created_at,
    })
}

/// Extension trait for rusqlite to support optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
