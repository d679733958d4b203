//! Nudge Storage crate - SQLite persistence for pending reminders.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and the
//! `ReminderRepository` implementing the reminder store contract:
//! insert, due scan, and idempotent delete.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::ReminderRepository;
