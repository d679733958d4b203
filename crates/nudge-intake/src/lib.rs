//! Nudge Intake crate - conversational reminder intake.
//!
//! Provides the per-user conversation state (explicit phase enum plus the
//! staged draft text) and the `IntakeEngine` that advances a user through
//! confirm -> edit -> time-entry -> persisted. All transitions for one
//! user are serialized behind that user's session lock.

pub mod engine;
pub mod state;

pub use engine::IntakeEngine;
pub use state::{Conversation, ConversationStore, IntakePhase};
