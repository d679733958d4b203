//! Per-user conversation state for reminder intake.
//!
//! Each user has at most one in-flight reminder draft. The intake flow
//! moves through:
//! - Idle -> AwaitingConfirmation (transcript staged)
//! - AwaitingConfirmation -> AwaitingTime (user confirmed the text)
//! - AwaitingConfirmation -> EditingText (user asked to edit)
//! - EditingText -> AwaitingTime (replacement text received)
//! - any -> Idle (reminder persisted; conversation cleared)
//!
//! State is in-memory only; a restart loses not-yet-persisted drafts,
//! which is an accepted limitation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use nudge_core::types::UserId;

/// Where a user currently is in the intake flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IntakePhase {
    /// No reminder in progress.
    #[default]
    Idle,
    /// A transcript is staged; waiting for the confirm/edit choice.
    AwaitingConfirmation,
    /// The next free-text message replaces the draft.
    EditingText,
    /// The next free-text message is interpreted as the due time.
    AwaitingTime,
}

impl fmt::Display for IntakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakePhase::Idle => write!(f, "Idle"),
            IntakePhase::AwaitingConfirmation => write!(f, "AwaitingConfirmation"),
            IntakePhase::EditingText => write!(f, "EditingText"),
            IntakePhase::AwaitingTime => write!(f, "AwaitingTime"),
        }
    }
}

/// The staging area for one user's not-yet-persisted reminder.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Draft reminder text, set after transcription or an edit.
    pub draft: Option<String>,
    /// Current intake phase.
    pub phase: IntakePhase,
}

impl Conversation {
    /// Clear the conversation back to its empty state.
    pub fn reset(&mut self) {
        self.draft = None;
        self.phase = IntakePhase::Idle;
    }
}

/// In-memory conversation store keyed by user.
///
/// Hands out per-user session handles; holding the session's async lock
/// while processing an event serializes all intake transitions for that
/// user, while different users proceed concurrently. Sessions are created
/// lazily on first interaction and live for the process lifetime.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: Mutex<HashMap<UserId, Arc<AsyncMutex<Conversation>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily create) the session handle for a user.
    pub fn session(&self, user_id: UserId) -> Arc<AsyncMutex<Conversation>> {
        // A panic while holding the lock cannot leave the map half-updated
        // (the critical section is a single entry lookup), so a poisoned
        // lock is recovered rather than propagated.
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.entry(user_id).or_default().clone()
    }

    /// Snapshot a user's conversation (for inspection and tests).
    pub async fn snapshot(&self, user_id: UserId) -> Conversation {
        let session = self.session(user_id);
        let convo = session.lock().await;
        convo.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
