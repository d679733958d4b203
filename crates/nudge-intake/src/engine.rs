//! Intake engine driving the create-reminder flow.
//!
//! Consumes the three inbound event kinds (transcript ready, confirmation
//! choice, free-text message), mutates the per-user conversation under its
//! session lock, and persists the reminder once a valid due time arrives.
//! Every recoverable failure is reported back to the user; nothing in here
//! aborts the process.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use nudge_core::types::{parse_due_time, ConfirmationChoice, TimeValidationError, UserId};
use nudge_store::ReminderRepository;
use nudge_transcribe::TranscribeError;
use nudge_transport::{ChoiceOption, MessageTransport};

use crate::state::{ConversationStore, IntakePhase};

/// A function returning the current wall-clock time for due-time
/// validation. Injectable so tests can pin the clock.
pub type ClockFn = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

const TIME_PROMPT: &str = "⏰ Enter the reminder time in this format:\n\
                           YYYY-MM-DD HH:MM\nExample: 2025-05-15 14:30";
const EDIT_PROMPT: &str = "Send the corrected reminder text:";
const TEXT_UPDATED_PROMPT: &str = "Text updated.\n⏰ Now enter the reminder time:\n\
                                   YYYY-MM-DD HH:MM";
const INVALID_TIME_PROMPT: &str = "⚠️ Invalid time!\n\
                                   Use the format YYYY-MM-DD HH:MM with a time that is not \
                                   in the past.\nExample: 2025-05-15 14:30";
const REPEAT_PROMPT: &str = "I could not understand that. Please send the voice note again.";
const PROCESSING_FAILED: &str = "Something went wrong processing the audio. \
                                 Please try again later.";
const STORAGE_FAILED: &str = "⚠️ Could not save the reminder. Please try again later.";

fn confirm_prompt(text: &str) -> String {
    format!("🔊 Recognized text:\n{text}\n\nIs this correct?")
}

fn saved_reply(text: &str, due_at: &str) -> String {
    format!("✅ Reminder saved!\n📝 Text: {text}\n⏰ Time: {due_at}")
}

/// The intake engine.
///
/// Generic over the messaging transport so tests can record outbound
/// traffic. Shared behind an `Arc`; each event handler takes `&self` and
/// serializes per-user work via the conversation session lock.
pub struct IntakeEngine<T: MessageTransport> {
    reminders: ReminderRepository,
    conversations: ConversationStore,
    transport: Arc<T>,
    clock: ClockFn,
}

impl<T: MessageTransport> IntakeEngine<T> {
    /// Create an engine using the local wall clock.
    pub fn new(reminders: ReminderRepository, transport: Arc<T>) -> Self {
        Self {
            reminders,
            conversations: ConversationStore::new(),
            transport,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the clock (tests pin it to a fixed instant).
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    /// Access the conversation store (for inspection and tests).
    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// A transcript attempt finished for `user_id`.
    ///
    /// On success the text is staged as the draft and the user is asked to
    /// confirm or edit it. On failure the user gets a message that
    /// distinguishes "please repeat" from "processing error"; the
    /// conversation is left untouched either way.
    pub async fn handle_transcript(
        &self,
        user_id: UserId,
        transcript: Result<String, TranscribeError>,
    ) {
        let text = match transcript {
            Ok(text) => text,
            Err(TranscribeError::Unintelligible) => {
                tracing::debug!(user_id, "Voice note was unintelligible");
                self.reply(user_id, REPEAT_PROMPT).await;
                return;
            }
            Err(TranscribeError::Processing(reason)) => {
                tracing::error!(user_id, reason = %reason, "Transcription processing failed");
                self.reply(user_id, PROCESSING_FAILED).await;
                return;
            }
        };

        let session = self.conversations.session(user_id);
        let mut convo = session.lock().await;
        convo.draft = Some(text.clone());
        convo.phase = IntakePhase::AwaitingConfirmation;
        tracing::debug!(user_id, phase = %convo.phase, "Transcript staged");

        let options = [
            ChoiceOption::new("✅ Yes, that's right", ConfirmationChoice::Confirm.as_str()),
            ChoiceOption::new("✏️ Edit text", ConfirmationChoice::Edit.as_str()),
        ];
        if let Err(e) = self
            .transport
            .present_choice(user_id, &confirm_prompt(&text), &options)
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to present confirmation choice");
        }
    }

    /// The user answered the confirm/edit prompt.
    pub async fn handle_choice(&self, user_id: UserId, choice: ConfirmationChoice) {
        let session = self.conversations.session(user_id);
        let mut convo = session.lock().await;

        match choice {
            ConfirmationChoice::Confirm => {
                convo.phase = IntakePhase::AwaitingTime;
                tracing::debug!(user_id, phase = %convo.phase, "Draft confirmed");
                self.reply(user_id, TIME_PROMPT).await;
            }
            ConfirmationChoice::Edit => {
                convo.phase = IntakePhase::EditingText;
                tracing::debug!(user_id, phase = %convo.phase, "Edit requested");
                self.reply(user_id, EDIT_PROMPT).await;
            }
        }
    }

    /// A free-text message arrived.
    ///
    /// While editing, it replaces the draft. Otherwise it is treated as the
    /// due-time candidate — even with no draft staged, in which case an
    /// empty-text reminder is stored (permissive by design).
    pub async fn handle_text(&self, user_id: UserId, text: &str) {
        let session = self.conversations.session(user_id);
        let mut convo = session.lock().await;

        if convo.phase == IntakePhase::EditingText {
            convo.draft = Some(text.to_string());
            convo.phase = IntakePhase::AwaitingTime;
            tracing::debug!(user_id, phase = %convo.phase, "Draft replaced");
            self.reply(user_id, TEXT_UPDATED_PROMPT).await;
            return;
        }

        let candidate = text.trim();
        let now = (self.clock)();
        if let Err(e) = parse_due_time(candidate, now) {
            match e {
                TimeValidationError::Format => {
                    tracing::debug!(user_id, input = candidate, "Due time has wrong format")
                }
                TimeValidationError::Past => {
                    tracing::debug!(user_id, input = candidate, "Due time is in the past")
                }
            }
            // Re-prompt; the draft and phase stay so the user can retry.
            self.reply(user_id, INVALID_TIME_PROMPT).await;
            return;
        }

        let draft = convo.draft.clone().unwrap_or_default();
        match self.reminders.insert(user_id, &draft, candidate) {
            Ok(id) => {
                tracing::info!(user_id, reminder_id = id, due_at = candidate, "Reminder persisted");
                convo.reset();
                self.reply(user_id, &saved_reply(&draft, candidate)).await;
            }
            Err(e) => {
                // Keep the draft so the user does not redo the voice input.
                tracing::error!(user_id, error = %e, "Failed to persist reminder");
                self.reply(user_id, STORAGE_FAILED).await;
            }
        }
    }

    async fn reply(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.transport.send(user_id, text).await {
            tracing::warn!(user_id, error = %e, "Failed to send reply");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;

    use nudge_store::Database;
    use nudge_transport::RecordingTransport;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    struct Harness {
        db: Arc<Database>,
        repo: ReminderRepository,
        transport: Arc<RecordingTransport>,
        engine: IntakeEngine<RecordingTransport>,
    }

    fn make_harness() -> Harness {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = ReminderRepository::new(Arc::clone(&db));
        let transport = Arc::new(RecordingTransport::new());
        let engine = IntakeEngine::new(repo.clone(), Arc::clone(&transport))
            .with_clock(Box::new(fixed_now));
        Harness {
            db,
            repo,
            transport,
            engine,
        }
    }

    #[tokio::test]
    async fn test_happy_path_persists_one_reminder() {
        let h = make_harness();

        h.engine.handle_transcript(42, Ok("buy milk".to_string())).await;
        h.engine.handle_choice(42, ConfirmationChoice::Confirm).await;
        h.engine.handle_text(42, "2099-01-01 09:00").await;

        assert_eq!(h.repo.count().unwrap(), 1);
        let due = h.repo.due_before("2099-01-01 09:00").unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, 42);
        assert_eq!(due[0].text, "buy milk");
        assert_eq!(due[0].due_at, "2099-01-01 09:00");

        // Conversation is reset.
        let convo = h.engine.conversations().snapshot(42).await;
        assert!(convo.draft.is_none());
        assert_eq!(convo.phase, IntakePhase::Idle);

        // The user got a confirmation echoing text and time.
        let texts = h.transport.sent_texts_for(42);
        let last = texts.last().unwrap();
        assert!(last.contains("buy milk"));
        assert!(last.contains("2099-01-01 09:00"));
    }

    #[tokio::test]
    async fn test_transcript_presents_confirm_and_edit() {
        let h = make_harness();

        h.engine.handle_transcript(1, Ok("call mom".to_string())).await;

        let choices = h.transport.choices();
        assert_eq!(choices.len(), 1);
        assert!(choices[0].prompt.contains("call mom"));
        let data: Vec<&str> = choices[0].options.iter().map(|o| o.data.as_str()).collect();
        assert_eq!(data, vec!["confirm", "edit"]);

        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.phase, IntakePhase::AwaitingConfirmation);
        assert_eq!(convo.draft.as_deref(), Some("call mom"));
    }

    #[tokio::test]
    async fn test_edit_path_replaces_text() {
        let h = make_harness();

        h.engine.handle_transcript(1, Ok("wrong".to_string())).await;
        h.engine.handle_choice(1, ConfirmationChoice::Edit).await;

        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.phase, IntakePhase::EditingText);

        h.engine.handle_text(1, "right").await;

        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.phase, IntakePhase::AwaitingTime);
        assert_eq!(convo.draft.as_deref(), Some("right"));

        h.engine.handle_text(1, "2099-01-01 09:00").await;

        let due = h.repo.due_before("2099-01-01 09:00").unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].text, "right");
    }

    #[tokio::test]
    async fn test_invalid_time_keeps_draft_and_state() {
        let h = make_harness();

        h.engine.handle_transcript(1, Ok("water plants".to_string())).await;
        h.engine.handle_choice(1, ConfirmationChoice::Confirm).await;
        h.engine.handle_text(1, "not-a-date").await;

        assert_eq!(h.repo.count().unwrap(), 0);
        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.phase, IntakePhase::AwaitingTime);
        assert_eq!(convo.draft.as_deref(), Some("water plants"));

        // The re-prompt names the expected format.
        let texts = h.transport.sent_texts_for(1);
        assert!(texts.last().unwrap().contains("YYYY-MM-DD HH:MM"));

        // A subsequent valid time succeeds with the original text.
        h.engine.handle_text(1, "2099-01-01 09:00").await;
        let due = h.repo.due_before("2099-01-01 09:00").unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].text, "water plants");
    }

    #[tokio::test]
    async fn test_past_time_is_rejected() {
        let h = make_harness();

        h.engine.handle_transcript(1, Ok("too late".to_string())).await;
        h.engine.handle_choice(1, ConfirmationChoice::Confirm).await;
        // Clock is pinned to 2025-01-01 12:00.
        h.engine.handle_text(1, "2024-12-31 23:59").await;

        assert_eq!(h.repo.count().unwrap(), 0);
        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.draft.as_deref(), Some("too late"));
    }

    #[tokio::test]
    async fn test_unintelligible_transcript_leaves_idle() {
        let h = make_harness();

        h.engine
            .handle_transcript(1, Err(TranscribeError::Unintelligible))
            .await;

        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.phase, IntakePhase::Idle);
        assert!(convo.draft.is_none());

        let texts = h.transport.sent_texts_for(1);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("again"));
    }

    #[tokio::test]
    async fn test_processing_failure_message_differs_from_repeat() {
        let h = make_harness();

        h.engine
            .handle_transcript(1, Err(TranscribeError::Unintelligible))
            .await;
        h.engine
            .handle_transcript(2, Err(TranscribeError::Processing("down".to_string())))
            .await;

        let repeat = h.transport.sent_texts_for(1);
        let failed = h.transport.sent_texts_for(2);
        assert_ne!(repeat[0], failed[0]);
    }

    #[tokio::test]
    async fn test_empty_draft_time_entry_stores_empty_text() {
        let h = make_harness();

        // No prior voice or confirmation step.
        h.engine.handle_text(9, "2099-01-01 09:00").await;

        let due = h.repo.due_before("2099-01-01 09:00").unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, 9);
        assert_eq!(due[0].text, "");
    }

    #[tokio::test]
    async fn test_storage_failure_preserves_draft() {
        let h = make_harness();

        h.engine.handle_transcript(1, Ok("keep me".to_string())).await;
        h.engine.handle_choice(1, ConfirmationChoice::Confirm).await;

        // Break the storage medium underneath the repository.
        h.db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE reminders")
                .map_err(|e| nudge_core::NudgeError::Storage(e.to_string()))
        })
        .unwrap();

        h.engine.handle_text(1, "2099-01-01 09:00").await;

        // Draft and phase survive so the user can retry later.
        let convo = h.engine.conversations().snapshot(1).await;
        assert_eq!(convo.phase, IntakePhase::AwaitingTime);
        assert_eq!(convo.draft.as_deref(), Some("keep me"));

        let texts = h.transport.sent_texts_for(1);
        assert!(texts.last().unwrap().contains("try again later"));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let h = make_harness();

        h.engine.handle_transcript(1, Ok("user one".to_string())).await;
        h.engine.handle_choice(1, ConfirmationChoice::Confirm).await;

        h.engine.handle_transcript(2, Ok("user two".to_string())).await;
        h.engine.handle_choice(2, ConfirmationChoice::Edit).await;

        let one = h.engine.conversations().snapshot(1).await;
        let two = h.engine.conversations().snapshot(2).await;
        assert_eq!(one.phase, IntakePhase::AwaitingTime);
        assert_eq!(one.draft.as_deref(), Some("user one"));
        assert_eq!(two.phase, IntakePhase::EditingText);
        assert_eq!(two.draft.as_deref(), Some("user two"));

        // User one finishing does not disturb user two.
        h.engine.handle_text(1, "2099-01-01 09:00").await;
        let two = h.engine.conversations().snapshot(2).await;
        assert_eq!(two.phase, IntakePhase::EditingText);
    }

    #[tokio::test]
    async fn test_due_at_is_stored_trimmed_as_given() {
        let h = make_harness();

        h.engine.handle_text(1, "  2099-01-01 09:00  ").await;

        let due = h.repo.due_before("2099-01-01 09:00").unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].due_at, "2099-01-01 09:00");
    }
}
