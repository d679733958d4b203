use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque recipient handle. For the Telegram transport this is the chat id.
pub type UserId = i64;

/// The fixed textual format accepted for reminder due times.
///
/// Due times are stored and compared as strings in this format; they are
/// never normalized to a numeric epoch.
pub const DUE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

// =============================================================================
// Reminder
// =============================================================================

/// A persisted (user, text, due time) triple awaiting one-time delivery.
///
/// Reminders are immutable once inserted; the only mutation is deletion,
/// which happens after delivery or when the recipient is permanently
/// unreachable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Monotonically assigned storage id.
    pub id: i64,
    /// Recipient handle. Never null.
    pub user_id: UserId,
    /// Message body. May be empty (permissive by design).
    pub text: String,
    /// Due time as given by the user, in `YYYY-MM-DD HH:MM` form.
    pub due_at: String,
    /// Set once at insert.
    pub created_at: String,
}

// =============================================================================
// Intake events
// =============================================================================

/// The user's answer to the "is this transcript correct?" prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationChoice {
    /// Keep the transcribed text and move on to time entry.
    Confirm,
    /// Replace the transcribed text with the next free-text message.
    Edit,
}

impl ConfirmationChoice {
    /// Stable wire value carried in choice callbacks.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationChoice::Confirm => "confirm",
            ConfirmationChoice::Edit => "edit",
        }
    }

    /// Parse a choice callback payload. Unknown payloads yield `None`.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "confirm" => Some(ConfirmationChoice::Confirm),
            "edit" => Some(ConfirmationChoice::Edit),
            _ => None,
        }
    }
}

// =============================================================================
// Due-time validation
// =============================================================================

/// Why a candidate due-time string was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeValidationError {
    #[error("time does not match the {DUE_TIME_FORMAT} format")]
    Format,
    #[error("time is in the past")]
    Past,
}

/// Validate a candidate due time against the fixed format and the clock.
///
/// Accepts exactly `YYYY-MM-DD HH:MM`. A time equal to `now` is accepted;
/// anything strictly earlier is rejected.
pub fn parse_due_time(
    input: &str,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, TimeValidationError> {
    let parsed = NaiveDateTime::parse_from_str(input.trim(), DUE_TIME_FORMAT)
        .map_err(|_| TimeValidationError::Format)?;
    if parsed < now {
        return Err(TimeValidationError::Past);
    }
    Ok(parsed)
}
