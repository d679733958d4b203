//! Messaging transport contract.

use std::future::Future;

use thiserror::Error;

use nudge_core::types::UserId;

/// Why an outbound message could not be delivered.
///
/// Callers branch on the kind: a transient failure is worth retrying on a
/// later tick, a permanently unreachable recipient never is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient will never be reachable again (e.g. they blocked the
    /// sender or the chat no longer exists).
    #[error("recipient unreachable: {0}")]
    RecipientUnreachable(String),

    /// Anything else: network trouble, rate limiting, server errors.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// One selectable option in a presented choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    /// Human-visible label.
    pub label: String,
    /// Payload returned when the option is chosen.
    pub data: String,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Outbound messaging contract consumed by intake and the scheduler.
///
/// `present_choice` only presents the prompt; the user's selection arrives
/// later as a separate inbound event.
pub trait MessageTransport: Send + Sync {
    /// Deliver a plain text message to a user.
    fn send(
        &self,
        user_id: UserId,
        text: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Present a prompt with a set of tappable options.
    fn present_choice(
        &self,
        user_id: UserId,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
