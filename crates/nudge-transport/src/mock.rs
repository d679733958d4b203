//! Recording mock transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use nudge_core::types::UserId;

use crate::traits::{ChoiceOption, DeliveryError, MessageTransport};

/// Scripted outcome for `send` calls to a given user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Deliver normally (the default).
    Deliver,
    /// Fail with `RecipientUnreachable`.
    Unreachable,
    /// Fail with `Transient`.
    Transient,
}

/// One recorded `send` attempt (including failed ones).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub user_id: UserId,
    pub text: String,
}

/// One recorded `present_choice` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedChoice {
    pub user_id: UserId,
    pub prompt: String,
    pub options: Vec<ChoiceOption>,
}

/// Transport that records every outbound call and fails on script.
///
/// By default every send delivers. Per-user outcomes can be scripted to
/// exercise the unreachable/transient reconciliation paths.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    choices: Mutex<Vec<PresentedChoice>>,
    outcomes: Mutex<HashMap<UserId, SendOutcome>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of future `send` calls to `user_id`.
    pub fn set_outcome(&self, user_id: UserId, outcome: SendOutcome) {
        self.outcomes.lock().unwrap().insert(user_id, outcome);
    }

    /// All send attempts so far, failed ones included.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts of all send attempts to one user, in order.
    pub fn sent_texts_for(&self, user_id: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.text.clone())
            .collect()
    }

    /// All presented choices so far.
    pub fn choices(&self) -> Vec<PresentedChoice> {
        self.choices.lock().unwrap().clone()
    }
}

impl MessageTransport for RecordingTransport {
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(SentMessage {
            user_id,
            text: text.to_string(),
        });

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(SendOutcome::Deliver);

        match outcome {
            SendOutcome::Deliver => Ok(()),
            SendOutcome::Unreachable => Err(DeliveryError::RecipientUnreachable(
                "scripted: blocked".to_string(),
            )),
            SendOutcome::Transient => {
                Err(DeliveryError::Transient("scripted: timeout".to_string()))
            }
        }
    }

    async fn present_choice(
        &self,
        user_id: UserId,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), DeliveryError> {
        self.choices.lock().unwrap().push(PresentedChoice {
            user_id,
            prompt: prompt.to_string(),
            options: options.to_vec(),
        });
        Ok(())
    }
}
