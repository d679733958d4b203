//! Nudge Transport crate - messaging collaborator contract and adapters.
//!
//! Defines the `MessageTransport` trait the intake engine and delivery
//! scheduler talk to, the branchable `DeliveryError` distinguishing
//! permanently-unreachable recipients from transient failures, a Telegram
//! Bot API adapter, and a recording mock for tests.

pub mod mock;
pub mod telegram;
pub mod traits;

pub use mock::{RecordingTransport, SendOutcome};
pub use telegram::{InboundUpdate, TelegramTransport};
pub use traits::{ChoiceOption, DeliveryError, MessageTransport};
