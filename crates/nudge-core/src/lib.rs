pub mod config;
pub mod error;
pub mod types;

pub use config::NudgeConfig;
pub use error::{NudgeError, Result};
pub use types::*;
