//! Nudge application binary - composition root.
//!
//! Ties together all Nudge crates into a single executable:
//! 1. Load configuration from TOML and read the bot token from the environment
//! 2. Initialize storage (SQLite reminder store)
//! 3. Start the background delivery scheduler
//! 4. Run the long-poll update loop, routing each inbound event into the
//!    intake engine

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nudge_core::config::{bot_token_from_env, NudgeConfig};
use nudge_intake::IntakeEngine;
use nudge_scheduler::DeliveryRunner;
use nudge_store::{Database, ReminderRepository};
use nudge_transcribe::{
    GoogleTranscriptionService, MockTranscriptionService, TranscribeError, TranscriptionService,
};
use nudge_transport::{InboundUpdate, MessageTransport, TelegramTransport};

/// Greeting sent in response to /start.
const WELCOME: &str = "Hi! 👋 Send me a voice note describing what you want to be \
reminded about, and I'll take it from there.";

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY_SECS: u64 = 5;

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (NUDGE_CONFIG env, or ~/.nudge/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("NUDGE_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".nudge").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Route one inbound update into the intake engine.
///
/// Runs on its own task so a slow voice download never stalls the poll loop.
async fn handle_update<S: TranscriptionService>(
    update: InboundUpdate,
    engine: Arc<IntakeEngine<TelegramTransport>>,
    transport: Arc<TelegramTransport>,
    transcriber: Arc<S>,
    language: String,
) {
    match update {
        InboundUpdate::Command { user_id, command } => {
            if command == "start" {
                if let Err(e) = transport.send(user_id, WELCOME).await {
                    tracing::warn!(user_id, error = %e, "Failed to send welcome message");
                }
            } else {
                tracing::debug!(user_id, command = %command, "Ignoring unknown command");
            }
        }
        InboundUpdate::Text { user_id, text } => {
            engine.handle_text(user_id, &text).await;
        }
        InboundUpdate::Voice { user_id, file_id } => {
            let transcript = match transport.download_voice(&file_id).await {
                Ok(audio) => transcriber.transcribe(&audio, &language).await,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Voice download failed");
                    Err(TranscribeError::Processing(e.to_string()))
                }
            };
            engine.handle_transcript(user_id, transcript).await;
        }
        InboundUpdate::Choice {
            user_id,
            callback_id,
            choice,
        } => {
            // Ack first so the client stops showing a spinner.
            if let Err(e) = transport.answer_callback(&callback_id).await {
                tracing::debug!(user_id, error = %e, "Failed to answer callback query");
            }
            engine.handle_choice(user_id, choice).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Nudge v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = config_path();
    let config = NudgeConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // The bot cannot do anything without a token, so fail before touching storage.
    let token = match bot_token_from_env() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "Bot token missing");
            return Err(e.into());
        }
    };

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("nudge.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let reminders = ReminderRepository::new(Arc::clone(&db));

    // Transport + services.
    let transport = Arc::new(TelegramTransport::new(token, &config.transport));
    let engine = Arc::new(IntakeEngine::new(
        reminders.clone(),
        Arc::clone(&transport),
    ));

    // Background delivery scheduler.
    let runner = DeliveryRunner::new(reminders, Arc::clone(&transport)).with_intervals(
        Duration::from_secs(config.scheduler.first_tick_delay_secs),
        Duration::from_secs(config.scheduler.tick_interval_secs),
    );
    tokio::spawn(runner.run());

    // Skip updates that piled up while the bot was down.
    if let Err(e) = transport.drop_pending_updates().await {
        tracing::warn!(error = %e, "Failed to drop pending updates");
    }

    // Speech recognition (if configured; otherwise the mock).
    let language = config.transcribe.language.clone();
    match GoogleTranscriptionService::new(&config.transcribe) {
        Ok(google) => {
            tracing::info!("Google speech recognition initialized");
            update_loop(engine, transport, Arc::new(google), language).await;
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Speech recognition unavailable — voice notes get a mock transcript"
            );
            update_loop(
                engine,
                transport,
                Arc::new(MockTranscriptionService::new()),
                language,
            )
            .await;
        }
    }

    Ok(())
}

/// Poll for inbound updates forever, spawning one task per event.
async fn update_loop<S: TranscriptionService + 'static>(
    engine: Arc<IntakeEngine<TelegramTransport>>,
    transport: Arc<TelegramTransport>,
    transcriber: Arc<S>,
    language: String,
) {
    tracing::info!("Update loop started");

    loop {
        let updates = match transport.poll_updates().await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "Polling for updates failed");
                tokio::time::sleep(Duration::from_secs(POLL_RETRY_DELAY_SECS)).await;
                continue;
            }
        };

        for update in updates {
            tokio::spawn(handle_update(
                update,
                Arc::clone(&engine),
                Arc::clone(&transport),
                Arc::clone(&transcriber),
                language.clone(),
            ));
        }
    }
}
