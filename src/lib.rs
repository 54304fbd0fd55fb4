pub mod console;
pub mod controller;
pub mod database;
pub mod error;
pub mod events;
pub mod proxy;
pub mod remote;
pub mod router;
pub mod secrets;
pub mod session;
pub mod speech_input;
pub mod speech_output;
pub mod tts;
pub mod wire;

use console::ConsoleRecognizer;
use controller::ConversationController;
use database::{get_database_path, Database};
use error::LizError;
use proxy::{gemini::GeminiClient, ProxyConfig};
use remote::RemoteClient;
use speech_output::SpeechBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tts::{ConsoleSpeech, PiperSpeech};

const CONSOLE_HELP: &str = "Type a message and press Enter. /mic toggles the microphone, \
~ <words> simulates speech, /end stops recognition, /mute toggles voice, /quit exits.";

/// Options for the console assistant
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub db_path: Option<PathBuf>,
    pub text_endpoint: Option<String>,
    pub image_endpoint: Option<String>,
    pub wake_phrase: Option<String>,
    pub piper_voices: Option<PathBuf>,
    pub espeak_data: Option<PathBuf>,
    pub system_instruction: Option<String>,
}

/// Options for the generation proxy
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    pub api_key: Option<String>,
    pub config: ProxyConfig,
}

fn speech_backend(options: &ChatOptions) -> Box<dyn SpeechBackend> {
    let Some(voices_dir) = &options.piper_voices else {
        log::info!("No Piper voices configured; using console speech");
        return Box::new(ConsoleSpeech::new());
    };

    match PiperSpeech::new(voices_dir, options.espeak_data.clone()) {
        Ok(piper) => {
            log::info!("✓ Piper speech backend initialized");
            Box::new(piper)
        }
        Err(e) => {
            log::warn!("⚠ Piper unavailable, falling back to console speech: {}", e);
            Box::new(ConsoleSpeech::new())
        }
    }
}

/// Run the assistant on the console until `/quit` or end of input
pub async fn run_chat(options: ChatOptions) -> Result<(), LizError> {
    log::info!("=== Liz Assistant Initialization ===");

    let db_path = match &options.db_path {
        Some(path) => path.clone(),
        None => get_database_path()?,
    };
    let db = Database::new(db_path)?;
    log::info!("✓ Database ready ({} stored turns)", db.count_turns().unwrap_or(0));

    let mut settings = db.load_settings()?;
    let overridden = options.text_endpoint.is_some()
        || options.image_endpoint.is_some()
        || options.wake_phrase.is_some();
    if let Some(endpoint) = &options.text_endpoint {
        settings.text_endpoint = endpoint.clone();
    }
    if let Some(endpoint) = &options.image_endpoint {
        settings.image_endpoint = endpoint.clone();
    }
    if let Some(wake) = &options.wake_phrase {
        settings.wake_phrase = wake.trim().to_lowercase();
    }
    if overridden {
        db.save_settings(&settings)?;
    }

    let backend = Arc::new(RemoteClient::new(
        settings.text_endpoint.clone(),
        settings.image_endpoint.clone(),
        options.system_instruction.clone(),
    )?);

    let speech = speech_backend(&options);
    let recognizer = ConsoleRecognizer::new();

    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let controller = ConversationController::new(
        db,
        settings,
        Box::new(recognizer.clone()),
        speech,
        backend,
        mailbox_tx.clone(),
        ui_tx,
    );

    log::info!("=== Liz Assistant Ready ===");
    println!("{}", CONSOLE_HELP);

    let ui_task = tokio::spawn(console::render_ui(ui_rx));
    let input_task = tokio::spawn(console::read_input(mailbox_tx, recognizer));

    controller.run(mailbox_rx).await;

    input_task.abort();
    // Pending timers still hold UI senders; give the renderer a moment to flush
    let _ = tokio::time::timeout(Duration::from_millis(200), ui_task).await;

    Ok(())
}

/// Run the generation proxy until the process is stopped
pub async fn run_proxy(options: ProxyOptions) -> Result<(), LizError> {
    log::info!("=== Liz Proxy Initialization ===");

    let api_key = secrets::resolve_provider_key(options.api_key)?;
    let provider = Arc::new(GeminiClient::new(api_key)?);
    log::info!("✓ Provider client ready");

    proxy::serve(provider, options.config).await
}
