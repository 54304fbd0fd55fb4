use clap::{Parser, Subcommand};
use liz_assistant::proxy::ProxyConfig;
use liz_assistant::{run_chat, run_proxy, secrets, ChatOptions, ProxyOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "liz", version, about = "Liz voice/text assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the generation proxy that holds the provider key
    Serve {
        #[arg(long, env = "APP_PORT", default_value_t = 3000)]
        port: u16,

        #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 60)]
        rate_limit_window_secs: u64,

        #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 60)]
        rate_limit_max: u32,

        #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
        cors_origin: String,

        /// Falls back to the OS keyring when unset
        #[arg(long, env = "GOOGLE_AI_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Talk to Liz on the console
    Chat {
        /// SQLite file for history and settings
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long)]
        text_endpoint: Option<String>,

        #[arg(long)]
        image_endpoint: Option<String>,

        #[arg(long)]
        wake_phrase: Option<String>,

        /// Directory of Piper voice models; console speech when unset
        #[arg(long, env = "PIPER_VOICES_DIR")]
        piper_voices: Option<PathBuf>,

        #[arg(long, env = "ESPEAK_DATA_PATH")]
        espeak_data: Option<PathBuf>,

        /// Replace the default assistant persona
        #[arg(long)]
        system_instruction: Option<String>,
    },

    /// Manage the provider key in the OS keyring
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    Set { key: String },
    Delete,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve { port, rate_limit_window_secs, rate_limit_max, cors_origin, api_key } => {
            let options = ProxyOptions {
                api_key,
                config: ProxyConfig {
                    port,
                    rate_limit_window: Duration::from_secs(rate_limit_window_secs),
                    rate_limit_max,
                    cors_origin,
                },
            };
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(Into::into)
                .and_then(|rt| rt.block_on(run_proxy(options)))
        }
        Command::Chat {
            db,
            text_endpoint,
            image_endpoint,
            wake_phrase,
            piper_voices,
            espeak_data,
            system_instruction,
        } => {
            let options = ChatOptions {
                db_path: db,
                text_endpoint,
                image_endpoint,
                wake_phrase,
                piper_voices,
                espeak_data,
                system_instruction,
            };
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(Into::into)
                .and_then(|rt| rt.block_on(run_chat(options)))
        }
        Command::Key { action: KeyAction::Set { key } } => secrets::save_api_key(&key),
        Command::Key { action: KeyAction::Delete } => secrets::delete_api_key(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("✗ {}", e);
            ExitCode::FAILURE
        }
    }
}
