use crate::error::{IntoLizError, LizError};
use rusqlite::{params, Connection, Result as SqlResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum number of turns kept in the persisted log
pub const MAX_PERSISTED_TURNS: usize = 50;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    /// Transient notices; displayed but never persisted
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
            Sender::System => "system",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Sender::User),
            "assistant" => Some(Sender::Assistant),
            "system" => Some(Sender::System),
            _ => None,
        }
    }
}

/// One message unit in the conversation log
///
/// Serializes as `{text, sender, isImage}`, the layout the UI and the
/// persisted log share. For image turns `text` holds the data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub text: String,
    pub sender: Sender,
    pub is_image: bool,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into(), sender: Sender::User, is_image: false }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { text: text.into(), sender: Sender::Assistant, is_image: false }
    }

    pub fn image(data_url: impl Into<String>) -> Self {
        Self { text: data_url.into(), sender: Sender::Assistant, is_image: true }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self { text: text.into(), sender: Sender::System, is_image: false }
    }
}

/// Assistant settings persisted next to the turn log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub wake_phrase: String,    // Substring that addresses the assistant outside conversation mode
    pub text_endpoint: String,  // Proxy URL for text generation
    pub image_endpoint: String, // Proxy URL for image generation
    pub voice_name: String,     // Preferred voice, matched as a substring of the voice name
    pub voice_locale: String,   // Fallback voice locale (e.g., "en-US")
    pub muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wake_phrase: "liz".to_string(),
            text_endpoint: "http://localhost:3000/api/generate-text".to_string(),
            image_endpoint: "http://localhost:3000/api/generate-image".to_string(),
            voice_name: "Google US English".to_string(),
            voice_locale: "en-US".to_string(),
            muted: false,
        }
    }
}

/// SQLite storage for the Liz assistant
///
/// Sole reader and writer of the persisted turn log. The log is append-only
/// and trimmed oldest-first to `MAX_PERSISTED_TURNS` after every insert.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and initialize tables
    pub fn new(db_path: PathBuf) -> Result<Self, LizError> {
        log::info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)
            .map_liz_err(|e| LizError::Database(format!("Failed to open database: {}", e)))?;

        let db = Database { conn };
        db.init_tables()?;

        log::info!("Database initialized successfully");

        Ok(db)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self, LizError> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_tables()?;
        Ok(db)
    }

    fn init_tables(&self) -> Result<(), LizError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS turns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    text TEXT NOT NULL,
                    sender TEXT NOT NULL CHECK(sender IN ('user', 'assistant')),
                    is_image INTEGER NOT NULL DEFAULT 0,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )
            .map_liz_err(|e| LizError::Database(format!("Failed to create turns table: {}", e)))?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                [],
            )
            .map_liz_err(|e| LizError::Database(format!("Failed to create settings table: {}", e)))?;

        let defaults = Settings::default();
        for (key, value) in settings_rows(&defaults) {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )
                .map_liz_err(|e| {
                    LizError::Database(format!("Failed to insert default {}: {}", key, e))
                })?;
        }

        log::debug!("Database tables initialized");

        Ok(())
    }

    /// Append a turn to the log
    ///
    /// System turns are skipped and reported as `Ok(false)`.
    pub fn append_turn(&self, turn: &Turn) -> Result<bool, LizError> {
        if turn.sender == Sender::System {
            log::debug!("Skipping persistence of system turn");
            return Ok(false);
        }

        self.conn
            .execute(
                "INSERT INTO turns (text, sender, is_image) VALUES (?1, ?2, ?3)",
                params![turn.text, turn.sender.as_str(), turn.is_image],
            )
            .map_liz_err(|e| LizError::Database(format!("Failed to save turn: {}", e)))?;

        let trimmed = self
            .conn
            .execute(
                "DELETE FROM turns WHERE id NOT IN (
                    SELECT id FROM turns ORDER BY id DESC LIMIT ?1
                )",
                params![MAX_PERSISTED_TURNS as i64],
            )
            .map_liz_err(|e| LizError::Database(format!("Failed to trim turn log: {}", e)))?;

        if trimmed > 0 {
            log::debug!("Evicted {} oldest turn(s)", trimmed);
        }

        Ok(true)
    }

    /// Load the whole persisted log, oldest first
    pub fn load_turns(&self) -> Result<Vec<Turn>, LizError> {
        let mut stmt = self
            .conn
            .prepare("SELECT text, sender, is_image FROM turns ORDER BY id ASC")
            .map_liz_err(|e| LizError::Database(format!("Failed to prepare statement: {}", e)))?;

        let turns = stmt
            .query_map([], |row| {
                let sender: String = row.get(1)?;
                Ok(Turn {
                    text: row.get(0)?,
                    sender: Sender::parse(&sender).unwrap_or(Sender::Assistant),
                    is_image: row.get(2)?,
                })
            })
            .map_liz_err(|e| LizError::Database(format!("Failed to query turns: {}", e)))?
            .collect::<SqlResult<Vec<_>>>()
            .map_liz_err(|e| LizError::Database(format!("Failed to collect turns: {}", e)))?;

        Ok(turns)
    }

    /// The trailing window of turns worth sending to the model
    ///
    /// Only user and assistant text turns qualify; image turns carry data
    /// URLs and are left out. Returned oldest first.
    pub fn recent_context(&self, limit: usize) -> Result<Vec<Turn>, LizError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT text, sender FROM turns
                 WHERE is_image = 0 AND sender IN ('user', 'assistant')
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_liz_err(|e| LizError::Database(format!("Failed to prepare statement: {}", e)))?;

        let mut turns = stmt
            .query_map(params![limit as i64], |row| {
                let sender: String = row.get(1)?;
                Ok(Turn {
                    text: row.get(0)?,
                    sender: Sender::parse(&sender).unwrap_or(Sender::Assistant),
                    is_image: false,
                })
            })
            .map_liz_err(|e| LizError::Database(format!("Failed to query context: {}", e)))?
            .collect::<SqlResult<Vec<_>>>()
            .map_liz_err(|e| LizError::Database(format!("Failed to collect context: {}", e)))?;

        turns.reverse();
        Ok(turns)
    }

    /// Drop the whole turn log
    pub fn clear_turns(&self) -> Result<(), LizError> {
        self.conn
            .execute("DELETE FROM turns", [])
            .map_liz_err(|e| LizError::Database(format!("Failed to clear turns: {}", e)))?;

        log::info!("Turn log cleared");

        Ok(())
    }

    pub fn count_turns(&self) -> Result<i64, LizError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
            .map_liz_err(|e| LizError::Database(format!("Failed to count turns: {}", e)))?;

        Ok(count)
    }

    /// Load assistant settings, falling back to defaults for unreadable keys
    pub fn load_settings(&self) -> Result<Settings, LizError> {
        let defaults = Settings::default();
        let get = |key: &str, fallback: &str| -> String {
            self.conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .unwrap_or_else(|_| fallback.to_string())
        };

        let settings = Settings {
            wake_phrase: get("wake_phrase", &defaults.wake_phrase),
            text_endpoint: get("text_endpoint", &defaults.text_endpoint),
            image_endpoint: get("image_endpoint", &defaults.image_endpoint),
            voice_name: get("voice_name", &defaults.voice_name),
            voice_locale: get("voice_locale", &defaults.voice_locale),
            muted: get("muted", "false") == "true",
        };

        log::info!(
            "Loaded settings: wake_phrase={}, text_endpoint={}, image_endpoint={}, voice={} ({}), muted={}",
            settings.wake_phrase,
            settings.text_endpoint,
            settings.image_endpoint,
            settings.voice_name,
            settings.voice_locale,
            settings.muted
        );

        Ok(settings)
    }

    /// Save assistant settings
    ///
    /// Endpoint URLs must be absolute http(s) URLs.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), LizError> {
        validate_endpoint(&settings.text_endpoint)?;
        validate_endpoint(&settings.image_endpoint)?;

        for (key, value) in settings_rows(settings) {
            self.conn
                .execute(
                    "INSERT INTO settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )
                .map_liz_err(|e| LizError::Database(format!("Failed to save {}: {}", key, e)))?;
        }

        log::info!("Saved settings");

        Ok(())
    }

    /// Persist only the muted flag
    pub fn save_muted(&self, muted: bool) -> Result<(), LizError> {
        self.conn
            .execute(
                "UPDATE settings SET value = ?1 WHERE key = 'muted'",
                params![if muted { "true" } else { "false" }],
            )
            .map_liz_err(|e| LizError::Database(format!("Failed to save muted: {}", e)))?;
        Ok(())
    }
}

fn settings_rows(settings: &Settings) -> [(&'static str, String); 6] {
    [
        ("wake_phrase", settings.wake_phrase.clone()),
        ("text_endpoint", settings.text_endpoint.clone()),
        ("image_endpoint", settings.image_endpoint.clone()),
        ("voice_name", settings.voice_name.clone()),
        ("voice_locale", settings.voice_locale.clone()),
        ("muted", settings.muted.to_string()),
    ]
}

fn validate_endpoint(endpoint: &str) -> Result<(), LizError> {
    let parsed = url::Url::parse(endpoint)
        .map_liz_err(|e| LizError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(LizError::Config(format!(
            "Invalid endpoint '{}'. Must start with http:// or https://",
            endpoint
        )));
    }

    Ok(())
}

/// Get the path to the database file
pub fn get_database_path() -> Result<PathBuf, LizError> {
    let mut db_path = dirs::data_local_dir()
        .ok_or_else(|| LizError::Config("Failed to get local data directory".to_string()))?;

    db_path.push("liz-assistant");
    db_path.push("liz.db");

    Ok(db_path)
}
