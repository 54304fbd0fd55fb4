//! Console host
//!
//! Stands in for the browser page: reads chat input and simulated speech
//! from stdin, forwards both to the controller mailbox, and prints every
//! `UiEvent` the controller emits.
//!
//! Input lines:
//! - `/mic`, `/mute`: the microphone and mute buttons
//! - `~ <words>`: a finalized transcript from the recognizer
//! - `/end`: the recognizer stops on its own (exercises auto-restart)
//! - `/quit`: shut down
//! - anything else: typed chat input

use crate::database::Sender;
use crate::events::{Event, EventSender, SoundCue, UiEvent, UiReceiver};
use crate::speech_input::{RecognitionError, Recognizer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Recognizer fed by `~` lines on the console
///
/// `running` is shared with the input loop so transcripts only flow while
/// the recognizer is started.
#[derive(Clone, Default)]
pub struct ConsoleRecognizer {
    running: Arc<AtomicBool>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The recognizer ended by itself
    fn end(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Recognizer for ConsoleRecognizer {
    fn start(&mut self) -> Result<(), RecognitionError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecognitionError::Busy);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// What one console line asks for
#[derive(Debug, PartialEq)]
pub enum ConsoleInput {
    Event(Event),
    EndRecognition,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim();
    match line {
        "" => ConsoleInput::Empty,
        "/quit" | "/exit" => ConsoleInput::Quit,
        "/mic" => ConsoleInput::Event(Event::ToggleMic),
        "/mute" => ConsoleInput::Event(Event::ToggleMute),
        "/end" => ConsoleInput::EndRecognition,
        _ => match line.strip_prefix('~') {
            Some(transcript) => ConsoleInput::Event(Event::Transcript(transcript.trim().to_string())),
            None => ConsoleInput::Event(Event::UserText(line.to_string())),
        },
    }
}

/// Read stdin until EOF or `/quit`, forwarding to the controller
pub async fn read_input(mailbox: EventSender, recognizer: ConsoleRecognizer) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read console input: {}", e);
                break;
            }
        };

        let event = match parse_line(&line) {
            ConsoleInput::Empty => continue,
            ConsoleInput::Quit => break,
            ConsoleInput::EndRecognition => {
                if !recognizer.is_running() {
                    println!("(microphone is off)");
                    continue;
                }
                recognizer.end();
                Event::RecognitionEnded
            }
            ConsoleInput::Event(Event::Transcript(text)) => {
                if !recognizer.is_running() {
                    println!("(microphone is off; use /mic)");
                    continue;
                }
                Event::Transcript(text)
            }
            ConsoleInput::Event(event) => event,
        };

        if mailbox.send(event).is_err() {
            return;
        }
    }

    let _ = mailbox.send(Event::Shutdown);
}

/// Text for one UI event, or `None` when it has no console rendering
pub fn render(event: &UiEvent) -> Option<String> {
    let text = match event {
        UiEvent::Message { turn } if turn.is_image => {
            let size = turn.text.split_once(',').map(|(_, d)| d.len()).unwrap_or(0);
            format!("LIZ: [image, {} base64 chars]", size)
        }
        UiEvent::Message { turn } => match turn.sender {
            Sender::User => format!("YOU: {}", turn.text),
            Sender::Assistant => format!("LIZ: {}", turn.text),
            Sender::System => format!("-- {} --", turn.text),
        },
        UiEvent::ClearMessages => "-- chat cleared --".to_string(),
        UiEvent::Navigate { view } => format!("[view: {:?}]", view),
        UiEvent::Sound { cue: SoundCue::Alert } => "\x07[alert]".to_string(),
        UiEvent::Sound { cue: SoundCue::Click } => "[click]".to_string(),
        UiEvent::ThemeChanged { theme } => format!("[theme: {}]", theme.name()),
        UiEvent::MatrixOverlay { visible } => format!("[matrix: {}]", on_off(*visible)),
        UiEvent::TerminalOverlay { visible } => format!("[terminal: {}]", on_off(*visible)),
        UiEvent::GlitchMode { active } => format!("[glitch: {}]", on_off(*active)),
        UiEvent::ConversationIndicator { visible } => format!("[conversation mode: {}]", on_off(*visible)),
        UiEvent::Listening { active } => format!("[mic: {}]", on_off(*active)),
        UiEvent::Muted { muted } => (if *muted { "[🔇]" } else { "[🔊]" }).to_string(),
        UiEvent::TimerTick { remaining_secs, .. } => format!("⏳ {}s ⏰", remaining_secs),
        UiEvent::Loading { .. } | UiEvent::Visualizer { .. } | UiEvent::TimerHidden { .. } => {
            return None
        }
    };
    Some(text)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Print UI events until the controller goes away
pub async fn render_ui(mut ui: UiReceiver) {
    while let Some(event) = ui.recv().await {
        log::debug!("UI event: {}", serde_json::to_string(&event).unwrap_or_default());
        if let Some(text) = render(&event) {
            println!("{}", text);
        }
    }
}
