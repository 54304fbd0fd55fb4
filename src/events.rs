//! Messages flowing into and out of the conversation controller
//!
//! `Event` is the controller's mailbox: every asynchronous signal (user
//! input, recognizer callbacks, playback callbacks, remote completions,
//! timers) is delivered as one of these and handled one at a time.
//! `UiEvent` is everything the controller wants the front-end to render.

use crate::database::Turn;
use crate::remote::{GenerationError, ImagePayload};
use crate::router::{Theme, View};
use crate::speech_input::RecognitionError;
use serde::Serialize;
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;
pub type UiSender = mpsc::UnboundedSender<UiEvent>;
pub type UiReceiver = mpsc::UnboundedReceiver<UiEvent>;

#[derive(Debug, PartialEq)]
pub enum Event {
    /// Typed input from the chat box
    UserText(String),
    /// Manual microphone button
    ToggleMic,
    /// Manual mute button
    ToggleMute,
    /// Finalized utterance from the recognizer
    Transcript(String),
    /// Recognizer stopped on its own
    RecognitionEnded,
    RecognitionFailed(RecognitionError),
    /// Delayed second restart attempt after a busy recognizer
    RestartRetry,
    SpeechStarted(u64),
    SpeechEnded(u64),
    TextGenerated(Result<String, GenerationError>),
    ImageGenerated(Result<ImagePayload, GenerationError>),
    TimerFinished(u64),
    Shutdown,
}

/// Short audible cues played by the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCue {
    Click,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Message { turn: Turn },
    ClearMessages,
    Navigate { view: View },
    Sound { cue: SoundCue },
    Loading { active: bool },
    ThemeChanged { theme: Theme },
    MatrixOverlay { visible: bool },
    TerminalOverlay { visible: bool },
    GlitchMode { active: bool },
    ConversationIndicator { visible: bool },
    Visualizer { active: bool },
    Listening { active: bool },
    Muted { muted: bool },
    TimerTick { timer: u64, remaining_secs: u64 },
    TimerHidden { timer: u64 },
}

/// Speech playback callbacks, handed to synthesizer backends
#[derive(Clone)]
pub struct SpeechReporter {
    mailbox: EventSender,
}

impl SpeechReporter {
    pub fn new(mailbox: EventSender) -> Self {
        Self { mailbox }
    }

    pub fn started(&self, utterance: u64) {
        let _ = self.mailbox.send(Event::SpeechStarted(utterance));
    }

    pub fn finished(&self, utterance: u64) {
        let _ = self.mailbox.send(Event::SpeechEnded(utterance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ui_event_layout() {
        let event = UiEvent::Message { turn: Turn::image("data:image/png;base64,AAAA") };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "message",
                "turn": {"text": "data:image/png;base64,AAAA", "sender": "assistant", "isImage": true}
            })
        );
    }
}
