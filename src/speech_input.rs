//! Speech Input Engine
//!
//! Supervises a continuous recognizer:
//! - explicit `start`/`stop` transitions driven by the mic button or
//!   conversation mode
//! - automatic restart when the recognizer ends while we still want to listen
//! - one delayed retry when the restart hits a busy recognizer
//! - permanent stop on a permission failure (needs user action to recover)
//!
//! Only finalized transcripts are delivered; interim results never leave the
//! recognizer backend.

use std::time::Duration;

/// Delay before the single retry after a busy recognizer
pub const RESTART_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Spoken when the wake phrase arrives with nothing after it
pub const WAKE_ACKNOWLEDGEMENT: &str = "I'm listening.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("recognizer busy")]
    Busy,

    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
}

/// Continuous speech-to-text backend
///
/// Transcripts, end-of-recognition and asynchronous failures are delivered
/// through the controller mailbox by whoever drives the backend.
pub trait Recognizer: Send {
    fn start(&mut self) -> Result<(), RecognitionError>;
    fn stop(&mut self);
}

/// What happened when the engine tried to keep recognition alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Listening was off; nothing to do
    NotListening,
    Restarted,
    /// Recognizer was busy; caller must deliver a retry after `RESTART_RETRY_DELAY`
    RetryScheduled,
    /// Recognition is permanently off until the user grants access
    PermissionDenied,
    /// Restart failed for good; listening flag left as is
    Failed(String),
}

/// What an utterance means to the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    /// Forward as a user turn
    Command(String),
    /// Wake phrase alone; acknowledge without generating
    Acknowledge,
    /// Not addressed to the assistant
    Ignored,
}

/// Decide whether a transcript is addressed to the assistant
///
/// In conversation mode everything is. Otherwise the transcript must contain
/// the wake phrase (case-insensitive); "hey <wake>" and then "<wake>" are
/// removed once each and the lowercased remainder becomes the command.
pub fn interpret_transcript(transcript: &str, conversation_mode: bool, wake_phrase: &str) -> Heard {
    let transcript = transcript.trim();
    if transcript.is_empty() {
        return Heard::Ignored;
    }

    if conversation_mode {
        return Heard::Command(transcript.to_string());
    }

    let wake = wake_phrase.trim().to_lowercase();
    let lower = transcript.to_lowercase();
    if wake.is_empty() || !lower.contains(&wake) {
        return Heard::Ignored;
    }

    let command = lower
        .replacen(&format!("hey {}", wake), "", 1)
        .replacen(&wake, "", 1)
        .trim()
        .to_string();

    if command.is_empty() {
        Heard::Acknowledge
    } else {
        Heard::Command(command)
    }
}

pub struct SpeechInputEngine {
    recognizer: Box<dyn Recognizer>,
    listening: bool,
}

impl SpeechInputEngine {
    pub fn new(recognizer: Box<dyn Recognizer>) -> Self {
        Self { recognizer, listening: false }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Begin continuous recognition
    ///
    /// On failure the engine stays stopped.
    pub fn start(&mut self) -> Result<(), RecognitionError> {
        match self.recognizer.start() {
            Ok(()) => {
                self.listening = true;
                log::info!("Recognition started");
                Ok(())
            }
            Err(e) => {
                log::error!("Recognition start failed: {}", e);
                self.listening = false;
                Err(e)
            }
        }
    }

    pub fn stop(&mut self) {
        self.listening = false;
        self.recognizer.stop();
        log::info!("Recognition stopped as requested");
    }

    /// Recognizer ended on its own
    pub fn on_end(&mut self) -> RestartOutcome {
        if !self.listening {
            log::debug!("Recognition ended while not listening");
            return RestartOutcome::NotListening;
        }

        log::debug!("Recognition ended; restarting");
        match self.recognizer.start() {
            Ok(()) => {
                log::info!("Recognition successfully restarted");
                RestartOutcome::Restarted
            }
            Err(RecognitionError::Busy) => {
                log::warn!(
                    "Restart failed (recognizer busy). Retrying in {}ms",
                    RESTART_RETRY_DELAY.as_millis()
                );
                RestartOutcome::RetryScheduled
            }
            Err(RecognitionError::PermissionDenied) => {
                self.force_stop();
                RestartOutcome::PermissionDenied
            }
            Err(e) => {
                log::error!("Failed to restart recognition: {}", e);
                self.give_up();
                RestartOutcome::Failed(e.to_string())
            }
        }
    }

    /// The delayed retry after a busy restart; never schedules another one
    pub fn on_retry(&mut self) -> RestartOutcome {
        if !self.listening {
            log::debug!("Skipping restart retry; listening was turned off");
            return RestartOutcome::NotListening;
        }

        match self.recognizer.start() {
            Ok(()) => {
                log::info!("Recognition restarted on retry");
                RestartOutcome::Restarted
            }
            Err(RecognitionError::PermissionDenied) => {
                self.force_stop();
                RestartOutcome::PermissionDenied
            }
            Err(e) => {
                log::error!("Restart retry failed: {}", e);
                self.give_up();
                RestartOutcome::Failed(e.to_string())
            }
        }
    }

    /// Restart could not be recovered; nothing will end the recognizer again
    pub fn give_up(&mut self) {
        log::warn!("Continuous recognition abandoned");
        self.listening = false;
        self.recognizer.stop();
    }

    /// Permission lost: stop and never retry
    pub fn force_stop(&mut self) {
        log::error!("Microphone permission denied; recognition disabled");
        self.listening = false;
        self.recognizer.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays scripted `start` results, then succeeds
    #[derive(Default)]
    pub(crate) struct ScriptedRecognizer {
        pub script: Arc<Mutex<VecDeque<Result<(), RecognitionError>>>>,
        pub starts: Arc<Mutex<usize>>,
        pub stops: Arc<Mutex<usize>>,
    }

    impl Recognizer for ScriptedRecognizer {
        fn start(&mut self) -> Result<(), RecognitionError> {
            *self.starts.lock().unwrap() += 1;
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        fn stop(&mut self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    fn scripted(results: Vec<Result<(), RecognitionError>>) -> (SpeechInputEngine, Arc<Mutex<usize>>) {
        let recognizer = ScriptedRecognizer::default();
        recognizer.script.lock().unwrap().extend(results);
        let starts = recognizer.starts.clone();
        (SpeechInputEngine::new(Box::new(recognizer)), starts)
    }

    #[test]
    fn test_conversation_mode_forwards_everything() {
        assert_eq!(
            interpret_transcript("What's the weather", true, "liz"),
            Heard::Command("What's the weather".into())
        );
    }

    #[test]
    fn test_wake_phrase_required_outside_conversation_mode() {
        assert_eq!(interpret_transcript("what's the weather", false, "liz"), Heard::Ignored);
        assert_eq!(
            interpret_transcript("Hey Liz what time is it", false, "liz"),
            Heard::Command("what time is it".into())
        );
        assert_eq!(
            interpret_transcript("open games liz", false, "liz"),
            Heard::Command("open games".into())
        );
    }

    #[test]
    fn test_bare_wake_phrase_is_acknowledged() {
        assert_eq!(interpret_transcript("Hey Liz", false, "liz"), Heard::Acknowledge);
        assert_eq!(interpret_transcript("liz", false, "liz"), Heard::Acknowledge);
    }

    #[test]
    fn test_restart_on_end_while_listening() {
        let (mut engine, starts) = scripted(vec![]);
        engine.start().unwrap();

        assert_eq!(engine.on_end(), RestartOutcome::Restarted);
        assert_eq!(*starts.lock().unwrap(), 2);
    }

    #[test]
    fn test_no_restart_after_stop() {
        let (mut engine, starts) = scripted(vec![]);
        engine.start().unwrap();
        engine.stop();

        assert_eq!(engine.on_end(), RestartOutcome::NotListening);
        assert_eq!(engine.on_retry(), RestartOutcome::NotListening);
        assert_eq!(*starts.lock().unwrap(), 1);
    }

    #[test]
    fn test_busy_restart_is_retried_once() {
        let (mut engine, starts) = scripted(vec![
            Ok(()),
            Err(RecognitionError::Busy),
            Err(RecognitionError::Busy),
        ]);
        engine.start().unwrap();

        assert_eq!(engine.on_end(), RestartOutcome::RetryScheduled);
        assert_eq!(engine.on_retry(), RestartOutcome::Failed("recognizer busy".into()));
        assert_eq!(*starts.lock().unwrap(), 3);
        assert!(!engine.is_listening());
        assert_eq!(engine.on_end(), RestartOutcome::NotListening);
    }

    #[test]
    fn test_permission_denied_stops_for_good() {
        let (mut engine, _starts) = scripted(vec![Ok(()), Err(RecognitionError::PermissionDenied)]);
        engine.start().unwrap();

        assert_eq!(engine.on_end(), RestartOutcome::PermissionDenied);
        assert!(!engine.is_listening());
        assert_eq!(engine.on_end(), RestartOutcome::NotListening);
    }

    #[test]
    fn test_failed_start_leaves_engine_stopped() {
        let (mut engine, _starts) = scripted(vec![Err(RecognitionError::Unavailable("no device".into()))]);

        assert!(engine.start().is_err());
        assert!(!engine.is_listening());
    }
}
