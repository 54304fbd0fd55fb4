//! Speech output engine
//!
//! Owns the "at most one utterance" rule and the `speaking` flag. The actual
//! synthesis is delegated to a `SpeechBackend` (see `tts`), which reports
//! playback start and end through a `SpeechReporter`.
//!
//! Spoken text is a sanitized copy of the displayed text: emoji and markdown
//! markers are stripped and fenced code blocks are replaced by a short
//! placeholder sentence.

use crate::events::SpeechReporter;
use once_cell::sync::Lazy;
use regex::Regex;

const SPEECH_PITCH: f32 = 1.15;
const SPEECH_RATE: f32 = 1.1;

/// Spoken instead of a fenced code block
pub const CODE_PLACEHOLDER: &str = "I've written the code below.";

static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\u{2011}-\u{26FF}\u{2700}-\u{27BF}\u{E000}-\u{F8FF}\u{FE0F}\u{1F000}-\u{1F7FF}\u{1F900}-\u{1FAFF}]",
    )
    .unwrap()
});

static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());

static RE_MARKDOWN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*#]").unwrap());

/// A voice offered by a synthesizer backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub locale: String,
}

/// One request to speak
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub voice: Option<Voice>,
    pub pitch: f32,
    pub rate: f32,
}

/// Synthesizer backend
///
/// `play` must report `started` when audio begins and `finished` when it ends
/// on its own. `cancel` stops whatever is playing; it need not report.
pub trait SpeechBackend: Send {
    fn voices(&self) -> Vec<Voice>;
    fn play(&mut self, utterance: Utterance, reporter: SpeechReporter);
    fn cancel(&mut self);
}

/// Strip what should never be read aloud
pub fn sanitize_for_speech(text: &str) -> String {
    let without_emoji = RE_EMOJI.replace_all(text, "");
    let without_code = RE_CODE_FENCE.replace_all(&without_emoji, CODE_PLACEHOLDER);
    RE_MARKDOWN.replace_all(&without_code, "").trim().to_string()
}

/// Preferred voice by name substring, then by exact locale
pub fn select_voice(voices: &[Voice], preferred_name: &str, locale: &str) -> Option<Voice> {
    voices
        .iter()
        .find(|v| !preferred_name.is_empty() && v.name.contains(preferred_name))
        .or_else(|| voices.iter().find(|v| v.locale == locale))
        .cloned()
}

pub struct SpeechOutputEngine {
    backend: Box<dyn SpeechBackend>,
    reporter: SpeechReporter,
    voice_name: String,
    voice_locale: String,
    muted: bool,
    speaking: bool,
    current: Option<u64>,
    next_id: u64,
}

impl SpeechOutputEngine {
    pub fn new(
        backend: Box<dyn SpeechBackend>,
        reporter: SpeechReporter,
        voice_name: String,
        voice_locale: String,
        muted: bool,
    ) -> Self {
        Self {
            backend,
            reporter,
            voice_name,
            voice_locale,
            muted,
            speaking: false,
            current: None,
            next_id: 1,
        }
    }

    /// Speak `text`, replacing any utterance in flight
    ///
    /// Returns the new utterance id, or `None` when muted or nothing is left
    /// to say after sanitization.
    pub fn speak(&mut self, text: &str) -> Option<u64> {
        if self.muted {
            return None;
        }

        self.cancel();

        let clean = sanitize_for_speech(text);
        if clean.is_empty() {
            return None;
        }

        let voice = select_voice(&self.backend.voices(), &self.voice_name, &self.voice_locale);
        let id = self.next_id;
        self.next_id += 1;

        log::debug!(
            "Speaking utterance {} with voice {:?}: '{}'",
            id,
            voice.as_ref().map(|v| v.name.as_str()),
            clean
        );

        self.current = Some(id);
        self.backend.play(
            Utterance { id, text: clean, voice, pitch: SPEECH_PITCH, rate: SPEECH_RATE },
            self.reporter.clone(),
        );

        Some(id)
    }

    /// Stop the current utterance immediately
    pub fn cancel(&mut self) {
        if let Some(id) = self.current.take() {
            log::debug!("Cancelling utterance {}", id);
            self.backend.cancel();
        }
        self.speaking = false;
    }

    pub fn on_started(&mut self, id: u64) {
        if self.current == Some(id) {
            self.speaking = true;
        }
    }

    /// Playback ended; stale ids from superseded utterances are ignored
    pub fn on_ended(&mut self, id: u64) {
        if self.current == Some(id) {
            self.current = None;
            self.speaking = false;
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.cancel();
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn current_utterance(&self) -> Option<u64> {
        self.current
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Records every play/cancel; never reports playback on its own
    #[derive(Default)]
    pub(crate) struct SpeechLog {
        pub played: Vec<Utterance>,
        pub active: Vec<u64>,
        pub cancels: usize,
    }

    pub(crate) struct MockSpeech {
        pub log: Arc<Mutex<SpeechLog>>,
        pub voices: Vec<Voice>,
    }

    impl SpeechBackend for MockSpeech {
        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        fn play(&mut self, utterance: Utterance, _reporter: SpeechReporter) {
            let mut log = self.log.lock().unwrap();
            log.active.push(utterance.id);
            log.played.push(utterance);
        }

        fn cancel(&mut self) {
            let mut log = self.log.lock().unwrap();
            log.active.clear();
            log.cancels += 1;
        }
    }

    fn engine(muted: bool) -> (SpeechOutputEngine, Arc<Mutex<SpeechLog>>) {
        let log = Arc::new(Mutex::new(SpeechLog::default()));
        let backend = MockSpeech {
            log: log.clone(),
            voices: vec![
                Voice { name: "Piper lessac".into(), locale: "en-US".into() },
                Voice { name: "Google US English".into(), locale: "en-US".into() },
            ],
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = SpeechOutputEngine::new(
            Box::new(backend),
            SpeechReporter::new(tx),
            "Google US English".into(),
            "en-US".into(),
            muted,
        );
        (engine, log)
    }

    #[test]
    fn test_sanitize_strips_emoji_and_markdown() {
        assert_eq!(sanitize_for_speech("**Hello** there ✨"), "Hello there");
        assert_eq!(sanitize_for_speech("# Title 🚀🔥"), "Title");
        assert_eq!(sanitize_for_speech("⚠️ CYBER PSYCHOSIS INITIATED ⚠️"), "CYBER PSYCHOSIS INITIATED");
    }

    #[test]
    fn test_sanitize_replaces_code_fences() {
        let text = "Here:\n```rust\nfn main() {}\n```\nDone";
        assert_eq!(sanitize_for_speech(text), "Here:\nI've written the code below.\nDone");
    }

    #[test]
    fn test_select_voice_prefers_name_then_locale() {
        let voices = vec![
            Voice { name: "amy".into(), locale: "en-GB".into() },
            Voice { name: "lessac".into(), locale: "en-US".into() },
        ];
        assert_eq!(select_voice(&voices, "amy", "en-US").unwrap().name, "amy");
        assert_eq!(select_voice(&voices, "Google US English", "en-US").unwrap().name, "lessac");
        assert!(select_voice(&voices, "nobody", "fr-FR").is_none());
    }

    #[test]
    fn test_speak_twice_leaves_one_active_utterance() {
        let (mut engine, log) = engine(false);

        let first = engine.speak("First answer").unwrap();
        engine.on_started(first);
        let second = engine.speak("Second answer").unwrap();
        engine.on_started(second);
        // Late end event from the cancelled utterance
        engine.on_ended(first);

        assert!(engine.is_speaking());
        assert_eq!(engine.current_utterance(), Some(second));
        assert_eq!(log.lock().unwrap().active, vec![second]);
    }

    #[test]
    fn test_end_clears_speaking() {
        let (mut engine, _log) = engine(false);

        let id = engine.speak("Hello").unwrap();
        engine.on_started(id);
        engine.on_ended(id);

        assert!(!engine.is_speaking());
        assert_eq!(engine.current_utterance(), None);
    }

    #[test]
    fn test_cancel_is_immediate() {
        let (mut engine, log) = engine(false);

        let id = engine.speak("Hello").unwrap();
        engine.on_started(id);
        engine.cancel();

        assert!(!engine.is_speaking());
        assert!(log.lock().unwrap().active.is_empty());
    }

    #[test]
    fn test_muted_is_a_no_op() {
        let (mut engine, log) = engine(true);

        assert_eq!(engine.speak("Hello"), None);
        assert!(log.lock().unwrap().played.is_empty());
    }

    #[test]
    fn test_spoken_text_is_sanitized_and_voice_selected() {
        let (mut engine, log) = engine(false);

        engine.speak("Generating visual asset... 🎨");

        let log = log.lock().unwrap();
        let utterance = &log.played[0];
        assert_eq!(utterance.text, "Generating visual asset...");
        assert_eq!(utterance.voice.as_ref().unwrap().name, "Google US English");
        assert_eq!(utterance.rate, SPEECH_RATE);
    }
}
