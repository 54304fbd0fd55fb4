//! Conversation Controller
//!
//! The turn-taking state machine. Owns the session, both speech engines, the
//! turn log and the generation backend, and consumes one mailbox of `Event`s.
//! Handlers never block: remote calls and timers run as spawned tasks that
//! post their completion back to the mailbox, where it is applied in arrival
//! order. There is no queueing and no staleness check; a late completion
//! still lands in the log.

use crate::database::{Database, Settings, Turn};
use crate::events::{Event, EventReceiver, EventSender, SoundCue, SpeechReporter, UiEvent, UiSender};
use crate::remote::{GenerationBackend, GenerationError, ImagePayload, CONTEXT_WINDOW};
use crate::router::{CommandRouter, LocalActions, RouteResult, Theme, View};
use crate::session::{Session, SessionStatus};
use crate::speech_input::{
    interpret_transcript, Heard, RecognitionError, Recognizer, RestartOutcome, SpeechInputEngine,
    RESTART_RETRY_DELAY, WAKE_ACKNOWLEDGEMENT,
};
use crate::speech_output::{SpeechBackend, SpeechOutputEngine};
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

const DECORATIVE_EMOJI: [&str; 10] = ["✨", "🚀", "💻", "🔥", "🤖", "💖", "👀", "💅", "🎮", "🧠"];

const WELCOME_MESSAGE: &str = "Welcome to JOINT HUB. I am Liz, System Admin. How may i assist you today.";
const HISTORY_LOADED: &str = "History loaded successfully.";
const MIC_BLOCKED: &str = "Mic permission blocked! Please check your system settings and make sure microphone access is granted.";
const MIC_START_FAILED: &str = "Could not start microphone. Check if it's already running or if permission is granted.";

const IMAGE_PENDING_DISPLAY: &str = "Generating visual asset... 🎨";
const IMAGE_PENDING_SPOKEN: &str = "Generating visual asset.";
const IMAGE_DONE_SPOKEN: &str = "Render complete.";
const IMAGE_FAILED_DISPLAY: &str = "Visual render failed. Check server logs. ❌";
const IMAGE_FAILED_SPOKEN: &str = "Visual render failed.";
const TEXT_FAILED_SPOKEN: &str = "A critical system error occurred.";

const TIMER_DONE_DISPLAY: &str = "Timer complete! 🚨";
const TIMER_DONE_SPOKEN: &str = "Timer complete.";
const UNMUTED_SPOKEN: &str = "Systems online.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    AwaitingLocalResult,
    AwaitingRemoteText,
    AwaitingRemoteImage,
}

pub struct ConversationController {
    db: Database,
    settings: Settings,
    router: CommandRouter,
    input: SpeechInputEngine,
    output: SpeechOutputEngine,
    backend: Arc<dyn GenerationBackend>,
    session: Session,
    routing: bool,
    pending_text: usize,
    pending_image: usize,
    next_timer: u64,
    mailbox: EventSender,
    ui: UiSender,
}

impl ConversationController {
    pub fn new(
        db: Database,
        settings: Settings,
        recognizer: Box<dyn Recognizer>,
        speech: Box<dyn SpeechBackend>,
        backend: Arc<dyn GenerationBackend>,
        mailbox: EventSender,
        ui: UiSender,
    ) -> Self {
        let output = SpeechOutputEngine::new(
            speech,
            SpeechReporter::new(mailbox.clone()),
            settings.voice_name.clone(),
            settings.voice_locale.clone(),
            settings.muted,
        );

        Self {
            db,
            session: Session::new(settings.muted),
            settings,
            router: CommandRouter::default(),
            input: SpeechInputEngine::new(recognizer),
            output,
            backend,
            routing: false,
            pending_text: 0,
            pending_image: 0,
            next_timer: 1,
            mailbox,
            ui,
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.routing {
            ControllerState::AwaitingLocalResult
        } else if self.pending_image > 0 {
            ControllerState::AwaitingRemoteImage
        } else if self.pending_text > 0 {
            ControllerState::AwaitingRemoteText
        } else {
            ControllerState::Idle
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            muted: self.session.muted,
            conversation_mode: self.session.conversation_mode,
            listening: self.input.is_listening(),
            speaking: self.output.is_speaking(),
            matrix_overlay: self.session.matrix_overlay,
            terminal_overlay: self.session.terminal_overlay,
            glitch_mode: self.session.glitch_mode,
            view: self.session.view,
            theme: self.session.theme,
            pending_requests: self.pending_text + self.pending_image,
        }
    }

    /// Greet on an empty log, otherwise replay the stored history
    pub fn startup(&mut self) {
        if self.session.muted {
            self.emit(UiEvent::Muted { muted: true });
        }

        let history = match self.db.load_turns() {
            Ok(turns) => turns,
            Err(e) => {
                log::error!("Failed to load history: {}", e);
                Vec::new()
            }
        };

        if history.is_empty() {
            self.display(Turn::assistant(format!("{} 🤖", WELCOME_MESSAGE)));
            self.output.speak(WELCOME_MESSAGE);
            return;
        }

        log::info!("Replaying {} stored turn(s)", history.len());
        for turn in history {
            self.emit(UiEvent::Message { turn });
        }
        self.display(Turn::system(HISTORY_LOADED));
    }

    /// Consume the mailbox until shutdown
    pub async fn run(mut self, mut mailbox: EventReceiver) {
        self.startup();

        while let Some(event) = mailbox.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        self.output.cancel();
        if self.input.is_listening() {
            self.input.stop();
        }
        log::info!("Conversation controller stopped");
    }

    /// Apply one event; returns `false` on shutdown
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::UserText(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.submit(text);
                }
            }
            Event::ToggleMic => self.toggle_mic(),
            Event::ToggleMute => self.toggle_mute(),
            Event::Transcript(transcript) => self.on_transcript(&transcript),
            Event::RecognitionEnded => {
                let outcome = self.input.on_end();
                self.on_restart_outcome(outcome);
            }
            Event::RecognitionFailed(error) => self.on_recognition_error(error),
            Event::RestartRetry => {
                let outcome = self.input.on_retry();
                self.on_restart_outcome(outcome);
            }
            Event::SpeechStarted(id) => self.output.on_started(id),
            Event::SpeechEnded(id) => self.output.on_ended(id),
            Event::TextGenerated(result) => self.on_text_generated(result),
            Event::ImageGenerated(result) => self.on_image_generated(result),
            Event::TimerFinished(timer) => {
                log::info!("Timer {} finished", timer);
                self.emit(UiEvent::TimerHidden { timer });
                self.play(SoundCue::Alert);
                self.display(Turn::assistant(TIMER_DONE_DISPLAY));
                self.output.speak(TIMER_DONE_SPOKEN);
            }
            Event::Shutdown => {
                log::info!("Shutdown requested");
                return false;
            }
        }

        true
    }

    /// Display a user turn and act on it
    fn submit(&mut self, text: &str) {
        // Snapshot before the new turn lands so the prompt is not sent twice
        let context = match self.db.recent_context(CONTEXT_WINDOW) {
            Ok(turns) => turns,
            Err(e) => {
                log::warn!("Failed to read context, sending prompt alone: {}", e);
                Vec::new()
            }
        };

        self.display(Turn::user(text));
        self.process(text, context);
    }

    fn process(&mut self, input: &str, context: Vec<Turn>) {
        self.routing = true;
        self.emit(UiEvent::Loading { active: true });

        let router = self.router;
        let result = router.route(input, self);
        self.routing = false;

        match result {
            RouteResult::Local { output } => {
                self.say(&output);
                self.refresh_loading();
            }
            RouteResult::Handled => self.refresh_loading(),
            RouteResult::ImageRequest { prompt } => {
                self.display(Turn::assistant(IMAGE_PENDING_DISPLAY));
                self.output.speak(IMAGE_PENDING_SPOKEN);
                self.spawn_image(prompt);
            }
            RouteResult::RemoteChat { prompt } => self.spawn_text(prompt, context),
        }
    }

    fn spawn_text(&mut self, prompt: String, context: Vec<Turn>) {
        self.pending_text += 1;
        let backend = self.backend.clone();
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let result = backend.generate_text(&prompt, &context).await;
            let _ = mailbox.send(Event::TextGenerated(result));
        });
    }

    fn spawn_image(&mut self, prompt: String) {
        self.pending_image += 1;
        let backend = self.backend.clone();
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let result = backend.generate_image(&prompt).await;
            let _ = mailbox.send(Event::ImageGenerated(result));
        });
    }

    fn on_text_generated(&mut self, result: Result<String, GenerationError>) {
        self.pending_text = self.pending_text.saturating_sub(1);
        self.refresh_loading();

        match result {
            Ok(text) => {
                let emoji = DECORATIVE_EMOJI
                    .choose(&mut rand::thread_rng())
                    .copied()
                    .unwrap_or("✨");
                self.display(Turn::assistant(format!("{} {}", text, emoji)));
                self.output.speak(&text);
            }
            Err(e) => {
                log::error!("Text generation failed: {}", e);
                self.play(SoundCue::Alert);
                self.display(Turn::assistant(format!("{} 💀", e.sentinel())));
                self.output.speak(TEXT_FAILED_SPOKEN);
            }
        }
    }

    fn on_image_generated(&mut self, result: Result<ImagePayload, GenerationError>) {
        self.pending_image = self.pending_image.saturating_sub(1);
        self.refresh_loading();

        match result {
            Ok(image) => {
                self.display(Turn::image(image.to_data_url()));
                self.output.speak(IMAGE_DONE_SPOKEN);
            }
            Err(e) => {
                log::error!("Image generation failed: {}", e);
                self.display(Turn::assistant(IMAGE_FAILED_DISPLAY));
                self.output.speak(IMAGE_FAILED_SPOKEN);
                self.play(SoundCue::Alert);
            }
        }
    }

    fn on_transcript(&mut self, transcript: &str) {
        if !self.input.is_listening() {
            log::debug!("Dropping transcript while not listening: '{}'", transcript);
            return;
        }

        log::debug!("Heard: '{}'", transcript);

        // The user always wins over playback
        if self.output.current_utterance().is_some() {
            log::info!("Interruption detected");
            self.output.cancel();
        }

        match interpret_transcript(
            transcript,
            self.session.conversation_mode,
            &self.settings.wake_phrase,
        ) {
            Heard::Command(command) => self.submit(&command),
            Heard::Acknowledge => {
                self.output.speak(WAKE_ACKNOWLEDGEMENT);
            }
            Heard::Ignored => {}
        }
    }

    fn on_restart_outcome(&mut self, outcome: RestartOutcome) {
        match outcome {
            RestartOutcome::RetryScheduled => {
                let mailbox = self.mailbox.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(RESTART_RETRY_DELAY).await;
                    let _ = mailbox.send(Event::RestartRetry);
                });
            }
            RestartOutcome::PermissionDenied => self.permission_denied(),
            RestartOutcome::NotListening | RestartOutcome::Restarted => {}
            RestartOutcome::Failed(reason) => {
                log::warn!("Recognition not restarted: {}", reason);
                self.emit(UiEvent::Listening { active: false });
                self.set_visualizer(false);
            }
        }
    }

    fn on_recognition_error(&mut self, error: RecognitionError) {
        log::error!("Speech recognition error: {}", error);

        if error == RecognitionError::PermissionDenied {
            self.input.force_stop();
            self.permission_denied();
        }
    }

    fn permission_denied(&mut self) {
        self.emit(UiEvent::Listening { active: false });
        self.set_visualizer(false);
        self.display(Turn::assistant(MIC_BLOCKED));
    }

    fn toggle_mic(&mut self) {
        if self.input.is_listening() {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    fn start_listening(&mut self) {
        match self.input.start() {
            Ok(()) => self.emit(UiEvent::Listening { active: true }),
            Err(e) => {
                log::error!("Recognition start failed (mic toggle): {}", e);
                self.emit(UiEvent::Listening { active: false });
                self.display(Turn::assistant(MIC_START_FAILED));
            }
        }
    }

    fn stop_listening(&mut self) {
        self.input.stop();
        self.emit(UiEvent::Listening { active: false });
        self.set_visualizer(false);
    }

    fn toggle_mute(&mut self) {
        let muted = !self.session.muted;
        self.session.muted = muted;
        self.output.set_muted(muted);
        self.settings.muted = muted;
        if let Err(e) = self.db.save_muted(muted) {
            log::warn!("Failed to persist mute flag: {}", e);
        }

        log::info!("Speech output {}", if muted { "muted" } else { "unmuted" });
        self.emit(UiEvent::Muted { muted });

        if !muted {
            self.output.speak(UNMUTED_SPOKEN);
        }
    }

    fn set_visualizer(&mut self, active: bool) {
        self.session.visualizer_active = active;
        self.emit(UiEvent::Visualizer { active });
    }

    fn refresh_loading(&mut self) {
        if self.pending_text + self.pending_image == 0 {
            self.emit(UiEvent::Loading { active: false });
        }
    }

    /// Display and speak an assistant reply
    fn say(&mut self, text: &str) {
        self.display(Turn::assistant(text));
        self.output.speak(text);
    }

    /// Render a turn and persist it unless it is a system notice
    fn display(&mut self, turn: Turn) {
        if let Err(e) = self.db.append_turn(&turn) {
            log::error!("Failed to persist turn: {}", e);
        }
        self.emit(UiEvent::Message { turn });
    }

    fn play(&mut self, cue: SoundCue) {
        if !self.session.muted {
            self.emit(UiEvent::Sound { cue });
        }
    }

    fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            log::debug!("UI receiver dropped; event discarded");
        }
    }
}

impl LocalActions for ConversationController {
    fn navigate(&mut self, view: View) {
        log::info!("Navigating to {:?}", view);
        self.play(SoundCue::Click);
        self.session.view = view;
        self.emit(UiEvent::Navigate { view });
    }

    fn clear_history(&mut self) {
        if let Err(e) = self.db.clear_turns() {
            log::error!("Failed to clear turn log: {}", e);
        }
        self.emit(UiEvent::ClearMessages);
    }

    fn toggle_conversation_mode(&mut self) -> bool {
        let enabled = !self.session.conversation_mode;
        self.session.conversation_mode = enabled;
        self.session.indicator_visible = enabled;
        self.emit(UiEvent::ConversationIndicator { visible: enabled });

        if enabled {
            if !self.input.is_listening() {
                self.start_listening();
            }
            self.set_visualizer(true);
        } else {
            if self.input.is_listening() {
                self.stop_listening();
            }
            self.set_visualizer(false);
        }

        log::info!("Conversation mode {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    fn toggle_matrix(&mut self) -> bool {
        self.session.matrix_overlay = !self.session.matrix_overlay;
        self.emit(UiEvent::MatrixOverlay { visible: self.session.matrix_overlay });
        self.session.matrix_overlay
    }

    fn open_terminal(&mut self) {
        self.session.terminal_overlay = true;
        self.emit(UiEvent::TerminalOverlay { visible: true });
    }

    fn toggle_glitch(&mut self) -> bool {
        self.session.glitch_mode = !self.session.glitch_mode;
        self.emit(UiEvent::GlitchMode { active: self.session.glitch_mode });
        self.session.glitch_mode
    }

    fn apply_theme(&mut self, theme: Theme) {
        log::info!("Theme changed to {}", theme.name());
        self.session.theme = theme;
        self.emit(UiEvent::ThemeChanged { theme });
    }

    fn start_timer(&mut self, duration: Duration) {
        let timer = self.next_timer;
        self.next_timer += 1;

        let total = duration.as_secs();
        log::info!("Timer {} started for {}s", timer, total);
        self.emit(UiEvent::TimerTick { timer, remaining_secs: total });

        let ui = self.ui.clone();
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // First tick completes immediately
            ticker.tick().await;
            for remaining in (0..total).rev() {
                ticker.tick().await;
                let _ = ui.send(UiEvent::TimerTick { timer, remaining_secs: remaining });
            }
            let _ = mailbox.send(Event::TimerFinished(timer));
        });
    }

    fn announce(&mut self, text: &str) {
        self.display(Turn::assistant(text));
    }

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
