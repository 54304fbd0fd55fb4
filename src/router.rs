// Command Router
//
// Matches free-form input against an ordered table of local command phrases
// before anything goes to the remote model. Matching is case-insensitive
// substring containment, tested in table order; the first hit wins. A phrase
// that is contained in a later, more specific phrase shadows it, so the order
// of `COMMAND_TABLE` is part of the behavior.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

/// Prompt used when the user asks for a joke
pub const JOKE_PROMPT: &str = "Tell me a short, friendly joke.";

/// Prefixes that turn the input into an image request, checked in order
pub const IMAGE_TRIGGERS: [&str; 3] = ["create image", "generate", "draw"];

/// Local intents the router can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    GoToApps,
    GoToGames,
    GoToChat,
    ClearHistory,
    ToggleConversationMode,
    CurrentTime,
    Joke,
    SetTheme,
    ToggleMatrix,
    OpenTerminal,
    ToggleGlitch,
    ThemeRoulette,
    SetTimer,
}

/// The command table, in matching order
pub static COMMAND_TABLE: &[(&str, LocalCommand)] = &[
    ("go to apps", LocalCommand::GoToApps),
    ("open apps", LocalCommand::GoToApps),
    ("go to games", LocalCommand::GoToGames),
    ("open games", LocalCommand::GoToGames),
    ("go to chat", LocalCommand::GoToChat),
    ("clear", LocalCommand::ClearHistory),
    ("convo mode", LocalCommand::ToggleConversationMode),
    ("what time is it", LocalCommand::CurrentTime),
    ("tell me a joke", LocalCommand::Joke),
    ("set theme", LocalCommand::SetTheme),
    ("matrix mode", LocalCommand::ToggleMatrix),
    ("hacker terminal", LocalCommand::OpenTerminal),
    ("cyber psychosis", LocalCommand::ToggleGlitch),
    ("theme roulette", LocalCommand::ThemeRoulette),
    ("set timer", LocalCommand::SetTimer),
];

static RE_FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Chat,
    Apps,
    Games,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Solar,
    Ocean,
    Forest,
    Royal,
}

impl Theme {
    pub const ALL: [Theme; 5] = [Theme::Solar, Theme::Ocean, Theme::Forest, Theme::Royal, Theme::Default];

    pub fn name(&self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Solar => "solar",
            Theme::Ocean => "ocean",
            Theme::Forest => "forest",
            Theme::Royal => "royal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Exact name first, then the first theme whose name contains `fragment`
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        if fragment.is_empty() {
            return None;
        }
        Self::from_name(fragment)
            .or_else(|| Self::ALL.into_iter().find(|t| t.name().contains(fragment)))
    }
}

/// Input validation failures; the message is what the assistant says back
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Theme \"{0}\" not found. Available themes are: solar, ocean, forest, royal, or default.")]
    UnknownTheme(String),

    #[error("Please specify a time duration.")]
    MissingDuration,
}

/// Outcome of routing one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteResult {
    /// Handled locally; speak and display `output`
    Local { output: String },
    ImageRequest { prompt: String },
    RemoteChat { prompt: String },
    /// Handled locally with no reply
    Handled,
}

/// What the input asks for, before any handler runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Local { phrase: &'static str, command: LocalCommand },
    Image { prompt: String },
    Chat { prompt: String },
}

/// Side effects a local command may perform
pub trait LocalActions {
    fn navigate(&mut self, view: View);
    fn clear_history(&mut self);
    /// Returns the new conversation mode
    fn toggle_conversation_mode(&mut self) -> bool;
    /// Returns whether the overlay is now visible
    fn toggle_matrix(&mut self) -> bool;
    fn open_terminal(&mut self);
    /// Returns whether glitch mode is now on
    fn toggle_glitch(&mut self) -> bool;
    fn apply_theme(&mut self, theme: Theme);
    fn start_timer(&mut self, duration: Duration);
    /// Display-only assistant message emitted before the command's reply
    fn announce(&mut self, text: &str);
    fn now(&self) -> DateTime<Local>;
}

/// Theme named by the words after the last "theme"
pub fn parse_theme_argument(input: &str) -> Result<Theme, CommandError> {
    let lower = input.to_lowercase();
    let name = lower.rsplit("theme").next().unwrap_or("").trim().to_string();

    Theme::from_fragment(&name).ok_or(CommandError::UnknownTheme(name))
}

/// Countdown length from the first ASCII integer in the input
///
/// Minutes when the input mentions "minute", seconds otherwise. Zero counts
/// as missing; values past `u64::MAX` saturate.
pub fn parse_timer_duration(input: &str) -> Result<(u64, bool), CommandError> {
    let amount = RE_FIRST_NUMBER
        .find(input)
        .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
        .filter(|n| *n > 0)
        .ok_or(CommandError::MissingDuration)?;

    let in_minutes = input.to_lowercase().contains("minute");
    Ok((amount, in_minutes))
}

#[derive(Debug, Clone, Copy)]
pub struct CommandRouter {
    table: &'static [(&'static str, LocalCommand)],
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self { table: COMMAND_TABLE }
    }
}

impl CommandRouter {
    pub fn with_table(table: &'static [(&'static str, LocalCommand)]) -> Self {
        Self { table }
    }

    /// First table entry contained in the input
    pub fn match_command(&self, input: &str) -> Option<(&'static str, LocalCommand)> {
        let lower = input.to_lowercase();
        self.table
            .iter()
            .find(|(phrase, _)| lower.contains(phrase))
            .copied()
    }

    pub fn classify(&self, input: &str) -> Intent {
        if let Some((phrase, command)) = self.match_command(input) {
            return Intent::Local { phrase, command };
        }

        let lower = input.to_lowercase();
        if let Some(trigger) = IMAGE_TRIGGERS.iter().find(|t| lower.starts_with(*t)) {
            // Triggers are ASCII, so the byte offset is valid in the original input
            let prompt = input.get(trigger.len()..).unwrap_or("").trim().to_string();
            return Intent::Image { prompt };
        }

        Intent::Chat { prompt: input.to_string() }
    }

    /// Classify the input and run any local handler against `actions`
    pub fn route(&self, input: &str, actions: &mut dyn LocalActions) -> RouteResult {
        match self.classify(input) {
            Intent::Image { prompt } => RouteResult::ImageRequest { prompt },
            Intent::Chat { prompt } => RouteResult::RemoteChat { prompt },
            Intent::Local { phrase, command } => {
                log::info!("Local command matched: '{}'", phrase);
                Self::execute(command, input, actions)
            }
        }
    }

    fn execute(command: LocalCommand, input: &str, actions: &mut dyn LocalActions) -> RouteResult {
        let output = match command {
            LocalCommand::GoToApps => {
                actions.navigate(View::Apps);
                return RouteResult::Handled;
            }
            LocalCommand::GoToGames => {
                actions.navigate(View::Games);
                return RouteResult::Handled;
            }
            LocalCommand::GoToChat => {
                actions.navigate(View::Chat);
                return RouteResult::Handled;
            }
            LocalCommand::Joke => {
                return RouteResult::RemoteChat { prompt: JOKE_PROMPT.to_string() };
            }
            LocalCommand::ClearHistory => {
                actions.clear_history();
                "Interface and history cleared.".to_string()
            }
            LocalCommand::ToggleConversationMode => {
                if actions.toggle_conversation_mode() {
                    "Conversation mode active. I'm all ears. 🎙️".to_string()
                } else {
                    "Conversation mode disabled.".to_string()
                }
            }
            LocalCommand::CurrentTime => {
                format!("The current time is {}.", actions.now().format("%I:%M %p"))
            }
            LocalCommand::SetTheme => match parse_theme_argument(input) {
                Ok(theme) => {
                    actions.apply_theme(theme);
                    format!("Theme set to {}. 💅", theme.name())
                }
                Err(e) => e.to_string(),
            },
            LocalCommand::ToggleMatrix => {
                if actions.toggle_matrix() {
                    "Entering the Matrix.".to_string()
                } else {
                    "Matrix disconnected.".to_string()
                }
            }
            LocalCommand::OpenTerminal => {
                actions.open_terminal();
                "Accessing root mainframe...".to_string()
            }
            LocalCommand::ToggleGlitch => {
                actions.announce("⚠️ CYBER PSYCHOSIS INITIATED ⚠️");
                actions.toggle_glitch();
                "Reality distorted.".to_string()
            }
            LocalCommand::ThemeRoulette => {
                let theme = *Theme::ALL
                    .choose(&mut rand::thread_rng())
                    .unwrap_or(&Theme::Default);
                actions.apply_theme(theme);
                "Visual theme reconfigured.".to_string()
            }
            LocalCommand::SetTimer => match parse_timer_duration(input) {
                Ok((amount, in_minutes)) => {
                    let seconds = if in_minutes { amount.saturating_mul(60) } else { amount };
                    actions.start_timer(Duration::from_secs(seconds));
                    let unit = match (in_minutes, amount == 1) {
                        (true, true) => "minute",
                        (true, false) => "minutes",
                        (false, true) => "second",
                        (false, false) => "seconds",
                    };
                    format!("Timer set for {} {}. ⏳", amount, unit)
                }
                Err(e) => e.to_string(),
            },
        };

        RouteResult::Local { output }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Default)]
    struct RecordingActions {
        views: Vec<View>,
        cleared: bool,
        conversation_mode: bool,
        matrix: bool,
        terminal: bool,
        glitch: bool,
        theme: Theme,
        timers: Vec<Duration>,
        announcements: Vec<String>,
    }

    impl LocalActions for RecordingActions {
        fn navigate(&mut self, view: View) {
            self.views.push(view);
        }
        fn clear_history(&mut self) {
            self.cleared = true;
        }
        fn toggle_conversation_mode(&mut self) -> bool {
            self.conversation_mode = !self.conversation_mode;
            self.conversation_mode
        }
        fn toggle_matrix(&mut self) -> bool {
            self.matrix = !self.matrix;
            self.matrix
        }
        fn open_terminal(&mut self) {
            self.terminal = true;
        }
        fn toggle_glitch(&mut self) -> bool {
            self.glitch = !self.glitch;
            self.glitch
        }
        fn apply_theme(&mut self, theme: Theme) {
            self.theme = theme;
        }
        fn start_timer(&mut self, duration: Duration) {
            self.timers.push(duration);
        }
        fn announce(&mut self, text: &str) {
            self.announcements.push(text.to_string());
        }
        fn now(&self) -> DateTime<Local> {
            Local.with_ymd_and_hms(2024, 5, 1, 15, 4, 0).unwrap()
        }
    }

    fn route(input: &str) -> (RouteResult, RecordingActions) {
        let mut actions = RecordingActions::default();
        let result = CommandRouter::default().route(input, &mut actions);
        (result, actions)
    }

    fn local(output: &str) -> RouteResult {
        RouteResult::Local { output: output.to_string() }
    }

    #[test]
    fn test_earlier_phrase_shadows_later_one() {
        static TABLE: &[(&str, LocalCommand)] = &[
            ("timer", LocalCommand::CurrentTime),
            ("set timer", LocalCommand::SetTimer),
        ];
        let router = CommandRouter::with_table(TABLE);

        assert_eq!(
            router.match_command("set timer 5"),
            Some(("timer", LocalCommand::CurrentTime))
        );
    }

    #[test]
    fn test_clear_shadows_anything_containing_it() {
        // "unclear" contains "clear", which sits before "theme roulette"
        let (result, actions) = route("unclear theme roulette");
        assert_eq!(result, local("Interface and history cleared."));
        assert!(actions.cleared);
        assert_eq!(actions.theme, Theme::Default);
    }

    #[test]
    fn test_navigation_is_handled_without_output() {
        let (result, actions) = route("Please OPEN GAMES");
        assert_eq!(result, RouteResult::Handled);
        assert_eq!(actions.views, vec![View::Games]);
    }

    #[test]
    fn test_set_theme_ocean() {
        let (result, actions) = route("set theme ocean");
        assert_eq!(result, local("Theme set to ocean. 💅"));
        assert_eq!(actions.theme, Theme::Ocean);
    }

    #[test]
    fn test_set_theme_unknown_keeps_state() {
        let mut actions = RecordingActions { theme: Theme::Royal, ..Default::default() };
        let result = CommandRouter::default().route("set theme nonexistent", &mut actions);

        assert_eq!(
            result,
            local("Theme \"nonexistent\" not found. Available themes are: solar, ocean, forest, royal, or default.")
        );
        assert_eq!(actions.theme, Theme::Royal);
    }

    #[test]
    fn test_set_theme_partial_name() {
        let (result, actions) = route("set theme sol");
        assert_eq!(result, local("Theme set to solar. 💅"));
        assert_eq!(actions.theme, Theme::Solar);

        assert_eq!(parse_theme_argument("set theme"), Err(CommandError::UnknownTheme(String::new())));
    }

    #[test]
    fn test_set_theme_default() {
        let mut actions = RecordingActions { theme: Theme::Solar, ..Default::default() };
        CommandRouter::default().route("Set Theme Default", &mut actions);
        assert_eq!(actions.theme, Theme::Default);
    }

    #[test]
    fn test_timer_in_minutes() {
        let (result, actions) = route("set timer 5 minutes");
        assert_eq!(actions.timers, vec![Duration::from_secs(300)]);
        assert_eq!(result, local("Timer set for 5 minutes. ⏳"));
    }

    #[test]
    fn test_timer_in_seconds() {
        let (result, actions) = route("set timer 10");
        assert_eq!(actions.timers, vec![Duration::from_secs(10)]);
        assert_eq!(result, local("Timer set for 10 seconds. ⏳"));
    }

    #[test]
    fn test_timer_without_duration() {
        let (result, actions) = route("set timer");
        assert_eq!(result, local("Please specify a time duration."));
        assert!(actions.timers.is_empty());

        let (_, actions) = route("set timer 0");
        assert!(actions.timers.is_empty());
    }

    #[test]
    fn test_timer_takes_first_ascii_number() {
        assert_eq!(parse_timer_duration("set timer ٥ then 10"), Ok((10, false)));
        assert_eq!(
            parse_timer_duration("set timer 99999999999999999999 minutes"),
            Ok((u64::MAX, true))
        );
    }

    #[test]
    fn test_current_time() {
        let (result, _) = route("hey, what time is it?");
        assert_eq!(result, local("The current time is 03:04 PM."));
    }

    #[test]
    fn test_joke_goes_remote() {
        let (result, _) = route("Tell me a joke");
        assert_eq!(result, RouteResult::RemoteChat { prompt: JOKE_PROMPT.to_string() });
    }

    #[test]
    fn test_conversation_mode_toggle_messages() {
        let mut actions = RecordingActions::default();
        let router = CommandRouter::default();

        assert_eq!(
            router.route("convo mode", &mut actions),
            local("Conversation mode active. I'm all ears. 🎙️")
        );
        assert_eq!(router.route("convo mode", &mut actions), local("Conversation mode disabled."));
    }

    #[test]
    fn test_glitch_announces_first() {
        let (result, actions) = route("cyber psychosis");
        assert_eq!(result, local("Reality distorted."));
        assert_eq!(actions.announcements, vec!["⚠️ CYBER PSYCHOSIS INITIATED ⚠️"]);
        assert!(actions.glitch);
    }

    #[test]
    fn test_image_trigger_is_stripped() {
        let (result, _) = route("generate a red fox");
        assert_eq!(result, RouteResult::ImageRequest { prompt: "a red fox".to_string() });

        let (result, _) = route("Create image of A Castle");
        assert_eq!(result, RouteResult::ImageRequest { prompt: "of A Castle".to_string() });

        let (result, _) = route("Draw a cat");
        assert_eq!(result, RouteResult::ImageRequest { prompt: "a cat".to_string() });
    }

    #[test]
    fn test_local_match_beats_image_trigger() {
        let (result, _) = route("draw the matrix mode");
        assert_eq!(result, local("Entering the Matrix."));
    }

    #[test]
    fn test_everything_else_goes_to_chat() {
        let (result, _) = route("Explain black holes");
        assert_eq!(result, RouteResult::RemoteChat { prompt: "Explain black holes".to_string() });
    }
}
