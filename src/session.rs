use crate::router::{Theme, View};
use serde::Serialize;

/// Per-run assistant state owned by the conversation controller
///
/// `listening` and `speaking` live in the speech engines; everything else a
/// command can flip lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub muted: bool,
    pub conversation_mode: bool,
    pub matrix_overlay: bool,
    pub terminal_overlay: bool,
    pub glitch_mode: bool,
    pub view: View,
    pub theme: Theme,
    pub indicator_visible: bool,
    pub visualizer_active: bool,
}

impl Session {
    pub fn new(muted: bool) -> Self {
        Self {
            muted,
            conversation_mode: false,
            matrix_overlay: false,
            terminal_overlay: false,
            glitch_mode: false,
            view: View::Chat,
            theme: Theme::Default,
            indicator_visible: false,
            visualizer_active: false,
        }
    }
}

/// Point-in-time view of the whole session, for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub muted: bool,
    pub conversation_mode: bool,
    pub listening: bool,
    pub speaking: bool,
    pub matrix_overlay: bool,
    pub terminal_overlay: bool,
    pub glitch_mode: bool,
    pub view: View,
    pub theme: Theme,
    pub pending_requests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_on_chat_with_default_theme() {
        let session = Session::new(true);
        assert!(session.muted);
        assert!(!session.conversation_mode);
        assert_eq!(session.view, View::Chat);
        assert_eq!(session.theme, Theme::Default);
    }
}
