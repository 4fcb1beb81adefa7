use crate::notify::{Notice, Severity};

pub const TAB_SWITCH_WARNING: &str = "Tab switching detected! This is counted as a cheating attempt.";
pub const FULLSCREEN_EXIT_ERROR: &str = "You exited fullscreen mode. Your exam has been submitted.";
pub const KEY_BLOCKED_WARNING: &str = "Escape and refresh are disabled during the exam.";
pub const LEAVE_BLOCKED_WARNING: &str = "Reloading or leaving the page is not allowed during the exam.";

/// A signal raised by the test-taking environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProctorSignal {
    VisibilityHidden,
    VisibilityVisible,
    WindowBlur,
    WindowFocus,
    FullscreenEntered,
    FullscreenExited,
    KeyDown(KeyPress),
    BeforeUnload,
    ContextMenu,
    SelectStart,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyPress {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            meta: false,
        }
    }

    #[must_use]
    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[must_use]
    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Escape, F5, or Ctrl/Cmd+R.
    #[must_use]
    pub fn is_escape_or_refresh(&self) -> bool {
        match self.key.as_str() {
            "Escape" | "Esc" | "F5" => true,
            key => (self.ctrl || self.meta) && key.eq_ignore_ascii_case("r"),
        }
    }
}

/// What the monitor does in response to a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProctorAction {
    Ignore,
    /// Count one cheat event, optionally warning the user.
    Cheat(Option<Notice>),
    /// Submit at once and count a cheat event, whatever the counter says.
    Terminate(Notice),
    /// Suppress the browser default; advisory only, no penalty.
    Block(Option<Notice>),
}

/// Signal to action table.
pub struct ProctorPolicy;

impl ProctorPolicy {
    #[must_use]
    pub fn action_for(signal: &ProctorSignal) -> ProctorAction {
        match signal {
            ProctorSignal::VisibilityHidden => {
                ProctorAction::Cheat(Some(Notice::new(TAB_SWITCH_WARNING, Severity::Warning)))
            }
            ProctorSignal::WindowBlur => ProctorAction::Cheat(None),
            ProctorSignal::FullscreenExited => {
                ProctorAction::Terminate(Notice::new(FULLSCREEN_EXIT_ERROR, Severity::Error))
            }
            ProctorSignal::KeyDown(key) if key.is_escape_or_refresh() => {
                ProctorAction::Block(Some(Notice::new(KEY_BLOCKED_WARNING, Severity::Warning)))
            }
            ProctorSignal::BeforeUnload => {
                ProctorAction::Block(Some(Notice::new(LEAVE_BLOCKED_WARNING, Severity::Warning)))
            }
            ProctorSignal::ContextMenu | ProctorSignal::SelectStart | ProctorSignal::Copy => {
                ProctorAction::Block(None)
            }
            ProctorSignal::VisibilityVisible
            | ProctorSignal::WindowFocus
            | ProctorSignal::FullscreenEntered
            | ProctorSignal::KeyDown(_) => ProctorAction::Ignore,
        }
    }

    /// Answered synchronously by the environment shim while dispatching the event.
    #[must_use]
    pub fn prevents_default(signal: &ProctorSignal) -> bool {
        matches!(Self::action_for(signal), ProctorAction::Block(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenState {
    Fullscreen,
    NotFullscreen,
}

impl FullscreenState {
    #[must_use]
    pub fn after(self, signal: &ProctorSignal) -> Self {
        match signal {
            ProctorSignal::FullscreenEntered => Self::Fullscreen,
            ProctorSignal::FullscreenExited => Self::NotFullscreen,
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_switch_counts_and_warns() {
        let action = ProctorPolicy::action_for(&ProctorSignal::VisibilityHidden);
        assert!(matches!(
            action,
            ProctorAction::Cheat(Some(Notice { severity: Severity::Warning, .. }))
        ));
    }

    #[test]
    fn blur_counts_silently() {
        assert_eq!(
            ProctorPolicy::action_for(&ProctorSignal::WindowBlur),
            ProctorAction::Cheat(None)
        );
    }

    #[test]
    fn fullscreen_exit_terminates_with_error() {
        let action = ProctorPolicy::action_for(&ProctorSignal::FullscreenExited);
        assert!(matches!(
            action,
            ProctorAction::Terminate(Notice { severity: Severity::Error, .. })
        ));
    }

    #[test]
    fn navigation_keys_are_blocked_but_not_penalized() {
        for key in [
            KeyPress::new("Escape"),
            KeyPress::new("F5"),
            KeyPress::new("r").with_ctrl(),
            KeyPress::new("R").with_meta(),
        ] {
            let signal = ProctorSignal::KeyDown(key);
            assert!(ProctorPolicy::prevents_default(&signal));
            assert!(matches!(
                ProctorPolicy::action_for(&signal),
                ProctorAction::Block(Some(_))
            ));
        }
        let plain = ProctorSignal::KeyDown(KeyPress::new("r"));
        assert_eq!(ProctorPolicy::action_for(&plain), ProctorAction::Ignore);
    }

    #[test]
    fn copy_and_context_menu_are_blocked_quietly() {
        for signal in [
            ProctorSignal::ContextMenu,
            ProctorSignal::SelectStart,
            ProctorSignal::Copy,
        ] {
            assert_eq!(ProctorPolicy::action_for(&signal), ProctorAction::Block(None));
        }
        assert!(ProctorPolicy::prevents_default(&ProctorSignal::BeforeUnload));
        assert!(!ProctorPolicy::prevents_default(&ProctorSignal::VisibilityHidden));
    }

    #[test]
    fn fullscreen_state_tracks_signals() {
        let state = FullscreenState::NotFullscreen
            .after(&ProctorSignal::FullscreenEntered)
            .after(&ProctorSignal::WindowBlur);
        assert_eq!(state, FullscreenState::Fullscreen);
        assert_eq!(
            state.after(&ProctorSignal::FullscreenExited),
            FullscreenState::NotFullscreen
        );
    }
}
