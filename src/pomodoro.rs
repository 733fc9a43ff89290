use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PomodoroMode {
    #[serde(alias = "pomodoro")]
    Focus,
    ShortBreak,
    LongBreak,
}

impl PomodoroMode {
    pub fn label(self) -> &'static str {
        match self {
            PomodoroMode::Focus => "Focus",
            PomodoroMode::ShortBreak => "Short break",
            PomodoroMode::LongBreak => "Long break",
        }
    }
}

impl fmt::Display for PomodoroMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PomodoroMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "focus" | "pomodoro" => Ok(PomodoroMode::Focus),
            "short" | "shortbreak" => Ok(PomodoroMode::ShortBreak),
            "long" | "longbreak" => Ok(PomodoroMode::LongBreak),
            other => Err(format!("Unknown timer mode: {}", other)),
        }
    }
}

/// Durations in minutes, plus how many focus periods earn a long break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroSettings {
    #[serde(alias = "pomodoro")]
    pub focus: u32,
    pub short_break: u32,
    pub long_break: u32,
    pub long_break_interval: u32,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            focus: 25,
            short_break: 5,
            long_break: 15,
            long_break_interval: 4,
        }
    }
}

impl PomodoroSettings {
    pub fn minutes_for(&self, mode: PomodoroMode) -> u32 {
        match mode {
            PomodoroMode::Focus => self.focus,
            PomodoroMode::ShortBreak => self.short_break,
            PomodoroMode::LongBreak => self.long_break,
        }
    }

    /// Break that follows the focus period which brought the count to `cycles`.
    /// An interval of zero never grants a long break.
    pub fn break_after(&self, cycles: u32) -> PomodoroMode {
        match cycles.checked_rem(self.long_break_interval) {
            Some(0) => PomodoroMode::LongBreak,
            _ => PomodoroMode::ShortBreak,
        }
    }

    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(focus) = patch.focus {
            self.focus = focus;
        }
        if let Some(short_break) = patch.short_break {
            self.short_break = short_break;
        }
        if let Some(long_break) = patch.long_break {
            self.long_break = long_break;
        }
        if let Some(interval) = patch.long_break_interval {
            self.long_break_interval = interval;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub focus: Option<u32>,
    pub short_break: Option<u32>,
    pub long_break: Option<u32>,
    pub long_break_interval: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroState {
    #[serde(default)]
    pub selected_todo_id: Option<i64>,
    #[serde(default)]
    pub is_active: bool,
    pub minutes: u32,
    pub seconds: u32,
    pub mode: PomodoroMode,
    #[serde(default)]
    pub cycles: u32,
    #[serde(default)]
    pub settings: PomodoroSettings,
}

impl Default for PomodoroState {
    fn default() -> Self {
        Self::with_settings(PomodoroSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PomodoroAction {
    SelectTodo(i64),
    ClosePomodoro,
    Start,
    Pause,
    Reset,
    Tick,
    SwitchMode(PomodoroMode),
    CompleteCycle,
    UpdateSettings(SettingsPatch),
}

impl PomodoroAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PomodoroAction::SelectTodo(_) => "SELECT_TODO",
            PomodoroAction::ClosePomodoro => "CLOSE_POMODORO",
            PomodoroAction::Start => "START_TIMER",
            PomodoroAction::Pause => "PAUSE_TIMER",
            PomodoroAction::Reset => "RESET_TIMER",
            PomodoroAction::Tick => "TICK",
            PomodoroAction::SwitchMode(_) => "SWITCH_MODE",
            PomodoroAction::CompleteCycle => "COMPLETE_CYCLE",
            PomodoroAction::UpdateSettings(_) => "UPDATE_SETTINGS",
        }
    }
}

impl PomodoroState {
    pub fn with_settings(settings: PomodoroSettings) -> Self {
        Self {
            selected_todo_id: None,
            is_active: false,
            minutes: settings.focus,
            seconds: 0,
            mode: PomodoroMode::Focus,
            cycles: 0,
            settings,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.minutes == 0 && self.seconds == 0
    }

    /// `MM:SS`
    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.minutes, self.seconds)
    }

    pub fn reduce(&self, action: PomodoroAction) -> PomodoroState {
        if action != PomodoroAction::Tick {
            debug!(action = action.kind(), "reducing timer action");
        }
        let mut next = *self;

        match action {
            PomodoroAction::SelectTodo(id) => {
                next.selected_todo_id = Some(id);
                next.enter_mode(PomodoroMode::Focus);
            }
            PomodoroAction::ClosePomodoro => {
                next.selected_todo_id = None;
                next.is_active = false;
            }
            PomodoroAction::Start => next.is_active = true,
            PomodoroAction::Pause => next.is_active = false,
            PomodoroAction::Reset => next.enter_mode(self.mode),
            PomodoroAction::Tick => {
                if next.seconds > 0 {
                    next.seconds -= 1;
                } else if next.minutes > 0 {
                    next.minutes -= 1;
                    next.seconds = 59;
                }
                // 00:00 stays put; completion is a separate action
            }
            PomodoroAction::CompleteCycle => {
                let mode = match self.mode {
                    PomodoroMode::Focus => {
                        next.cycles = self.cycles + 1;
                        self.settings.break_after(next.cycles)
                    }
                    PomodoroMode::ShortBreak | PomodoroMode::LongBreak => PomodoroMode::Focus,
                };
                next.enter_mode(mode);
            }
            PomodoroAction::SwitchMode(mode) => next.enter_mode(mode),
            PomodoroAction::UpdateSettings(patch) => {
                next.settings.merge(patch);
                let duration = next.settings.minutes_for(self.mode);
                if duration != self.settings.minutes_for(self.mode) {
                    next.minutes = duration;
                    next.seconds = 0;
                }
            }
        }

        next
    }

    fn enter_mode(&mut self, mode: PomodoroMode) {
        self.mode = mode;
        self.minutes = self.settings.minutes_for(mode);
        self.seconds = 0;
        self.is_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(minutes: u32, seconds: u32) -> PomodoroState {
        PomodoroState {
            minutes,
            seconds,
            ..PomodoroState::default()
        }
    }

    #[test]
    fn default_state_is_an_idle_focus_period() {
        let s = PomodoroState::default();
        assert_eq!(s.mode, PomodoroMode::Focus);
        assert_eq!(s.display(), "25:00");
        assert!(!s.is_active);
    }

    #[test]
    fn start_and_pause_only_toggle_activity() {
        let s = state(3, 14);
        let started = s.reduce(PomodoroAction::Start);
        assert!(started.is_active);
        assert_eq!((started.minutes, started.seconds), (3, 14));
        assert!(!started.reduce(PomodoroAction::Pause).is_active);
    }

    #[test]
    fn tick_wraps_seconds() {
        assert_eq!(state(2, 0).reduce(PomodoroAction::Tick).display(), "01:59");
        assert_eq!(state(2, 10).reduce(PomodoroAction::Tick).display(), "02:09");
    }

    #[test]
    fn tick_at_zero_never_changes_state() {
        let mut s = state(0, 0).reduce(PomodoroAction::Start);
        let before = s;
        for _ in 0..5 {
            s = s.reduce(PomodoroAction::Tick);
        }
        assert_eq!(s, before);
    }

    #[test]
    fn fourth_focus_period_earns_long_break() {
        let s = PomodoroState {
            cycles: 3,
            is_active: true,
            ..state(0, 0)
        };
        let next = s.reduce(PomodoroAction::CompleteCycle);
        assert_eq!(next.cycles, 4);
        assert_eq!(next.mode, PomodoroMode::LongBreak);
        assert_eq!(next.display(), "15:00");
        assert!(!next.is_active);
    }

    #[test]
    fn other_focus_periods_earn_short_break() {
        let next = state(0, 0).reduce(PomodoroAction::CompleteCycle);
        assert_eq!(next.cycles, 1);
        assert_eq!(next.mode, PomodoroMode::ShortBreak);
    }

    #[test]
    fn breaks_return_to_focus_without_counting() {
        let s = PomodoroState {
            mode: PomodoroMode::LongBreak,
            cycles: 4,
            ..state(0, 0)
        };
        let next = s.reduce(PomodoroAction::CompleteCycle);
        assert_eq!(next.mode, PomodoroMode::Focus);
        assert_eq!(next.cycles, 4);
        assert_eq!(next.display(), "25:00");
    }

    #[test]
    fn zero_interval_never_grants_long_break() {
        let mut s = state(0, 0);
        s.settings.long_break_interval = 0;
        assert_eq!(s.reduce(PomodoroAction::CompleteCycle).mode, PomodoroMode::ShortBreak);
    }

    #[test]
    fn switch_mode_resets_countdown() {
        let s = state(7, 7).reduce(PomodoroAction::Start);
        let next = s.reduce(PomodoroAction::SwitchMode(PomodoroMode::ShortBreak));
        assert_eq!(next.display(), "05:00");
        assert!(!next.is_active);
    }

    #[test]
    fn reset_keeps_cycles() {
        let s = PomodoroState {
            cycles: 2,
            is_active: true,
            ..state(3, 3)
        };
        let next = s.reduce(PomodoroAction::Reset);
        assert_eq!(next.display(), "25:00");
        assert_eq!(next.cycles, 2);
        assert!(!next.is_active);
    }

    #[test]
    fn settings_change_rebaselines_current_mode_only() {
        let s = state(12, 30);
        let longer_focus = s.reduce(PomodoroAction::UpdateSettings(SettingsPatch {
            focus: Some(50),
            ..SettingsPatch::default()
        }));
        assert_eq!(longer_focus.display(), "50:00");

        let other_mode = s.reduce(PomodoroAction::UpdateSettings(SettingsPatch {
            long_break: Some(30),
            ..SettingsPatch::default()
        }));
        assert_eq!(other_mode.display(), "12:30");
        assert_eq!(other_mode.settings.long_break, 30);
    }

    #[test]
    fn select_and_close_todo() {
        let s = state(3, 3).reduce(PomodoroAction::Start);
        let selected = s.reduce(PomodoroAction::SelectTodo(9));
        assert_eq!(selected.selected_todo_id, Some(9));
        assert_eq!(selected.display(), "25:00");
        assert!(!selected.is_active);

        let closed = selected.reduce(PomodoroAction::Start).reduce(PomodoroAction::ClosePomodoro);
        assert_eq!(closed.selected_todo_id, None);
        assert!(!closed.is_active);
    }

    #[test]
    fn legacy_mode_name_is_accepted() {
        let json = r#"{"selectedTodoId":null,"isActive":false,"minutes":4,"seconds":2,
            "mode":"pomodoro","cycles":1,
            "settings":{"pomodoro":30,"shortBreak":5,"longBreak":15,"longBreakInterval":4}}"#;
        let s: PomodoroState = serde_json::from_str(json).unwrap();
        assert_eq!(s.mode, PomodoroMode::Focus);
        assert_eq!(s.settings.focus, 30);
        let back = serde_json::to_value(s).unwrap();
        assert_eq!(back["mode"], "focus");
    }
}
