//! Standalone focus stopwatch.
//!
//! Unlike the per-task timer, the widget notices its own completion. Once the
//! countdown hits zero it raises `timer_completed`, which blocks the countdown
//! until the user acknowledges, and an [`AlarmLoop`] keeps sounding the alert
//! in the meantime.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::pomodoro::{PomodoroMode, PomodoroSettings};
use crate::sound::{SoundEvent, SoundPlayer};
use crate::ticker::TickDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusWidget {
    pub mode: PomodoroMode,
    pub time_left_secs: u32,
    pub is_running: bool,
    pub focus_count: u32,
    pub timer_completed: bool,
    pub next_mode: Option<PomodoroMode>,
    pub settings: PomodoroSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetAction {
    Toggle,
    Tick,
    ChangeMode(PomodoroMode),
    Reset,
    Acknowledge,
    ResetCount,
}

impl FocusWidget {
    pub fn new(settings: PomodoroSettings, focus_count: u32) -> Self {
        Self {
            mode: PomodoroMode::Focus,
            time_left_secs: settings.focus * 60,
            is_running: false,
            focus_count,
            timer_completed: false,
            next_mode: None,
            settings,
        }
    }

    pub fn duration_secs(&self, mode: PomodoroMode) -> u32 {
        self.settings.minutes_for(mode) * 60
    }

    /// Mode that follows the current one once it runs out.
    pub fn upcoming_mode(&self) -> PomodoroMode {
        match self.mode {
            PomodoroMode::Focus => self.settings.break_after(self.focus_count + 1),
            PomodoroMode::ShortBreak | PomodoroMode::LongBreak => PomodoroMode::Focus,
        }
    }

    /// Remaining share of the current period, 0 to 100.
    pub fn progress_percent(&self) -> f64 {
        let total = self.duration_secs(self.mode);
        if total == 0 {
            return 0.0;
        }
        f64::from(self.time_left_secs) / f64::from(total) * 100.0
    }

    pub fn display(&self) -> String {
        format!("{:02}:{:02}", self.time_left_secs / 60, self.time_left_secs % 60)
    }

    pub fn reduce(&self, action: WidgetAction) -> FocusWidget {
        let mut next = *self;
        match action {
            WidgetAction::Toggle => {
                if !self.timer_completed {
                    next.is_running = !self.is_running;
                }
            }
            WidgetAction::Tick => {
                if self.is_running && !self.timer_completed {
                    next.time_left_secs = self.time_left_secs.saturating_sub(1);
                    if next.time_left_secs == 0 {
                        next.is_running = false;
                        next.timer_completed = true;
                        next.next_mode = Some(self.upcoming_mode());
                    }
                }
            }
            WidgetAction::ChangeMode(mode) => {
                if !self.timer_completed {
                    next.mode = mode;
                    next.rewind();
                }
            }
            WidgetAction::Reset => {
                if !self.timer_completed {
                    next.rewind();
                }
            }
            WidgetAction::Acknowledge => {
                if self.timer_completed {
                    next.timer_completed = false;
                    if self.mode == PomodoroMode::Focus {
                        next.focus_count += 1;
                    }
                    if let Some(mode) = self.next_mode {
                        next.mode = mode;
                        next.time_left_secs = next.duration_secs(mode);
                        next.next_mode = None;
                    }
                }
            }
            WidgetAction::ResetCount => next.focus_count = 0,
        }
        next
    }

    fn rewind(&mut self) {
        self.time_left_secs = self.duration_secs(self.mode);
        self.is_running = false;
        self.timer_completed = false;
        self.next_mode = None;
    }
}

/// Repeats an alert at a fixed interval until cancelled.
#[derive(Debug, Clone)]
pub struct AlarmLoop {
    driver: TickDriver,
    cue: Option<SoundEvent>,
}

impl AlarmLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            driver: TickDriver::new(interval),
            cue: None,
        }
    }

    pub fn is_sounding(&self) -> bool {
        self.cue.is_some()
    }

    /// Play `cue` now and schedule the repeats.
    pub fn start(&mut self, cue: SoundEvent, now: Instant, sound: &mut impl SoundPlayer) {
        self.driver.disarm();
        self.cue = Some(cue);
        sound.play(cue);
        self.driver.arm(now);
    }

    /// Replay the alert if an interval has passed. Missed repeats collapse
    /// into one.
    pub fn poll(&mut self, now: Instant, sound: &mut impl SoundPlayer) -> bool {
        match self.cue {
            Some(cue) if self.driver.due(now) > 0 => {
                sound.play(cue);
                true
            }
            _ => false,
        }
    }

    /// Silence the current alert, then drop the repeat schedule.
    pub fn cancel(&mut self, sound: &mut impl SoundPlayer) {
        if self.cue.is_some() {
            sound.stop_alarm();
        }
        self.driver.disarm();
        self.cue = None;
    }
}

/// Things a widget session reports back to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetEvent {
    Completed { finished: PomodoroMode, next: PomodoroMode },
    FocusCountChanged(u32),
}

pub struct FocusWidgetSession<P: SoundPlayer> {
    widget: FocusWidget,
    driver: TickDriver,
    alarm: AlarmLoop,
    sound: P,
}

impl<P: SoundPlayer> FocusWidgetSession<P> {
    pub fn new(widget: FocusWidget, tick: Duration, alarm_interval: Duration, sound: P) -> Self {
        Self {
            widget,
            driver: TickDriver::new(tick),
            alarm: AlarmLoop::new(alarm_interval),
            sound,
        }
    }

    pub fn widget(&self) -> &FocusWidget {
        &self.widget
    }

    pub fn alarm(&self) -> &AlarmLoop {
        &self.alarm
    }

    pub fn sound(&self) -> &P {
        &self.sound
    }

    pub fn dispatch(&mut self, action: WidgetAction, now: Instant) -> Option<WidgetEvent> {
        debug!(?action, "widget action");
        let before = self.widget;

        let gated = before.timer_completed
            && matches!(action, WidgetAction::ChangeMode(_) | WidgetAction::Reset);
        if gated {
            debug!(?action, "ignored until the finished period is acknowledged");
            return None;
        }

        match action {
            WidgetAction::ChangeMode(_) | WidgetAction::Reset | WidgetAction::Acknowledge => {
                self.alarm.cancel(&mut self.sound);
            }
            _ => {}
        }

        self.widget = self.widget.reduce(action);

        match action {
            WidgetAction::Toggle if self.widget.is_running != before.is_running => {
                let cue = if self.widget.is_running {
                    SoundEvent::TaskAdd
                } else {
                    SoundEvent::TaskDelete
                };
                self.sound.play(cue);
            }
            WidgetAction::ChangeMode(_) | WidgetAction::ResetCount => {
                self.sound.play(SoundEvent::SwitchMode);
            }
            WidgetAction::Reset => self.sound.play(SoundEvent::Complete),
            _ => {}
        }

        self.driver.sync(self.widget.is_running, now);
        self.event_between(&before, now)
    }

    /// Advance the countdown and keep any alarm sounding.
    pub fn poll(&mut self, now: Instant) -> Option<WidgetEvent> {
        let mut event = None;
        for _ in 0..self.driver.due(now) {
            let before = self.widget;
            self.widget = self.widget.reduce(WidgetAction::Tick);
            event = self.event_between(&before, now).or(event);
            if !self.widget.is_running {
                break;
            }
        }
        self.driver.sync(self.widget.is_running, now);
        self.alarm.poll(now, &mut self.sound);
        event
    }

    fn event_between(&mut self, before: &FocusWidget, now: Instant) -> Option<WidgetEvent> {
        if self.widget.timer_completed && !before.timer_completed {
            let finished = self.widget.mode;
            let next = self.widget.next_mode.unwrap_or(PomodoroMode::Focus);
            info!(mode = %finished, next = %next, "widget period finished, awaiting ack");
            self.alarm.start(SoundEvent::period_end(finished), now, &mut self.sound);
            return Some(WidgetEvent::Completed { finished, next });
        }
        if self.widget.focus_count != before.focus_count {
            return Some(WidgetEvent::FocusCountChanged(self.widget.focus_count));
        }
        None
    }
}

impl<P: SoundPlayer> Drop for FocusWidgetSession<P> {
    fn drop(&mut self) {
        self.alarm.cancel(&mut self.sound);
        self.driver.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::testing::RecordingPlayer;

    const SECOND: Duration = Duration::from_secs(1);

    fn short_settings() -> PomodoroSettings {
        PomodoroSettings {
            focus: 1,
            short_break: 1,
            long_break: 2,
            long_break_interval: 4,
        }
    }

    #[test]
    fn toggle_is_blocked_while_completed() {
        let widget = FocusWidget {
            timer_completed: true,
            ..FocusWidget::new(short_settings(), 0)
        };
        assert!(!widget.reduce(WidgetAction::Toggle).is_running);
        assert_eq!(widget.reduce(WidgetAction::Tick), widget);
    }

    #[test]
    fn reaching_zero_precomputes_next_mode() {
        let widget = FocusWidget {
            time_left_secs: 1,
            is_running: true,
            focus_count: 3,
            ..FocusWidget::new(short_settings(), 0)
        };
        let done = widget.reduce(WidgetAction::Tick);
        assert!(done.timer_completed);
        assert!(!done.is_running);
        assert_eq!(done.next_mode, Some(PomodoroMode::LongBreak));
        assert_eq!(done.mode, PomodoroMode::Focus);
    }

    #[test]
    fn acknowledge_counts_focus_and_commits_next_mode() {
        let widget = FocusWidget {
            time_left_secs: 0,
            timer_completed: true,
            next_mode: Some(PomodoroMode::ShortBreak),
            ..FocusWidget::new(short_settings(), 2)
        };
        let next = widget.reduce(WidgetAction::Acknowledge);
        assert_eq!(next.focus_count, 3);
        assert_eq!(next.mode, PomodoroMode::ShortBreak);
        assert_eq!(next.display(), "01:00");
        assert!(!next.timer_completed);
        assert_eq!(next.next_mode, None);
    }

    #[test]
    fn acknowledge_without_completion_is_ignored() {
        let widget = FocusWidget::new(short_settings(), 2);
        assert_eq!(widget.reduce(WidgetAction::Acknowledge), widget);
    }

    #[test]
    fn progress_tracks_remaining_time() {
        let mut widget = FocusWidget::new(short_settings(), 0);
        assert_eq!(widget.progress_percent(), 100.0);
        widget.time_left_secs = 15;
        assert_eq!(widget.progress_percent(), 25.0);
    }

    #[test]
    fn alarm_repeats_until_acknowledged() {
        let t0 = Instant::now();
        let mut session = FocusWidgetSession::new(
            FocusWidget::new(short_settings(), 0),
            SECOND,
            SECOND * 5,
            RecordingPlayer::default(),
        );
        session.dispatch(WidgetAction::Toggle, t0);
        assert_eq!(session.sound().played, [SoundEvent::TaskAdd]);

        let event = session.poll(t0 + SECOND * 60);
        assert_eq!(
            event,
            Some(WidgetEvent::Completed {
                finished: PomodoroMode::Focus,
                next: PomodoroMode::ShortBreak,
            })
        );
        assert!(session.alarm().is_sounding());
        assert_eq!(session.sound().played.last(), Some(&SoundEvent::FocusEnd));

        // blocked while the alarm waits for acknowledgement
        session.dispatch(WidgetAction::Toggle, t0 + SECOND * 61);
        assert!(!session.widget().is_running);

        session.poll(t0 + SECOND * 65);
        session.poll(t0 + SECOND * 70);
        let alarms = session.sound().played.iter().filter(|e| **e == SoundEvent::FocusEnd).count();
        assert_eq!(alarms, 3);

        let event = session.dispatch(WidgetAction::Acknowledge, t0 + SECOND * 71);
        assert_eq!(event, Some(WidgetEvent::FocusCountChanged(1)));
        assert!(!session.alarm().is_sounding());
        assert_eq!(session.sound().alarm_stops, 1);
        assert_eq!(session.widget().mode, PomodoroMode::ShortBreak);

        session.poll(t0 + SECOND * 100);
        let alarms = session.sound().played.iter().filter(|e| **e == SoundEvent::FocusEnd).count();
        assert_eq!(alarms, 3);
    }

    #[test]
    fn mode_change_and_reset_wait_for_acknowledgement() {
        let t0 = Instant::now();
        let widget = FocusWidget {
            time_left_secs: 1,
            ..FocusWidget::new(short_settings(), 0)
        };
        let mut session =
            FocusWidgetSession::new(widget, SECOND, SECOND * 5, RecordingPlayer::default());
        session.dispatch(WidgetAction::Toggle, t0);
        session.poll(t0 + SECOND);
        assert!(session.alarm().is_sounding());
        let finished = *session.widget();

        assert_eq!(session.dispatch(WidgetAction::Reset, t0 + SECOND * 2), None);
        assert_eq!(
            session.dispatch(WidgetAction::ChangeMode(PomodoroMode::LongBreak), t0 + SECOND * 2),
            None
        );
        assert_eq!(session.widget(), &finished);
        assert!(session.alarm().is_sounding());
        assert_eq!(session.sound().alarm_stops, 0);

        let event = session.dispatch(WidgetAction::Acknowledge, t0 + SECOND * 3);
        assert_eq!(event, Some(WidgetEvent::FocusCountChanged(1)));
        assert!(!session.alarm().is_sounding());
        assert_eq!(session.widget().mode, PomodoroMode::ShortBreak);

        session.dispatch(WidgetAction::ChangeMode(PomodoroMode::LongBreak), t0 + SECOND * 4);
        assert_eq!(session.widget().display(), "02:00");
        assert_eq!(session.sound().played.last(), Some(&SoundEvent::SwitchMode));
    }

    #[test]
    fn reset_and_mode_change_are_blocked_while_completed() {
        let widget = FocusWidget {
            time_left_secs: 0,
            timer_completed: true,
            next_mode: Some(PomodoroMode::ShortBreak),
            ..FocusWidget::new(short_settings(), 2)
        };
        assert_eq!(widget.reduce(WidgetAction::Reset), widget);
        assert_eq!(widget.reduce(WidgetAction::ChangeMode(PomodoroMode::LongBreak)), widget);
        assert_eq!(widget.reduce(WidgetAction::ResetCount).focus_count, 0);
    }

    #[test]
    fn reset_count_reports_change() {
        let t0 = Instant::now();
        let mut session = FocusWidgetSession::new(
            FocusWidget::new(short_settings(), 5),
            SECOND,
            SECOND * 5,
            RecordingPlayer::default(),
        );
        assert_eq!(
            session.dispatch(WidgetAction::ResetCount, t0),
            Some(WidgetEvent::FocusCountChanged(0))
        );
    }
}
