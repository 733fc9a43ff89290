use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::pomodoro::{PomodoroAction, PomodoroState};
use crate::sound::{SoundEvent, SoundPlayer};

/// Cancellable repeating timer.
///
/// Polled rather than threaded: the owner asks how many ticks fell due since
/// the last poll and handles them on its own thread.
#[derive(Debug, Clone)]
pub struct TickDriver {
    period: Duration,
    next_due: Option<Instant>,
}

impl TickDriver {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Start ticking one period from `now`. Re-arming an armed driver keeps
    /// its schedule.
    pub fn arm(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.period);
        }
    }

    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    /// Arm when `active`, disarm otherwise.
    pub fn sync(&mut self, active: bool, now: Instant) {
        if active {
            self.arm(now);
        } else {
            self.disarm();
        }
    }

    /// Number of ticks that elapsed up to `now`; advances the schedule.
    pub fn due(&mut self, now: Instant) -> u32 {
        let Some(mut next) = self.next_due else {
            return 0;
        };
        let mut ticks = 0;
        while next <= now {
            ticks += 1;
            next += self.period;
        }
        self.next_due = Some(next);
        ticks
    }

    /// Time left until the next tick, if armed.
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}

/// What a poll did to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    pub ticks: u32,
    pub completed: bool,
}

/// Per-task focus timer: owns the timer state, its tick driver and the sound
/// player that announces the end of each period.
pub struct FocusSession<P: SoundPlayer> {
    state: PomodoroState,
    driver: TickDriver,
    sound: P,
}

impl<P: SoundPlayer> FocusSession<P> {
    pub fn new(state: PomodoroState, period: Duration, sound: P, now: Instant) -> Self {
        let mut driver = TickDriver::new(period);
        driver.sync(state.is_active, now);
        Self { state, driver, sound }
    }

    pub fn state(&self) -> &PomodoroState {
        &self.state
    }

    pub fn driver(&self) -> &TickDriver {
        &self.driver
    }

    pub fn sound(&self) -> &P {
        &self.sound
    }

    pub fn dispatch(&mut self, action: PomodoroAction, now: Instant) -> &PomodoroState {
        if matches!(
            action,
            PomodoroAction::SwitchMode(_) | PomodoroAction::Reset | PomodoroAction::CompleteCycle
        ) {
            self.sound.stop_alarm();
        }
        self.state = self.state.reduce(action);
        self.driver.sync(self.state.is_active, now);
        &self.state
    }

    /// Handle every tick that fell due by `now`. At 00:00 the end-of-period
    /// alert plays once and the cycle is completed.
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let ticks = self.driver.due(now);

        for _ in 0..ticks {
            if !self.state.is_active {
                break;
            }
            outcome.ticks += 1;
            if self.state.is_finished() {
                let finished = self.state.mode;
                self.sound.play(SoundEvent::period_end(finished));
                self.driver.disarm();
                self.state = self.state.reduce(PomodoroAction::CompleteCycle);
                self.driver.sync(self.state.is_active, now);
                info!(
                    mode = %finished,
                    cycles = self.state.cycles,
                    next = %self.state.mode,
                    "period finished"
                );
                outcome.completed = true;
                break;
            }
            self.state = self.state.reduce(PomodoroAction::Tick);
        }

        outcome
    }

    /// Stop ticking and hand back the final state.
    pub fn finish(self) -> PomodoroState {
        self.state
    }

    fn teardown(&mut self) {
        if self.driver.is_armed() {
            debug!("disarming focus timer");
        }
        self.driver.disarm();
        self.sound.stop_alarm();
    }
}

impl<P: SoundPlayer> Drop for FocusSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
