use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::Task;
use crate::persistence::{
    self, POMODORO_STATE_KEY, PersistenceObserver, Preferences, TASK_STATE_KEY, Theme,
};
use crate::pipeline::{apply_filters, available_categories};
use crate::pomodoro::{PomodoroAction, PomodoroSettings, PomodoroState};
use crate::sound::{SoundEvent, SoundPlayer};
use crate::storage::KeyValueStore;
use crate::store::{TaskAction, TaskState, TaskStore};
use crate::ticker::FocusSession;
use crate::widget::{FocusWidget, FocusWidgetSession, WidgetAction, WidgetEvent};

/// Application core: the task store, the per-task timer and the preferences,
/// wired to storage and sound.
pub struct App<S: KeyValueStore, P: SoundPlayer> {
    pub config: Config,
    store: S,
    sound: P,
    tasks: TaskStore,
    task_observer: PersistenceObserver<TaskState>,
    timer: PomodoroState,
    timer_observer: PersistenceObserver<PomodoroState>,
    preferences: Preferences,
}

impl<S: KeyValueStore, P: SoundPlayer> App<S, P> {
    pub fn new(config: Config, store: S, mut sound: P) -> Self {
        let task_state: TaskState = persistence::load_or_default(&store, TASK_STATE_KEY);
        let defaults = config.pomodoro.settings();
        let timer: PomodoroState = persistence::load_or_else(&store, POMODORO_STATE_KEY, || {
            PomodoroState::with_settings(defaults)
        });
        let preferences = Preferences::load(&store);
        sound.set_enabled(preferences.sound_enabled);

        Self {
            task_observer: PersistenceObserver::primed(TASK_STATE_KEY, &task_state),
            timer_observer: PersistenceObserver::primed(POMODORO_STATE_KEY, &timer),
            tasks: TaskStore::new(task_state),
            timer,
            preferences,
            config,
            store,
            sound,
        }
    }

    pub fn state(&self) -> &TaskState {
        self.tasks.state()
    }

    pub fn find(&self, id: i64) -> Option<&Task> {
        self.tasks.state().find(id)
    }

    /// Tasks passing the active filter, in the active sort order.
    pub fn visible(&self) -> Vec<&Task> {
        let state = self.tasks.state();
        apply_filters(&state.tasks, &state.filter, &state.sort)
    }

    pub fn categories(&self) -> Vec<String> {
        available_categories(&self.tasks.state().tasks)
    }

    pub fn dispatch(&mut self, action: TaskAction) -> &TaskState {
        let cue = cue_for(&action, self.tasks.state());
        let changed = {
            let before = self.tasks.state().clone();
            self.tasks.dispatch(action);
            before != *self.tasks.state()
        };
        if changed {
            if let Some(event) = cue {
                self.sound.play(event);
            }
            self.task_observer.observe(&mut self.store, self.tasks.state());
        }
        self.tasks.state()
    }

    pub fn timer(&self) -> &PomodoroState {
        &self.timer
    }

    pub fn dispatch_timer(&mut self, action: PomodoroAction) -> &PomodoroState {
        if matches!(action, PomodoroAction::SwitchMode(_) | PomodoroAction::Reset) {
            self.sound.stop_alarm();
        }
        self.timer = self.timer.reduce(action);
        self.timer_observer.observe(&mut self.store, &self.timer);
        &self.timer
    }

    /// Start the per-task timer and block until the current period ends,
    /// calling `on_tick` after each poll that counted time down.
    pub fn run_timer(&mut self, mut on_tick: impl FnMut(&PomodoroState)) -> PomodoroState {
        let period = self.config.tick_period();
        let started = self.timer.reduce(PomodoroAction::Start);
        info!(mode = %started.mode, remaining = %started.display(), "timer started");

        let mut session = FocusSession::new(started, period, &mut self.sound, Instant::now());
        self.timer_observer.observe(&mut self.store, session.state());

        loop {
            let now = Instant::now();
            let outcome = session.poll(now);
            if outcome.ticks > 0 {
                self.timer_observer.observe(&mut self.store, session.state());
                on_tick(session.state());
            }
            if outcome.completed || !session.state().is_active {
                break;
            }
            let wait = session.driver().until_next(now).unwrap_or(period);
            std::thread::sleep(wait);
        }

        self.timer = session.finish();
        self.timer
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences
    }

    pub fn toggle_sound(&mut self) -> bool {
        let enabled = self.preferences.toggle_sound(&mut self.store);
        self.sound.set_enabled(enabled);
        if enabled {
            self.sound.play(SoundEvent::SwitchMode);
        }
        enabled
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.sound.play(SoundEvent::SwitchMode);
        self.preferences.toggle_theme(&mut self.store)
    }

    pub fn completed_pomodoros(&self) -> u32 {
        persistence::load_completed_pomodoros(&self.store)
    }

    pub fn save_completed_pomodoros(&mut self, count: u32) {
        persistence::save_completed_pomodoros(&mut self.store, count);
    }

    pub fn clear_completed_pomodoros(&mut self) {
        persistence::clear_completed_pomodoros(&mut self.store);
        self.sound.play(SoundEvent::SwitchMode);
    }

    /// Stopwatch widget seeded from config and the stored completed count.
    pub fn widget(&self) -> FocusWidget {
        FocusWidget::new(self.widget_settings(), self.completed_pomodoros())
    }

    pub fn widget_settings(&self) -> PomodoroSettings {
        self.config.pomodoro.settings()
    }

    /// Drive the stopwatch widget until `input` disconnects. `render` sees
    /// the widget after every change, with the event that change raised.
    pub fn run_widget(
        &mut self,
        input: &Receiver<WidgetAction>,
        mut render: impl FnMut(&FocusWidget, Option<WidgetEvent>),
    ) -> FocusWidget {
        let tick = self.config.tick_period();
        let widget = self.widget();
        let mut session =
            FocusWidgetSession::new(widget, tick, self.config.alarm_interval(), &mut self.sound);
        render(session.widget(), None);

        loop {
            let before = *session.widget();
            let event = session.poll(Instant::now());
            if let Some(WidgetEvent::FocusCountChanged(count)) = event {
                record_focus_count(&mut self.store, count);
            }
            if event.is_some() || *session.widget() != before {
                render(session.widget(), event);
            }

            match input.recv_timeout(tick) {
                Ok(action) => {
                    let event = session.dispatch(action, Instant::now());
                    if let Some(WidgetEvent::FocusCountChanged(count)) = event {
                        record_focus_count(&mut self.store, count);
                    }
                    render(session.widget(), event);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        *session.widget()
    }

    pub fn sound_mut(&mut self) -> &mut P {
        &mut self.sound
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn record_focus_count<S: KeyValueStore>(store: &mut S, count: u32) {
    debug!(count, "focus count changed");
    if count == 0 {
        persistence::clear_completed_pomodoros(store);
    } else {
        persistence::save_completed_pomodoros(store, count);
    }
}

/// Sound cue for an action, judged against the state before it applies.
fn cue_for(action: &TaskAction, state: &TaskState) -> Option<SoundEvent> {
    match action {
        TaskAction::Add(_) => Some(SoundEvent::Success),
        TaskAction::Toggle(id) => state.find(*id).map(|task| {
            if task.completed {
                SoundEvent::SwitchMode
            } else {
                SoundEvent::Complete
            }
        }),
        TaskAction::Delete(_) | TaskAction::DeleteAll => Some(SoundEvent::TaskDelete),
        TaskAction::Archive(_)
        | TaskAction::Restore(_)
        | TaskAction::Edit { .. }
        | TaskAction::Update(_)
        | TaskAction::SetFilter(_)
        | TaskAction::SetSort(_) => Some(SoundEvent::SwitchMode),
        TaskAction::AddSubTask { .. } | TaskAction::ToggleSubTask { .. } => Some(SoundEvent::Click),
        TaskAction::Reorder(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilterPatch, NewTaskForm};
    use crate::pomodoro::PomodoroMode;
    use crate::sound::testing::RecordingPlayer;
    use crate::storage::MemoryStore;

    fn app() -> App<MemoryStore, RecordingPlayer> {
        App::new(Config::default(), MemoryStore::new(), RecordingPlayer::default())
    }

    #[test]
    fn dispatch_persists_and_cues() {
        let mut app = app();
        app.dispatch(TaskAction::Add(NewTaskForm::new("Call mom")));
        let id = app.state().tasks[0].id;
        app.dispatch(TaskAction::Toggle(id));
        app.dispatch(TaskAction::Delete(id));

        assert_eq!(
            app.sound_mut().played,
            [SoundEvent::Success, SoundEvent::Complete, SoundEvent::TaskDelete]
        );
        let stored: TaskState = persistence::load_or_default(app.store(), TASK_STATE_KEY);
        assert_eq!(&stored, app.state());
    }

    #[test]
    fn no_op_actions_are_silent() {
        let mut app = app();
        app.dispatch(TaskAction::Toggle(99));
        app.dispatch(TaskAction::Delete(99));
        assert!(app.sound_mut().played.is_empty());
        assert!(app.store().is_empty());
    }

    #[test]
    fn state_survives_a_restart() {
        let mut first = app();
        first.dispatch(TaskAction::Add(NewTaskForm::new("Persist me")));
        first.dispatch(TaskAction::SetFilter(FilterPatch {
            show_completed: Some(false),
            ..FilterPatch::default()
        }));
        first.dispatch_timer(PomodoroAction::SwitchMode(PomodoroMode::ShortBreak));
        let store = first.store().clone();

        let second = App::new(Config::default(), store, RecordingPlayer::default());
        assert_eq!(second.state(), first.state());
        assert_eq!(second.timer().mode, PomodoroMode::ShortBreak);
        assert_eq!(second.visible().len(), 1);
    }

    #[test]
    fn timer_defaults_come_from_config() {
        let mut config = Config::default();
        config.pomodoro.focus = 45;
        let app = App::new(config, MemoryStore::new(), RecordingPlayer::default());
        assert_eq!(app.timer().display(), "45:00");
        assert_eq!(app.widget().display(), "45:00");
    }

    #[test]
    fn run_timer_counts_down_and_completes() {
        let mut config = Config::default();
        config.tick_millis = 1;
        let mut app = App::new(config, MemoryStore::new(), RecordingPlayer::default());
        app.timer = PomodoroState {
            minutes: 0,
            seconds: 2,
            ..PomodoroState::default()
        };

        let mut ticks = 0;
        let finished = app.run_timer(|_| ticks += 1);
        assert!(ticks >= 1);
        assert_eq!(finished.mode, PomodoroMode::ShortBreak);
        assert_eq!(finished.cycles, 1);
        assert!(app.sound_mut().played.contains(&SoundEvent::FocusEnd));

        let stored: PomodoroState = persistence::load_or_default(app.store(), POMODORO_STATE_KEY);
        assert_eq!(stored, finished);
    }

    #[test]
    fn completed_counter_round_trip() {
        let mut app = app();
        assert_eq!(app.completed_pomodoros(), 0);
        app.save_completed_pomodoros(4);
        assert_eq!(app.widget().focus_count, 4);
        app.clear_completed_pomodoros();
        assert_eq!(app.completed_pomodoros(), 0);
    }

    #[test]
    fn widget_count_reset_clears_stored_counter() {
        let mut app = app();
        app.save_completed_pomodoros(3);

        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(WidgetAction::ResetCount).unwrap();
        drop(tx);

        let mut events = Vec::new();
        let widget = app.run_widget(&rx, |_, event| events.extend(event));
        assert_eq!(widget.focus_count, 0);
        assert_eq!(events, [WidgetEvent::FocusCountChanged(0)]);
        assert_eq!(app.completed_pomodoros(), 0);
        assert!(app.sound_mut().played.contains(&SoundEvent::SwitchMode));
    }

    #[test]
    fn preferences_toggle() {
        let mut app = app();
        assert!(!app.toggle_sound());
        assert_eq!(app.toggle_theme(), Theme::Light);
        assert_eq!(app.preferences().theme, Theme::Light);
    }
}
