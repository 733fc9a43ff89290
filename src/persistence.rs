//! Bridges in-memory state and the key-value store.
//!
//! Reducers never touch storage. Callers load a snapshot once at startup and
//! hand every later snapshot to a [`PersistenceObserver`], which writes it out.
//! Failures on either side are logged and swallowed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::{debug, error, warn};

use crate::storage::KeyValueStore;

pub const TASK_STATE_KEY: &str = "todoState";
pub const POMODORO_STATE_KEY: &str = "pomodoroState";
pub const COMPLETED_POMODOROS_KEY: &str = "completedPomodoros";
pub const SOUND_ENABLED_KEY: &str = "soundEnabled";
pub const THEME_KEY: &str = "theme";

/// Read and deserialize the value under `key`, falling back to the default
/// for a missing key, a storage failure, or malformed JSON.
pub fn load_or_default<T, S>(store: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: KeyValueStore + ?Sized,
{
    load_or_else(store, key, T::default)
}

/// Like [`load_or_default`] with a caller-supplied fallback.
pub fn load_or_else<T, S, F>(store: &S, key: &str, fallback: F) -> T
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
    F: FnOnce() -> T,
{
    match store.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "discarding malformed stored state");
                fallback()
            }
        },
        Ok(None) => {
            debug!(key, "no stored state, using defaults");
            fallback()
        }
        Err(e) => {
            warn!(key, error = %e, "failed to read stored state");
            fallback()
        }
    }
}

/// Writes each new snapshot of `T` under one key.
pub struct PersistenceObserver<T> {
    key: &'static str,
    last_written: Option<String>,
    _state: PhantomData<fn(&T)>,
}

impl<T: Serialize> PersistenceObserver<T> {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            last_written: None,
            _state: PhantomData,
        }
    }

    /// Treat `state` as already stored, so an unchanged snapshot is not rewritten.
    pub fn primed(key: &'static str, state: &T) -> Self {
        let mut observer = Self::new(key);
        observer.last_written = serde_json::to_string(state).ok();
        observer
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Persist `state` if it differs from the last snapshot written.
    /// Returns whether a write was attempted and succeeded.
    pub fn observe<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, state: &T) -> bool {
        let serialized = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                error!(key = self.key, error = %e, "failed to serialize state");
                return false;
            }
        };
        if self.last_written.as_deref() == Some(serialized.as_str()) {
            return false;
        }
        match store.set(self.key, &serialized) {
            Ok(()) => {
                self.last_written = Some(serialized);
                true
            }
            Err(e) => {
                error!(key = self.key, error = %e, "failed to persist state");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("Unknown theme: {}", other)),
        }
    }
}

/// Small flags stored outside the task and timer blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub sound_enabled: bool,
    pub theme: Theme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            theme: Theme::Dark,
        }
    }
}

impl Preferences {
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        let defaults = Self::default();
        Self {
            sound_enabled: read_flag(store, SOUND_ENABLED_KEY).unwrap_or(defaults.sound_enabled),
            theme: read_flag(store, THEME_KEY).unwrap_or(defaults.theme),
        }
    }

    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &mut S) {
        write_flag(store, SOUND_ENABLED_KEY, &self.sound_enabled.to_string());
        write_flag(store, THEME_KEY, self.theme.as_str());
    }

    pub fn toggle_sound<S: KeyValueStore + ?Sized>(&mut self, store: &mut S) -> bool {
        self.sound_enabled = !self.sound_enabled;
        write_flag(store, SOUND_ENABLED_KEY, &self.sound_enabled.to_string());
        self.sound_enabled
    }

    pub fn toggle_theme<S: KeyValueStore + ?Sized>(&mut self, store: &mut S) -> Theme {
        self.theme = self.theme.toggled();
        write_flag(store, THEME_KEY, self.theme.as_str());
        self.theme
    }
}

pub fn load_completed_pomodoros<S: KeyValueStore + ?Sized>(store: &S) -> u32 {
    read_flag(store, COMPLETED_POMODOROS_KEY).unwrap_or(0)
}

pub fn save_completed_pomodoros<S: KeyValueStore + ?Sized>(store: &mut S, count: u32) {
    write_flag(store, COMPLETED_POMODOROS_KEY, &count.to_string());
}

pub fn clear_completed_pomodoros<S: KeyValueStore + ?Sized>(store: &mut S) {
    if let Err(e) = store.remove(COMPLETED_POMODOROS_KEY) {
        error!(key = COMPLETED_POMODOROS_KEY, error = %e, "failed to clear counter");
    }
}

fn read_flag<T: FromStr, S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(raw)) => {
            let parsed = raw.trim().parse().ok();
            if parsed.is_none() {
                warn!(key, value = %raw, "ignoring unreadable stored value");
            }
            parsed
        }
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "failed to read stored value");
            None
        }
    }
}

fn write_flag<S: KeyValueStore + ?Sized>(store: &mut S, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        error!(key, error = %e, "failed to persist value");
    }
}
