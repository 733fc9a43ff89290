//! Sound cues for task and timer events.
//!
//! The core only ever calls [`SoundPlayer::play`] and
//! [`SoundPlayer::stop_alarm`]. Neither reports failure: a cue that cannot be
//! played is logged and dropped.

use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, warn};

use crate::pomodoro::PomodoroMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEvent {
    Click,
    Success,
    Error,
    TaskAdd,
    TaskDelete,
    Complete,
    SwitchMode,
    FocusEnd,
    ShortBreakEnd,
    LongBreakEnd,
}

impl SoundEvent {
    pub const ALL: [SoundEvent; 10] = [
        SoundEvent::Click,
        SoundEvent::Success,
        SoundEvent::Error,
        SoundEvent::TaskAdd,
        SoundEvent::TaskDelete,
        SoundEvent::Complete,
        SoundEvent::SwitchMode,
        SoundEvent::FocusEnd,
        SoundEvent::ShortBreakEnd,
        SoundEvent::LongBreakEnd,
    ];

    /// Alert for the end of a period in `mode`.
    pub fn period_end(mode: PomodoroMode) -> Self {
        match mode {
            PomodoroMode::Focus => SoundEvent::FocusEnd,
            PomodoroMode::ShortBreak => SoundEvent::ShortBreakEnd,
            PomodoroMode::LongBreak => SoundEvent::LongBreakEnd,
        }
    }

    pub fn is_alarm(self) -> bool {
        matches!(
            self,
            SoundEvent::FocusEnd | SoundEvent::ShortBreakEnd | SoundEvent::LongBreakEnd
        )
    }

    pub fn source(self) -> &'static str {
        match self {
            SoundEvent::Click => "sounds/click.mp3",
            SoundEvent::Success => "sounds/complete.mp3",
            SoundEvent::Error => "sounds/notification.mp3",
            SoundEvent::TaskAdd => "sounds/task-add.mp3",
            SoundEvent::TaskDelete => "sounds/task-delete.mp3",
            SoundEvent::SwitchMode => "sounds/switch.mp3",
            SoundEvent::Complete
            | SoundEvent::FocusEnd
            | SoundEvent::ShortBreakEnd
            | SoundEvent::LongBreakEnd => "sounds/task-complete.mp3",
        }
    }

    pub fn volume(self) -> f32 {
        match self {
            SoundEvent::SwitchMode => 0.2,
            SoundEvent::Success => 0.4,
            SoundEvent::Error | SoundEvent::TaskDelete => 0.25,
            SoundEvent::TaskAdd | SoundEvent::Click => 0.3,
            SoundEvent::Complete => 0.5,
            SoundEvent::FocusEnd | SoundEvent::ShortBreakEnd | SoundEvent::LongBreakEnd => 0.7,
        }
    }
}

pub trait SoundPlayer {
    /// Fire and forget.
    fn play(&mut self, event: SoundEvent);
    /// Silence the alarm currently sounding, if any.
    fn stop_alarm(&mut self);
    /// Follow the user's sound preference. Players without a mute ignore it.
    fn set_enabled(&mut self, _enabled: bool) {}
}

impl<P: SoundPlayer + ?Sized> SoundPlayer for &mut P {
    fn play(&mut self, event: SoundEvent) {
        (**self).play(event)
    }

    fn stop_alarm(&mut self) {
        (**self).stop_alarm()
    }

    fn set_enabled(&mut self, enabled: bool) {
        (**self).set_enabled(enabled)
    }
}

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("Playback failed: {0}")]
    PlaybackError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A loaded sound, owned by a [`SoundBoard`].
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub event: SoundEvent,
    pub source: &'static str,
    pub volume: f32,
    pub playing: bool,
}

impl Clip {
    fn load(event: SoundEvent) -> Self {
        Self {
            event,
            source: event.source(),
            volume: event.volume(),
            playing: false,
        }
    }
}

/// Output device for clips.
pub trait AudioBackend {
    fn start(&mut self, clip: &Clip, repeats: u32) -> Result<(), SoundError>;
    fn stop(&mut self, clip: &Clip) -> Result<(), SoundError>;
}

/// Rings the terminal bell; the closest thing a terminal has to a speaker.
#[derive(Debug, Default)]
pub struct BellBackend;

impl AudioBackend for BellBackend {
    fn start(&mut self, clip: &Clip, repeats: u32) -> Result<(), SoundError> {
        let mut stderr = std::io::stderr();
        for _ in 0..repeats.max(1) {
            stderr.write_all(b"\x07")?;
        }
        stderr.flush()?;
        debug!(source = clip.source, repeats, "rang bell");
        Ok(())
    }

    fn stop(&mut self, _clip: &Clip) -> Result<(), SoundError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn start(&mut self, _clip: &Clip, _repeats: u32) -> Result<(), SoundError> {
        Ok(())
    }

    fn stop(&mut self, _clip: &Clip) -> Result<(), SoundError> {
        Ok(())
    }
}

/// Owns the clip cache and the alarm handle for the lifetime of the app.
pub struct SoundBoard<B: AudioBackend> {
    backend: B,
    enabled: bool,
    alarm_plays: u32,
    clips: HashMap<SoundEvent, Clip>,
    current_alarm: Option<SoundEvent>,
}

impl<B: AudioBackend> SoundBoard<B> {
    /// `alarm_plays` is how many times each alarm cue is played back to back.
    pub fn new(backend: B, enabled: bool, alarm_plays: u32) -> Self {
        let mut board = Self {
            backend,
            enabled,
            alarm_plays,
            clips: HashMap::new(),
            current_alarm: None,
        };
        if enabled {
            board.preload();
        }
        board
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cached_clips(&self) -> usize {
        self.clips.len()
    }

    fn preload(&mut self) {
        for event in SoundEvent::ALL {
            self.clips.entry(event).or_insert_with(|| Clip::load(event));
        }
    }

    fn halt(&mut self, event: SoundEvent) {
        if let Some(clip) = self.clips.get_mut(&event) {
            if clip.playing {
                clip.playing = false;
                if let Err(e) = self.backend.stop(clip) {
                    warn!(source = clip.source, error = %e, "failed to stop sound");
                }
            }
        }
    }
}

impl<B: AudioBackend> SoundPlayer for SoundBoard<B> {
    fn play(&mut self, event: SoundEvent) {
        if !self.enabled {
            return;
        }

        if event.is_alarm() {
            if let Some(previous) = self.current_alarm.filter(|&p| p != event) {
                self.halt(previous);
            }
            self.current_alarm = Some(event);
        } else {
            let alarm = self.current_alarm;
            let playing: Vec<SoundEvent> = self
                .clips
                .values()
                .filter(|c| c.playing && Some(c.event) != alarm)
                .map(|c| c.event)
                .collect();
            for other in playing {
                self.halt(other);
            }
        }

        let repeats = if event.is_alarm() { self.alarm_plays } else { 1 };
        let clip = self.clips.entry(event).or_insert_with(|| Clip::load(event));
        match self.backend.start(clip, repeats) {
            Ok(()) => clip.playing = true,
            Err(e) => warn!(source = clip.source, error = %e, "failed to play sound"),
        }
    }

    fn stop_alarm(&mut self) {
        if let Some(alarm) = self.current_alarm.take() {
            self.halt(alarm);
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.stop_alarm();
        }
        self.enabled = enabled;
        if enabled {
            self.preload();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Player that records every call, for asserting on cues.
    #[derive(Debug, Default)]
    pub struct RecordingPlayer {
        pub played: Vec<SoundEvent>,
        pub alarm_stops: usize,
    }

    impl SoundPlayer for RecordingPlayer {
        fn play(&mut self, event: SoundEvent) {
            self.played.push(event);
        }

        fn stop_alarm(&mut self) {
            self.alarm_stops += 1;
        }
    }
}
