// src/midi/cursor.rs

use crate::midi::note::{ColorChangeEvent, TempoEvent, TrackColors};
use crate::midi::timeline::Timeline;

/// Tempo assumed before the first tempo event, in microseconds per quarter note
pub const DEFAULT_TEMPO: u32 = 500_000;

const MIN_MULTIPLIER: f64 = 0.1;
const MAX_MULTIPLIER: f64 = 10.0;

/// Ticks advanced per frame at `tempo`
pub fn frame_step_for(division: u16, tempo: u32, fps: u32) -> f64 {
    division as f64 * 1_000_000.0 / (tempo.max(1) as f64 * fps.max(1) as f64)
}

/// Playback position in ticks, advanced once per rendered frame.
///
/// The cursor marks the top edge of the screen; a note reaches the keyboard
/// line when the cursor is `window` ticks past its start. Tempo changes are
/// therefore applied when the cursor crosses `pos + window`, splitting the
/// frame at the exact crossing point.
#[derive(Debug, Clone)]
pub struct TimelineCursor {
    time: f64,
    frame_step: f64,
    division: u16,
    fps: u32,
    tempo_index: usize,
    color_index: usize,
    paused: bool,
    tempo_multiplier: f64,
}

impl TimelineCursor {
    pub fn new(division: u16, fps: u32, window: f64) -> Self {
        TimelineCursor {
            time: -window,
            frame_step: frame_step_for(division, DEFAULT_TEMPO, fps),
            division,
            fps: fps.max(1),
            tempo_index: 0,
            color_index: 0,
            paused: false,
            tempo_multiplier: 1.0,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Ticks per frame at the current tempo, before the multiplier
    pub fn frame_step(&self) -> f64 {
        self.frame_step
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn tempo_multiplier(&self) -> f64 {
        self.tempo_multiplier
    }

    pub fn set_tempo_multiplier(&mut self, multiplier: f64) {
        self.tempo_multiplier = multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
    }

    pub fn increase_speed(&mut self) {
        self.set_tempo_multiplier(self.tempo_multiplier + 0.1);
    }

    pub fn decrease_speed(&mut self) {
        self.set_tempo_multiplier(self.tempo_multiplier - 0.1);
    }

    /// Keep the real-time speed when the output frame rate changes
    pub fn set_fps(&mut self, fps: u32) {
        let fps = fps.max(1);
        if fps != self.fps {
            self.frame_step *= self.fps as f64 / fps as f64;
            self.fps = fps;
        }
    }

    /// Back to the start of the file with every queue rewound
    pub fn reset(&mut self, window: f64) {
        self.time = -window;
        self.frame_step = frame_step_for(self.division, DEFAULT_TEMPO, self.fps);
        self.tempo_index = 0;
        self.color_index = 0;
    }

    /// Advance by one frame, consuming every tempo change crossed on the way.
    ///
    /// Each crossing scales what is left of the frame by the unconsumed
    /// fraction; the fractions compound when several events share a frame.
    pub fn advance(&mut self, tempo_events: &[TempoEvent], window: f64) -> f64 {
        let mut remaining = 1.0;
        while let Some(event) = tempo_events.get(self.tempo_index) {
            let step = self.frame_step * remaining * self.tempo_multiplier;
            if self.time + step - window <= event.pos {
                break;
            }
            let crossed = ((event.pos + window) - self.time) / step;
            remaining *= 1.0 - crossed;
            self.frame_step = frame_step_for(self.division, event.tempo, self.fps);
            self.time = event.pos + window;
            self.tempo_index += 1;
        }
        if !self.paused {
            self.time += remaining * self.frame_step * self.tempo_multiplier;
        }
        self.time
    }

    /// Apply the color changes whose position has scrolled past the keyboard
    pub fn drain_color_events(
        &mut self,
        events: &[ColorChangeEvent],
        window: f64,
        colors: &mut [TrackColors],
    ) -> usize {
        let mut applied = 0;
        while let Some(event) = events.get(self.color_index) {
            if event.pos + window >= self.time {
                break;
            }
            if let Some(track) = colors.get_mut(event.track) {
                track.apply(event);
            }
            self.color_index += 1;
            applied += 1;
        }
        applied
    }

    /// One frame against the shared timeline; each queue is locked only for its drain
    pub fn step(&mut self, timeline: &Timeline, window: f64) -> f64 {
        {
            let tempo_events = timeline.tempo_events();
            self.advance(&tempo_events, window);
        }
        let color_events = timeline.color_events();
        if color_events.len() > self.color_index {
            let mut colors = timeline.track_colors().write();
            let applied = self.drain_color_events(&color_events, window, &mut colors);
            if applied > 0 {
                log::debug!("Applied {} color changes at tick {:.1}", applied, self.time);
            }
        }
        self.time
    }
}
