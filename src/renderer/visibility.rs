// src/renderer/visibility.rs

use crate::midi::{Note, Timeline, TrackColors};
use crate::renderer::layout::{KeyLayout, KEY_COUNT};
use glam::Vec4;

/// Per-frame held state of every key
#[derive(Debug, Clone)]
pub struct KeyState {
    colors: Vec<[Vec4; 2]>,
    pressed: Vec<bool>,
}

impl KeyState {
    pub fn new() -> Self {
        KeyState {
            colors: vec![[Vec4::ZERO; 2]; KEY_COUNT],
            pressed: vec![false; KEY_COUNT],
        }
    }

    pub fn clear(&mut self) {
        self.colors.fill([Vec4::ZERO; 2]);
        self.pressed.fill(false);
    }

    pub fn press(&mut self, key: usize, left: Vec4, right: Vec4) {
        self.colors[key] = [left, right];
        self.pressed[key] = true;
    }

    pub fn is_pressed(&self, key: usize) -> bool {
        self.pressed.get(key).copied().unwrap_or(false)
    }

    /// Held (left, right) colors; transparent when the key is up
    pub fn colors(&self, key: usize) -> [Vec4; 2] {
        self.colors.get(key).copied().unwrap_or([Vec4::ZERO; 2])
    }
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new()
    }
}

/// Screen geometry of one visible note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleNote {
    pub key: u8,
    pub x1: f32,
    pub x2: f32,
    /// Edge at the note's start, the lower one on screen
    pub y_start: f32,
    /// Edge at the note's end, 1.0 while the note is still open
    pub y_end: f32,
    pub left: Vec4,
    pub right: Vec4,
}

/// Vertical extent of a note: `time - window` maps to `piano_height`, `time` to 1
pub fn note_span_y(note: &Note, time: f64, window: f64, piano_height: f64) -> (f32, f32) {
    let scale = (1.0 - piano_height) / window;
    let y_start = 1.0 - (time - note.start) * scale;
    let y_end = if note.has_ended {
        1.0 - (time - note.end) * scale
    } else {
        1.0
    };
    (y_start as f32, y_end as f32)
}

/// Notes on screen for one frame plus the keys they hold down
#[derive(Debug, Default)]
pub struct NoteVisibilitySet {
    notes: Vec<VisibleNote>,
    keys: KeyState,
    candidates: u64,
    /// Every note before this index has scrolled off for good
    first_live: usize,
    last_cutoff: f64,
}

impl NoteVisibilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from scratch for cursor `time`.
    ///
    /// `notes` must be ordered by start and only ever grow; the scan stops at
    /// the first note starting at or after `time`. The scan resumes past the
    /// prefix of notes that already scrolled off; moving the bottom of the
    /// window back (rewind or a longer window) starts over from the first note.
    pub fn compute(
        &mut self,
        notes: &[Note],
        track_colors: &[TrackColors],
        layout: &KeyLayout,
        time: f64,
        window: f64,
        piano_height: f64,
    ) {
        self.notes.clear();
        self.keys.clear();
        self.candidates = 0;

        let cutoff = time - window;
        if cutoff < self.last_cutoff || self.first_live > notes.len() {
            self.first_live = 0;
        }
        self.last_cutoff = cutoff;

        let fallback = TrackColors::uniform(Vec4::ONE);
        let mut dead_prefix = 0;
        for (offset, note) in notes[self.first_live..].iter().enumerate() {
            if note.start >= time {
                break;
            }
            if !note.is_visible(time, window) {
                if dead_prefix == offset {
                    dead_prefix += 1;
                }
                continue;
            }
            self.candidates += 1;

            let key = note.key as usize;
            let Some((x1, width)) = layout.span(key) else {
                continue;
            };
            let colors = track_colors.get(note.track).unwrap_or(&fallback);
            let left = colors.left(note.channel);
            let right = colors.right(note.channel);
            if note.start < cutoff {
                self.keys.press(key, left, right);
            }

            let (y_start, y_end) = note_span_y(note, time, window, piano_height);
            self.notes.push(VisibleNote {
                key: note.key,
                x1,
                x2: x1 + width,
                y_start,
                y_end,
                left,
                right,
            });
        }
        self.first_live += dead_prefix;
    }

    /// Snapshot the shared timeline; its locks are released before returning
    pub fn collect(
        &mut self,
        timeline: &Timeline,
        layout: &KeyLayout,
        time: f64,
        window: f64,
        piano_height: f64,
    ) {
        let notes = timeline.notes();
        let track_colors = timeline.track_colors().read();
        self.compute(&notes, &track_colors, layout, time, window, piano_height);
    }

    pub fn notes(&self) -> &[VisibleNote] {
        &self.notes
    }

    pub fn keys(&self) -> &KeyState {
        &self.keys
    }

    /// Notes inside the time window, including those outside the key range
    pub fn candidate_count(&self) -> u64 {
        self.candidates
    }
}
