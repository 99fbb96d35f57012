// src/ui/query.rs

use crate::config::RenderSettings;
use crate::midi::Note;
use crate::renderer::layout::KeyLayout;

/// What sits under a click on the paused frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickQuery {
    /// Tick under the pointer
    pub time: f64,
    pub key: Option<usize>,
    pub nearest_quarter: f64,
    pub nearest_whole: f64,
}

/// Tick drawn at screen height `y` (0 at the bottom) when the cursor is at `time`
pub fn time_at(y: f64, time: f64, window: f64, piano_height: f64) -> f64 {
    (window - time + time * piano_height - window * y) / (piano_height - 1.0)
}

/// Resolve a click at window-normalised `(x, y)`, y measured from the top
pub fn query(
    x: f64,
    y: f64,
    time: f64,
    division: u16,
    settings: &RenderSettings,
    layout: &KeyLayout,
) -> ClickQuery {
    let y = 1.0 - y;
    let tick = time_at(y, time, settings.delta_time_on_screen, settings.piano_height);
    let quarter = division.max(1) as f64;
    let whole = quarter * 4.0;
    ClickQuery {
        time: tick,
        key: layout.key_at(x as f32),
        nearest_quarter: (tick / quarter).round() * quarter,
        nearest_whole: (tick / whole).round() * whole,
    }
}

/// Last note in start order on `key` that sounds at `time`
pub fn note_at(notes: &[Note], key: usize, time: f64) -> Option<Note> {
    notes
        .iter()
        .take_while(|n| n.start < time)
        .filter(|n| n.key as usize == key && (n.end > time || !n.has_ended))
        .last()
        .copied()
}

pub fn log_query(query: &ClickQuery) {
    log::info!("Time (ticks): {:.1}", query.time);
    match query.key {
        Some(key) => log::info!("Key number: {}", key),
        None => log::info!("Key number: none"),
    }
    log::info!("Nearest quarter note ticks: {}", query.nearest_quarter);
    log::info!("Nearest whole note ticks: {}", query.nearest_whole);
}

pub fn log_note(note: Option<&Note>) {
    let Some(note) = note else {
        log::info!("No note was found");
        return;
    };
    log::info!("Note start (ticks): {}", note.start);
    if note.has_ended {
        log::info!("Note end (ticks): {}", note.end);
    } else {
        log::info!("Note end (ticks): [not loaded yet]");
    }
    log::info!(
        "Note velocity: {}, track: {}, channel: {}",
        note.velocity,
        note.track,
        note.channel
    );
}
