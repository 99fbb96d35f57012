// src/midi/note.rs

use glam::Vec4;

/// Channel value of a color event that applies to every channel of its track
pub const ALL_CHANNELS: u8 = 0x7F;

/// A note as streamed in by the loader, positioned in ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub start: f64,
    pub end: f64,
    pub has_ended: bool,
    pub key: u8,
    pub channel: u8,
    /// Index into the timeline's track color table
    pub track: usize,
    pub velocity: u8,
}

impl Note {
    /// An open note; `end` is meaningless until [`Note::close`] is called
    pub fn new(start: f64, key: u8, channel: u8, track: usize, velocity: u8) -> Self {
        Note {
            start,
            end: start,
            has_ended: false,
            key,
            channel,
            track,
            velocity,
        }
    }

    pub fn close(&mut self, end: f64) {
        if !self.has_ended {
            self.end = end;
            self.has_ended = true;
        }
    }

    /// Whether the note overlaps the window `[time - window, time)`
    pub fn is_visible(&self, time: f64, window: f64) -> bool {
        (self.end >= time - window || !self.has_ended) && self.start < time
    }
}

/// Tempo change in microseconds per quarter note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEvent {
    pub pos: f64,
    pub tempo: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorChangeEvent {
    pub pos: f64,
    pub track: usize,
    /// 0..16, or [`ALL_CHANNELS`]
    pub channel: u8,
    pub col1: Vec4,
    pub col2: Vec4,
}

/// Two gradient colors for each of the 16 channels of a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackColors {
    colors: [Vec4; 32],
}

impl TrackColors {
    pub fn uniform(color: Vec4) -> Self {
        TrackColors { colors: [color; 32] }
    }

    /// Default palette: one hue per track, spread by a golden-ish stride
    pub fn default_for_track(track: usize) -> Self {
        let hue = ((track * 16 + track) as f32 * 1.36271) % 1.0;
        let (r, g, b) = hsv_to_rgb(hue * 360.0, 0.8, 1.0);
        Self::uniform(Vec4::new(r, g, b, 0.8))
    }

    pub fn left(&self, channel: u8) -> Vec4 {
        self.colors[(channel as usize & 0x0F) * 2]
    }

    pub fn right(&self, channel: u8) -> Vec4 {
        self.colors[(channel as usize & 0x0F) * 2 + 1]
    }

    pub fn apply(&mut self, event: &ColorChangeEvent) {
        if event.channel == ALL_CHANNELS {
            for channel in 0..16 {
                self.set(channel, event.col1, event.col2);
            }
        } else if event.channel < 16 {
            self.set(event.channel, event.col1, event.col2);
        }
    }

    fn set(&mut self, channel: u8, col1: Vec4, col2: Vec4) {
        self.colors[channel as usize * 2] = col1;
        self.colors[channel as usize * 2 + 1] = col2;
    }
}

/// Convert HSV color to RGB
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - ((h_prime % 2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h_prime < 1.0 {
        (c, x, 0.0)
    } else if h_prime < 2.0 {
        (x, c, 0.0)
    } else if h_prime < 3.0 {
        (0.0, c, x)
    } else if h_prime < 4.0 {
        (0.0, x, c)
    } else if h_prime < 5.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}
