// src/performance.rs

use std::time::{Duration, Instant};

/// Smoothed frame statistics for the overlay and the log
pub struct PerformanceMonitor {
    frame_count: u64,
    last_frame: Option<Instant>,
    fps: f64,
    render_time: Duration,
    notes_on_screen: u64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        PerformanceMonitor {
            frame_count: 0,
            last_frame: None,
            fps: 0.0,
            render_time: Duration::ZERO,
            notes_on_screen: 0,
        }
    }

    pub fn frame_rendered(&mut self, render_duration: Duration, notes_on_screen: u64) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            self.record_interval(now - last);
        }
        self.last_frame = Some(now);
        self.frame_count += 1;
        self.render_time = render_duration;
        self.notes_on_screen = notes_on_screen;
    }

    /// Fold one frame interval into the live rate
    fn record_interval(&mut self, interval: Duration) {
        let seconds = interval.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }
        let instant = 1.0 / seconds;
        self.fps = if self.fps == 0.0 {
            instant
        } else {
            (self.fps * 2.0 + instant) / 3.0
        };
    }

    pub fn get_fps(&self) -> f64 {
        self.fps
    }

    pub fn get_render_time(&self) -> Duration {
        self.render_time
    }

    pub fn notes_on_screen(&self) -> u64 {
        self.notes_on_screen
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
