// src/renderer/overlay.rs

use crate::performance::PerformanceMonitor;

pub const WINDOW_TITLE: &str = "notefall";

/// Frame statistics shown in the window title
pub struct PerformanceOverlay {
    visible: bool,
    lines: Vec<String>,
}

/// Playback state shown next to the frame statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStatus {
    pub time: f64,
    pub tempo_multiplier: f64,
    pub paused: bool,
    pub loading: bool,
    pub frames_exported: Option<u64>,
}

impl PerformanceOverlay {
    pub fn new(visible: bool) -> Self {
        PerformanceOverlay {
            visible,
            lines: Vec::new(),
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn update(&mut self, monitor: &PerformanceMonitor, status: &PlaybackStatus) {
        self.lines.clear();
        self.lines.push(format!("FPS: {:.0}", monitor.get_fps()));
        self.lines.push(format!(
            "Frame: {:.2}ms",
            monitor.get_render_time().as_secs_f64() * 1000.0
        ));
        self.lines.push(format!("Notes: {}", monitor.notes_on_screen()));
        self.lines.push(format!("Tick: {:.0}", status.time));
        self.lines.push(format!("Speed: {:.1}x", status.tempo_multiplier));
        if status.paused {
            self.lines.push("Paused".to_string());
        }
        if status.loading {
            self.lines.push("Loading".to_string());
        }
        if let Some(frames) = status.frames_exported {
            self.lines.push(format!("Exported: {}", frames));
        }
    }

    pub fn get_lines(&self) -> &[String] {
        &self.lines
    }

    pub fn get_title_text(&self) -> String {
        if !self.visible || self.lines.is_empty() {
            return WINDOW_TITLE.to_string();
        }
        format!("{} | {}", WINDOW_TITLE, self.lines.join(" | "))
    }
}

impl Default for PerformanceOverlay {
    fn default() -> Self {
        Self::new(false)
    }
}
