// src/renderer/classic.rs

use crate::config::{RenderSettings, RendererKind};
use crate::midi::Timeline;
use crate::renderer::batcher::{Quad, QuadSink};
use crate::renderer::layout::{is_black_key, KeyLayout};
use crate::renderer::scene::{
    blend_key_color, gray, uses_same_width, white_key_extent, SceneRenderer, SceneState, Viewport,
};
use glam::Vec4;

/// Edge shading of a flat note: lighter on the left, darker on the right
const NOTE_SHADE: [[f32; 2]; 4] = [[0.05, 1.0], [-0.05, 1.0], [0.05, 1.0], [-0.03, 1.0]];

const WHITE_KEY: f32 = 0.95;
const BLACK_KEY: f32 = 0.1;

/// Flat notes over a plain keyboard, every key the same width
#[derive(Debug)]
pub struct ClassicScene {
    state: SceneState,
}

impl ClassicScene {
    pub fn new(quad_buffer_len: usize) -> Self {
        ClassicScene {
            state: SceneState::new(quad_buffer_len),
        }
    }

    fn draw_notes(&mut self, settings: &RenderSettings, sink: &mut dyn QuadSink) {
        let brightness = settings.note_brightness;
        let SceneState {
            batcher, visible, ..
        } = &mut self.state;
        for note in visible.notes() {
            let color = (note.left.truncate() * brightness).extend(note.left.w);
            let quad = Quad::solid(note.x1, note.y_start, note.x2, note.y_end, color)
                .with_decorations(NOTE_SHADE);
            batcher.emit_quad(sink, &quad);
        }
        batcher.flush(sink, true);
    }

    fn draw_keyboard(&mut self, layout: &KeyLayout, piano_height: f32, sink: &mut dyn QuadSink) {
        let SceneState {
            batcher, visible, ..
        } = &mut self.state;
        let keys = visible.keys();

        // white keys go behind black keys
        for key in layout.first()..layout.last() {
            if is_black_key(key) {
                continue;
            }
            let Some((x1, width)) = layout.span(key) else {
                continue;
            };
            let (x1, x2) = white_key_extent(key, x1, width);
            let [left, right] = keys.colors(key);
            let quad = Quad::vertical(
                x1,
                0.0,
                x2,
                piano_height,
                blend_key_color(left, gray(WHITE_KEY)),
                blend_key_color(right, gray(WHITE_KEY)),
            )
            .shaded([0.0, 0.85], [0.0, 1.0]);
            batcher.emit_quad(sink, &quad);
        }

        for key in layout.first()..layout.last() {
            if !is_black_key(key) {
                continue;
            }
            let Some((x1, width)) = layout.span(key) else {
                continue;
            };
            let [left, right] = keys.colors(key);
            let quad = Quad::vertical(
                x1 + width * 0.15,
                piano_height * 0.35,
                x1 + width * 0.85,
                piano_height,
                blend_key_color(left, gray(BLACK_KEY)),
                blend_key_color(right, gray(BLACK_KEY)),
            );
            batcher.emit_quad(sink, &quad);
        }

        // keyboard top edge
        batcher.emit_quad(
            sink,
            &Quad::solid(0.0, piano_height * 0.99, 1.0, piano_height, gray(0.2)),
        );
        batcher.flush(sink, true);
    }
}

impl SceneRenderer for ClassicScene {
    fn kind(&self) -> RendererKind {
        RendererKind::Classic
    }

    fn render(
        &mut self,
        timeline: &Timeline,
        time: f64,
        settings: &RenderSettings,
        _viewport: Viewport,
        sink: &mut dyn QuadSink,
    ) -> u64 {
        let same_width = uses_same_width(RendererKind::Classic, settings);
        let layout = self.state.prepare(timeline, time, settings, same_width);
        self.draw_notes(settings, sink);
        self.draw_keyboard(&layout, settings.piano_height as f32, sink);
        self.state.visible.candidate_count()
    }

    fn flush_count(&self) -> u64 {
        self.state.batcher.flush_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{Note, TrackColors};
    use crate::renderer::batcher::RecordingSink;

    const VIEWPORT: Viewport = Viewport {
        width: 1280,
        height: 720,
    };

    fn settings() -> RenderSettings {
        RenderSettings {
            first_note: 60,
            last_note: 72,
            piano_height: 0.2,
            delta_time_on_screen: 300.0,
            ..RenderSettings::default()
        }
    }

    fn timeline_with(notes: &[(f64, f64, u8)]) -> Timeline {
        let timeline = Timeline::new(480, 1);
        {
            let mut stored = timeline.notes();
            for &(start, end, key) in notes {
                let mut note = Note::new(start, key, 0, 0, 100);
                note.close(end);
                stored.push(note);
            }
        }
        *timeline.track_colors().write() = vec![TrackColors::uniform(Vec4::new(0.5, 0.5, 0.5, 1.0))];
        timeline
    }

    #[test]
    fn test_notes_before_keyboard() {
        let timeline = timeline_with(&[(100.0, 200.0, 64)]);
        let mut scene = ClassicScene::new(64);
        let mut sink = RecordingSink::default();
        let count = scene.render(&timeline, 250.0, &settings(), VIEWPORT, &mut sink);
        assert_eq!(count, 1);

        // one note quad, 12 keys, the top edge
        assert_eq!(sink.quad_count(), 1 + 12 + 1);
        let (x1, _) = KeyLayout::uniform(60, 72).span(64).unwrap();
        assert!((sink.positions[0][0] - x1).abs() < 1e-6);
        assert_eq!(sink.decorations[..4], NOTE_SHADE);
    }

    #[test]
    fn test_brightness_scales_rgb_only() {
        let timeline = timeline_with(&[(100.0, 200.0, 64)]);
        let mut scene = ClassicScene::new(64);
        let mut sink = RecordingSink::default();
        let mut settings = settings();
        settings.note_brightness = 0.5;
        scene.render(&timeline, 250.0, &settings, VIEWPORT, &mut sink);
        assert_eq!(sink.colors[0], [0.25, 0.25, 0.25, 1.0]);
    }

    #[test]
    fn test_held_key_takes_note_color() {
        // the note crossed the keyboard line 100 ticks ago
        let timeline = timeline_with(&[(0.0, 1000.0, 62)]);
        let mut scene = ClassicScene::new(64);
        let mut sink = RecordingSink::default();
        scene.render(&timeline, 400.0, &settings(), VIEWPORT, &mut sink);

        // note quad, then C, then D
        let d_key = 2 * 4;
        assert_eq!(sink.colors[d_key], [0.5, 0.5, 0.5, 1.0]);
        let c_key = 4;
        assert_eq!(sink.colors[c_key], [WHITE_KEY, WHITE_KEY, WHITE_KEY, 1.0]);
    }

    #[test]
    fn test_small_batches_draw_everything() {
        let notes: Vec<(f64, f64, u8)> = (0..40).map(|i| (i as f64, 250.0, 60 + (i % 12) as u8)).collect();
        let timeline = timeline_with(&notes);
        let mut scene = ClassicScene::new(3);
        let mut sink = RecordingSink::default();
        let count = scene.render(&timeline, 200.0, &settings(), VIEWPORT, &mut sink);
        assert_eq!(count, 40);
        assert_eq!(sink.quad_count(), 40 + 12 + 1);
        assert!(sink.batches.iter().all(|&q| q <= 3));
    }
}
