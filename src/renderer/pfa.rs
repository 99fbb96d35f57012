// src/renderer/pfa.rs

use crate::config::{RenderSettings, RendererKind, TopColor};
use crate::midi::Timeline;
use crate::renderer::batcher::{Quad, QuadBatcher, QuadSink, FLAT};
use crate::renderer::layout::{is_black_key, KeyLayout};
use crate::renderer::scene::{
    blend_key_color, gray, uses_same_width, white_key_extent, SceneRenderer, SceneState, Viewport,
};
use crate::renderer::visibility::{KeyState, VisibleNote};
use glam::Vec4;

/// Horizontal border of a note, in screen units
const NOTE_PADDING: f64 = 0.001;

const MIDDLE_C: usize = 60;

/// Heights of the keyboard parts as fractions of the piano height
struct KeyboardMetrics {
    top_red_start: f32,
    top_red_end: f32,
    top_bar_end: f32,
    white_up_top: f32,
    white_up_bottom: f32,
    white_down_top: f32,
    black_end: f32,
    black_down_top: f32,
    black_down_bottom: f32,
    black_up_top: f32,
    black_up_bottom: f32,
    split_left_top: f32,
    split_right_top: f32,
    split_left_bottom: f32,
    split_right_bottom: f32,
}

impl KeyboardMetrics {
    fn new(piano_height: f32) -> Self {
        let ph = piano_height;
        let top_bar_end = ph * 0.925;
        let black_end = ph * 0.33;
        KeyboardMetrics {
            top_red_start: ph * 0.99,
            top_red_end: ph * 0.94,
            top_bar_end,
            white_up_top: ph * 0.045,
            white_up_bottom: ph * 0.03,
            white_down_top: ph * 0.01,
            black_end,
            black_down_top: top_bar_end + ph * 0.015,
            black_down_bottom: black_end + ph * 0.015,
            black_up_top: top_bar_end + ph * 0.04,
            black_up_bottom: black_end + ph * 0.04,
            split_left_top: ph * 0.78,
            split_right_top: ph * 0.71,
            split_left_bottom: ph * 0.65,
            split_right_bottom: ph * 0.58,
        }
    }
}

/// Colors of the accent bar at its upper and lower edge
pub fn top_bar_colors(top: TopColor) -> (Vec4, Vec4) {
    let (upper, lower) = ([0.313, 0.0196, 0.0274], [0.585, 0.0392, 0.0249]);
    let permute = |c: [f32; 3]| match top {
        TopColor::Red => Vec4::new(c[0], c[1], c[2], 1.0),
        TopColor::Blue => Vec4::new(c[1], c[2], c[0], 1.0),
        TopColor::Green => Vec4::new(c[2], c[0], c[1], 1.0),
    };
    (permute(upper), permute(lower))
}

/// Quad with independent corners, bottom-left, bottom-right, top-right, top-left
fn corners(positions: [[f32; 2]; 4], colors: [Vec4; 4], decorations: [[f32; 2]; 4]) -> Quad {
    Quad {
        positions,
        colors: colors.map(|c| c.to_array()),
        decorations,
    }
}

fn scale(s: f32) -> [f32; 2] {
    [0.0, s]
}

fn lift(add: f32) -> [f32; 2] {
    [add, 1.0]
}

/// Bordered gradient notes over a shaded three-dimensional keyboard
#[derive(Debug)]
pub struct PfaScene {
    state: SceneState,
}

impl PfaScene {
    pub fn new(quad_buffer_len: usize) -> Self {
        PfaScene {
            state: SceneState::new(quad_buffer_len),
        }
    }

    fn draw_notes(&mut self, viewport: Viewport, sink: &mut dyn QuadSink) {
        let padding_x = NOTE_PADDING as f32;
        let padding_y = (NOTE_PADDING * viewport.aspect()) as f32;
        let SceneState {
            batcher, visible, ..
        } = &mut self.state;
        for note in visible.notes() {
            emit_note(batcher, sink, note, padding_x, padding_y);
        }
        batcher.flush(sink, true);
    }

    fn draw_keyboard(
        &mut self,
        layout: &KeyLayout,
        settings: &RenderSettings,
        viewport: Viewport,
        sink: &mut dyn QuadSink,
    ) {
        let m = KeyboardMetrics::new(settings.piano_height as f32);
        let ph = settings.piano_height as f32;
        let SceneState {
            batcher, visible, ..
        } = &mut self.state;
        let keys = visible.keys();

        let (accent_upper, accent_lower) = top_bar_colors(settings.top_color);
        batcher.emit_quad(
            sink,
            &Quad::vertical(0.0, ph, 1.0, m.top_red_start, gray(0.086), gray(0.0196)),
        );
        batcher.emit_quad(
            sink,
            &Quad::vertical(0.0, m.top_red_start, 1.0, m.top_red_end, accent_upper, accent_lower),
        );
        batcher.emit_quad(
            sink,
            &Quad::solid(0.0, m.top_red_end, 1.0, m.top_bar_end, gray(0.239)),
        );

        let first_width = layout.span(layout.first()).map_or(0.0, |(_, w)| w);
        let separator_px = (first_width * viewport.width as f32 / 20.0).round().max(1.0);
        for key in layout.first()..layout.last() {
            if is_black_key(key) {
                continue;
            }
            let Some((x1, width)) = layout.span(key) else {
                continue;
            };
            let (x1, x2) = if layout.is_uniform() {
                white_key_extent(key, x1, width)
            } else {
                (x1, x1 + width)
            };
            let white = WhiteKey {
                key,
                x1,
                x2,
                width,
                pressed: keys.is_pressed(key),
            };
            emit_white_key(batcher, sink, &m, keys, &white, settings.middle_c, viewport);
            emit_separator(batcher, sink, &m, x1, separator_px, viewport.width as f32);
        }

        for key in layout.first()..layout.last() {
            if !is_black_key(key) {
                continue;
            }
            if let Some((x1, width)) = layout.span(key) {
                emit_black_key(batcher, sink, &m, keys, key, x1, width);
            }
        }
        batcher.flush(sink, true);
    }
}

/// Dimmed outline plus, when tall enough, a brighter inset body
fn emit_note(
    batcher: &mut QuadBatcher,
    sink: &mut dyn QuadSink,
    note: &VisibleNote,
    padding_x: f32,
    padding_y: f32,
) {
    let outer = Quad::horizontal(note.x1, note.y_start, note.x2, note.y_end, note.left, note.right)
        .shaded(scale(0.2), scale(0.2));
    batcher.emit_quad(sink, &outer);

    if note.y_end - note.y_start > padding_y * 2.0 {
        let inner = Quad::horizontal(
            note.x1 + padding_x,
            note.y_start + padding_y,
            note.x2 - padding_x,
            note.y_end - padding_y,
            note.left,
            note.right,
        )
        .shaded(scale(0.5), scale(1.0));
        batcher.emit_quad(sink, &inner);
    }
}

struct WhiteKey {
    key: usize,
    x1: f32,
    x2: f32,
    width: f32,
    pressed: bool,
}

fn emit_white_key(
    batcher: &mut QuadBatcher,
    sink: &mut dyn QuadSink,
    m: &KeyboardMetrics,
    keys: &KeyState,
    white: &WhiteKey,
    middle_c: bool,
    viewport: Viewport,
) {
    let [held_left, held_right] = keys.colors(white.key);
    let left = blend_key_color(held_left, Vec4::ONE);
    let right = blend_key_color(held_right, Vec4::ONE);
    let (x1, x2) = (white.x1, white.x2);

    let marker_base = if white.pressed {
        batcher.emit_quad(
            sink,
            &Quad::vertical(x1, m.white_down_top, x2, m.top_bar_end, left, right)
                .shaded(scale(1.0), scale(0.6)),
        );
        batcher.emit_quad(
            sink,
            &Quad::vertical(x1, 0.0, x2, m.white_down_top, left, right)
                .shaded(scale(0.6), scale(0.6)),
        );
        m.white_down_top
    } else {
        batcher.emit_quad(
            sink,
            &Quad::vertical(x1, m.white_up_top, x2, m.top_bar_end, left, right)
                .shaded(scale(1.0), scale(0.8)),
        );
        batcher.emit_quad(
            sink,
            &Quad::solid(x1, m.white_up_bottom, x2, m.white_up_top, gray(0.329)),
        );
        batcher.emit_quad(
            sink,
            &Quad::vertical(x1, 0.0, x2, m.white_up_bottom, gray(0.615), gray(0.729)),
        );
        m.white_up_top
    };

    if middle_c && white.key == MIDDLE_C {
        let (marker_left, marker_right) = if white.pressed {
            (left, right)
        } else {
            (gray(0.615), gray(0.729))
        };
        let quarter = white.width / 4.0;
        let y1 = marker_base + quarter;
        let y2 = y1 + quarter * 2.0 * viewport.aspect() as f32;
        batcher.emit_quad(
            sink,
            &Quad::vertical(x1 + quarter, y1, x2 - quarter, y2, marker_left, marker_right)
                .shaded(scale(0.6), scale(0.6)),
        );
    }
}

/// Pixel-snapped line on the left edge of a white key
fn emit_separator(
    batcher: &mut QuadBatcher,
    sink: &mut dyn QuadSink,
    m: &KeyboardMetrics,
    x: f32,
    width_px: f32,
    screen_width: f32,
) {
    let sx1 = (x * screen_width - width_px / 2.0).floor();
    let mut sx2 = (x * screen_width + width_px / 2.0).floor();
    if sx1 == sx2 {
        sx2 += 1.0;
    }
    batcher.emit_quad(
        sink,
        &Quad::horizontal(
            sx1 / screen_width,
            0.0,
            sx2 / screen_width,
            m.top_bar_end,
            gray(0.0431),
            gray(0.556),
        ),
    );
}

fn emit_black_key(
    batcher: &mut QuadBatcher,
    sink: &mut dyn QuadSink,
    m: &KeyboardMetrics,
    keys: &KeyState,
    key: usize,
    x1: f32,
    width: f32,
) {
    let [held_left, held_right] = keys.colors(key);
    let black = Vec4::new(0.0, 0.0, 0.0, 1.0);
    let l = blend_key_color(held_left, black);
    let r = blend_key_color(held_right, black);
    let mid = (l + r) / 2.0;

    let (ox1, ox2) = (x1, x1 + width);
    let (ix1, ix2) = (ox1 + width / 8.0, ox2 - width / 8.0);
    let (slt, srt, slb, srb) = (
        m.split_left_top,
        m.split_right_top,
        m.split_left_bottom,
        m.split_right_bottom,
    );

    let quads = if !keys.is_pressed(key) {
        let (top, bottom) = (m.black_up_top, m.black_up_bottom);
        [
            corners(
                [[ix1, slt], [ix2, srt], [ix2, top], [ix1, top]],
                [l, l, r, r],
                [lift(0.2), lift(0.2), lift(0.1), lift(0.1)],
            ),
            corners(
                [[ix1, slb], [ix2, srb], [ix2, srt], [ix1, slt]],
                [l, l, r, r],
                [FLAT, FLAT, lift(0.2), lift(0.2)],
            ),
            corners(
                [[ix1, bottom], [ix2, bottom], [ix2, srb], [ix1, slb]],
                [l, l, r, r],
                [FLAT; 4],
            ),
            corners(
                [[ox1, m.black_end], [ix1, bottom], [ix1, top], [ox1, m.top_bar_end]],
                [l, l, r, r],
                [FLAT, lift(0.3), lift(0.3), FLAT],
            ),
            corners(
                [[ox2, m.black_end], [ix2, bottom], [ix2, top], [ox2, m.top_bar_end]],
                [l, l, r, r],
                [FLAT, lift(0.3), lift(0.3), FLAT],
            ),
            corners(
                [[ox1, m.black_end], [ox2, m.black_end], [ix2, bottom], [ix1, bottom]],
                [l, l, r, r],
                [FLAT, FLAT, lift(0.3), lift(0.3)],
            ),
        ]
    } else {
        let (top, bottom) = (m.black_down_top, m.black_down_bottom);
        [
            corners(
                [[ix1, slt], [ix2, srt], [ix2, top], [ix1, top]],
                [mid, mid, r, r],
                [scale(0.9); 4],
            ),
            corners(
                [[ix1, slb], [ix2, srb], [ix2, srt], [ix1, slt]],
                [mid; 4],
                [scale(0.7), scale(0.7), scale(0.9), scale(0.9)],
            ),
            corners(
                [[ix1, bottom], [ix2, bottom], [ix2, srb], [ix1, slb]],
                [l, l, mid, mid],
                [scale(0.7); 4],
            ),
            corners(
                [[ox1, m.black_end], [ix1, bottom], [ix1, top], [ox1, m.top_bar_end]],
                [l, l, r, r],
                [scale(0.7), FLAT, FLAT, scale(0.7)],
            ),
            corners(
                [[ox2, m.black_end], [ix2, bottom], [ix2, top], [ox2, m.top_bar_end]],
                [l, l, r, r],
                [scale(0.7), FLAT, FLAT, scale(0.7)],
            ),
            corners(
                [[ox1, m.black_end], [ox2, m.black_end], [ix2, bottom], [ix1, bottom]],
                [l; 4],
                [scale(0.7), scale(0.7), FLAT, FLAT],
            ),
        ]
    };
    for quad in &quads {
        batcher.emit_quad(sink, quad);
    }
}

impl SceneRenderer for PfaScene {
    fn kind(&self) -> RendererKind {
        RendererKind::Pfa
    }

    fn render(
        &mut self,
        timeline: &Timeline,
        time: f64,
        settings: &RenderSettings,
        viewport: Viewport,
        sink: &mut dyn QuadSink,
    ) -> u64 {
        let layout = self
            .state
            .prepare(timeline, time, settings, uses_same_width(RendererKind::Pfa, settings));
        self.draw_notes(viewport, sink);
        self.draw_keyboard(&layout, settings, viewport, sink);
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
        width: 1000,
        height: 500,
    };

    /// One octave C4..B4
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
        *timeline.track_colors().write() = vec![TrackColors::uniform(Vec4::new(0.0, 0.0, 1.0, 1.0))];
        timeline
    }

    // three bars, idle white keys draw three quads plus a separator, black keys six
    const IDLE_KEYBOARD: usize = 3 + 7 * 4 + 5 * 6;

    #[test]
    fn test_idle_keyboard_quads() {
        let timeline = timeline_with(&[]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        assert_eq!(scene.render(&timeline, 0.0, &settings(), VIEWPORT, &mut sink), 0);
        assert_eq!(sink.quad_count(), IDLE_KEYBOARD);
        assert_eq!(sink.batches.len(), 1);
    }

    #[test]
    fn test_tall_note_gets_inset_body() {
        let timeline = timeline_with(&[(100.0, 200.0, 64)]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        scene.render(&timeline, 250.0, &settings(), VIEWPORT, &mut sink);

        // outline and body, then the keyboard in its own batch
        assert_eq!(sink.batches[0], 2);
        assert_eq!(sink.decorations[0], [0.0, 0.2]);
        let padding_y = (NOTE_PADDING * 2.0) as f32;
        assert!((sink.positions[4][1] - (sink.positions[0][1] + padding_y)).abs() < 1e-6);
        assert_eq!(sink.decorations[4], [0.0, 0.5]);
        assert_eq!(sink.decorations[6], [0.0, 1.0]);
    }

    #[test]
    fn test_thin_note_is_outline_only() {
        // a one-tick note is far thinner than twice the padding
        let timeline = timeline_with(&[(100.0, 101.0, 64)]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        scene.render(&timeline, 250.0, &settings(), VIEWPORT, &mut sink);
        assert_eq!(sink.batches[0], 1);
    }

    #[test]
    fn test_pressed_white_key_drops_notch() {
        let timeline = timeline_with(&[(0.0, 1000.0, 64)]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        scene.render(&timeline, 400.0, &settings(), VIEWPORT, &mut sink);

        // a pressed white key draws two quads instead of three
        assert_eq!(sink.quad_count(), 2 + IDLE_KEYBOARD - 1);
    }

    #[test]
    fn test_pressed_key_blends_note_color() {
        let timeline = timeline_with(&[(0.0, 1000.0, 60)]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        scene.render(&timeline, 400.0, &settings(), VIEWPORT, &mut sink);

        // notes, three bars, then the C key panel
        let panel = (2 + 3) * 4;
        assert_eq!(sink.colors[panel], [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_middle_c_marker() {
        let timeline = timeline_with(&[]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        let mut settings = settings();
        settings.middle_c = true;
        scene.render(&timeline, 0.0, &settings, VIEWPORT, &mut sink);
        assert_eq!(sink.quad_count(), IDLE_KEYBOARD + 1);
    }

    #[test]
    fn test_top_bar_color_permutes_channels() {
        let (red, _) = top_bar_colors(TopColor::Red);
        let (blue, _) = top_bar_colors(TopColor::Blue);
        let (green, _) = top_bar_colors(TopColor::Green);
        assert_eq!(red.x, 0.313);
        assert_eq!(blue.z, 0.313);
        assert_eq!(green.y, 0.313);
        assert_eq!(blue.x, 0.0196);
        assert_eq!(green.z, 0.0196);
    }

    #[test]
    fn test_separators_are_whole_pixels() {
        let timeline = timeline_with(&[]);
        let mut scene = PfaScene::new(4096);
        let mut sink = RecordingSink::default();
        scene.render(&timeline, 0.0, &settings(), VIEWPORT, &mut sink);

        // separator of the first white key follows its three quads
        let sep = (3 + 3) * 4;
        let x1 = sink.positions[sep][0] * VIEWPORT.width as f32;
        let x2 = sink.positions[sep + 1][0] * VIEWPORT.width as f32;
        assert!((x1 - x1.round()).abs() < 1e-3);
        assert!(x2 - x1 >= 1.0 - 1e-3);
    }
}
