// src/renderer/scene.rs

use crate::config::{RenderSettings, RendererKind};
use crate::midi::Timeline;
use crate::renderer::batcher::{QuadBatcher, QuadSink};
use crate::renderer::classic::ClassicScene;
use crate::renderer::layout::KeyLayout;
use crate::renderer::pfa::PfaScene;
use crate::renderer::visibility::NoteVisibilitySet;
use glam::Vec4;

/// Pixel size of the frame being drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// A visual style for notes and keyboard
pub trait SceneRenderer {
    fn kind(&self) -> RendererKind;

    /// Draw the notes around `time`, then the keyboard; returns the notes inside the window
    fn render(
        &mut self,
        timeline: &Timeline,
        time: f64,
        settings: &RenderSettings,
        viewport: Viewport,
        sink: &mut dyn QuadSink,
    ) -> u64;

    /// Draw calls issued since creation
    fn flush_count(&self) -> u64;
}

pub fn create_scene(kind: RendererKind, quad_buffer_len: usize) -> Box<dyn SceneRenderer> {
    match kind {
        RendererKind::Classic => Box::new(ClassicScene::new(quad_buffer_len)),
        RendererKind::Pfa => Box::new(PfaScene::new(quad_buffer_len)),
    }
}

/// Whether `kind` spreads keys evenly; the classic keyboard always does
pub fn uses_same_width(kind: RendererKind, settings: &RenderSettings) -> bool {
    kind == RendererKind::Classic || settings.same_width_notes
}

/// The key layout `kind` draws with under `settings`
pub fn key_layout_for(kind: RendererKind, settings: &RenderSettings) -> KeyLayout {
    KeyLayout::new(
        settings.first_note as usize,
        settings.last_note as usize,
        uses_same_width(kind, settings),
    )
}

/// State every scene keeps between frames
#[derive(Debug)]
pub(crate) struct SceneState {
    pub batcher: QuadBatcher,
    pub visible: NoteVisibilitySet,
    layout: Option<(LayoutKey, KeyLayout)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayoutKey {
    first: u16,
    last: u16,
    same_width: bool,
}

impl SceneState {
    pub fn new(quad_buffer_len: usize) -> Self {
        SceneState {
            batcher: QuadBatcher::new(quad_buffer_len),
            visible: NoteVisibilitySet::new(),
            layout: None,
        }
    }

    /// Snapshot the visible notes; the layout is rebuilt only when the key range changes
    pub fn prepare(
        &mut self,
        timeline: &Timeline,
        time: f64,
        settings: &RenderSettings,
        same_width: bool,
    ) -> KeyLayout {
        let key = LayoutKey {
            first: settings.first_note,
            last: settings.last_note,
            same_width,
        };
        let layout = match &self.layout {
            Some((cached, layout)) if *cached == key => layout.clone(),
            _ => {
                let layout = KeyLayout::new(key.first as usize, key.last as usize, same_width);
                self.layout = Some((key, layout.clone()));
                layout
            }
        };
        self.visible.collect(
            timeline,
            &layout,
            time,
            settings.delta_time_on_screen,
            settings.piano_height,
        );
        layout
    }
}

/// Held key color laid over the key's own color by the held color's alpha
pub fn blend_key_color(held: Vec4, base: Vec4) -> Vec4 {
    let a = held.w;
    (held.truncate() * a + base.truncate() * (1.0 - a)).extend(1.0)
}

/// Horizontal extent of a white key on a same-width keyboard, stretched under its black neighbours
pub fn white_key_extent(key: usize, x1: f32, width: f32) -> (f32, f32) {
    let (mut x1, mut x2) = (x1, x1 + width);
    match key % 12 {
        0 => x2 += width * 0.666,
        2 => {
            x1 -= width / 3.0;
            x2 += width / 3.0;
        }
        4 => x1 -= width / 3.0 * 2.0,
        5 => x2 += width * 0.75,
        7 => {
            x1 -= width / 4.0;
            x2 += width / 2.0;
        }
        9 => {
            x1 -= width / 2.0;
            x2 += width / 4.0;
        }
        11 => x1 -= width * 0.75,
        _ => {}
    }
    (x1, x2)
}

pub(crate) fn gray(v: f32) -> Vec4 {
    Vec4::new(v, v, v, 1.0)
}
