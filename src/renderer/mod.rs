// src/renderer/mod.rs

pub mod batcher;
pub mod classic;
pub mod compositor;
pub mod layout;
pub mod overlay;
pub mod pfa;
pub mod pipeline;
pub mod scene;
pub mod visibility;

pub use batcher::{Quad, QuadBatcher, QuadSink};
pub use compositor::{GlowSettings, PostCompositor};
pub use layout::KeyLayout;
pub use overlay::PerformanceOverlay;
pub use pipeline::{GpuContext, QuadPipeline};
pub use scene::{create_scene, key_layout_for, SceneRenderer, Viewport};
pub use visibility::NoteVisibilitySet;
