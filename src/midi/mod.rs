// src/midi/mod.rs

pub mod cursor;
pub mod loader;
pub mod note;
pub mod timeline;

pub use cursor::TimelineCursor;
pub use loader::{LoadError, MidiLoader};
pub use note::{ColorChangeEvent, Note, TempoEvent, TrackColors};
pub use timeline::Timeline;
