// src/lib.rs

pub mod config;
pub mod error;
pub mod export;
pub mod midi;
pub mod performance;
pub mod render_loop;
pub mod renderer;
pub mod ui;
