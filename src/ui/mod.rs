// src/ui/mod.rs

pub mod input;
pub mod query;

pub use input::{InputAction, InputHandler};
pub use query::ClickQuery;
