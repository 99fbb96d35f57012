// src/ui/input.rs

use crate::config::AppConfig;
use crate::midi::{Timeline, TimelineCursor};
use crate::renderer::overlay::PerformanceOverlay;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Actions that can be triggered by input
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    None,
    TogglePause,
    IncreaseSpeed,
    DecreaseSpeed,
    /// Keep drawing new frames while paused
    ToggleForceRerender,
    ToggleOverlay,
    /// Back to the start of the file
    Reset,
    NextRenderer,
    ToggleGlow,
    Quit,
    Resize(u32, u32),
    /// Left click at a window position in physical pixels
    MouseClicked(f64, f64),
}

/// Turns window events into [`InputAction`]s
pub struct InputHandler {
    mouse_x: f64,
    mouse_y: f64,
}

impl InputHandler {
    pub fn new() -> Self {
        InputHandler {
            mouse_x: 0.0,
            mouse_y: 0.0,
        }
    }

    pub fn process_event(&mut self, event: &WindowEvent) -> InputAction {
        match event {
            WindowEvent::KeyboardInput { event, .. } => self.process_key_event(event),

            WindowEvent::Resized(size) => InputAction::Resize(size.width, size.height),

            WindowEvent::CloseRequested => InputAction::Quit,

            WindowEvent::CursorMoved { position, .. } => {
                self.mouse_x = position.x;
                self.mouse_y = position.y;
                InputAction::None
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if *state == ElementState::Pressed && *button == MouseButton::Left {
                    InputAction::MouseClicked(self.mouse_x, self.mouse_y)
                } else {
                    InputAction::None
                }
            }

            _ => InputAction::None,
        }
    }

    fn process_key_event(&mut self, event: &KeyEvent) -> InputAction {
        if event.state != ElementState::Pressed {
            return InputAction::None;
        }
        key_action(&event.logical_key)
    }

    /// Apply a playback action; returns true when the paused frame has to be redrawn
    pub fn apply_action(
        action: &InputAction,
        cursor: &mut TimelineCursor,
        timeline: &Timeline,
        overlay: &mut PerformanceOverlay,
        config: &mut AppConfig,
    ) -> bool {
        match action {
            InputAction::TogglePause => {
                cursor.toggle_pause();
                log::debug!("Playback: {}", if cursor.is_paused() { "Paused" } else { "Playing" });
                false
            }
            InputAction::IncreaseSpeed => {
                cursor.increase_speed();
                log::debug!("Speed: {:.1}x", cursor.tempo_multiplier());
                false
            }
            InputAction::DecreaseSpeed => {
                cursor.decrease_speed();
                log::debug!("Speed: {:.1}x", cursor.tempo_multiplier());
                false
            }
            InputAction::ToggleForceRerender => {
                config.render.force_rerender = !config.render.force_rerender;
                log::debug!("Render while paused: {}", config.render.force_rerender);
                false
            }
            InputAction::ToggleOverlay => {
                overlay.toggle();
                log::debug!("Overlay: {}", if overlay.is_visible() { "Visible" } else { "Hidden" });
                false
            }
            InputAction::Reset => {
                cursor.reset(config.render.delta_time_on_screen);
                timeline.reset_track_colors();
                log::debug!("Playback reset to start");
                true
            }
            InputAction::NextRenderer => {
                config.render.renderer = config.render.renderer.next();
                log::debug!("Renderer: {:?}", config.render.renderer);
                true
            }
            InputAction::ToggleGlow => {
                config.render.glow_enabled = !config.render.glow_enabled;
                log::debug!("Glow: {}", if config.render.glow_enabled { "On" } else { "Off" });
                true
            }
            _ => false,
        }
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn key_action(key: &Key) -> InputAction {
    match key {
        Key::Named(NamedKey::Space) => InputAction::TogglePause,
        Key::Named(NamedKey::ArrowUp) => InputAction::IncreaseSpeed,
        Key::Named(NamedKey::ArrowDown) => InputAction::DecreaseSpeed,
        Key::Named(NamedKey::Escape) => InputAction::Quit,
        Key::Character(c) => match c.as_str() {
            "p" | "P" => InputAction::ToggleOverlay,
            "r" | "R" => InputAction::Reset,
            "n" | "N" => InputAction::NextRenderer,
            "g" | "G" => InputAction::ToggleGlow,
            "f" | "F" => InputAction::ToggleForceRerender,
            "q" | "Q" => InputAction::Quit,
            _ => InputAction::None,
        },
        _ => InputAction::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::ColorChangeEvent;
    use glam::Vec4;

    #[test]
    fn test_key_bindings() {
        assert_eq!(key_action(&Key::Named(NamedKey::Space)), InputAction::TogglePause);
        assert_eq!(key_action(&Key::Named(NamedKey::ArrowUp)), InputAction::IncreaseSpeed);
        assert_eq!(key_action(&Key::Named(NamedKey::Escape)), InputAction::Quit);
        assert_eq!(key_action(&Key::Character("n".into())), InputAction::NextRenderer);
        assert_eq!(key_action(&Key::Character("G".into())), InputAction::ToggleGlow);
        assert_eq!(key_action(&Key::Character("x".into())), InputAction::None);
    }

    #[test]
    fn test_reset_rewinds_cursor_and_colors() {
        let timeline = Timeline::new(480, 1);
        let default_colors = timeline.track_colors().read()[0];
        timeline.track_colors().write()[0].apply(&ColorChangeEvent {
            pos: 0.0,
            track: 0,
            channel: 0x7F,
            col1: Vec4::ONE,
            col2: Vec4::ONE,
        });

        let mut config = AppConfig::default();
        let window = config.render.delta_time_on_screen;
        let mut cursor = TimelineCursor::new(480, 60, window);
        for _ in 0..10 {
            cursor.advance(&[], window);
        }
        let mut overlay = PerformanceOverlay::default();

        let redraw = InputHandler::apply_action(
            &InputAction::Reset,
            &mut cursor,
            &timeline,
            &mut overlay,
            &mut config,
        );
        assert!(redraw);
        assert_eq!(cursor.time(), -window);
        assert_eq!(timeline.track_colors().read()[0], default_colors);
    }

    #[test]
    fn test_toggles_change_config() {
        let timeline = Timeline::new(480, 1);
        let mut config = AppConfig::default();
        let mut cursor = TimelineCursor::new(480, 60, 300.0);
        let mut overlay = PerformanceOverlay::default();

        let mut apply = |action: InputAction, config: &mut AppConfig| {
            InputHandler::apply_action(&action, &mut cursor, &timeline, &mut overlay, config)
        };
        let kind = config.render.renderer;
        apply(InputAction::NextRenderer, &mut config);
        assert_eq!(config.render.renderer, kind.next());
        apply(InputAction::NextRenderer, &mut config);
        assert_eq!(config.render.renderer, kind);

        let glow = config.render.glow_enabled;
        apply(InputAction::ToggleGlow, &mut config);
        assert_eq!(config.render.glow_enabled, !glow);

        assert!(!config.render.force_rerender);
        assert!(!apply(InputAction::ToggleForceRerender, &mut config));
        assert!(config.render.force_rerender);
    }

    #[test]
    fn test_pause_and_speed() {
        let timeline = Timeline::new(480, 1);
        let mut config = AppConfig::default();
        let mut cursor = TimelineCursor::new(480, 60, 300.0);
        let mut overlay = PerformanceOverlay::default();

        InputHandler::apply_action(
            &InputAction::TogglePause,
            &mut cursor,
            &timeline,
            &mut overlay,
            &mut config,
        );
        assert!(cursor.is_paused());
        for _ in 0..200 {
            InputHandler::apply_action(
                &InputAction::IncreaseSpeed,
                &mut cursor,
                &timeline,
                &mut overlay,
                &mut config,
            );
        }
        assert_eq!(cursor.tempo_multiplier(), 10.0);
    }
}
