// src/config.rs

use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub background_color: [f32; 4],
    pub vsync: bool,
}

/// Accent color of the bar above the keyboard
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TopColor {
    Red,
    Blue,
    Green,
}

/// Which scene renderer draws notes and keyboard
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RendererKind {
    Classic,
    Pfa,
}

impl RendererKind {
    pub fn next(self) -> Self {
        match self {
            RendererKind::Classic => RendererKind::Pfa,
            RendererKind::Pfa => RendererKind::Classic,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// First rendered key (inclusive)
    pub first_note: u16,
    /// Last rendered key (exclusive)
    pub last_note: u16,
    /// Fraction of the viewport height taken by the keyboard
    pub piano_height: f64,
    /// Ticks visible between the top edge and the keyboard line
    pub delta_time_on_screen: f64,
    pub same_width_notes: bool,
    pub top_color: TopColor,
    pub middle_c: bool,
    /// Classic renderer note color multiplier
    pub note_brightness: f32,
    pub renderer: RendererKind,
    pub glow_enabled: bool,
    pub glow_radius: f32,
    pub glow_strength: f32,
    pub click_debug: bool,
    /// Keep drawing new frames while paused
    #[serde(default)]
    pub force_rerender: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Quads buffered before a draw call is forced
    pub quad_buffer_len: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportMode {
    None,
    Video,
    Images,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub mode: ExportMode,
    pub ffmpeg_path: String,
    pub output_path: String,
    pub image_dir: String,
    pub include_audio: bool,
    pub audio_path: String,
    pub use_bitrate: bool,
    pub bitrate_kbps: u32,
    pub crf: u32,
    pub crf_preset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub render: RenderSettings,
    pub quality: QualityConfig,
    pub export: ExportConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 1920,
            height: 1080,
            fps: 60,
            background_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            first_note: 0,
            last_note: 128,
            piano_height: 0.151,
            delta_time_on_screen: 300.0,
            same_width_notes: false,
            top_color: TopColor::Red,
            middle_c: false,
            note_brightness: 1.0,
            renderer: RendererKind::Pfa,
            glow_enabled: false,
            glow_radius: 8.0,
            glow_strength: 1.5,
            click_debug: false,
            force_rerender: false,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            quad_buffer_len: 4096,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            mode: ExportMode::None,
            ffmpeg_path: "ffmpeg".to_string(),
            output_path: "out.mp4".to_string(),
            image_dir: "frames".to_string(),
            include_audio: false,
            audio_path: String::new(),
            use_bitrate: false,
            bitrate_kbps: 20000,
            crf: 17,
            crf_preset: "medium".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            display: DisplayConfig::default(),
            render: RenderSettings::default(),
            quality: QualityConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// A configuration value outside the range the renderer can work with
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let render = &self.render;
        if render.first_note >= render.last_note || render.last_note > 256 {
            return Err(ConfigError(format!(
                "key range {}..{} must be non-empty and within 0..256",
                render.first_note, render.last_note
            )));
        }
        if !(render.piano_height > 0.0 && render.piano_height < 1.0) {
            return Err(ConfigError(format!(
                "piano_height {} must be inside (0, 1)",
                render.piano_height
            )));
        }
        if render.delta_time_on_screen <= 0.0 {
            return Err(ConfigError("delta_time_on_screen must be positive".to_string()));
        }
        if render.note_brightness < 0.0 || render.glow_radius < 0.0 {
            return Err(ConfigError(
                "note_brightness and glow_radius must not be negative".to_string(),
            ));
        }
        if self.display.fps == 0 || self.display.width == 0 || self.display.height == 0 {
            return Err(ConfigError("fps, width and height must be non-zero".to_string()));
        }
        if self.quality.quad_buffer_len == 0 {
            return Err(ConfigError("quad_buffer_len must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Check output size and quad buffers against what the device can allocate
    pub fn check_limits(&self, limits: &wgpu::Limits) -> Result<(), RenderError> {
        let max_texture = limits.max_texture_dimension_2d as u64;
        let sizes = [
            ("display.width", self.display.width as u64),
            ("display.height", self.display.height as u64),
        ];
        for (name, requested) in sizes {
            if requested > max_texture {
                return Err(RenderError::Limit {
                    name,
                    requested,
                    max: max_texture,
                });
            }
        }

        // the color stream is the largest of the three vertex buffers
        let quad_bytes = (self.quality.quad_buffer_len as u64).saturating_mul(4 * 16);
        if quad_bytes > limits.max_buffer_size {
            return Err(RenderError::Limit {
                name: "quality.quad_buffer_len",
                requested: quad_bytes,
                max: limits.max_buffer_size,
            });
        }

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64;
        let row = (self.display.width as u64 * 4).div_ceil(align) * align;
        let readback_bytes = row * self.display.height as u64;
        if self.export.mode != ExportMode::None && readback_bytes > limits.max_buffer_size {
            return Err(RenderError::Limit {
                name: "export frame buffer",
                requested: readback_bytes,
                max: limits.max_buffer_size,
            });
        }
        Ok(())
    }

    /// Export section overrides from `--video`, `--images` and `--audio`
    pub fn apply_cli_overrides(&mut self, args: &[String]) {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--video" => {
                    if let Some(path) = iter.next() {
                        self.export.mode = ExportMode::Video;
                        self.export.output_path = path.clone();
                    }
                }
                "--images" => {
                    if let Some(dir) = iter.next() {
                        self.export.mode = ExportMode::Images;
                        self.export.image_dir = dir.clone();
                    }
                }
                "--audio" => {
                    if let Some(path) = iter.next() {
                        self.export.include_audio = true;
                        self.export.audio_path = path.clone();
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_key_range() {
        let mut config = AppConfig::default();
        config.render.first_note = 60;
        config.render.last_note = 60;
        assert!(config.validate().is_err());

        config.render.first_note = 0;
        config.render.last_note = 257;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_piano_height_out_of_range() {
        let mut config = AppConfig::default();
        config.render.piano_height = 1.0;
        assert!(config.validate().is_err());
        config.render.piano_height = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_enums() {
        let mut config = AppConfig::default();
        config.render.renderer = RendererKind::Classic;
        config.render.top_color = TopColor::Green;
        config.export.mode = ExportMode::Images;

        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.render.renderer, RendererKind::Classic);
        assert_eq!(parsed.render.top_color, TopColor::Green);
        assert_eq!(parsed.export.mode, ExportMode::Images);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args: Vec<String> = ["song.mid", "--video", "render.mkv", "--audio", "song.wav"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        config.apply_cli_overrides(&args);
        assert_eq!(config.export.mode, ExportMode::Video);
        assert_eq!(config.export.output_path, "render.mkv");
        assert!(config.export.include_audio);
        assert_eq!(config.export.audio_path, "song.wav");
    }

    #[test]
    fn test_renderer_kind_cycles() {
        assert_eq!(RendererKind::Classic.next(), RendererKind::Pfa);
        assert_eq!(RendererKind::Pfa.next(), RendererKind::Classic);
    }

    #[test]
    fn test_default_config_fits_default_limits() {
        let limits = wgpu::Limits::default();
        assert!(AppConfig::default().check_limits(&limits).is_ok());

        let mut config = AppConfig::default();
        config.display.width = limits.max_texture_dimension_2d;
        config.display.height = limits.max_texture_dimension_2d;
        assert!(config.check_limits(&limits).is_ok());
    }

    #[test]
    fn test_oversized_output_names_the_limit() {
        let limits = wgpu::Limits::default();
        let mut config = AppConfig::default();
        config.display.width = limits.max_texture_dimension_2d + 1;
        assert!(config.validate().is_ok());
        match config.check_limits(&limits) {
            Err(RenderError::Limit { name, requested, max }) => {
                assert_eq!(name, "display.width");
                assert_eq!(requested, limits.max_texture_dimension_2d as u64 + 1);
                assert_eq!(max, limits.max_texture_dimension_2d as u64);
            }
            other => panic!("expected a width limit error, got {:?}", other),
        }

        config.display.width = 1280;
        config.display.height = 9000;
        assert!(matches!(
            config.check_limits(&limits),
            Err(RenderError::Limit { name: "display.height", .. })
        ));
    }

    #[test]
    fn test_oversized_quad_buffer_names_the_limit() {
        let limits = wgpu::Limits::default();
        let mut config = AppConfig::default();
        config.quality.quad_buffer_len = (limits.max_buffer_size / 64) as usize;
        assert!(config.check_limits(&limits).is_ok());

        config.quality.quad_buffer_len += 1;
        let err = config.check_limits(&limits).unwrap_err();
        assert!(matches!(err, RenderError::Limit { name: "quality.quad_buffer_len", .. }));
        assert!(err.to_string().contains("quality.quad_buffer_len"));
    }

    #[test]
    fn test_export_readback_must_fit_one_buffer() {
        let limits = wgpu::Limits {
            max_buffer_size: 1 << 20,
            ..wgpu::Limits::default()
        };
        let mut config = AppConfig::default();
        config.display.width = 1024;
        config.display.height = 1024;
        assert!(config.check_limits(&limits).is_ok());

        config.export.mode = ExportMode::Images;
        assert!(matches!(
            config.check_limits(&limits),
            Err(RenderError::Limit { name: "export frame buffer", .. })
        ));
    }
}
