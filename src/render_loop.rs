// src/render_loop.rs

use crate::config::{AppConfig, ExportConfig, ExportMode};
use crate::error::RenderError;
use crate::export::{
    ExportError, FfmpegSink, FrameExporter, FrameReadback, FrameSink, ImageSequenceSink,
};
use crate::midi::{MidiLoader, Timeline, TimelineCursor};
use crate::performance::PerformanceMonitor;
use crate::renderer::overlay::{PerformanceOverlay, PlaybackStatus};
use crate::renderer::{
    create_scene, key_layout_for, GlowSettings, GpuContext, PostCompositor, QuadPipeline,
    SceneRenderer, Viewport,
};
use crate::ui::{query, InputAction, InputHandler};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::window::Window;

/// Longest single wait for the loader before a preview frame is drawn anyway
const SYNC_TIMEOUT: Duration = Duration::from_millis(100);

/// Seconds kept rolling after the last event so the final notes clear the keyboard
const TAIL_SECONDS: f64 = 5.0;

const STATS_INTERVAL: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    /// Every note has scrolled off; the run is over
    Finished,
}

/// True once the cursor is past the end of the file plus the tail
pub fn playback_finished(
    time: f64,
    max_track_time: f64,
    window: f64,
    ticks_per_second: f64,
    unended_tracks: usize,
) -> bool {
    unended_tracks == 0 && time >= max_track_time + window + ticks_per_second * TAIL_SECONDS
}

/// Sink for the configured export mode, or `None` when only previewing
pub fn open_sink(
    export: &ExportConfig,
    width: u32,
    height: u32,
    fps: u32,
) -> Result<Option<Box<dyn FrameSink>>, ExportError> {
    let sink: Box<dyn FrameSink> = match export.mode {
        ExportMode::None => return Ok(None),
        ExportMode::Video => Box::new(FfmpegSink::spawn(export, width, height, fps)?),
        ExportMode::Images => Box::new(ImageSequenceSink::new(&export.image_dir, width, height)?),
    };
    Ok(Some(sink))
}

/// Hand `frame` to the exporter. A failed write closes the export and
/// leaves `exporter` empty, so rendering carries on as a preview.
pub fn submit_or_downgrade(exporter: &mut Option<FrameExporter>, frame: Vec<u8>) {
    let Some(active) = exporter.as_mut() else {
        return;
    };
    if let Err(e) = active.submit(frame) {
        log::error!("Frame export failed, continuing in preview: {}", e);
        if let Some(failed) = exporter.take() {
            if let Err(e) = failed.finish() {
                log::error!("Export sink failed to close: {}", e);
            }
        }
    }
}

fn start_export(
    device: &wgpu::Device,
    config: &AppConfig,
    width: u32,
    height: u32,
) -> Option<(FrameExporter, FrameReadback)> {
    let started = open_sink(&config.export, width, height, config.display.fps)
        .and_then(|sink| sink.map(FrameExporter::start).transpose());
    match started {
        Ok(Some(exporter)) => {
            log::info!("Exporting {}x{} at {} fps", width, height, config.display.fps);
            Some((exporter, FrameReadback::new(device, width, height)))
        }
        Ok(None) => None,
        Err(e) => {
            log::warn!("Export disabled, continuing in preview: {}", e);
            None
        }
    }
}

/// Drives cursor, scene, compositor, export and presentation once per frame
pub struct RenderLoop {
    exporter: Option<FrameExporter>,
    readback: Option<FrameReadback>,
    window: Arc<Window>,
    gpu: GpuContext,
    quads: QuadPipeline,
    compositor: PostCompositor,
    scene: Box<dyn SceneRenderer>,
    cursor: TimelineCursor,
    loader: MidiLoader,
    timeline: Arc<Timeline>,
    settings: Arc<RwLock<AppConfig>>,
    monitor: PerformanceMonitor,
    overlay: PerformanceOverlay,
    title: String,
    /// The paused frame is stale and must be drawn again
    redraw_pending: bool,
}

impl RenderLoop {
    pub fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        loader: MidiLoader,
        settings: Arc<RwLock<AppConfig>>,
    ) -> Self {
        let config = settings.read().clone();
        let (width, height) = (config.display.width, config.display.height);
        let timeline = loader.timeline();

        let quads = QuadPipeline::new(&gpu.device, config.quality.quad_buffer_len);
        let compositor = PostCompositor::new(&gpu.device, gpu.config.format, width, height);
        let scene = create_scene(config.render.renderer, config.quality.quad_buffer_len);
        let cursor = TimelineCursor::new(
            timeline.division(),
            config.display.fps,
            config.render.delta_time_on_screen,
        );
        let (exporter, readback) = start_export(&gpu.device, &config, width, height).unzip();

        log::info!(
            "Rendering {}x{} with the {:?} renderer",
            width,
            height,
            config.render.renderer
        );

        RenderLoop {
            exporter,
            readback,
            window,
            gpu,
            quads,
            compositor,
            scene,
            cursor,
            loader,
            timeline,
            settings,
            monitor: PerformanceMonitor::new(),
            overlay: PerformanceOverlay::default(),
            title: String::new(),
            redraw_pending: true,
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.exporter.is_some()
    }

    /// Produce, export and present one frame
    pub fn render_frame(&mut self) -> Result<FrameOutcome, RenderError> {
        let started = Instant::now();
        let config = self.settings.read().clone();
        let render = &config.render;
        let window = render.delta_time_on_screen;
        self.apply_settings(&config);
        self.wait_for_loader();

        let time = self.cursor.time();
        let mut notes_on_screen = self.monitor.notes_on_screen();
        if !self.cursor.is_paused() || render.force_rerender || self.redraw_pending {
            let (width, height) = self.compositor.size();
            self.compositor.begin_frame(&self.gpu.device, &self.gpu.queue);
            let mut sink =
                self.quads
                    .sink(&self.gpu.device, &self.gpu.queue, self.compositor.base_view());
            notes_on_screen = self.scene.render(
                &self.timeline,
                time,
                render,
                Viewport { width, height },
                &mut sink,
            );
            let glow = GlowSettings {
                enabled: render.glow_enabled,
                radius: render.glow_radius,
                strength: render.glow_strength,
            };
            self.compositor.composite(
                &self.gpu.device,
                &self.gpu.queue,
                &glow,
                config.display.background_color,
            );
            self.redraw_pending = false;
        }

        self.cursor.step(&self.timeline, window);
        self.export_frame()?;
        self.present()?;

        self.monitor.frame_rendered(started.elapsed(), notes_on_screen);
        if self.monitor.frame_count() % STATS_INTERVAL == 0 {
            log::debug!(
                "{} frames, {} draw calls, {} notes on screen",
                self.monitor.frame_count(),
                self.scene.flush_count(),
                notes_on_screen
            );
        }
        self.update_title();

        let ticks_per_second = self.cursor.frame_step() * config.display.fps as f64;
        if playback_finished(
            self.cursor.time(),
            self.timeline.max_track_time(),
            window,
            ticks_per_second,
            self.timeline.unended_tracks(),
        ) {
            log::info!("Reached the end of the file at tick {:.0}", self.cursor.time());
            return Ok(FrameOutcome::Finished);
        }
        Ok(FrameOutcome::Continue)
    }

    /// Pick up settings changed since the last frame
    fn apply_settings(&mut self, config: &AppConfig) {
        if let Err(e) = config.check_limits(&self.gpu.device.limits()) {
            log::warn!("Keeping the current output size and quad buffer: {}", e);
            let (width, height) = self.compositor.size();
            let mut settings = self.settings.write();
            settings.display.width = width;
            settings.display.height = height;
            settings.quality.quad_buffer_len = self.quads.capacity();
            return;
        }

        let kind = config.render.renderer;
        let quad_buffer_len = config.quality.quad_buffer_len;
        if quad_buffer_len != self.quads.capacity() {
            self.quads = QuadPipeline::new(&self.gpu.device, quad_buffer_len);
            self.scene = create_scene(kind, quad_buffer_len);
            self.redraw_pending = true;
        } else if self.scene.kind() != kind {
            log::info!("Switched to the {:?} renderer", kind);
            self.scene = create_scene(kind, quad_buffer_len);
            self.redraw_pending = true;
        }

        self.cursor.set_fps(config.display.fps);
        self.gpu.set_vsync(config.display.vsync);

        let size = (config.display.width.max(1), config.display.height.max(1));
        if size != self.compositor.size() {
            if self.exporter.is_some() {
                log::warn!("Output size is fixed while exporting");
                let (width, height) = self.compositor.size();
                let mut settings = self.settings.write();
                settings.display.width = width;
                settings.display.height = height;
            } else {
                self.compositor.resize(&self.gpu.device, size.0, size.1);
                self.redraw_pending = true;
            }
        }
    }

    /// Hold the frame until the loader has published past it; exports never skip ahead
    fn wait_for_loader(&self) {
        let target = self.cursor.time() + self.cursor.frame_step() * self.cursor.tempo_multiplier();
        while !self.timeline.wait_for_sync(target, SYNC_TIMEOUT) {
            if self.exporter.is_none() || self.loader.is_finished() {
                log::debug!("Loader behind tick {:.0}", target);
                break;
            }
        }
    }

    fn export_frame(&mut self) -> Result<(), RenderError> {
        let (Some(exporter), Some(readback)) = (self.exporter.as_mut(), self.readback.as_ref()) else {
            return Ok(());
        };
        let mut frame = exporter.take_buffer();
        readback.read(
            &self.gpu.device,
            &self.gpu.queue,
            self.compositor.final_texture(),
            &mut frame,
        )?;
        submit_or_downgrade(&mut self.exporter, frame);
        if self.exporter.is_none() {
            self.readback = None;
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                let error = RenderError::from(e);
                if error.is_fatal() {
                    return Err(error);
                }
                log::debug!("Skipping present: {}", error);
                if !matches!(error, RenderError::Present(wgpu::SurfaceError::Timeout)) {
                    self.gpu.reconfigure();
                }
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.compositor
            .present(&self.gpu.device, &self.gpu.queue, &view);
        output.present();
        Ok(())
    }

    fn update_title(&mut self) {
        let status = PlaybackStatus {
            time: self.cursor.time(),
            tempo_multiplier: self.cursor.tempo_multiplier(),
            paused: self.cursor.is_paused(),
            loading: !self.loader.is_finished(),
            frames_exported: self.exporter.as_ref().map(|e| e.frames_submitted()),
        };
        self.overlay.update(&self.monitor, &status);
        let title = self.overlay.get_title_text();
        if title != self.title {
            self.window.set_title(&title);
            self.title = title;
        }
    }

    /// Route an input action; quitting is left to the caller
    pub fn handle_input(&mut self, action: &InputAction) {
        match action {
            InputAction::Resize(width, height) => {
                self.gpu
                    .resize(winit::dpi::PhysicalSize::new(*width, *height));
            }
            InputAction::MouseClicked(x, y) => self.click(*x, *y),
            _ => {
                let mut config = self.settings.write();
                if InputHandler::apply_action(
                    action,
                    &mut self.cursor,
                    &self.timeline,
                    &mut self.overlay,
                    &mut config,
                ) {
                    self.redraw_pending = true;
                }
            }
        }
    }

    /// Log what lies under a click on the paused frame
    fn click(&self, x: f64, y: f64) {
        if !self.cursor.is_paused() {
            return;
        }
        let size = self.gpu.size;
        let (x, y) = (x / size.width.max(1) as f64, y / size.height.max(1) as f64);
        let render = self.settings.read().render.clone();
        let layout = key_layout_for(render.renderer, &render);
        let result = query::query(
            x,
            y,
            self.cursor.time(),
            self.timeline.division(),
            &render,
            &layout,
        );
        query::log_query(&result);

        if render.click_debug {
            if let Some(key) = result.key {
                let note = query::note_at(&self.timeline.notes(), key, result.time);
                query::log_note(note.as_ref());
            }
        }
    }

    /// Await the last export write and close the sink
    pub fn shutdown(mut self) -> Result<(), ExportError> {
        let Some(exporter) = self.exporter.take() else {
            return Ok(());
        };
        let frames = exporter.frames_submitted();
        let result = exporter.finish();
        self.readback = None;
        if result.is_ok() {
            log::info!("Exported {} frames", frames);
        }
        result
    }
}
