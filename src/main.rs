// src/main.rs

use notefall::config::AppConfig;
use notefall::midi::MidiLoader;
use notefall::render_loop::{FrameOutcome, RenderLoop};
use notefall::renderer::overlay::WINDOW_TITLE;
use notefall::renderer::GpuContext;
use notefall::ui::{InputAction, InputHandler};

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

const CONFIG_FILE: &str = "config.json";

const USAGE: &str = "usage: notefall <file.mid> [--video <out>] [--images <dir>] [--audio <file>]";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Starting notefall");

    let args: Vec<String> = std::env::args().collect();
    let Some(midi_path) = args.get(1).cloned() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    println!("\n=== notefall controls ===");
    println!("Space      - Pause/Resume");
    println!("Up/Down    - Adjust speed (0.1x - 10x)");
    println!("R          - Reset to start");
    println!("N          - Next renderer");
    println!("G          - Toggle glow");
    println!("F          - Render while paused");
    println!("P          - Toggle performance overlay");
    println!("Click      - Inspect position (while paused)");
    println!("Q/ESC      - Quit");
    println!("=========================\n");

    let file_config = AppConfig::load_from_file(CONFIG_FILE).unwrap_or_else(|e| {
        log::warn!("Using default config ({})", e);
        let default = AppConfig::default();
        if let Err(e) = default.save_to_file(CONFIG_FILE) {
            log::warn!("Failed to save default config: {}", e);
        }
        default
    });
    let mut config = file_config.clone();
    config.apply_cli_overrides(&args[2..]);

    log::info!("Loading MIDI file: {}", midi_path);
    let loader = MidiLoader::spawn(&midi_path)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let window = Arc::new(
        WindowBuilder::new()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                config.display.width,
                config.display.height,
            ))
            .build(&event_loop)?,
    );

    let gpu = pollster::block_on(GpuContext::new(window.clone(), &config))?;
    let settings = Arc::new(RwLock::new(config));
    let mut render_loop = Some(RenderLoop::new(
        window.clone(),
        gpu,
        loader,
        settings.clone(),
    ));
    let mut input_handler = InputHandler::new();

    let mut last_frame = Instant::now();
    let mut frame_accumulator = Duration::ZERO;

    log::info!("Application initialized, entering event loop");

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => {
            let Some(render_loop) = render_loop.as_mut() else {
                return;
            };
            match input_handler.process_event(&event) {
                InputAction::None => {}
                InputAction::Quit => elwt.exit(),
                action => render_loop.handle_input(&action),
            }

            if matches!(event, WindowEvent::RedrawRequested) {
                let now = Instant::now();
                let fps = settings.read().display.fps.max(1);
                let target = Duration::from_secs_f64(1.0 / fps as f64);
                frame_accumulator = (frame_accumulator + (now - last_frame)).min(target * 2);
                last_frame = now;

                // exports run as fast as the encoder accepts frames
                if !render_loop.is_exporting() {
                    if frame_accumulator < target {
                        return;
                    }
                    frame_accumulator -= target;
                }

                match render_loop.render_frame() {
                    Ok(FrameOutcome::Continue) => {}
                    Ok(FrameOutcome::Finished) => elwt.exit(),
                    Err(e) => {
                        log::error!("Render error: {}", e);
                        elwt.exit();
                    }
                }
            }
        }
        Event::AboutToWait => {
            window.request_redraw();
        }
        Event::LoopExiting => {
            if let Some(render_loop) = render_loop.take() {
                if let Err(e) = render_loop.shutdown() {
                    log::error!("Export did not finish cleanly: {}", e);
                }
            }
            // command-line export overrides stay out of the saved file
            let mut saved = settings.read().clone();
            saved.export = file_config.export.clone();
            if let Err(e) = saved.save_to_file(CONFIG_FILE) {
                log::warn!("Failed to save config: {}", e);
            }
        }
        _ => {}
    })?;

    log::info!("notefall shut down cleanly");
    Ok(())
}
