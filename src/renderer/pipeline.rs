// src/renderer/pipeline.rs

use crate::config::AppConfig;
use crate::error::RenderError;
use crate::renderer::batcher::{quad_indices, QuadBatch, QuadSink};
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

/// Format of every off-screen target; matches the BGRA byte order the encoders expect
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

/// Device, queue and window surface shared by every render stage
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>, app_config: &AppConfig) -> Result<Self, RenderError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        log::info!("Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    label: Some("notefall Device"),
                },
                None,
            )
            .await?;
        app_config.check_limits(&device.limits())?;

        // Composited frames are already display-ready, so skip sRGB re-encoding
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.clamp(1, device.limits().max_texture_dimension_2d),
            height: size.height.clamp(1, device.limits().max_texture_dimension_2d),
            present_mode: present_mode(app_config.display.vsync),
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(GpuContext {
            surface,
            device,
            queue,
            config,
            size,
        })
    }

    /// Handle window resize
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            let max = self.device.limits().max_texture_dimension_2d;
            self.size = new_size;
            self.config.width = new_size.width.min(max);
            self.config.height = new_size.height.min(max);
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Reconfigure the surface after it was lost or went stale
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        let mode = present_mode(vsync);
        if self.config.present_mode != mode {
            self.config.present_mode = mode;
            self.surface.configure(&self.device, &self.config);
        }
    }
}

fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

fn vertex_layout(
    attributes: &'static [wgpu::VertexAttribute],
    stride: usize,
) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: stride as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];
const DECORATION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x2];

/// Pipeline and buffers backing [`QuadBatcher`](crate::renderer::QuadBatcher) flushes
pub struct QuadPipeline {
    pipeline: wgpu::RenderPipeline,
    position_buffer: wgpu::Buffer,
    color_buffer: wgpu::Buffer,
    decoration_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    capacity: usize,
}

impl QuadPipeline {
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let capacity = capacity.max(1);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/quad.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[
                    vertex_layout(&POSITION_ATTRIBUTES, std::mem::size_of::<[f32; 2]>()),
                    vertex_layout(&COLOR_ATTRIBUTES, std::mem::size_of::<[f32; 4]>()),
                    vertex_layout(&DECORATION_ATTRIBUTES, std::mem::size_of::<[f32; 2]>()),
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let vertex_buffer = |label: &str, bytes_per_vertex: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (capacity * 4 * bytes_per_vertex) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let position_buffer = vertex_buffer("Quad Position Buffer", 8);
        let color_buffer = vertex_buffer("Quad Color Buffer", 16);
        let decoration_buffer = vertex_buffer("Quad Decoration Buffer", 8);

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(&quad_indices(capacity)),
            usage: wgpu::BufferUsages::INDEX,
        });

        QuadPipeline {
            pipeline,
            position_buffer,
            color_buffer,
            decoration_buffer,
            index_buffer,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A sink drawing into `target`
    pub fn sink<'a>(
        &'a self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        target: &'a wgpu::TextureView,
    ) -> GpuQuadSink<'a> {
        GpuQuadSink {
            quads: self,
            device,
            queue,
            target,
        }
    }
}

/// Uploads each batch and draws it on top of whatever `target` already holds.
///
/// Every flush is its own submission: `write_buffer` lands before the next
/// submit, so reusing the same buffers across flushes keeps draws ordered.
pub struct GpuQuadSink<'a> {
    quads: &'a QuadPipeline,
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    target: &'a wgpu::TextureView,
}

impl QuadSink for GpuQuadSink<'_> {
    fn draw(&mut self, batch: &QuadBatch<'_>) {
        if batch.quad_count > self.quads.capacity {
            log::warn!(
                "Splitting batch of {} quads to fit GPU capacity {}",
                batch.quad_count,
                self.quads.capacity
            );
            for chunk in batch.chunks(self.quads.capacity) {
                self.draw(&chunk);
            }
            return;
        }

        self.queue
            .write_buffer(&self.quads.position_buffer, 0, bytemuck::cast_slice(batch.positions));
        self.queue
            .write_buffer(&self.quads.color_buffer, 0, bytemuck::cast_slice(batch.colors));
        self.queue.write_buffer(
            &self.quads.decoration_buffer,
            0,
            bytemuck::cast_slice(batch.decorations),
        );

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Quad Batch Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Quad Batch Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let positions = (batch.vertex_count() * 8) as wgpu::BufferAddress;
            let colors = (batch.vertex_count() * 16) as wgpu::BufferAddress;
            render_pass.set_pipeline(&self.quads.pipeline);
            render_pass.set_vertex_buffer(0, self.quads.position_buffer.slice(..positions));
            render_pass.set_vertex_buffer(1, self.quads.color_buffer.slice(..colors));
            render_pass.set_vertex_buffer(2, self.quads.decoration_buffer.slice(..positions));
            render_pass.set_index_buffer(self.quads.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..batch.index_count(), 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}
