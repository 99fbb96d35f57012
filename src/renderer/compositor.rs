// src/renderer/compositor.rs

use crate::renderer::pipeline::TARGET_FORMAT;

/// One off-screen color target
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        RenderTarget { texture, view }
    }
}

/// Glow settings for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowSettings {
    pub enabled: bool,
    pub radius: f32,
    pub strength: f32,
}

/// Uniforms of one blur direction
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurParams {
    pub texture_size: f32,
    pub radius: f32,
    pub sigma: f32,
    pub strength: f32,
    pub direction: [f32; 2],
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeParams {
    background: [f32; 4],
}

const BLUR_SIGMA: f32 = 1.0;

/// Horizontal then vertical pass; only the vertical one applies the strength
pub fn blur_params(glow: &GlowSettings, width: u32, height: u32) -> [BlurParams; 2] {
    let pass = |size: u32, direction: [f32; 2], strength: f32| BlurParams {
        texture_size: size as f32,
        radius: glow.radius.max(0.0),
        sigma: BLUR_SIGMA,
        strength,
        direction,
        _pad: [0.0; 2],
    };
    [
        pass(width, [1.0, 0.0], 1.0),
        pass(height, [0.0, 1.0], glow.strength),
    ]
}

/// One fullscreen pass of the post chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// base -> blur_a
    BlurHorizontal,
    /// blur_a -> blur_b
    BlurVertical,
    /// base over background plus blur_b -> final
    Composite,
    /// base over background -> final
    Copy,
}

impl Pass {
    pub fn label(self) -> &'static str {
        match self {
            Pass::BlurHorizontal => "Blur Horizontal Pass",
            Pass::BlurVertical => "Blur Vertical Pass",
            Pass::Composite => "Composite Pass",
            Pass::Copy => "Composite Copy Pass",
        }
    }

    pub fn is_blur(self) -> bool {
        matches!(self, Pass::BlurHorizontal | Pass::BlurVertical)
    }
}

const GLOW_PASSES: [Pass; 3] = [Pass::BlurHorizontal, Pass::BlurVertical, Pass::Composite];
const PLAIN_PASSES: [Pass; 1] = [Pass::Copy];

/// Passes run by [`PostCompositor::composite`], in order
pub fn pass_plan(glow: &GlowSettings) -> &'static [Pass] {
    if glow.enabled {
        &GLOW_PASSES
    } else {
        &PLAIN_PASSES
    }
}

fn uniform_buffer(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    fragment: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: fragment,
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

fn run_fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

/// Size-independent resources every target set binds against
struct Bindings {
    sampler: wgpu::Sampler,
    blur_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
    blur_h_params: wgpu::Buffer,
    blur_v_params: wgpu::Buffer,
    composite_params: wgpu::Buffer,
}

impl Bindings {
    fn blur_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        source: &RenderTarget,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.blur_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }

    fn composite_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        base: &RenderTarget,
        glow: &RenderTarget,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&base.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&glow.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.composite_params.as_entire_binding(),
                },
            ],
        })
    }
}

/// Size-dependent half of the compositor: the four targets and the bind groups reading them
struct Targets {
    base: RenderTarget,
    blur_a: RenderTarget,
    blur_b: RenderTarget,
    final_frame: RenderTarget,
    blur_horizontal: wgpu::BindGroup,
    blur_vertical: wgpu::BindGroup,
    composite: wgpu::BindGroup,
    present: wgpu::BindGroup,
}

impl Targets {
    fn new(device: &wgpu::Device, bindings: &Bindings, width: u32, height: u32) -> Self {
        let base = RenderTarget::new(device, "Base Target", width, height);
        let blur_a = RenderTarget::new(device, "Blur Target A", width, height);
        let blur_b = RenderTarget::new(device, "Blur Target B", width, height);
        let final_frame = RenderTarget::new(device, "Final Target", width, height);

        let blur_horizontal =
            bindings.blur_group(device, "Blur Horizontal", &base, &bindings.blur_h_params);
        let blur_vertical =
            bindings.blur_group(device, "Blur Vertical", &blur_a, &bindings.blur_v_params);
        let composite = bindings.composite_group(device, "Composite", &base, &blur_b);
        let present = bindings.composite_group(device, "Present", &final_frame, &final_frame);

        Targets {
            base,
            blur_a,
            blur_b,
            final_frame,
            blur_horizontal,
            blur_vertical,
            composite,
            present,
        }
    }

    fn destroy(&self) {
        self.base.texture.destroy();
        self.blur_a.texture.destroy();
        self.blur_b.texture.destroy();
        self.final_frame.texture.destroy();
    }
}

/// Base pass target plus the glow chain that turns it into the final frame
pub struct PostCompositor {
    targets: Targets,
    bindings: Bindings,
    width: u32,
    height: u32,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    copy_pipeline: wgpu::RenderPipeline,
    present_pipeline: wgpu::RenderPipeline,
}

impl PostCompositor {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let (width, height) = (width.max(1), height.max(1));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Compositor Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blur Bind Group Layout"),
            entries: &[texture_entry(0), sampler_entry(1), uniform_entry(2)],
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                sampler_entry(2),
                uniform_entry(3),
            ],
        });

        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blur Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/blur.wgsl").into()),
        });
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../assets/shaders/composite.wgsl").into(),
            ),
        });

        let blur_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blur Pipeline Layout"),
            bind_group_layouts: &[&blur_layout],
            push_constant_ranges: &[],
        });
        let composite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Composite Pipeline Layout"),
                bind_group_layouts: &[&composite_layout],
                push_constant_ranges: &[],
            });

        let blur_pipeline = fullscreen_pipeline(
            device,
            "Blur Pipeline",
            &blur_pipeline_layout,
            &blur_shader,
            "fs_main",
            TARGET_FORMAT,
        );
        let composite_pipeline = fullscreen_pipeline(
            device,
            "Composite Pipeline",
            &composite_pipeline_layout,
            &composite_shader,
            "fs_composite",
            TARGET_FORMAT,
        );
        let copy_pipeline = fullscreen_pipeline(
            device,
            "Composite Copy Pipeline",
            &composite_pipeline_layout,
            &composite_shader,
            "fs_copy",
            TARGET_FORMAT,
        );
        let present_pipeline = fullscreen_pipeline(
            device,
            "Present Pipeline",
            &composite_pipeline_layout,
            &composite_shader,
            "fs_present",
            surface_format,
        );

        let blur_size = std::mem::size_of::<BlurParams>();
        let bindings = Bindings {
            sampler,
            blur_layout,
            composite_layout,
            blur_h_params: uniform_buffer(device, "Blur Horizontal Params", blur_size),
            blur_v_params: uniform_buffer(device, "Blur Vertical Params", blur_size),
            composite_params: uniform_buffer(
                device,
                "Composite Params",
                std::mem::size_of::<CompositeParams>(),
            ),
        };

        PostCompositor {
            targets: Targets::new(device, &bindings, width, height),
            bindings,
            width,
            height,
            blur_pipeline,
            composite_pipeline,
            copy_pipeline,
            present_pipeline,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Where the scene renderers draw
    pub fn base_view(&self) -> &wgpu::TextureView {
        &self.targets.base.view
    }

    /// The composited frame, for readback
    pub fn final_texture(&self) -> &wgpu::Texture {
        &self.targets.final_frame.texture
    }

    /// Clear the base target to transparent
    pub fn begin_frame(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Base Clear Encoder"),
        });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Base Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.targets.base.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Turn the base target into the final frame over `background`
    pub fn composite(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        glow: &GlowSettings,
        background: [f32; 4],
    ) {
        queue.write_buffer(
            &self.bindings.composite_params,
            0,
            bytemuck::bytes_of(&CompositeParams { background }),
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Composite Encoder"),
        });
        let plan = pass_plan(glow);
        if plan.iter().any(|pass| pass.is_blur()) {
            let [horizontal, vertical] = blur_params(glow, self.width, self.height);
            queue.write_buffer(&self.bindings.blur_h_params, 0, bytemuck::bytes_of(&horizontal));
            queue.write_buffer(&self.bindings.blur_v_params, 0, bytemuck::bytes_of(&vertical));
        }
        for &pass in plan {
            let (target, pipeline, bind_group) = self.pass_resources(pass);
            run_fullscreen_pass(&mut encoder, pass.label(), target, pipeline, bind_group);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    fn pass_resources(
        &self,
        pass: Pass,
    ) -> (&wgpu::TextureView, &wgpu::RenderPipeline, &wgpu::BindGroup) {
        let targets = &self.targets;
        match pass {
            Pass::BlurHorizontal => (&targets.blur_a.view, &self.blur_pipeline, &targets.blur_horizontal),
            Pass::BlurVertical => (&targets.blur_b.view, &self.blur_pipeline, &targets.blur_vertical),
            Pass::Composite => (
                &targets.final_frame.view,
                &self.composite_pipeline,
                &targets.composite,
            ),
            Pass::Copy => (&targets.final_frame.view, &self.copy_pipeline, &targets.composite),
        }
    }

    /// Draw the final frame onto a surface texture
    pub fn present(&self, device: &wgpu::Device, queue: &wgpu::Queue, view: &wgpu::TextureView) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });
        run_fullscreen_pass(
            &mut encoder,
            "Present Pass",
            view,
            &self.present_pipeline,
            &self.targets.present,
        );
        queue.submit(std::iter::once(encoder.finish()));
    }

    /// Replace all four targets; the old ones are destroyed first
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.targets.destroy();
        self.targets = Targets::new(device, &self.bindings, width, height);
        self.width = width;
        self.height = height;
        log::debug!("Compositor targets resized to {}x{}", width, height);
    }
}
