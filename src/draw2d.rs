//! Batched 2D pipelines used to rasterize layer primitives into chain targets.
//!
//! The chain evaluator hands each layer node an off-screen target; the scene
//! turns its primitives into [`Vertex2d`] batches and this module draws them.
//! Two fragment paths (colored and textured) times two blend modes (normal
//! alpha-over and additive, the latter used by light-source layers) gives four
//! pipelines, all sharing one shader module and vertex layout.

use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::scene::BlendMode;
use crate::texture::Texture;

/// Vertex for 2D sprite/shape rendering.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex2d {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex2d {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex2d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
            // color
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    };
}

/// Uniforms for 2D rendering.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Draw2dUniforms {
    resolution: [f32; 2],
    _padding: [f32; 2],
}

/// Straight-alpha over blending, the default layer blend mode.
pub(crate) const BLEND_ALPHA_OVER: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Additive blending for light-source layers.
pub(crate) const BLEND_ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// 2D drawing backend for layer rasterization.
///
/// One instance is owned by the chain renderer; every layer node that needs
/// pixels goes through it. Vertex data is uploaded per batch (layer draws can
/// happen several times per frame into different targets, so a single reused
/// buffer would be clobbered before submission).
pub struct Draw2d {
    colored_normal: wgpu::RenderPipeline,
    colored_additive: wgpu::RenderPipeline,
    textured_normal: wgpu::RenderPipeline,
    textured_additive: wgpu::RenderPipeline,
    uniform_bind_group_layout: wgpu::BindGroupLayout,
    texture_bind_group_layout: wgpu::BindGroupLayout,
}

impl Draw2d {
    /// Create the 2D pipelines targeting the given texture format.
    ///
    /// The chain draws layers into pooled off-screen targets, so `format` is
    /// the pool's target format rather than the surface format.
    pub fn new(gpu: &GpuContext, format: wgpu::TextureFormat) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Draw2d Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/draw2d.wgsl").into()),
        });

        // Uniform bind group layout (group 0)
        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw2d Uniform Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        // Texture bind group layout (group 1)
        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw2d Texture Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let colored_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Draw2d Colored Pipeline Layout"),
                bind_group_layouts: &[&uniform_bind_group_layout],
                push_constant_ranges: &[],
            });

        let textured_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Draw2d Textured Pipeline Layout"),
                bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
                push_constant_ranges: &[],
            });

        let make_pipeline = |label: &str,
                             layout: &wgpu::PipelineLayout,
                             entry: &str,
                             blend: wgpu::BlendState| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[Vertex2d::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let colored_normal = make_pipeline(
            "Draw2d Colored Pipeline",
            &colored_pipeline_layout,
            "fs_colored",
            BLEND_ALPHA_OVER,
        );
        let colored_additive = make_pipeline(
            "Draw2d Colored Additive Pipeline",
            &colored_pipeline_layout,
            "fs_colored",
            BLEND_ADDITIVE,
        );
        let textured_normal = make_pipeline(
            "Draw2d Textured Pipeline",
            &textured_pipeline_layout,
            "fs_textured",
            BLEND_ALPHA_OVER,
        );
        let textured_additive = make_pipeline(
            "Draw2d Textured Additive Pipeline",
            &textured_pipeline_layout,
            "fs_textured",
            BLEND_ADDITIVE,
        );

        Self {
            colored_normal,
            colored_additive,
            textured_normal,
            textured_additive,
            uniform_bind_group_layout,
            texture_bind_group_layout,
        }
    }

    /// Create the per-target uniform bind group (target resolution in pixels).
    pub(crate) fn uniform_bind_group(&self, gpu: &GpuContext, resolution: [f32; 2]) -> wgpu::BindGroup {
        let uniforms = Draw2dUniforms {
            resolution,
            _padding: [0.0, 0.0],
        };
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw2d Uniforms"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw2d Uniform Bind Group"),
            layout: &self.uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Create a bind group for a sprite texture.
    pub(crate) fn texture_bind_group(&self, gpu: &GpuContext, texture: &Texture) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw2d Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        })
    }

    /// Draw one batch of vertices into an open render pass.
    ///
    /// With `texture_bind_group == None` the colored path is used; otherwise
    /// the textured path samples the bound sprite texture.
    pub(crate) fn draw_batch(
        &self,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass,
        uniform_bind_group: &wgpu::BindGroup,
        blend: BlendMode,
        vertices: &[Vertex2d],
        texture_bind_group: Option<&wgpu::BindGroup>,
    ) {
        if vertices.is_empty() {
            return;
        }

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw2d Vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let pipeline = match (texture_bind_group.is_some(), blend) {
            (false, BlendMode::Normal) => &self.colored_normal,
            (false, BlendMode::Additive) => &self.colored_additive,
            (true, BlendMode::Normal) => &self.textured_normal,
            (true, BlendMode::Additive) => &self.textured_additive,
        };

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, uniform_bind_group, &[]);
        if let Some(bind_group) = texture_bind_group {
            pass.set_bind_group(1, bind_group, &[]);
        }
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..vertices.len() as u32, 0..1);
    }
}
