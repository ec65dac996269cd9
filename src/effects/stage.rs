//! GPU execution of effects: one fullscreen pipeline per effect kind.
//!
//! Every effect is a pure function of its input image and parameters, applied
//! by sampling the input target and writing a freshly acquired output target.
//! Multi-pass effects (blur, bloom, dropshadow) stage their intermediates
//! through the pool. The one stateful effect, `trails`, owns an accumulation
//! target pair per wrapper node, keyed by the node's identity and kept across
//! frames.
//!
//! Pipelines are compiled lazily per `(shader, output format)` pair and cached
//! for the renderer's lifetime. Uniforms are uploaded through a small
//! per-invocation buffer: a single shared buffer would be overwritten by later
//! passes before the frame's encoder is submitted.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::chain::node::NodeId;
use crate::chain::target_pool::{
    HDR_FORMAT, PooledTarget, RenderError, TargetPool, TargetSpec, TargetTexture,
};
use crate::chain::RenderContext;
use crate::effects::{blur_taps, trails_decay, EffectConfig};
use crate::gpu::GpuContext;

/// Bind group layouts and the shared sampler for fullscreen passes.
///
/// Three layouts cover every pass in the crate:
/// - `single`: uniforms + one input texture + sampler
/// - `dual`: uniforms + two input textures + sampler
/// - `blit`: one input texture + sampler, no uniforms
pub(crate) struct PassResources {
    pub single: wgpu::BindGroupLayout,
    pub dual: wgpu::BindGroupLayout,
    pub blit: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
}

impl PassResources {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let single = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Effect Single-Input Layout"),
            entries: &[uniform_entry(0), texture_entry(1), sampler_entry(2)],
        });
        let dual = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Effect Dual-Input Layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1),
                texture_entry(2),
                sampler_entry(3),
            ],
        });
        let blit = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Layout"),
            entries: &[texture_entry(1), sampler_entry(2)],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Effect Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            single,
            dual,
            blit,
            sampler,
        }
    }
}

/// Build a fullscreen-triangle pipeline for the given shader source.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs"),
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
}

/// Record a render pass that only clears `view` to `color`.
pub(crate) fn clear_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, color: wgpu::Color) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

// Per-effect uniform blocks. Field order mirrors the WGSL structs; trailing
// pads keep each block a multiple of 16 bytes.

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniforms {
    direction: [f32; 2],
    resolution: [f32; 2],
    sigma: f32,
    taps: i32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BrightUniforms {
    gamma: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CombineUniforms {
    intensity: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PunchUniforms {
    factor: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PixellateUniforms {
    resolution: [f32; 2],
    pxsize: f32,
    kernel: f32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DropshadowUniforms {
    resolution: [f32; 2],
    offset: [f32; 2],
    opacity: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct AmountUniforms {
    amount: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PosterizeUniforms {
    levels: f32,
    inv_gamma: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct TrailsUniforms {
    decay: f32,
    alpha: f32,
    _pad: [f32; 2],
}

/// Which shader a cached pipeline was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EffectShader {
    Blur,
    BloomBright,
    BloomCombine,
    Punch,
    Pixellate,
    Dropshadow,
    Greyscale,
    Sepia,
    Posterize,
    Trails,
    Blit,
}

impl EffectShader {
    fn source(self) -> &'static str {
        match self {
            EffectShader::Blur => include_str!("../shaders/blur.wgsl"),
            EffectShader::BloomBright => include_str!("../shaders/bloom_bright.wgsl"),
            EffectShader::BloomCombine => include_str!("../shaders/bloom_combine.wgsl"),
            EffectShader::Punch => include_str!("../shaders/punch.wgsl"),
            EffectShader::Pixellate => include_str!("../shaders/pixellate.wgsl"),
            EffectShader::Dropshadow => include_str!("../shaders/dropshadow.wgsl"),
            EffectShader::Greyscale => include_str!("../shaders/greyscale.wgsl"),
            EffectShader::Sepia => include_str!("../shaders/sepia.wgsl"),
            EffectShader::Posterize => include_str!("../shaders/posterize.wgsl"),
            EffectShader::Trails => include_str!("../shaders/trails.wgsl"),
            EffectShader::Blit => include_str!("../shaders/blit.wgsl"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            EffectShader::Blur => "Effect Blur",
            EffectShader::BloomBright => "Effect Bloom Bright",
            EffectShader::BloomCombine => "Effect Bloom Combine",
            EffectShader::Punch => "Effect Punch",
            EffectShader::Pixellate => "Effect Pixellate",
            EffectShader::Dropshadow => "Effect Dropshadow",
            EffectShader::Greyscale => "Effect Greyscale",
            EffectShader::Sepia => "Effect Sepia",
            EffectShader::Posterize => "Effect Posterize",
            EffectShader::Trails => "Effect Trails",
            EffectShader::Blit => "Effect Blit",
        }
    }

    fn dual_input(self) -> bool {
        matches!(
            self,
            EffectShader::BloomCombine | EffectShader::Dropshadow | EffectShader::Trails
        )
    }
}

/// Persistent accumulation state for one `trails` node.
struct TrailsAccum {
    spec: TargetSpec,
    front: TargetTexture,
    back: TargetTexture,
}

/// The GPU effect executor shared by all effect-wrapper nodes.
pub(crate) struct EffectStage {
    pub(crate) resources: PassResources,
    pipelines: HashMap<(EffectShader, wgpu::TextureFormat), wgpu::RenderPipeline>,
    trails: HashMap<NodeId, TrailsAccum>,
}

impl EffectStage {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        Self {
            resources: PassResources::new(device),
            pipelines: HashMap::new(),
            trails: HashMap::new(),
        }
    }

    /// Apply `config` to `input`, consuming it and returning the result.
    ///
    /// The input target is released (via guard drop) as soon as the last pass
    /// reading it has been encoded.
    pub(crate) fn apply(
        &mut self,
        ctx: &mut RenderContext,
        pool: &TargetPool,
        config: &EffectConfig,
        node: NodeId,
        input: PooledTarget,
    ) -> Result<PooledTarget, RenderError> {
        let spec = input.spec();
        match *config {
            EffectConfig::Greyscale { amount } => {
                let uniforms = AmountUniforms {
                    amount,
                    _pad: [0.0; 3],
                };
                self.single_pass(ctx, pool, EffectShader::Greyscale, spec, &uniforms, input)
            }
            EffectConfig::Sepia { amount } => {
                let uniforms = AmountUniforms {
                    amount,
                    _pad: [0.0; 3],
                };
                self.single_pass(ctx, pool, EffectShader::Sepia, spec, &uniforms, input)
            }
            EffectConfig::Posterize { levels, gamma } => {
                let uniforms = PosterizeUniforms {
                    levels: levels as f32,
                    inv_gamma: 1.0 / gamma,
                    _pad: [0.0; 2],
                };
                self.single_pass(ctx, pool, EffectShader::Posterize, spec, &uniforms, input)
            }
            EffectConfig::Punch { factor } => {
                let uniforms = PunchUniforms {
                    factor,
                    _pad: [0.0; 3],
                };
                self.single_pass(ctx, pool, EffectShader::Punch, spec, &uniforms, input)
            }
            EffectConfig::Pixellate { pxsize, antialias } => {
                let uniforms = PixellateUniforms {
                    resolution: [spec.width as f32, spec.height as f32],
                    pxsize: pxsize as f32,
                    kernel: (antialias * pxsize as f32).max(1.0),
                };
                self.single_pass(ctx, pool, EffectShader::Pixellate, spec, &uniforms, input)
            }
            EffectConfig::Blur { radius } => self.separable_blur(ctx, pool, radius, input),
            EffectConfig::Bloom {
                radius,
                gamma,
                intensity,
            } => self.bloom(ctx, pool, radius, gamma, intensity, input),
            EffectConfig::Dropshadow {
                radius,
                opacity,
                offset,
            } => self.dropshadow(ctx, pool, radius, opacity, offset, input),
            EffectConfig::Trails { fade, alpha } => self.trails(ctx, pool, fade, alpha, node, input),
        }
    }

    /// Drop trails state for nodes no longer present in the chain.
    pub(crate) fn prune_state(&mut self, live: &[NodeId]) {
        self.trails.retain(|id, _| live.contains(id));
    }

    fn pipeline(
        &mut self,
        gpu: &GpuContext,
        shader: EffectShader,
        format: wgpu::TextureFormat,
    ) -> &wgpu::RenderPipeline {
        let layout = if shader == EffectShader::Blit {
            &self.resources.blit
        } else if shader.dual_input() {
            &self.resources.dual
        } else {
            &self.resources.single
        };
        self.pipelines.entry((shader, format)).or_insert_with(|| {
            fullscreen_pipeline(
                &gpu.device,
                shader.label(),
                shader.source(),
                layout,
                format,
                wgpu::BlendState::REPLACE,
            )
        })
    }

    fn uniform_buffer<U: bytemuck::Pod>(gpu: &GpuContext, uniforms: &U) -> wgpu::Buffer {
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Effect Uniforms"),
                contents: bytemuck::cast_slice(std::slice::from_ref(uniforms)),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Encode one single-input fullscreen pass into `out_view`.
    fn encode_single<U: bytemuck::Pod>(
        &mut self,
        ctx: &mut RenderContext,
        shader: EffectShader,
        format: wgpu::TextureFormat,
        uniforms: &U,
        input_view: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let buffer = Self::uniform_buffer(ctx.gpu, uniforms);
        let layout = self.resources.single.clone();
        let sampler = self.resources.sampler.clone();
        let pipeline = self.pipeline(ctx.gpu, shader, format).clone();

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(shader.label()),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        run_fullscreen(ctx.encoder, &pipeline, &bind_group, out_view);
    }

    /// Encode one dual-input fullscreen pass into `out_view`.
    fn encode_dual<U: bytemuck::Pod>(
        &mut self,
        ctx: &mut RenderContext,
        shader: EffectShader,
        format: wgpu::TextureFormat,
        uniforms: &U,
        view_a: &wgpu::TextureView,
        view_b: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let buffer = Self::uniform_buffer(ctx.gpu, uniforms);
        let layout = self.resources.dual.clone();
        let sampler = self.resources.sampler.clone();
        let pipeline = self.pipeline(ctx.gpu, shader, format).clone();

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(shader.label()),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view_a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view_b),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        run_fullscreen(ctx.encoder, &pipeline, &bind_group, out_view);
    }

    /// Encode a plain copy (no uniforms) into `out_view`.
    fn encode_blit(
        &mut self,
        ctx: &mut RenderContext,
        format: wgpu::TextureFormat,
        input_view: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let layout = self.resources.blit.clone();
        let sampler = self.resources.sampler.clone();
        let pipeline = self.pipeline(ctx.gpu, EffectShader::Blit, format).clone();

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        run_fullscreen(ctx.encoder, &pipeline, &bind_group, out_view);
    }

    /// Single-input, single-pass effect: acquire the output, run, release the
    /// input.
    fn single_pass<U: bytemuck::Pod>(
        &mut self,
        ctx: &mut RenderContext,
        pool: &TargetPool,
        shader: EffectShader,
        spec: TargetSpec,
        uniforms: &U,
        input: PooledTarget,
    ) -> Result<PooledTarget, RenderError> {
        let out = pool.acquire(ctx.gpu, spec)?;
        self.encode_single(ctx, shader, spec.format, uniforms, input.view(), out.view());
        drop(input);
        Ok(out)
    }

    fn blur_uniforms(spec: TargetSpec, radius: f32, horizontal: bool) -> BlurUniforms {
        BlurUniforms {
            direction: if horizontal { [1.0, 0.0] } else { [0.0, 1.0] },
            resolution: [spec.width as f32, spec.height as f32],
            sigma: radius,
            taps: blur_taps(radius),
            _pad: [0.0; 2],
        }
    }

    /// Two-pass separable Gaussian blur in the input's own format.
    fn separable_blur(
        &mut self,
        ctx: &mut RenderContext,
        pool: &TargetPool,
        radius: f32,
        input: PooledTarget,
    ) -> Result<PooledTarget, RenderError> {
        let spec = input.spec();
        let mid = pool.acquire(ctx.gpu, spec)?;
        self.encode_single(
            ctx,
            EffectShader::Blur,
            spec.format,
            &Self::blur_uniforms(spec, radius, true),
            input.view(),
            mid.view(),
        );
        drop(input);

        let out = pool.acquire(ctx.gpu, spec)?;
        self.encode_single(
            ctx,
            EffectShader::Blur,
            spec.format,
            &Self::blur_uniforms(spec, radius, false),
            mid.view(),
            out.view(),
        );
        Ok(out)
    }

    /// Bloom: bright-pass into an HDR target, blur it, recombine with the
    /// original.
    fn bloom(
        &mut self,
        ctx: &mut RenderContext,
        pool: &TargetPool,
        radius: f32,
        gamma: f32,
        intensity: f32,
        input: PooledTarget,
    ) -> Result<PooledTarget, RenderError> {
        let spec = input.spec();
        let hdr = spec.with_format(HDR_FORMAT);

        let bright = pool.acquire(ctx.gpu, hdr)?;
        self.encode_single(
            ctx,
            EffectShader::BloomBright,
            hdr.format,
            &BrightUniforms {
                gamma,
                _pad: [0.0; 3],
            },
            input.view(),
            bright.view(),
        );

        let blur_h = pool.acquire(ctx.gpu, hdr)?;
        self.encode_single(
            ctx,
            EffectShader::Blur,
            hdr.format,
            &Self::blur_uniforms(hdr, radius, true),
            bright.view(),
            blur_h.view(),
        );
        drop(bright);

        let blur_v = pool.acquire(ctx.gpu, hdr)?;
        self.encode_single(
            ctx,
            EffectShader::Blur,
            hdr.format,
            &Self::blur_uniforms(hdr, radius, false),
            blur_h.view(),
            blur_v.view(),
        );
        drop(blur_h);

        let out = pool.acquire(ctx.gpu, spec)?;
        self.encode_dual(
            ctx,
            EffectShader::BloomCombine,
            spec.format,
            &CombineUniforms {
                intensity,
                _pad: [0.0; 3],
            },
            input.view(),
            blur_v.view(),
            out.view(),
        );
        drop(blur_v);
        drop(input);
        Ok(out)
    }

    /// Drop shadow: blur a copy, then composite the original over the offset,
    /// darkened copy.
    fn dropshadow(
        &mut self,
        ctx: &mut RenderContext,
        pool: &TargetPool,
        radius: f32,
        opacity: f32,
        offset: glam::Vec2,
        input: PooledTarget,
    ) -> Result<PooledTarget, RenderError> {
        let spec = input.spec();

        let blur_h = pool.acquire(ctx.gpu, spec)?;
        self.encode_single(
            ctx,
            EffectShader::Blur,
            spec.format,
            &Self::blur_uniforms(spec, radius, true),
            input.view(),
            blur_h.view(),
        );

        let blurred = pool.acquire(ctx.gpu, spec)?;
        self.encode_single(
            ctx,
            EffectShader::Blur,
            spec.format,
            &Self::blur_uniforms(spec, radius, false),
            blur_h.view(),
            blurred.view(),
        );
        drop(blur_h);

        let out = pool.acquire(ctx.gpu, spec)?;
        self.encode_dual(
            ctx,
            EffectShader::Dropshadow,
            spec.format,
            &DropshadowUniforms {
                resolution: [spec.width as f32, spec.height as f32],
                offset: [offset.x, offset.y],
                opacity,
                _pad: [0.0; 3],
            },
            input.view(),
            blurred.view(),
            out.view(),
        );
        drop(blurred);
        drop(input);
        Ok(out)
    }

    /// Trails: blend the frame into a persistent, exponentially decaying
    /// accumulation pair owned by this node, then copy the new accumulation
    /// out.
    fn trails(
        &mut self,
        ctx: &mut RenderContext,
        pool: &TargetPool,
        fade: f32,
        alpha: f32,
        node: NodeId,
        input: PooledTarget,
    ) -> Result<PooledTarget, RenderError> {
        let spec = input.spec();
        self.ensure_trails_accum(ctx, node, spec)?;

        let uniforms = TrailsUniforms {
            decay: trails_decay(fade, ctx.dt),
            alpha,
            _pad: [0.0; 2],
        };

        // front holds last frame's accumulation; write the new one into back.
        let accum = self.trails.get(&node).expect("trails state just ensured");
        let front_view = accum.front.view.clone();
        let back_view = accum.back.view.clone();

        self.encode_dual(
            ctx,
            EffectShader::Trails,
            spec.format,
            &uniforms,
            input.view(),
            &front_view,
            &back_view,
        );
        drop(input);

        let accum = self.trails.get_mut(&node).expect("trails state just ensured");
        std::mem::swap(&mut accum.front, &mut accum.back);

        // The accumulation pair never leaves this stage; the node's output is
        // a pooled copy like any other.
        let out = pool.acquire(ctx.gpu, spec)?;
        let new_front = self.trails.get(&node).expect("trails state just ensured");
        let new_front_view = new_front.front.view.clone();
        self.encode_blit(ctx, spec.format, &new_front_view, out.view());
        Ok(out)
    }

    fn ensure_trails_accum(
        &mut self,
        ctx: &mut RenderContext,
        node: NodeId,
        spec: TargetSpec,
    ) -> Result<(), RenderError> {
        let stale = self
            .trails
            .get(&node)
            .is_none_or(|accum| accum.spec != spec);
        if !stale {
            return Ok(());
        }

        let mut make_target = || -> Result<TargetTexture, RenderError> {
            let texture = ctx.gpu.try_create_texture(&wgpu::TextureDescriptor {
                label: Some("Trails Accumulation"),
                size: wgpu::Extent3d {
                    width: spec.width,
                    height: spec.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: spec.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })?;
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Ok(TargetTexture { texture, view })
        };

        let front = make_target()?;
        let back = make_target()?;
        // Fresh texture contents are undefined; start from fully transparent.
        clear_pass(ctx.encoder, &front.view, wgpu::Color::TRANSPARENT);
        clear_pass(ctx.encoder, &back.view, wgpu::Color::TRANSPARENT);

        self.trails.insert(node, TrailsAccum { spec, front, back });
        Ok(())
    }
}

fn run_fullscreen(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    out_view: &wgpu::TextureView,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Effect Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: out_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}
