//! Fixed-function composite passes: mask, displacement, light, and the
//! alpha-over blit that stacks node results onto the frame.
//!
//! These are the passes the evaluator runs itself, as opposed to the named
//! effects, which live in the effect stage.
//! Mask/displacement/light consume two node outputs and write a fresh target
//! with no blending; the blit composites one node output over whatever is
//! already in the destination, in straight alpha.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::chain::node::{ColorChannel, MaskFunction};
use crate::chain::target_pool::TARGET_FORMAT;
use crate::color::Color;
use crate::draw2d::BLEND_ALPHA_OVER;
use crate::effects::stage::{fullscreen_pipeline, PassResources};
use crate::gpu::GpuContext;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct MaskUniforms {
    mode: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DisplaceUniforms {
    resolution: [f32; 2],
    scale: f32,
    x_channel: u32,
    y_channel: u32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct LightUniforms {
    ambient: [f32; 4],
}

fn channel_index(channel: ColorChannel) -> u32 {
    match channel {
        ColorChannel::R => 0,
        ColorChannel::G => 1,
        ColorChannel::B => 2,
    }
}

/// The evaluator's own render passes.
pub(crate) struct Compositor {
    dual_layout: wgpu::BindGroupLayout,
    blit_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    mask: wgpu::RenderPipeline,
    displace: wgpu::RenderPipeline,
    light: wgpu::RenderPipeline,
    /// Alpha-over blit per destination format: chain targets share one
    /// format, but the final composite lands on the surface (or whatever the
    /// host handed us).
    blit_over: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl Compositor {
    pub(crate) fn new(device: &wgpu::Device, resources: &PassResources) -> Self {
        let mask = fullscreen_pipeline(
            device,
            "Mask Composite",
            include_str!("../shaders/mask.wgsl"),
            &resources.dual,
            TARGET_FORMAT,
            wgpu::BlendState::REPLACE,
        );
        let displace = fullscreen_pipeline(
            device,
            "Displacement Composite",
            include_str!("../shaders/displace.wgsl"),
            &resources.dual,
            TARGET_FORMAT,
            wgpu::BlendState::REPLACE,
        );
        let light = fullscreen_pipeline(
            device,
            "Light Composite",
            include_str!("../shaders/light.wgsl"),
            &resources.dual,
            TARGET_FORMAT,
            wgpu::BlendState::REPLACE,
        );

        Self {
            dual_layout: resources.dual.clone(),
            blit_layout: resources.blit.clone(),
            sampler: resources.sampler.clone(),
            mask,
            displace,
            light,
            blit_over: HashMap::new(),
        }
    }

    /// Scale paint alpha by mask coverage per [`MaskFunction`].
    pub(crate) fn mask(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        function: MaskFunction,
        paint_view: &wgpu::TextureView,
        mask_view: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let uniforms = MaskUniforms {
            mode: match function {
                MaskFunction::Inside => 0,
                MaskFunction::Outside => 1,
                MaskFunction::Luminance => 2,
            },
            _pad: [0; 3],
        };
        self.dual_pass(gpu, encoder, &self.mask, &uniforms, paint_view, mask_view, out_view);
    }

    /// Sample paint through displacement offsets.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn displacement(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scale: f32,
        x_channel: ColorChannel,
        y_channel: ColorChannel,
        resolution: [f32; 2],
        paint_view: &wgpu::TextureView,
        displacement_view: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let uniforms = DisplaceUniforms {
            resolution,
            scale,
            x_channel: channel_index(x_channel),
            y_channel: channel_index(y_channel),
            _pad: [0.0; 3],
        };
        self.dual_pass(
            gpu,
            encoder,
            &self.displace,
            &uniforms,
            paint_view,
            displacement_view,
            out_view,
        );
    }

    /// Modulate diffuse by ambient floor plus additive light.
    pub(crate) fn light(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        ambient: Color,
        diffuse_view: &wgpu::TextureView,
        light_view: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let uniforms = LightUniforms {
            ambient: ambient.to_array(),
        };
        self.dual_pass(
            gpu,
            encoder,
            &self.light,
            &uniforms,
            diffuse_view,
            light_view,
            out_view,
        );
    }

    /// Composite `input` over the existing contents of `out_view`.
    pub(crate) fn blit_over(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        format: wgpu::TextureFormat,
        input_view: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let pipeline = self.blit_over.entry(format).or_insert_with(|| {
            fullscreen_pipeline(
                &gpu.device,
                "Composite Blit",
                include_str!("../shaders/blit.wgsl"),
                &self.blit_layout,
                format,
                BLEND_ALPHA_OVER,
            )
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Blit Bind Group"),
            layout: &self.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: out_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn dual_pass<U: bytemuck::Pod>(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        uniforms: &U,
        view_a: &wgpu::TextureView,
        view_b: &wgpu::TextureView,
        out_view: &wgpu::TextureView,
    ) {
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Composite Uniforms"),
                contents: bytemuck::cast_slice(std::slice::from_ref(uniforms)),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bind Group"),
            layout: &self.dual_layout,
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
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Pass"),
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
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
