//! The chain evaluator: turns the node list into a frame.
//!
//! [`ChainRenderer`] owns everything evaluation needs — the target pool, the
//! effect stage, the fixed composite passes, and the host-settable chain.
//! Each frame it walks the top-level nodes in list order, resolves every node
//! to one pooled target, and composites the results onto the frame in order
//! (later nodes on top). Sibling subtrees (a mask's paint and mask, a light's
//! two inputs) carry no ordering between themselves; they are simply encoded
//! ahead of the pass that consumes both.
//!
//! Errors abandon the frame: nothing is submitted, guards release every
//! acquired target, and the pool is left consistent.

use std::collections::HashMap;

use crate::chain::composite::Compositor;
use crate::chain::node::{self, ChainNode};
use crate::chain::target_pool::{PooledTarget, RenderError, TargetPool, TargetSpec};
use crate::color::Color;
use crate::effects::stage::{clear_pass, EffectStage};
use crate::effects::{ConfigError, EffectParams};
use crate::gpu::GpuContext;
use crate::scene::LayerSource;

/// Execution context passed through chain evaluation.
///
/// Bundles the GPU handles and the frame's command encoder; every pass a node
/// records goes into this encoder, and the whole frame is submitted at once.
pub struct RenderContext<'a> {
    /// GPU context providing access to device, queue, and configuration.
    pub gpu: &'a GpuContext,
    /// Command encoder for recording render pass commands.
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Seconds elapsed since the previous frame (drives time-based effects).
    pub dt: f32,
}

/// Renders a chain of [`ChainNode`]s over a [`LayerSource`] each frame.
///
/// The chain is re-read every frame and can be swapped at any time with
/// [`set_chain`](Self::set_chain). With no explicit chain set, the default is
/// a single [`ChainNode::all_layers`] — optionally specialized per layer by
/// the [`set_layer_effect`](Self::set_layer_effect) sugar.
pub struct ChainRenderer {
    pool: TargetPool,
    stage: EffectStage,
    compositor: Compositor,
    chain: Option<Vec<ChainNode>>,
    layer_effects: HashMap<i32, ChainNode>,
    last_viewport: Option<(u32, u32)>,
    /// Clear color of the frame before any node is composited.
    pub background: Color,
}

impl ChainRenderer {
    /// Build the renderer and compile its fixed pipelines.
    pub fn new(gpu: &GpuContext) -> Self {
        let stage = EffectStage::new(&gpu.device);
        let compositor = Compositor::new(&gpu.device, &stage.resources);
        tracing::info!("chain renderer ready");
        Self {
            pool: TargetPool::new(),
            stage,
            compositor,
            chain: None,
            layer_effects: HashMap::new(),
            last_viewport: None,
            background: Color::BLACK,
        }
    }

    /// Replace the chain with an explicit node list.
    pub fn set_chain(&mut self, nodes: Vec<ChainNode>) {
        self.chain = Some(nodes);
    }

    /// Return to the default chain (all layers, plus any per-layer effects).
    pub fn reset_chain(&mut self) {
        self.chain = None;
    }

    /// The explicit chain, if one is set.
    pub fn chain(&self) -> Option<&[ChainNode]> {
        self.chain.as_deref()
    }

    /// Mutable access to the explicit chain, if one is set.
    pub fn chain_mut(&mut self) -> Option<&mut Vec<ChainNode>> {
        self.chain.as_mut()
    }

    /// Per-layer sugar: render `layer` through `name` while the default chain
    /// is active.
    ///
    /// Equivalent to wrapping that layer's one-layer range in an effect node
    /// by hand. Validation happens here, at build time.
    pub fn set_layer_effect(
        &mut self,
        layer: i32,
        name: &str,
        params: EffectParams,
    ) -> Result<(), ConfigError> {
        let node = node::layer_effect_node(layer, name, params)?;
        self.layer_effects.insert(layer, node);
        Ok(())
    }

    /// Remove a per-layer effect set by [`set_layer_effect`](Self::set_layer_effect).
    pub fn clear_layer_effect(&mut self, layer: i32) {
        self.layer_effects.remove(&layer);
    }

    /// The render target pool (stats, manual purge).
    pub fn pool(&self) -> &TargetPool {
        &self.pool
    }

    /// Render one frame to the surface and present it.
    ///
    /// `dt` is the wall-clock time since the last frame in seconds; stateful
    /// effects use it for their decay. On error the frame is abandoned —
    /// nothing is presented and every acquired target is back in the pool.
    pub fn render_frame(
        &mut self,
        gpu: &GpuContext,
        scene: &mut dyn LayerSource,
        dt: f32,
    ) -> Result<(), RenderError> {
        let output = gpu
            .surface
            .get_current_texture()
            .map_err(RenderError::Surface)?;
        let frame_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Chain Encoder"),
            });

        match self.encode(gpu, &mut encoder, scene, dt, &frame_view, gpu.config.format) {
            Ok(()) => {
                gpu.queue.submit(std::iter::once(encoder.finish()));
                output.present();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "frame abandoned");
                Err(err)
            }
        }
    }

    /// Render one frame into an arbitrary target instead of the surface.
    ///
    /// Used for offscreen capture and composition; does not present.
    pub fn render_to(
        &mut self,
        gpu: &GpuContext,
        scene: &mut dyn LayerSource,
        dt: f32,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<(), RenderError> {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Chain To Target Encoder"),
            });

        match self.encode(gpu, &mut encoder, scene, dt, target, format) {
            Ok(()) => {
                gpu.queue.submit(std::iter::once(encoder.finish()));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "offscreen frame abandoned");
                Err(err)
            }
        }
    }

    fn encode(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &mut dyn LayerSource,
        dt: f32,
        frame_view: &wgpu::TextureView,
        frame_format: wgpu::TextureFormat,
    ) -> Result<(), RenderError> {
        // After a resize, every pooled target of the old size is useless.
        let viewport = (gpu.width(), gpu.height());
        if self.last_viewport.is_some_and(|prev| prev != viewport) {
            self.pool.purge();
        }
        self.last_viewport = Some(viewport);

        clear_pass(encoder, frame_view, self.background.to_wgpu());

        let mut ctx = RenderContext { gpu, encoder, dt };

        // The chain is re-read (and borrowed) for the whole walk while `self`
        // stays mutable for pool/stage access, so it is parked locally.
        let chain = self.chain.take();
        let layer_effects = std::mem::take(&mut self.layer_effects);
        let result = self.encode_plan(
            &mut ctx,
            scene,
            chain.as_deref(),
            &layer_effects,
            frame_view,
            frame_format,
        );
        self.chain = chain;
        self.layer_effects = layer_effects;
        result?;

        // Drop per-node effect state for nodes that left the chain.
        let mut live = Vec::new();
        if let Some(nodes) = &self.chain {
            for node in nodes {
                node.collect_effect_ids(&mut live);
            }
        }
        for node in self.layer_effects.values() {
            node.collect_effect_ids(&mut live);
        }
        self.stage.prune_state(&live);

        Ok(())
    }

    fn encode_plan(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut dyn LayerSource,
        chain: Option<&[ChainNode]>,
        layer_effects: &HashMap<i32, ChainNode>,
        frame_view: &wgpu::TextureView,
        frame_format: wgpu::TextureFormat,
    ) -> Result<(), RenderError> {
        match chain {
            Some(nodes) => {
                // Top-level nodes composite in list order: index 0 first,
                // later nodes on top.
                for node in nodes {
                    let target = self.eval(ctx, scene, node)?;
                    self.compositor.blit_over(
                        ctx.gpu,
                        ctx.encoder,
                        frame_format,
                        target.view(),
                        frame_view,
                    );
                }
            }
            None if layer_effects.is_empty() => {
                let all = ChainNode::all_layers();
                let target = self.eval(ctx, scene, &all)?;
                self.compositor.blit_over(
                    ctx.gpu,
                    ctx.encoder,
                    frame_format,
                    target.view(),
                    frame_view,
                );
            }
            None => {
                // Default chain with per-layer effects: one implicit node per
                // layer, in ascending layer order.
                for id in scene.layer_ids() {
                    let implicit;
                    let node = match layer_effects.get(&id) {
                        Some(node) => node,
                        None => {
                            implicit = ChainNode::layer_range(Some(id), Some(id));
                            &implicit
                        }
                    };
                    let target = self.eval(ctx, scene, node)?;
                    self.compositor.blit_over(
                        ctx.gpu,
                        ctx.encoder,
                        frame_format,
                        target.view(),
                        frame_view,
                    );
                }
            }
        }
        Ok(())
    }

    /// Resolve one node to a pooled, viewport-sized target.
    fn eval(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut dyn LayerSource,
        node: &ChainNode,
    ) -> Result<PooledTarget, RenderError> {
        match node {
            ChainNode::LayerRange { start, stop } => {
                let ids = node::resolve_layer_range(&scene.layer_ids(), *start, *stop);
                self.draw_layers_node(ctx, scene, &ids)
            }
            ChainNode::Layers { ids } => {
                let resolved = node::resolve_layers(&scene.layer_ids(), ids);
                self.draw_layers_node(ctx, scene, &resolved)
            }
            ChainNode::Fill { color } => {
                let target = self.pool.acquire(ctx.gpu, TargetSpec::viewport(ctx.gpu))?;
                // Overwrite, including alpha: a fill ignores blending.
                clear_pass(ctx.encoder, target.view(), color.to_wgpu());
                Ok(target)
            }
            ChainNode::Effect { inner, config, id } => {
                let input = self.eval(ctx, scene, inner)?;
                self.stage.apply(ctx, &self.pool, config, *id, input)
            }
            ChainNode::Mask {
                paint,
                mask,
                function,
            } => {
                let paint_target = self.eval(ctx, scene, paint)?;
                let mask_target = self.eval(ctx, scene, mask)?;
                let out = self.pool.acquire(ctx.gpu, TargetSpec::viewport(ctx.gpu))?;
                self.compositor.mask(
                    ctx.gpu,
                    ctx.encoder,
                    *function,
                    paint_target.view(),
                    mask_target.view(),
                    out.view(),
                );
                drop(paint_target);
                drop(mask_target);
                Ok(out)
            }
            ChainNode::DisplacementMap {
                paint,
                displacement,
                scale,
                x_channel,
                y_channel,
            } => {
                let paint_target = self.eval(ctx, scene, paint)?;
                let displacement_target = self.eval(ctx, scene, displacement)?;
                let spec = TargetSpec::viewport(ctx.gpu);
                let out = self.pool.acquire(ctx.gpu, spec)?;
                self.compositor.displacement(
                    ctx.gpu,
                    ctx.encoder,
                    *scale,
                    *x_channel,
                    *y_channel,
                    [spec.width as f32, spec.height as f32],
                    paint_target.view(),
                    displacement_target.view(),
                    out.view(),
                );
                drop(paint_target);
                drop(displacement_target);
                Ok(out)
            }
            ChainNode::Light {
                light,
                diffuse,
                ambient,
            } => {
                let light_target = self.eval(ctx, scene, light)?;
                let diffuse_target = self.eval(ctx, scene, diffuse)?;
                let out = self.pool.acquire(ctx.gpu, TargetSpec::viewport(ctx.gpu))?;
                self.compositor.light(
                    ctx.gpu,
                    ctx.encoder,
                    *ambient,
                    diffuse_target.view(),
                    light_target.view(),
                    out.view(),
                );
                drop(light_target);
                drop(diffuse_target);
                Ok(out)
            }
        }
    }

    /// Acquire a target, clear it to transparent, and let the scene draw the
    /// resolved layers into it.
    fn draw_layers_node(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut dyn LayerSource,
        ids: &[i32],
    ) -> Result<PooledTarget, RenderError> {
        let target = self.pool.acquire(ctx.gpu, TargetSpec::viewport(ctx.gpu))?;
        clear_pass(ctx.encoder, target.view(), wgpu::Color::TRANSPARENT);
        if !ids.is_empty() {
            scene.draw_layers(ids, ctx, target.view());
        }
        Ok(target)
    }
}
