//! # Glaze
//!
//! **A layered 2D renderer with a composable post-processing chain.**
//!
//! Put primitives on integer-indexed layers, describe the final frame as a
//! chain of composition nodes, and let the renderer do the plumbing: pooled
//! off-screen targets, effect passes, masks, displacement maps, and lighting,
//! all composited in order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use glaze::*;
//!
//! # fn demo(gpu: &GpuContext) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scene = Scene::new();
//! scene.layer_mut(0).add_rect(
//!     Vec2::new(100.0, 100.0),
//!     Vec2::splat(64.0),
//!     Color::rgb(1.0, 0.6, 0.1),
//! );
//!
//! let mut renderer = ChainRenderer::new(gpu);
//! renderer.set_chain(vec![
//!     ChainNode::all_layers().wrap_effect("bloom", EffectParams::new())?,
//! ]);
//!
//! // Each frame:
//! renderer.render_frame(gpu, &mut scene, 1.0 / 60.0)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Philosophy
//!
//! - **The chain is data** — frame composition is an ordered list of nodes
//!   you can rebuild at any time; effects wrap any node, including other
//!   effects.
//! - **Configuration errors happen at build time** — a typo'd effect name
//!   fails when you construct the node, never mid-frame.
//! - **No leaked targets** — every intermediate image comes from a pool and
//!   goes back to it, on success and on error paths alike.
//! - **Escape hatches everywhere** — implement [`LayerSource`] to feed the
//!   chain from your own primitive store, or render offscreen with
//!   [`ChainRenderer::render_to`].

mod chain;
mod color;
mod draw2d;
mod effects;
mod gpu;
mod scene;
mod texture;

pub use chain::{
    ChainNode, ChainRenderer, ColorChannel, MaskFunction, NodeId, RenderContext, RenderError,
    TargetPool, TargetSpec,
};
pub use color::Color;
pub use draw2d::{Draw2d, Vertex2d};
pub use effects::{
    default_config, resolve, ConfigError, EffectConfig, EffectKind, EffectParams, ParamValue,
};
pub use gpu::GpuContext;
pub use scene::{BlendMode, Layer, LayerSource, Scene};
pub use texture::Texture;

// Re-export glam math types for convenience
pub use glam::Vec2;
