//! Composable post-processing chain over scene layers.
//!
//! The chain is an ordered list of [`ChainNode`] trees describing how the
//! final frame is assembled from scene layers, masks, displacement maps,
//! lights, fills, and wrapped effects. Evaluation walks each tree bottom-up,
//! resolving every node into a pooled off-screen target, then composites the
//! top-level results onto the frame in list order.
//!
//! # Architecture
//!
//! ```text
//! chain: [ node 0, node 1, node 2 ]      (later nodes on top)
//!            │        │        │
//!            ▼        ▼        ▼
//!         target   target   target      (from the shared pool)
//!            └────────┴────────┘
//!                     ▼
//!                framebuffer            (alpha-over, in order)
//! ```
//!
//! Nodes nest freely: a mask's paint can be an effect wrapping a layer range,
//! an effect can wrap another effect, and so on. Every intermediate image is
//! acquired from the [`TargetPool`] and released the moment its consumer has
//! been encoded.
//!
//! # Example
//!
//! ```ignore
//! use glaze::{ChainNode, ChainRenderer, EffectParams, MaskFunction};
//!
//! let mut renderer = ChainRenderer::new(&gpu);
//! renderer.set_chain(vec![
//!     ChainNode::layer_range(None, Some(9)),             // world
//!     ChainNode::layers(vec![10])
//!         .wrap_effect("bloom", EffectParams::new())?,   // glowing overlay
//! ]);
//!
//! // Each frame:
//! renderer.render_frame(&gpu, &mut scene, dt)?;
//! ```

mod composite;
mod evaluator;
pub(crate) mod node;
pub(crate) mod target_pool;

pub use evaluator::{ChainRenderer, RenderContext};
pub use node::{ChainNode, ColorChannel, MaskFunction, NodeId};
pub use target_pool::{RenderError, TargetPool, TargetSpec};

pub(crate) use target_pool::TARGET_FORMAT;
