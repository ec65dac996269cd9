//! Chain nodes: the building blocks of frame composition.
//!
//! A chain is an ordered list of trees. Leaves pull pixels from scene layers
//! or a flat fill; interior nodes combine or transform the images their
//! children produce. Effects can wrap any node — including other effects —
//! so `bloom(mask(paint, stencil))` is just nesting.
//!
//! Nodes are plain data. Effect configuration is validated when a node is
//! built (see [`ConfigError`]); evaluation itself happens in
//! [`ChainRenderer`](crate::chain::ChainRenderer).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::color::Color;
use crate::effects::{self, ConfigError, EffectConfig, EffectParams};

/// How a mask node combines its paint and mask inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskFunction {
    /// Keep paint where the mask is opaque.
    Inside,
    /// Keep paint where the mask is transparent.
    Outside,
    /// Scale paint alpha by the mask's luminance.
    Luminance,
}

/// Which channel of the displacement input drives an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChannel {
    R,
    G,
    B,
}

/// Stable identity of an effect-wrapper node.
///
/// Stateful effects (`trails`) key their accumulation buffers on this, so a
/// node keeps its state for as long as it stays in the chain. Cloning a node
/// mints a fresh id: two copies of a trails effect never share trails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One node in the composition tree.
///
/// Build nodes with the constructor methods rather than the variants
/// directly; [`wrap_effect`](ChainNode::wrap_effect) is the only fallible
/// one (it validates the effect name and parameters).
#[derive(Debug, PartialEq)]
pub enum ChainNode {
    /// A contiguous band of scene layers, drawn in ascending id order.
    /// `None` bounds extend to the scene's lowest/highest layer.
    LayerRange {
        start: Option<i32>,
        stop: Option<i32>,
    },
    /// Exactly these layers, drawn in the given order.
    Layers { ids: Vec<i32> },
    /// Paint masked by a second subtree.
    Mask {
        paint: Box<ChainNode>,
        mask: Box<ChainNode>,
        function: MaskFunction,
    },
    /// Paint sampled through per-pixel offsets read from a displacement map.
    DisplacementMap {
        paint: Box<ChainNode>,
        displacement: Box<ChainNode>,
        scale: f32,
        x_channel: ColorChannel,
        y_channel: ColorChannel,
    },
    /// A solid color covering the whole viewport.
    Fill { color: Color },
    /// Diffuse lit by a light subtree over an ambient floor.
    Light {
        light: Box<ChainNode>,
        diffuse: Box<ChainNode>,
        ambient: Color,
    },
    /// Any node transformed by a post-processing effect.
    Effect {
        inner: Box<ChainNode>,
        config: EffectConfig,
        id: NodeId,
    },
}

impl ChainNode {
    /// Every layer in the scene, ascending. This is also the default chain.
    pub fn all_layers() -> Self {
        ChainNode::LayerRange {
            start: None,
            stop: None,
        }
    }

    /// Layers with ids in `[start, stop]` inclusive, ascending.
    pub fn layer_range(start: Option<i32>, stop: Option<i32>) -> Self {
        ChainNode::LayerRange { start, stop }
    }

    /// Exactly the named layers, in the given order.
    pub fn layers(ids: impl Into<Vec<i32>>) -> Self {
        ChainNode::Layers { ids: ids.into() }
    }

    /// A full-viewport solid fill.
    pub fn fill(color: Color) -> Self {
        ChainNode::Fill { color }
    }

    /// Mask `paint` by `mask` using `function`.
    pub fn mask(function: MaskFunction, paint: ChainNode, mask: ChainNode) -> Self {
        ChainNode::Mask {
            paint: Box::new(paint),
            mask: Box::new(mask),
            function,
        }
    }

    /// Sample `paint` through offsets read from `displacement`.
    ///
    /// A mid-grey displacement (`0.5` in both selected channels) means zero
    /// offset; full white/black displaces by `±scale` pixels.
    pub fn displacement_map(
        paint: ChainNode,
        displacement: ChainNode,
        scale: f32,
        x_channel: ColorChannel,
        y_channel: ColorChannel,
    ) -> Self {
        ChainNode::DisplacementMap {
            paint: Box::new(paint),
            displacement: Box::new(displacement),
            scale,
            x_channel,
            y_channel,
        }
    }

    /// Light `diffuse` with the (additively drawn) `light` subtree over an
    /// `ambient` floor. With no light contribution, `ambient` is the fraction
    /// of diffuse that remains visible.
    pub fn light(light: ChainNode, diffuse: ChainNode, ambient: Color) -> Self {
        ChainNode::Light {
            light: Box::new(light),
            diffuse: Box::new(diffuse),
            ambient,
        }
    }

    /// Wrap this node in a named effect.
    ///
    /// The effect name and parameters are validated now; an unknown name or
    /// malformed parameter never reaches frame rendering.
    pub fn wrap_effect(self, name: &str, params: EffectParams) -> Result<ChainNode, ConfigError> {
        let config = effects::resolve(name, &params)?;
        Ok(ChainNode::Effect {
            inner: Box::new(self),
            config,
            id: NodeId::next(),
        })
    }

    /// Walk the subtree collecting the ids of effect-wrapper nodes.
    ///
    /// The evaluator uses this to prune per-node effect state (trails
    /// accumulators) once a node leaves the chain.
    pub(crate) fn collect_effect_ids(&self, out: &mut Vec<NodeId>) {
        match self {
            ChainNode::LayerRange { .. } | ChainNode::Layers { .. } | ChainNode::Fill { .. } => {}
            ChainNode::Mask { paint, mask, .. } => {
                paint.collect_effect_ids(out);
                mask.collect_effect_ids(out);
            }
            ChainNode::DisplacementMap {
                paint,
                displacement,
                ..
            } => {
                paint.collect_effect_ids(out);
                displacement.collect_effect_ids(out);
            }
            ChainNode::Light { light, diffuse, .. } => {
                light.collect_effect_ids(out);
                diffuse.collect_effect_ids(out);
            }
            ChainNode::Effect { inner, id, .. } => {
                out.push(*id);
                inner.collect_effect_ids(out);
            }
        }
    }
}

impl Clone for ChainNode {
    fn clone(&self) -> Self {
        match self {
            ChainNode::LayerRange { start, stop } => ChainNode::LayerRange {
                start: *start,
                stop: *stop,
            },
            ChainNode::Layers { ids } => ChainNode::Layers { ids: ids.clone() },
            ChainNode::Mask {
                paint,
                mask,
                function,
            } => ChainNode::Mask {
                paint: paint.clone(),
                mask: mask.clone(),
                function: *function,
            },
            ChainNode::DisplacementMap {
                paint,
                displacement,
                scale,
                x_channel,
                y_channel,
            } => ChainNode::DisplacementMap {
                paint: paint.clone(),
                displacement: displacement.clone(),
                scale: *scale,
                x_channel: *x_channel,
                y_channel: *y_channel,
            },
            ChainNode::Fill { color } => ChainNode::Fill { color: *color },
            ChainNode::Light {
                light,
                diffuse,
                ambient,
            } => ChainNode::Light {
                light: light.clone(),
                diffuse: diffuse.clone(),
                ambient: *ambient,
            },
            // A clone is a new node: it gets its own identity so stateful
            // effects don't share accumulation buffers between copies.
            ChainNode::Effect { inner, config, .. } => ChainNode::Effect {
                inner: inner.clone(),
                config: *config,
                id: NodeId::next(),
            },
        }
    }
}

/// Resolve a layer range against the scene's (ascending) layer ids.
///
/// Bounds are inclusive; ids outside the scene just don't appear. An
/// inverted range is empty.
pub(crate) fn resolve_layer_range(
    scene_ids: &[i32],
    start: Option<i32>,
    stop: Option<i32>,
) -> Vec<i32> {
    scene_ids
        .iter()
        .copied()
        .filter(|id| start.is_none_or(|s| *id >= s) && stop.is_none_or(|s| *id <= s))
        .collect()
}

/// Resolve an explicit layer list, keeping the requested order and dropping
/// ids the scene doesn't have (missing layers are empty contributions, not
/// errors).
pub(crate) fn resolve_layers(scene_ids: &[i32], requested: &[i32]) -> Vec<i32> {
    requested
        .iter()
        .copied()
        .filter(|id| scene_ids.contains(id))
        .collect()
}

/// Build the node behind the per-layer effect sugar: the single layer's
/// implicit one-layer range wrapped in the named effect.
pub(crate) fn layer_effect_node(
    layer: i32,
    name: &str,
    params: EffectParams,
) -> Result<ChainNode, ConfigError> {
    ChainNode::layer_range(Some(layer), Some(layer)).wrap_effect(name, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_and_explicit_list_agree_on_single_layer() {
        let scene_ids = [0];
        assert_eq!(
            resolve_layer_range(&scene_ids, Some(0), Some(0)),
            resolve_layers(&scene_ids, &[0]),
        );
    }

    #[test]
    fn open_range_covers_all_layers() {
        let scene_ids = [-3, 0, 2, 9];
        assert_eq!(resolve_layer_range(&scene_ids, None, None), vec![-3, 0, 2, 9]);
        assert_eq!(resolve_layer_range(&scene_ids, Some(0), None), vec![0, 2, 9]);
        assert_eq!(resolve_layer_range(&scene_ids, None, Some(2)), vec![-3, 0, 2]);
    }

    #[test]
    fn inverted_range_is_empty() {
        let scene_ids = [0, 1, 2];
        assert!(resolve_layer_range(&scene_ids, Some(2), Some(1)).is_empty());
    }

    #[test]
    fn missing_layers_are_silently_dropped() {
        let scene_ids = [1, 3];
        assert_eq!(resolve_layers(&scene_ids, &[3, 99, 1]), vec![3, 1]);
        assert!(resolve_layers(&scene_ids, &[42]).is_empty());
    }

    #[test]
    fn explicit_list_keeps_requested_order() {
        let scene_ids = [1, 2, 3];
        assert_eq!(resolve_layers(&scene_ids, &[3, 1, 2]), vec![3, 1, 2]);
    }

    #[test]
    fn unknown_effect_fails_at_node_build() {
        let err = ChainNode::all_layers()
            .wrap_effect("glow", EffectParams::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownEffect("glow".to_string()));
    }

    #[test]
    fn effects_nest_recursively() {
        let node = ChainNode::layers(vec![1])
            .wrap_effect("blur", EffectParams::new().with("radius", 2.0))
            .unwrap()
            .wrap_effect("greyscale", EffectParams::new())
            .unwrap();

        let ChainNode::Effect { inner, .. } = &node else {
            panic!("expected effect wrapper");
        };
        assert!(matches!(**inner, ChainNode::Effect { .. }));

        let mut ids = Vec::new();
        node.collect_effect_ids(&mut ids);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn cloned_effect_gets_fresh_identity() {
        let original = ChainNode::all_layers()
            .wrap_effect("trails", EffectParams::new())
            .unwrap();
        let copy = original.clone();

        let (ChainNode::Effect { id: a, .. }, ChainNode::Effect { id: b, .. }) =
            (&original, &copy)
        else {
            panic!("expected effect wrappers");
        };
        assert_ne!(a, b);
    }

    #[test]
    fn layer_effect_sugar_matches_hand_built_graph() {
        let sugar = layer_effect_node(5, "pixellate", EffectParams::new()).unwrap();
        let by_hand = ChainNode::layer_range(Some(5), Some(5))
            .wrap_effect("pixellate", EffectParams::new())
            .unwrap();

        // Identity differs by construction; everything else must match.
        let (
            ChainNode::Effect {
                inner: sugar_inner,
                config: sugar_config,
                ..
            },
            ChainNode::Effect {
                inner: hand_inner,
                config: hand_config,
                ..
            },
        ) = (&sugar, &by_hand)
        else {
            panic!("expected effect wrappers");
        };
        assert_eq!(sugar_inner, hand_inner);
        assert_eq!(sugar_config, hand_config);
    }
}
