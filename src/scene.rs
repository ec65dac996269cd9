//! The scene: integer-indexed layers of drawable primitives.
//!
//! The chain renderer doesn't care where pixels come from — it talks to a
//! [`LayerSource`]. This module provides both the collaborator trait and the
//! built-in [`Scene`] implementation: a sorted map of [`Layer`]s, each holding
//! solid rectangles and sprites and carrying its own blend mode.
//!
//! Layer ids are plain `i32`s chosen by the application; draw order within a
//! chain node follows the order the node asks for (ascending for ranges,
//! as-given for explicit sets). Ids that don't exist in the scene simply
//! contribute nothing.

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;

use crate::chain::{RenderContext, TARGET_FORMAT};
use crate::color::Color;
use crate::draw2d::{Draw2d, Vertex2d};
use crate::texture::Texture;

/// How a layer's primitives blend into the layer node's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Straight-alpha over (the default).
    #[default]
    Normal,
    /// Additive. This is the mode light-source layers use, so that a `Light`
    /// node's light input accumulates where sources overlap.
    Additive,
}

/// Anything that can rasterize layers into a chain target.
///
/// Implemented by [`Scene`]; implement it yourself to feed the chain from a
/// custom primitive store. `draw_layers` receives the requested ids in the
/// order the chain node wants them drawn, an open command encoder via
/// [`RenderContext`], and the target view. The target has already been
/// cleared to transparent by the evaluator.
pub trait LayerSource {
    /// All layer ids currently in the scene, ascending.
    fn layer_ids(&self) -> Vec<i32>;

    /// Draw the primitives of `ids` (in that order) into `target`.
    ///
    /// Ids that don't exist must be skipped silently.
    fn draw_layers(&mut self, ids: &[i32], ctx: &mut RenderContext, target: &wgpu::TextureView);
}

struct RectPrim {
    pos: Vec2,
    size: Vec2,
    color: Color,
}

struct SpritePrim {
    texture: Rc<Texture>,
    pos: Vec2,
    size: Vec2,
    tint: Color,
}

/// One integer-indexed bucket of drawable primitives.
pub struct Layer {
    /// Blend mode for everything in this layer.
    pub blend: BlendMode,
    /// Hidden layers keep their contents but draw nothing.
    pub visible: bool,
    rects: Vec<RectPrim>,
    sprites: Vec<SpritePrim>,
}

impl Layer {
    fn new() -> Self {
        Self {
            blend: BlendMode::default(),
            visible: true,
            rects: Vec::new(),
            sprites: Vec::new(),
        }
    }

    /// Add a solid rectangle (position is the top-left corner, in pixels).
    pub fn add_rect(&mut self, pos: Vec2, size: Vec2, color: Color) {
        self.rects.push(RectPrim { pos, size, color });
    }

    /// Add a sprite stretched over `size` pixels.
    pub fn add_sprite(&mut self, texture: Rc<Texture>, pos: Vec2, size: Vec2, tint: Color) {
        self.sprites.push(SpritePrim {
            texture,
            pos,
            size,
            tint,
        });
    }

    /// Remove every primitive from the layer.
    pub fn clear(&mut self) {
        self.rects.clear();
        self.sprites.clear();
    }

    /// True if the layer has nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty() && self.sprites.is_empty()
    }

    fn rect_vertices(&self) -> Vec<Vertex2d> {
        let mut vertices = Vec::with_capacity(self.rects.len() * 6);
        for rect in &self.rects {
            push_quad(
                &mut vertices,
                rect.pos,
                rect.size,
                rect.color.to_array(),
            );
        }
        vertices
    }
}

fn push_quad(out: &mut Vec<Vertex2d>, pos: Vec2, size: Vec2, color: [f32; 4]) {
    let (x, y) = (pos.x, pos.y);
    let (w, h) = (size.x, size.y);
    out.extend_from_slice(&[
        Vertex2d {
            position: [x, y],
            uv: [0.0, 0.0],
            color,
        },
        Vertex2d {
            position: [x + w, y],
            uv: [1.0, 0.0],
            color,
        },
        Vertex2d {
            position: [x, y + h],
            uv: [0.0, 1.0],
            color,
        },
        Vertex2d {
            position: [x + w, y],
            uv: [1.0, 0.0],
            color,
        },
        Vertex2d {
            position: [x + w, y + h],
            uv: [1.0, 1.0],
            color,
        },
        Vertex2d {
            position: [x, y + h],
            uv: [0.0, 1.0],
            color,
        },
    ]);
}

/// The built-in layer store.
///
/// Layers are created on first access and kept sorted by id:
///
/// ```ignore
/// let mut scene = Scene::new();
/// scene.layer_mut(0).add_rect(Vec2::new(10.0, 10.0), Vec2::splat(64.0), Color::WHITE);
/// scene.layer_mut(5).blend = BlendMode::Additive;
/// ```
pub struct Scene {
    layers: BTreeMap<i32, Layer>,
    draw2d: Option<Draw2d>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            layers: BTreeMap::new(),
            draw2d: None,
        }
    }

    /// Get a layer, creating it if it doesn't exist yet.
    pub fn layer_mut(&mut self, id: i32) -> &mut Layer {
        self.layers.entry(id).or_insert_with(Layer::new)
    }

    /// Get a layer if it exists.
    pub fn layer(&self, id: i32) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Drop a layer and everything in it.
    pub fn remove_layer(&mut self, id: i32) -> bool {
        self.layers.remove(&id).is_some()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerSource for Scene {
    fn layer_ids(&self) -> Vec<i32> {
        self.layers.keys().copied().collect()
    }

    fn draw_layers(&mut self, ids: &[i32], ctx: &mut RenderContext, target: &wgpu::TextureView) {
        let draw2d = self
            .draw2d
            .get_or_insert_with(|| Draw2d::new(ctx.gpu, TARGET_FORMAT));

        let resolution = [ctx.gpu.width() as f32, ctx.gpu.height() as f32];
        let uniform_bind_group = draw2d.uniform_bind_group(ctx.gpu, resolution);

        // Pre-bake the per-layer batches so nothing borrows `self.layers`
        // while the pass is open.
        let mut batches: Vec<(BlendMode, Vec<Vertex2d>, Option<wgpu::BindGroup>)> = Vec::new();
        for id in ids {
            let Some(layer) = self.layers.get(id) else {
                continue;
            };
            if !layer.visible || layer.is_empty() {
                continue;
            }

            let rects = layer.rect_vertices();
            if !rects.is_empty() {
                batches.push((layer.blend, rects, None));
            }
            for sprite in &layer.sprites {
                let mut vertices = Vec::with_capacity(6);
                push_quad(&mut vertices, sprite.pos, sprite.size, sprite.tint.to_array());
                let bind_group = draw2d.texture_bind_group(ctx.gpu, &sprite.texture);
                batches.push((layer.blend, vertices, Some(bind_group)));
            }
        }

        if batches.is_empty() {
            return;
        }

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Layer Draw Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
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

        for (blend, vertices, texture_bind_group) in &batches {
            draw2d.draw_batch(
                ctx.gpu,
                &mut pass,
                &uniform_bind_group,
                *blend,
                vertices,
                texture_bind_group.as_ref(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_ids_ascending() {
        let mut scene = Scene::new();
        scene.layer_mut(7);
        scene.layer_mut(-2);
        scene.layer_mut(3);

        assert_eq!(scene.layer_ids(), vec![-2, 3, 7]);
    }

    #[test]
    fn layer_created_on_demand() {
        let mut scene = Scene::new();
        assert!(scene.layer(4).is_none());
        scene.layer_mut(4).add_rect(Vec2::ZERO, Vec2::splat(8.0), Color::WHITE);
        assert!(!scene.layer(4).unwrap().is_empty());

        scene.layer_mut(4).clear();
        assert!(scene.layer(4).unwrap().is_empty());
    }

    #[test]
    fn quad_winding_covers_rect() {
        let mut vertices = Vec::new();
        push_quad(
            &mut vertices,
            Vec2::new(2.0, 3.0),
            Vec2::new(10.0, 20.0),
            [1.0; 4],
        );
        assert_eq!(vertices.len(), 6);
        let xs: Vec<f32> = vertices.iter().map(|v| v.position[0]).collect();
        let ys: Vec<f32> = vertices.iter().map(|v| v.position[1]).collect();
        assert_eq!(xs.iter().cloned().fold(f32::MAX, f32::min), 2.0);
        assert_eq!(xs.iter().cloned().fold(f32::MIN, f32::max), 12.0);
        assert_eq!(ys.iter().cloned().fold(f32::MAX, f32::min), 3.0);
        assert_eq!(ys.iter().cloned().fold(f32::MIN, f32::max), 23.0);
    }
}
