// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for the compositing tests: a mutable solid-rect
//! content and helpers that stand in for the sync layer.
#![allow(dead_code, reason = "shared across test binaries with different needs")]

use std::sync::{Arc, Mutex};

use kurbo::{Affine, Rect};

use lamina_backend_raster::RasterImage;
use lamina_core::bounds::Bounds;
use lamina_core::node::{Content, NodeId, SceneGraph};
use lamina_core::scene::Scene;
use lamina_core::target::{Color, Geometry, Paint, RenderTarget};
use lamina_core::trace::Tracer;

/// A solid rectangle whose color can be changed from outside the graph
/// (the test then reports the change like a sync layer would).
pub struct SolidRect {
    rect: Rect,
    color: Arc<Mutex<Color>>,
}

impl SolidRect {
    pub fn new(rect: Rect, color: Color) -> (Self, Arc<Mutex<Color>>) {
        let shared = Arc::new(Mutex::new(color));
        (
            Self {
                rect,
                color: Arc::clone(&shared),
            },
            shared,
        )
    }

    fn color(&self) -> Color {
        *self.color.lock().expect("color lock poisoned")
    }
}

impl Content for SolidRect {
    fn render(&mut self, target: &mut dyn RenderTarget) {
        target.fill(&Geometry::Rect(self.rect), &Paint::Solid(self.color()));
    }

    fn has_overlapping_contents(&self) -> bool {
        false
    }

    fn supports_opaque_regions(&self) -> bool {
        true
    }

    fn has_opaque_region(&self) -> bool {
        self.color().is_opaque()
    }

    fn compute_opaque_region(&self) -> Option<Rect> {
        self.color().is_opaque().then_some(self.rect)
    }

    fn rect_clip(&self) -> Option<Rect> {
        self.color().is_opaque().then_some(self.rect)
    }
}

/// Creates a leaf painting `rect` in `color` at `rect`'s position, with
/// its bounds synced the way the sync layer would.
pub fn solid_leaf(
    graph: &mut SceneGraph,
    parent: NodeId,
    rect: Rect,
    color: Color,
) -> NodeId {
    let local = Rect::new(0.0, 0.0, rect.width(), rect.height());
    let (content, _) = SolidRect::new(local, color);
    let leaf = graph.create_leaf(Box::new(content));
    graph.add_child(parent, leaf);
    graph.set_transform(leaf, Affine::translate((rect.x0, rect.y0)));
    graph.set_content_bounds(leaf, Bounds::from_rect(local));
    graph.set_transformed_bounds(leaf, Bounds::from_rect(rect), false);
    leaf
}

/// Like [`solid_leaf`], returning the shared color handle as well.
pub fn solid_leaf_shared(
    graph: &mut SceneGraph,
    parent: NodeId,
    rect: Rect,
    color: Color,
) -> (NodeId, Arc<Mutex<Color>>) {
    let local = Rect::new(0.0, 0.0, rect.width(), rect.height());
    let (content, shared) = SolidRect::new(local, color);
    let leaf = graph.create_leaf(Box::new(content));
    graph.add_child(parent, leaf);
    graph.set_transform(leaf, Affine::translate((rect.x0, rect.y0)));
    graph.set_content_bounds(leaf, Bounds::from_rect(local));
    graph.set_transformed_bounds(leaf, Bounds::from_rect(rect), false);
    (leaf, shared)
}

/// A root group sized to the viewport, so the first frame repaints
/// everything.
pub fn viewport_root(graph: &mut SceneGraph, width: f64, height: f64) -> NodeId {
    let root = graph.create_group();
    graph.set_content_bounds(root, Bounds::new(0.0, 0.0, width, height));
    graph.set_transformed_bounds(root, Bounds::new(0.0, 0.0, width, height), false);
    root
}

/// Renders one frame of `scene` into a fresh image.
pub fn render_frame(scene: &mut Scene, width: u32, height: u32) -> RasterImage {
    let mut img = RasterImage::new(width, height);
    render_frame_onto(scene, &mut img);
    img
}

/// Renders one frame of `scene` onto an existing image (the retained
/// back buffer).
pub fn render_frame_onto(scene: &mut Scene, img: &mut RasterImage) -> usize {
    let clip = Bounds::from_rect(img.device_bounds());
    scene.render_frame(img, clip, &mut Tracer::disabled())
}

/// Builds a scene, renders exactly one full frame, and returns the
/// pixels: the reference for equivalence comparisons.
pub fn reference_render(
    width: u32,
    height: u32,
    build: impl FnOnce(&mut SceneGraph, NodeId),
) -> RasterImage {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, f64::from(width), f64::from(height));
    build(&mut graph, root);
    let mut scene = Scene::new(graph, root);
    render_frame(&mut scene, width, height)
}

pub const WHITE: Color = Color::WHITE;
pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
