// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel-equivalence properties of the compositing core, checked against
//! the CPU backend: incremental repaints, render-root occlusion, cached
//! rasters and the translation fast path, clip compositing, blend-mode
//! isolation, and allocation-failure degradation.

mod common;

use common::{
    BLUE, GREEN, RED, WHITE, reference_render, render_frame, render_frame_onto, solid_leaf,
    solid_leaf_shared, viewport_root,
};
use kurbo::{Affine, Rect, Stroke};

use lamina_backend_raster::RasterImage;
use lamina_core::bounds::Bounds;
use lamina_core::cull::NodePath;
use lamina_core::node::SceneGraph;
use lamina_core::render::RenderContext;
use lamina_core::render::cache::CacheHint;
use lamina_core::scene::Scene;
use lamina_core::target::{
    BlendMode, Color, CompositeMode, Geometry, Paint, RenderTarget, Surface,
};

fn px_near(actual: [u8; 4], expected: [u8; 4], tolerance: u8) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| a.abs_diff(*e) <= tolerance)
}

#[test]
fn unchanged_frame_paints_nothing() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 100.0, 100.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
    solid_leaf(&mut graph, root, Rect::new(10.0, 10.0, 40.0, 40.0), RED);
    let mut scene = Scene::new(graph, root);
    let mut img = render_frame(&mut scene, 100, 100);
    let baseline = img.clone();

    let painted = render_frame_onto(&mut scene, &mut img);
    assert_eq!(painted, 0, "a clean tree must not repaint");
    assert!(img.pixels_equal(&baseline));
}

#[test]
fn occluded_update_paints_nothing() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 100.0, 100.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
    let hidden = solid_leaf(&mut graph, root, Rect::new(30.0, 30.0, 50.0, 50.0), RED);
    // Painted above: an opaque cover.
    solid_leaf(&mut graph, root, Rect::new(20.0, 20.0, 80.0, 80.0), BLUE);
    let mut scene = Scene::new(graph, root);
    let mut img = render_frame(&mut scene, 100, 100);
    let baseline = img.clone();

    // Dirty the fully covered node: its region lies inside the clean
    // cover, so the frame has nothing to paint.
    scene.graph_mut().mark_dirty(hidden);
    let painted = render_frame_onto(&mut scene, &mut img);
    assert_eq!(painted, 0, "occluded dirt must be skipped entirely");
    assert!(img.pixels_equal(&baseline));
}

#[test]
fn render_root_walk_matches_full_walk() {
    let build = |graph: &mut SceneGraph| {
        let root = viewport_root(graph, 100.0, 100.0);
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
        solid_leaf(
            graph,
            root,
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Color::rgba(1.0, 0.0, 0.0, 0.5),
        );
        let cover = solid_leaf(graph, root, Rect::new(10.0, 10.0, 90.0, 90.0), BLUE);
        solid_leaf(graph, root, Rect::new(40.0, 40.0, 60.0, 60.0), GREEN);
        (root, cover)
    };
    let region = Bounds::new(20.0, 20.0, 80.0, 80.0);

    // Walk guided by the render-root path.
    let mut graph = SceneGraph::new();
    let (root, cover) = build(&mut graph);
    graph.mark_dirty(cover);
    let mut path = NodePath::new();
    graph.get_render_root(&mut path, region, None, root, Affine::IDENTITY);
    assert_eq!(path.render_root(), Some(cover), "cover occludes the region");
    let mut rooted = RasterImage::new(100, 100);
    rooted.set_clip_rect(Some(region.to_rect()));
    let mut ctx = RenderContext {
        path: Some(path),
        ..RenderContext::new()
    };
    graph.render(root, &mut rooted, &mut ctx);

    // The same tree painted from the true root.
    let mut graph = SceneGraph::new();
    let (root, cover) = build(&mut graph);
    graph.mark_dirty(cover);
    let mut full = RasterImage::new(100, 100);
    full.set_clip_rect(Some(region.to_rect()));
    let mut ctx = RenderContext::new();
    graph.render(root, &mut full, &mut ctx);

    assert!(
        rooted.pixels_equal(&full),
        "painting from the render root must not change the output"
    );
}

#[test]
fn moved_leaf_repaints_both_positions() {
    let build = |graph: &mut SceneGraph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
    };
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 100.0, 100.0);
    build(&mut graph, root);
    let leaf = solid_leaf(&mut graph, root, Rect::new(10.0, 10.0, 20.0, 20.0), RED);
    let mut scene = Scene::new(graph, root);
    let mut img = render_frame(&mut scene, 100, 100);

    // Sync a move to (50, 30).
    let graph = scene.graph_mut();
    graph.set_transform(leaf, Affine::translate((50.0, 30.0)));
    graph.set_transformed_bounds(leaf, Bounds::new(50.0, 30.0, 60.0, 40.0), true);
    graph.mark_dirty(leaf);
    render_frame_onto(&mut scene, &mut img);

    let expected = reference_render(100, 100, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
        solid_leaf(graph, root, Rect::new(50.0, 30.0, 60.0, 40.0), RED);
    });
    assert!(img.pixels_equal(&expected), "old position must be repainted");
}

/// Builds the cached-group fixture: white background, then a cached group
/// holding one red child at `child_pos`.
fn cached_group_scene(scroll: bool) -> (Scene, lamina_core::node::NodeId, lamina_core::node::NodeId)
{
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 100.0, 100.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
    let group = graph.create_group();
    graph.add_child(root, group);
    graph.set_content_bounds(group, Bounds::new(0.0, 0.0, 100.0, 100.0));
    graph.set_transformed_bounds(group, Bounds::new(0.0, 0.0, 100.0, 100.0), false);
    graph.set_cached(group, true, CacheHint::Quality);
    graph.set_cache_scroll_enabled(group, scroll);
    let child = solid_leaf(&mut graph, group, Rect::new(10.0, 10.0, 30.0, 30.0), RED);
    (Scene::new(graph, root), group, child)
}

fn reference_with_child_at(x: f64, y: f64) -> RasterImage {
    reference_render(100, 100, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 100.0, 100.0), WHITE);
        solid_leaf(graph, root, Rect::new(x, y, x + 20.0, y + 20.0), RED);
    })
}

#[test]
fn translation_fast_path_is_pixel_equivalent() {
    // Deltas include zero and negative components.
    for (dx, dy) in [(3.0, 0.0), (0.0, 0.0), (-4.0, -2.0), (7.0, 5.0)] {
        for scroll in [false, true] {
            let (mut scene, group, child) = cached_group_scene(scroll);
            let mut img = render_frame(&mut scene, 100, 100);
            assert!(
                scene
                    .graph()
                    .cache_filter(group)
                    .expect("cache enabled")
                    .is_valid(),
                "first frame fills the cache"
            );

            let graph = scene.graph_mut();
            graph.set_transform(child, Affine::translate((10.0 + dx, 10.0 + dy)));
            graph.set_transformed_bounds(
                child,
                Bounds::new(10.0 + dx, 10.0 + dy, 30.0 + dx, 30.0 + dy),
                true,
            );
            render_frame_onto(&mut scene, &mut img);

            let expected = reference_with_child_at(10.0 + dx, 10.0 + dy);
            assert!(
                img.pixels_equal(&expected),
                "delta ({dx}, {dy}) scroll={scroll} diverged from the full repaint"
            );
        }
    }
}

#[test]
fn cached_render_matches_uncached() {
    let (mut scene, _, _) = cached_group_scene(false);
    let img = render_frame(&mut scene, 100, 100);
    let expected = reference_with_child_at(10.0, 10.0);
    assert!(img.pixels_equal(&expected));
}

#[test]
fn mass_removal_leaves_no_stale_pixels() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 220.0, 20.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 220.0, 20.0), WHITE);
    let group = graph.create_group();
    graph.add_child(root, group);
    graph.set_content_bounds(group, Bounds::new(0.0, 0.0, 220.0, 20.0));
    graph.set_transformed_bounds(group, Bounds::new(0.0, 0.0, 220.0, 20.0), false);
    let kids: Vec<_> = (0..20)
        .map(|i| {
            let x = 10.0 * f64::from(i);
            solid_leaf(&mut graph, group, Rect::new(x, 0.0, x + 10.0, 10.0), RED)
        })
        .collect();
    let mut scene = Scene::new(graph, root);
    let mut img = render_frame(&mut scene, 220, 20);

    // Removing more children than the tracking cap degrades to a whole-
    // group repaint; every former footprint must be painted over.
    for &k in kids.iter().take(15) {
        scene.graph_mut().remove_child(group, k);
    }
    render_frame_onto(&mut scene, &mut img);

    let expected = reference_render(220, 20, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 220.0, 20.0), WHITE);
        for i in 15..20 {
            let x = 10.0 * f64::from(i);
            solid_leaf(graph, root, Rect::new(x, 0.0, x + 10.0, 10.0), RED);
        }
    });
    assert!(img.pixels_equal(&expected), "stale pixels after mass removal");
}

#[test]
fn clip_swap_invalidates_cache_and_rerasterizes() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 40.0, 40.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 40.0, 40.0), WHITE);
    let leaf = solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 20.0, 20.0), RED);
    graph.set_cached(leaf, true, CacheHint::Quality);
    let mut scene = Scene::new(graph, root);
    let mut img = render_frame(&mut scene, 40, 40);
    assert!(
        scene
            .graph()
            .cache_filter(leaf)
            .expect("cache enabled")
            .is_valid()
    );

    // Swap the clip from none to a 10x10 rectangle: the cached raster can
    // no longer be valid, and the next frame re-rasterizes clipped.
    let graph = scene.graph_mut();
    let (mask_content, _) = common::SolidRect::new(Rect::new(0.0, 0.0, 10.0, 10.0), WHITE);
    let mask = graph.create_leaf(Box::new(mask_content));
    graph.set_content_bounds(mask, Bounds::new(0.0, 0.0, 10.0, 10.0));
    graph.set_transformed_bounds(mask, Bounds::new(0.0, 0.0, 10.0, 10.0), false);
    graph.set_clip_node(leaf, Some(mask));
    assert!(
        !graph.cache_filter(leaf).expect("cache enabled").is_valid(),
        "a clip change must invalidate the cached raster"
    );
    render_frame_onto(&mut scene, &mut img);

    assert_eq!(img.pixel(5, 5), [255, 0, 0, 255], "inside the clip");
    assert_eq!(img.pixel(15, 15), [255, 255, 255, 255], "clipped area shows background");
    assert!(
        scene
            .graph()
            .cache_filter(leaf)
            .expect("cache enabled")
            .is_valid(),
        "the re-rasterized cache is valid again"
    );
}

#[test]
fn rect_clip_fast_path_clips() {
    let img = reference_render(40, 40, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 40.0, 40.0), WHITE);
        let leaf = solid_leaf(graph, root, Rect::new(0.0, 0.0, 20.0, 20.0), RED);
        let (mask_content, _) = common::SolidRect::new(Rect::new(0.0, 0.0, 10.0, 10.0), WHITE);
        let mask = graph.create_leaf(Box::new(mask_content));
        graph.set_content_bounds(mask, Bounds::new(0.0, 0.0, 10.0, 10.0));
        graph.set_transformed_bounds(mask, Bounds::new(0.0, 0.0, 10.0, 10.0), false);
        graph.set_clip_node(leaf, Some(mask));
    });
    assert_eq!(img.pixel(5, 5), [255, 0, 0, 255]);
    assert_eq!(img.pixel(15, 5), [255, 255, 255, 255]);
    assert_eq!(img.pixel(5, 15), [255, 255, 255, 255]);
}

#[test]
fn rotated_clip_mask_composites() {
    let img = reference_render(40, 40, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 40.0, 40.0), WHITE);
        let leaf = solid_leaf(graph, root, Rect::new(0.0, 0.0, 20.0, 20.0), RED);
        let (mask_content, _) = common::SolidRect::new(Rect::new(0.0, 0.0, 10.0, 10.0), WHITE);
        let mask = graph.create_leaf(Box::new(mask_content));
        graph.set_content_bounds(mask, Bounds::new(0.0, 0.0, 10.0, 10.0));
        graph.set_transform(mask, Affine::rotate(0.3));
        graph.set_transformed_bounds(
            mask,
            Bounds::new(0.0, 0.0, 10.0, 10.0).transformed(Affine::rotate(0.3)),
            false,
        );
        graph.set_clip_node(leaf, Some(mask));
    });
    // (1.5, 1.5) maps back inside the rotated mask square; (9.5, 1.5)
    // maps below it.
    assert_eq!(img.pixel(1, 1), [255, 0, 0, 255], "inside rotated mask");
    assert_eq!(img.pixel(9, 1), [255, 255, 255, 255], "outside rotated mask");
    assert_eq!(img.pixel(25, 25), [255, 255, 255, 255], "far outside");
}

#[test]
fn group_opacity_flattens_overlap() {
    let img = reference_render(100, 60, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 100.0, 60.0), WHITE);
        let group = graph.create_group();
        graph.add_child(root, group);
        graph.set_content_bounds(group, Bounds::new(0.0, 0.0, 60.0, 40.0));
        graph.set_transformed_bounds(group, Bounds::new(0.0, 0.0, 60.0, 40.0), false);
        graph.set_opacity(group, 0.5);
        solid_leaf(graph, group, Rect::new(0.0, 0.0, 40.0, 40.0), RED);
        solid_leaf(graph, group, Rect::new(20.0, 0.0, 60.0, 40.0), BLUE);
    });
    // The group fades as one image: the overlap shows the top child at
    // half alpha over white, never red and blue blended separately.
    assert!(
        px_near(img.pixel(30, 10), [128, 128, 255, 255], 2),
        "overlap got {:?}",
        img.pixel(30, 10)
    );
    assert!(px_near(img.pixel(10, 10), [255, 128, 128, 255], 2));
    assert!(px_near(img.pixel(50, 10), [128, 128, 255, 255], 2));
    assert_eq!(img.pixel(80, 10), [255, 255, 255, 255]);
}

#[test]
fn blend_mode_isolates_siblings_then_composites() {
    let img = reference_render(100, 60, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 100.0, 60.0), WHITE);
        let group = graph.create_group();
        graph.add_child(root, group);
        graph.set_content_bounds(group, Bounds::new(0.0, 0.0, 60.0, 40.0));
        graph.set_transformed_bounds(group, Bounds::new(0.0, 0.0, 60.0, 40.0), false);
        graph.set_blend_mode(group, Some(BlendMode::Multiply));
        solid_leaf(graph, group, Rect::new(0.0, 0.0, 40.0, 40.0), RED);
        solid_leaf(graph, group, Rect::new(20.0, 0.0, 60.0, 40.0), BLUE);
    });
    // red x blue in the sibling overlap, then x white against the scene.
    assert!(px_near(img.pixel(30, 10), [0, 0, 0, 255], 2), "got {:?}", img.pixel(30, 10));
    assert!(px_near(img.pixel(10, 10), [255, 0, 0, 255], 2));
    assert!(px_near(img.pixel(50, 10), [0, 0, 255, 255], 2));
    assert_eq!(img.pixel(80, 10), [255, 255, 255, 255], "untouched scene");
}

#[test]
fn multiple_regions_render_with_culling() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 300.0, 50.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 300.0, 50.0), WHITE);
    let (left, left_color) =
        solid_leaf_shared(&mut graph, root, Rect::new(10.0, 10.0, 30.0, 30.0), RED);
    let (right, right_color) =
        solid_leaf_shared(&mut graph, root, Rect::new(250.0, 10.0, 270.0, 30.0), RED);
    let mut scene = Scene::new(graph, root);
    let mut img = render_frame(&mut scene, 300, 50);

    *left_color.lock().expect("lock") = GREEN;
    *right_color.lock().expect("lock") = BLUE;
    scene.graph_mut().geometry_changed(left);
    scene.graph_mut().geometry_changed(right);
    let painted = render_frame_onto(&mut scene, &mut img);
    assert_eq!(painted, 2, "two disjoint updates become two regions");

    let expected = reference_render(300, 50, |graph, root| {
        solid_leaf(graph, root, Rect::new(0.0, 0.0, 300.0, 50.0), WHITE);
        solid_leaf(graph, root, Rect::new(10.0, 10.0, 30.0, 30.0), GREEN);
        solid_leaf(graph, root, Rect::new(250.0, 10.0, 270.0, 30.0), BLUE);
    });
    assert!(img.pixels_equal(&expected));
}

// -- Allocation-failure degradation -------------------------------------

/// A target that refuses every surface allocation but otherwise behaves
/// like the raster backend.
struct NoSurfaces {
    inner: RasterImage,
}

impl RenderTarget for NoSurfaces {
    fn transform(&self) -> Affine {
        self.inner.transform()
    }
    fn set_transform(&mut self, tx: Affine) {
        self.inner.set_transform(tx);
    }
    fn clip_rect(&self) -> Option<Rect> {
        self.inner.clip_rect()
    }
    fn set_clip_rect(&mut self, clip: Option<Rect>) {
        self.inner.set_clip_rect(clip);
    }
    fn composite_mode(&self) -> CompositeMode {
        self.inner.composite_mode()
    }
    fn set_composite_mode(&mut self, mode: CompositeMode) {
        self.inner.set_composite_mode(mode);
    }
    fn extra_alpha(&self) -> f32 {
        self.inner.extra_alpha()
    }
    fn set_extra_alpha(&mut self, alpha: f32) {
        self.inner.set_extra_alpha(alpha);
    }
    fn depth_test(&self) -> bool {
        self.inner.depth_test()
    }
    fn set_depth_test(&mut self, enabled: bool) {
        self.inner.set_depth_test(enabled);
    }
    fn device_bounds(&self) -> Rect {
        self.inner.device_bounds()
    }
    fn fill(&mut self, geometry: &Geometry, paint: &Paint) {
        self.inner.fill(geometry, paint);
    }
    fn draw(&mut self, geometry: &Geometry, stroke: &Stroke, paint: &Paint) {
        self.inner.draw(geometry, stroke, paint);
    }
    fn create_surface(&mut self, _width: u32, _height: u32) -> Option<Box<dyn Surface>> {
        None
    }
    fn draw_surface(&mut self, src: &dyn Surface, dst_rect: Rect, src_rect: Rect) {
        self.inner.draw_surface(src, dst_rect, src_rect);
    }
    fn blend(
        &mut self,
        mode: BlendMode,
        bottom: &dyn Surface,
        top: &dyn Surface,
    ) -> Option<Box<dyn Surface>> {
        self.inner.blend(mode, bottom, top)
    }
}

#[test]
fn surface_exhaustion_drops_subtree_without_retry_storm() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, 100.0, 60.0);
    solid_leaf(&mut graph, root, Rect::new(0.0, 0.0, 100.0, 60.0), WHITE);
    // An opacity group with overlapping children needs an offscreen
    // surface, which this target cannot provide.
    let group = graph.create_group();
    graph.add_child(root, group);
    graph.set_content_bounds(group, Bounds::new(0.0, 0.0, 60.0, 40.0));
    graph.set_transformed_bounds(group, Bounds::new(0.0, 0.0, 60.0, 40.0), false);
    graph.set_opacity(group, 0.5);
    solid_leaf(&mut graph, group, Rect::new(0.0, 0.0, 40.0, 40.0), RED);
    solid_leaf(&mut graph, group, Rect::new(20.0, 0.0, 60.0, 40.0), BLUE);
    let sibling = solid_leaf(&mut graph, root, Rect::new(70.0, 10.0, 90.0, 30.0), GREEN);

    let mut scene = Scene::new(graph, root);
    let mut target = NoSurfaces {
        inner: RasterImage::new(100, 60),
    };
    let clip = Bounds::new(0.0, 0.0, 100.0, 60.0);
    let painted = scene.render_frame(
        &mut target,
        clip,
        &mut lamina_core::trace::Tracer::disabled(),
    );
    assert!(painted > 0, "the frame still paints what it can");

    // Siblings of the dropped subtree still rendered.
    assert_eq!(target.inner.pixel(80, 20), [0, 255, 0, 255]);
    assert_eq!(target.inner.pixel(5, 50), [255, 255, 255, 255]);
    // The group contributed nothing this frame.
    assert_eq!(target.inner.pixel(30, 10), [255, 255, 255, 255]);
    // And its dirty state was retired: the next frame is a no-op rather
    // than a retry storm.
    assert!(scene.graph().is_clean(sibling));
    let painted = scene.render_frame(
        &mut target,
        clip,
        &mut lamina_core::trace::Tracer::disabled(),
    );
    assert_eq!(painted, 0, "failed subtrees must not retry forever");
}
