// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conservativeness of `opaque_region`: whatever configuration a node is
//! in, a claimed opaque region must never overlap a pixel that renders
//! with anything less than full alpha.

mod common;

use common::{render_frame, solid_leaf_shared, viewport_root};
use kurbo::Rect;
use quickcheck::{QuickCheck, TestResult};

use lamina_core::bounds::Bounds;
use lamina_core::node::SceneGraph;
use lamina_core::scene::Scene;
use lamina_core::target::{BlendMode, Color};

const SIZE: u32 = 64;

fn blend_choice(pick: u8) -> Option<BlendMode> {
    match pick % 7 {
        0 => None,
        1 => Some(BlendMode::SrcOver),
        2 => Some(BlendMode::SrcIn),
        3 => Some(BlendMode::Multiply),
        4 => Some(BlendMode::Screen),
        5 => Some(BlendMode::Overlay),
        _ => Some(BlendMode::Add),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "region coordinates are clamped to the image size"
)]
fn assert_region_opaque(img: &lamina_backend_raster::RasterImage, region: Bounds) -> bool {
    let x0 = region.min_x().ceil().max(0.0) as u32;
    let y0 = region.min_y().ceil().max(0.0) as u32;
    let x1 = region.max_x().floor().min(f64::from(SIZE)) as u32;
    let y1 = region.max_y().floor().min(f64::from(SIZE)) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            if img.pixel(x, y)[3] != 255 {
                return false;
            }
        }
    }
    true
}

#[test]
fn opaque_region_never_overlaps_transparency() {
    fn prop(alpha: u8, opacity_q: u8, use_clip: bool, clip_w: u8, blend_pick: u8) -> TestResult {
        let mut graph = SceneGraph::new();
        let root = viewport_root(&mut graph, f64::from(SIZE), f64::from(SIZE));
        let color = Color::rgba(0.8, 0.2, 0.2, f32::from(alpha) / 255.0);
        let (leaf, _) = solid_leaf_shared(
            &mut graph,
            root,
            Rect::new(4.0, 4.0, 40.0, 40.0),
            color,
        );
        graph.set_opacity(leaf, f32::from(opacity_q % 101) / 100.0);
        graph.set_blend_mode(leaf, blend_choice(blend_pick));
        if use_clip {
            let w = f64::from(clip_w % 30 + 1);
            let (mask, _) = common::SolidRect::new(Rect::new(0.0, 0.0, w, w), Color::WHITE);
            let mask = {
                let m = graph.create_leaf(Box::new(mask));
                graph.set_content_bounds(m, Bounds::new(0.0, 0.0, w, w));
                graph.set_transformed_bounds(m, Bounds::new(0.0, 0.0, w, w), false);
                m
            };
            graph.set_clip_node(leaf, Some(mask));
        }

        let claimed = graph.opaque_region(leaf);
        let mut scene = Scene::new(graph, root);
        let img = render_frame(&mut scene, SIZE, SIZE);

        match claimed {
            // No claim is always conservative.
            None => TestResult::passed(),
            Some(region) => {
                // The claim is in the leaf's local space; its transform
                // translates (4, 4), already folded into the synced rect.
                let device = region.translated(4.0, 4.0);
                TestResult::from_bool(assert_region_opaque(&img, device))
            }
        }
    }
    QuickCheck::new()
        .tests(400)
        .quickcheck(prop as fn(u8, u8, bool, u8, u8) -> TestResult);
}

#[test]
fn fully_opaque_leaf_claims_a_region() {
    let mut graph = SceneGraph::new();
    let root = viewport_root(&mut graph, f64::from(SIZE), f64::from(SIZE));
    let (leaf, _) = solid_leaf_shared(
        &mut graph,
        root,
        Rect::new(4.0, 4.0, 40.0, 40.0),
        Color::rgb(0.8, 0.2, 0.2),
    );
    assert_eq!(
        graph.opaque_region(leaf),
        Some(Bounds::new(0.0, 0.0, 36.0, 36.0)),
        "the baseline configuration must not lose its opaque region"
    );
    let mut scene = Scene::new(graph, root);
    let img = render_frame(&mut scene, SIZE, SIZE);
    assert!(assert_region_opaque(&img, Bounds::new(4.0, 4.0, 40.0, 40.0)));
}
