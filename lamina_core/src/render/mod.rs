// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The layered rendering walk.
//!
//! For every node the walk applies, in this fixed order from the outside
//! in: transform → blend-mode isolation → opacity isolation → cache →
//! clip → effect → content. Exactly one of the isolation branches runs
//! per node; each one re-enters the chain one step further in, so the
//! order is enforced by the dispatch itself rather than by callers. The
//! clip sits below the cache so a cached raster already contains its
//! mask.
//!
//! Isolation steps that must read back destination pixels (blend modes)
//! or flatten a subtree (opacity, mask clips, caches) render into
//! temporary surfaces sized to the current clip rectangle and composite
//! the result back. Any surface-allocation failure abandons that node's
//! contribution for this frame: the subtree's dirty flags are cleared as
//! if it had painted (avoiding a retry storm) and the walk continues with
//! its siblings. Nothing in this module reports errors upward; a dropped
//! contribution is the recovery.

pub mod cache;
pub mod effect;

use kurbo::{Affine, Rect};

use crate::bounds::Bounds;
use crate::cull::{NodePath, REGION_CONTAINS, REGION_CONTAINS_OR_INTERSECTS};
use crate::node::{INVALID, NodeId, SceneGraph};
use crate::target::{BlendMode, Color, CompositeMode, Geometry, Paint, RenderTarget};
use crate::transform;

/// Per-pass state carried alongside the render target.
///
/// The target owns paint state (transform, clip, alpha); the context owns
/// walk state: which dirty region this pass serves, whether culling bits
/// apply, the render-root path being consumed, and visit counters.
#[derive(Debug, Default)]
pub struct RenderContext {
    /// Index of the dirty region this pass is painting (selects the
    /// culling-bit pair).
    pub clip_index: usize,
    /// Whether per-node culling bits should gate the walk.
    pub has_culling_bits: bool,
    /// Render-root path for this pass, consumed while descending.
    pub path: Option<NodePath>,
    /// Nodes visited by the walk.
    pub nodes_visited: u64,
    /// Nodes that reached a paint branch.
    pub nodes_rendered: u64,
}

impl RenderContext {
    /// A context with no culling and no render-root path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A derived context for rendering into an offscreen surface:
    /// inherits culling state, never a path.
    fn sub(&self) -> Self {
        Self {
            clip_index: self.clip_index,
            has_culling_bits: self.has_culling_bits,
            path: None,
            nodes_visited: 0,
            nodes_rendered: 0,
        }
    }

    fn absorb(&mut self, sub: Self) {
        self.nodes_visited += sub.nodes_visited;
        self.nodes_rendered += sub.nodes_rendered;
    }
}

/// The device-space clip currently limiting draws on `g`.
fn device_clip(g: &dyn RenderTarget) -> Bounds {
    match g.clip_rect() {
        Some(rect) => Bounds::from_rect(rect),
        None => Bounds::from_rect(g.device_bounds()),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "dimensions are clamped non-negative and ceiled before the cast"
)]
fn surface_size(rect: Bounds) -> (u32, u32) {
    let w = rect.width().ceil().max(0.0) as u32;
    let h = rect.height().ceil().max(0.0) as u32;
    (w, h)
}

/// The transform that renders device-space content into a surface whose
/// origin sits at `origin_x, origin_y` in device space.
fn into_surface(origin: Bounds, device_tx: Affine) -> Affine {
    Affine::translate((-origin.min_x(), -origin.min_y())) * device_tx
}

impl SceneGraph {
    /// Renders the tree from `root` into `g`. This is the entry point for
    /// both a whole-scene pass and a branch re-render; group content
    /// rendering calls it per child.
    pub fn render(&mut self, root: NodeId, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let idx = self.check(root);
        self.render_node(idx, g, ctx);
    }

    pub(crate) fn render_node(
        &mut self,
        idx: u32,
        g: &mut dyn RenderTarget,
        ctx: &mut RenderContext,
    ) {
        ctx.nodes_visited += 1;
        // This node is now being handled; whatever happens below, it must
        // not be re-reported next frame.
        self.clear_dirty_at(idx);
        if !self.slots[idx as usize].visible || self.slots[idx as usize].opacity == 0.0 {
            return;
        }
        self.do_render(idx, g, ctx);
    }

    fn do_render(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let mut culling_turned_off = false;
        if ctx.has_culling_bits {
            let bits = self.slots[idx as usize].culling_bits >> (ctx.clip_index * 2);
            if bits & REGION_CONTAINS_OR_INTERSECTS == 0 {
                return;
            }
            if bits & REGION_CONTAINS != 0 {
                // Fully inside the region: nothing below was classified,
                // and nothing below can be culled.
                ctx.has_culling_bits = false;
                culling_turned_off = true;
            }
        }

        let prev_depth_test = g.depth_test();
        g.set_depth_test(self.slots[idx as usize].depth_test);
        let prev_tx = g.transform();
        g.concat_transform(self.slots[idx as usize].transform);

        let slot = &self.slots[idx as usize];
        let has_cache = slot.cache.is_some();
        let has_clip = slot.clip != INVALID;
        let has_effect = slot.effect.is_some();
        let opacity = slot.opacity;

        if g.supports_readback() && self.needs_blending(idx) {
            self.render_node_blend_mode(idx, g, ctx);
        } else if opacity < 1.0 {
            self.render_opacity(idx, g, ctx);
        } else if has_cache {
            self.render_cached(idx, g, ctx);
        } else if has_clip {
            self.render_clip(idx, g, ctx);
        } else if has_effect {
            self.render_effect(idx, g, ctx);
        } else {
            self.render_content(idx, g, ctx);
        }
        ctx.nodes_rendered += 1;

        if culling_turned_off {
            ctx.has_culling_bits = true;
        }
        g.set_transform(prev_tx);
        g.set_depth_test(prev_depth_test);
    }

    /// Whether this node's blend mode needs destination readback. A bare
    /// `SrcOver` still forces sibling flattening in groups, but composites
    /// into the background like the default.
    pub(crate) fn needs_blending(&self, idx: u32) -> bool {
        !matches!(
            self.slots[idx as usize].blend_mode,
            None | Some(BlendMode::SrcOver)
        )
    }

    // -- Blend-mode isolation ---------------------------------------------

    fn render_node_blend_mode(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let cur_tx = g.transform();
        let clip_bounds = self.clipped_bounds_under(idx, cur_tx);
        if clip_bounds.is_empty() {
            self.clear_dirty_tree_at(idx);
            return;
        }
        let clip_rect = clip_bounds.intersection(device_clip(g));
        if clip_rect.is_empty() {
            self.clear_dirty_tree_at(idx);
            return;
        }
        let (w, h) = surface_size(clip_rect);

        // Render this node's (otherwise fully decorated) content into an
        // isolated surface.
        let Some(mut content_img) = g.create_surface(w, h) else {
            self.clear_dirty_tree_at(idx);
            return;
        };
        content_img.set_transform(into_surface(clip_rect, cur_tx));
        let mut sub = ctx.sub();
        {
            let target: &mut dyn RenderTarget = &mut *content_img;
            if self.slots[idx as usize].opacity < 1.0 {
                self.render_opacity(idx, target, &mut sub);
            } else if self.slots[idx as usize].cache.is_some() {
                self.render_cached(idx, target, &mut sub);
            } else if self.slots[idx as usize].clip != INVALID {
                self.render_clip(idx, target, &mut sub);
            } else if self.slots[idx as usize].effect.is_some() {
                self.render_effect(idx, target, &mut sub);
            } else {
                self.render_content(idx, target, &mut sub);
            }
        }
        ctx.absorb(sub);

        // Blend against the already-rendered destination and write the
        // result straight back.
        let mode = self.slots[idx as usize]
            .blend_mode
            .expect("needs_blending checked a mode is present");
        let Some(background) = g.read_back(clip_rect.to_rect()) else {
            self.clear_dirty_tree_at(idx);
            return;
        };
        let Some(result) = g.blend(mode, &*background, &*content_img) else {
            self.clear_dirty_tree_at(idx);
            return;
        };
        let prev_mode = g.composite_mode();
        g.set_transform(Affine::IDENTITY);
        g.set_composite_mode(CompositeMode::Src);
        let src = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
        g.draw_surface(&*result, clip_rect.to_rect(), src);
        g.set_composite_mode(prev_mode);
        // Transform state is restored by do_render.
    }

    // -- Opacity isolation -------------------------------------------------

    fn render_opacity(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let slot = &self.slots[idx as usize];
        // A filter further in will flatten the subtree anyway, and
        // non-overlapping content can simply scale alpha in place.
        if slot.effect.is_some()
            || slot.cache.is_some()
            || slot.clip != INVALID
            || !self.has_overlapping_contents_at(idx)
        {
            let extra = g.extra_alpha();
            g.set_extra_alpha(extra * self.slots[idx as usize].opacity);
            if self.slots[idx as usize].cache.is_some() {
                self.render_cached(idx, g, ctx);
            } else if self.slots[idx as usize].clip != INVALID {
                self.render_clip(idx, g, ctx);
            } else if self.slots[idx as usize].effect.is_some() {
                self.render_effect(idx, g, ctx);
            } else {
                self.render_content(idx, g, ctx);
            }
            g.set_extra_alpha(extra);
            return;
        }

        // Overlapping content: flatten through an offscreen surface so
        // the group fades as one image.
        let cur_tx = g.transform();
        let bounds = self
            .content_bounds_under(idx, cur_tx)
            .intersection(device_clip(g));
        if bounds.is_empty() {
            return;
        }
        let (w, h) = surface_size(bounds);
        let Some(mut img) = g.create_surface(w, h) else {
            self.clear_dirty_tree_at(idx);
            return;
        };
        img.set_transform(into_surface(bounds, cur_tx));
        let mut sub = ctx.sub();
        self.render_content(idx, &mut *img, &mut sub);
        ctx.absorb(sub);

        g.set_transform(Affine::IDENTITY);
        let extra = g.extra_alpha();
        g.set_extra_alpha(extra * self.slots[idx as usize].opacity);
        let src = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
        g.draw_surface(&*img, bounds.to_rect(), src);
        g.set_extra_alpha(extra);
    }

    // -- Cache -------------------------------------------------------------

    fn render_cached(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let Some(mut filter) = self.slots[idx as usize].cache.take() else {
            self.render_content(idx, g, ctx);
            return;
        };
        let cur_tx = g.transform();

        // Try the in-place scroll for translated descendants first.
        if let Some((dx, dy)) = filter.pending_scroll() {
            if !self.try_scroll_cache(idx, &mut filter, (dx, dy), cur_tx, ctx) {
                filter.invalidate();
            } else {
                filter.clear_pending_scroll();
            }
        }

        if !filter.is_reusable_for(cur_tx) && !self.fill_cache(idx, &mut filter, g, cur_tx, ctx) {
            // Could not rasterize the subtree; drop this frame's
            // contribution.
            self.clear_dirty_tree_at(idx);
            self.slots[idx as usize].cache = Some(filter);
            return;
        }

        // Blit the cached raster through whatever delta the hint allowed.
        let delta = transform::try_invert(filter.cached_transform()).map(|inv| cur_tx * inv);
        if let (Some(delta), Some(img)) = (delta, filter.image()) {
            g.set_transform(delta);
            let rect = filter.cached_rect();
            let src = Rect::new(0.0, 0.0, f64::from(img.width()), f64::from(img.height()));
            g.draw_surface(img, rect, src);
        }
        self.slots[idx as usize].cache = Some(filter);
    }

    /// Renders the node's subtree (clip and effect included) into a fresh
    /// cache raster. Returns false on allocation failure.
    fn fill_cache(
        &mut self,
        idx: u32,
        filter: &mut cache::CacheFilter,
        g: &mut dyn RenderTarget,
        cur_tx: Affine,
        ctx: &mut RenderContext,
    ) -> bool {
        // The raster covers the full node footprint, not just the current
        // clip, so later exposure reuses it.
        let bounds = self.clipped_bounds_under(idx, cur_tx).padded(1.0);
        if bounds.is_empty() {
            return false;
        }
        let (w, h) = surface_size(bounds);
        let Some(mut img) = g.create_surface(w, h) else {
            return false;
        };
        img.set_transform(into_surface(bounds, cur_tx));
        // The cache must be complete: culling gates do not apply inside.
        let mut sub = RenderContext::new();
        self.render_below_cache(idx, &mut *img, &mut sub);
        ctx.absorb(sub);
        filter.store(img, cur_tx, bounds.to_rect());
        true
    }

    /// The dispatch chain below the cache step: clip → effect → content.
    fn render_below_cache(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        if self.slots[idx as usize].clip != INVALID {
            self.render_clip(idx, g, ctx);
        } else if self.slots[idx as usize].effect.is_some() {
            self.render_effect(idx, g, ctx);
        } else {
            self.render_content(idx, g, ctx);
        }
    }

    /// Scrolls the cached raster by a whole-pixel delta and repaints only
    /// the exposed strips. Returns false when the conditions for a sound
    /// scroll do not hold.
    fn try_scroll_cache(
        &mut self,
        idx: u32,
        filter: &mut cache::CacheFilter,
        local_delta: (f64, f64),
        cur_tx: Affine,
        ctx: &mut RenderContext,
    ) -> bool {
        if !filter.is_valid() || cur_tx != filter.cached_transform() {
            return false;
        }
        // The recorded delta is in the cached node's local space; map it
        // through the cached linear part to device pixels.
        let [a, b, c, d, _, _] = filter.cached_transform().as_coeffs();
        let ddx = a * local_delta.0 + c * local_delta.1;
        let ddy = b * local_delta.0 + d * local_delta.1;
        if ddx.fract() != 0.0 || ddy.fract() != 0.0 {
            return false;
        }
        let rect = filter.cached_rect();
        let paint_tx = into_surface(Bounds::from_rect(rect), filter.cached_transform());
        let Some(img) = filter.image_mut() else {
            return false;
        };
        let (w, h) = (img.width(), img.height());
        #[expect(
            clippy::cast_possible_truncation,
            reason = "fract()==0 guaranteed these are whole numbers"
        )]
        let (sdx, sdy) = (ddx as i32, ddy as i32);
        if sdx.unsigned_abs() >= w || sdy.unsigned_abs() >= h {
            return false;
        }
        if !img.scroll_by(sdx, sdy) {
            return false;
        }

        // Exposed strips: the side the content moved away from.
        let mut strips: Vec<Rect> = Vec::new();
        let (wf, hf) = (f64::from(w), f64::from(h));
        if ddx > 0.0 {
            strips.push(Rect::new(0.0, 0.0, ddx, hf));
        } else if ddx < 0.0 {
            strips.push(Rect::new(wf + ddx, 0.0, wf, hf));
        }
        if ddy > 0.0 {
            strips.push(Rect::new(0.0, 0.0, wf, ddy));
        } else if ddy < 0.0 {
            strips.push(Rect::new(0.0, hf + ddy, wf, hf));
        }

        for strip in strips {
            let Some(img) = filter.image_mut() else {
                return false;
            };
            img.set_clip_rect(Some(strip));
            // Clear the scrolled-in garbage, then repaint the strip.
            img.set_transform(Affine::IDENTITY);
            img.set_composite_mode(CompositeMode::Src);
            img.fill(&Geometry::Rect(strip), &Paint::Solid(Color::TRANSPARENT));
            img.set_composite_mode(CompositeMode::SrcOver);
            img.set_transform(paint_tx);
            let mut sub = RenderContext::new();
            self.render_below_cache(idx, &mut *filter.image_mut().expect("image checked"), &mut sub);
            ctx.absorb(sub);
            if let Some(img) = filter.image_mut() {
                img.set_clip_rect(None);
            }
        }
        true
    }

    // -- Clip --------------------------------------------------------------

    fn render_clip(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let clip_idx = self.slots[idx as usize].clip;
        debug_assert!(clip_idx != INVALID);
        // A fully transparent mask shows nothing.
        if self.slots[clip_idx as usize].opacity == 0.0 {
            self.clear_dirty_tree_at(idx);
            return;
        }
        let cur_tx = g.transform();
        let clip_bounds = self.clipped_bounds_under(idx, cur_tx);
        if clip_bounds.is_empty() {
            self.clear_dirty_tree_at(idx);
            return;
        }

        // Axis-aligned opaque rectangle masks become a device clip rect.
        if self.slots[clip_idx as usize].opacity == 1.0
            && self.slots[clip_idx as usize].effect.is_none()
        {
            let mask_rect = self.slots[clip_idx as usize]
                .content
                .as_ref()
                .and_then(|c| c.rect_clip());
            if let Some(local_rect) = mask_rect {
                let total = cur_tx * self.slots[clip_idx as usize].transform;
                if transform::is_axis_aligned(total) {
                    self.render_rect_clip(idx, clip_idx, local_rect, total, g, ctx);
                    return;
                }
            }
        }

        // General mask: flatten content and mask, combine with SrcIn.
        let clip_rect = clip_bounds.intersection(device_clip(g));
        if clip_rect.is_empty() {
            self.clear_dirty_tree_at(idx);
            return;
        }
        let (w, h) = surface_size(clip_rect);
        let Some(mut content_img) = g.create_surface(w, h) else {
            self.clear_dirty_tree_at(idx);
            return;
        };
        content_img.set_extra_alpha(g.extra_alpha());
        content_img.set_transform(into_surface(clip_rect, cur_tx));
        let mut sub = ctx.sub();
        self.render_for_clip(idx, &mut *content_img, &mut sub);

        let Some(mut clip_img) = g.create_surface(w, h) else {
            self.clear_dirty_tree_at(clip_idx);
            ctx.absorb(sub);
            return;
        };
        clip_img.set_transform(into_surface(clip_rect, cur_tx));
        self.render_node(clip_idx, &mut *clip_img, &mut sub);
        ctx.absorb(sub);

        let Some(result) = g.blend(BlendMode::SrcIn, &*clip_img, &*content_img) else {
            self.clear_dirty_tree_at(idx);
            return;
        };
        g.set_transform(Affine::IDENTITY);
        let src = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
        g.draw_surface(&*result, clip_rect.to_rect(), src);
        // Transform state is restored by do_render.
    }

    fn render_rect_clip(
        &mut self,
        idx: u32,
        clip_idx: u32,
        local_rect: Rect,
        total_tx: Affine,
        g: &mut dyn RenderTarget,
        ctx: &mut RenderContext,
    ) {
        let new_clip = Bounds::from_rect(local_rect)
            .transformed(total_tx)
            .intersection(device_clip(g));
        if new_clip.is_empty() || new_clip.width() == 0.0 || new_clip.height() == 0.0 {
            self.clear_dirty_tree_at(idx);
            return;
        }
        let saved = g.clip_rect();
        g.set_clip_rect(Some(new_clip.to_rect()));
        self.render_for_clip(idx, g, ctx);
        g.set_clip_rect(saved);
        // render() never runs on the mask in this path; retire its flags
        // here.
        self.clear_dirty_tree_at(clip_idx);
    }

    fn render_for_clip(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        if self.slots[idx as usize].effect.is_some() {
            self.render_effect(idx, g, ctx);
        } else {
            self.render_content(idx, g, ctx);
        }
    }

    // -- Effect ------------------------------------------------------------

    fn render_effect(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let Some(mut filter) = self.slots[idx as usize].effect.take() else {
            self.render_content(idx, g, ctx);
            return;
        };
        let mut sub = ctx.sub();
        {
            let graph = &mut *self;
            filter.render(g, &mut |target| {
                graph.render_content(idx, target, &mut sub);
            });
        }
        ctx.absorb(sub);
        self.slots[idx as usize].effect = Some(filter);
    }

    // -- Content -----------------------------------------------------------

    fn render_content(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        if self.slots[idx as usize].content.is_some() {
            let mut content = self.slots[idx as usize]
                .content
                .take()
                .expect("presence checked above");
            content.render(g);
            self.slots[idx as usize].content = Some(content);
        } else {
            self.render_group_content(idx, g, ctx);
        }
    }

    fn render_group_content(&mut self, idx: u32, g: &mut dyn RenderTarget, ctx: &mut RenderContext) {
        let n = self.effective_child_count(idx);

        // Consume the render-root path: children painted beneath the path
        // child are occluded and skipped (with their dirty state retired).
        let mut start = 0;
        let mut on_path = false;
        if let Some(path) = ctx.path.as_mut() {
            if path.has_next() {
                path.next();
                let current = self.check(path.current());
                start = (0..n)
                    .find(|&i| self.effective_child_at(idx, i) == current)
                    .unwrap_or(0);
                on_path = true;
            } else {
                ctx.path = None;
            }
        }
        if on_path {
            for i in 0..start {
                let skipped = self.effective_child_at(idx, i);
                self.clear_dirty_tree_at(skipped);
            }
        }

        let blend = self.slots[idx as usize].blend_mode;
        if blend.is_none() || n < 2 {
            for i in start..n {
                let child = self.effective_child_at(idx, i);
                self.render_node(child, g, ctx);
            }
            return;
        }
        self.render_blended_children(idx, blend.expect("checked above"), g, ctx);
    }

    /// Sibling isolation for a group with an explicit blend mode: each
    /// child is flattened on its own and the accumulation happens with
    /// explicit image blends, because the mode is meaningful *between*
    /// siblings, not against whatever was painted before the group.
    fn render_blended_children(
        &mut self,
        idx: u32,
        mode: BlendMode,
        g: &mut dyn RenderTarget,
        ctx: &mut RenderContext,
    ) {
        let clip_rect = device_clip(g);
        if clip_rect.is_empty() {
            self.clear_dirty_tree_at(idx);
            return;
        }
        let (w, h) = surface_size(clip_rect);
        let cur_tx = g.transform();
        let n = self.effective_child_count(idx);

        // Rebuild from scratch whenever an intermediate surface was lost
        // to a device reset; a stable pass exits the loop.
        'rebuild: loop {
            let Some(mut acc) = g.create_surface(w, h) else {
                self.clear_dirty_tree_at(idx);
                return;
            };
            for i in 0..n {
                let child = self.effective_child_at(idx, i);
                if i == 0 {
                    acc.set_transform(into_surface(clip_rect, cur_tx));
                    let mut sub = ctx.sub();
                    self.render_node(child, &mut *acc, &mut sub);
                    ctx.absorb(sub);
                    continue;
                }
                let Some(mut layer) = g.create_surface(w, h) else {
                    // This sibling's contribution is dropped for the
                    // frame.
                    self.clear_dirty_tree_at(child);
                    continue;
                };
                layer.set_transform(into_surface(clip_rect, cur_tx));
                let mut sub = ctx.sub();
                self.render_node(child, &mut *layer, &mut sub);
                ctx.absorb(sub);
                if layer.is_lost() || acc.is_lost() {
                    continue 'rebuild;
                }
                match g.blend(mode, &*acc, &*layer) {
                    Some(blended) => acc = blended,
                    None => continue,
                }
            }
            if acc.is_lost() {
                continue 'rebuild;
            }
            g.set_transform(Affine::IDENTITY);
            let src = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
            g.draw_surface(&*acc, clip_rect.to_rect(), src);
            g.set_transform(cur_tx);
            return;
        }
    }
}
