// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-region accumulation.
//!
//! One traversal per frame turns the dirty flags left by the setters into
//! a bounded list of device-space rectangles outside of which nothing
//! needs redrawing. The walk follows the `child_dirty` breadcrumbs: a
//! clean subtree returns immediately, a dirty node contributes its
//! (previous ∪ current) bounds, and a clean group with dirty descendants
//! recurses.
//!
//! Everything is clipped against the rectangle passed in from above —
//! tightened by a group's own clip node on the way down — so dirt that
//! cannot be visible never reaches the output. When a contribution covers
//! the entire incoming clip the walk short-circuits with
//! [`AccumulateStatus::CoversClip`]: no finer answer is achievable, and
//! callers may stop refining. Effect groups detour through local space:
//! their children accumulate against an inverse-transformed clip, the
//! effect dilates the collected regions, and only then is the transform
//! re-applied.
//!
//! The accumulated transform is passed down by value; there is no
//! save/restore protocol.

use kurbo::Affine;

use crate::bounds::{Bounds, DIRTY_REGION_PADDING};
use crate::node::{DIRTY_CHILDREN_ACCUMULATED_THRESHOLD, DirtyFlag, INVALID, NodeId, SceneGraph};
use crate::region::{DirtyRegionContainer, DirtyRegionPool};
use crate::transform;

/// Result of accumulating one subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulateStatus {
    /// Contributions (possibly none) were appended to the container.
    Ok,
    /// The subtree's dirt covers the entire incoming clip; the clip
    /// itself is the dirty region and no more detail is achievable.
    CoversClip,
}

impl SceneGraph {
    /// Accumulates the dirty regions of the tree rooted at `root` into
    /// `out`, clipped to `clip` (device space). `tx` is the accumulated
    /// transform up to but not including `root`'s own transform.
    ///
    /// On [`AccumulateStatus::CoversClip`] the caller should treat `clip`
    /// itself as the dirty region; the container contents are then
    /// irrelevant.
    pub fn accumulate_dirty_regions(
        &mut self,
        root: NodeId,
        clip: Bounds,
        pool: &mut DirtyRegionPool,
        out: &mut DirtyRegionContainer,
        tx: Affine,
    ) -> AccumulateStatus {
        let idx = self.check(root);
        self.accumulate_at(idx, clip, pool, out, tx)
    }

    fn accumulate_at(
        &mut self,
        idx: u32,
        clip: Bounds,
        pool: &mut DirtyRegionPool,
        out: &mut DirtyRegionContainer,
        tx: Affine,
    ) -> AccumulateStatus {
        // A node with zero visibility or opacity still contributes: it may
        // have been visible last frame, and the setters only mark what can
        // matter. Dirty flags are trusted as-is here.
        if self.is_clean_at(idx) {
            return AccumulateStatus::Ok;
        }
        if self.slots[idx as usize].dirty != DirtyFlag::Clean {
            self.accumulate_node_at(idx, clip, out, tx)
        } else {
            debug_assert!(self.slots[idx as usize].child_dirty);
            self.accumulate_group_at(idx, clip, pool, out, tx)
        }
    }

    /// Contributes this single node's dirty bounds.
    fn accumulate_node_at(
        &mut self,
        idx: u32,
        clip: Bounds,
        out: &mut DirtyRegionContainer,
        tx: Affine,
    ) -> AccumulateStatus {
        let region = self.compute_dirty_region_at(idx, tx);
        if region.is_empty() || clip.disjoint(region) {
            return AccumulateStatus::Ok;
        }
        if region.contains(clip) {
            return AccumulateStatus::CoversClip;
        }
        out.add_dirty_region(region.intersection(clip));
        AccumulateStatus::Ok
    }

    /// This node's dirty footprint in device space: the union of previous
    /// and current transformed bounds, padded for rasterization slop.
    fn compute_dirty_region_at(&self, idx: u32, tx: Affine) -> Bounds {
        let slot = &self.slots[idx as usize];
        if let Some(filter) = &slot.cache {
            return filter.compute_dirty_bounds(slot.dirty_bounds, slot.transformed_bounds, tx);
        }
        // Empty dirty bounds mean the bounds did not change; fall back to
        // the current transformed bounds (a clip-exceeded group lands
        // here).
        let region = if slot.dirty_bounds.is_empty() {
            slot.transformed_bounds
        } else {
            slot.dirty_bounds
        };
        if region.is_empty() {
            return region;
        }
        region.padded(DIRTY_REGION_PADDING).transformed(tx)
    }

    /// Recurses into a clean group with dirty descendants.
    fn accumulate_group_at(
        &mut self,
        idx: u32,
        clip: Bounds,
        pool: &mut DirtyRegionPool,
        out: &mut DirtyRegionContainer,
        tx: Affine,
    ) -> AccumulateStatus {
        // Too many dirty children: per-child precision no longer pays.
        // Treat the whole group as one dirty node.
        if self.slots[idx as usize].dirty_children_accumulated
            > DIRTY_CHILDREN_ACCUMULATED_THRESHOLD
        {
            return self.accumulate_node_at(idx, clip, out, tx);
        }

        let render_tx = tx * self.slots[idx as usize].transform;
        let has_effect = self.slots[idx as usize].effect.is_some();
        let clip_idx = self.slots[idx as usize].clip;

        if has_effect {
            // Work in local space: children accumulate against the
            // inverse-transformed clip, the effect's own dirty-region
            // mapping runs on the local regions, and the transform is
            // re-applied afterwards.
            let Some(inv) = transform::try_invert(render_tx) else {
                // Degenerate transform: the subtree projects to nothing.
                return AccumulateStatus::Ok;
            };
            let my_clip = clip.transformed(inv);
            let mut scratch = pool.check_out();
            let status =
                self.accumulate_children(idx, my_clip, pool, &mut scratch, Affine::IDENTITY);
            if status == AccumulateStatus::Ok {
                if let Some(filter) = &self.slots[idx as usize].effect {
                    filter.map_dirty_regions(&mut scratch);
                }
                if clip_idx != INVALID {
                    let clip_bounds = self.complete_bounds_under(clip_idx, Affine::IDENTITY);
                    apply_clip_to_regions(clip_bounds, &mut scratch);
                }
                apply_transform_to_regions(render_tx, &mut scratch);
                out.merge(&scratch);
            }
            pool.check_in(scratch);
            return status;
        }

        if clip_idx != INVALID {
            // Tighten the incoming clip by the clip node's footprint so
            // dirt that can never show through is dropped here. If the
            // children's dirt exceeds even the tightened clip, fall back
            // to treating this group's own bounds as the dirty region.
            let clip_bounds = self.complete_bounds_under(clip_idx, render_tx);
            let my_clip = clip_bounds.intersection(clip);
            let mut scratch = pool.check_out();
            let mut status = self.accumulate_children(idx, my_clip, pool, &mut scratch, render_tx);
            if status == AccumulateStatus::CoversClip {
                status = self.accumulate_node_at(idx, clip, out, tx);
            } else {
                out.merge(&scratch);
            }
            pool.check_in(scratch);
            return status;
        }

        self.accumulate_children(idx, clip, pool, out, render_tx)
    }

    /// Accumulates removed children first (forced dirty, so their former
    /// footprint is covered), then the live children in render order.
    fn accumulate_children(
        &mut self,
        idx: u32,
        clip: Bounds,
        pool: &mut DirtyRegionPool,
        out: &mut DirtyRegionContainer,
        child_tx: Affine,
    ) -> AccumulateStatus {
        let mut status = AccumulateStatus::Ok;

        let removed = self.slots[idx as usize].removed.clone();
        for &r in removed.iter().rev() {
            self.slots[r as usize].dirty = DirtyFlag::Dirty;
            status = self.accumulate_at(r, clip, pool, out, child_tx);
            if status == AccumulateStatus::CoversClip {
                return status;
            }
        }

        for i in 0..self.effective_child_count(idx) {
            let child = self.effective_child_at(idx, i);
            status = self.accumulate_at(child, clip, pool, out, child_tx);
            if status == AccumulateStatus::CoversClip {
                return status;
            }
        }
        status
    }
}

/// Maps every region through `tx`, dropping degenerate results.
fn apply_transform_to_regions(tx: Affine, regions: &mut DirtyRegionContainer) {
    let mut i = 0;
    while i < regions.size() {
        let mapped = regions.region(i).transformed(tx);
        regions.set_region(i, mapped);
        if !regions.check_and_clear_region(i) {
            i += 1;
        }
    }
}

/// Intersects every region with `clip`, dropping the ones clipped away.
fn apply_clip_to_regions(clip: Bounds, regions: &mut DirtyRegionContainer) {
    let mut i = 0;
    while i < regions.size() {
        let clipped = regions.region(i).intersection(clip);
        regions.set_region(i, clipped);
        if !regions.check_and_clear_region(i) {
            i += 1;
        }
    }
}
