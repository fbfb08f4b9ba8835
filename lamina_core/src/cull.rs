// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pre-culling bits and render-root (occlusion) search.
//!
//! **Culling bits.** Before rendering, every node is classified against
//! each dirty region with a 2-bit code packed into a `u32`:
//! `01` intersects, `10` fully inside, `00` outside. A `u32` holds 15
//! regions of 2 bits (one pair spare), which is where the container cap
//! comes from. Children are only classified while their parent
//! *intersects* a region: once a group is fully inside, the render walk
//! disables the checks for the whole subtree instead, so the children's
//! codes would never be read. A subtree that lands outside every region
//! gets its dirty flags cleared on the spot — it will not be painted, and
//! leaving the flags set would retry it forever.
//!
//! **Render root.** For each dirty region, the search walks front-to-back
//! (topmost child first) looking for the deepest node whose opaque region
//! covers the whole region; painting can then start there, skipping
//! everything beneath. The search never descends into a group that
//! isolates its children (opacity, blend, clip, effect, cache) — starting
//! inside such a group would bypass the isolation. Returning no root is
//! always safe and merely means painting starts at the true root; finding
//! a *clean* root with nothing dirty above it means nothing needs painting
//! at all.

use kurbo::{Affine, Point};

use crate::bounds::Bounds;
use crate::node::{DirtyFlag, INVALID, NodeId, SceneGraph};
use crate::region::DirtyRegionContainer;
use crate::transform;

/// Culling code bit: the dirty region intersects the node's bounds.
pub(crate) const REGION_INTERSECTS: u32 = 0x1;
/// Culling code bit: the dirty region fully contains the node's bounds.
pub(crate) const REGION_CONTAINS: u32 = 0x2;
/// Either classification bit.
pub(crate) const REGION_CONTAINS_OR_INTERSECTS: u32 = REGION_INTERSECTS | REGION_CONTAINS;

/// Result of searching one subtree for a render root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderRootResult {
    /// No node in this subtree occludes the whole dirty region.
    None,
    /// A render root was found (and something above it needs painting).
    Found,
    /// A render root was found, it is clean, and nothing painted above it
    /// is dirty — the frame needs no painting for this region.
    FoundAndClean,
}

/// The path from a render root up to the tree root, consumed by the
/// render walk to skip everything painted beneath the root.
///
/// Nodes are appended deepest-first while the search unwinds, so the tree
/// root is the *last* element. [`reset`](Self::reset) points the cursor
/// at the root; each group on the path calls [`next`](Self::next) to step
/// one level deeper.
#[derive(Clone, Debug, Default)]
pub struct NodePath {
    nodes: Vec<NodeId>,
    position: usize,
}

impl NodePath {
    /// Creates an empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node (search-order: deepest first).
    pub fn add(&mut self, node: NodeId) {
        self.nodes.push(node);
    }

    /// Whether the path is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes on the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Points the cursor at the tree root.
    pub fn reset(&mut self) {
        self.position = self.nodes.len().saturating_sub(1);
    }

    /// Whether a deeper node follows the cursor.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.position > 0
    }

    /// Steps the cursor one node deeper.
    pub fn next(&mut self) {
        debug_assert!(self.position > 0, "stepped past the end of a NodePath");
        self.position -= 1;
    }

    /// The node under the cursor.
    #[must_use]
    pub fn current(&self) -> NodeId {
        self.nodes[self.position]
    }

    /// The deepest node (the render root itself), if any.
    #[must_use]
    pub fn render_root(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// Empties the path.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.position = 0;
    }
}

impl SceneGraph {
    /// Computes culling bits for the whole tree under `root` against the
    /// accumulated dirty regions. Call after accumulation, before the
    /// per-region render passes.
    pub fn pre_culling(&mut self, root: NodeId, regions: &DirtyRegionContainer, tx: Affine) {
        let idx = self.check(root);
        self.mark_cull_regions(idx, regions, None, tx);
    }

    fn mark_cull_regions(
        &mut self,
        idx: u32,
        regions: &DirtyRegionContainer,
        parent_bits: Option<u32>,
        tx: Affine,
    ) {
        let device_bounds = if transform::is_identity(tx) {
            self.slots[idx as usize].transformed_bounds
        } else {
            self.slots[idx as usize].transformed_bounds.transformed(tx)
        };

        let mut bits = 0_u32;
        let mut mask = REGION_INTERSECTS;
        for i in 0..regions.size() {
            let region = regions.region(i);
            // Children of a fully-contained parent are skipped via the
            // gate; only intersecting parents refine their children.
            let gated_in = parent_bits.is_none_or(|pb| pb & mask != 0);
            if gated_in && !region.disjoint(device_bounds) {
                let code = if region.contains(device_bounds) {
                    REGION_CONTAINS
                } else {
                    REGION_INTERSECTS
                };
                bits |= code << (2 * i);
            }
            mask <<= 2;
        }
        self.slots[idx as usize].culling_bits = bits;

        if bits == 0 {
            // Outside every dirty region: this subtree will not be
            // painted, so its dirty state must be retired here.
            if !self.is_clean_at(idx) {
                self.clear_dirty_tree_at(idx);
            }
            return;
        }

        let child_tx = tx * self.slots[idx as usize].transform;
        for i in 0..self.slots[idx as usize].children.len() {
            let child = self.slots[idx as usize].children[i];
            self.mark_cull_regions(child, regions, Some(bits), child_tx);
        }
    }

    /// The culling bits computed for `id` (diagnostics and tests).
    #[must_use]
    pub fn culling_bits(&self, id: NodeId) -> u32 {
        self.slots[self.check(id) as usize].culling_bits
    }

    /// Finds the node to start painting `dirty_region` from.
    ///
    /// On return: an empty `path` means nothing needs painting (all dirt
    /// occluded by a clean cover); otherwise the path runs from the
    /// chosen root (deepest, first element) up to this node (last).
    /// `culling_index` selects which dirty region's bits gate the search;
    /// `None` skips culling-bit checks.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or `culling_index` exceeds the
    /// 15-region capacity.
    pub fn get_render_root(
        &mut self,
        path: &mut NodePath,
        dirty_region: Bounds,
        culling_index: Option<usize>,
        root: NodeId,
        tx: Affine,
    ) {
        let idx = self.check(root);
        if let Some(ci) = culling_index {
            assert!(ci < 15, "culling index out of range: {ci}");
        }
        path.clear();
        match self.compute_render_root(idx, path, dirty_region, culling_index, tx) {
            RenderRootResult::None => {
                // Nothing occludes the whole region; paint from the root.
                path.add(self.id_at(idx));
            }
            RenderRootResult::FoundAndClean => {
                // A clean occluder covers everything dirty: no painting.
                path.clear();
            }
            RenderRootResult::Found => {}
        }
        path.reset();
    }

    fn compute_render_root(
        &mut self,
        idx: u32,
        path: &mut NodePath,
        dirty_region: Bounds,
        culling_index: Option<usize>,
        tx: Affine,
    ) -> RenderRootResult {
        if self.slots[idx as usize].content.is_some() {
            return self.compute_node_render_root(idx, path, dirty_region, culling_index, tx);
        }

        let mut culling_index = culling_index;
        if let Some(ci) = culling_index {
            let bits = self.slots[idx as usize].culling_bits >> (ci * 2);
            if bits & REGION_CONTAINS_OR_INTERSECTS == 0 {
                return RenderRootResult::None;
            }
            if bits & REGION_CONTAINS != 0 {
                // Bits are not computed below fully-contained groups.
                culling_index = None;
            }
        }
        if !self.slots[idx as usize].visible {
            return RenderRootResult::None;
        }

        // An isolating group (opacity, blend, clip, effect, cache) cannot
        // have the render walk start inside it.
        let isolates = {
            let slot = &self.slots[idx as usize];
            slot.opacity < 1.0
                || slot.blend_mode.is_some()
                || slot.effect.is_some()
                || slot.clip != INVALID
                || slot.cache.is_some()
        };
        if !isolates {
            let child_tx = tx * self.slots[idx as usize].transform;
            let n = self.effective_child_count(idx);
            for i in (0..n).rev() {
                let child = self.effective_child_at(idx, i);
                let result =
                    self.compute_render_root(child, path, dirty_region, culling_index, child_tx);
                match result {
                    RenderRootResult::None => {}
                    RenderRootResult::Found => {
                        path.add(self.id_at(idx));
                        return RenderRootResult::Found;
                    }
                    RenderRootResult::FoundAndClean => {
                        path.add(self.id_at(idx));
                        // Anything painted above the root makes this a
                        // real paint after all.
                        let mut found_dirty = self.slots[idx as usize].dirty != DirtyFlag::Clean;
                        for j in (i + 1)..n {
                            let above = self.effective_child_at(idx, j);
                            if !self.is_clean_at(above) {
                                found_dirty = true;
                                break;
                            }
                        }
                        return if found_dirty {
                            RenderRootResult::Found
                        } else {
                            RenderRootResult::FoundAndClean
                        };
                    }
                }
            }
        }

        self.compute_node_render_root(idx, path, dirty_region, culling_index, tx)
    }

    fn compute_node_render_root(
        &mut self,
        idx: u32,
        path: &mut NodePath,
        dirty_region: Bounds,
        culling_index: Option<usize>,
        tx: Affine,
    ) -> RenderRootResult {
        if let Some(ci) = culling_index {
            let bits = self.slots[idx as usize].culling_bits >> (ci * 2);
            if bits & REGION_CONTAINS_OR_INTERSECTS == 0 {
                return RenderRootResult::None;
            }
        }
        if !self.slots[idx as usize].visible {
            return RenderRootResult::None;
        }
        let Some(opaque) = self.opaque_region_at(idx) else {
            return RenderRootResult::None;
        };
        let local_to_scene = tx * self.slots[idx as usize].transform;
        if bounds_cover_region(opaque, dirty_region, local_to_scene) {
            path.add(self.id_at(idx));
            if self.is_clean_at(idx) {
                RenderRootResult::FoundAndClean
            } else {
                RenderRootResult::Found
            }
        } else {
            RenderRootResult::None
        }
    }
}

/// Whether `outer` (local space), mapped through `tx`, fully covers
/// `inner` (device space). Axis-preserving transforms use a rectangle
/// test; anything else checks `inner`'s corners against the transformed
/// convex quad.
fn bounds_cover_region(outer: Bounds, inner: Bounds, tx: Affine) -> bool {
    if outer.is_empty() || inner.is_empty() {
        return false;
    }
    if transform::is_axis_aligned(tx) {
        return outer.transformed(tx).contains(inner);
    }
    let quad = outer.corners().map(|p| tx * p);
    inner
        .corners()
        .iter()
        .all(|p| point_in_convex_quad(p.x, p.y, &quad))
}

fn ccw(px: f64, py: f64, a: Point, b: Point) -> f64 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

fn point_in_convex_quad(x: f64, y: f64, quad: &[Point; 4]) -> bool {
    let signs = [
        ccw(x, y, quad[0], quad[1]),
        ccw(x, y, quad[1], quad[2]),
        ccw(x, y, quad[2], quad[3]),
        ccw(x, y, quad[3], quad[0]),
    ];
    let has_pos = signs.iter().any(|&s| s > 0.0);
    let has_neg = signs.iter().any(|&s| s < 0.0);
    // Strictly one winding (zeros are on-edge); an all-zero degenerate
    // quad contains nothing.
    (has_pos ^ has_neg) && !(has_pos && has_neg)
}
