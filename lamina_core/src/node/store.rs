// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena storage for the render tree and the sync-layer mutation API.
//!
//! [`SceneGraph`] owns every node. Nodes are addressed by generational
//! [`NodeId`] handles; topology is index links (parent, ordered child
//! list, owned clip), never owning references, so upward walks cannot
//! create retain cycles.
//!
//! Mutators follow one contract: compare against the stored value, no-op
//! when unchanged, otherwise update and propagate dirtiness — either
//! `mark_dirty` alone (a visual change that leaves any cached raster
//! usable) or `visuals_changed` (which also invalidates the raster).
//! Which one each setter uses is part of the per-field contract and is
//! documented on the setter. Contract violations (stale handles, opacity
//! outside [0, 1], out-of-range child indices, attaching an attached
//! node) panic; they indicate bugs in the calling sync layer, not
//! recoverable conditions.

use kurbo::Affine;

use crate::bounds::Bounds;
use crate::node::content::Content;
use crate::node::dirty::DirtyFlag;
use crate::node::id::{INVALID, NodeId};
use crate::render::cache::{CacheFilter, CacheHint};
use crate::render::effect::{Effect, EffectFilter};
use crate::target::BlendMode;
use crate::transform;

/// How many removed children a group tracks individually for the next
/// dirty-region pass. Past this, the whole group is treated as dirty
/// instead.
pub const REMOVED_CHILDREN_CAP: usize = 12;

pub(crate) struct Slot {
    // -- Allocation --
    pub(crate) generation: u32,
    pub(crate) live: bool,

    // -- Topology --
    pub(crate) parent: u32,
    pub(crate) is_clip: bool,
    pub(crate) children: Vec<u32>,
    pub(crate) view_order_children: Option<Vec<u32>>,
    pub(crate) removed: Vec<u32>,
    pub(crate) removed_exceeded: bool,
    pub(crate) queued_removed: bool,
    pub(crate) clip: u32,

    // -- Visual state --
    pub(crate) content: Option<Box<dyn Content>>,
    pub(crate) transform: Affine,
    pub(crate) content_bounds: Bounds,
    pub(crate) transformed_bounds: Bounds,
    pub(crate) dirty_bounds: Bounds,
    pub(crate) visible: bool,
    pub(crate) opacity: f32,
    pub(crate) view_order: f64,
    pub(crate) blend_mode: Option<BlendMode>,
    pub(crate) depth_test: bool,
    pub(crate) cache: Option<CacheFilter>,
    pub(crate) effect: Option<EffectFilter>,

    // -- Dirty machine --
    pub(crate) dirty: DirtyFlag,
    pub(crate) child_dirty: bool,
    pub(crate) dirty_children_accumulated: u32,

    // -- Per-frame culling state --
    pub(crate) culling_bits: u32,

    // -- Opaque-region cache --
    pub(crate) opaque_region: Option<Bounds>,
    pub(crate) opaque_region_invalid: bool,

    // -- Diagnostics --
    pub(crate) name: Option<String>,
}

impl Slot {
    fn new(content: Option<Box<dyn Content>>) -> Self {
        Self {
            generation: 0,
            live: true,
            parent: INVALID,
            is_clip: false,
            children: Vec::new(),
            view_order_children: None,
            removed: Vec::new(),
            removed_exceeded: false,
            queued_removed: false,
            clip: INVALID,
            content,
            transform: Affine::IDENTITY,
            content_bounds: Bounds::EMPTY,
            transformed_bounds: Bounds::EMPTY,
            dirty_bounds: Bounds::EMPTY,
            visible: true,
            opacity: 1.0,
            view_order: 0.0,
            blend_mode: None,
            depth_test: true,
            cache: None,
            effect: None,
            // A freshly synced node must be painted.
            dirty: DirtyFlag::Dirty,
            child_dirty: false,
            dirty_children_accumulated: 0,
            culling_bits: 0,
            opaque_region: None,
            opaque_region_invalid: true,
            name: None,
        }
    }
}

/// The retained render tree.
pub struct SceneGraph {
    pub(crate) slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl core::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("slots", &self.slots.len())
            .field("free", &self.free_list.len())
            .finish_non_exhaustive()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    // -- Allocation API ----------------------------------------------------

    fn alloc(&mut self, content: Option<Box<dyn Content>>) -> NodeId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let generation = self.slots[idx as usize].generation;
            self.slots[idx as usize] = Slot {
                generation,
                ..Slot::new(content)
            };
            idx
        } else {
            let idx = u32::try_from(self.slots.len()).expect("node arena exhausted");
            assert!(idx != INVALID, "node arena exhausted");
            self.slots.push(Slot::new(content));
            idx
        };
        NodeId {
            idx,
            generation: self.slots[idx as usize].generation,
        }
    }

    /// Creates a group node (the only node kind with children).
    pub fn create_group(&mut self) -> NodeId {
        self.alloc(None)
    }

    /// Creates a leaf node painting the given content.
    pub fn create_leaf(&mut self, content: Box<dyn Content>) -> NodeId {
        self.alloc(Some(content))
    }

    /// Destroys a node, releasing its resources and its owned clip node.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale, the node still has children, is
    /// still attached to a parent (or set as a clip on an owner), or is
    /// still queued in a group's removed-children accounting.
    pub fn destroy(&mut self, id: NodeId) {
        let idx = self.check(id);
        self.destroy_at(idx);
    }

    fn destroy_at(&mut self, idx: u32) {
        assert!(
            self.slots[idx as usize].children.is_empty(),
            "cannot destroy a node with children"
        );
        assert!(
            self.slots[idx as usize].parent == INVALID,
            "cannot destroy an attached node"
        );
        assert!(
            !self.slots[idx as usize].queued_removed,
            "cannot destroy a node queued in removal accounting"
        );
        let clip = self.slots[idx as usize].clip;
        if clip != INVALID {
            self.slots[clip as usize].parent = INVALID;
            self.slots[clip as usize].is_clip = false;
            self.destroy_at(clip);
        }
        let slot = &mut self.slots[idx as usize];
        slot.generation += 1;
        slot.live = false;
        slot.content = None;
        slot.cache = None;
        slot.effect = None;
        slot.children = Vec::new();
        slot.view_order_children = None;
        slot.removed = Vec::new();
        slot.clip = INVALID;
        self.free_list.push(idx);
    }

    /// Whether the handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        (id.idx as usize) < self.slots.len() && {
            let slot = &self.slots[id.idx as usize];
            slot.live && slot.generation == id.generation
        }
    }

    /// Panics if the handle is stale; returns the slot index.
    pub(crate) fn check(&self, id: NodeId) -> u32 {
        assert!(self.is_alive(id), "stale NodeId: {id:?}");
        id.idx
    }

    pub(crate) fn id_at(&self, idx: u32) -> NodeId {
        NodeId {
            idx,
            generation: self.slots[idx as usize].generation,
        }
    }

    // -- Topology API ------------------------------------------------------

    /// Appends `child` to `group`'s child list.
    ///
    /// See [`insert_child`](Self::insert_child).
    pub fn add_child(&mut self, group: NodeId, child: NodeId) {
        self.insert_child(group, -1, child);
    }

    /// Inserts `child` into `group`'s child list at `index` (`-1`
    /// appends). Adding is reported upward once per structural change; it
    /// does not inflate per-descendant dirty accounting.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, `group` is not a group, `index` is
    /// neither `-1` nor `0..=len`, or `child` is already attached (as a
    /// child or as a clip).
    pub fn insert_child(&mut self, group: NodeId, index: isize, child: NodeId) {
        let g = self.check(group);
        let c = self.check(child);
        assert!(
            self.slots[g as usize].content.is_none(),
            "cannot add children to a leaf node"
        );
        let len = self.slots[g as usize].children.len();
        assert!(
            index == -1 || (0..=len as isize).contains(&index),
            "child index out of range: {index} (size {len})"
        );
        assert!(
            self.slots[c as usize].parent == INVALID && !self.slots[c as usize].is_clip,
            "child already has a parent"
        );
        let at = if index == -1 { len } else { index as usize };
        self.slots[g as usize].children.insert(at, c);
        self.slots[c as usize].parent = g;
        // Structural changes invalidate any supplied view order; the sync
        // layer re-submits it.
        self.slots[g as usize].view_order_children = None;

        // The new child must paint in full.
        self.slots[c as usize].dirty = DirtyFlag::Dirty;
        self.slots[g as usize].child_dirty = true;
        self.slots[g as usize].dirty_children_accumulated += 1;
        self.invalidate_cache_at(g);
        self.mark_tree_dirty_no_increment(g);
    }

    /// Removes `child` from `group`.
    ///
    /// The child's former footprint stays tracked in the group's removed
    /// list (up to [`REMOVED_CHILDREN_CAP`]) so the next dirty-region pass
    /// paints over it; past the cap the whole group degrades to dirty.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale or `child` is not a child of `group`.
    pub fn remove_child(&mut self, group: NodeId, child: NodeId) {
        let g = self.check(group);
        let c = self.check(child);
        let pos = self.slots[g as usize]
            .children
            .iter()
            .position(|&x| x == c)
            .expect("node is not a child of this group");
        self.remove_child_at_position(g, pos);
    }

    /// Removes the child at `index` from `group`.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale or `index` is out of range.
    pub fn remove_child_at(&mut self, group: NodeId, index: usize) {
        let g = self.check(group);
        let len = self.slots[g as usize].children.len();
        assert!(index < len, "child index out of range: {index} (size {len})");
        self.remove_child_at_position(g, index);
    }

    fn remove_child_at_position(&mut self, g: u32, pos: usize) {
        let c = self.slots[g as usize].children.remove(pos);
        self.slots[c as usize].parent = INVALID;
        self.slots[g as usize].view_order_children = None;

        if !self.slots[g as usize].removed_exceeded {
            if self.slots[g as usize].removed.len() >= REMOVED_CHILDREN_CAP {
                // Tracking degrades: forget the individual footprints and
                // repaint the whole group instead.
                self.slots[g as usize].removed_exceeded = true;
                let drained = std::mem::take(&mut self.slots[g as usize].removed);
                for r in drained {
                    self.slots[r as usize].queued_removed = false;
                }
                self.mark_dirty_at(g);
            } else if !self.slots[c as usize].queued_removed {
                self.slots[g as usize].removed.push(c);
                self.slots[c as usize].queued_removed = true;
            }
        }

        self.slots[g as usize].child_dirty = true;
        self.slots[g as usize].dirty_children_accumulated += 1;
        self.invalidate_cache_at(g);
        self.mark_tree_dirty_no_increment(g);
    }

    /// Supplies an alternate render/cull traversal order for `group`'s
    /// children. Ownership and the structural child list are unaffected.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale or `ordered` is not a permutation of
    /// the current child set.
    pub fn set_view_order_children(&mut self, group: NodeId, ordered: Vec<NodeId>) {
        let g = self.check(group);
        assert!(
            ordered.len() == self.slots[g as usize].children.len(),
            "view-order children must match the child set"
        );
        let order: Vec<u32> = ordered.iter().map(|&id| self.check(id)).collect();
        for &c in &order {
            assert!(
                self.slots[g as usize].children.contains(&c),
                "view-order children must match the child set"
            );
        }
        self.slots[g as usize].view_order_children = Some(order);
        self.visuals_changed_at(g);
    }

    /// The parent of `id`: its owning group, or for a clip node the node
    /// it masks.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let idx = self.check(id);
        let p = self.slots[idx as usize].parent;
        (p != INVALID).then(|| self.id_at(p))
    }

    /// Number of children of `id`.
    #[must_use]
    pub fn child_count(&self, id: NodeId) -> usize {
        let idx = self.check(id);
        self.slots[idx as usize].children.len()
    }

    /// The children of `id`, in structural order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let idx = self.check(id);
        self.slots[idx as usize]
            .children
            .iter()
            .map(|&c| self.id_at(c))
    }

    /// Whether `id` is a group node.
    #[must_use]
    pub fn is_group(&self, id: NodeId) -> bool {
        let idx = self.check(id);
        self.slots[idx as usize].content.is_none()
    }

    pub(crate) fn effective_child_count(&self, idx: u32) -> usize {
        self.slots[idx as usize].children.len()
    }

    /// The `i`-th child in render order (the view order when supplied,
    /// otherwise structural order).
    pub(crate) fn effective_child_at(&self, idx: u32, i: usize) -> u32 {
        let slot = &self.slots[idx as usize];
        match &slot.view_order_children {
            Some(order) => order[i],
            None => slot.children[i],
        }
    }

    // -- Sync-layer setters ------------------------------------------------

    /// Sets visibility. Propagation: `mark_dirty` only — an invisible
    /// node's own cached raster stays valid for when it reappears.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        let idx = self.check(id);
        if self.slots[idx as usize].visible != visible {
            self.slots[idx as usize].visible = visible;
            self.mark_dirty_at(idx);
        }
    }

    /// Sets opacity. Propagation: `mark_dirty`; the opaque region is
    /// invalidated only when crossing into or out of the {0, 1}
    /// endpoints, since intermediate changes cannot alter it.
    ///
    /// # Panics
    ///
    /// Panics if `opacity` is outside `[0, 1]` (contract violation).
    pub fn set_opacity(&mut self, id: NodeId, opacity: f32) {
        let idx = self.check(id);
        assert!(
            (0.0..=1.0).contains(&opacity),
            "opacity must be between 0 and 1"
        );
        let old = self.slots[idx as usize].opacity;
        if old != opacity {
            self.slots[idx as usize].opacity = opacity;
            self.mark_dirty_at(idx);
            if (old < 1.0 && (opacity == 1.0 || opacity == 0.0))
                || (opacity < 1.0 && (old == 1.0 || old == 0.0))
            {
                self.invalidate_opaque_region_at(idx);
            }
        }
    }

    /// Sets the local-to-parent transform. Propagation: `mark_dirty`, or
    /// the translation fast path when only the translation components
    /// changed under a cached parent. The node's own raster cache is
    /// *not* invalidated; the cache filter compares transforms at render
    /// time.
    pub fn set_transform(&mut self, id: NodeId, tx: Affine) {
        let idx = self.check(id);
        let old = self.slots[idx as usize].transform;
        if old == tx {
            return;
        }
        let p = self.slots[idx as usize].parent;
        let hint = if p != INVALID && self.slots[p as usize].cache.is_some() {
            transform::translation_delta(old, tx)
        } else {
            None
        };
        self.slots[idx as usize].transform = tx;
        match hint {
            Some(delta) => self.mark_dirty_by_translation_at(idx, delta),
            None => self.mark_dirty_at(idx),
        }
        self.invalidate_opaque_region_at(idx);
    }

    /// Stores new content (untransformed) bounds. Dirtiness is owned by
    /// the geometry/visual notifications; storing bounds alone changes
    /// nothing visible.
    pub fn set_content_bounds(&mut self, id: NodeId, bounds: Bounds) {
        let idx = self.check(id);
        self.slots[idx as usize].content_bounds = bounds;
    }

    /// Stores new transformed (parent-space, fully decorated) bounds and
    /// folds the previous value into the node's dirty bounds. Marks dirty
    /// unless the change came from a transform-only update on a node
    /// without visuals of its own.
    pub fn set_transformed_bounds(
        &mut self,
        id: NodeId,
        bounds: Bounds,
        by_transform_change_only: bool,
    ) {
        let idx = self.check(id);
        let slot = &mut self.slots[idx as usize];
        if slot.transformed_bounds == bounds {
            return;
        }
        if slot.dirty_bounds.is_empty() {
            slot.dirty_bounds = slot.transformed_bounds;
        } else {
            // Non-empty dirty bounds mean the renderer has not consumed
            // them yet; keep the union so no former position is dropped.
            let prev = slot.transformed_bounds;
            slot.dirty_bounds.union_with(prev);
        }
        slot.dirty_bounds.union_with(bounds);
        slot.transformed_bounds = bounds;
        if self.has_visuals(idx) && !by_transform_change_only {
            self.mark_dirty_at(idx);
        }
    }

    /// Sets or clears the clip node. The clip is owned by this node and
    /// back-references it through `parent`. Propagation:
    /// `visuals_changed` plus opaque-region invalidation — a clip change
    /// can never be represented by a cached raster or a translation.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale or the new clip node is attached
    /// elsewhere (a node cannot be both a child and a clip).
    pub fn set_clip_node(&mut self, id: NodeId, clip: Option<NodeId>) {
        let idx = self.check(id);
        let new = clip.map_or(INVALID, |c| self.check(c));
        if self.slots[idx as usize].clip == new {
            return;
        }
        let old = self.slots[idx as usize].clip;
        if old != INVALID {
            self.slots[old as usize].parent = INVALID;
            self.slots[old as usize].is_clip = false;
        }
        if new != INVALID {
            assert!(
                self.slots[new as usize].parent == INVALID,
                "clip node already has a parent"
            );
            self.slots[new as usize].parent = idx;
            self.slots[new as usize].is_clip = true;
        }
        self.slots[idx as usize].clip = new;
        self.visuals_changed_at(idx);
        self.invalidate_opaque_region_at(idx);
    }

    /// Sets the blend mode (`None` = pass-through). Propagation:
    /// `mark_dirty` plus opaque-region invalidation; the cached raster is
    /// compositing-independent and stays valid.
    pub fn set_blend_mode(&mut self, id: NodeId, mode: Option<BlendMode>) {
        let idx = self.check(id);
        if self.slots[idx as usize].blend_mode != mode {
            self.slots[idx as usize].blend_mode = mode;
            self.mark_dirty_at(idx);
            self.invalidate_opaque_region_at(idx);
        }
    }

    /// Sets the depth-test flag. Propagation: `visuals_changed`.
    pub fn set_depth_test(&mut self, id: NodeId, depth_test: bool) {
        let idx = self.check(id);
        if self.slots[idx as usize].depth_test != depth_test {
            self.slots[idx as usize].depth_test = depth_test;
            self.visuals_changed_at(idx);
        }
    }

    /// Sets the per-node view order value. Propagation: `visuals_changed`.
    pub fn set_view_order(&mut self, id: NodeId, view_order: f64) {
        let idx = self.check(id);
        if self.slots[idx as usize].view_order != view_order {
            self.slots[idx as usize].view_order = view_order;
            self.visuals_changed_at(idx);
        }
    }

    /// Enables or disables raster caching with the given hint.
    /// Propagation: `mark_dirty` — enabling repaints promptly so the
    /// first cached image matches current visuals; hint changes
    /// re-evaluate naturally on the next pass.
    pub fn set_cached(&mut self, id: NodeId, cached: bool, hint: CacheHint) {
        let idx = self.check(id);
        if cached {
            match &mut self.slots[idx as usize].cache {
                None => {
                    self.slots[idx as usize].cache = Some(CacheFilter::new(hint));
                    self.mark_dirty_at(idx);
                }
                Some(filter) => {
                    if !filter.matches_hint(hint) {
                        filter.set_hint(hint);
                        self.mark_dirty_at(idx);
                    }
                }
            }
        } else if self.slots[idx as usize].cache.is_some() {
            self.slots[idx as usize].cache = None;
            self.mark_dirty_at(idx);
        }
    }

    /// Opts a cached node into in-place scrolling for translated
    /// descendants. Only sound when the cached subtree moves as a unit;
    /// the sync layer asserts that by calling this.
    pub fn set_cache_scroll_enabled(&mut self, id: NodeId, enabled: bool) {
        let idx = self.check(id);
        if let Some(filter) = &mut self.slots[idx as usize].cache {
            filter.set_scroll_enabled(enabled);
        }
    }

    /// Sets or clears the effect. Propagation: `visuals_changed`; the
    /// opaque region is re-derived only when effect presence toggles.
    /// Passing `Some` always counts as a change (effect instances are
    /// not comparable); in-place parameter changes go through
    /// [`effect_changed`](Self::effect_changed).
    pub fn set_effect(&mut self, id: NodeId, effect: Option<Box<dyn Effect>>) {
        let idx = self.check(id);
        let had = self.slots[idx as usize].effect.is_some();
        let has = effect.is_some();
        if !had && !has {
            return;
        }
        self.slots[idx as usize].effect = effect.map(EffectFilter::new);
        self.visuals_changed_at(idx);
        if had != has {
            self.invalidate_opaque_region_at(idx);
        }
    }

    /// Notifies that the node's effect changed internally.
    pub fn effect_changed(&mut self, id: NodeId) {
        let idx = self.check(id);
        self.visuals_changed_at(idx);
    }

    /// Notifies that the node's content geometry or visuals changed in a
    /// way that invalidates any cached raster.
    pub fn visuals_changed(&mut self, id: NodeId) {
        let idx = self.check(id);
        self.visuals_changed_at(idx);
    }

    /// Notifies that the node's content geometry changed (shape, fill
    /// opacity, anything feeding the opaque region).
    pub fn geometry_changed(&mut self, id: NodeId) {
        let idx = self.check(id);
        self.invalidate_cache_at(idx);
        self.invalidate_opaque_region_at(idx);
        if self.has_visuals(idx) {
            self.mark_dirty_at(idx);
        }
    }

    /// Sets a diagnostic name, used only by debug output.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        let idx = self.check(id);
        self.slots[idx as usize].name = Some(name.into());
    }

    pub(crate) fn visuals_changed_at(&mut self, idx: u32) {
        self.invalidate_cache_at(idx);
        self.mark_dirty_at(idx);
    }

    /// Whether the node paints pixels of its own. Groups do not; their
    /// bounds changes matter only through their children.
    pub(crate) fn has_visuals(&self, idx: u32) -> bool {
        self.slots[idx as usize].content.is_some()
    }

    // -- Getters -----------------------------------------------------------

    /// Whether the node's visible flag is set.
    #[must_use]
    pub fn visible(&self, id: NodeId) -> bool {
        self.slots[self.check(id) as usize].visible
    }

    /// The node's opacity.
    #[must_use]
    pub fn opacity(&self, id: NodeId) -> f32 {
        self.slots[self.check(id) as usize].opacity
    }

    /// The node's local-to-parent transform.
    #[must_use]
    pub fn transform(&self, id: NodeId) -> Affine {
        self.slots[self.check(id) as usize].transform
    }

    /// The node's blend mode (`None` = pass-through).
    #[must_use]
    pub fn blend_mode(&self, id: NodeId) -> Option<BlendMode> {
        self.slots[self.check(id) as usize].blend_mode
    }

    /// The node's depth-test flag.
    #[must_use]
    pub fn depth_test(&self, id: NodeId) -> bool {
        self.slots[self.check(id) as usize].depth_test
    }

    /// The node's view-order value.
    #[must_use]
    pub fn view_order(&self, id: NodeId) -> f64 {
        self.slots[self.check(id) as usize].view_order
    }

    /// The node's clip node, if any.
    #[must_use]
    pub fn clip_node(&self, id: NodeId) -> Option<NodeId> {
        let clip = self.slots[self.check(id) as usize].clip;
        (clip != INVALID).then(|| self.id_at(clip))
    }

    /// Whether the node is currently serving as a clip mask.
    #[must_use]
    pub fn is_clip(&self, id: NodeId) -> bool {
        self.slots[self.check(id) as usize].is_clip
    }

    /// The node's content bounds (untransformed).
    #[must_use]
    pub fn content_bounds(&self, id: NodeId) -> Bounds {
        self.slots[self.check(id) as usize].content_bounds
    }

    /// The node's transformed (parent-space, decorated) bounds.
    #[must_use]
    pub fn transformed_bounds(&self, id: NodeId) -> Bounds {
        self.slots[self.check(id) as usize].transformed_bounds
    }

    /// The node's current dirty flag (diagnostics and tests).
    #[must_use]
    pub fn dirty_flag(&self, id: NodeId) -> DirtyFlag {
        self.slots[self.check(id) as usize].dirty
    }

    /// Whether the node has a dirty descendant (diagnostics and tests).
    #[must_use]
    pub fn child_dirty(&self, id: NodeId) -> bool {
        self.slots[self.check(id) as usize].child_dirty
    }

    /// The node's cache filter, if caching is enabled.
    #[must_use]
    pub fn cache_filter(&self, id: NodeId) -> Option<&CacheFilter> {
        self.slots[self.check(id) as usize].cache.as_ref()
    }

    /// Whether the node carries an effect.
    #[must_use]
    pub fn has_effect(&self, id: NodeId) -> bool {
        self.slots[self.check(id) as usize].effect.is_some()
    }

    /// The node's diagnostic name.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.slots[self.check(id) as usize].name.as_deref()
    }

    // -- Derived bounds ----------------------------------------------------

    /// Content bounds mapped through `tx`.
    pub(crate) fn content_bounds_under(&self, idx: u32, tx: Affine) -> Bounds {
        let cb = self.slots[idx as usize].content_bounds;
        if transform::is_translation(tx) {
            let [.., dx, dy] = tx.as_coeffs();
            cb.translated(dx, dy)
        } else {
            cb.transformed(tx)
        }
    }

    /// Content bounds with the effect's output mapping applied, under
    /// `tx`.
    pub(crate) fn effect_bounds_under(&self, idx: u32, tx: Affine) -> Bounds {
        let cb = self.slots[idx as usize].content_bounds;
        match &self.slots[idx as usize].effect {
            Some(filter) => filter.bounds(cb, tx),
            None => self.content_bounds_under(idx, tx),
        }
    }

    /// Effect bounds intersected with the clip node's complete bounds,
    /// under `tx`.
    pub(crate) fn clipped_bounds_under(&self, idx: u32, tx: Affine) -> Bounds {
        let mut bounds = self.effect_bounds_under(idx, tx);
        let clip = self.slots[idx as usize].clip;
        if clip != INVALID {
            bounds.intersect_with(self.complete_bounds_under(clip, tx));
        }
        bounds
    }

    /// The node's fully decorated bounds (content, effect, clip, own
    /// transform) under `tx`.
    pub(crate) fn complete_bounds_under(&self, idx: u32, tx: Affine) -> Bounds {
        if transform::is_identity(tx) {
            self.slots[idx as usize].transformed_bounds
        } else if transform::is_identity(self.slots[idx as usize].transform) {
            self.clipped_bounds_under(idx, tx)
        } else {
            self.clipped_bounds_under(idx, tx * self.slots[idx as usize].transform)
        }
    }

    // -- Opaque region -----------------------------------------------------

    /// Invalidates the cached opaque region. A clip node forwards the
    /// invalidation to its owner, whose opaque region derives from it.
    pub(crate) fn invalidate_opaque_region_at(&mut self, idx: u32) {
        self.slots[idx as usize].opaque_region_invalid = true;
        if self.slots[idx as usize].is_clip {
            let owner = self.slots[idx as usize].parent;
            if owner != INVALID {
                self.invalidate_opaque_region_at(owner);
            }
        }
    }

    /// The node's opaque region in local space, or `None`. Lazily
    /// recomputed; a node with an effect is always recomputed since
    /// effect-internal changes are invisible to the graph.
    #[must_use]
    pub fn opaque_region(&mut self, id: NodeId) -> Option<Bounds> {
        let idx = self.check(id);
        self.opaque_region_at(idx)
    }

    pub(crate) fn opaque_region_at(&mut self, idx: u32) -> Option<Bounds> {
        if self.slots[idx as usize].opaque_region_invalid || self.slots[idx as usize].effect.is_some()
        {
            self.slots[idx as usize].opaque_region_invalid = false;
            self.slots[idx as usize].opaque_region = self.compute_opaque_region_at(idx);
        }
        self.slots[idx as usize].opaque_region
    }

    fn compute_opaque_region_at(&mut self, idx: u32) -> Option<Bounds> {
        if !self.has_opaque_region_at(idx) {
            return None;
        }
        let region = self.slots[idx as usize]
            .content
            .as_ref()
            .and_then(|c| c.compute_opaque_region());
        // Content claimed an opaque region via has_opaque_region; a None
        // here is a content bug, answered conservatively.
        let Some(region) = region else {
            debug_assert!(false, "content claimed an opaque region but computed none");
            return None;
        };
        let mut region = Bounds::from_rect(region);
        let clip = self.slots[idx as usize].clip;
        if clip != INVALID {
            let clip_tx = self.slots[clip as usize].transform;
            let clip_region = self.opaque_region_at(clip);
            match clip_region {
                // Only translate/scale clip transforms keep the clip's
                // opaque region an axis-aligned rectangle we can use.
                Some(cr) if transform::is_translate_scale(clip_tx) => {
                    region.intersect_with(cr.transformed(clip_tx));
                }
                _ => return None,
            }
        }
        Some(region)
    }

    fn has_opaque_region_at(&mut self, idx: u32) -> bool {
        let slot = &self.slots[idx as usize];
        let effect_ok = slot
            .effect
            .as_ref()
            .is_none_or(|f| !f.reduces_opaque_pixels());
        let blend_ok = matches!(slot.blend_mode, None | Some(BlendMode::SrcOver));
        if !effect_ok || slot.opacity != 1.0 || !blend_ok {
            return false;
        }
        let content_ok = slot
            .content
            .as_ref()
            .is_some_and(|c| c.supports_opaque_regions() && c.has_opaque_region());
        if !content_ok {
            return false;
        }
        let clip = slot.clip;
        if clip != INVALID {
            let clip_content_ok = self.slots[clip as usize]
                .content
                .as_ref()
                .is_some_and(|c| c.supports_opaque_regions() && c.has_opaque_region());
            if !clip_content_ok {
                return false;
            }
        }
        true
    }

    /// Whether this node's painted output may overlap itself, forcing
    /// group-opacity isolation through an offscreen surface.
    pub(crate) fn has_overlapping_contents_at(&self, idx: u32) -> bool {
        let slot = &self.slots[idx as usize];
        match &slot.content {
            Some(content) => content.has_overlapping_contents(),
            None => {
                // A blended group flattens its children into one composited
                // result; overlap ambiguity is gone by construction.
                if slot.blend_mode.is_some() {
                    return false;
                }
                match slot.children.len() {
                    0 => false,
                    1 => self.has_overlapping_contents_at(slot.children[0]),
                    _ => true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testutil::{OpaqueRect, TransparentRect};
    use kurbo::Rect;

    #[test]
    fn create_and_destroy() {
        let mut graph = SceneGraph::new();
        let id = graph.create_group();
        assert!(graph.is_alive(id));
        graph.destroy(id);
        assert!(!graph.is_alive(id));
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut graph = SceneGraph::new();
        let id1 = graph.create_group();
        graph.destroy(id1);
        let id2 = graph.create_group();
        assert!(!graph.is_alive(id1));
        assert!(graph.is_alive(id2));
        assert_eq!(id1.index(), id2.index());
        assert_ne!(id1.generation(), id2.generation());
    }

    #[test]
    #[should_panic(expected = "stale NodeId")]
    fn stale_handle_panics() {
        let mut graph = SceneGraph::new();
        let id = graph.create_group();
        graph.destroy(id);
        let _ = graph.visible(id);
    }

    #[test]
    fn add_and_query_children() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        let b = graph.create_group();
        graph.add_child(g, a);
        graph.add_child(g, b);
        assert_eq!(graph.parent(a), Some(g));
        let kids: Vec<_> = graph.children(g).collect();
        assert_eq!(kids, vec![a, b]);
    }

    #[test]
    fn insert_child_at_index() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        let b = graph.create_group();
        let c = graph.create_group();
        graph.add_child(g, a);
        graph.add_child(g, c);
        graph.insert_child(g, 1, b);
        let kids: Vec<_> = graph.children(g).collect();
        assert_eq!(kids, vec![a, b, c]);
    }

    #[test]
    #[should_panic(expected = "child index out of range")]
    fn insert_child_out_of_range_panics() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        graph.insert_child(g, 1, a);
    }

    #[test]
    #[should_panic(expected = "child already has a parent")]
    fn double_attach_panics() {
        let mut graph = SceneGraph::new();
        let g1 = graph.create_group();
        let g2 = graph.create_group();
        let a = graph.create_group();
        graph.add_child(g1, a);
        graph.add_child(g2, a);
    }

    #[test]
    #[should_panic(expected = "cannot add children to a leaf node")]
    fn leaf_cannot_have_children() {
        let mut graph = SceneGraph::new();
        let leaf = graph.create_leaf(Box::new(TransparentRect::unit()));
        let a = graph.create_group();
        graph.add_child(leaf, a);
    }

    #[test]
    #[should_panic(expected = "cannot destroy an attached node")]
    fn destroy_attached_panics() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        graph.add_child(g, a);
        graph.destroy(a);
    }

    #[test]
    #[should_panic(expected = "opacity must be between 0 and 1")]
    fn out_of_range_opacity_panics() {
        let mut graph = SceneGraph::new();
        let id = graph.create_group();
        graph.set_opacity(id, 1.5);
    }

    #[test]
    fn unchanged_setters_are_no_ops() {
        let mut graph = SceneGraph::new();
        let root = graph.create_group();
        let child = graph.create_group();
        graph.add_child(root, child);
        graph.clear_dirty_tree_for_test(root);

        graph.set_visible(child, true);
        graph.set_opacity(child, 1.0);
        graph.set_transform(child, Affine::IDENTITY);
        graph.set_blend_mode(child, None);
        assert!(graph.is_clean(root));
        assert!(graph.is_clean(child));
    }

    #[test]
    fn clip_node_ownership_round_trip() {
        let mut graph = SceneGraph::new();
        let owner = graph.create_group();
        let mask = graph.create_leaf(Box::new(OpaqueRect::new(Rect::new(0.0, 0.0, 10.0, 10.0))));
        graph.set_clip_node(owner, Some(mask));
        assert_eq!(graph.parent(mask), Some(owner));
        assert!(graph.is_clip(mask));
        graph.set_clip_node(owner, None);
        assert_eq!(graph.parent(mask), None);
        assert!(!graph.is_clip(mask));
    }

    #[test]
    #[should_panic(expected = "clip node already has a parent")]
    fn child_cannot_be_clip_panics() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        graph.add_child(g, a);
        let other = graph.create_group();
        graph.set_clip_node(other, Some(a));
    }

    #[test]
    fn destroying_owner_releases_clip() {
        let mut graph = SceneGraph::new();
        let owner = graph.create_group();
        let mask = graph.create_leaf(Box::new(TransparentRect::unit()));
        graph.set_clip_node(owner, Some(mask));
        graph.destroy(owner);
        assert!(!graph.is_alive(mask));
    }

    #[test]
    fn removed_children_are_tracked_up_to_cap() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let kids: Vec<_> = (0..REMOVED_CHILDREN_CAP + 3)
            .map(|_| {
                let c = graph.create_group();
                graph.add_child(g, c);
                c
            })
            .collect();
        graph.clear_dirty_tree_for_test(g);

        for &c in kids.iter().take(REMOVED_CHILDREN_CAP) {
            graph.remove_child(g, c);
        }
        assert_eq!(graph.dirty_flag(g), DirtyFlag::Clean);
        // One past the cap degrades to whole-group dirty.
        graph.remove_child(g, kids[REMOVED_CHILDREN_CAP]);
        assert_eq!(graph.dirty_flag(g), DirtyFlag::Dirty);
    }

    #[test]
    #[should_panic(expected = "cannot destroy a node queued in removal accounting")]
    fn destroy_while_queued_for_removal_panics() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let c = graph.create_group();
        graph.add_child(g, c);
        graph.remove_child(g, c);
        graph.destroy(c);
    }

    #[test]
    fn view_order_children_must_match_set() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        let b = graph.create_group();
        graph.add_child(g, a);
        graph.add_child(g, b);
        graph.set_view_order_children(g, vec![b, a]);
        assert_eq!(graph.effective_child_at(g.index(), 0), b.index());
        // Structural change resets the supplied order.
        let c = graph.create_group();
        graph.add_child(g, c);
        assert_eq!(graph.effective_child_at(g.index(), 0), a.index());
    }

    #[test]
    #[should_panic(expected = "view-order children must match the child set")]
    fn view_order_with_foreign_node_panics() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        let a = graph.create_group();
        let stranger = graph.create_group();
        graph.add_child(g, a);
        graph.set_view_order_children(g, vec![stranger]);
    }

    #[test]
    fn transformed_bounds_accumulate_dirty_bounds() {
        let mut graph = SceneGraph::new();
        let leaf = graph.create_leaf(Box::new(TransparentRect::unit()));
        graph.set_transformed_bounds(leaf, Bounds::new(0.0, 0.0, 10.0, 10.0), false);
        graph.set_transformed_bounds(leaf, Bounds::new(20.0, 0.0, 30.0, 10.0), false);
        // Dirty bounds cover both the old and new positions.
        let db = graph.slots[leaf.index() as usize].dirty_bounds;
        assert!(db.contains(Bounds::new(0.0, 0.0, 10.0, 10.0)));
        assert!(db.contains(Bounds::new(20.0, 0.0, 30.0, 10.0)));
    }

    #[test]
    fn opaque_region_disqualifiers() {
        let mut graph = SceneGraph::new();
        let leaf = graph.create_leaf(Box::new(OpaqueRect::new(Rect::new(0.0, 0.0, 10.0, 10.0))));
        assert_eq!(
            graph.opaque_region(leaf),
            Some(Bounds::new(0.0, 0.0, 10.0, 10.0))
        );

        graph.set_opacity(leaf, 0.5);
        assert_eq!(graph.opaque_region(leaf), None);
        graph.set_opacity(leaf, 1.0);
        assert!(graph.opaque_region(leaf).is_some());

        graph.set_blend_mode(leaf, Some(BlendMode::Multiply));
        assert_eq!(graph.opaque_region(leaf), None);
        graph.set_blend_mode(leaf, Some(BlendMode::SrcOver));
        assert!(graph.opaque_region(leaf).is_some(), "SrcOver keeps opacity");
    }

    #[test]
    fn opaque_region_intersects_clip() {
        let mut graph = SceneGraph::new();
        let leaf = graph.create_leaf(Box::new(OpaqueRect::new(Rect::new(0.0, 0.0, 20.0, 20.0))));
        let mask = graph.create_leaf(Box::new(OpaqueRect::new(Rect::new(0.0, 0.0, 5.0, 5.0))));
        graph.set_clip_node(leaf, Some(mask));
        assert_eq!(
            graph.opaque_region(leaf),
            Some(Bounds::new(0.0, 0.0, 5.0, 5.0))
        );

        // A rotated clip defeats the rectangle intersection.
        graph.set_transform(mask, Affine::rotate(0.3));
        assert_eq!(graph.opaque_region(leaf), None);

        // A transparent mask defeats it too.
        let soft = graph.create_leaf(Box::new(TransparentRect::unit()));
        graph.set_clip_node(leaf, Some(soft));
        assert_eq!(graph.opaque_region(leaf), None);
    }

    #[test]
    fn overlap_reporting_follows_group_shape() {
        let mut graph = SceneGraph::new();
        let g = graph.create_group();
        assert!(!graph.has_overlapping_contents_at(g.index()));
        let a = graph.create_leaf(Box::new(TransparentRect::unit()));
        graph.add_child(g, a);
        // Single child delegates (rect content reports no self-overlap).
        assert!(!graph.has_overlapping_contents_at(g.index()));
        let b = graph.create_group();
        graph.add_child(g, b);
        assert!(graph.has_overlapping_contents_at(g.index()));
        // An explicit blend mode flattens the group.
        graph.set_blend_mode(g, Some(BlendMode::SrcOver));
        assert!(!graph.has_overlapping_contents_at(g.index()));
    }
}
