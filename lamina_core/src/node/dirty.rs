// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-node dirty-state machine.
//!
//! Each node carries one [`DirtyFlag`] plus a `child_dirty` bit. Together
//! they uphold the central invariant: a node that is `Clean` with
//! `child_dirty == false` heads a subtree that needs no repainting this
//! frame, so every walk can stop there.
//!
//! Marking is write-time work: setters mark the mutated node and walk up
//! through parents, setting `child_dirty` breadcrumbs and invalidating
//! raster caches along the way. The walk stops as soon as it meets an
//! ancestor that is already fully dirty, or one that already has the
//! breadcrumb — with two exceptions it must push through:
//!
//! - arriving **from a clip node** forces the owner fully dirty, since no
//!   cached raster or translation can express a mask change;
//! - arriving **by translation** must still reach and notify cached
//!   ancestors so their cache filters learn the delta.
//!
//! `dirty_children_accumulated` counts how many dirty-child reports a
//! group has received; past [`DIRTY_CHILDREN_ACCUMULATED_THRESHOLD`] the
//! dirty-region pass stops enumerating children and treats the group as
//! one dirty node, bounding worst-case traversal cost.

use crate::node::SceneGraph;
use crate::node::id::{INVALID, NodeId};

/// Per-child precision limit for a group's dirty-region accumulation.
pub const DIRTY_CHILDREN_ACCUMULATED_THRESHOLD: u32 = 12;

/// Repaint requirement of a single node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DirtyFlag {
    /// Nothing about this node changed since the last render.
    Clean,
    /// The node moved by a pure translation under a cached ancestor; the
    /// cheap scroll path applies.
    DirtyByTranslation,
    /// The node must repaint in full.
    #[default]
    Dirty,
}

impl SceneGraph {
    /// Marks the node as needing inclusion in the next repaint and walks
    /// the breadcrumb trail up to the root. Idempotent.
    pub fn mark_dirty(&mut self, id: NodeId) {
        let idx = self.check(id);
        self.mark_dirty_at(idx);
    }

    /// Whether this node and its whole subtree are clean.
    #[must_use]
    pub fn is_clean(&self, id: NodeId) -> bool {
        let idx = self.check(id);
        self.is_clean_at(idx)
    }

    /// Clears dirty state for the whole subtree (including the clip
    /// node), as if it had been painted.
    pub fn clear_dirty_tree(&mut self, id: NodeId) {
        let idx = self.check(id);
        self.clear_dirty_tree_at(idx);
    }

    #[cfg(test)]
    pub(crate) fn clear_dirty_tree_for_test(&mut self, id: NodeId) {
        self.clear_dirty_tree(id);
    }

    pub(crate) fn is_clean_at(&self, idx: u32) -> bool {
        let slot = &self.slots[idx as usize];
        slot.dirty == DirtyFlag::Clean && !slot.child_dirty
    }

    pub(crate) fn mark_dirty_at(&mut self, idx: u32) {
        if self.slots[idx as usize].dirty != DirtyFlag::Dirty {
            self.slots[idx as usize].dirty = DirtyFlag::Dirty;
            self.mark_tree_dirty(idx);
        }
    }

    /// The translation fast path: legal only for a clean node under a
    /// cached parent that is itself clean with no dirty children. Falls
    /// back to a full mark otherwise. `delta` is the translation in the
    /// parent's coordinate space.
    pub(crate) fn mark_dirty_by_translation_at(&mut self, idx: u32, delta: (f64, f64)) {
        if self.slots[idx as usize].dirty != DirtyFlag::Clean {
            return;
        }
        let p = self.slots[idx as usize].parent;
        if p != INVALID
            && self.slots[p as usize].dirty == DirtyFlag::Clean
            && !self.slots[p as usize].child_dirty
        {
            self.slots[idx as usize].dirty = DirtyFlag::DirtyByTranslation;
            self.slots[p as usize].child_dirty = true;
            self.slots[p as usize].dirty_children_accumulated += 1;
            self.invalidate_cache_by_translation_at(p, delta);
            self.mark_tree_dirty(p);
        } else {
            self.mark_dirty_at(idx);
        }
    }

    /// Walks upward from the node's parent, leaving `child_dirty`
    /// breadcrumbs and invalidating raster caches. See the module docs
    /// for the stop conditions.
    pub(crate) fn mark_tree_dirty(&mut self, idx: u32) {
        let mut p = self.slots[idx as usize].parent;
        let mut at_clip = self.slots[idx as usize].is_clip;
        let mut by_translation = self.slots[idx as usize].dirty == DirtyFlag::DirtyByTranslation;
        while p != INVALID
            && self.slots[p as usize].dirty != DirtyFlag::Dirty
            && (!self.slots[p as usize].child_dirty || at_clip || by_translation)
        {
            if at_clip {
                // A clip change cannot be a translation-only update of the
                // owner; force the full repaint.
                self.slots[p as usize].dirty = DirtyFlag::Dirty;
            } else if !by_translation {
                self.slots[p as usize].child_dirty = true;
                self.slots[p as usize].dirty_children_accumulated += 1;
            }
            self.invalidate_cache_at(p);
            at_clip = self.slots[p as usize].is_clip;
            by_translation = self.slots[p as usize].dirty == DirtyFlag::DirtyByTranslation;
            p = self.slots[p as usize].parent;
        }
        // Stopped on an ancestor that already has dirty children: it still
        // receives this report in its accumulation count.
        if p != INVALID
            && self.slots[p as usize].dirty == DirtyFlag::Clean
            && !at_clip
            && !by_translation
        {
            self.slots[p as usize].dirty_children_accumulated += 1;
        }
        // The terminal ancestor may have been marked dirty earlier without
        // its cache being invalidated (an opacity change, say); make sure.
        if p != INVALID {
            self.invalidate_cache_at(p);
        }
    }

    /// Upward marking for structural changes (child added/removed). Skips
    /// the walk when the parent chain already knows, so a structural
    /// change is reported once rather than per descendant.
    pub(crate) fn mark_tree_dirty_no_increment(&mut self, idx: u32) {
        let p = self.slots[idx as usize].parent;
        if p != INVALID
            && (!self.slots[p as usize].child_dirty
                || self.slots[idx as usize].dirty == DirtyFlag::DirtyByTranslation)
        {
            self.mark_tree_dirty(idx);
        }
    }

    /// Resets this node's dirty state after (or in lieu of) painting.
    /// Also drains the group's removed-children accounting, whose
    /// footprints have now been covered by a dirty-region pass.
    pub(crate) fn clear_dirty_at(&mut self, idx: u32) {
        let slot = &mut self.slots[idx as usize];
        slot.dirty = DirtyFlag::Clean;
        slot.child_dirty = false;
        slot.dirty_bounds.make_empty();
        slot.dirty_children_accumulated = 0;
        slot.removed_exceeded = false;
        let drained = std::mem::take(&mut slot.removed);
        for r in drained {
            self.slots[r as usize].queued_removed = false;
        }
    }

    pub(crate) fn clear_dirty_tree_at(&mut self, idx: u32) {
        self.clear_dirty_at(idx);
        let clip = self.slots[idx as usize].clip;
        if clip != INVALID {
            self.clear_dirty_tree_at(clip);
        }
        for i in 0..self.slots[idx as usize].children.len() {
            let child = self.slots[idx as usize].children[i];
            if self.slots[child as usize].dirty != DirtyFlag::Clean
                || self.slots[child as usize].child_dirty
            {
                self.clear_dirty_tree_at(child);
            }
        }
    }

    pub(crate) fn invalidate_cache_at(&mut self, idx: u32) {
        if let Some(filter) = &mut self.slots[idx as usize].cache {
            filter.invalidate();
        }
    }

    pub(crate) fn invalidate_cache_by_translation_at(&mut self, idx: u32, delta: (f64, f64)) {
        if let Some(filter) = &mut self.slots[idx as usize].cache {
            filter.invalidate_by_translation(delta.0, delta.1);
        }
    }
}
