// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-supplier contract for leaf nodes.
//!
//! Concrete shapes and other paintable peers live outside this crate.
//! They plug into the tree as [`Content`] implementations: a painter plus
//! the conservative hints the culling and compositing machinery needs.
//! Everything here is advisory toward *more* work, never less — a wrong
//! `true` from [`has_overlapping_contents`](Content::has_overlapping_contents)
//! costs an offscreen pass, a wrong opaque region would cost correctness
//! and is therefore forbidden by contract.

use kurbo::Rect;

use crate::target::RenderTarget;

/// Paintable content supplied by a leaf node.
///
/// Implementations paint in local coordinates; the render walk has already
/// applied the node's transform (and ancestors') to the target.
pub trait Content: Send {
    /// Paints this content into `target`.
    fn render(&mut self, target: &mut dyn RenderTarget);

    /// Whether this content may touch the same pixel twice with different
    /// alpha, which forces group-opacity to flatten through an offscreen
    /// surface. Defaults to the safe answer.
    fn has_overlapping_contents(&self) -> bool {
        true
    }

    /// Whether this content type can ever report an opaque region. Must be
    /// immutable for the lifetime of the instance.
    fn supports_opaque_regions(&self) -> bool {
        false
    }

    /// Whether the *current* state has an opaque region. Only consulted
    /// when [`supports_opaque_regions`](Self::supports_opaque_regions) is
    /// true; state feeding this answer must trigger
    /// [`SceneGraph::geometry_changed`](super::SceneGraph::geometry_changed)
    /// when it changes.
    fn has_opaque_region(&self) -> bool {
        false
    }

    /// The local-space rectangle guaranteed fully opaque for every
    /// possible paint of this content, or `None`. Must never over-claim.
    /// Required to return `Some` when
    /// [`has_opaque_region`](Self::has_opaque_region) returned true.
    fn compute_opaque_region(&self) -> Option<Rect> {
        None
    }

    /// When this content is a plain axis-aligned rectangle usable as a
    /// rectangular clip (full coverage, no rounded corners), returns that
    /// local-space rectangle. Lets the render walk replace mask
    /// compositing with a device clip rect.
    fn rect_clip(&self) -> Option<Rect> {
        None
    }
}
