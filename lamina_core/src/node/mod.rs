// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-tree node model.
//!
//! A *node* is one element of the retained render tree. Nodes come in two
//! kinds: *groups* (the only kind with children) and *leaves*, which
//! delegate painting to an externally supplied [`Content`]. Every node
//! carries:
//!
//! - An identity ([`NodeId`]) — a generational handle that becomes stale
//!   when the node is destroyed.
//! - Topology — a parent link, an ordered child list (groups), and an
//!   optional owned clip node whose `parent` back-references its owner.
//! - **Synced properties** set through the [`SceneGraph`] mutators:
//!   transform, bounds, visibility, opacity, blend mode, depth test, clip,
//!   effect, cache hint, view order.
//! - **Frame state** maintained by the walks: the [`DirtyFlag`] machine,
//!   dirty bounds, culling bits, and the lazily cached opaque region.
//!
//! Ownership is strictly top-down (parents own children, owners own their
//! clip nodes); every back-reference is a non-owning index.

mod content;
mod dirty;
mod id;
mod store;
#[cfg(test)]
pub(crate) mod testutil;

pub use content::Content;
pub use dirty::{DIRTY_CHILDREN_ACCUMULATED_THRESHOLD, DirtyFlag};
pub use id::NodeId;
pub use store::{REMOVED_CHILDREN_CAP, SceneGraph};

pub(crate) use id::INVALID;
