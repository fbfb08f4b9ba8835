// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Effect-filter contract.
//!
//! Effects are image-space post-processing graphs owned by an external
//! effect system. The core only needs four things from one: how it maps
//! bounds, whether it can thin opaque pixels, how it dilates dirty
//! regions, and a render hook that consumes a content painter. The filter
//! wrapper is invalidated (recreated) by the owning node's setters; the
//! effect's internal parameters are none of the core's business.

use core::fmt;

use kurbo::Affine;

use crate::bounds::Bounds;
use crate::region::DirtyRegionContainer;
use crate::target::RenderTarget;

/// An image-space post-processing operation applied to a node's rendered
/// content.
pub trait Effect: Send {
    /// Output bounds of the effect applied to content with the given
    /// local bounds, under `tx`. Must be conservative.
    fn bounds(&self, content_bounds: Bounds, tx: Affine) -> Bounds;

    /// Whether the effect may turn opaque input pixels non-opaque
    /// (blur does; a pure offset does not). `true` is the safe answer and
    /// disqualifies the node from occlusion culling.
    fn reduces_opaque_pixels(&self) -> bool {
        true
    }

    /// Expands each local-space dirty region to cover the effect's output
    /// footprint for that input region (for example, dilating by a blur
    /// radius).
    fn map_dirty_regions(&self, regions: &mut DirtyRegionContainer);

    /// Renders the effect into `target`: typically allocates an input
    /// surface from the target, invokes `content` to paint into it,
    /// filters, and composites the result under the target's current
    /// state. Resource exhaustion inside the effect follows the same
    /// skip-this-frame policy as the rest of the walk.
    fn render(&mut self, target: &mut dyn RenderTarget, content: &mut dyn FnMut(&mut dyn RenderTarget));
}

/// The per-node wrapper around an [`Effect`].
pub struct EffectFilter {
    effect: Box<dyn Effect>,
}

impl fmt::Debug for EffectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectFilter").finish_non_exhaustive()
    }
}

impl EffectFilter {
    /// Wraps `effect`.
    #[must_use]
    pub fn new(effect: Box<dyn Effect>) -> Self {
        Self { effect }
    }

    /// Output bounds under `tx` (see [`Effect::bounds`]).
    #[must_use]
    pub fn bounds(&self, content_bounds: Bounds, tx: Affine) -> Bounds {
        self.effect.bounds(content_bounds, tx)
    }

    /// See [`Effect::reduces_opaque_pixels`].
    #[must_use]
    pub fn reduces_opaque_pixels(&self) -> bool {
        self.effect.reduces_opaque_pixels()
    }

    /// See [`Effect::map_dirty_regions`].
    pub fn map_dirty_regions(&self, regions: &mut DirtyRegionContainer) {
        self.effect.map_dirty_regions(regions);
    }

    /// See [`Effect::render`].
    pub fn render(
        &mut self,
        target: &mut dyn RenderTarget,
        content: &mut dyn FnMut(&mut dyn RenderTarget),
    ) {
        self.effect.render(target, content);
    }
}
