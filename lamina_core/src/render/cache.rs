// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cached-raster filter state.
//!
//! A node with caching enabled keeps a rasterized snapshot of its subtree
//! in a backend surface and blits it instead of re-rendering, as long as
//! the accumulated transform has only changed in ways the node's
//! [`CacheHint`] permits. Validity here is deliberately independent of the
//! node's ordinary dirty flag: geometry changes invalidate the raster
//! through [`invalidate`](CacheFilter::invalidate), while transform-only
//! changes never do — the filter decides at render time by comparing
//! transforms.

use core::fmt;

use kurbo::{Affine, Rect};

use crate::target::Surface;
use crate::transform;

/// Developer intent for how aggressively a cached raster may be reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheHint {
    /// Re-render on any change other than translation.
    #[default]
    Default,
    /// Reuse the raster under any transform change, trading fidelity for
    /// speed.
    Speed,
    /// Prioritize visual quality; behaves like [`Self::Default`] for
    /// validity but also opts into scroll reuse.
    Quality,
    /// Reuse under axis-aligned scale changes.
    Scale,
    /// Reuse under rotation changes.
    Rotate,
    /// Reuse under scale and rotation changes.
    ScaleAndRotate,
}

impl CacheHint {
    /// Whether scale-only transform deltas keep the raster valid.
    #[must_use]
    pub fn permits_scale(self) -> bool {
        matches!(self, Self::Speed | Self::Scale | Self::ScaleAndRotate)
    }

    /// Whether rotation-only transform deltas keep the raster valid.
    #[must_use]
    pub fn permits_rotation(self) -> bool {
        matches!(self, Self::Speed | Self::Rotate | Self::ScaleAndRotate)
    }
}

/// Classification of the delta between the cached transform and the
/// current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransformDelta {
    /// Identical linear parts; only translation differs.
    Translation,
    /// Linear parts differ by an axis-aligned scale.
    Scale,
    /// Linear parts differ by a rotation.
    Rotation,
    /// Anything else (shear, mixed, singular cached transform).
    General,
}

pub(crate) fn classify_delta(cached: Affine, current: Affine) -> TransformDelta {
    if transform::translation_delta(cached, current).is_some() {
        return TransformDelta::Translation;
    }
    let Some(inv) = transform::try_invert(cached) else {
        return TransformDelta::General;
    };
    let [a, b, c, d, _, _] = (current * inv).as_coeffs();
    let eps = 1e-12;
    if b.abs() < eps && c.abs() < eps {
        return TransformDelta::Scale;
    }
    // A rotation delta has an orthonormal linear part.
    if (a - d).abs() < eps && (b + c).abs() < eps && (a * a + b * b - 1.0).abs() < 1e-9 {
        return TransformDelta::Rotation;
    }
    TransformDelta::General
}

/// Rasterized-subtree cache attached to a node.
pub struct CacheFilter {
    hint: CacheHint,
    image: Option<Box<dyn Surface>>,
    /// Accumulated device transform the raster was rendered under.
    cached_transform: Affine,
    /// Device rectangle the raster covers, at cache time.
    cached_rect: Rect,
    valid: bool,
    /// Pending scroll deltas from translated descendants, in device px.
    pending_scroll: Option<(f64, f64)>,
    /// Whether translated-descendant updates may scroll the raster in
    /// place. Off by default; only sound when the cached subtree moves as
    /// a unit, which the sync layer asserts by enabling this.
    scroll_enabled: bool,
}

impl fmt::Debug for CacheFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFilter")
            .field("hint", &self.hint)
            .field("valid", &self.valid)
            .field("cached_rect", &self.cached_rect)
            .field("pending_scroll", &self.pending_scroll)
            .finish_non_exhaustive()
    }
}

impl CacheFilter {
    /// Creates an empty (invalid) cache with the given hint.
    #[must_use]
    pub fn new(hint: CacheHint) -> Self {
        Self {
            hint,
            image: None,
            cached_transform: Affine::IDENTITY,
            cached_rect: Rect::ZERO,
            valid: false,
            pending_scroll: None,
            scroll_enabled: false,
        }
    }

    /// The current hint.
    #[must_use]
    pub fn hint(&self) -> CacheHint {
        self.hint
    }

    /// Whether `hint` matches the current one.
    #[must_use]
    pub fn matches_hint(&self, hint: CacheHint) -> bool {
        self.hint == hint
    }

    /// Replaces the hint. Validity is re-evaluated naturally on the next
    /// render pass.
    pub fn set_hint(&mut self, hint: CacheHint) {
        self.hint = hint;
    }

    /// Enables or disables in-place scrolling for translated descendants.
    pub fn set_scroll_enabled(&mut self, enabled: bool) {
        self.scroll_enabled = enabled;
        if !enabled {
            self.pending_scroll = None;
        }
    }

    /// Whether the raster currently holds usable pixels.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid && self.image.as_ref().is_some_and(|img| !img.is_lost())
    }

    /// Marks the raster stale. The surface is kept for reuse.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.pending_scroll = None;
    }

    /// Records that a descendant moved by a pure translation. With
    /// scrolling enabled the delta accumulates for an in-place scroll;
    /// otherwise this is a plain invalidation.
    pub fn invalidate_by_translation(&mut self, dx: f64, dy: f64) {
        if self.scroll_enabled && self.valid {
            let (px, py) = self.pending_scroll.unwrap_or((0.0, 0.0));
            self.pending_scroll = Some((px + dx, py + dy));
        } else {
            self.invalidate();
        }
    }

    /// Whether the raster can be blitted for the given current
    /// accumulated transform, per the hint policy.
    #[must_use]
    pub fn is_reusable_for(&self, current: Affine) -> bool {
        if !self.is_valid() {
            return false;
        }
        match classify_delta(self.cached_transform, current) {
            TransformDelta::Translation => true,
            TransformDelta::Scale => self.hint.permits_scale(),
            TransformDelta::Rotation => self.hint.permits_rotation(),
            TransformDelta::General => self.hint.permits_scale() && self.hint.permits_rotation(),
        }
    }

    /// Pending scroll delta, if any.
    #[must_use]
    pub fn pending_scroll(&self) -> Option<(f64, f64)> {
        self.pending_scroll
    }

    pub(crate) fn clear_pending_scroll(&mut self) {
        self.pending_scroll = None;
    }

    pub(crate) fn image(&self) -> Option<&dyn Surface> {
        self.image.as_deref()
    }

    pub(crate) fn image_mut(&mut self) -> Option<&mut (dyn Surface + 'static)> {
        self.image.as_deref_mut()
    }

    pub(crate) fn cached_transform(&self) -> Affine {
        self.cached_transform
    }

    pub(crate) fn cached_rect(&self) -> Rect {
        self.cached_rect
    }

    /// The dirty-bounds contribution of the cached node, in device space.
    /// Mirrors the plain node computation, with a pending scroll widened
    /// to cover both the old and new pixel positions.
    pub(crate) fn compute_dirty_bounds(
        &self,
        dirty_bounds: crate::bounds::Bounds,
        transformed_bounds: crate::bounds::Bounds,
        tx: Affine,
    ) -> crate::bounds::Bounds {
        let region = if dirty_bounds.is_empty() {
            transformed_bounds
        } else {
            dirty_bounds
        };
        if region.is_empty() {
            return region;
        }
        let mut region = region
            .padded(crate::bounds::DIRTY_REGION_PADDING)
            .transformed(tx);
        if let Some((dx, dy)) = self.pending_scroll {
            let shifted = region.translated(dx, dy);
            region.union_with(shifted);
        }
        region
    }

    /// Installs a freshly rendered raster.
    pub(crate) fn store(&mut self, image: Box<dyn Surface>, tx: Affine, rect: Rect) {
        self.image = Some(image);
        self.cached_transform = tx;
        self.cached_rect = rect;
        self.valid = true;
        self.pending_scroll = None;
    }
}
