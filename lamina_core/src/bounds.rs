// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Empty-capable axis-aligned bounds.
//!
//! [`Bounds`] is the rectangle type used by the dirty-region and culling
//! walks. Unlike [`kurbo::Rect`] it has an explicit *empty* state that acts
//! as the identity for union and the absorbing element for intersection,
//! which the accumulation algorithm relies on ("nothing changed" must not
//! contribute a point at the origin).
//!
//! Every operation preserves the invariant that a `Bounds` is either empty
//! or finite: coordinates are never NaN or infinite. Degenerate inputs
//! (a singular transform, a NaN corner) collapse to [`Bounds::EMPTY`]
//! rather than poisoning downstream math.

use kurbo::{Affine, Point, Rect};

/// Padding applied to dirty regions before they are transformed to device
/// space, covering rasterization slop such as anti-aliasing bleed. One
/// device pixel is conservative for every backend this crate targets.
pub const DIRTY_REGION_PADDING: f64 = 1.0;

/// An axis-aligned rectangle with an explicit empty state.
///
/// The empty state is encoded as `x1 < x0` (mirrored on y), so a
/// degenerate zero-area rectangle at a real position is still non-empty
/// and participates in union/containment normally.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Bounds {
    /// The empty bounds: identity for [`union`](Self::union_with),
    /// absorbing for [`intersect`](Self::intersect_with).
    pub const EMPTY: Self = Self {
        x0: 0.0,
        y0: 0.0,
        x1: -1.0,
        y1: -1.0,
    };

    /// Creates bounds from two corners.
    ///
    /// Corners are normalized (min/max per axis). Non-finite input
    /// collapses to [`Self::EMPTY`].
    #[must_use]
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return Self::EMPTY;
        }
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Creates bounds from a [`kurbo::Rect`].
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.x0, rect.y0, rect.x1, rect.y1)
    }

    /// Returns the equivalent [`kurbo::Rect`].
    ///
    /// The empty bounds maps to the zero rect; check
    /// [`is_empty`](Self::is_empty) first where the distinction matters.
    #[must_use]
    pub fn to_rect(self) -> Rect {
        if self.is_empty() {
            Rect::ZERO
        } else {
            Rect::new(self.x0, self.y0, self.x1, self.y1)
        }
    }

    /// Whether these bounds contain no points.
    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.x1 < self.x0 || self.y1 < self.y0
    }

    /// Minimum x coordinate. Meaningless when empty.
    #[inline]
    #[must_use]
    pub fn min_x(self) -> f64 {
        self.x0
    }

    /// Minimum y coordinate. Meaningless when empty.
    #[inline]
    #[must_use]
    pub fn min_y(self) -> f64 {
        self.y0
    }

    /// Maximum x coordinate. Meaningless when empty.
    #[inline]
    #[must_use]
    pub fn max_x(self) -> f64 {
        self.x1
    }

    /// Maximum y coordinate. Meaningless when empty.
    #[inline]
    #[must_use]
    pub fn max_y(self) -> f64 {
        self.y1
    }

    /// Width, or 0 when empty.
    #[inline]
    #[must_use]
    pub fn width(self) -> f64 {
        if self.is_empty() { 0.0 } else { self.x1 - self.x0 }
    }

    /// Height, or 0 when empty.
    #[inline]
    #[must_use]
    pub fn height(self) -> f64 {
        if self.is_empty() { 0.0 } else { self.y1 - self.y0 }
    }

    /// Makes these bounds empty in place.
    pub fn make_empty(&mut self) {
        *self = Self::EMPTY;
    }

    /// Unions `other` into these bounds.
    pub fn union_with(&mut self, other: Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }

    /// Returns the union of two bounds.
    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        self.union_with(other);
        self
    }

    /// Intersects these bounds with `other` in place; disjoint inputs
    /// yield the empty bounds.
    pub fn intersect_with(&mut self, other: Self) {
        if self.is_empty() {
            return;
        }
        if other.is_empty() || self.disjoint(other) {
            self.make_empty();
            return;
        }
        self.x0 = self.x0.max(other.x0);
        self.y0 = self.y0.max(other.y0);
        self.x1 = self.x1.min(other.x1);
        self.y1 = self.y1.min(other.y1);
    }

    /// Returns the intersection of two bounds.
    #[must_use]
    pub fn intersection(mut self, other: Self) -> Self {
        self.intersect_with(other);
        self
    }

    /// Whether these bounds fully contain `other`.
    ///
    /// The empty bounds is contained by everything and contains nothing.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// Whether these bounds share no points with `other`.
    ///
    /// Touching edges count as intersecting. The empty bounds is disjoint
    /// from everything.
    #[must_use]
    pub fn disjoint(self, other: Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return true;
        }
        self.x1 < other.x0 || other.x1 < self.x0 || self.y1 < other.y0 || other.y1 < self.y0
    }

    /// Translates these bounds by `(dx, dy)`.
    #[must_use]
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        if self.is_empty() {
            return self;
        }
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Grows each side outward by `amount`. Empty bounds stay empty.
    #[must_use]
    pub fn padded(self, amount: f64) -> Self {
        if self.is_empty() {
            return self;
        }
        Self::new(
            self.x0 - amount,
            self.y0 - amount,
            self.x1 + amount,
            self.y1 + amount,
        )
    }

    /// Returns the conservative axis-aligned bounds of these bounds mapped
    /// through `tx` (the AABB of the four transformed corners).
    #[must_use]
    pub fn transformed(self, tx: Affine) -> Self {
        if self.is_empty() {
            return self;
        }
        let corners = [
            tx * Point::new(self.x0, self.y0),
            tx * Point::new(self.x1, self.y0),
            tx * Point::new(self.x1, self.y1),
            tx * Point::new(self.x0, self.y1),
        ];
        let mut out = Self::new(corners[0].x, corners[0].y, corners[0].x, corners[0].y);
        for c in &corners[1..] {
            out.union_with(Self::new(c.x, c.y, c.x, c.y));
        }
        out
    }

    /// The four corners in clockwise order starting at the minimum corner.
    #[must_use]
    pub fn corners(self) -> [Point; 4] {
        [
            Point::new(self.x0, self.y0),
            Point::new(self.x1, self.y0),
            Point::new(self.x1, self.y1),
            Point::new(self.x0, self.y1),
        ]
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<Rect> for Bounds {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}
