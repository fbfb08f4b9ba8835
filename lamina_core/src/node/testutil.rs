// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal [`Content`] implementations for unit tests.

use kurbo::Rect;

use crate::node::Content;
use crate::target::{Color, Geometry, Paint, RenderTarget};

/// A solid, fully opaque rectangle.
pub(crate) struct OpaqueRect {
    pub(crate) rect: Rect,
    pub(crate) color: Color,
}

impl OpaqueRect {
    pub(crate) fn new(rect: Rect) -> Self {
        Self {
            rect,
            color: Color::WHITE,
        }
    }

    pub(crate) fn with_color(rect: Rect, color: Color) -> Self {
        Self { rect, color }
    }
}

impl Content for OpaqueRect {
    fn render(&mut self, target: &mut dyn RenderTarget) {
        target.fill(&Geometry::Rect(self.rect), &Paint::Solid(self.color));
    }

    fn has_overlapping_contents(&self) -> bool {
        false
    }

    fn supports_opaque_regions(&self) -> bool {
        true
    }

    fn has_opaque_region(&self) -> bool {
        self.color.is_opaque()
    }

    fn compute_opaque_region(&self) -> Option<Rect> {
        self.color.is_opaque().then_some(self.rect)
    }

    fn rect_clip(&self) -> Option<Rect> {
        self.color.is_opaque().then_some(self.rect)
    }
}

/// A translucent rectangle: paints, but never claims an opaque region.
pub(crate) struct TransparentRect {
    rect: Rect,
}

impl TransparentRect {
    pub(crate) fn unit() -> Self {
        Self {
            rect: Rect::new(0.0, 0.0, 1.0, 1.0),
        }
    }
}

impl Content for TransparentRect {
    fn render(&mut self, target: &mut dyn RenderTarget) {
        target.fill(
            &Geometry::Rect(self.rect),
            &Paint::Solid(Color::rgba(1.0, 1.0, 1.0, 0.5)),
        );
    }

    fn has_overlapping_contents(&self) -> bool {
        false
    }
}
