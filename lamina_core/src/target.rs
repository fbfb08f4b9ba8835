// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend render-target contract.
//!
//! The core never rasterizes anything itself. Backends implement
//! [`RenderTarget`] (draw-state plus primitives) and [`Surface`]
//! (an offscreen image that is itself a render target), and the layered
//! rendering walk composes them. A backend is free to be a GPU command
//! encoder, a platform compositor, or the CPU reference implementation in
//! `lamina_backend_raster`.
//!
//! Coordinates handed to a target are in whatever space its current
//! transform maps from; the walk keeps device space and local space
//! straight. Bit-exact rasterization is not part of the contract, but
//! geometric consistency across repeated transforms is.
//!
//! # Failure model
//!
//! Surface allocation ([`RenderTarget::create_surface`],
//! [`RenderTarget::blend`], [`RenderTarget::read_back`]) may fail by
//! returning `None`; the render walk treats that as a recoverable,
//! per-subtree degradation. A [`Surface`] may also report itself
//! [`lost`](Surface::is_lost) after a device reset, which compositing
//! loops respond to by retrying.

use core::any::Any;
use core::fmt;

use kurbo::{Affine, BezPath, Ellipse, Rect, RoundedRect, Stroke};

/// How source pixels combine with destination pixels for ordinary draws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// Source over destination (Porter-Duff `src-over`).
    #[default]
    SrcOver,
    /// Source replaces destination (Porter-Duff `src`).
    Src,
}

/// Pixel blend operator for [`RenderTarget::blend`] and for node blend
/// modes requiring sibling isolation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard source-over alpha compositing. As a *node* blend mode this
    /// still forces sibling isolation: children blend with each other
    /// first and the flattened result composites once into the scene.
    #[default]
    SrcOver,
    /// Source kept where the destination is opaque (used for clip masks).
    SrcIn,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
    /// Overlay blend.
    Overlay,
    /// Additive blend.
    Add,
}

/// Content geometry, in the vocabulary backends rasterize.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// An axis-aligned rectangle.
    Rect(Rect),
    /// A rectangle with rounded corners.
    RoundedRect(RoundedRect),
    /// An ellipse.
    Ellipse(Ellipse),
    /// An arbitrary Bézier path.
    Path(BezPath),
}

impl Geometry {
    /// Conservative local-space bounding box of this geometry.
    #[must_use]
    pub fn bounding_box(&self) -> Rect {
        use kurbo::Shape as _;
        match self {
            Self::Rect(r) => *r,
            Self::RoundedRect(r) => r.bounding_box(),
            Self::Ellipse(e) => e.bounding_box(),
            Self::Path(p) => p.bounding_box(),
        }
    }
}

/// A straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red, 0–1.
    pub r: f32,
    /// Green, 0–1.
    pub g: f32,
    /// Blue, 0–1.
    pub b: f32,
    /// Alpha, 0–1.
    pub a: f32,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    /// Creates an opaque color.
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Creates a color with alpha.
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Whether every pixel painted with this color is fully opaque.
    #[inline]
    #[must_use]
    pub fn is_opaque(self) -> bool {
        self.a >= 1.0
    }
}

/// Paint applied by fill and stroke operations.
#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    /// A solid color.
    Solid(Color),
}

impl Paint {
    /// Whether this paint covers every pixel it touches at full alpha.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        match self {
            Self::Solid(c) => c.is_opaque(),
        }
    }
}

/// A drawing destination with 2-D transform, clip, composite, and alpha
/// state, plus geometry and image primitives.
pub trait RenderTarget {
    /// Current transform from caller space to device space.
    fn transform(&self) -> Affine;

    /// Replaces the current transform.
    fn set_transform(&mut self, tx: Affine);

    /// Concatenates `tx` onto the current transform.
    fn concat_transform(&mut self, tx: Affine) {
        let cur = self.transform();
        self.set_transform(cur * tx);
    }

    /// Current device-space clip rectangle, if any.
    fn clip_rect(&self) -> Option<Rect>;

    /// Replaces the device-space clip rectangle (`None` clears it).
    fn set_clip_rect(&mut self, clip: Option<Rect>);

    /// Current composite mode.
    fn composite_mode(&self) -> CompositeMode;

    /// Sets the composite mode for subsequent draws.
    fn set_composite_mode(&mut self, mode: CompositeMode);

    /// Extra alpha multiplied into every subsequent draw.
    fn extra_alpha(&self) -> f32;

    /// Sets the extra alpha factor.
    fn set_extra_alpha(&mut self, alpha: f32);

    /// Whether depth testing is requested for subsequent draws. Targets
    /// without a depth buffer ignore this.
    fn depth_test(&self) -> bool;

    /// Sets the depth-test flag.
    fn set_depth_test(&mut self, enabled: bool);

    /// Device-space bounds of the whole target, used to bound clips.
    fn device_bounds(&self) -> Rect;

    /// Fills `geometry` with `paint` under the current state.
    fn fill(&mut self, geometry: &Geometry, paint: &Paint);

    /// Strokes `geometry` with `paint` under the current state.
    fn draw(&mut self, geometry: &Geometry, stroke: &Stroke, paint: &Paint);

    /// Allocates an offscreen surface compatible with this target, cleared
    /// to transparent. Returns `None` on resource exhaustion.
    fn create_surface(&mut self, width: u32, height: u32) -> Option<Box<dyn Surface>>;

    /// Draws `src_rect` of `src` into `dst_rect` of this target under the
    /// current transform, composite mode, and extra alpha.
    fn draw_surface(&mut self, src: &dyn Surface, dst_rect: Rect, src_rect: Rect);

    /// Blends `top` onto `bottom` with `mode`, returning the result as a
    /// new surface sized like `bottom`. Returns `None` on resource
    /// exhaustion.
    fn blend(
        &mut self,
        mode: BlendMode,
        bottom: &dyn Surface,
        top: &dyn Surface,
    ) -> Option<Box<dyn Surface>>;

    /// Whether [`read_back`](Self::read_back) is available on this target.
    fn supports_readback(&self) -> bool {
        false
    }

    /// Copies the given device-space rectangle of already-rendered
    /// destination pixels into a new surface. Only meaningful when
    /// [`supports_readback`](Self::supports_readback) returns true.
    fn read_back(&mut self, rect: Rect) -> Option<Box<dyn Surface>> {
        let _ = rect;
        None
    }
}

impl fmt::Debug for dyn RenderTarget + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("transform", &self.transform())
            .field("clip_rect", &self.clip_rect())
            .finish_non_exhaustive()
    }
}

/// An offscreen image that can both be rendered into and drawn from.
///
/// Surfaces are `Send` because the graph that owns them (through cache
/// filters) crosses the sync/render thread handoff.
pub trait Surface: RenderTarget + Send {
    /// Width in device pixels.
    fn width(&self) -> u32;

    /// Height in device pixels.
    fn height(&self) -> u32;

    /// Whether the backing storage was lost (device reset). Lost surfaces
    /// produce undefined pixels; compositing loops rebuild and retry.
    fn is_lost(&self) -> bool {
        false
    }

    /// Shifts the surface contents by whole pixels, leaving the exposed
    /// strip undefined. Returns `false` when the backend cannot scroll in
    /// place, in which case callers re-render from scratch.
    fn scroll_by(&mut self, dx: i32, dy: i32) -> bool {
        let _ = (dx, dy);
        false
    }

    /// Backend downcast hook.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Surface + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}
