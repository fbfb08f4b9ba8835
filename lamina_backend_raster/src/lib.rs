// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU reference backend for `lamina_core`.
//!
//! [`RasterImage`] implements the core's
//! [`RenderTarget`](lamina_core::target::RenderTarget) and
//! [`Surface`](lamina_core::target::Surface) contracts over a plain
//! premultiplied-RGBA8 pixel buffer: solid fills of affine-transformed
//! geometry, nearest-neighbor surface blits, per-pixel blend operators,
//! readback, and in-place scrolling. There is no anti-aliasing and no
//! sub-pixel sampling — the goal is deterministic compositing that the
//! core's pixel-equivalence properties can assert against, not display
//! quality.
//!
//! All surfaces produced by a `RasterImage` are `RasterImage`s; handing a
//! surface from a different backend to any drawing call is a contract
//! violation and panics.

use std::any::Any;

use kurbo::{Affine, Point, Rect, Shape as _, Stroke};

use lamina_core::bounds::Bounds;
use lamina_core::target::{
    BlendMode, Color, CompositeMode, Geometry, Paint, RenderTarget, Surface,
};
use lamina_core::transform;

/// A premultiplied-RGBA8 pixel buffer that is both a render target and a
/// surface.
#[derive(Clone, Debug)]
pub struct RasterImage {
    width: u32,
    height: u32,
    /// Premultiplied RGBA, one `[r, g, b, a]` per pixel, row-major.
    pixels: Vec<[u8; 4]>,
    tx: Affine,
    clip: Option<Rect>,
    composite: CompositeMode,
    extra_alpha: f32,
    depth_test: bool,
}

impl RasterImage {
    /// Creates a transparent image.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0; 4]; (width as usize) * (height as usize)],
            tx: Affine::IDENTITY,
            clip: None,
            composite: CompositeMode::SrcOver,
            extra_alpha: 1.0,
            depth_test: false,
        }
    }

    /// The premultiplied pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of range");
        self.pixels[(y * self.width + x) as usize]
    }

    /// The raw premultiplied RGBA bytes, row-major.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Whether every pixel equals `other`'s (sizes included).
    #[must_use]
    pub fn pixels_equal(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.pixels == other.pixels
    }

    /// Fills the whole image with `color` ignoring draw state. Handy for
    /// test backgrounds.
    pub fn clear_to(&mut self, color: Color) {
        let px = premultiply(color, 1.0);
        self.pixels.fill(px);
    }

    fn in_clip(&self, x: u32, y: u32) -> bool {
        match self.clip {
            None => true,
            Some(clip) => {
                let cx = f64::from(x) + 0.5;
                let cy = f64::from(y) + 0.5;
                cx >= clip.x0 && cx < clip.x1 && cy >= clip.y0 && cy < clip.y1
            }
        }
    }

    fn composite_pixel(&mut self, x: u32, y: u32, src: [u8; 4]) {
        if !self.in_clip(x, y) {
            return;
        }
        let i = (y * self.width + x) as usize;
        let dst = self.pixels[i];
        self.pixels[i] = match self.composite {
            CompositeMode::Src => src,
            CompositeMode::SrcOver => src_over(src, dst),
        };
    }

    /// Iterates device pixels whose centers fall inside `device_bounds`,
    /// clamped to the image.
    fn pixel_range(&self, device_bounds: Rect) -> (u32, u32, u32, u32) {
        let x0 = device_bounds.x0.floor().max(0.0);
        let y0 = device_bounds.y0.floor().max(0.0);
        let x1 = device_bounds.x1.ceil().min(f64::from(self.width));
        let y1 = device_bounds.y1.ceil().min(f64::from(self.height));
        if x1 <= x0 || y1 <= y0 {
            return (0, 0, 0, 0);
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "clamped to image dimensions above"
        )]
        #[expect(clippy::cast_sign_loss, reason = "clamped non-negative above")]
        let r = (x0 as u32, y0 as u32, x1 as u32, y1 as u32);
        r
    }

    fn fill_geometry(&mut self, geometry: &Geometry, color: Color) {
        let src = premultiply(color, self.extra_alpha);
        if src[3] == 0 && self.composite == CompositeMode::SrcOver {
            return;
        }
        let local_bounds = geometry.bounding_box();
        let device_bounds = Bounds::from_rect(local_bounds).transformed(self.tx).to_rect();
        let (x0, y0, x1, y1) = self.pixel_range(device_bounds);
        let Some(inv) = transform::try_invert(self.tx) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let center = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                let inside = match geometry {
                    Geometry::Rect(r) => r.contains(center),
                    Geometry::RoundedRect(r) => r.contains(center),
                    Geometry::Ellipse(e) => e.contains(center),
                    Geometry::Path(p) => p.contains(center),
                };
                if inside {
                    self.composite_pixel(x, y, src);
                }
            }
        }
    }
}

/// Straight color and extra alpha to premultiplied RGBA8.
fn premultiply(color: Color, extra_alpha: f32) -> [u8; 4] {
    let a = (color.a * extra_alpha).clamp(0.0, 1.0);
    let q = |c: f32| -> u8 {
        #[expect(clippy::cast_possible_truncation, reason = "clamped to 0..=255")]
        #[expect(clippy::cast_sign_loss, reason = "clamped non-negative")]
        let v = ((c.clamp(0.0, 1.0) * a) * 255.0 + 0.5) as u8;
        v
    };
    #[expect(clippy::cast_possible_truncation, reason = "clamped to 0..=255")]
    #[expect(clippy::cast_sign_loss, reason = "clamped non-negative")]
    let qa = (a * 255.0 + 0.5) as u8;
    [q(color.r), q(color.g), q(color.b), qa]
}

fn mul_alpha(px: [u8; 4], alpha: f32) -> [u8; 4] {
    if alpha >= 1.0 {
        return px;
    }
    let scale = alpha.clamp(0.0, 1.0);
    let m = |v: u8| -> u8 {
        #[expect(clippy::cast_possible_truncation, reason = "product stays in 0..=255")]
        #[expect(clippy::cast_sign_loss, reason = "inputs are non-negative")]
        let r = (f32::from(v) * scale + 0.5) as u8;
        r
    };
    [m(px[0]), m(px[1]), m(px[2]), m(px[3])]
}

/// Porter-Duff src-over on premultiplied pixels.
fn src_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let inv_a = 255 - u16::from(src[3]);
    let blend = |s: u8, d: u8| -> u8 {
        let v = u16::from(s) + (u16::from(d) * inv_a + 127) / 255;
        u8::try_from(v.min(255)).expect("clamped to 255")
    };
    [
        blend(src[0], dst[0]),
        blend(src[1], dst[1]),
        blend(src[2], dst[2]),
        blend(src[3], dst[3]),
    ]
}

fn to_f32(px: [u8; 4]) -> [f32; 4] {
    [
        f32::from(px[0]) / 255.0,
        f32::from(px[1]) / 255.0,
        f32::from(px[2]) / 255.0,
        f32::from(px[3]) / 255.0,
    ]
}

fn from_f32(px: [f32; 4]) -> [u8; 4] {
    let q = |v: f32| -> u8 {
        #[expect(clippy::cast_possible_truncation, reason = "clamped to 0..=255")]
        #[expect(clippy::cast_sign_loss, reason = "clamped non-negative")]
        let r = (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        r
    };
    [q(px[0]), q(px[1]), q(px[2]), q(px[3])]
}

/// One pixel of `mode`-blending `top` onto `bottom` (premultiplied in and
/// out).
fn blend_pixel(mode: BlendMode, bottom: [u8; 4], top: [u8; 4]) -> [u8; 4] {
    match mode {
        BlendMode::SrcOver => src_over(top, bottom),
        BlendMode::SrcIn => {
            let a = f32::from(bottom[3]) / 255.0;
            let t = to_f32(top);
            from_f32([t[0] * a, t[1] * a, t[2] * a, t[3] * a])
        }
        BlendMode::Add => {
            let add = |s: u8, d: u8| -> u8 {
                u8::try_from((u16::from(s) + u16::from(d)).min(255)).expect("clamped to 255")
            };
            [
                add(top[0], bottom[0]),
                add(top[1], bottom[1]),
                add(top[2], bottom[2]),
                add(top[3], bottom[3]),
            ]
        }
        BlendMode::Multiply | BlendMode::Screen | BlendMode::Overlay => {
            separable(mode, bottom, top)
        }
    }
}

/// The separable-blend formula on unpremultiplied channels:
/// `co = (1-ab)·as·cs + (1-as)·ab·cb + as·ab·B(cb, cs)`.
fn separable(mode: BlendMode, bottom: [u8; 4], top: [u8; 4]) -> [u8; 4] {
    let b = to_f32(bottom);
    let t = to_f32(top);
    let ab = b[3];
    let at = t[3];
    let unpremul = |c: f32, a: f32| if a > 0.0 { c / a } else { 0.0 };
    let mut out = [0.0_f32; 4];
    out[3] = at + ab * (1.0 - at);
    for i in 0..3 {
        let cb = unpremul(b[i], ab);
        let cs = unpremul(t[i], at);
        let blended = match mode {
            BlendMode::Multiply => cb * cs,
            BlendMode::Screen => cb + cs - cb * cs,
            BlendMode::Overlay => {
                if cb <= 0.5 {
                    2.0 * cb * cs
                } else {
                    1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
                }
            }
            _ => unreachable!("separable() only handles separable modes"),
        };
        out[i] = (1.0 - ab) * at * cs + (1.0 - at) * ab * cb + at * ab * blended;
    }
    from_f32(out)
}

fn as_raster(surface: &dyn Surface) -> &RasterImage {
    surface
        .as_any()
        .downcast_ref::<RasterImage>()
        .expect("surface was not created by the raster backend")
}

impl RenderTarget for RasterImage {
    fn transform(&self) -> Affine {
        self.tx
    }

    fn set_transform(&mut self, tx: Affine) {
        self.tx = tx;
    }

    fn clip_rect(&self) -> Option<Rect> {
        self.clip
    }

    fn set_clip_rect(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }

    fn composite_mode(&self) -> CompositeMode {
        self.composite
    }

    fn set_composite_mode(&mut self, mode: CompositeMode) {
        self.composite = mode;
    }

    fn extra_alpha(&self) -> f32 {
        self.extra_alpha
    }

    fn set_extra_alpha(&mut self, alpha: f32) {
        self.extra_alpha = alpha.clamp(0.0, 1.0);
    }

    fn depth_test(&self) -> bool {
        self.depth_test
    }

    fn set_depth_test(&mut self, enabled: bool) {
        // Recorded for state round-tripping; the CPU path has no depth
        // buffer.
        self.depth_test = enabled;
    }

    fn device_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    fn fill(&mut self, geometry: &Geometry, paint: &Paint) {
        let Paint::Solid(color) = paint;
        self.fill_geometry(geometry, *color);
    }

    fn draw(&mut self, geometry: &Geometry, stroke: &Stroke, paint: &Paint) {
        // Stroke by expanding the outline to a fillable path.
        let path = geometry.bounding_path();
        let stroked = kurbo::stroke(path, stroke, &kurbo::StrokeOpts::default(), 0.1);
        let Paint::Solid(color) = paint;
        self.fill_geometry(&Geometry::Path(stroked), *color);
    }

    fn create_surface(&mut self, width: u32, height: u32) -> Option<Box<dyn Surface>> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Box::new(Self::new(width, height)))
    }

    fn draw_surface(&mut self, src: &dyn Surface, dst_rect: Rect, src_rect: Rect) {
        let src = as_raster(src);
        if dst_rect.width() <= 0.0 || dst_rect.height() <= 0.0 {
            return;
        }
        let device_bounds = Bounds::from_rect(dst_rect).transformed(self.tx).to_rect();
        let (x0, y0, x1, y1) = self.pixel_range(device_bounds);
        let Some(inv) = transform::try_invert(self.tx) else {
            return;
        };
        let sx = src_rect.width() / dst_rect.width();
        let sy = src_rect.height() / dst_rect.height();
        for y in y0..y1 {
            for x in x0..x1 {
                let local = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if !dst_rect.contains(local) {
                    continue;
                }
                let u = src_rect.x0 + (local.x - dst_rect.x0) * sx;
                let v = src_rect.y0 + (local.y - dst_rect.y0) * sy;
                if u < 0.0 || v < 0.0 || u >= f64::from(src.width) || v >= f64::from(src.height) {
                    continue;
                }
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "bounds-checked against the source size above"
                )]
                #[expect(clippy::cast_sign_loss, reason = "checked non-negative above")]
                let sample = src.pixel(u as u32, v as u32);
                let sample = mul_alpha(sample, self.extra_alpha);
                if sample == [0, 0, 0, 0] && self.composite == CompositeMode::SrcOver {
                    continue;
                }
                self.composite_pixel(x, y, sample);
            }
        }
    }

    fn blend(
        &mut self,
        mode: BlendMode,
        bottom: &dyn Surface,
        top: &dyn Surface,
    ) -> Option<Box<dyn Surface>> {
        let bottom = as_raster(bottom);
        let top = as_raster(top);
        let mut out = Self::new(bottom.width, bottom.height);
        for y in 0..out.height {
            for x in 0..out.width {
                let b = bottom.pixel(x, y);
                let t = if x < top.width && y < top.height {
                    top.pixel(x, y)
                } else {
                    [0; 4]
                };
                out.pixels[(y * out.width + x) as usize] = blend_pixel(mode, b, t);
            }
        }
        Some(Box::new(out))
    }

    fn supports_readback(&self) -> bool {
        true
    }

    fn read_back(&mut self, rect: Rect) -> Option<Box<dyn Surface>> {
        let (x0, y0, x1, y1) = self.pixel_range(rect);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let mut out = Self::new(x1 - x0, y1 - y0);
        for y in y0..y1 {
            for x in x0..x1 {
                out.pixels[((y - y0) * out.width + (x - x0)) as usize] = self.pixel(x, y);
            }
        }
        Some(Box::new(out))
    }
}

impl Surface for RasterImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn scroll_by(&mut self, dx: i32, dy: i32) -> bool {
        if dx == 0 && dy == 0 {
            return true;
        }
        let w = i64::from(self.width);
        let h = i64::from(self.height);
        let old = self.pixels.clone();
        for y in 0..h {
            for x in 0..w {
                let sx = x - i64::from(dx);
                let sy = y - i64::from(dy);
                let px = if sx >= 0 && sx < w && sy >= 0 && sy < h {
                    old[usize::try_from(sy * w + sx).expect("in range")]
                } else {
                    // Exposed area; the caller repaints it.
                    [0; 4]
                };
                self.pixels[usize::try_from(y * w + x).expect("in range")] = px;
            }
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Extension used by `draw`: a fillable outline for each geometry.
trait BoundingPath {
    fn bounding_path(&self) -> kurbo::BezPath;
}

impl BoundingPath for Geometry {
    fn bounding_path(&self) -> kurbo::BezPath {
        match self {
            Self::Rect(r) => r.to_path(0.1),
            Self::RoundedRect(r) => r.to_path(0.1),
            Self::Ellipse(e) => e.to_path(0.1),
            Self::Path(p) => p.clone(),
        }
    }
}
