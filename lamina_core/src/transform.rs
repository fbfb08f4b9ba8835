// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Affine transform helpers.
//!
//! The walks pass accumulated transforms down by value ([`kurbo::Affine`]
//! is `Copy`), so there is no save/restore discipline to get wrong. This
//! module adds the classification and inversion helpers the dirty-region,
//! culling, and cache code need on top of kurbo.

use kurbo::Affine;

/// Whether `tx` is exactly the identity.
#[inline]
#[must_use]
pub fn is_identity(tx: Affine) -> bool {
    tx.as_coeffs() == Affine::IDENTITY.as_coeffs()
}

/// Whether `tx` is a pure translation (identity included).
#[inline]
#[must_use]
pub fn is_translation(tx: Affine) -> bool {
    let [a, b, c, d, _, _] = tx.as_coeffs();
    a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0
}

/// Whether `tx` maps axis-aligned rectangles to axis-aligned rectangles
/// (translation, axis scale, flips; no shear or off-quadrant rotation).
#[inline]
#[must_use]
pub fn is_axis_aligned(tx: Affine) -> bool {
    let [a, b, c, d, _, _] = tx.as_coeffs();
    (b == 0.0 && c == 0.0) || (a == 0.0 && d == 0.0)
}

/// Whether `tx` is translation and/or axis scale, with no rotation or
/// flip component. This is the shape of transform under which an opaque
/// region of a clip node can still be intersected as a rectangle.
#[inline]
#[must_use]
pub fn is_translate_scale(tx: Affine) -> bool {
    let [a, b, c, d, _, _] = tx.as_coeffs();
    b == 0.0 && c == 0.0 && a > 0.0 && d > 0.0
}

/// If `from` and `to` differ only in their translation components,
/// returns `Some((dx, dy))`, the delta carrying `from` to `to`.
#[must_use]
pub fn translation_delta(from: Affine, to: Affine) -> Option<(f64, f64)> {
    let [fa, fb, fc, fd, fe, ff] = from.as_coeffs();
    let [ta, tb, tc, td, te, tf] = to.as_coeffs();
    if fa == ta && fb == tb && fc == tc && fd == td {
        Some((te - fe, tf - ff))
    } else {
        None
    }
}

/// Inverts `tx`, or returns `None` when it is (numerically) singular.
///
/// A singular accumulated transform means the subtree projects to nothing,
/// which callers treat as "nothing to draw here".
#[must_use]
pub fn try_invert(tx: Affine) -> Option<Affine> {
    let det = tx.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    Some(tx.inverse())
}
