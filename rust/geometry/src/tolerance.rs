// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tolerance context for geometric comparisons.
//!
//! Every comparison in this crate takes a [`Tolerance`] explicitly instead of
//! reading process-wide settings. Passes that need tighter matching (the face
//! merge engine works on small local coordinates) derive a tightened copy with
//! [`Tolerance::tightened`] and simply drop it when they are done.

use crate::primitives::{Point3D, PointKey, Vector3D};

/// Absolute tolerance plus the decimal precisions used when quantizing
/// coordinates for hashing and when rounding persisted values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerance {
    /// Absolute distance under which two scalars are considered equal.
    pub tol: f64,
    /// Decimal digits kept for double values (point keys, persisted coordinates).
    pub double_precision: u32,
    /// Decimal digits kept for float-ish values (angles, normals).
    pub float_precision: u32,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            tol: 1e-4,
            double_precision: 6,
            float_precision: 4,
        }
    }
}

impl Tolerance {
    pub fn new(tol: f64, double_precision: u32, float_precision: u32) -> Self {
        Self {
            tol,
            double_precision,
            float_precision,
        }
    }

    /// Returns a copy with the tolerance divided by `10^digits` and both
    /// precisions increased by `digits`.
    pub fn tightened(&self, digits: u32) -> Self {
        Self {
            tol: self.tol / 10f64.powi(digits as i32),
            double_precision: self.double_precision + digits,
            float_precision: self.float_precision + digits,
        }
    }

    #[inline]
    pub fn eq(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tol
    }

    #[inline]
    pub fn is_zero(&self, v: f64) -> bool {
        v.abs() <= self.tol
    }

    /// Component-wise point equality.
    #[inline]
    pub fn points_eq(&self, a: &Point3D, b: &Point3D) -> bool {
        self.eq(a.x, b.x) && self.eq(a.y, b.y) && self.eq(a.z, b.z)
    }

    /// Component-wise vector equality.
    #[inline]
    pub fn vectors_eq(&self, a: &Vector3D, b: &Vector3D) -> bool {
        self.eq(a.x, b.x) && self.eq(a.y, b.y) && self.eq(a.z, b.z)
    }

    /// Quantizes a point to `double_precision` decimals so that it can be
    /// used as a hash key.
    #[inline]
    pub fn point_key(&self, p: &Point3D) -> PointKey {
        let scale = 10f64.powi(self.double_precision as i32);
        PointKey([
            quantize(p.x, scale),
            quantize(p.y, scale),
            quantize(p.z, scale),
        ])
    }

    /// Rounds a value to `double_precision` decimals.
    #[inline]
    pub fn round_double(&self, v: f64) -> f64 {
        round_to(v, self.double_precision)
    }

    /// Rounds a value to `float_precision` decimals.
    #[inline]
    pub fn round_float(&self, v: f64) -> f64 {
        round_to(v, self.float_precision)
    }
}

#[inline]
fn quantize(v: f64, scale: f64) -> i64 {
    let q = (v * scale).round();
    // -0.0 and 0.0 must hash identically
    if q == 0.0 {
        0
    } else {
        q as i64
    }
}

#[inline]
fn round_to(v: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (v * scale).round() / scale
}
