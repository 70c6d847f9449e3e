//! 2-D affine transforms, stored as the six free coefficients of a 3×3
//! matrix:
//!
//! ```text
//! | a  c  e |
//! | b  d  f |
//! | 0  0  1 |
//! ```
//!
//! Angles are in degrees throughout, matching the grammar's adjustments.

pub type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self { Self::IDENTITY }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self { e: tx, f: ty, ..Self::IDENTITY }
    }

    pub fn rotate(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self { a: c, b: s, c: -s, d: c, e: 0.0, f: 0.0 }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, d: sy, ..Self::IDENTITY }
    }

    /// Shear by `ax` degrees along x and `ay` degrees along y.
    pub fn skew(ax: f64, ay: f64) -> Self {
        Self { b: ay.to_radians().tan(), c: ax.to_radians().tan(), ..Self::IDENTITY }
    }

    /// Reflection across the line through the origin at `degrees`.
    pub fn reflect(degrees: f64) -> Self {
        let (s, c) = (2.0 * degrees).to_radians().sin_cos();
        Self { a: c, b: s, c: s, d: -c, e: 0.0, f: 0.0 }
    }

    /// `self ∘ inner`: apply `inner` first, then `self`.
    pub fn compose(&self, inner: &Affine) -> Affine {
        Affine {
            a: self.a * inner.a + self.c * inner.b,
            b: self.b * inner.a + self.d * inner.b,
            c: self.a * inner.c + self.c * inner.d,
            d: self.b * inner.c + self.d * inner.d,
            e: self.a * inner.e + self.c * inner.f + self.e,
            f: self.b * inner.e + self.d * inner.f + self.f,
        }
    }

    pub fn apply(&self, (x, y): Point) -> Point {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Linear part only; used for relative offsets.
    pub fn apply_vector(&self, (x, y): Point) -> Point {
        (self.a * x + self.c * y, self.b * x + self.d * y)
    }

    pub fn det(&self) -> f64 { self.a * self.d - self.b * self.c }

    /// Geometric-mean scale factor, `sqrt(|det|)`.
    pub fn scale_factor(&self) -> f64 { self.det().abs().sqrt() }

    /// Rotation of the x axis, in degrees.
    pub fn rotation(&self) -> f64 { self.b.atan2(self.a).to_degrees() }

    pub fn is_identity(&self) -> bool { *self == Self::IDENTITY }

    pub fn approx_eq(&self, other: &Affine, eps: f64) -> bool {
        [
            (self.a, other.a), (self.b, other.b), (self.c, other.c),
            (self.d, other.d), (self.e, other.e), (self.f, other.f),
        ]
        .iter()
        .all(|(x, y)| (x - y).abs() <= eps)
    }
}
