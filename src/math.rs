//! 2D math primitives built on top of glam.
//!
//! glam supplies `Vec2`, `Vec3`, `Mat2` and `Mat3`. This module adds the
//! rigid-body specific pieces: rotations stored as sine/cosine, rigid
//! transforms, motion sweeps for continuous collision, and the small linear
//! solves used by the constraint solvers.

use glam::{Mat2, Mat3, Vec2, Vec3};

/// Scalar cross product of two vectors (z component of the 3D cross).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a vector and a scalar: `v x s`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `s x v`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Solve `A * x = b` for a 2x2 matrix. Returns zero when `A` is singular.
#[inline]
pub fn solve22(a: &Mat2, b: Vec2) -> Vec2 {
    let (a11, a12) = (a.x_axis.x, a.y_axis.x);
    let (a21, a22) = (a.x_axis.y, a.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Inverse of a 2x2 matrix, or zero when singular.
#[inline]
pub fn inverse22(a: &Mat2) -> Mat2 {
    let (a11, b12) = (a.x_axis.x, a.y_axis.x);
    let (c21, d22) = (a.x_axis.y, a.y_axis.y);
    let mut det = a11 * d22 - b12 * c21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat2::from_cols(
        Vec2::new(det * d22, -det * c21),
        Vec2::new(-det * b12, det * a11),
    )
}

/// Solve `A * x = b` for a 3x3 matrix. Returns zero when `A` is singular.
#[inline]
pub fn solve33(a: &Mat3, b: Vec3) -> Vec3 {
    let mut det = a.x_axis.dot(a.y_axis.cross(a.z_axis));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(a.y_axis.cross(a.z_axis)),
        det * a.x_axis.dot(b.cross(a.z_axis)),
        det * a.x_axis.dot(a.y_axis.cross(b)),
    )
}

/// Solve only the upper-left 2x2 block of a 3x3 matrix.
#[inline]
pub fn solve33_as_22(a: &Mat3, b: Vec2) -> Vec2 {
    let block = Mat2::from_cols(a.x_axis.truncate(), a.y_axis.truncate());
    solve22(&block, b)
}

/// Symmetric inverse of a 3x3 matrix, or zero when singular.
pub fn sym_inverse33(a: &Mat3) -> Mat3 {
    let mut det = a.x_axis.dot(a.y_axis.cross(a.z_axis));
    if det != 0.0 {
        det = 1.0 / det;
    }

    let (a11, a12, a13) = (a.x_axis.x, a.y_axis.x, a.z_axis.x);
    let (a22, a23) = (a.y_axis.y, a.z_axis.y);
    let a33 = a.z_axis.z;

    let m11 = det * (a22 * a33 - a23 * a23);
    let m12 = det * (a13 * a23 - a12 * a33);
    let m13 = det * (a12 * a23 - a13 * a22);
    let m22 = det * (a11 * a33 - a13 * a13);
    let m23 = det * (a13 * a12 - a11 * a23);
    let m33 = det * (a11 * a22 - a12 * a12);

    Mat3::from_cols(
        Vec3::new(m11, m12, m13),
        Vec3::new(m12, m22, m23),
        Vec3::new(m13, m23, m33),
    )
}

/// A 2D rotation stored as sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Rot = Rot { s: 0.0, c: 1.0 };

    /// Create a rotation from an angle in radians.
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    #[inline]
    pub fn set_angle(&mut self, angle: f32) {
        *self = Self::from_angle(angle);
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse rotate a vector.
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Compose two rotations: `self * r`.
    #[inline]
    pub fn mul(&self, r: &Rot) -> Rot {
        Rot {
            s: self.s * r.c + self.c * r.s,
            c: self.c * r.c - self.s * r.s,
        }
    }

    /// Transpose compose: `inv(self) * r`.
    #[inline]
    pub fn mul_t(&self, r: &Rot) -> Rot {
        Rot {
            s: self.c * r.s - self.s * r.c,
            c: self.c * r.c + self.s * r.s,
        }
    }
}

/// A rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    #[inline]
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    #[inline]
    pub fn from_translation(position: Vec2) -> Self {
        Self {
            p: position,
            q: Rot::IDENTITY,
        }
    }

    /// Transform a point from local space into the parent frame.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Transform a point from the parent frame into local space.
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        self.q.apply_inv(v - self.p)
    }

    /// `self * b`
    #[inline]
    pub fn mul(&self, b: &Transform) -> Transform {
        Transform {
            q: self.q.mul(&b.q),
            p: self.q.apply(b.p) + self.p,
        }
    }

    /// `inv(self) * b`
    #[inline]
    pub fn mul_t(&self, b: &Transform) -> Transform {
        Transform {
            q: self.q.mul_t(&b.q),
            p: self.q.apply_inv(b.p - self.p),
        }
    }
}

/// Describes the motion of a body over a time step for continuous collision.
///
/// Positions are of the center of mass; the body origin is recovered through
/// `local_center`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    /// Local center of mass position.
    pub local_center: Vec2,
    /// Center world position at `alpha0`.
    pub c0: Vec2,
    /// Center world position at the end of the step.
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
    /// Fraction of the current time step in [0, 1]; `c0`/`a0` are at this time.
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in [0, 1], where 0 is `alpha0`.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let p = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::from_angle(angle);
        Transform {
            p: p - q.apply(self.local_center),
            q,
        }
    }

    /// Advance the sweep start forward to `alpha`, yielding a new initial state.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Normalize the angles into [-pi, pi] without changing the motion.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_rot_roundtrip() {
        let q = Rot::from_angle(0.7);
        let v = Vec2::new(1.5, -2.0);
        let back = q.apply_inv(q.apply(v));
        assert!((back - v).length() < EPS);
        assert!((q.angle() - 0.7).abs() < EPS);
    }

    #[test]
    fn test_transform_mul_t_is_relative() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.3);
        let b = Transform::new(Vec2::new(-4.0, 0.5), -1.1);
        let rel = a.mul_t(&b);
        let p = Vec2::new(0.25, 0.75);
        let world = b.apply(p);
        let via_a = a.apply(rel.apply(p));
        assert!((world - via_a).length() < 1e-4);
    }

    #[test]
    fn test_cross_helpers() {
        let a = Vec2::new(1.0, 0.0);
        let b = Vec2::new(0.0, 1.0);
        assert_eq!(cross(a, b), 1.0);
        assert_eq!(cross_sv(1.0, a), b);
        assert_eq!(cross_vs(b, 1.0), a);
    }

    #[test]
    fn test_solve22() {
        let m = Mat2::from_cols(Vec2::new(2.0, 0.0), Vec2::new(1.0, 3.0));
        let x = Vec2::new(1.0, -2.0);
        let b = m * x;
        let solved = solve22(&m, b);
        assert!((solved - x).length() < EPS);
    }

    #[test]
    fn test_solve33() {
        let m = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(1.0, 3.0, 1.0),
            Vec3::new(0.0, 1.0, 2.0),
        );
        let x = Vec3::new(0.5, -1.0, 2.0);
        let solved = solve33(&m, m * x);
        assert!((solved - x).length() < 1e-4);

        let inv = sym_inverse33(&m);
        let id = inv * m;
        assert!((id.x_axis - Vec3::X).length() < 1e-4);
        assert!((id.z_axis - Vec3::Z).length() < 1e-4);
    }

    #[test]
    fn test_sweep_advance() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        sweep.advance(0.5);
        assert!((sweep.c0.x - 5.0).abs() < EPS);
        assert!((sweep.a0 - 0.5).abs() < EPS);
        let xf = sweep.transform_at(1.0);
        assert!((xf.p.x - 10.0).abs() < EPS);
    }
}
