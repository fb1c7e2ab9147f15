//! Five-parameter pinhole camera calibration.
//!
//! `Cal3` maps intrinsic (normalized) image coordinates to pixel
//! coordinates:
//!
//! ```text
//! uncalibrate([x, y]) = [fx·x + s·y + u0,  fy·y + v0]
//! ```
//!
//! The calibration itself is an optimization variable: it lives on the
//! Euclidean manifold R⁵ with parameter order `(fx, fy, s, u0, v0)`.

use crate::manifold::{Manifold, Point2};
use nalgebra::{DVector, Matrix2, SMatrix};
use std::fmt;

/// Pinhole calibration with focal lengths, skew and principal point.
#[derive(Clone, Debug, PartialEq)]
pub struct Cal3 {
    /// Focal length in x (pixels)
    pub fx: f64,
    /// Focal length in y (pixels)
    pub fy: f64,
    /// Skew coefficient
    pub s: f64,
    /// Principal point x coordinate (pixels)
    pub u0: f64,
    /// Principal point y coordinate (pixels)
    pub v0: f64,
}

impl fmt::Display for Cal3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cal3(fx: {:.4}, fy: {:.4}, s: {:.4}, u0: {:.4}, v0: {:.4})",
            self.fx, self.fy, self.s, self.u0, self.v0
        )
    }
}

impl Default for Cal3 {
    /// Unit focal lengths, zero skew, principal point at the origin.
    fn default() -> Self {
        Cal3::new(1.0, 1.0, 0.0, 0.0, 0.0)
    }
}

impl Cal3 {
    /// Create a new calibration.
    pub fn new(fx: f64, fy: f64, s: f64, u0: f64, v0: f64) -> Self {
        Cal3 { fx, fy, s, u0, v0 }
    }

    /// Create a calibration without skew.
    pub fn new_simple(fx: f64, fy: f64, u0: f64, v0: f64) -> Self {
        Cal3::new(fx, fy, 0.0, u0, v0)
    }

    /// Map an intrinsic image point to pixel coordinates.
    pub fn uncalibrate(&self, p: &Point2) -> Point2 {
        Point2::new(
            self.fx * p.x + self.s * p.y + self.u0,
            self.fy * p.y + self.v0,
        )
    }

    /// Partial derivative of `uncalibrate` with respect to the calibration
    /// parameters `(fx, fy, s, u0, v0)`, evaluated at `p` (2x5).
    pub fn uncalibrate_jacobian_cal(&self, p: &Point2) -> SMatrix<f64, 2, 5> {
        SMatrix::<f64, 2, 5>::new(
            p.x, 0.0, p.y, 1.0, 0.0, //
            0.0, p.y, 0.0, 0.0, 1.0,
        )
    }

    /// Partial derivative of `uncalibrate` with respect to the image point
    /// (2x2).
    pub fn uncalibrate_jacobian_point(&self) -> Matrix2<f64> {
        Matrix2::new(self.fx, self.s, 0.0, self.fy)
    }
}

impl Manifold for Cal3 {
    const DOF: usize = 5;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Cal3::new(
            self.fx + delta[0],
            self.fy + delta[1],
            self.s + delta[2],
            self.u0 + delta[3],
            self.v0 + delta[4],
        )
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice(&[
            other.fx - self.fx,
            other.fy - self.fy,
            other.s - self.s,
            other.u0 - self.u0,
            other.v0 - self.v0,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_identity_mapping() {
        let cal = Cal3::default();
        let p = Point2::new(0.3, -0.7);
        assert_relative_eq!(cal.uncalibrate(&p), p, epsilon = 1e-15);
    }

    #[test]
    fn test_uncalibrate_with_skew() {
        let cal = Cal3::new(500.0, 400.0, 0.1, 320.0, 240.0);
        let p = Point2::new(0.2, 0.5);
        let uv = cal.uncalibrate(&p);
        assert_relative_eq!(uv.x, 500.0 * 0.2 + 0.1 * 0.5 + 320.0, epsilon = 1e-12);
        assert_relative_eq!(uv.y, 400.0 * 0.5 + 240.0, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobians_match_finite_differences() {
        let cal = Cal3::new(500.0, 400.0, 0.1, 320.0, 240.0);
        let p = Point2::new(0.2, 0.5);
        let h = 1e-6;

        let d_cal = cal.uncalibrate_jacobian_cal(&p);
        for j in 0..5 {
            let mut delta = DVector::zeros(5);
            delta[j] = h;
            let plus = cal.retract(&delta).uncalibrate(&p);
            delta[j] = -h;
            let minus = cal.retract(&delta).uncalibrate(&p);
            let column = (plus - minus) / (2.0 * h);
            assert_relative_eq!(d_cal[(0, j)], column.x, epsilon = 1e-6);
            assert_relative_eq!(d_cal[(1, j)], column.y, epsilon = 1e-6);
        }

        let d_point = cal.uncalibrate_jacobian_point();
        for j in 0..2 {
            let mut delta = DVector::zeros(2);
            delta[j] = h;
            let plus = cal.uncalibrate(&p.retract(&delta));
            delta[j] = -h;
            let minus = cal.uncalibrate(&p.retract(&delta));
            let column = (plus - minus) / (2.0 * h);
            assert_relative_eq!(d_point[(0, j)], column.x, epsilon = 1e-6);
            assert_relative_eq!(d_point[(1, j)], column.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_retract_local_roundtrip() {
        let a = Cal3::new(500.0, 400.0, 0.1, 320.0, 240.0);
        let b = Cal3::new(510.0, 395.0, 0.0, 321.0, 239.0);
        let recovered = a.retract(&a.local_coordinates(&b));
        assert_relative_eq!(
            a.local_coordinates(&recovered),
            a.local_coordinates(&b),
            epsilon = 1e-12
        );
    }
}
