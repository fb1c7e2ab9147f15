//! Manifold representations for optimization on non-Euclidean spaces.
//!
//! Expression graphs produce and differentiate values that live on smooth
//! manifolds, so subtraction and differentiation must go through a local
//! tangent-space parameterization rather than raw components:
//!
//! - `retract` maps a manifold element plus a tangent-space delta back to a
//!   manifold element: `x ⊞ δ`.
//! - `local_coordinates` is its inverse around a reference element: it
//!   yields the tangent vector taking the reference element to another.
//!
//! For Lie groups the pair is right-plus / right-minus
//! (`x ⊞ δ = x ∘ Exp(δ)`, `x ⊟ y = Log(x⁻¹ ∘ y)`); for Euclidean types it
//! degenerates to plain addition and subtraction.

use nalgebra::{DVector, Vector2, Vector3};
use std::fmt::Debug;

pub mod se3;
pub mod so3;

/// A 2D image point.
pub type Point2 = Vector2<f64>;

/// A point in 3D Euclidean space.
pub type Point3 = Vector3<f64>;

/// Core trait for manifold-valued optimization variables and intermediate
/// expression values.
///
/// `DOF` is the tangent-space dimension, fixed per type. `retract` and
/// `local_coordinates` are mutually inverse around any element:
/// `x.retract(&x.local_coordinates(&y)) == y` (up to numerical precision).
pub trait Manifold: Clone + Debug + Send + Sync + 'static {
    /// Tangent space dimension
    const DOF: usize;

    /// Apply a tangent-space perturbation: `self ⊞ delta`.
    ///
    /// `delta` must have length `DOF`.
    fn retract(&self, delta: &DVector<f64>) -> Self;

    /// Tangent vector taking `self` to `other`: `other ⊟ self`, expressed
    /// in the frame of `self`.
    fn local_coordinates(&self, other: &Self) -> DVector<f64>;
}

impl Manifold for Point2 {
    const DOF: usize = 2;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Point2::new(self.x + delta[0], self.y + delta[1])
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice(&[other.x - self.x, other.y - self.y])
    }
}

impl Manifold for Point3 {
    const DOF: usize = 3;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        Point3::new(self.x + delta[0], self.y + delta[1], self.z + delta[2])
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice(&[other.x - self.x, other.y - self.y, other.z - self.z])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_retract_local_roundtrip() {
        let a = Point3::new(1.0, -2.0, 3.0);
        let b = Point3::new(0.5, 0.5, 0.5);
        let delta = a.local_coordinates(&b);
        let recovered = a.retract(&delta);
        assert_relative_eq!(recovered, b, epsilon = 1e-12);
    }

    #[test]
    fn test_point2_local_is_subtraction() {
        let a = Point2::new(1.0, 2.0);
        let b = Point2::new(4.0, 6.0);
        let delta = a.local_coordinates(&b);
        assert_relative_eq!(delta[0], 3.0);
        assert_relative_eq!(delta[1], 4.0);
    }
}
