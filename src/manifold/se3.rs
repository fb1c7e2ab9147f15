//! SE(3) - Special Euclidean Group in 3D
//!
//! Rigid body transformations (rotation + translation). Elements combine an
//! [`SO3`] rotation and a `Vector3` translation. Tangent elements are
//! ordered `[ω(3), v(3)]` - rotation first, then translation - matching the
//! convention the pose-dependent operations in the expression library
//! differentiate against.
//!
//! The retraction used for optimization is the right-plus
//! `X ⊞ δ = X · Exp(δ)` with the full coupled exponential map (translation
//! passes through the SO(3) left Jacobian).

use crate::manifold::so3::SO3;
use crate::manifold::Manifold;
use nalgebra::{DVector, Matrix4, UnitQuaternion, Vector3, Vector6};
use std::fmt;
use std::ops::Mul;

/// SE(3) group element representing a rigid body transformation in 3D.
#[derive(Clone, Debug, PartialEq)]
pub struct SE3 {
    rotation: SO3,
    translation: Vector3<f64>,
}

impl fmt::Display for SE3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation.quaternion();
        write!(
            f,
            "SE3(translation: [{:.4}, {:.4}, {:.4}], rotation: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

impl SE3 {
    /// Tangent space dimension.
    pub const DOF: usize = 6;

    /// Create a new SE(3) element from rotation and translation.
    pub fn new(rotation: SO3, translation: Vector3<f64>) -> Self {
        SE3 {
            rotation,
            translation,
        }
    }

    /// Identity transformation.
    pub fn identity() -> Self {
        SE3 {
            rotation: SO3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create SE(3) from translation components and a unit quaternion.
    pub fn from_translation_quaternion(
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        SE3 {
            rotation: SO3::new(rotation),
            translation,
        }
    }

    /// Get the rotation part.
    pub fn rotation(&self) -> &SO3 {
        &self.rotation
    }

    /// Get the translation part.
    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    /// Get the homogeneous transformation matrix (4x4).
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Exponential map from a tangent vector `[ω, v]` to a transformation.
    ///
    /// The translation is coupled through the SO(3) left Jacobian:
    /// `Exp([ω, v]) = (Exp(ω), Jl(ω) v)`.
    pub fn exp(xi: &Vector6<f64>) -> Self {
        let omega = Vector3::new(xi[0], xi[1], xi[2]);
        let v = Vector3::new(xi[3], xi[4], xi[5]);
        SE3 {
            rotation: SO3::exp(&omega),
            translation: SO3::left_jacobian(&omega) * v,
        }
    }

    /// Logarithmic map to a tangent vector `[ω, v]`.
    pub fn log(&self) -> Vector6<f64> {
        let omega = self.rotation.log();
        let v = SO3::left_jacobian_inv(&omega) * self.translation;
        Vector6::new(omega.x, omega.y, omega.z, v.x, v.y, v.z)
    }

    /// Inverse transformation: (R, t)⁻¹ = (Rᵀ, -Rᵀ t).
    pub fn inverse(&self) -> Self {
        let rotation_inv = self.rotation.inverse();
        let translation = -rotation_inv.rotate(&self.translation);
        SE3 {
            rotation: rotation_inv,
            translation,
        }
    }

    /// Transform a world point into this pose's local frame: `Rᵀ (p - t)`.
    pub fn transform_to(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse().rotate(&(point - self.translation))
    }

    /// Transform a local point into the world frame: `R p + t`.
    pub fn transform_from(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.rotate(point) + self.translation
    }
}

impl Mul for &SE3 {
    type Output = SE3;

    fn mul(self, rhs: &SE3) -> SE3 {
        SE3 {
            rotation: &self.rotation * &rhs.rotation,
            translation: self.rotation.rotate(&rhs.translation) + self.translation,
        }
    }
}

impl Manifold for SE3 {
    const DOF: usize = 6;

    fn retract(&self, delta: &DVector<f64>) -> Self {
        let xi = Vector6::new(delta[0], delta[1], delta[2], delta[3], delta[4], delta[5]);
        self * &SE3::exp(&xi)
    }

    fn local_coordinates(&self, other: &Self) -> DVector<f64> {
        let xi = (&self.inverse() * other).log();
        DVector::from_column_slice(xi.as_slice())
    }
}
