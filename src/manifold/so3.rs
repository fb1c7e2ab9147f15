//! SO(3) - Special Orthogonal Group in 3D
//!
//! Rotations in 3D space, represented internally with nalgebra's
//! `UnitQuaternion`. Tangent elements are axis-angle vectors in R³ where the
//! direction gives the rotation axis and the magnitude the angle.
//!
//! Besides the group operations, this module provides the left Jacobian of
//! the exponential map and its inverse, which couple rotation and
//! translation in the SE(3) exp/log maps.

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use std::fmt;
use std::ops::Mul;

/// Threshold below which angle-dependent coefficients switch to their
/// Taylor expansions.
const SMALL_ANGLE: f64 = 1e-10;

/// SO(3) group element representing a rotation in 3D.
#[derive(Clone, Debug, PartialEq)]
pub struct SO3 {
    quaternion: UnitQuaternion<f64>,
}

impl fmt::Display for SO3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl SO3 {
    /// Tangent space dimension.
    pub const DOF: usize = 3;

    /// Create a new SO(3) element from a unit quaternion.
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Identity rotation.
    pub fn identity() -> Self {
        SO3 {
            quaternion: UnitQuaternion::identity(),
        }
    }

    /// Create SO(3) from quaternion coefficients (w, x, y, z), normalizing.
    pub fn from_quaternion_coeffs(w: f64, x: f64, y: f64, z: f64) -> Self {
        let q = Quaternion::new(w, x, y, z);
        SO3::new(UnitQuaternion::from_quaternion(q))
    }

    /// Create SO(3) from Euler angles (roll, pitch, yaw).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        SO3::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Exponential map: axis-angle vector to rotation.
    pub fn exp(omega: &Vector3<f64>) -> Self {
        SO3::new(UnitQuaternion::from_scaled_axis(*omega))
    }

    /// Logarithmic map: rotation to axis-angle vector.
    pub fn log(&self) -> Vector3<f64> {
        self.quaternion.scaled_axis()
    }

    /// Get the quaternion representation.
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    /// Get the rotation matrix (3x3).
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    /// Inverse rotation: R⁻¹ = Rᵀ (quaternion conjugate).
    pub fn inverse(&self) -> Self {
        SO3 {
            quaternion: self.quaternion.inverse(),
        }
    }

    /// Rotate a vector: R v.
    pub fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * v
    }

    /// Hat operator: axis-angle vector to skew-symmetric matrix [ω]ₓ.
    pub fn hat(omega: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(
            0.0, -omega.z, omega.y, //
            omega.z, 0.0, -omega.x, //
            -omega.y, omega.x, 0.0,
        )
    }

    /// Left Jacobian of the SO(3) exponential map.
    ///
    /// Jl(ω) = I + (1 - cos θ)/θ² [ω]ₓ + (θ - sin θ)/θ³ [ω]ₓ²
    pub fn left_jacobian(omega: &Vector3<f64>) -> Matrix3<f64> {
        let theta2 = omega.norm_squared();
        let w = Self::hat(omega);
        if theta2 < SMALL_ANGLE {
            return Matrix3::identity() + 0.5 * w + (w * w) / 6.0;
        }
        let theta = theta2.sqrt();
        Matrix3::identity()
            + ((1.0 - theta.cos()) / theta2) * w
            + ((theta - theta.sin()) / (theta2 * theta)) * (w * w)
    }

    /// Inverse of the left Jacobian of the SO(3) exponential map.
    ///
    /// Jl⁻¹(ω) = I - ½[ω]ₓ + (1/θ² - (1 + cos θ)/(2θ sin θ)) [ω]ₓ²
    pub fn left_jacobian_inv(omega: &Vector3<f64>) -> Matrix3<f64> {
        let theta2 = omega.norm_squared();
        let w = Self::hat(omega);
        if theta2 < SMALL_ANGLE {
            return Matrix3::identity() - 0.5 * w + (w * w) / 12.0;
        }
        let theta = theta2.sqrt();
        let coeff = 1.0 / theta2 - (1.0 + theta.cos()) / (2.0 * theta * theta.sin());
        Matrix3::identity() - 0.5 * w + coeff * (w * w)
    }
}

impl Mul for &SO3 {
    type Output = SO3;

    fn mul(self, rhs: &SO3) -> SO3 {
        SO3 {
            quaternion: self.quaternion * rhs.quaternion,
        }
    }
}
