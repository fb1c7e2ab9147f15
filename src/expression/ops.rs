//! Differentiable operation library.
//!
//! Each operation supplies a forward function over its argument values and
//! the partial derivative with respect to each argument evaluated at the
//! same point, expressed in the tangent space of that argument. Operations
//! are stateless and pure; the evaluation engine never needs to know which
//! operation it is chaining, so adding one means implementing [`UnaryOp`]
//! or [`BinaryOp`] and exposing a builder method - the engine is untouched.
//!
//! Pose partials use the right-perturbation model `X · Exp([ω, v])`; see
//! the derivation on [`TransformTo`].

use crate::manifold::so3::SO3;
use crate::values::Value;
use nalgebra::{DMatrix, Matrix2, SMatrix};
use std::fmt::Debug;

/// A differentiable operation with one argument.
pub trait UnaryOp: Debug + Send + Sync {
    /// Operation name, for graph debugging.
    fn name(&self) -> &'static str;

    /// Forward function.
    fn forward(&self, a: &Value) -> Value;

    /// Partial derivative of the output's tangent coordinates with respect
    /// to the argument's tangent perturbation, evaluated at `a`
    /// (rows = output DoF, cols = argument DoF).
    fn partial(&self, a: &Value) -> DMatrix<f64>;
}

/// A differentiable operation with two arguments.
pub trait BinaryOp: Debug + Send + Sync {
    /// Operation name, for graph debugging.
    fn name(&self) -> &'static str;

    /// Forward function.
    fn forward(&self, a: &Value, b: &Value) -> Value;

    /// Partial derivatives with respect to each argument, evaluated at
    /// `(a, b)`, in the same order as the arguments.
    fn partials(&self, a: &Value, b: &Value) -> (DMatrix<f64>, DMatrix<f64>);
}

fn to_dmatrix<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> DMatrix<f64> {
    DMatrix::from_column_slice(R, C, m.as_slice())
}

/// Transform a world point into a pose's local frame: `q = Rᵀ(p − t)`.
///
/// With the right perturbation `X' = X · Exp([ω, v])`, at first order
/// `R' ≈ R(I + [ω]ₓ)` and `t' ≈ t + Rv`, so
/// `q' ≈ q + [q]ₓ ω − v`, giving `D_pose = [ [q]ₓ  −I ]` and
/// `D_point = Rᵀ`.
#[derive(Debug, Clone, Copy)]
pub struct TransformTo;

impl BinaryOp for TransformTo {
    fn name(&self) -> &'static str {
        "transform_to"
    }

    fn forward(&self, a: &Value, b: &Value) -> Value {
        Value::Point3(a.as_pose().transform_to(b.as_point3()))
    }

    fn partials(&self, a: &Value, b: &Value) -> (DMatrix<f64>, DMatrix<f64>) {
        let pose = a.as_pose();
        let q = pose.transform_to(b.as_point3());

        let mut d_pose = SMatrix::<f64, 3, 6>::zeros();
        d_pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&SO3::hat(&q));
        d_pose
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(-nalgebra::Matrix3::identity()));

        let d_point = pose.rotation().inverse().rotation_matrix();

        (to_dmatrix(&d_pose), to_dmatrix(&d_point))
    }
}

/// Perspective projection onto the normalized image plane:
/// `(x, y, z) ↦ (x/z, y/z)`.
///
/// The point must lie strictly in front of the camera (`z > 0`). Points at
/// or behind the camera plane produce non-finite components that propagate
/// through downstream values and Jacobians; callers that cannot rule such
/// points out must screen them before building the factor.
#[derive(Debug, Clone, Copy)]
pub struct Project;

impl UnaryOp for Project {
    fn name(&self) -> &'static str {
        "project"
    }

    fn forward(&self, a: &Value) -> Value {
        let p = a.as_point3();
        Value::Point2(nalgebra::Vector2::new(p.x / p.z, p.y / p.z))
    }

    fn partial(&self, a: &Value) -> DMatrix<f64> {
        let p = a.as_point3();
        let z_inv = 1.0 / p.z;
        let z_inv2 = z_inv * z_inv;
        let d = SMatrix::<f64, 2, 3>::new(
            z_inv,
            0.0,
            -p.x * z_inv2, //
            0.0,
            z_inv,
            -p.y * z_inv2,
        );
        to_dmatrix(&d)
    }
}

/// Map a normalized image point to pixel coordinates with a [`Cal3`]
/// calibration.
///
/// [`Cal3`]: crate::calibration::Cal3
#[derive(Debug, Clone, Copy)]
pub struct Uncalibrate;

impl BinaryOp for Uncalibrate {
    fn name(&self) -> &'static str {
        "uncalibrate"
    }

    fn forward(&self, a: &Value, b: &Value) -> Value {
        Value::Point2(a.as_cal().uncalibrate(b.as_point2()))
    }

    fn partials(&self, a: &Value, b: &Value) -> (DMatrix<f64>, DMatrix<f64>) {
        let cal = a.as_cal();
        let p = b.as_point2();
        (
            to_dmatrix(&cal.uncalibrate_jacobian_cal(p)),
            to_dmatrix(&cal.uncalibrate_jacobian_point()),
        )
    }
}

/// Componentwise subtraction of 2D image points: `a − b`.
#[derive(Debug, Clone, Copy)]
pub struct SubPoint2;

impl BinaryOp for SubPoint2 {
    fn name(&self) -> &'static str {
        "sub"
    }

    fn forward(&self, a: &Value, b: &Value) -> Value {
        Value::Point2(a.as_point2() - b.as_point2())
    }

    fn partials(&self, _a: &Value, _b: &Value) -> (DMatrix<f64>, DMatrix<f64>) {
        (
            to_dmatrix(&Matrix2::identity()),
            to_dmatrix(&(-Matrix2::<f64>::identity())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::se3::SE3;
    use crate::manifold::{Point2, Point3};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_transform_to_forward() {
        let pose = Value::Pose(SE3::new(SO3::identity(), Vector3::new(1.0, 0.0, 0.0)));
        let point = Value::Point3(Point3::new(2.0, 0.0, 0.0));
        let out = TransformTo.forward(&pose, &point);
        assert_relative_eq!(*out.as_point3(), Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_project_forward_and_partial() {
        let p = Value::Point3(Point3::new(0.4, -0.6, 2.0));
        let out = Project.forward(&p);
        assert_relative_eq!(*out.as_point2(), Point2::new(0.2, -0.3));

        let d = Project.partial(&p);
        assert_eq!((d.nrows(), d.ncols()), (2, 3));
        assert_relative_eq!(d[(0, 0)], 0.5);
        assert_relative_eq!(d[(0, 2)], -0.1);
        assert_relative_eq!(d[(1, 2)], 0.15);
    }

    #[test]
    fn test_project_at_zero_depth_is_non_finite() {
        let p = Value::Point3(Point3::new(0.3, -0.1, 0.0));
        let out = Project.forward(&p);
        assert!(!out.as_point2().x.is_finite());

        let d = Project.partial(&p);
        assert!(d.iter().any(|v| !v.is_finite()));
    }

    #[test]
    fn test_sub_partials_are_plus_minus_identity() {
        let a = Value::Point2(Point2::new(1.0, 2.0));
        let b = Value::Point2(Point2::new(0.5, 0.5));
        let (da, db) = SubPoint2.partials(&a, &b);
        assert_relative_eq!(da[(0, 0)], 1.0);
        assert_relative_eq!(db[(1, 1)], -1.0);
        assert_relative_eq!(da[(0, 1)], 0.0);
    }
}
