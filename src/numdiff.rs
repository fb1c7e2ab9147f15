//! Central finite-difference Jacobians for cross-checking analytic
//! derivatives.
//!
//! Perturbations go through the variable's `retract` and output differences
//! through the output type's `local_coordinates`, so the numerical Jacobian
//! is expressed in exactly the tangent-space coordinates the reverse-mode
//! engine reports. Intended for tests and for validating new operations
//! added to the library.

use crate::error::AdResult;
use crate::expression::{Expr, ExprGraph};
use crate::values::{Key, Values};
use nalgebra::{DMatrix, DVector};

/// Default central-difference step size.
pub const DEFAULT_STEP: f64 = 1e-6;

/// Numerically differentiate the expression rooted at `root` with respect
/// to the variable `key`, by central differences with step `step`.
///
/// Returns a matrix with one row per output tangent dimension and one
/// column per tangent dimension of the variable.
pub fn numerical_jacobian<T>(
    graph: &ExprGraph,
    root: Expr<T>,
    values: &Values,
    key: Key,
    step: f64,
) -> AdResult<DMatrix<f64>> {
    let base = graph.value(root, values)?;
    let variable = values.at(key)?.clone();
    let rows = base.dof();
    let cols = variable.dof();

    let mut jacobian = DMatrix::zeros(rows, cols);
    for j in 0..cols {
        let mut delta = DVector::zeros(cols);

        delta[j] = step;
        let mut perturbed = values.clone();
        perturbed.insert_value(key, variable.retract(&delta));
        let plus = graph.value(root, &perturbed)?;

        delta[j] = -step;
        let mut perturbed = values.clone();
        perturbed.insert_value(key, variable.retract(&delta));
        let minus = graph.value(root, &perturbed)?;

        let column =
            (base.local_coordinates(&plus) - base.local_coordinates(&minus)) / (2.0 * step);
        jacobian.set_column(j, &column);
    }
    Ok(jacobian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::Point2;
    use approx::assert_relative_eq;

    #[test]
    fn test_numerical_jacobian_of_leaf_is_identity() {
        let mut graph = ExprGraph::new();
        let leaf = graph.leaf::<Point2>(1);
        let mut values = Values::new();
        values.insert(1, Point2::new(0.3, -0.8));

        let jacobian = numerical_jacobian(&graph, leaf, &values, 1, DEFAULT_STEP).unwrap();
        assert_relative_eq!(jacobian, DMatrix::identity(2, 2), epsilon = 1e-9);
    }

    #[test]
    fn test_numerical_jacobian_of_sub() {
        let mut graph = ExprGraph::new();
        let a = graph.leaf::<Point2>(1);
        let b = graph.leaf::<Point2>(2);
        let diff = graph.sub(a, b);

        let mut values = Values::new();
        values.insert(1, Point2::new(1.0, 2.0));
        values.insert(2, Point2::new(-0.5, 0.5));

        let d_b = numerical_jacobian(&graph, diff, &values, 2, DEFAULT_STEP).unwrap();
        assert_relative_eq!(d_b, -DMatrix::identity(2, 2), epsilon = 1e-9);
    }
}
