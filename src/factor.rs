//! Measurement factors over expression graphs.
//!
//! An [`ExpressionFactor`] binds a fixed measurement to the expression that
//! predicts it. Its residual is the tangent-space difference
//! `measured ⊟ predicted` (well-defined even for non-Euclidean measurement
//! types), and [`linearize`](ExpressionFactor::linearize) turns one
//! evaluation of the expression into a [`LinearFactor`] - the sparse
//! block-structured linear approximation consumed by an external
//! least-squares solver.
//!
//! Whitening policy: when no noise model is attached, identity weighting is
//! used by explicit policy and a debug event is emitted; this is
//! informational, never a failure.

use crate::error::{AdError, AdResult};
use crate::expression::{Expr, ExprGraph, JacobianMap};
use crate::noise::NoiseModel;
use crate::values::{Key, Value, Values, ValueType};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use tracing::debug;

/// Sparse linear factor: the local linear approximation of a nonlinear
/// residual around a linearization point.
///
/// One row block per residual dimension, one column block per contributing
/// variable, in ascending key order. Keys with no contribution carry no
/// block.
#[derive(Debug, Clone)]
pub struct LinearFactor {
    terms: Vec<(Key, DMatrix<f64>)>,
    residual: DVector<f64>,
    noise: Option<Arc<dyn NoiseModel>>,
}

impl LinearFactor {
    /// Ordered `(key, block)` pairs.
    pub fn terms(&self) -> &[(Key, DMatrix<f64>)] {
        &self.terms
    }

    /// Keys of the contributing variables, ascending.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.terms.iter().map(|(key, _)| *key)
    }

    /// The Jacobian block for `key`, if that variable contributes.
    pub fn block(&self, key: Key) -> Option<&DMatrix<f64>> {
        self.terms
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, block)| block)
    }

    /// Whitened residual vector.
    pub fn residual(&self) -> &DVector<f64> {
        &self.residual
    }

    /// Row dimension shared by the residual and every block.
    pub fn rows(&self) -> usize {
        self.residual.len()
    }

    /// The weighting model the factor was whitened with, if any.
    pub fn noise(&self) -> Option<&Arc<dyn NoiseModel>> {
        self.noise.as_ref()
    }
}

/// Assemble a Jacobian map, residual and weighting into a [`LinearFactor`].
///
/// Stateless pure transform. Every block's column count is checked against
/// its key's declared tangent dimension in `values`, and every block's row
/// count against the residual dimension; the column-sum invariant follows
/// from the per-key checks.
pub fn assemble(
    jacobians: JacobianMap,
    residual: DVector<f64>,
    noise: Option<Arc<dyn NoiseModel>>,
    values: &Values,
) -> AdResult<LinearFactor> {
    let rows = residual.len();
    let mut terms = Vec::with_capacity(jacobians.len());

    // BTreeMap iteration gives ascending key order.
    for (key, block) in jacobians {
        let expected = values.at(key)?.dof();
        if block.ncols() != expected {
            return Err(AdError::DimensionMismatch {
                key,
                expected,
                actual: block.ncols(),
            });
        }
        if block.nrows() != rows {
            return Err(AdError::RowMismatch {
                key,
                expected: rows,
                actual: block.nrows(),
            });
        }
        terms.push((key, block));
    }

    Ok(LinearFactor {
        terms,
        residual,
        noise,
    })
}

/// Nonlinear measurement factor defined by an expression graph.
///
/// Owns its graph by value: the graph is immutable and side-effect-free, so
/// the factor can be evaluated repeatedly and concurrently against
/// successive assignments produced by the solver.
#[derive(Debug)]
pub struct ExpressionFactor<T: ValueType> {
    graph: ExprGraph,
    root: Expr<T>,
    measured: Value,
    noise: Option<Arc<dyn NoiseModel>>,
    dim: usize,
}

impl<T: ValueType> ExpressionFactor<T> {
    /// Create a factor from an expression and the measurement it predicts.
    ///
    /// The factor dimension is fixed here to the measurement type's tangent
    /// dimension and never recomputed.
    pub fn new(graph: ExprGraph, root: Expr<T>, measured: T) -> Self {
        ExpressionFactor {
            graph,
            root,
            measured: measured.into_value(),
            noise: None,
            dim: T::DOF,
        }
    }

    /// Attach a shared weighting model.
    ///
    /// # Panics
    /// If the model dimension does not match the measurement dimension.
    pub fn with_noise(mut self, noise: Arc<dyn NoiseModel>) -> Self {
        assert_eq!(
            noise.dim(),
            self.dim,
            "noise model dimension must match the measurement dimension"
        );
        self.noise = Some(noise);
        self
    }

    /// Tangent-space dimension of the measurement (number of residual rows).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The fixed measurement.
    pub fn measured(&self) -> &Value {
        &self.measured
    }

    /// Evaluate the predicted measurement at `values`.
    pub fn predict(&self, values: &Values) -> AdResult<Value> {
        self.graph.value(self.root, values)
    }

    /// Unwhitened residual `measured ⊟ predicted`.
    pub fn residual(&self, values: &Values) -> AdResult<DVector<f64>> {
        let predicted = self.predict(values)?;
        Ok(self.measured.local_coordinates(&predicted))
    }

    /// Weighted squared-norm error `0.5 · ‖whiten(residual)‖²`.
    pub fn error(&self, values: &Values) -> AdResult<f64> {
        let residual = self.residual(values)?;
        let whitened = match &self.noise {
            Some(noise) => noise.whiten(&residual),
            None => residual,
        };
        Ok(0.5 * whitened.norm_squared())
    }

    /// Linearize around `values` into a sparse [`LinearFactor`].
    ///
    /// Either returns a fully valid factor or fails entirely; there is no
    /// partial-result mode.
    pub fn linearize(&self, values: &Values) -> AdResult<LinearFactor> {
        let (predicted, mut jacobians) = self.graph.value_and_jacobians(self.root, values)?;
        let mut residual = self.measured.local_coordinates(&predicted);

        match &self.noise {
            Some(noise) => {
                residual = noise.whiten(&residual);
                for block in jacobians.values_mut() {
                    *block = noise.whiten_matrix(block);
                }
            }
            None => {
                debug!(dim = self.dim, "no noise model attached, using identity weighting");
            }
        }

        assemble(jacobians, residual, self.noise.clone(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{Point2, Point3};
    use crate::noise::{DiagonalNoise, UnitNoise};
    use approx::assert_relative_eq;

    fn leaf_factor(measured: Point2) -> ExpressionFactor<Point2> {
        let mut graph = ExprGraph::new();
        let leaf = graph.leaf::<Point2>(1);
        ExpressionFactor::new(graph, leaf, measured)
    }

    #[test]
    fn test_dim_is_fixed_at_construction() {
        let factor = leaf_factor(Point2::new(0.0, 1.0));
        assert_eq!(factor.dim(), 2);
    }

    #[test]
    fn test_error_is_half_squared_norm() {
        let factor = leaf_factor(Point2::new(0.0, 0.0));
        let mut values = Values::new();
        values.insert(1, Point2::new(3.0, 4.0));
        // residual = predicted - measured = (3, 4), ||r||² = 25
        assert_relative_eq!(factor.error(&values).unwrap(), 12.5, epsilon = 1e-12);
    }

    #[test]
    fn test_error_with_diagonal_noise() {
        let noise = Arc::new(DiagonalNoise::isotropic(2, 2.0));
        let factor = leaf_factor(Point2::new(0.0, 0.0)).with_noise(noise);
        let mut values = Values::new();
        values.insert(1, Point2::new(3.0, 4.0));
        // whitened residual = (1.5, 2.0), 0.5 * 6.25
        assert_relative_eq!(factor.error(&values).unwrap(), 3.125, epsilon = 1e-12);
    }

    #[test]
    fn test_linearize_leaf() {
        let factor = leaf_factor(Point2::new(1.0, 1.0));
        let mut values = Values::new();
        values.insert(1, Point2::new(2.0, 0.0));

        let linear = factor.linearize(&values).unwrap();
        assert_eq!(linear.rows(), 2);
        assert_eq!(linear.keys().collect::<Vec<_>>(), vec![1]);
        assert_relative_eq!(linear.block(1).unwrap(), &DMatrix::identity(2, 2));
        assert_relative_eq!(
            linear.residual(),
            &DVector::from_column_slice(&[1.0, -1.0])
        );
    }

    #[test]
    fn test_linearize_whitens_blocks_and_residual() {
        let noise = Arc::new(DiagonalNoise::isotropic(2, 0.5));
        let factor = leaf_factor(Point2::new(0.0, 0.0)).with_noise(noise);
        let mut values = Values::new();
        values.insert(1, Point2::new(1.0, 2.0));

        let linear = factor.linearize(&values).unwrap();
        assert_relative_eq!(linear.block(1).unwrap(), &(2.0 * DMatrix::identity(2, 2)));
        assert_relative_eq!(
            linear.residual(),
            &DVector::from_column_slice(&[2.0, 4.0])
        );
        assert!(linear.noise().is_some());
    }

    #[test]
    fn test_linearize_missing_variable() {
        let factor = leaf_factor(Point2::new(0.0, 0.0));
        let values = Values::new();
        assert_eq!(
            factor.linearize(&values).unwrap_err(),
            AdError::MissingVariable { key: 1 }
        );
    }

    #[test]
    fn test_linearize_idempotent() {
        let factor = leaf_factor(Point2::new(0.5, -0.5));
        let mut values = Values::new();
        values.insert(1, Point2::new(0.25, 0.75));

        let first = factor.linearize(&values).unwrap();
        let second = factor.linearize(&values).unwrap();
        assert_eq!(first.residual(), second.residual());
        assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
        for (key, block) in first.terms() {
            assert_eq!(Some(block), second.block(*key));
        }
    }

    #[test]
    fn test_assemble_column_sum_invariant() {
        let mut graph = ExprGraph::new();
        let pose = graph.leaf::<crate::manifold::se3::SE3>(1);
        let point = graph.leaf::<Point3>(2);
        let local = graph.transform_to(pose, point);
        let projected = graph.project(local);
        let factor = ExpressionFactor::new(graph, projected, Point2::new(0.0, 0.0));

        let mut values = Values::new();
        values.insert(1, crate::manifold::se3::SE3::identity());
        values.insert(2, Point3::new(0.1, 0.2, 1.0));

        let linear = factor.linearize(&values).unwrap();
        let col_sum: usize = linear.terms().iter().map(|(_, b)| b.ncols()).sum();
        let dof_sum: usize = linear
            .keys()
            .map(|k| values.at(k).unwrap().dof())
            .sum();
        assert_eq!(col_sum, dof_sum);
        for (_, block) in linear.terms() {
            assert_eq!(block.nrows(), factor.dim());
        }
    }

    #[test]
    fn test_assemble_rejects_wrong_columns() {
        let mut jacobians = JacobianMap::new();
        jacobians.insert(1, DMatrix::zeros(2, 6));
        let mut values = Values::new();
        values.insert(1, Point3::new(0.0, 0.0, 0.0));

        let result = assemble(
            jacobians,
            DVector::zeros(2),
            None::<Arc<dyn NoiseModel>>,
            &values,
        );
        assert_eq!(
            result.unwrap_err(),
            AdError::DimensionMismatch {
                key: 1,
                expected: 3,
                actual: 6
            }
        );
    }

    #[test]
    fn test_assemble_rejects_wrong_rows() {
        let mut jacobians = JacobianMap::new();
        jacobians.insert(1, DMatrix::zeros(3, 3));
        let mut values = Values::new();
        values.insert(1, Point3::new(0.0, 0.0, 0.0));

        let result = assemble(
            jacobians,
            DVector::zeros(2),
            None::<Arc<dyn NoiseModel>>,
            &values,
        );
        assert_eq!(
            result.unwrap_err(),
            AdError::RowMismatch {
                key: 1,
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_unit_noise_matches_unweighted() {
        let mut values = Values::new();
        values.insert(1, Point2::new(1.0, 2.0));

        let unweighted = leaf_factor(Point2::new(0.0, 0.0));
        let unit = leaf_factor(Point2::new(0.0, 0.0)).with_noise(Arc::new(UnitNoise::new(2)));

        assert_relative_eq!(
            unweighted.error(&values).unwrap(),
            unit.error(&values).unwrap(),
            epsilon = 1e-15
        );
        let a = unweighted.linearize(&values).unwrap();
        let b = unit.linearize(&values).unwrap();
        assert_relative_eq!(a.residual(), b.residual());
    }
}
