//! Measurement weighting models.
//!
//! A noise model whitens residuals and Jacobian blocks by its square-root
//! information so the least-squares problem is expressed in standardized
//! units. Factors hold a shared `Arc<dyn NoiseModel>` reference; absence of
//! a model means identity weighting by explicit policy.

use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

/// Weighting model applied to residuals and Jacobians at linearization.
pub trait NoiseModel: Debug + Send + Sync {
    /// Residual dimension the model applies to.
    fn dim(&self) -> usize;

    /// Scale a residual vector by the square-root information.
    fn whiten(&self, v: &DVector<f64>) -> DVector<f64>;

    /// Scale a Jacobian block by the square-root information (row scaling
    /// for diagonal models).
    fn whiten_matrix(&self, m: &DMatrix<f64>) -> DMatrix<f64>;
}

/// Identity weighting: unit sigma on every component.
#[derive(Clone, Debug)]
pub struct UnitNoise {
    dim: usize,
}

impl UnitNoise {
    /// Create a unit model of the given residual dimension.
    pub fn new(dim: usize) -> Self {
        UnitNoise { dim }
    }
}

impl NoiseModel for UnitNoise {
    fn dim(&self) -> usize {
        self.dim
    }

    fn whiten(&self, v: &DVector<f64>) -> DVector<f64> {
        v.clone()
    }

    fn whiten_matrix(&self, m: &DMatrix<f64>) -> DMatrix<f64> {
        m.clone()
    }
}

/// Diagonal weighting: independent standard deviation per component.
#[derive(Clone, Debug)]
pub struct DiagonalNoise {
    inv_sigmas: DVector<f64>,
}

impl DiagonalNoise {
    /// Create from per-component standard deviations.
    ///
    /// Sigmas must be strictly positive.
    pub fn from_sigmas(sigmas: &DVector<f64>) -> Self {
        assert!(
            sigmas.iter().all(|&s| s > 0.0),
            "noise sigmas must be strictly positive"
        );
        DiagonalNoise {
            inv_sigmas: sigmas.map(|s| 1.0 / s),
        }
    }

    /// Create with the same standard deviation on every component.
    pub fn isotropic(dim: usize, sigma: f64) -> Self {
        Self::from_sigmas(&DVector::from_element(dim, sigma))
    }
}

impl NoiseModel for DiagonalNoise {
    fn dim(&self) -> usize {
        self.inv_sigmas.len()
    }

    fn whiten(&self, v: &DVector<f64>) -> DVector<f64> {
        v.component_mul(&self.inv_sigmas)
    }

    fn whiten_matrix(&self, m: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = m.clone();
        for (i, mut row) in out.row_iter_mut().enumerate() {
            row *= self.inv_sigmas[i];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_noise_is_identity() {
        let model = UnitNoise::new(3);
        let v = DVector::from_column_slice(&[1.0, -2.0, 3.0]);
        assert_relative_eq!(model.whiten(&v), v);
        assert_eq!(model.dim(), 3);
    }

    #[test]
    fn test_diagonal_whitening_scales_components() {
        let model = DiagonalNoise::from_sigmas(&DVector::from_column_slice(&[0.5, 2.0]));
        let v = DVector::from_column_slice(&[1.0, 1.0]);
        let w = model.whiten(&v);
        assert_relative_eq!(w[0], 2.0);
        assert_relative_eq!(w[1], 0.5);
    }

    #[test]
    fn test_diagonal_whitening_scales_matrix_rows() {
        let model = DiagonalNoise::isotropic(2, 0.1);
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let w = model.whiten_matrix(&m);
        assert_relative_eq!(w[(0, 0)], 10.0);
        assert_relative_eq!(w[(1, 2)], 60.0);
    }

    #[test]
    #[should_panic(expected = "strictly positive")]
    fn test_zero_sigma_rejected() {
        DiagonalNoise::from_sigmas(&DVector::from_column_slice(&[1.0, 0.0]));
    }
}
