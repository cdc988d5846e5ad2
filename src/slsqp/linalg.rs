//! Dense factorization of the SQP Hessian.
//!
//! The SQP state lives in ndarray; the factorization goes through nalgebra.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, ArrayView1};

/// Cholesky factor of a symmetric positive definite matrix.
pub(crate) struct Factor(Cholesky<f64, Dyn>);

/// Factors `m`, or `None` when it is not numerically positive definite.
///
/// A pivot `l_jj²` at or below `ε·max(|m_jj|, 1)` counts as singular.
pub(crate) fn cholesky(m: &Array2<f64>) -> Option<Factor> {
    let (rows, cols) = m.dim();
    let dense = DMatrix::from_fn(rows, cols, |i, j| m[[i, j]]);
    let chol = dense.cholesky()?;
    let l = chol.l_dirty();
    let singular = (0..rows).any(|j| {
        let pivot = l[(j, j)];
        !pivot.is_finite() || pivot * pivot <= f64::EPSILON * m[[j, j]].abs().max(1.0)
    });
    if singular {
        return None;
    }
    Some(Factor(chol))
}

impl Factor {
    /// Solves `m·x = b`.
    pub(crate) fn solve(&self, b: ArrayView1<'_, f64>) -> Array1<f64> {
        let rhs = DVector::from_iterator(b.len(), b.iter().copied());
        let x = self.0.solve(&rhs);
        x.iter().copied().collect()
    }
}

pub(crate) fn norm(v: ArrayView1<'_, f64>) -> f64 {
    v.dot(&v).sqrt()
}
