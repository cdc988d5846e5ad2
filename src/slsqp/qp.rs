//! Inequality-constrained quadratic subproblem.
//!
//! ```text
//! minimize    ½·dᵀ·B·d + gᵀ·d
//! subject to  A·d >= b
//! ```
//!
//! with `B` symmetric positive definite. The dual
//!
//! ```text
//! minimize    ½·λᵀ·(A·B⁻¹·Aᵀ)·λ − λᵀ·(b + A·B⁻¹·g),   λ >= 0
//! ```
//!
//! is solved by Hildreth's projected coordinate descent, keeping the primal
//! iterate `d = B⁻¹·(Aᵀ·λ − g)` up to date after each coordinate move.
//!
//! # References
//!
//! - Hildreth (1957), "A Quadratic Programming Procedure"
//! - Nocedal & Wright (2006), "Numerical Optimization", §18.3 (elastic mode)

use super::linalg::{cholesky, norm};
use ndarray::{s, Array1, Array2};

const MAX_SWEEPS: usize = 20_000;
const SWEEP_TOL: f64 = 1e-13;
const FEASIBILITY_TOL: f64 = 1e-9;
const MULTIPLIER_CAP: f64 = 1e12;

/// Why the subproblem could not be solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QpError {
    /// `B` has no Cholesky factor.
    NotPositiveDefinite,
    /// No `d` satisfies `A·d >= b`.
    Inconsistent,
}

#[derive(Debug, Clone)]
pub(crate) struct QpSolution {
    pub d: Array1<f64>,
    /// One multiplier per row of `A`, all non-negative.
    pub multipliers: Array1<f64>,
    /// Relaxation used by [`solve_elastic`]; zero for [`solve`].
    pub sigma: f64,
}

pub(crate) fn solve(
    hessian: &Array2<f64>,
    gradient: &Array1<f64>,
    rows: &Array2<f64>,
    rhs: &Array1<f64>,
) -> Result<QpSolution, QpError> {
    let factor = cholesky(hessian).ok_or(QpError::NotPositiveDefinite)?;
    let m = rows.nrows();

    let mut d = factor.solve(gradient.view());
    d.mapv_inplace(|v| -v);

    let z: Vec<Array1<f64>> = rows
        .rows()
        .into_iter()
        .map(|row| factor.solve(row))
        .collect();
    let diag: Vec<f64> = rows
        .rows()
        .into_iter()
        .zip(&z)
        .map(|(row, zi)| row.dot(zi))
        .collect();
    let z_norms: Vec<f64> = z.iter().map(|zi| norm(zi.view())).collect();

    let mut lambda = Array1::<f64>::zeros(m);
    for _ in 0..MAX_SWEEPS {
        let mut max_move = 0.0_f64;
        for i in 0..m {
            if diag[i] <= f64::EPSILON {
                continue;
            }
            let residual = rows.row(i).dot(&d) - rhs[i];
            let next = (lambda[i] - residual / diag[i]).max(0.0);
            let delta = next - lambda[i];
            if delta != 0.0 {
                d.scaled_add(delta, &z[i]);
                lambda[i] = next;
                max_move = max_move.max(delta.abs() * z_norms[i]);
            }
        }
        if max_move <= SWEEP_TOL * (1.0 + norm(d.view())) {
            break;
        }
        if lambda.iter().any(|v| !v.is_finite() || *v > MULTIPLIER_CAP) {
            return Err(QpError::Inconsistent);
        }
    }

    let consistent = rows
        .rows()
        .into_iter()
        .zip(rhs)
        .all(|(row, &b)| row.dot(&d) - b >= -FEASIBILITY_TOL * (1.0 + b.abs()));
    if !consistent {
        return Err(QpError::Inconsistent);
    }

    Ok(QpSolution {
        d,
        multipliers: lambda,
        sigma: 0.0,
    })
}

/// Solves the subproblem with the first `relaxed` rows softened.
///
/// Adds a variable `σ ∈ [0, 1]` and replaces each relaxed row
/// `aᵢᵀ·d >= bᵢ` by `aᵢᵀ·d + bᵢ·σ >= bᵢ`, so `d = 0, σ = 1` is always
/// feasible. `σ` is charged `½·penalty·σ²` in the objective. The
/// remaining rows (variable bounds) stay hard.
pub(crate) fn solve_elastic(
    hessian: &Array2<f64>,
    gradient: &Array1<f64>,
    rows: &Array2<f64>,
    rhs: &Array1<f64>,
    relaxed: usize,
    penalty: f64,
) -> Result<QpSolution, QpError> {
    let n = hessian.nrows();
    let m = rows.nrows();

    let mut ext_hessian = Array2::<f64>::zeros((n + 1, n + 1));
    ext_hessian.slice_mut(s![..n, ..n]).assign(hessian);
    ext_hessian[[n, n]] = penalty;

    let mut ext_gradient = Array1::<f64>::zeros(n + 1);
    ext_gradient.slice_mut(s![..n]).assign(gradient);

    let mut ext_rows = Array2::<f64>::zeros((m + 2, n + 1));
    ext_rows.slice_mut(s![..m, ..n]).assign(rows);
    let mut ext_rhs = Array1::<f64>::zeros(m + 2);
    ext_rhs.slice_mut(s![..m]).assign(rhs);
    for i in 0..relaxed.min(m) {
        ext_rows[[i, n]] = rhs[i];
    }
    // 0 <= σ <= 1
    ext_rows[[m, n]] = 1.0;
    ext_rows[[m + 1, n]] = -1.0;
    ext_rhs[m + 1] = -1.0;

    let solution = solve(&ext_hessian, &ext_gradient, &ext_rows, &ext_rhs)?;
    Ok(QpSolution {
        d: solution.d.slice(s![..n]).to_owned(),
        multipliers: solution.multipliers.slice(s![..m]).to_owned(),
        sigma: solution.d[n],
    })
}
