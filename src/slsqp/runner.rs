//! SLSQP driver and back-end adapter.

use super::config::SlsqpConfig;
use super::linalg::norm;
use super::qp::{self, QpError, QpSolution};
use crate::error::{ModelError, SolveError};
use crate::model::NlModel;
use crate::optimizer::{Backend, RunStats, Solution, SolverConfig};
use ndarray::{s, Array1, Array2, ArrayView1};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

const BACKEND_NAME: &str = "slsqp";

/// Armijo constant of the merit line search.
const ARMIJO: f64 = 1e-4;

/// Step halvings tried before the line search gives up.
const MAX_BACKTRACKS: usize = 20;

/// Weight of the relaxation variable in elastic mode.
const ELASTIC_PENALTY: f64 = 1e4;

/// Largest first-order misfit, in units of `eps` per unit slope, that a
/// linearization may show along the finite-difference step.
const KINK_TOL: f64 = 0.1;

/// Fraction of the distance to the box centre moved off a kink.
const NUDGE: f64 = 1e-3;

/// Moves off non-differentiable points before giving up.
const MAX_NUDGES: usize = 3;

/// A scalar function of the decision vector.
pub type ScalarFn<'a> = Box<dyn Fn(&[f64]) -> Result<f64, ModelError> + 'a>;

/// Why an SLSQP run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlsqpExit {
    /// Accuracy goal met at a feasible point.
    Converged,
    /// `max_iterations` reached.
    IterationLimit,
    /// Wall-clock deadline reached.
    TimeLimit,
    /// No step along the search direction decreased the merit function.
    LineSearchFailed,
    /// The quadratic subproblem had no solution, even relaxed.
    SubproblemFailed,
    /// The iterate kept landing where the functions are not differentiable.
    NonSmooth,
}

impl SlsqpExit {
    pub fn message(self) -> &'static str {
        match self {
            SlsqpExit::Converged => "Optimization terminated successfully",
            SlsqpExit::IterationLimit => "Iteration limit reached",
            SlsqpExit::TimeLimit => "Time limit reached",
            SlsqpExit::LineSearchFailed => "Positive directional derivative for linesearch",
            SlsqpExit::SubproblemFailed => "Inequality constraints incompatible",
            SlsqpExit::NonSmooth => "Linearization invalid at a non-differentiable point",
        }
    }
}

impl fmt::Display for SlsqpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of [`minimize`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlsqpResult {
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    /// Constraint values at `x` (`>= 0` feasible).
    pub constraints: Vec<f64>,
    pub exit: SlsqpExit,
    /// SQP iterations.
    pub nit: usize,
    /// Function evaluations, finite differences included.
    pub nfev: usize,
    /// Gradient evaluations.
    pub njev: usize,
}

impl SlsqpResult {
    pub fn success(&self) -> bool {
        self.exit == SlsqpExit::Converged
    }
}

/// Function values and finite-difference gradients with call counters.
struct Evaluator<'p> {
    objective: &'p dyn Fn(&[f64]) -> Result<f64, ModelError>,
    constraints: &'p [ScalarFn<'p>],
    bounds: &'p [(f64, f64)],
    eps: f64,
    nfev: usize,
    njev: usize,
}

impl Evaluator<'_> {
    fn values(&mut self, x: &[f64]) -> Result<(f64, Array1<f64>), ModelError> {
        self.nfev += 1;
        let f = (self.objective)(x)?;
        let c = self
            .constraints
            .iter()
            .map(|ci| ci(x))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((f, Array1::from(c)))
    }

    /// Difference step for coordinate `j`, backward at an upper bound.
    fn step(&self, x: &[f64], j: usize) -> f64 {
        if x[j] + self.eps > self.bounds[j].1 {
            -self.eps
        } else {
            self.eps
        }
    }

    /// Forward differences, stepping backward at an upper bound.
    fn gradients(
        &mut self,
        x: &[f64],
        f: f64,
        c: &Array1<f64>,
    ) -> Result<(Array1<f64>, Array2<f64>), ModelError> {
        self.njev += 1;
        let n = x.len();
        let mut grad = Array1::<f64>::zeros(n);
        let mut jac = Array2::<f64>::zeros((c.len(), n));
        let mut probe = x.to_vec();
        for j in 0..n {
            let step = self.step(x, j);
            probe[j] = x[j] + step;
            let (fp, cp) = self.values(&probe)?;
            probe[j] = x[j];
            grad[j] = (fp - f) / step;
            for i in 0..c.len() {
                jac[[i, j]] = (cp[i] - c[i]) / step;
            }
        }
        Ok((grad, jac))
    }

    /// Completes a point whose values are already known.
    fn point(&mut self, x: Vec<f64>, f: f64, c: Array1<f64>) -> Result<Point, ModelError> {
        let (grad, jac) = self.gradients(&x, f, &c)?;
        Ok(Point { x, f, c, grad, jac })
    }

    /// Whether the linearization at `at` predicts the functions along the
    /// combined difference step.
    ///
    /// Coordinate differences cannot see a kink such as `sqrt(a² + b²)` at
    /// `a = b = 0`; a step that moves every coordinate at once can.
    fn is_smooth(&mut self, at: &Point) -> Result<bool, ModelError> {
        let step = Array1::from_iter((0..at.x.len()).map(|j| self.step(&at.x, j)));
        let probe: Vec<f64> = at.x.iter().zip(&step).map(|(xi, si)| xi + si).collect();
        let (fp, cp) = self.values(&probe)?;
        let limit = KINK_TOL * self.eps;
        let fits = |actual: f64, slope: ArrayView1<'_, f64>| {
            let scale = slope.iter().map(|v| v.abs()).sum::<f64>();
            (actual - slope.dot(&step)).abs() <= limit * (1.0 + scale)
        };
        Ok(fits(fp - at.f, at.grad.view())
            && at
                .jac
                .rows()
                .into_iter()
                .zip(cp.iter().zip(&at.c))
                .all(|(row, (cpi, ci))| fits(cpi - ci, row)))
    }
}

/// An iterate with its values and finite-difference derivatives.
struct Point {
    x: Vec<f64>,
    f: f64,
    c: Array1<f64>,
    grad: Array1<f64>,
    jac: Array2<f64>,
}

/// Minimizes `objective` subject to `constraints(x) >= 0` and box bounds
/// by sequential quadratic programming.
///
/// Each iteration solves a quadratic model built from a damped BFGS
/// Hessian of the Lagrangian and the linearized constraints, falls back
/// to an elastic subproblem when the linearization is inconsistent, and
/// takes a backtracking step on the L1 merit function
/// `f + Σ ρᵢ·max(0, −cᵢ)`.
///
/// `x0` is projected onto the box before the first evaluation.
///
/// # Errors
///
/// Returns an error when `x0` and `bounds` disagree in length, `x0` is not
/// finite, the configuration is invalid, or a function evaluation fails.
/// Running out of iterations or time is reported through
/// [`SlsqpResult::exit`], not as an error.
///
/// # References
///
/// - Kraft (1988), "A Software Package for Sequential Quadratic Programming"
/// - Powell (1978), "A Fast Algorithm for Nonlinearly Constrained
///   Optimization Calculations"
pub fn minimize(
    objective: &dyn Fn(&[f64]) -> Result<f64, ModelError>,
    x0: &[f64],
    bounds: &[(f64, f64)],
    constraints: &[ScalarFn<'_>],
    config: &SlsqpConfig,
    deadline: Option<Instant>,
) -> Result<SlsqpResult, SolveError> {
    config.validate()?;
    if bounds.len() != x0.len() {
        return Err(ModelError::DimensionMismatch {
            expected: bounds.len(),
            got: x0.len(),
        }
        .into());
    }
    if let Some(bad) = x0.iter().find(|v| !v.is_finite()) {
        return Err(SolveError::InfeasibleStart {
            reason: format!("x0 contains {bad}"),
        });
    }

    let n = x0.len();
    let m = constraints.len();
    let mut eval = Evaluator {
        objective,
        constraints,
        bounds,
        eps: config.eps,
        nfev: 0,
        njev: 0,
    };

    let x: Vec<f64> = x0
        .iter()
        .zip(bounds)
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect();
    let (f, c) = eval.values(&x)?;
    let mut at = eval.point(x, f, c)?;
    let mut hessian = Array2::<f64>::eye(n);
    let mut rho = Array1::<f64>::zeros(m);
    let mut nit = 0usize;
    let mut nudges = 0usize;

    let exit = loop {
        if nit >= config.max_iterations {
            break SlsqpExit::IterationLimit;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break SlsqpExit::TimeLimit;
        }
        nit += 1;

        let (rows, rhs) = linearize(&at.x, &at.c, &at.jac, bounds);
        let Some(qp) = subproblem(&mut hessian, &at.grad, &rows, &rhs, m) else {
            break SlsqpExit::SubproblemFailed;
        };
        let d = &qp.d;
        let lambda = qp.multipliers.slice(s![..m]).to_owned();

        let kkt = at.grad.dot(d).abs()
            + lambda
                .iter()
                .zip(&at.c)
                .map(|(l, ci)| (l * ci).abs())
                .sum::<f64>();
        if kkt < config.ftol && max_violation(&at.c) < config.ftol {
            if let Some(exit) = settle(&mut eval, &mut at, &mut hessian, &mut nudges)? {
                break exit;
            }
            continue;
        }

        for (r, l) in rho.iter_mut().zip(&lambda) {
            *r = l.abs().max(0.5 * (*r + l.abs()));
        }
        let phi0 = merit(at.f, &at.c, &rho);
        let predicted = &at.c + &at.jac.dot(d);
        let slope = at.grad.dot(d)
            + rho
                .iter()
                .zip(at.c.iter().zip(&predicted))
                .map(|(r, (ci, pi))| r * ((-pi).max(0.0) - (-ci).max(0.0)))
                .sum::<f64>();
        if slope >= 0.0 {
            break SlsqpExit::LineSearchFailed;
        }

        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = at
                .x
                .iter()
                .zip(d)
                .zip(bounds)
                .map(|((&xi, &di), &(lo, hi))| (xi + alpha * di).clamp(lo, hi))
                .collect();
            let (ft, ct) = eval.values(&trial)?;
            if merit(ft, &ct, &rho) <= phi0 + ARMIJO * alpha * slope {
                accepted = Some((trial, ft, ct));
                break;
            }
            alpha *= 0.5;
        }
        let Some((trial, f_new, c_new)) = accepted else {
            break SlsqpExit::LineSearchFailed;
        };

        let next = eval.point(trial, f_new, c_new)?;
        let s = Array1::from_iter(next.x.iter().zip(&at.x).map(|(a, b)| a - b));
        let y = lagrangian_gradient(&next.grad, &next.jac, &lambda)
            - lagrangian_gradient(&at.grad, &at.jac, &lambda);
        damped_bfgs(&mut hessian, &s, &y);

        let change = (at.f - next.f).abs();
        let step = norm(s.view());
        at = next;

        trace!(
            iteration = nit,
            fun = at.f,
            violation = max_violation(&at.c),
            alpha,
            step,
            elastic = qp.sigma > 0.0,
            "slsqp iteration"
        );

        if (change < config.ftol || step < config.ftol) && max_violation(&at.c) < config.ftol {
            if let Some(exit) = settle(&mut eval, &mut at, &mut hessian, &mut nudges)? {
                break exit;
            }
        }
    };

    Ok(SlsqpResult {
        x: at.x,
        fun: at.f,
        constraints: at.c.to_vec(),
        exit,
        nit,
        nfev: eval.nfev,
        njev: eval.njev,
    })
}

/// Accepts convergence at a smooth point. At a kink the iterate moves
/// toward the box centre with a fresh Hessian and `None` is returned.
fn settle(
    eval: &mut Evaluator<'_>,
    at: &mut Point,
    hessian: &mut Array2<f64>,
    nudges: &mut usize,
) -> Result<Option<SlsqpExit>, ModelError> {
    if eval.is_smooth(at)? {
        return Ok(Some(SlsqpExit::Converged));
    }
    if *nudges >= MAX_NUDGES {
        return Ok(Some(SlsqpExit::NonSmooth));
    }
    *nudges += 1;
    let x: Vec<f64> = at
        .x
        .iter()
        .zip(eval.bounds)
        .map(|(&xi, &(lo, hi))| xi + NUDGE * (0.5 * (lo + hi) - xi))
        .collect();
    debug!(nudges = *nudges, "non-differentiable iterate; moving toward the box centre");
    let (f, c) = eval.values(&x)?;
    *at = eval.point(x, f, c)?;
    *hessian = Array2::eye(hessian.nrows());
    Ok(None)
}

/// Rows `A·d >= b` of the subproblem: linearized constraints first, then
/// the box translated to the step.
fn linearize(
    x: &[f64],
    c: &Array1<f64>,
    jac: &Array2<f64>,
    bounds: &[(f64, f64)],
) -> (Array2<f64>, Array1<f64>) {
    let n = x.len();
    let m = c.len();
    let mut rows = Array2::<f64>::zeros((m + 2 * n, n));
    let mut rhs = Array1::<f64>::zeros(m + 2 * n);
    rows.slice_mut(s![..m, ..]).assign(jac);
    for i in 0..m {
        rhs[i] = -c[i];
    }
    for (j, (&xj, &(lo, hi))) in x.iter().zip(bounds).enumerate() {
        rows[[m + 2 * j, j]] = 1.0;
        rhs[m + 2 * j] = lo - xj;
        rows[[m + 2 * j + 1, j]] = -1.0;
        rhs[m + 2 * j + 1] = xj - hi;
    }
    (rows, rhs)
}

/// Solves the subproblem, resetting the Hessian when it lost definiteness
/// and relaxing the constraint rows when they are inconsistent.
fn subproblem(
    hessian: &mut Array2<f64>,
    grad: &Array1<f64>,
    rows: &Array2<f64>,
    rhs: &Array1<f64>,
    relaxed: usize,
) -> Option<QpSolution> {
    for _ in 0..2 {
        match qp::solve(hessian, grad, rows, rhs) {
            Ok(solution) => return Some(solution),
            Err(QpError::Inconsistent) => {
                debug!("linearized constraints inconsistent; using elastic subproblem");
                return qp::solve_elastic(hessian, grad, rows, rhs, relaxed, ELASTIC_PENALTY).ok();
            }
            Err(QpError::NotPositiveDefinite) => {
                debug!("hessian approximation reset");
                *hessian = Array2::eye(hessian.nrows());
            }
        }
    }
    None
}

fn merit(f: f64, c: &Array1<f64>, rho: &Array1<f64>) -> f64 {
    f + rho
        .iter()
        .zip(c)
        .map(|(r, ci)| r * (-ci).max(0.0))
        .sum::<f64>()
}

fn max_violation(c: &Array1<f64>) -> f64 {
    c.iter().fold(0.0_f64, |acc, &ci| acc.max(-ci))
}

/// `∇f − Jᵀ·λ`.
fn lagrangian_gradient(grad: &Array1<f64>, jac: &Array2<f64>, lambda: &Array1<f64>) -> Array1<f64> {
    grad - &jac.t().dot(lambda)
}

/// BFGS update with Powell's damping, which keeps `B` positive definite.
fn damped_bfgs(hessian: &mut Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) {
    let bs = hessian.dot(s);
    let sbs = s.dot(&bs);
    if sbs <= f64::EPSILON * s.dot(s) {
        return;
    }
    let sy = s.dot(y);
    let y = if sy < 0.2 * sbs {
        let theta = 0.8 * sbs / (sbs - sy);
        y * theta + &bs * (1.0 - theta)
    } else {
        y.clone()
    };
    let sy = s.dot(&y);
    let n = s.len();
    for i in 0..n {
        for j in 0..n {
            hessian[[i, j]] += y[i] * y[j] / sy - bs[i] * bs[j] / sbs;
        }
    }
}

/// Gradient-based back-end: sequential least-squares quadratic programming
/// with finite-difference gradients.
///
/// The objective is converted to minimization form and each canonical
/// constraint `g(x) <= 0` is passed as its slack `−g(x) >= 0`.
/// `SolverConfig::max_iterations` overrides the configured iteration cap.
/// Without `x0` the run starts from the box midpoint.
#[derive(Debug, Clone, Default)]
pub struct SlsqpSolver {
    config: SlsqpConfig,
}

impl SlsqpSolver {
    pub fn new(config: SlsqpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlsqpConfig {
        &self.config
    }
}

impl Backend for SlsqpSolver {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn solve(&self, model: &NlModel, config: &SolverConfig) -> Result<Solution, SolveError> {
        self.config.validate()?;
        config.validate()?;
        model.require_closed()?;
        config.check_start(model)?;

        let objective = model.objective()?;
        let x0 = match &config.x0 {
            Some(x0) => x0.clone(),
            None => model
                .variables()
                .iter()
                .map(|v| v.lower + 0.5 * v.width())
                .collect(),
        };
        let slsqp = match config.max_iterations {
            Some(n) => self.config.clone().with_max_iterations(n),
            None => self.config.clone(),
        };

        let started = Instant::now();
        let deadline = config.time_limit.map(|limit| started + limit);
        let cost = |x: &[f64]| objective.cost(x);
        let constraints: Vec<ScalarFn<'_>> = model
            .constraints()
            .iter()
            .map(|constraint| Box::new(move |x: &[f64]| constraint.slack(x)) as ScalarFn<'_>)
            .collect();

        let result = minimize(&cost, &x0, &model.bounds(), &constraints, &slsqp, deadline)?;
        if slsqp.disp {
            info!(
                exit = %result.exit,
                fun = result.fun,
                iterations = result.nit,
                function_evaluations = result.nfev,
                gradient_evaluations = result.njev,
                "slsqp finished"
            );
        }
        if !result.success() {
            warn!(exit = %result.exit, iterations = result.nit, "slsqp did not converge");
        }

        let converged = result.success();
        let stats = RunStats {
            iterations: result.nit,
            evaluations: result.nfev,
            elapsed: started.elapsed(),
            backend: BACKEND_NAME,
        };
        Solution::classify(model, result.x, converged, config.feasibility_tol, stats)
    }
}
