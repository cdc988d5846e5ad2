//! Back-end interface, shared solver configuration and results.

use crate::error::{ConfigError, SolveError};
use crate::model::NlModel;
use std::time::Duration;

/// Default feasibility tolerance on the canonical constraint value.
pub const FEASIBILITY_TOL: f64 = 1e-6;

/// Outcome classification of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveStatus {
    /// The back-end's own convergence test passed at a feasible point.
    Converged,
    /// The time or iteration budget ran out first; the point is feasible.
    BudgetExhausted,
    /// The returned point violates a constraint beyond tolerance.
    Infeasible,
}

/// Budget and tolerance options shared by all back-ends.
///
/// Back-end specific knobs live in
/// [`HybridConfig`](crate::hybrid::HybridConfig) and
/// [`SlsqpConfig`](crate::slsqp::SlsqpConfig).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_shapeopt::SolverConfig;
///
/// let config = SolverConfig::default()
///     .with_time_limit(Duration::from_secs(1))
///     .with_x0(vec![0.3, 0.3, 0.3])
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig {
    /// Wall-clock budget. `None` = no time limit.
    pub time_limit: Option<Duration>,
    /// Iteration budget. `None` = back-end default.
    pub max_iterations: Option<usize>,
    /// Initial guess. Required by gradient-based back-ends.
    pub x0: Option<Vec<f64>>,
    /// Allowed canonical constraint value at an accepted point.
    pub feasibility_tol: f64,
    /// Random seed for stochastic back-ends.
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(1)),
            max_iterations: None,
            x0: None,
            feasibility_tol: FEASIBILITY_TOL,
            seed: None,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn without_time_limit(mut self) -> Self {
        self.time_limit = None;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_x0(mut self, x0: Vec<f64>) -> Self {
        self.x0 = Some(x0);
        self
    }

    pub fn with_feasibility_tol(mut self, tol: f64) -> Self {
        self.feasibility_tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(limit) = self.time_limit {
            if limit.is_zero() {
                return Err(ConfigError::TimeLimit(limit.as_secs_f64()));
            }
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::ZeroCount("max_iterations"));
        }
        if !self.feasibility_tol.is_finite() || self.feasibility_tol <= 0.0 {
            return Err(ConfigError::Tolerance {
                name: "feasibility_tol",
                value: self.feasibility_tol,
            });
        }
        Ok(())
    }

    /// Checks `x0` against the model, if one is set.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::InfeasibleStart`] if `x0` has the wrong length,
    /// contains a non-finite value, or leaves the variable box.
    pub fn check_start(&self, model: &NlModel) -> Result<(), SolveError> {
        let Some(x0) = &self.x0 else {
            return Ok(());
        };
        if x0.len() != model.dimension() {
            return Err(SolveError::InfeasibleStart {
                reason: format!(
                    "x0 has {} entries, model has {} variables",
                    x0.len(),
                    model.dimension()
                ),
            });
        }
        for (var, &value) in model.variables().iter().zip(x0) {
            if !value.is_finite() || !var.contains(value) {
                return Err(SolveError::InfeasibleStart {
                    reason: format!(
                        "{} = {value} outside [{}, {}]",
                        var.name, var.lower, var.upper
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Result of a single solve.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Solution {
    /// Best point found, one entry per model variable.
    pub x: Vec<f64>,
    /// Objective value at `x` in the model's own direction.
    pub objective: f64,
    /// Largest constraint violation at `x`.
    pub max_violation: f64,
    /// Outcome classification.
    pub status: SolveStatus,
    /// Back-end iterations (evaluations for the hybrid search, SQP
    /// iterations for SLSQP).
    pub iterations: usize,
    /// Objective/constraint evaluations.
    pub evaluations: usize,
    /// Wall-clock time spent.
    pub elapsed: Duration,
    /// Name of the back-end that produced this solution.
    pub backend: String,
}

impl Solution {
    /// Builds a solution at `x`, deriving the status from the violation and
    /// the back-end's convergence flag.
    pub(crate) fn classify(
        model: &NlModel,
        x: Vec<f64>,
        converged: bool,
        tol: f64,
        stats: RunStats,
    ) -> Result<Self, SolveError> {
        let max_violation = model.max_violation(&x)?;
        let objective = model.objective()?.value(&x)?;
        let status = if max_violation > tol {
            SolveStatus::Infeasible
        } else if converged {
            SolveStatus::Converged
        } else {
            SolveStatus::BudgetExhausted
        };
        Ok(Self {
            x,
            objective,
            max_violation,
            status,
            iterations: stats.iterations,
            evaluations: stats.evaluations,
            elapsed: stats.elapsed,
            backend: stats.backend.to_string(),
        })
    }

    /// Whether the point satisfies all constraints within tolerance.
    pub fn is_feasible(&self) -> bool {
        self.status != SolveStatus::Infeasible
    }

    /// Converts an infeasible solution into [`SolveError::InfeasibleResult`].
    pub fn ensure_feasible(self) -> Result<Self, SolveError> {
        if self.status == SolveStatus::Infeasible {
            return Err(SolveError::InfeasibleResult {
                violation: self.max_violation,
            });
        }
        Ok(self)
    }

    /// Converts a non-converged solution into an error.
    ///
    /// Infeasible points become [`SolveError::InfeasibleResult`]; feasible
    /// points whose budget ran out become [`SolveError::DidNotConverge`].
    pub fn ensure_converged(self) -> Result<Self, SolveError> {
        let solution = self.ensure_feasible()?;
        if solution.status == SolveStatus::BudgetExhausted {
            return Err(SolveError::DidNotConverge {
                iterations: solution.iterations,
                elapsed_ms: solution.elapsed.as_millis(),
            });
        }
        Ok(solution)
    }
}

/// Counters reported by a back-end run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunStats {
    pub iterations: usize,
    pub evaluations: usize,
    pub elapsed: Duration,
    pub backend: &'static str,
}

/// A numerical search strategy for closed [`NlModel`]s.
///
/// Implementations never alter the model; switching strategy is a matter of
/// passing a different back-end to the same model.
pub trait Backend {
    /// Short identifier used in logs and results.
    fn name(&self) -> &'static str;

    /// Solves the model within the budget in `config`.
    ///
    /// A run that exhausts its budget returns `Ok` with
    /// [`SolveStatus::BudgetExhausted`]; use [`Solution::ensure_converged`]
    /// to treat that as an error.
    fn solve(&self, model: &NlModel, config: &SolverConfig) -> Result<Solution, SolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraint, Expr};

    fn unit_model() -> NlModel {
        let mut model = NlModel::new("unit");
        let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
        model
            .add_constraint(Constraint::le("cap", x.clone(), 0.5))
            .unwrap();
        model.maximize(x).unwrap();
        model.close().unwrap();
        model
    }

    fn stats() -> RunStats {
        RunStats {
            iterations: 10,
            evaluations: 20,
            elapsed: Duration::from_millis(5),
            backend: "test",
        }
    }

    #[test]
    fn test_solver_config_default() {
        let config = SolverConfig::default();
        assert_eq!(config.time_limit, Some(Duration::from_secs(1)));
        assert!(config.x0.is_none());
        assert!((config.feasibility_tol - 1e-6).abs() < 1e-18);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_time = SolverConfig::default().with_time_limit(Duration::ZERO);
        assert!(matches!(zero_time.validate(), Err(ConfigError::TimeLimit(_))));

        let zero_iters = SolverConfig::default().with_max_iterations(0);
        assert!(matches!(zero_iters.validate(), Err(ConfigError::ZeroCount(_))));

        let bad_tol = SolverConfig::default().with_feasibility_tol(-1.0);
        assert!(matches!(bad_tol.validate(), Err(ConfigError::Tolerance { .. })));
    }

    #[test]
    fn test_check_start() {
        let model = unit_model();
        assert!(SolverConfig::default().check_start(&model).is_ok());
        assert!(SolverConfig::default()
            .with_x0(vec![0.3])
            .check_start(&model)
            .is_ok());
        for bad in [vec![1.5], vec![f64::NAN], vec![0.1, 0.2]] {
            assert!(matches!(
                SolverConfig::default().with_x0(bad).check_start(&model),
                Err(SolveError::InfeasibleStart { .. })
            ));
        }
    }

    #[test]
    fn test_classify_statuses() {
        let model = unit_model();

        let converged = Solution::classify(&model, vec![0.5], true, 1e-6, stats()).unwrap();
        assert_eq!(converged.status, SolveStatus::Converged);
        assert!((converged.objective - 0.5).abs() < 1e-15);
        assert!(converged.clone().ensure_converged().is_ok());

        let exhausted = Solution::classify(&model, vec![0.4], false, 1e-6, stats()).unwrap();
        assert_eq!(exhausted.status, SolveStatus::BudgetExhausted);
        assert!(exhausted.clone().ensure_feasible().is_ok());
        assert!(matches!(
            exhausted.ensure_converged(),
            Err(SolveError::DidNotConverge { iterations: 10, .. })
        ));

        let infeasible = Solution::classify(&model, vec![0.9], true, 1e-6, stats()).unwrap();
        assert_eq!(infeasible.status, SolveStatus::Infeasible);
        assert!(!infeasible.is_feasible());
        assert!(matches!(
            infeasible.ensure_feasible(),
            Err(SolveError::InfeasibleResult { .. })
        ));
    }
}
