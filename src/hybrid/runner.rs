//! Hybrid search execution loop.

use super::anneal::anneal;
use super::config::HybridConfig;
use super::refine::refine;
use super::session::HybridSession;
use crate::error::{ConfigError, ModelError, SolveError};
use crate::model::{Evaluation, NlModel};
use crate::optimizer::{Backend, Solution, SolveStatus, SolverConfig};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const BACKEND_NAME: &str = "hybrid";

/// Relative cost change below which a restart counts as a stall.
const STALL_TOL: f64 = 1e-7;

/// Two-phase derivative-free back-end.
///
/// 1. Draws `sample_size` random points and anneals from the best one.
/// 2. Refines the incumbent by augmented-Lagrangian pattern search.
///
/// The two phases repeat from the incumbent until the time limit, the
/// iteration cap, or `max_stall_restarts` stops the run. The best feasible
/// incumbent is returned; the run counts as converged when that incumbent
/// came out of a refinement phase that passed its convergence test.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use u_shapeopt::hybrid::HybridSolver;
/// use u_shapeopt::{CupModel, ShapeOptimizer, SolverConfig};
///
/// let optimizer = ShapeOptimizer::new(CupModel::default(), HybridSolver::default()).unwrap();
/// let config = SolverConfig::default().with_time_limit(Duration::from_secs(1));
/// let solution = optimizer.solve(&config).unwrap();
/// println!("{} {}", solution.surface, solution.volume);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HybridSolver {
    config: HybridConfig,
}

impl HybridSolver {
    pub fn new(config: HybridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    fn check_budget(&self, config: &SolverConfig) -> Result<(), ConfigError> {
        if config.time_limit.is_none()
            && config.max_iterations.is_none()
            && self.config.max_stall_restarts.is_none()
        {
            return Err(ConfigError::Unbounded);
        }
        Ok(())
    }
}

impl Backend for HybridSolver {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn solve(&self, model: &NlModel, config: &SolverConfig) -> Result<Solution, SolveError> {
        self.config.validate()?;
        config.validate()?;
        self.check_budget(config)?;
        config.check_start(model)?;

        let mut session = HybridSession::open(model, config)?;
        info!(
            model = %model.name,
            time_limit_ms = config.time_limit.map(|d| d.as_millis() as u64),
            max_iterations = config.max_iterations,
            "hybrid solve started"
        );

        sample(&mut session, self.config.sample_size)?;

        let mut refined_version = None;
        let mut stalls = 0usize;
        let mut restarts = 0usize;

        while !session.exhausted() {
            let before = session.incumbent().clone();

            let start = session.incumbent().clone();
            let annealed = anneal(&mut session, &self.config, start)?;

            let start = session.incumbent().clone();
            let refined = refine(&mut session, &self.config, start)?;
            if refined.converged {
                refined_version = Some(session.version());
            }

            restarts += 1;
            let after = session.incumbent();
            let improved = after.better_than(&before, session.tol())
                && (before.is_feasible(session.tol()) != after.is_feasible(session.tol())
                    || before.cost - after.cost > STALL_TOL * (1.0 + before.cost.abs())
                    || before.violation - after.violation > STALL_TOL);
            stalls = if improved { 0 } else { stalls + 1 };

            debug!(
                restart = restarts,
                cost = after.cost,
                violation = after.violation,
                moves = annealed.moves,
                accepted_moves = annealed.accepted_moves,
                improving_moves = annealed.improving_moves,
                final_temperature = annealed.final_temperature,
                refined_cost = refined.best.cost,
                polls = refined.polls,
                refined = refined.converged,
                stalls,
                "hybrid restart finished"
            );

            if self
                .config
                .max_stall_restarts
                .is_some_and(|max| stalls >= max)
            {
                break;
            }
        }

        let converged = refined_version == Some(session.version());
        let best = session.incumbent().clone();
        let stats = session.stats(BACKEND_NAME);
        drop(session);

        let solution = Solution::classify(model, best.x, converged, config.feasibility_tol, stats)?;
        match solution.status {
            SolveStatus::Converged => info!(
                objective = solution.objective,
                evaluations = solution.evaluations,
                restarts,
                "hybrid solve converged"
            ),
            SolveStatus::BudgetExhausted => warn!(
                objective = solution.objective,
                evaluations = solution.evaluations,
                "hybrid budget exhausted before refinement converged"
            ),
            SolveStatus::Infeasible => warn!(
                violation = solution.max_violation,
                "hybrid search found no feasible point"
            ),
        }
        Ok(solution)
    }
}

/// Evaluates `count` uniform random points and records them.
fn sample(session: &mut HybridSession<'_>, count: usize) -> Result<(), SolveError> {
    let model = session.model();
    let count = session.remaining().map_or(count, |left| count.min(left));
    let points: Vec<Vec<f64>> = (0..count).map(|_| session.random_point()).collect();
    let evals = evaluate_all(model, &points);
    for (x, eval) in points.into_iter().zip(evals) {
        session.record(x, eval?);
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn evaluate_all(model: &NlModel, points: &[Vec<f64>]) -> Vec<Result<Evaluation, ModelError>> {
    points.par_iter().map(|p| model.evaluate(p)).collect()
}

#[cfg(not(feature = "parallel"))]
fn evaluate_all(model: &NlModel, points: &[Vec<f64>]) -> Vec<Result<Evaluation, ModelError>> {
    points.iter().map(|p| model.evaluate(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraint, Expr};
    use std::time::Duration;

    fn disc_model() -> NlModel {
        let mut model = NlModel::new("disc");
        let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
        let y = Expr::from(model.add_float("y", 0.0, 1.0).unwrap());
        model
            .add_constraint(Constraint::le(
                "radius",
                x.clone().pow(2.0) + y.clone().pow(2.0),
                1.0,
            ))
            .unwrap();
        model.maximize(x + y).unwrap();
        model.close().unwrap();
        model
    }

    fn stall_solver() -> HybridSolver {
        HybridSolver::new(HybridConfig::default().with_max_stall_restarts(2))
    }

    #[test]
    fn test_hybrid_disc_converges() {
        let model = disc_model();
        let config = SolverConfig::default()
            .with_seed(42)
            .with_time_limit(Duration::from_secs(10));
        let solution = stall_solver().solve(&model, &config).unwrap();

        assert_eq!(solution.status, SolveStatus::Converged);
        assert!(solution.max_violation <= 1e-6);
        assert!((solution.objective - 2.0_f64.sqrt()).abs() < 1e-4);
        assert_eq!(solution.backend, "hybrid");
    }

    #[test]
    fn test_hybrid_iteration_budget_reports_exhaustion() {
        let model = disc_model();
        let config = SolverConfig::default()
            .with_seed(42)
            .without_time_limit()
            .with_max_iterations(200);
        let solution = HybridSolver::default().solve(&model, &config).unwrap();
        assert_eq!(solution.status, SolveStatus::BudgetExhausted);
        assert!(solution.evaluations <= 200);
        assert!(matches!(
            solution.ensure_converged(),
            Err(SolveError::DidNotConverge { .. })
        ));
    }

    #[test]
    fn test_hybrid_rejects_unbounded_budget() {
        let model = disc_model();
        let config = SolverConfig::default().without_time_limit();
        assert_eq!(
            HybridSolver::default().solve(&model, &config),
            Err(SolveError::Config(ConfigError::Unbounded))
        );
    }

    #[test]
    fn test_hybrid_rejects_out_of_box_start() {
        let model = disc_model();
        let config = SolverConfig::default().with_x0(vec![1.5, 0.0]);
        assert!(matches!(
            stall_solver().solve(&model, &config),
            Err(SolveError::InfeasibleStart { .. })
        ));
    }

    #[test]
    fn test_hybrid_requires_closed_model() {
        let mut model = NlModel::new("open");
        let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
        model.maximize(x).unwrap();
        assert_eq!(
            stall_solver().solve(&model, &SolverConfig::default()),
            Err(SolveError::Model(ModelError::ModelNotClosed))
        );
    }

    #[test]
    fn test_hybrid_reports_infeasible_model() {
        // x >= 2 cannot hold on [0, 1]
        let mut model = NlModel::new("impossible");
        let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
        model
            .add_constraint(Constraint::ge("floor", x.clone(), 2.0))
            .unwrap();
        model.maximize(x).unwrap();
        model.close().unwrap();

        let config = SolverConfig::default()
            .with_seed(3)
            .with_time_limit(Duration::from_secs(10));
        let solution = stall_solver().solve(&model, &config).unwrap();
        assert_eq!(solution.status, SolveStatus::Infeasible);
        assert!((solution.max_violation - 1.0).abs() < 1e-6);
        assert!(matches!(
            solution.ensure_feasible(),
            Err(SolveError::InfeasibleResult { .. })
        ));
    }

    #[test]
    fn test_hybrid_is_reproducible_with_seed() {
        let model = disc_model();
        let config = SolverConfig::default()
            .with_seed(17)
            .without_time_limit()
            .with_max_iterations(5_000);
        let a = HybridSolver::default().solve(&model, &config).unwrap();
        let b = HybridSolver::default().solve(&model, &config).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.evaluations, b.evaluations);
    }
}
