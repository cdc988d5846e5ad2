//! Exploration phase: simulated annealing over the variable box.
//!
//! Moves perturb every coordinate within a radius that shrinks with the
//! square root of the temperature. Worsening moves on the penalized cost
//! are accepted with the Metropolis probability `exp(-delta / T)`.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Lundy & Mees (1986), "Convergence of an Annealing Algorithm"

use super::config::{CoolingSchedule, HybridConfig};
use super::session::{Candidate, HybridSession};
use crate::error::SolveError;

/// Smallest move radius, as a fraction of the variable width.
const MIN_RADIUS: f64 = 1e-4;

/// Counters of one annealing phase.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AnnealStats {
    pub moves: usize,
    pub accepted_moves: usize,
    pub improving_moves: usize,
    pub final_temperature: f64,
}

/// Runs one annealing phase starting from `start`.
///
/// Returns early, without error, when the session budget is exhausted.
pub(crate) fn anneal(
    session: &mut HybridSession<'_>,
    config: &HybridConfig,
    start: Candidate,
) -> Result<AnnealStats, SolveError> {
    let mut current_cost = start.penalized(config.penalty);
    let mut current = start;
    let mut temperature = config.initial_temperature;
    let mut stats = AnnealStats::default();
    let mut step = 0usize;

    while temperature > config.min_temperature {
        let inner_iters = match config.cooling {
            CoolingSchedule::LundyMees { .. } => 1,
            _ => config.iterations_per_temperature,
        };
        let radius =
            (config.initial_step * (temperature / config.initial_temperature).sqrt()).max(MIN_RADIUS);

        for _ in 0..inner_iters {
            if session.exhausted() {
                stats.final_temperature = temperature;
                return Ok(stats);
            }

            let x = session.neighbor(&current.x, radius);
            let neighbor = session.evaluate(x)?;
            let neighbor_cost = neighbor.penalized(config.penalty);
            let delta = neighbor_cost - current_cost;
            stats.moves += 1;

            if delta < 0.0 {
                stats.improving_moves += 1;
            }
            if session.accept(delta, temperature) {
                current = neighbor;
                current_cost = neighbor_cost;
                stats.accepted_moves += 1;
            }
        }

        temperature = cool(temperature, config, step);
        step += 1;
    }

    stats.final_temperature = temperature;
    Ok(stats)
}

/// Apply the cooling schedule to compute the next temperature.
fn cool(temperature: f64, config: &HybridConfig, step: usize) -> f64 {
    match config.cooling {
        CoolingSchedule::Geometric { alpha } => temperature * alpha,

        CoolingSchedule::Linear => {
            let t = config.initial_temperature
                - (step + 1) as f64 * (config.initial_temperature - config.min_temperature)
                    / config.linear_steps as f64;
            // Land strictly below the floor on the last step so the loop ends.
            if step + 1 >= config.linear_steps {
                config.min_temperature * 0.5
            } else {
                t.max(config.min_temperature)
            }
        }

        CoolingSchedule::LundyMees { beta } => temperature / (1.0 + beta * temperature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraint, Expr, NlModel};
    use crate::optimizer::SolverConfig;

    /// Maximize `x + y` on the unit square subject to `x + y <= 1`.
    fn cap_model() -> NlModel {
        let mut model = NlModel::new("cap");
        let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
        let y = Expr::from(model.add_float("y", 0.0, 1.0).unwrap());
        model
            .add_constraint(Constraint::le("sum", x.clone() + y.clone(), 1.0))
            .unwrap();
        model.maximize(x + y).unwrap();
        model.close().unwrap();
        model
    }

    fn run(cooling: CoolingSchedule) -> (AnnealStats, f64) {
        let model = cap_model();
        let solver_config = SolverConfig::default()
            .with_x0(vec![0.0, 0.0])
            .with_seed(42)
            .without_time_limit()
            .with_max_iterations(200_000);
        let config = HybridConfig::default().with_cooling(cooling);
        let mut session = HybridSession::open(&model, &solver_config).unwrap();
        let start = session.incumbent().clone();
        let stats = anneal(&mut session, &config, start).unwrap();
        (stats, session.incumbent().cost)
    }

    #[test]
    fn test_anneal_geometric() {
        let (stats, best) = run(CoolingSchedule::Geometric { alpha: 0.9 });
        assert!(best < -0.95, "expected near -1, got {best}");
        assert!(stats.improving_moves > 0);
        assert!(stats.accepted_moves >= stats.improving_moves);
    }

    #[test]
    fn test_anneal_linear() {
        let (stats, best) = run(CoolingSchedule::Linear);
        assert!(best < -0.95, "expected near -1, got {best}");
        assert!(stats.final_temperature < HybridConfig::default().min_temperature);
    }

    #[test]
    fn test_anneal_lundy_mees() {
        let config = HybridConfig::default();
        let moves = 5000.0;
        let beta = (config.initial_temperature - config.min_temperature)
            / (moves * config.initial_temperature * config.min_temperature);
        let (stats, best) = run(CoolingSchedule::LundyMees { beta });
        assert!(best < -0.9, "expected near -1, got {best}");
        assert!(stats.moves > 0);
    }

    #[test]
    fn test_anneal_respects_budget() {
        let model = cap_model();
        let solver_config = SolverConfig::default()
            .with_seed(7)
            .without_time_limit()
            .with_max_iterations(100);
        let mut session = HybridSession::open(&model, &solver_config).unwrap();
        let start = session.incumbent().clone();
        let stats = anneal(&mut session, &HybridConfig::default(), start).unwrap();
        assert_eq!(session.evaluations(), 100);
        assert_eq!(stats.moves, 99);
    }

    #[test]
    fn test_high_temperature_accepts_uphill() {
        let model = cap_model();
        let solver_config = SolverConfig::default()
            .with_seed(42)
            .without_time_limit()
            .with_max_iterations(2_000);
        let config = HybridConfig::default()
            .with_initial_temperature(1e8)
            .with_min_temperature(1e7);
        let mut session = HybridSession::open(&model, &solver_config).unwrap();
        let start = session.incumbent().clone();
        let stats = anneal(&mut session, &config, start).unwrap();
        let ratio = stats.accepted_moves as f64 / stats.moves as f64;
        assert!(ratio > 0.8, "expected high acceptance at high temp, got {ratio}");
    }

    #[test]
    fn test_cool_schedules_decrease() {
        let config = HybridConfig::default();
        let t = config.initial_temperature;
        assert!(cool(t, &config, 0) < t);

        let linear = HybridConfig::default().with_cooling(CoolingSchedule::Linear);
        let last = cool(t, &linear, linear.linear_steps - 1);
        assert!(last < linear.min_temperature);

        let lm = HybridConfig::default().with_cooling(CoolingSchedule::LundyMees { beta: 1.0 });
        assert!(cool(t, &lm, 0) < t);
    }
}
