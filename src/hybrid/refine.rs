//! Refinement phase: augmented-Lagrangian pattern search.
//!
//! The inner loop polls the current point along `±e_i` and a few random
//! unit directions, moving to the first direction that lowers the merit
//!
//! ```text
//! L(x) = cost(x) + Σ_i (max(0, λ_i + μ·g_i(x))² − λ_i²) / (2μ)
//! ```
//!
//! and halving the radius after a poll without improvement. Once the radius
//! falls below `step_tol` the multipliers are updated with
//! `λ_i ← max(0, λ_i + μ·g_i(x))` and the inner loop restarts with a smaller
//! radius. The phase converges when the inner loop converged at a point
//! within the feasibility tolerance whose multipliers no longer move.
//!
//! Every trial point also goes through the session, so the feasibility-first
//! incumbent sees points on both sides of the constraint boundary.
//!
//! # References
//!
//! - Hooke & Jeeves (1961), "Direct Search Solution of Numerical and Statistical Problems"
//! - Lewis & Torczon (2002), "A Globally Convergent Augmented Lagrangian Pattern
//!   Search Algorithm for Optimization with General Constraints and Simple Bounds"

use super::config::HybridConfig;
use super::session::{Candidate, HybridSession};
use crate::error::SolveError;

/// Cap on multiplier updates per refinement phase.
const MAX_OUTER: usize = 50;

/// Cap on the penalty parameter.
const MAX_PENALTY: f64 = 1e8;

/// Smallest inner starting radius after the first multiplier update.
const MIN_RESTART_STEP: f64 = 1e-4;

/// Result of one refinement phase.
#[derive(Debug, Clone)]
pub(crate) struct RefineOutcome {
    /// Final iterate of the multiplier loop.
    pub best: Candidate,
    /// The convergence test passed before the budget ran out.
    pub converged: bool,
    pub polls: usize,
}

/// Multiplier estimates and penalty parameter.
#[derive(Debug, Clone)]
struct Multipliers {
    lambda: Vec<f64>,
    mu: f64,
}

impl Multipliers {
    fn new(count: usize, mu: f64) -> Self {
        Self {
            lambda: vec![0.0; count],
            mu,
        }
    }

    fn merit(&self, c: &Candidate) -> f64 {
        let shift: f64 = c
            .constraints
            .iter()
            .zip(&self.lambda)
            .map(|(&g, &l)| {
                let s = (l + self.mu * g).max(0.0);
                (s * s - l * l) / (2.0 * self.mu)
            })
            .sum();
        c.cost + shift
    }

    /// Applies the first-order update and returns the largest change.
    fn update(&mut self, c: &Candidate) -> f64 {
        let mut max_change = 0.0_f64;
        for (l, &g) in self.lambda.iter_mut().zip(&c.constraints) {
            let next = (*l + self.mu * g).max(0.0);
            max_change = max_change.max((next - *l).abs());
            *l = next;
        }
        max_change
    }
}

/// Refines `start` until the multiplier loop converges, the budget runs
/// out, or `MAX_OUTER` updates have been made.
pub(crate) fn refine(
    session: &mut HybridSession<'_>,
    config: &HybridConfig,
    start: Candidate,
) -> Result<RefineOutcome, SolveError> {
    let tol = session.tol();
    let mut multipliers = Multipliers::new(start.constraints.len(), config.penalty);
    let mut current = start;
    let mut step = config.initial_step;
    let mut polls = 0usize;
    let mut prev_violation = current.violation;

    for outer in 0..MAX_OUTER {
        let Some((best, inner_polls)) = search(session, config, &multipliers, current.clone(), step)?
        else {
            return Ok(RefineOutcome {
                best: current,
                converged: false,
                polls,
            });
        };
        current = best;
        polls += inner_polls;

        let mu = multipliers.mu;
        let shift = multipliers.update(&current);
        tracing::trace!(
            outer,
            cost = current.cost,
            violation = current.violation,
            shift,
            mu,
            "multiplier update"
        );
        if current.violation <= tol && shift <= mu * tol {
            return Ok(RefineOutcome {
                best: current,
                converged: true,
                polls,
            });
        }

        if current.violation > tol && current.violation > 0.25 * prev_violation {
            multipliers.mu = (multipliers.mu * 10.0).min(MAX_PENALTY);
        }
        prev_violation = current.violation;
        step = (config.initial_step * 0.1_f64.powi(outer as i32 + 1)).max(MIN_RESTART_STEP);
    }

    Ok(RefineOutcome {
        best: current,
        converged: false,
        polls,
    })
}

/// Pattern search on the merit for fixed multipliers.
///
/// Returns `None` when the session budget runs out.
fn search(
    session: &mut HybridSession<'_>,
    config: &HybridConfig,
    multipliers: &Multipliers,
    start: Candidate,
    initial_step: f64,
) -> Result<Option<(Candidate, usize)>, SolveError> {
    let model = session.model();
    let widths: Vec<f64> = model.variables().iter().map(|v| v.width()).collect();

    let mut current_merit = multipliers.merit(&start);
    let mut current = start;
    let mut step = initial_step;
    let mut polls = 0usize;

    while step >= config.step_tol {
        let directions = session.poll_directions(config.random_directions);
        let mut improved = false;

        for dir in &directions {
            if session.exhausted() {
                return Ok(None);
            }

            let mut trial: Vec<f64> = current
                .x
                .iter()
                .zip(dir)
                .zip(&widths)
                .map(|((&xi, &di), &w)| xi + step * w * di)
                .collect();
            model.clamp(&mut trial);
            if trial == current.x {
                continue;
            }

            let candidate = session.evaluate(trial)?;
            let merit = multipliers.merit(&candidate);
            if merit < current_merit {
                current = candidate;
                current_merit = merit;
                improved = true;
                break;
            }
        }

        polls += 1;
        if !improved {
            step *= 0.5;
        }
    }

    Ok(Some((current, polls)))
}
