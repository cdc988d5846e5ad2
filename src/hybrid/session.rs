//! Solving session: owns all search state of one hybrid run.

use crate::error::SolveError;
use crate::model::{Evaluation, NlModel};
use crate::optimizer::{RunStats, SolverConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// An evaluated point.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub x: Vec<f64>,
    /// Objective in the minimization sense.
    pub cost: f64,
    /// Canonical constraint values `g_i(x)`.
    pub constraints: Vec<f64>,
    pub violation: f64,
}

impl Candidate {
    fn new(x: Vec<f64>, eval: Evaluation) -> Self {
        Self {
            x,
            cost: eval.cost,
            constraints: eval.constraints,
            violation: eval.violation,
        }
    }

    pub fn is_feasible(&self, tol: f64) -> bool {
        self.violation <= tol
    }

    /// Satisfies every constraint without using the tolerance.
    pub fn is_strictly_feasible(&self) -> bool {
        self.violation <= 0.0
    }

    /// 0 strictly feasible, 1 within `tol`, 2 infeasible.
    fn tier(&self, tol: f64) -> u8 {
        if self.is_strictly_feasible() {
            0
        } else if self.is_feasible(tol) {
            1
        } else {
            2
        }
    }

    /// Feasibility-first ranking: strictly feasible beats within-tolerance,
    /// which beats infeasible. Lower cost wins inside the first two tiers,
    /// lower violation among infeasible points.
    pub fn better_than(&self, other: &Candidate, tol: f64) -> bool {
        match (self.tier(tol), other.tier(tol)) {
            (a, b) if a != b => a < b,
            (2, _) => self.violation < other.violation,
            _ => self.cost < other.cost,
        }
    }

    /// Scalar cost used by the Metropolis test.
    pub fn penalized(&self, penalty: f64) -> f64 {
        self.cost + penalty * self.violation
    }
}

/// Search state of one hybrid run.
///
/// Opened from a closed model; the incumbent, random stream and budget
/// counters live here and are released when the session is dropped,
/// whichever way the run ends.
pub(crate) struct HybridSession<'m> {
    model: &'m NlModel,
    rng: StdRng,
    tol: f64,
    started: Instant,
    deadline: Option<Instant>,
    max_evaluations: Option<usize>,
    incumbent: Candidate,
    /// Incremented every time the incumbent improves.
    version: usize,
    evaluations: usize,
}

impl<'m> HybridSession<'m> {
    /// Opens a session and evaluates the starting point (`x0`, or the box
    /// midpoint when none is given).
    pub fn open(model: &'m NlModel, config: &SolverConfig) -> Result<Self, SolveError> {
        model.require_closed()?;
        let start = match &config.x0 {
            Some(x0) => x0.clone(),
            None => model
                .variables()
                .iter()
                .map(|v| v.lower + 0.5 * v.width())
                .collect(),
        };
        let eval = model.evaluate(&start)?;
        let started = Instant::now();
        let seed = config.seed.unwrap_or_else(rand::random);
        tracing::debug!(model = %model.name, seed, "hybrid session opened");

        Ok(Self {
            model,
            rng: StdRng::seed_from_u64(seed),
            tol: config.feasibility_tol,
            started,
            deadline: config.time_limit.map(|limit| started + limit),
            max_evaluations: config.max_iterations,
            incumbent: Candidate::new(start, eval),
            version: 0,
            evaluations: 1,
        })
    }

    pub fn model(&self) -> &'m NlModel {
        self.model
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }

    pub fn incumbent(&self) -> &Candidate {
        &self.incumbent
    }

    pub fn version(&self) -> usize {
        self.version
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Evaluations left under the cap, if there is one.
    pub fn remaining(&self) -> Option<usize> {
        self.max_evaluations
            .map(|max| max.saturating_sub(self.evaluations))
    }

    /// Whether the time limit or the evaluation cap stops the run.
    pub fn exhausted(&self) -> bool {
        if let Some(max) = self.max_evaluations {
            if self.evaluations >= max {
                return true;
            }
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Evaluates `x` and updates the incumbent.
    pub fn evaluate(&mut self, x: Vec<f64>) -> Result<Candidate, SolveError> {
        let eval = self.model.evaluate(&x)?;
        Ok(self.record(x, eval))
    }

    /// Records an evaluation computed outside the session.
    pub fn record(&mut self, x: Vec<f64>, eval: Evaluation) -> Candidate {
        self.evaluations += 1;
        let candidate = Candidate::new(x, eval);
        if candidate.better_than(&self.incumbent, self.tol) {
            self.incumbent = candidate.clone();
            self.version += 1;
        }
        candidate
    }

    /// Uniform random point in the box.
    pub fn random_point(&mut self) -> Vec<f64> {
        let model = self.model;
        model
            .variables()
            .iter()
            .map(|v| {
                if v.is_fixed() {
                    v.lower
                } else {
                    self.rng.random_range(v.lower..=v.upper)
                }
            })
            .collect()
    }

    /// Perturbs every coordinate uniformly within `radius` times its width,
    /// projected back onto the box.
    pub fn neighbor(&mut self, x: &[f64], radius: f64) -> Vec<f64> {
        let model = self.model;
        x.iter()
            .zip(model.variables())
            .map(|(&xi, v)| {
                let delta = radius * v.width() * self.rng.random_range(-1.0..=1.0);
                v.clamp(xi + delta)
            })
            .collect()
    }

    /// Poll set: `±e_i` for every coordinate plus `count` random unit
    /// directions and their negatives, in random order.
    pub fn poll_directions(&mut self, count: usize) -> Vec<Vec<f64>> {
        let n = self.model.dimension();
        let mut dirs = Vec::with_capacity(2 * (n + count));
        for i in 0..n {
            let mut e = vec![0.0; n];
            e[i] = 1.0;
            dirs.push(e.clone());
            e[i] = -1.0;
            dirs.push(e);
        }
        for _ in 0..count {
            let d: Vec<f64> = (0..n).map(|_| self.rng.random_range(-1.0..=1.0)).collect();
            let norm = d.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm < 1e-12 {
                continue;
            }
            let d: Vec<f64> = d.iter().map(|v| v / norm).collect();
            dirs.push(d.iter().map(|v| -v).collect());
            dirs.push(d);
        }
        dirs.shuffle(&mut self.rng);
        dirs
    }

    /// Metropolis acceptance for a cost increase `delta` at `temperature`.
    pub fn accept(&mut self, delta: f64, temperature: f64) -> bool {
        if delta < 0.0 {
            true
        } else if temperature > 0.0 {
            self.rng.random_range(0.0..1.0) < (-delta / temperature).exp()
        } else {
            false
        }
    }

    pub fn stats(&self, backend: &'static str) -> RunStats {
        RunStats {
            iterations: self.evaluations,
            evaluations: self.evaluations,
            elapsed: self.started.elapsed(),
            backend,
        }
    }
}

impl Drop for HybridSession<'_> {
    fn drop(&mut self) {
        tracing::debug!(
            model = %self.model.name,
            evaluations = self.evaluations,
            improvements = self.version,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "hybrid session closed"
        );
    }
}
