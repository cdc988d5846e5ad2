//! Hybrid search configuration and cooling schedules.

use crate::error::ConfigError;

/// Cooling schedule for temperature reduction.
///
/// # References
///
/// - Geometric: standard textbook approach
/// - Linear: fixed-duration cooling
/// - LundyMees: Lundy & Mees (1986), with convergence proof
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoolingSchedule {
    /// Geometric (exponential) cooling: `T_{k+1} = alpha * T_k`.
    Geometric {
        /// Cooling factor in (0, 1). Higher = slower cooling.
        alpha: f64,
    },

    /// Linear cooling from `T_0` to `T_min` over `linear_steps` levels.
    Linear,

    /// Lundy-Mees cooling: `T_{k+1} = T_k / (1 + beta * T_k)`.
    ///
    /// One move per temperature level.
    LundyMees {
        /// Cooling parameter. Typically `(T_0 - T_min) / (max_iter * T_0 * T_min)`.
        beta: f64,
    },
}

impl Default for CoolingSchedule {
    fn default() -> Self {
        CoolingSchedule::Geometric { alpha: 0.9 }
    }
}

/// Configuration for the two-phase hybrid search.
///
/// Budgets (time limit, iteration cap, seed) come from
/// [`SolverConfig`](crate::SolverConfig); this struct holds the knobs of
/// the two phases.
///
/// # Examples
///
/// ```
/// use u_shapeopt::hybrid::{CoolingSchedule, HybridConfig};
///
/// let config = HybridConfig::default()
///     .with_initial_temperature(0.5)
///     .with_cooling(CoolingSchedule::Geometric { alpha: 0.95 })
///     .with_max_stall_restarts(5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HybridConfig {
    /// Random points drawn from the box before the first annealing phase.
    pub sample_size: usize,

    /// Initial annealing temperature, in objective units.
    pub initial_temperature: f64,

    /// The annealing phase ends when the temperature drops below this.
    pub min_temperature: f64,

    /// Cooling schedule.
    pub cooling: CoolingSchedule,

    /// Moves at each temperature level (ignored by `LundyMees`).
    pub iterations_per_temperature: usize,

    /// Temperature levels of one `Linear` annealing phase.
    pub linear_steps: usize,

    /// Weight of the constraint violation in the annealing cost.
    pub penalty: f64,

    /// Initial move / poll radius as a fraction of each variable's width.
    pub initial_step: f64,

    /// Refinement converges once the poll radius falls below this
    /// (fraction of each variable's width).
    pub step_tol: f64,

    /// Random poll directions added to the coordinate directions.
    pub random_directions: usize,

    /// Stop after this many consecutive restarts without improvement.
    /// `None` = run until the time or iteration budget is spent.
    pub max_stall_restarts: Option<usize>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            sample_size: 64,
            initial_temperature: 0.1,
            min_temperature: 1e-6,
            cooling: CoolingSchedule::default(),
            iterations_per_temperature: 50,
            linear_steps: 100,
            penalty: 10.0,
            initial_step: 0.25,
            step_tol: 1e-9,
            random_directions: 6,
            max_stall_restarts: None,
        }
    }
}

impl HybridConfig {
    pub fn with_sample_size(mut self, n: usize) -> Self {
        self.sample_size = n;
        self
    }

    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn with_min_temperature(mut self, t: f64) -> Self {
        self.min_temperature = t;
        self
    }

    pub fn with_cooling(mut self, cooling: CoolingSchedule) -> Self {
        self.cooling = cooling;
        self
    }

    pub fn with_iterations_per_temperature(mut self, n: usize) -> Self {
        self.iterations_per_temperature = n;
        self
    }

    pub fn with_linear_steps(mut self, n: usize) -> Self {
        self.linear_steps = n;
        self
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_step_tol(mut self, tol: f64) -> Self {
        self.step_tol = tol;
        self
    }

    pub fn with_random_directions(mut self, n: usize) -> Self {
        self.random_directions = n;
        self
    }

    pub fn with_max_stall_restarts(mut self, n: usize) -> Self {
        self.max_stall_restarts = Some(n);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("initial_temperature", self.initial_temperature)?;
        positive("min_temperature", self.min_temperature)?;
        if self.min_temperature >= self.initial_temperature {
            return Err(ConfigError::TemperatureOrder);
        }
        positive("penalty", self.penalty)?;
        positive("initial_step", self.initial_step)?;
        positive("step_tol", self.step_tol)?;
        if self.sample_size == 0 {
            return Err(ConfigError::ZeroCount("sample_size"));
        }
        if self.iterations_per_temperature == 0 {
            return Err(ConfigError::ZeroCount("iterations_per_temperature"));
        }
        if self.max_stall_restarts == Some(0) {
            return Err(ConfigError::ZeroCount("max_stall_restarts"));
        }
        match self.cooling {
            CoolingSchedule::Geometric { alpha } => {
                if alpha <= 0.0 || alpha >= 1.0 || alpha.is_nan() {
                    return Err(ConfigError::GeometricAlpha(alpha));
                }
            }
            CoolingSchedule::LundyMees { beta } => {
                if beta <= 0.0 || beta.is_nan() {
                    return Err(ConfigError::LundyMeesBeta(beta));
                }
            }
            CoolingSchedule::Linear => {
                if self.linear_steps == 0 {
                    return Err(ConfigError::ZeroCount("linear_steps"));
                }
            }
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Tolerance { name, value })
    }
}
