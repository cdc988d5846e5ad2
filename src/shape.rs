//! Cup volume problem.
//!
//! A cup is a truncated cone with a bottom disc: rim radius `R`, base
//! radius `r` and height `h`. It is folded from material no larger than a
//! unit disc, so its total surface may not exceed `π`:
//!
//! ```text
//! surface(R, r, h) = π·r² + π·(R + r)·sqrt((R − r)² + h²)  ≤  π
//! volume(R, r, h)  = (π·h / 3)·(R² + R·r + r²)             → max
//! ```
//!
//! with `R, r, h ∈ [0, 1]`.
//!
//! # Reference
//!
//! datagenetics.com, "Maximum volume of a cup" (January 2015).

use crate::error::{ModelError, SolveError};
use crate::model::{Constraint, Expr, NlModel};
use crate::optimizer::{Backend, Solution, SolveStatus, SolverConfig};
use std::time::Duration;

/// The constant `π` used by the default cup.
pub const PI: f64 = std::f64::consts::PI;

/// Default box for `(R, r, h)`.
pub const BOUNDS: [(f64, f64); 3] = [(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)];

/// Default initial guess for gradient-based back-ends.
pub const DEFAULT_X0: [f64; 3] = [0.3, 0.3, 0.3];

/// Best known volume for the default cup (from a dense grid over `(R, r)`
/// with `h` on the surface boundary).
pub const KNOWN_OPTIMUM_VOLUME: f64 = 0.687093;

/// Location of [`KNOWN_OPTIMUM_VOLUME`], `(R, r, h)`.
pub const KNOWN_OPTIMUM: [f64; 3] = [0.73531, 0.40339, 0.65611];

/// Parameters of the cup problem.
///
/// All constants are explicit so that each back-end can be tested against
/// its own instance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CupModel {
    /// Value used for `π` in both expressions.
    pub pi: f64,
    /// Maximum allowed surface.
    pub surface_limit: f64,
    /// Bounds for `R`, `r`, `h`.
    pub bounds: [(f64, f64); 3],
}

impl Default for CupModel {
    fn default() -> Self {
        Self {
            pi: PI,
            surface_limit: PI,
            bounds: BOUNDS,
        }
    }
}

impl CupModel {
    /// Total surface `π·r² + π·(R + r)·sqrt((R − r)² + h²)`.
    pub fn surface(&self, x: &[f64; 3]) -> f64 {
        let [big, small, h] = *x;
        let slant = ((big - small).powi(2) + h * h).sqrt();
        self.pi * small * small + self.pi * (big + small) * slant
    }

    /// Volume `(π·h / 3)·(R² + R·r + r²)`.
    pub fn volume(&self, x: &[f64; 3]) -> f64 {
        let [big, small, h] = *x;
        self.pi * h / 3.0 * (big * big + big * small + small * small)
    }

    /// Whether `x` respects the surface limit within `tol`.
    pub fn is_feasible(&self, x: &[f64; 3], tol: f64) -> bool {
        self.surface(x) - self.surface_limit <= tol
    }

    /// Builds and closes the symbolic model.
    ///
    /// Returns the model together with the surface and volume expressions so
    /// their realized values can be read back after a solve.
    pub fn build(&self) -> Result<CupExprs, ModelError> {
        let mut model = NlModel::new("cup");
        let [(rl, ru), (sl, su), (hl, hu)] = self.bounds;
        let big = Expr::from(model.add_float("R", rl, ru)?);
        let small = Expr::from(model.add_float("r", sl, su)?);
        let h = Expr::from(model.add_float("h", hl, hu)?);

        let slant = ((big.clone() - small.clone()).pow(2.0) + h.clone().pow(2.0)).sqrt();
        let surface =
            self.pi * small.clone().pow(2.0) + self.pi * (big.clone() + small.clone()) * slant;
        model.add_constraint(Constraint::le("surface", surface.clone(), self.surface_limit))?;

        let volume = self.pi * h / 3.0
            * (big.clone().pow(2.0) + big * small.clone() + small.pow(2.0));
        model.maximize(volume.clone())?;

        model.close()?;
        Ok(CupExprs {
            model,
            surface,
            volume,
        })
    }
}

/// A closed cup model and the expressions it was built from.
#[derive(Debug, Clone)]
pub struct CupExprs {
    pub model: NlModel,
    pub surface: Expr,
    pub volume: Expr,
}

/// Result of a cup solve.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShapeSolution {
    /// Rim radius `R`.
    pub big_radius: f64,
    /// Base radius `r`.
    pub small_radius: f64,
    /// Height `h`.
    pub height: f64,
    /// Surface at the solution.
    pub surface: f64,
    /// Volume at the solution.
    pub volume: f64,
    pub status: SolveStatus,
    pub iterations: usize,
    pub elapsed: Duration,
    pub backend: String,
}

impl ShapeSolution {
    /// `(R, r, h)`.
    pub fn point(&self) -> [f64; 3] {
        [self.big_radius, self.small_radius, self.height]
    }
}

/// Solves the cup problem with one back-end.
///
/// # Examples
///
/// ```no_run
/// use u_shapeopt::slsqp::SlsqpSolver;
/// use u_shapeopt::{CupModel, ShapeOptimizer, SolverConfig};
///
/// let optimizer = ShapeOptimizer::new(CupModel::default(), SlsqpSolver::default()).unwrap();
/// let solution = optimizer
///     .solve(&SolverConfig::default().with_x0(vec![0.3, 0.3, 0.3]))
///     .unwrap();
/// println!("{} {}", solution.surface, solution.volume);
/// ```
pub struct ShapeOptimizer<B: Backend> {
    cup: CupModel,
    exprs: CupExprs,
    backend: B,
}

impl<B: Backend> ShapeOptimizer<B> {
    /// Builds the model once; every [`ShapeOptimizer::solve`] reuses it.
    pub fn new(cup: CupModel, backend: B) -> Result<Self, ModelError> {
        let exprs = cup.build()?;
        Ok(Self {
            cup,
            exprs,
            backend,
        })
    }

    pub fn cup(&self) -> &CupModel {
        &self.cup
    }

    pub fn model(&self) -> &NlModel {
        &self.exprs.model
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs the back-end and reads surface and volume back from the model.
    pub fn solve(&self, config: &SolverConfig) -> Result<ShapeSolution, SolveError> {
        let solution: Solution = self.backend.solve(&self.exprs.model, config)?;
        let model = &self.exprs.model;
        Ok(ShapeSolution {
            big_radius: solution.x[0],
            small_radius: solution.x[1],
            height: solution.x[2],
            surface: model.value(&self.exprs.surface, &solution.x)?,
            volume: model.value(&self.exprs.volume, &solution.x)?,
            status: solution.status,
            iterations: solution.iterations,
            elapsed: solution.elapsed,
            backend: solution.backend,
        })
    }
}
