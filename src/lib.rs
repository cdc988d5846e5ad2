//! Bounded non-linear shape optimization.
//!
//! Solves small continuous programs of the form
//!
//! ```text
//! maximize / minimize  f(x)
//! subject to           g_i(x) <= 0,   lower <= x <= upper
//! ```
//!
//! through one model and interchangeable numerical back-ends:
//!
//! - **Model**: symbolic [`NlModel`](model::NlModel) with `+ - * /`,
//!   constant powers and `sqrt`; closed before solving and read-only after.
//! - **Hybrid**: derivative-free search combining random sampling,
//!   simulated annealing and augmented-Lagrangian pattern search.
//! - **SLSQP**: sequential quadratic programming with finite-difference
//!   gradients and damped BFGS updates.
//! - **Shape**: the cup problem (largest volume for a surface of at most
//!   `π`) built on top of the model, see [`ShapeOptimizer`].
//!
//! Every back-end implements [`Backend`] and returns a [`Solution`] whose
//! [`SolveStatus`] tells convergence, budget exhaustion and infeasibility
//! apart. Switching algorithm never changes the model.

pub mod error;
pub mod hybrid;
pub mod model;
pub mod optimizer;
pub mod shape;
pub mod slsqp;

pub use error::{ConfigError, ModelError, SolveError};
pub use optimizer::{Backend, Solution, SolveStatus, SolverConfig, FEASIBILITY_TOL};
pub use shape::{CupModel, ShapeOptimizer, ShapeSolution};
