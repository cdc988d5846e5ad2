//! Derivative-free hybrid back-end.
//!
//! Couples a global exploration phase (random sampling followed by
//! simulated annealing on a penalized cost) with a local augmented-Lagrangian
//! pattern search, restarting both from the incumbent until the budget is
//! spent. Only objective and constraint values are needed, so the back-end
//! works on any closed [`NlModel`](crate::model::NlModel).
//!
//! # Incumbent
//!
//! Every evaluated point is ranked feasibility-first: a point within the
//! feasibility tolerance beats any point outside it; among feasible points
//! the lower cost wins, among infeasible ones the lower violation.
//!
//! # Parallelism
//!
//! With the `parallel` feature the initial sample is evaluated with rayon.
//! The points themselves are drawn sequentially, so a seeded run produces
//! the same result with or without the feature.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Lewis & Torczon (2002), "A Globally Convergent Augmented Lagrangian
//!   Pattern Search Algorithm"

mod anneal;
mod config;
mod refine;
mod runner;
mod session;

pub use config::{CoolingSchedule, HybridConfig};
pub use runner::HybridSolver;
