//! Symbolic modeling layer.
//!
//! Describes a bounded non-linear program independently of the algorithm
//! that solves it:
//!
//! - **Variables**: [`FloatVar`] decisions with closed domains, referenced by [`VarId`]
//! - **Expressions**: [`Expr`] trees with `+ - * /`, constant powers and `sqrt`
//! - **Constraints**: [`Constraint`], always stored as `g(x) <= 0`
//! - **Model**: [`NlModel`], a container with a single [`Objective`] and a
//!   `close()` step after which it is read-only
//!
//! # Constraint direction
//!
//! The canonical direction is `g(x) <= 0`. Solvers written against the
//! opposite convention (`c(x) >= 0` feasible) must read
//! [`Constraint::slack`] instead of negating bodies themselves.

mod expr;
mod nl_model;
mod variables;

pub use expr::{Expr, SQRT_SLACK};
pub use nl_model::{Constraint, Direction, Evaluation, NlModel, Objective};
pub use variables::{FloatVar, VarId};
