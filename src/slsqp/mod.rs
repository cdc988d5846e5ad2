//! Gradient-based SLSQP back-end.
//!
//! Sequential quadratic programming for smooth problems with inequality
//! constraints `c(x) >= 0` and simple bounds. Gradients are taken by
//! forward differences, the Lagrangian Hessian is approximated by damped
//! BFGS, and a merit line search globalizes the iteration.
//!
//! [`minimize`] works on plain closures; [`SlsqpSolver`] adapts it to the
//! [`Backend`](crate::optimizer::Backend) interface, taking the objective
//! and constraints from a closed [`NlModel`](crate::model::NlModel).
//!
//! # Examples
//!
//! ```
//! use u_shapeopt::slsqp::{minimize, ScalarFn, SlsqpConfig};
//! use u_shapeopt::error::ModelError;
//!
//! // min x² + y²  s.t.  x + y >= 1
//! let f = |x: &[f64]| -> Result<f64, ModelError> { Ok(x[0] * x[0] + x[1] * x[1]) };
//! let g = |x: &[f64]| -> Result<f64, ModelError> { Ok(x[0] + x[1] - 1.0) };
//! let cons: Vec<ScalarFn<'_>> = vec![Box::new(g)];
//! let bounds = [(-5.0, 5.0), (-5.0, 5.0)];
//!
//! let result = minimize(&f, &[2.0, 0.0], &bounds, &cons, &SlsqpConfig::default(), None).unwrap();
//! assert!(result.success());
//! assert!((result.x[0] - 0.5).abs() < 1e-4);
//! ```

mod config;
mod linalg;
mod qp;
mod runner;

pub use config::SlsqpConfig;
pub use runner::{minimize, ScalarFn, SlsqpExit, SlsqpResult, SlsqpSolver};
