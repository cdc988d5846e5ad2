//! Error types shared by the model and both back-ends.

use thiserror::Error;

/// Errors raised while building or evaluating an [`NlModel`](crate::model::NlModel).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("unknown variable index {0}")]
    UnknownVariable(usize),

    #[error("variable '{name}' has invalid bounds [{lower}, {upper}]")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("model is closed; no further declarations allowed")]
    ModelClosed,

    #[error("model must be closed before solving")]
    ModelNotClosed,

    #[error("model has no objective")]
    MissingObjective,

    #[error("expected {expected} values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// An operation was applied outside its mathematical domain.
    #[error("domain error in {op}: argument {value}")]
    Domain { op: &'static str, value: f64 },
}

/// Errors raised by config validation.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("time limit must be finite and positive, got {0} s")]
    TimeLimit(f64),

    #[error("{name} must be finite and positive, got {value}")]
    Tolerance { name: &'static str, value: f64 },

    #[error("initial temperature must be greater than min temperature")]
    TemperatureOrder,

    #[error("geometric alpha must be in (0, 1), got {0}")]
    GeometricAlpha(f64),

    #[error("lundy-mees beta must be positive, got {0}")]
    LundyMeesBeta(f64),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    /// No time limit, iteration cap or stall limit would stop the run.
    #[error("search has no stopping criterion")]
    Unbounded,
}

/// Errors returned by [`ShapeOptimizer::solve`](crate::ShapeOptimizer::solve)
/// and the back-end entry points.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The initial guess cannot be used as a starting point.
    #[error("infeasible start: {reason}")]
    InfeasibleStart { reason: String },

    /// The returned point violates the constraints beyond tolerance.
    #[error("result violates constraints by {violation:e}")]
    InfeasibleResult { violation: f64 },

    /// The budget ran out before the convergence test was met.
    #[error("did not converge within {iterations} iterations ({elapsed_ms} ms)")]
    DidNotConverge { iterations: usize, elapsed_ms: u128 },
}
