//! Decision variable types.

use crate::error::ModelError;

/// Handle to a variable declared on an [`NlModel`](super::NlModel).
///
/// The wrapped index is the variable's position in every point vector
/// passed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Position of this variable in a point vector.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A continuous decision variable with a closed domain `[lower, upper]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FloatVar {
    /// Variable name (unique identifier within a model).
    pub name: String,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl FloatVar {
    /// Creates a bounded float variable.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidBounds`] if either bound is non-finite
    /// or `lower > upper`.
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self, ModelError> {
        let name = name.into();
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(ModelError::InvalidBounds { name, lower, upper });
        }
        Ok(Self { name, lower, upper })
    }

    /// Whether `value` lies inside the domain.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Projects `value` onto the domain.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    /// Domain width (`upper - lower`).
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether the domain is a single point.
    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }
}
