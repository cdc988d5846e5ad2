//! SLSQP configuration.

use crate::error::ConfigError;

/// Configuration for the SLSQP back-end.
///
/// Defaults follow the common SLSQP front-ends: 100 iterations, an
/// accuracy goal of `1e-6` and a forward-difference step of `√ε`.
///
/// # Examples
///
/// ```
/// use u_shapeopt::slsqp::SlsqpConfig;
///
/// let config = SlsqpConfig::default().with_ftol(1e-8).with_disp(true);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_iterations, 100);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlsqpConfig {
    /// Maximum SQP iterations.
    pub max_iterations: usize,

    /// Accuracy goal for the objective change and constraint violation.
    pub ftol: f64,

    /// Finite-difference step for gradients.
    pub eps: f64,

    /// Log a convergence summary at `info` level when the run ends.
    pub disp: bool,
}

impl Default for SlsqpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            ftol: 1e-6,
            eps: f64::EPSILON.sqrt(),
            disp: false,
        }
    }
}

impl SlsqpConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_disp(mut self, disp: bool) -> Self {
        self.disp = disp;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroCount("max_iterations"));
        }
        for (name, value) in [("ftol", self.ftol), ("eps", self.eps)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Tolerance { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SlsqpConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert!((config.ftol - 1e-6).abs() < 1e-18);
        assert!((config.eps - 1.4901161193847656e-8).abs() < 1e-20);
        assert!(!config.disp);
    }

    #[test]
    fn test_validate() {
        assert!(SlsqpConfig::default().validate().is_ok());
        assert_eq!(
            SlsqpConfig::default().with_max_iterations(0).validate(),
            Err(ConfigError::ZeroCount("max_iterations"))
        );
        assert!(matches!(
            SlsqpConfig::default().with_ftol(0.0).validate(),
            Err(ConfigError::Tolerance { name: "ftol", .. })
        ));
        assert!(matches!(
            SlsqpConfig::default().with_eps(f64::NAN).validate(),
            Err(ConfigError::Tolerance { name: "eps", .. })
        ));
    }
}
