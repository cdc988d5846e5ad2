//! Symbolic expressions over model variables.
//!
//! Expressions are immutable trees built with the usual arithmetic
//! operators plus [`Expr::pow`] and [`Expr::sqrt`]:
//!
//! ```
//! use u_shapeopt::model::{Expr, NlModel};
//!
//! let mut model = NlModel::new("demo");
//! let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
//! let y = Expr::from(model.add_float("y", 0.0, 1.0).unwrap());
//!
//! let e = (x.clone() - y.clone()).pow(2.0) + 3.0 * x * y;
//! assert!((e.eval(&[0.5, 0.25]).unwrap() - 0.4375).abs() < 1e-12);
//! ```

use super::variables::VarId;
use crate::error::ModelError;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Radicands in `[-SQRT_SLACK, 0)` are treated as zero.
///
/// Searches that probe the box boundary produce tiny negative radicands
/// from cancellation (e.g. `(R - r)^2 + h^2` near `R = r, h = 0`).
pub const SQRT_SLACK: f64 = 1e-12;

/// A symbolic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Var(VarId),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// Power with a constant exponent.
    Pow(Box<Expr>, f64),
    Sqrt(Box<Expr>),
}

impl Expr {
    /// Constant expression.
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    /// Raises this expression to a constant power.
    pub fn pow(self, exponent: f64) -> Self {
        Expr::Pow(Box::new(self), exponent)
    }

    /// Square root of this expression.
    pub fn sqrt(self) -> Self {
        Expr::Sqrt(Box::new(self))
    }

    /// Evaluates the expression at the point `x`.
    ///
    /// # Errors
    ///
    /// - [`ModelError::UnknownVariable`] if a variable index is out of range for `x`.
    /// - [`ModelError::Domain`] for a negative radicand (beyond [`SQRT_SLACK`]),
    ///   a zero divisor, or a power that is not finite.
    pub fn eval(&self, x: &[f64]) -> Result<f64, ModelError> {
        match self {
            Expr::Const(c) => Ok(*c),
            Expr::Var(id) => x
                .get(id.0)
                .copied()
                .ok_or(ModelError::UnknownVariable(id.0)),
            Expr::Neg(a) => Ok(-a.eval(x)?),
            Expr::Add(a, b) => Ok(a.eval(x)? + b.eval(x)?),
            Expr::Sub(a, b) => Ok(a.eval(x)? - b.eval(x)?),
            Expr::Mul(a, b) => Ok(a.eval(x)? * b.eval(x)?),
            Expr::Div(a, b) => {
                let den = b.eval(x)?;
                if den == 0.0 {
                    return Err(ModelError::Domain { op: "div", value: den });
                }
                Ok(a.eval(x)? / den)
            }
            Expr::Pow(a, p) => {
                let base = a.eval(x)?;
                let value = if p.fract() == 0.0 && p.abs() <= i32::MAX as f64 {
                    base.powi(*p as i32)
                } else {
                    base.powf(*p)
                };
                if !value.is_finite() {
                    return Err(ModelError::Domain { op: "pow", value: base });
                }
                Ok(value)
            }
            Expr::Sqrt(a) => {
                let radicand = a.eval(x)?;
                if radicand >= 0.0 {
                    Ok(radicand.sqrt())
                } else if radicand >= -SQRT_SLACK {
                    Ok(0.0)
                } else {
                    Err(ModelError::Domain {
                        op: "sqrt",
                        value: radicand,
                    })
                }
            }
        }
    }

    /// Calls `f` for every variable referenced by this expression.
    pub fn visit_vars(&self, f: &mut impl FnMut(VarId)) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(id) => f(*id),
            Expr::Neg(a) | Expr::Pow(a, _) | Expr::Sqrt(a) => a.visit_vars(f),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.visit_vars(f);
                b.visit_vars(f);
            }
        }
    }

    /// Largest variable index referenced, if any.
    pub fn max_var_index(&self) -> Option<usize> {
        let mut max = None;
        self.visit_vars(&mut |id| {
            max = Some(max.map_or(id.0, |m: usize| m.max(id.0)));
        });
        max
    }
}

impl From<VarId> for Expr {
    fn from(id: VarId) -> Self {
        Expr::Var(id)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(Box::new(self), Box::new(Expr::Const(rhs)))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(Expr::Const(self)), Box::new(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Var(id) => write!(f, "x{}", id.0),
            Expr::Neg(a) => write!(f, "-({a})"),
            Expr::Add(a, b) => write!(f, "({a} + {b})"),
            Expr::Sub(a, b) => write!(f, "({a} - {b})"),
            Expr::Mul(a, b) => write!(f, "{a} * {b}"),
            Expr::Div(a, b) => write!(f, "{a} / {b}"),
            Expr::Pow(a, p) => write!(f, "{a}^{p}"),
            Expr::Sqrt(a) => write!(f, "sqrt({a})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: usize) -> Expr {
        Expr::Var(VarId(i))
    }

    #[test]
    fn test_arithmetic() {
        let e = (var(0) + var(1)) * 2.0 - var(1) / 4.0;
        let v = e.eval(&[1.0, 2.0]).unwrap();
        assert!((v - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_scalar_on_left() {
        let e = 3.0 - 2.0 * var(0);
        assert!((e.eval(&[0.25]).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_pow_integer_and_fractional() {
        assert!((var(0).pow(2.0).eval(&[3.0]).unwrap() - 9.0).abs() < 1e-12);
        assert!((var(0).pow(0.5).eval(&[4.0]).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_negative_is_domain_error() {
        let e = (var(0) - 1.0).sqrt();
        assert!(matches!(
            e.eval(&[0.5]),
            Err(ModelError::Domain { op: "sqrt", .. })
        ));
    }

    #[test]
    fn test_sqrt_tiny_negative_clamps() {
        let e = (var(0) - 1.0).sqrt();
        assert_eq!(e.eval(&[1.0 - 1e-14]).unwrap(), 0.0);
    }

    #[test]
    fn test_division_by_zero() {
        let e = var(0) / var(1);
        assert!(matches!(
            e.eval(&[1.0, 0.0]),
            Err(ModelError::Domain { op: "div", .. })
        ));
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(var(3).eval(&[0.0]), Err(ModelError::UnknownVariable(3)));
    }

    #[test]
    fn test_max_var_index() {
        let e = (var(2) + 1.0).sqrt() * var(0);
        assert_eq!(e.max_var_index(), Some(2));
        assert_eq!(Expr::constant(1.0).max_var_index(), None);
    }

    #[test]
    fn test_display() {
        let e = (var(0) - var(1)).pow(2.0);
        assert_eq!(e.to_string(), "(x0 - x1)^2");
    }
}
