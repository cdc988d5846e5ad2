//! Non-linear model definition.

use super::expr::Expr;
use super::variables::{FloatVar, VarId};
use crate::error::ModelError;

/// A constraint stored in the canonical direction `body(x) <= 0`.
///
/// Back-ends that use the opposite convention read [`Constraint::slack`],
/// which is `-body(x)` and therefore `>= 0` when feasible.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Constraint name, used in logs.
    pub name: String,
    /// Canonical body `g` with `g(x) <= 0` feasible.
    pub body: Expr,
}

impl Constraint {
    /// `lhs <= rhs`, stored as `lhs - rhs <= 0`.
    pub fn le(name: impl Into<String>, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self {
            name: name.into(),
            body: lhs.into() - rhs.into(),
        }
    }

    /// `lhs >= rhs`, stored as `rhs - lhs <= 0`.
    pub fn ge(name: impl Into<String>, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self {
            name: name.into(),
            body: rhs.into() - lhs.into(),
        }
    }

    /// Canonical value `g(x)`; feasible when `<= 0`.
    pub fn value(&self, x: &[f64]) -> Result<f64, ModelError> {
        self.body.eval(x)
    }

    /// Opposite-direction value `-g(x)`; feasible when `>= 0`.
    pub fn slack(&self, x: &[f64]) -> Result<f64, ModelError> {
        Ok(-self.body.eval(x)?)
    }

    /// Amount by which `x` violates the constraint (`max(g(x), 0)`).
    pub fn violation(&self, x: &[f64]) -> Result<f64, ModelError> {
        Ok(self.value(x)?.max(0.0))
    }

    /// Whether `x` satisfies the constraint within `tol`.
    pub fn is_satisfied(&self, x: &[f64], tol: f64) -> Result<bool, ModelError> {
        Ok(self.value(x)? <= tol)
    }
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Minimize,
    Maximize,
}

/// Objective function for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub expr: Expr,
    pub direction: Direction,
}

impl Objective {
    /// Objective value in the model's own direction.
    pub fn value(&self, x: &[f64]) -> Result<f64, ModelError> {
        self.expr.eval(x)
    }

    /// Objective value as a cost to be minimized.
    ///
    /// Equal to [`Objective::value`] when minimizing and its negation when
    /// maximizing.
    pub fn cost(&self, x: &[f64]) -> Result<f64, ModelError> {
        let v = self.value(x)?;
        Ok(match self.direction {
            Direction::Minimize => v,
            Direction::Maximize => -v,
        })
    }

    /// Inverse of [`Objective::cost`].
    pub fn from_cost(&self, cost: f64) -> f64 {
        match self.direction {
            Direction::Minimize => cost,
            Direction::Maximize => -cost,
        }
    }
}

/// Objective, constraint values and violation at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Objective in the minimization sense (see [`Objective::cost`]).
    pub cost: f64,
    /// Canonical value `g_i(x)` of every constraint, in declaration order.
    pub constraints: Vec<f64>,
    /// Largest canonical constraint value clipped at zero.
    pub violation: f64,
}

/// A non-linear model over bounded float decisions.
///
/// Declarations are only accepted before [`NlModel::close`]; solvers only
/// accept closed models.
///
/// # Examples
///
/// ```
/// use u_shapeopt::model::{Constraint, Expr, NlModel};
///
/// let mut model = NlModel::new("disc");
/// let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
/// let y = Expr::from(model.add_float("y", 0.0, 1.0).unwrap());
/// model
///     .add_constraint(Constraint::le("radius", x.clone().pow(2.0) + y.clone().pow(2.0), 1.0))
///     .unwrap();
/// model.maximize(x + y).unwrap();
/// model.close().unwrap();
///
/// assert!(model.is_closed());
/// assert_eq!(model.dimension(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct NlModel {
    /// Model name.
    pub name: String,
    variables: Vec<FloatVar>,
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
    closed: bool,
}

impl NlModel {
    /// Creates an empty, open model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Vec::new(),
            constraints: Vec::new(),
            objective: None,
            closed: false,
        }
    }

    /// Declares a float decision in `[lower, upper]`.
    pub fn add_float(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
    ) -> Result<VarId, ModelError> {
        self.ensure_open()?;
        let var = FloatVar::new(name, lower, upper)?;
        self.variables.push(var);
        Ok(VarId(self.variables.len() - 1))
    }

    /// Registers a constraint.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), ModelError> {
        self.ensure_open()?;
        self.check_refs(&constraint.body)?;
        self.constraints.push(constraint);
        Ok(())
    }

    /// Sets a maximization objective, replacing any previous one.
    pub fn maximize(&mut self, expr: Expr) -> Result<(), ModelError> {
        self.set_objective(expr, Direction::Maximize)
    }

    /// Sets a minimization objective, replacing any previous one.
    pub fn minimize(&mut self, expr: Expr) -> Result<(), ModelError> {
        self.set_objective(expr, Direction::Minimize)
    }

    fn set_objective(&mut self, expr: Expr, direction: Direction) -> Result<(), ModelError> {
        self.ensure_open()?;
        self.check_refs(&expr)?;
        self.objective = Some(Objective { expr, direction });
        Ok(())
    }

    /// Finalizes the model. Closing an already closed model is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingObjective`] if no objective was set.
    pub fn close(&mut self) -> Result<(), ModelError> {
        if self.objective.is_none() {
            return Err(ModelError::MissingObjective);
        }
        if !self.closed {
            self.closed = true;
            tracing::debug!(
                model = %self.name,
                variables = self.variables.len(),
                constraints = self.constraints.len(),
                "model closed"
            );
        }
        Ok(())
    }

    /// Whether [`NlModel::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Fails with [`ModelError::ModelNotClosed`] unless the model is closed.
    pub fn require_closed(&self) -> Result<(), ModelError> {
        if self.closed {
            Ok(())
        } else {
            Err(ModelError::ModelNotClosed)
        }
    }

    /// Number of decision variables.
    pub fn dimension(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[FloatVar] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The objective, if set.
    pub fn objective(&self) -> Result<&Objective, ModelError> {
        self.objective.as_ref().ok_or(ModelError::MissingObjective)
    }

    /// `(lower, upper)` per variable.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.variables.iter().map(|v| (v.lower, v.upper)).collect()
    }

    /// Whether every coordinate of `x` lies inside its variable's domain.
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.variables.len()
            && self.variables.iter().zip(x).all(|(v, &xi)| v.contains(xi))
    }

    /// Projects `x` onto the variable box in place.
    pub fn clamp(&self, x: &mut [f64]) {
        for (v, xi) in self.variables.iter().zip(x.iter_mut()) {
            *xi = v.clamp(*xi);
        }
    }

    /// Realized value of an arbitrary expression at `x`.
    pub fn value(&self, expr: &Expr, x: &[f64]) -> Result<f64, ModelError> {
        self.check_dimension(x)?;
        expr.eval(x)
    }

    /// Largest constraint violation at `x` (zero when feasible).
    pub fn max_violation(&self, x: &[f64]) -> Result<f64, ModelError> {
        self.check_dimension(x)?;
        self.constraints
            .iter()
            .try_fold(0.0_f64, |acc, c| Ok(acc.max(c.violation(x)?)))
    }

    /// Cost, constraint values and violation at `x`.
    pub fn evaluate(&self, x: &[f64]) -> Result<Evaluation, ModelError> {
        self.check_dimension(x)?;
        let constraints = self
            .constraints
            .iter()
            .map(|c| c.value(x))
            .collect::<Result<Vec<_>, _>>()?;
        let violation = constraints.iter().fold(0.0_f64, |acc, &g| acc.max(g));
        let cost = self.objective()?.cost(x)?;
        Ok(Evaluation {
            cost,
            constraints,
            violation,
        })
    }

    /// Fails with [`ModelError::DimensionMismatch`] unless `x` has one
    /// entry per variable.
    pub fn check_dimension(&self, x: &[f64]) -> Result<(), ModelError> {
        if x.len() != self.variables.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.variables.len(),
                got: x.len(),
            });
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ModelError> {
        if self.closed {
            Err(ModelError::ModelClosed)
        } else {
            Ok(())
        }
    }

    fn check_refs(&self, expr: &Expr) -> Result<(), ModelError> {
        match expr.max_var_index() {
            Some(i) if i >= self.variables.len() => Err(ModelError::UnknownVariable(i)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc_model() -> NlModel {
        let mut model = NlModel::new("disc");
        let x = Expr::from(model.add_float("x", 0.0, 1.0).unwrap());
        let y = Expr::from(model.add_float("y", 0.0, 1.0).unwrap());
        model
            .add_constraint(Constraint::le(
                "radius",
                x.clone().pow(2.0) + y.clone().pow(2.0),
                1.0,
            ))
            .unwrap();
        model.maximize(x + y).unwrap();
        model
    }

    #[test]
    fn test_model_creation() {
        let mut model = disc_model();
        assert_eq!(model.dimension(), 2);
        assert_eq!(model.constraints().len(), 1);
        assert!(!model.is_closed());
        model.close().unwrap();
        assert!(model.is_closed());
    }

    #[test]
    fn test_var_ids_follow_declaration_order() {
        let mut model = NlModel::new("order");
        let ids: Vec<VarId> = ["R", "r", "h"]
            .into_iter()
            .map(|name| model.add_float(name, 0.0, 1.0).unwrap())
            .collect();
        let indices: Vec<usize> = ids.iter().map(|id| id.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(model.variables()[ids[2].index()].name, "h");
    }

    #[test]
    fn test_closed_model_rejects_declarations() {
        let mut model = disc_model();
        model.close().unwrap();
        assert_eq!(model.add_float("z", 0.0, 1.0), Err(ModelError::ModelClosed));
        assert_eq!(
            model.minimize(Expr::constant(0.0)),
            Err(ModelError::ModelClosed)
        );
    }

    #[test]
    fn test_close_requires_objective() {
        let mut model = NlModel::new("empty");
        model.add_float("x", 0.0, 1.0).unwrap();
        assert_eq!(model.close(), Err(ModelError::MissingObjective));
        assert_eq!(model.require_closed(), Err(ModelError::ModelNotClosed));
    }

    #[test]
    fn test_undefined_variable() {
        let mut model = NlModel::new("test");
        model.add_float("x", 0.0, 1.0).unwrap();
        let bad = Constraint::le("bad", Expr::Var(VarId(5)), 1.0);
        assert_eq!(
            model.add_constraint(bad),
            Err(ModelError::UnknownVariable(5))
        );
    }

    #[test]
    fn test_le_and_ge_agree() {
        let x = Expr::Var(VarId(0));
        let le = Constraint::le("le", x.clone(), 0.5);
        let ge = Constraint::ge("ge", 0.5, x);
        for &v in &[0.0, 0.25, 0.5, 0.75, 1.0] {
            let p = [v];
            assert_eq!(
                le.is_satisfied(&p, 0.0).unwrap(),
                ge.is_satisfied(&p, 0.0).unwrap()
            );
            assert!((le.value(&p).unwrap() - ge.value(&p).unwrap()).abs() < 1e-15);
        }
    }

    #[test]
    fn test_slack_is_negated_value() {
        let model = disc_model();
        let c = &model.constraints()[0];
        let p = [0.6, 0.6];
        assert!((c.slack(&p).unwrap() + c.value(&p).unwrap()).abs() < 1e-15);
        assert!(c.slack(&p).unwrap() > 0.0);
        let q = [1.0, 1.0];
        assert!(c.slack(&q).unwrap() < 0.0);
        assert!((c.violation(&q).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_maximize_cost_is_negated() {
        let model = disc_model();
        let eval = model.evaluate(&[0.5, 0.25]).unwrap();
        assert!((eval.cost + 0.75).abs() < 1e-12);
        assert_eq!(eval.violation, 0.0);
        assert_eq!(eval.constraints.len(), 1);
        assert!((eval.constraints[0] + 0.6875).abs() < 1e-12);
        let objective = model.objective().unwrap();
        assert!((objective.from_cost(eval.cost) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let model = disc_model();
        assert!(matches!(
            model.max_violation(&[0.1]),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_contains_and_clamp() {
        let model = disc_model();
        assert!(model.contains(&[0.0, 1.0]));
        assert!(!model.contains(&[-0.1, 0.5]));
        assert!(!model.contains(&[0.5]));
        let mut p = [1.5, -2.0];
        model.clamp(&mut p);
        assert_eq!(p, [1.0, 0.0]);
    }
}
