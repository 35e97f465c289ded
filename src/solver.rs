//! Linear-program contract and the `minilp` backend
//!
//! The fitting code only builds a [`LinearModel`] and reads back a [`Solution`];
//! any [`LinearSolver`] honouring that contract can be plugged in.

use log::{debug, warn};
use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem};

/// Handle to a variable inside one [`LinearModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub kind: VarKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

/// `Σ coeff * var  <sense>  rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

impl Constraint {
    /// Left-hand side evaluated at `values`; missing variables count as zero
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values.get(v.0).copied().unwrap_or(0.0)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Objective {
    pub sense: ObjectiveSense,
    pub terms: Vec<(VarId, f64)>,
}

/// Variables, constraints and a linear objective
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearModel {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Objective,
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
        kind: VarKind,
    ) -> VarId {
        self.variables.push(Variable { name: name.into(), lower, upper, kind });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VarId, f64)>,
        sense: ConstraintSense,
        rhs: f64,
    ) {
        self.constraints.push(Constraint { name: name.into(), terms, sense, rhs });
    }

    pub fn set_objective(&mut self, sense: ObjectiveSense, terms: Vec<(VarId, f64)>) {
        self.objective = Objective { sense, terms };
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }
}

// ============================================================
// SOLUTION
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    /// Unbounded, unsupported model, or any backend failure
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: SolveStatus,
    /// One value per model variable, indexed by [`VarId`]; empty unless optimal
    pub values: Vec<f64>,
}

impl Solution {
    pub fn optimal(values: Vec<f64>) -> Self {
        Self { status: SolveStatus::Optimal, values }
    }

    pub fn failed(status: SolveStatus) -> Self {
        Self { status, values: Vec::new() }
    }

    #[inline]
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    #[inline]
    pub fn value(&self, id: VarId) -> Option<f64> {
        self.values.get(id.0).copied()
    }
}

/// Anything that can solve a [`LinearModel`]
pub trait LinearSolver: Send + Sync {
    fn solve(&self, model: &LinearModel) -> Solution;
}

impl<S: LinearSolver + ?Sized> LinearSolver for &S {
    fn solve(&self, model: &LinearModel) -> Solution {
        (**self).solve(model)
    }
}

impl<S: LinearSolver + ?Sized> LinearSolver for Box<S> {
    fn solve(&self, model: &LinearModel) -> Solution {
        (**self).solve(model)
    }
}

impl<S: LinearSolver + ?Sized> LinearSolver for std::sync::Arc<S> {
    fn solve(&self, model: &LinearModel) -> Solution {
        (**self).solve(model)
    }
}

// ============================================================
// MINILP BACKEND
// ============================================================

/// Dense simplex solver from the `minilp` crate. Continuous variables only.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinilpSolver;

impl LinearSolver for MinilpSolver {
    fn solve(&self, model: &LinearModel) -> Solution {
        if let Some(v) = model.variables().iter().find(|v| v.kind != VarKind::Continuous) {
            warn!("minilp cannot solve non-continuous variable '{}'", v.name);
            return Solution::failed(SolveStatus::Other);
        }

        let direction = match model.objective().sense {
            ObjectiveSense::Minimize => OptimizationDirection::Minimize,
            ObjectiveSense::Maximize => OptimizationDirection::Maximize,
        };

        let mut costs = vec![0.0; model.variables().len()];
        for (id, coeff) in &model.objective().terms {
            if let Some(c) = costs.get_mut(id.0) {
                *c += coeff;
            }
        }

        let mut problem = Problem::new(direction);
        let vars: Vec<minilp::Variable> = model
            .variables()
            .iter()
            .zip(&costs)
            .map(|(v, cost)| problem.add_var(*cost, (v.lower, v.upper)))
            .collect();

        for constraint in model.constraints() {
            let mut expr = LinearExpr::empty();
            for (id, coeff) in &constraint.terms {
                match vars.get(id.0) {
                    Some(var) => expr.add(*var, *coeff),
                    None => {
                        warn!(
                            "constraint '{}' references unknown variable {}",
                            constraint.name, id.0
                        );
                        return Solution::failed(SolveStatus::Other);
                    },
                }
            }
            let op = match constraint.sense {
                ConstraintSense::LessOrEqual => ComparisonOp::Le,
                ConstraintSense::GreaterOrEqual => ComparisonOp::Ge,
                ConstraintSense::Equal => ComparisonOp::Eq,
            };
            problem.add_constraint(expr, op, constraint.rhs);
        }

        match problem.solve() {
            Ok(solution) => Solution::optimal(vars.iter().map(|v| solution[*v]).collect()),
            Err(minilp::Error::Infeasible) => {
                debug!("minilp: infeasible");
                Solution::failed(SolveStatus::Infeasible)
            },
            Err(e) => {
                debug!("minilp: {}", e);
                Solution::failed(SolveStatus::Other)
            },
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimize_two_vars() {
        // min x + y  s.t.  x + 2y >= 4,  3x + y >= 6
        let mut model = LinearModel::new();
        let x = model.add_variable("x", 0.0, f64::INFINITY, VarKind::Continuous);
        let y = model.add_variable("y", 0.0, f64::INFINITY, VarKind::Continuous);
        model.add_constraint("a", vec![(x, 1.0), (y, 2.0)], ConstraintSense::GreaterOrEqual, 4.0);
        model.add_constraint("b", vec![(x, 3.0), (y, 1.0)], ConstraintSense::GreaterOrEqual, 6.0);
        model.set_objective(ObjectiveSense::Minimize, vec![(x, 1.0), (y, 1.0)]);

        let solution = MinilpSolver.solve(&model);
        assert!(solution.is_optimal());
        let (xv, yv) = (solution.value(x).unwrap(), solution.value(y).unwrap());
        assert!((xv - 1.6).abs() < 1e-9);
        assert!((yv - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible() {
        let mut model = LinearModel::new();
        let x = model.add_variable("x", 0.0, 1.0, VarKind::Continuous);
        model.add_constraint("too_big", vec![(x, 1.0)], ConstraintSense::GreaterOrEqual, 2.0);
        model.set_objective(ObjectiveSense::Minimize, vec![(x, 1.0)]);
        assert_eq!(MinilpSolver.solve(&model).status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_integer_variables_unsupported() {
        let mut model = LinearModel::new();
        let x = model.add_variable("x", 0.0, 10.0, VarKind::Integer);
        model.set_objective(ObjectiveSense::Maximize, vec![(x, 1.0)]);
        let solution = MinilpSolver.solve(&model);
        assert_eq!(solution.status, SolveStatus::Other);
        assert_eq!(solution.value(x), None);
    }

    #[test]
    fn test_constraint_lhs() {
        let mut model = LinearModel::new();
        let x = model.add_variable("x", 0.0, 1.0, VarKind::Continuous);
        let y = model.add_variable("y", 0.0, 1.0, VarKind::Continuous);
        model.add_constraint("c", vec![(x, 2.0), (y, -1.0)], ConstraintSense::Equal, 0.0);
        assert_eq!(model.constraints()[0].lhs(&[3.0, 1.0]), 5.0);
    }
}
