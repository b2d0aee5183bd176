//! Linearity classifier.
//!
//! Decides, per state variable, whether an expression is constant in that
//! variable (`Kind::None`), linear in it (`Kind::Linear`) or anything else
//! (`Kind::NonLinear`). Occurrences of *other* state variables (the membrane
//! voltage excepted) make an expression non-linear: the closed-form
//! integrators downstream treat voltage and time as externally-held
//! quantities within a step, but not the rest of the state.

use crate::symbolic::symbolic_engine::Expr;
use log::info;
use std::collections::{HashMap, HashSet};
use strum_macros::Display;

/// Linearity of an expression with respect to one state variable, ordered
/// `None < Linear < NonLinear` so combining rules can take a maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Kind {
    None,
    Linear,
    NonLinear,
}

/// Classifier for one target state variable. Holds an explicit memo table,
/// so repeated subtrees of one system are classified once.
pub struct LinearityClassifier {
    /// variable linearity is judged against
    pub state_var: String,
    /// other state variables, whose presence is non-linear by definition;
    /// must not contain `state_var` or the voltage/time variables
    pub other_state_vars: HashSet<String>,
    memo: HashMap<Expr, Kind>,
}

impl LinearityClassifier {
    pub fn new(state_var: &str, other_state_vars: &[String]) -> Self {
        assert!(
            !other_state_vars.iter().any(|v| v == state_var),
            "the target state variable {} must not appear in the other-state list",
            state_var
        );
        LinearityClassifier {
            state_var: state_var.to_string(),
            other_state_vars: other_state_vars.iter().cloned().collect(),
            memo: HashMap::new(),
        }
    }

    /// Classifies `expr` with respect to the target variable.
    ///
    /// Rules, in match order:
    /// 1. a variable: the target is `Linear`, another state variable is
    ///    `NonLinear`, everything else (voltage, time, parameters) is `None`
    /// 2. a constant, or an opaque function call (stimulus) whose arguments
    ///    are free of state variables: `None`; a call carrying a state
    ///    variable is `NonLinear` (it hides the dependency from every
    ///    rearrangement)
    /// 3. sums and differences: maximum of the operand kinds
    /// 4. products: one `Linear` factor among `None`s stays `Linear`, two or
    ///    more non-`None` factors are `NonLinear`
    /// 5. quotients: numerator kind if the denominator is `None`, otherwise
    ///    `NonLinear`
    /// 6. powers: `None` if the variable is absent from base and exponent,
    ///    otherwise `NonLinear`
    /// 7. unary functions (exp, ln, trig, hyperbolic, abs, floor, ceiling):
    ///    `None` argument stays `None`, anything else is `NonLinear`
    /// 8. piecewise: `NonLinear` if any condition mentions the variable,
    ///    otherwise the maximum over branch values
    ///
    /// # Panics
    /// On comparison or boolean nodes outside piecewise conditions.
    pub fn classify(&mut self, expr: &Expr) -> Kind {
        if let Some(kind) = self.memo.get(expr) {
            return *kind;
        }
        let kind = match expr {
            Expr::Var(name) => {
                if *name == self.state_var {
                    Kind::Linear
                } else if self.other_state_vars.contains(name) {
                    Kind::NonLinear
                } else {
                    Kind::None
                }
            }
            Expr::Const(_) => Kind::None,
            Expr::Fun(_, args) => {
                let touches_state = args.iter().any(|a| {
                    a.contains_variable(&self.state_var)
                        || self.other_state_vars.iter().any(|v| a.contains_variable(v))
                });
                if touches_state {
                    Kind::NonLinear
                } else {
                    Kind::None
                }
            }
            Expr::Add(a, b) | Expr::Sub(a, b) => self.classify(a).max(self.classify(b)),
            Expr::Mul(a, b) => {
                let ka = self.classify(a);
                let kb = self.classify(b);
                match (ka, kb) {
                    (Kind::None, k) | (k, Kind::None) => k,
                    _ => Kind::NonLinear,
                }
            }
            Expr::Div(num, den) => {
                if self.classify(den) == Kind::None {
                    self.classify(num)
                } else {
                    Kind::NonLinear
                }
            }
            Expr::Pow(base, exp) => {
                if self.classify(base) == Kind::None && self.classify(exp) == Kind::None {
                    Kind::None
                } else {
                    Kind::NonLinear
                }
            }
            Expr::Exp(e)
            | Expr::Ln(e)
            | Expr::abs(e)
            | Expr::floor(e)
            | Expr::ceiling(e)
            | Expr::sin(e)
            | Expr::cos(e)
            | Expr::tg(e)
            | Expr::ctg(e)
            | Expr::arcsin(e)
            | Expr::arccos(e)
            | Expr::arctg(e)
            | Expr::arcctg(e)
            | Expr::sh(e)
            | Expr::ch(e)
            | Expr::th(e)
            | Expr::cth(e)
            | Expr::arsh(e)
            | Expr::arch(e)
            | Expr::arth(e) => {
                if self.classify(e) == Kind::None {
                    Kind::None
                } else {
                    Kind::NonLinear
                }
            }
            Expr::Piecewise(pairs) => {
                let var_in_condition = pairs.iter().any(|(_, cond)| {
                    cond.contains_variable(&self.state_var)
                        || self
                            .other_state_vars
                            .iter()
                            .any(|v| cond.contains_variable(v))
                });
                if var_in_condition {
                    Kind::NonLinear
                } else {
                    pairs
                        .iter()
                        .map(|(value, _)| self.classify(value))
                        .max()
                        .unwrap_or(Kind::None)
                }
            }
            Expr::Lt(..)
            | Expr::Le(..)
            | Expr::Gt(..)
            | Expr::Ge(..)
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Not(..) => {
                panic!("boolean node outside a piecewise condition: {}", expr)
            }
        };
        self.memo.insert(expr.clone(), kind);
        kind
    }
}

/// State variables whose (fully inlined) derivative classifies as anything
/// other than linear in themselves, sorted by name. A derivative that does
/// not mention its own variable at all (`Kind::None`) is flagged too: there
/// is no relaxation term to build a closed-form update from. The voltage
/// variable is excluded from the scan: its equation is handled by the
/// integrator directly and never gets a closed-form update.
///
/// `inlined` maps each state variable to its inlined derivative right-hand
/// side (see [`crate::transform::equations::inlined_derivative_rhs`]).
///
/// # Panics
/// If a non-voltage state variable has no derivative entry.
pub fn get_non_linear_state_vars(
    inlined: &HashMap<String, Expr>,
    voltage_var: &str,
    state_vars: &[String],
) -> Vec<String> {
    assert!(!state_vars.is_empty(), "empty state variable list");
    let mut non_linear = Vec::new();
    for var in state_vars {
        if var == voltage_var {
            continue;
        }
        let rhs = inlined
            .get(var)
            .unwrap_or_else(|| panic!("state variable {} has no derivative equation", var));
        let others: Vec<String> = state_vars
            .iter()
            .filter(|v| *v != var && *v != voltage_var)
            .cloned()
            .collect();
        let mut classifier = LinearityClassifier::new(var, &others);
        if classifier.classify(rhs) != Kind::Linear {
            non_linear.push(var.clone());
        }
    }
    non_linear.sort();
    info!(
        "{} of {} state variables are non-linear",
        non_linear.len(),
        state_vars.len()
    );
    non_linear
}
