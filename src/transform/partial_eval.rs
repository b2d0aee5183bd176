//! Partial evaluator: folds single-use intermediate assignments into their
//! consumers.
//!
//! Usage counts are taken once, from the original equation list, and never
//! refreshed while folding. An intermediate referenced twice in the original
//! system is kept even if one of those references disappears during folding;
//! this keeps substituted polynomials from growing without bound and keeps
//! the pass idempotent.

use crate::transform::equations::{count_usages, Equation, Lhs};
use crate::symbolic::symbolic_engine::Expr;
use log::info;
use std::collections::HashMap;
use std::collections::HashSet;

/// Folds intermediates into their consumers.
///
/// An assignment is folded away when all of the following hold:
/// - its name is not in `protected` (state variables, modifiable parameters,
///   required outputs),
/// - it is referenced at most once in the original system, or
///   `keep_multiple_usages` is false, or its right-hand side is a plain
///   numeric literal (duplicating a literal loses nothing).
///
/// Unreferenced, unprotected assignments are dropped entirely. Equation
/// order is preserved for everything that survives. Running the pass twice
/// produces the same output as running it once.
pub fn partial_eval(
    equations: &[Equation],
    protected: &[String],
    keep_multiple_usages: bool,
) -> Vec<Equation> {
    let counts = count_usages(equations);
    let protected: HashSet<&str> = protected.iter().map(|s| s.as_str()).collect();

    let mut folded: HashMap<String, Expr> = HashMap::new();
    let mut out: Vec<Equation> = Vec::new();
    for eq in equations {
        let rhs = eq.rhs.substitute_map(&folded);
        match &eq.lhs {
            Lhs::Variable(name) if !protected.contains(name.as_str()) => {
                let uses = counts.get(name).copied().unwrap_or(0);
                if uses == 0 {
                    continue; // dead assignment
                }
                if uses == 1 || !keep_multiple_usages || rhs.as_const().is_some() {
                    folded.insert(name.clone(), rhs);
                    continue;
                }
                out.push(Equation {
                    lhs: eq.lhs.clone(),
                    rhs,
                });
            }
            _ => out.push(Equation {
                lhs: eq.lhs.clone(),
                rhs,
            }),
        }
    }
    info!(
        "partial evaluation folded {} of {} equations",
        equations.len() - out.len(),
        equations.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::equations::Equation;
    use crate::symbolic::symbolic_engine::Expr;

    fn v(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn test_single_use_intermediate_folds() {
        let eqs = vec![
            Equation::assignment("a", v("x") * Expr::Const(2.0)),
            Equation::ode("x", "t", v("a") + Expr::Const(1.0)),
        ];
        let out = partial_eval(&eqs, &[], true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rhs, v("x") * Expr::Const(2.0) + Expr::Const(1.0));
    }

    #[test]
    fn test_multiply_used_intermediate_kept() {
        let eqs = vec![
            Equation::assignment("a", v("x") * Expr::Const(2.0)),
            Equation::ode("x", "t", v("a") + v("a")),
        ];
        let out = partial_eval(&eqs, &[], true);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].lhs.name(), "a");
    }

    #[test]
    fn test_original_counts_are_not_refreshed() {
        // b is used twice in the original system; folding a removes one of
        // those uses, but b must still be kept.
        let eqs = vec![
            Equation::assignment("b", v("x") + Expr::Const(1.0)),
            Equation::assignment("a", v("b") * Expr::Const(3.0)),
            Equation::ode("x", "t", v("a") + v("b")),
        ];
        let out = partial_eval(&eqs, &[], true);
        let names: Vec<&str> = out.iter().map(|e| e.lhs.name()).collect();
        assert_eq!(names, vec!["b", "x"]);
    }

    #[test]
    fn test_numeric_literal_folds_despite_multiple_uses() {
        let eqs = vec![
            Equation::assignment("c", Expr::Const(4.0)),
            Equation::ode("x", "t", v("c") * v("x") + v("c")),
        ];
        let out = partial_eval(&eqs, &[], true);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].rhs,
            Expr::Const(4.0) * v("x") + Expr::Const(4.0)
        );
    }

    #[test]
    fn test_protected_names_survive() {
        let eqs = vec![
            Equation::assignment("g_Na", Expr::Const(120.0)),
            Equation::ode("x", "t", v("g_Na") * v("x")),
        ];
        let out = partial_eval(&eqs, &["g_Na".to_string()], true);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_dead_assignments_dropped() {
        let eqs = vec![
            Equation::assignment("unused", Expr::Const(7.0)),
            Equation::ode("x", "t", v("x")),
        ];
        let out = partial_eval(&eqs, &[], true);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_derivative());
    }

    #[test]
    fn test_idempotent() {
        let eqs = vec![
            Equation::assignment("b", v("x") + Expr::Const(1.0)),
            Equation::assignment("a", v("b") * Expr::Const(3.0)),
            Equation::ode("x", "t", v("a") + v("b")),
        ];
        let once = partial_eval(&eqs, &[], true);
        let twice = partial_eval(&once, &[], true);
        assert_eq!(once, twice);
    }
}
