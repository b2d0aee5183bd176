//! Equation containers shared by every transformation pass.
//!
//! A model is an ordered list of equations: plain assignments that define
//! intermediates, and derivative equations that define the ODE right-hand
//! sides. All passes preserve the list order; where a pass needs its own
//! iteration order it sorts by defined name, never by position.

use crate::symbolic::symbolic_engine::Expr;
use std::collections::{HashMap, HashSet};

/// Left-hand side of an equation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lhs {
    /// An intermediate or parameter assignment, `name = rhs`.
    Variable(String),
    /// A derivative, `d var / d wrt = rhs`.
    Derivative { var: String, wrt: String },
}

impl Lhs {
    /// Name of the symbol this equation defines. For a derivative that is the
    /// differentiated variable.
    pub fn name(&self) -> &str {
        match self {
            Lhs::Variable(name) => name,
            Lhs::Derivative { var, .. } => var,
        }
    }
}

impl std::fmt::Display for Lhs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lhs::Variable(name) => write!(f, "{}", name),
            Lhs::Derivative { var, wrt } => write!(f, "d{}/d{}", var, wrt),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Equation {
    pub lhs: Lhs,
    pub rhs: Expr,
}

impl Equation {
    pub fn assignment(name: &str, rhs: Expr) -> Self {
        Equation {
            lhs: Lhs::Variable(name.to_string()),
            rhs,
        }
    }

    pub fn ode(var: &str, wrt: &str, rhs: Expr) -> Self {
        Equation {
            lhs: Lhs::Derivative {
                var: var.to_string(),
                wrt: wrt.to_string(),
            },
            rhs,
        }
    }

    pub fn is_derivative(&self) -> bool {
        matches!(self.lhs, Lhs::Derivative { .. })
    }
}

/// Counts how many times each variable name is referenced across all
/// right-hand sides. Every occurrence counts, including repeats inside one
/// expression.
pub fn count_usages(equations: &[Equation]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for eq in equations {
        eq.rhs.visit(&mut |node| {
            if let Expr::Var(name) = node {
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
        });
    }
    counts
}

/// Map from defined name to right-hand side for plain assignments only.
pub fn assignment_map(equations: &[Equation]) -> HashMap<String, Expr> {
    equations
        .iter()
        .filter(|eq| !eq.is_derivative())
        .map(|eq| (eq.lhs.name().to_string(), eq.rhs.clone()))
        .collect()
}

/// Derivative right-hand sides with every intermediate assignment inlined,
/// keyed by state-variable name. Substitution repeats until a fixed point,
/// bounded by the equation count.
///
/// # Panics
/// If the assignment graph is cyclic.
pub fn inlined_derivative_rhs(equations: &[Equation]) -> HashMap<String, Expr> {
    let defs = assignment_map(equations);
    let mut out = HashMap::new();
    for eq in equations {
        if let Lhs::Derivative { var, .. } = &eq.lhs {
            let mut rhs = eq.rhs.clone();
            let mut rounds = 0;
            loop {
                let next = rhs.substitute_map(&defs);
                if next == rhs {
                    break;
                }
                rhs = next;
                rounds += 1;
                assert!(
                    rounds <= equations.len(),
                    "cyclic intermediate definitions while inlining d{}/dt",
                    var
                );
            }
            out.insert(var.clone(), rhs);
        }
    }
    out
}

/// Names of assignments whose definitions reach any of `targets`, directly
/// or through other assignments. Computed to a fixed point over the
/// definition graph.
pub fn names_touching(
    defs: &HashMap<String, Expr>,
    targets: &HashSet<String>,
) -> HashSet<String> {
    let mut touching: HashSet<String> = HashSet::new();
    loop {
        let mut grew = false;
        for (name, rhs) in defs {
            if touching.contains(name) {
                continue;
            }
            let hits = {
                let mut hit = false;
                rhs.visit(&mut |node| {
                    if let Expr::Var(n) = node {
                        if targets.contains(n) || touching.contains(n) {
                            hit = true;
                        }
                    }
                });
                hit
            };
            if hits {
                touching.insert(name.clone());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    touching
}

/// Substitutes into `rhs` only those assignments whose definitions touch one
/// of `targets` (per [`names_touching`]), repeated to a fixed point. Every
/// other intermediate name is left standing.
pub fn substitute_touching(
    rhs: &Expr,
    defs: &HashMap<String, Expr>,
    targets: &HashSet<String>,
) -> Expr {
    let touching = names_touching(defs, targets);
    let filtered: HashMap<String, Expr> = defs
        .iter()
        .filter(|(name, _)| touching.contains(*name))
        .map(|(name, rhs)| (name.clone(), rhs.clone()))
        .collect();
    let mut out = rhs.clone();
    let mut rounds = 0;
    loop {
        let next = out.substitute_map(&filtered);
        if next == out {
            return out;
        }
        out = next;
        rounds += 1;
        assert!(
            rounds <= defs.len() + 1,
            "cyclic intermediate definitions while substituting"
        );
    }
}

/// Indices of `equations` in ascending order of defined name, derivatives
/// after assignments with the same name. Passes that must walk the system in
/// a reproducible order use this instead of list position.
pub fn name_sorted_indices(equations: &[Equation]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..equations.len()).collect();
    idx.sort_by(|&a, &b| {
        let ka = (equations[a].lhs.name(), equations[a].is_derivative());
        let kb = (equations[b].lhs.name(), equations[b].is_derivative());
        ka.cmp(&kb)
    });
    idx
}
