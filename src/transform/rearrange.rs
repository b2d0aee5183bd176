//! Algebraic rearranger for linear gate ODEs.
//!
//! A gate equation `dx/dt` that is linear in `x` can always be written
//! `g + h*x`. From that pair the two closed forms used by exponential
//! integrators follow directly:
//!
//! - `alpha*(1 - x) - beta*x` with `alpha = g`, `beta = -(g + h)`
//! - `(x_inf - x)/tau` with `tau = -1/h`, `x_inf = -g/h`
//!
//! Coefficient extraction is structural, not numeric: a coefficient that
//! never occurs is reported as absent (`None`), which formatted output keeps
//! distinct from an explicit zero.

use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_simplify::{flatten_add, flatten_mul};

/// The `g + h*x` decomposition of a linear right-hand side. Either part is
/// `None` when no term of the expression contributed to it.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearParts {
    pub g: Option<Expr>,
    pub h: Option<Expr>,
}

impl LinearParts {
    pub fn g_or_zero(&self) -> Expr {
        self.g.clone().unwrap_or(Expr::Const(0.0))
    }

    pub fn h_or_zero(&self) -> Expr {
        self.h.clone().unwrap_or(Expr::Const(0.0))
    }

    /// `alpha*(1 - x) - beta*x` coefficients: `alpha = g`, `beta = -(g + h)`.
    pub fn alpha_beta(&self) -> (Expr, Expr) {
        let alpha = self.g_or_zero().simplify();
        let beta = (-(self.g_or_zero() + self.h_or_zero())).simplify();
        (alpha, beta)
    }

    /// `(x_inf - x)/tau` coefficients: `tau = -1/h`, `x_inf = -g/h`.
    /// `None` when `h` is absent or identically zero (the equation has no
    /// relaxation term, so the form does not exist).
    pub fn inf_tau(&self) -> Option<(Expr, Expr)> {
        let h = self.h.clone()?;
        if h.simplify().is_zero() {
            return None;
        }
        let tau = (Expr::Const(-1.0) / h.clone()).simplify();
        let inf = ((Expr::Const(-1.0) * self.g_or_zero()) / h).simplify();
        Some((inf, tau))
    }
}

/// Structural match of the written-out `alpha*(1 - x) - beta*x` shape.
///
/// Every additive term must carry exactly one factor that is either the
/// literal `(1 - x)` or the bare `x`; the product of its remaining `x`-free
/// factors contributes to `alpha` or `beta` respectively. At least one
/// `(1 - x)` term is required; with no bare-`x` terms `beta` is zero.
///
/// Algebraically equivalent shapes that are not written this way (such as
/// `(x_inf - x)/tau`) do not match, which is the point: callers try this
/// form first and fall back to [`collect_linear`] + [`LinearParts::inf_tau`].
pub fn match_alpha_beta(expr: &Expr, var: &str) -> Option<(Expr, Expr)> {
    let mut terms = Vec::new();
    flatten_add(expr, &mut terms);
    let mut alpha_terms: Vec<Expr> = Vec::new();
    let mut beta_terms: Vec<Expr> = Vec::new();
    for term in &terms {
        if !term.contains_variable(var) {
            return None;
        }
        let mut factors = Vec::new();
        flatten_mul(term, &mut factors);
        let mut carrier_is_one_minus: Option<bool> = None;
        let mut rest: Vec<Expr> = Vec::new();
        for f in factors {
            let one_minus = matches!(
                &f,
                Expr::Sub(a, b)
                    if a.as_const() == Some(1.0)
                        && matches!(b.as_ref(), Expr::Var(n) if n == var)
            );
            let bare = matches!(&f, Expr::Var(n) if n == var);
            if one_minus || bare {
                if carrier_is_one_minus.is_some() {
                    return None;
                }
                carrier_is_one_minus = Some(one_minus);
            } else if f.contains_variable(var) {
                return None;
            } else {
                rest.push(f);
            }
        }
        let coeff = rest
            .into_iter()
            .reduce(|a, b| a * b)
            .unwrap_or(Expr::Const(1.0));
        match carrier_is_one_minus {
            Some(true) => alpha_terms.push(coeff),
            Some(false) => beta_terms.push(coeff),
            None => return None,
        }
    }
    if alpha_terms.is_empty() {
        return None;
    }
    let alpha = alpha_terms
        .into_iter()
        .reduce(|a, b| a + b)
        .map(|e| e.simplify())?;
    // the bare-x coefficients appear as -beta, so negate their sum
    let beta = match beta_terms.into_iter().reduce(|a, b| a + b) {
        Some(sum) => (Expr::Const(-1.0) * sum).simplify(),
        None => Expr::Const(0.0),
    };
    Some((alpha, beta))
}

fn add_opt(a: Option<Expr>, b: Option<Expr>) -> Option<Expr> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x),
        (Some(x), Some(y)) => Some(x + y),
    }
}

fn sub_opt(a: Option<Expr>, b: Option<Expr>) -> Option<Expr> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(Expr::Const(-1.0) * y),
        (Some(x), Some(y)) => Some(x - y),
    }
}

fn map_opt(a: Option<Expr>, f: impl Fn(Expr) -> Expr) -> Option<Expr> {
    a.map(f)
}

/// Extracts `(g, h)` from an expression linear in `var`, so that
/// `expr == g + h*var`. Returns `None` when the expression is not linear in
/// `var` in a structurally recognizable way (callers classify first, so a
/// `None` here on a `Kind::Linear` expression is a matcher gap worth a bug
/// report, not an input error).
///
/// Piecewise expressions produce piecewise coefficients under the original
/// conditions; a branch that never mentions a coefficient contributes an
/// explicit `0` inside the piecewise, while a coefficient absent from every
/// branch is absent overall. Conditions may not mention `var`.
pub fn collect_linear(expr: &Expr, var: &str) -> Option<LinearParts> {
    if !expr.contains_variable(var) {
        return Some(LinearParts {
            g: Some(expr.clone()),
            h: None,
        });
    }
    match expr {
        Expr::Var(name) if name == var => Some(LinearParts {
            g: None,
            h: Some(Expr::Const(1.0)),
        }),
        Expr::Add(a, b) => {
            let pa = collect_linear(a, var)?;
            let pb = collect_linear(b, var)?;
            Some(LinearParts {
                g: add_opt(pa.g, pb.g),
                h: add_opt(pa.h, pb.h),
            })
        }
        Expr::Sub(a, b) => {
            let pa = collect_linear(a, var)?;
            let pb = collect_linear(b, var)?;
            Some(LinearParts {
                g: sub_opt(pa.g, pb.g),
                h: sub_opt(pa.h, pb.h),
            })
        }
        Expr::Mul(a, b) => {
            // exactly one factor may carry the variable
            let (carrier, free) = if a.contains_variable(var) {
                if b.contains_variable(var) {
                    return None;
                }
                (a, b)
            } else {
                (b, a)
            };
            let parts = collect_linear(carrier, var)?;
            let free = free.as_ref().clone();
            Some(LinearParts {
                g: map_opt(parts.g, |g| free.clone() * g),
                h: map_opt(parts.h, |h| free.clone() * h),
            })
        }
        Expr::Div(num, den) => {
            if den.contains_variable(var) {
                return None;
            }
            let parts = collect_linear(num, var)?;
            let den = den.as_ref().clone();
            Some(LinearParts {
                g: map_opt(parts.g, |g| g / den.clone()),
                h: map_opt(parts.h, |h| h / den.clone()),
            })
        }
        Expr::Piecewise(pairs) => {
            if pairs.iter().any(|(_, cond)| cond.contains_variable(var)) {
                return None;
            }
            let branch_parts: Vec<(LinearParts, Expr)> = pairs
                .iter()
                .map(|(value, cond)| collect_linear(value, var).map(|p| (p, cond.clone())))
                .collect::<Option<_>>()?;
            let build = |pick: fn(&LinearParts) -> &Option<Expr>| -> Option<Expr> {
                if branch_parts.iter().all(|(p, _)| pick(p).is_none()) {
                    return None;
                }
                Some(Expr::Piecewise(
                    branch_parts
                        .iter()
                        .map(|(p, cond)| {
                            (
                                pick(p).clone().unwrap_or(Expr::Const(0.0)),
                                cond.clone(),
                            )
                        })
                        .collect(),
                ))
            };
            Some(LinearParts {
                g: build(|p| &p.g),
                h: build(|p| &p.h),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbolic_engine::Expr;

    fn v(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn test_collect_pure_decay() {
        // dx/dt = -k*x  ->  g absent, h = -k
        let rhs = Expr::Const(-1.0) * (v("k") * v("x"));
        let parts = collect_linear(&rhs, "x").unwrap();
        assert!(parts.g.is_none());
        assert!(parts.h.is_some());
    }

    #[test]
    fn test_collect_alpha_beta_shape() {
        // alpha*(1 - x) - beta*x  ->  g = alpha, h = -(alpha + beta)
        let alpha = Expr::Exp(Box::new(v("V")));
        let beta = v("V") + Expr::Const(1.0);
        let rhs = alpha.clone() * (Expr::Const(1.0) - v("x")) - beta.clone() * v("x");
        let parts = collect_linear(&rhs, "x").unwrap();
        let (a, b) = parts.alpha_beta();
        let at = |e: &Expr| e.eval_expression(&["V"], &[0.5]);
        assert!((at(&a) - at(&alpha)).abs() < 1e-12);
        assert!((at(&b) - at(&beta)).abs() < 1e-12);
    }

    #[test]
    fn test_collect_inf_tau_shape() {
        // (inf - x)/tau  ->  tau back out exactly
        let rhs = (v("x_inf") - v("x")) / v("tau_x");
        let parts = collect_linear(&rhs, "x").unwrap();
        let (inf, tau) = parts.inf_tau().unwrap();
        // tau = -1/h = -1/(-1/tau_x) = tau_x
        assert!(
            (tau.eval_expression(&["tau_x"], &[3.5]) - 3.5).abs() < 1e-12,
            "tau did not round-trip: {}",
            tau
        );
        assert!(
            (inf.eval_expression(&["x_inf", "tau_x"], &[0.25, 3.5]) - 0.25).abs() < 1e-12,
            "x_inf did not round-trip: {}",
            inf
        );
    }

    #[test]
    fn test_collect_rejects_quadratic() {
        let rhs = v("x") * v("x");
        assert!(collect_linear(&rhs, "x").is_none());
    }

    #[test]
    fn test_piecewise_branch_without_term_gets_zero() {
        let pw = Expr::Piecewise(vec![
            (Expr::Const(5.0), v("V").lt(Expr::Const(0.0))),
            (v("x") * Expr::Const(2.0), Expr::otherwise()),
        ]);
        let parts = collect_linear(&pw, "x").unwrap();
        // g present in the first branch only, h in the second only; both are
        // piecewise with an explicit zero fill
        let g = parts.g.unwrap();
        let h = parts.h.unwrap();
        assert_eq!(g.eval_expression(&["V", "x"], &[-1.0, 0.0]), 5.0);
        assert_eq!(g.eval_expression(&["V", "x"], &[1.0, 0.0]), 0.0);
        assert_eq!(h.eval_expression(&["V", "x"], &[1.0, 0.0]), 2.0);
        assert_eq!(h.eval_expression(&["V", "x"], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_match_alpha_beta_written_form() {
        let alpha = Expr::Exp(Box::new(v("V") * Expr::Const(0.1)));
        let beta = v("V") + Expr::Const(4.0);
        let rhs = alpha.clone() * (Expr::Const(1.0) - v("m")) - beta.clone() * v("m");
        let (a, b) = match_alpha_beta(&rhs, "m").unwrap();
        let at = |e: &Expr| e.eval_expression(&["V"], &[2.0]);
        assert!((at(&a) - at(&alpha)).abs() < 1e-12);
        assert!((at(&b) - at(&beta)).abs() < 1e-12);
    }

    #[test]
    fn test_match_alpha_beta_negated_product_term() {
        // -1 * (beta * m) spelling of the decay term
        let alpha = v("r");
        let beta = v("s");
        let rhs = alpha.clone() * (Expr::Const(1.0) - v("m"))
            + Expr::Const(-1.0) * (beta.clone() * v("m"));
        let (a, b) = match_alpha_beta(&rhs, "m").unwrap();
        assert!((a.eval_expression(&["r"], &[1.5]) - 1.5).abs() < 1e-12);
        assert!((b.eval_expression(&["s"], &[2.5]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_match_alpha_beta_rejects_inf_tau_spelling() {
        // algebraically linear, but not written as alpha*(1-x) - beta*x
        let rhs = (v("m_inf") - v("m")) / v("tau_m");
        assert!(match_alpha_beta(&rhs, "m").is_none());
        // the fallback path still handles it
        assert!(collect_linear(&rhs, "m").unwrap().inf_tau().is_some());
    }

    #[test]
    fn test_match_alpha_beta_rejects_pure_decay() {
        let rhs = Expr::Const(-1.0) * (v("k") * v("m"));
        assert!(match_alpha_beta(&rhs, "m").is_none());
    }

    #[test]
    fn test_no_relaxation_term_has_no_inf_tau() {
        let rhs = v("V") * Expr::Const(2.0); // constant in x
        let parts = collect_linear(&rhs, "x").unwrap();
        assert!(parts.h.is_none());
        assert!(parts.inf_tau().is_none());
        let (alpha, beta) = parts.alpha_beta();
        assert_eq!(alpha, (v("V") * Expr::Const(2.0)).simplify());
        // beta = -(g + 0) = -g
        assert_eq!(
            beta.eval_expression(&["V"], &[3.0]),
            -6.0
        );
    }
}
