//! Removable-singularity fixer.
//!
//! Ionic-current models are full of quotients of the
//! `(c1*V - c2)/(exp(c3*V + c4) - c5)` family whose denominator has one real
//! root in the physiological voltage range. At that point the quotient is a
//! 0/0 removable singularity (or close enough to one to destroy a solver
//! step). The fixer locates the root, brackets it with a narrow window and
//! replaces the expression inside the window with the straight line through
//! the window edges:
//!
//! `piecewise(f(vs) + (V - vs)/(ve - vs) * (f(ve) - f(vs))  if |V - sp| < w,
//!            f(V)  otherwise)`
//!
//! Terms of a sum that share a singular point are patched jointly, as one
//! window over the whole sum; unrelated terms are patched independently.

use crate::global::{THRESHOLD, U_OFFSET};
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_simplify::{flatten_add, flatten_mul};
use crate::transform::equations::{name_sorted_indices, Equation};
use crate::transform::rearrange::collect_linear;
use log::info;
use std::collections::{HashMap, HashSet};

/// A located denominator root with its patch window `[vs, ve]`,
/// `vs < sp < ve`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SingularPoint {
    pub sp: f64,
    pub vs: f64,
    pub ve: f64,
}

fn same_point(a: f64, b: f64) -> bool {
    (a - b).abs() <= THRESHOLD * a.abs().max(b.abs()).max(1.0)
}

/// `arg` as `a*var + b` with constant coefficients, `a != 0`.
fn match_affine(arg: &Expr, var: &str) -> Option<(f64, f64)> {
    let parts = collect_linear(arg, var)?;
    let a = parts.h_or_zero().simplify().as_const()?;
    let b = parts.g_or_zero().simplify().as_const()?;
    if a == 0.0 { None } else { Some((a, b)) }
}

/// Matches a denominator of the shape `k*exp(a*var + b) + c` (any signs,
/// covering `exp(..)*z - c5`, `c5 - exp(..)*z` and both negations) and
/// returns the root of `den = 0` with its patch window. `None` when the
/// shape does not match or the root does not exist (`-c/k <= 0`).
pub fn match_denominator(den: &Expr, var: &str, u_offset: f64) -> Option<SingularPoint> {
    let den = den.simplify();
    let mut terms = Vec::new();
    flatten_add(&den, &mut terms);

    let mut k = 0.0_f64;
    let mut exp_coeffs: Option<(f64, f64)> = None;
    let mut c = 0.0_f64;
    for term in &terms {
        if !term.contains_variable(var) {
            c += term.simplify().as_const()?;
            continue;
        }
        // a var-bearing term must be a constant multiple of one exponential
        let mut factors = Vec::new();
        flatten_mul(term, &mut factors);
        let mut term_k = 1.0_f64;
        let mut term_exp: Option<(f64, f64)> = None;
        for f in factors {
            match f {
                Expr::Const(x) => term_k *= x,
                Expr::Exp(arg) => {
                    if term_exp.is_some() {
                        return None;
                    }
                    term_exp = Some(match_affine(&arg, var)?);
                }
                _ => return None,
            }
        }
        let (a, b) = term_exp?;
        match exp_coeffs {
            None => {
                exp_coeffs = Some((a, b));
                k = term_k;
            }
            Some((a0, b0)) if same_point(a, a0) && same_point(b, b0) => k += term_k,
            Some(_) => return None,
        }
    }
    let (a, b) = exp_coeffs?;
    if k == 0.0 || c == 0.0 {
        return None; // no root: pure exponential or pure constant
    }
    let ratio = -c / k;
    if !(ratio > 0.0) || !ratio.is_finite() {
        return None;
    }
    let sp = (ratio.ln() - b) / a;
    if !sp.is_finite() {
        return None;
    }
    let w = (u_offset / a).abs();
    Some(SingularPoint {
        sp,
        vs: sp - w,
        ve: sp + w,
    })
}

/// Whether patching the quotient at `sp` is justified: the numerator is
/// either affine in `var` with its root at `sp` (the classic 0/0 shape), or
/// itself carries an exponential in `var` (the rewritten-in-terms-of-U
/// shape). A numerator that is finite and non-zero at the root would make
/// the point a true pole, which must not be papered over.
pub fn match_numerator(num: &Expr, var: &str, sp: f64) -> bool {
    if num.contains_exp() && num.contains_variable(var) {
        return true;
    }
    if let Some((a, b)) = match_affine(&num.simplify(), var) {
        return same_point(-b / a, sp);
    }
    false
}

/// Splits a product into numerator and denominator factor lists, pulling
/// apart `Div` factors and negative constant powers.
pub fn split_factors(expr: &Expr) -> (Vec<Expr>, Vec<Expr>) {
    let mut num = Vec::new();
    let mut den = Vec::new();
    let mut factors = Vec::new();
    flatten_mul(expr, &mut factors);
    for f in factors {
        match f {
            Expr::Div(a, b) => {
                let (mut n2, mut d2) = split_factors(&a);
                num.append(&mut n2);
                den.append(&mut d2);
                let (mut n3, mut d3) = split_factors(&b);
                den.append(&mut n3);
                num.append(&mut d3);
            }
            Expr::Pow(base, exp) => match exp.as_const() {
                Some(p) if p < 0.0 => {
                    if p == -1.0 {
                        den.push(*base);
                    } else {
                        den.push(Expr::Pow(base, Box::new(Expr::Const(-p))));
                    }
                }
                _ => num.push(Expr::Pow(base, exp)),
            },
            other => num.push(other),
        }
    }
    (num, den)
}

fn product(factors: &[Expr]) -> Expr {
    factors
        .iter()
        .cloned()
        .reduce(|a, b| a * b)
        .unwrap_or(Expr::Const(1.0))
}

/// Locates the singular point of one quotient-shaped term, if any.
fn find_singularity(expr: &Expr, var: &str, u_offset: f64) -> Option<SingularPoint> {
    let (num_factors, den_factors) = split_factors(expr);
    if den_factors.is_empty() {
        return None;
    }
    let den = product(&den_factors);
    let point = match_denominator(&den, var, u_offset)?;
    let num = product(&num_factors);
    if match_numerator(&num, var, point.sp) {
        Some(point)
    } else {
        None
    }
}

/// Wraps `expr` in a piecewise that replaces it with the interpolation line
/// inside each point's window, keeping the original everywhere else.
fn interpolate(expr: &Expr, var: &str, points: &[SingularPoint]) -> Expr {
    let v = Expr::Var(var.to_string());
    let mut branches = Vec::new();
    for p in points {
        let f_vs = expr.set_variable(var, p.vs).simplify();
        let f_ve = expr.set_variable(var, p.ve).simplify();
        let slope_arg = (v.clone() - Expr::Const(p.vs)) / Expr::Const(p.ve - p.vs);
        let line = f_vs.clone() + slope_arg * (f_ve - f_vs);
        let cond = Expr::abs((v.clone() - Expr::Const(p.sp)).boxed())
            .lt(Expr::Const((p.ve - p.vs) / 2.0));
        branches.push((line, cond));
    }
    branches.push((expr.clone(), Expr::otherwise()));
    Expr::Piecewise(branches)
}

/// Rewrites `expr` with every located removable singularity patched.
/// Returns `None` when nothing was found, leaving the caller free to keep
/// the original expression object untouched.
pub fn new_expr(expr: &Expr, var: &str, u_offset: f64) -> Option<Expr> {
    if !expr.contains_exp() || !expr.contains_variable(var) {
        return None;
    }
    // a piecewise already carries a patch (or a model-level branch); its
    // otherwise arm intentionally keeps the raw form
    if expr.is_piecewise() {
        return None;
    }
    // a quotient shape at this node is patched as a whole
    if let Some(point) = find_singularity(expr, var, u_offset) {
        return Some(interpolate(expr, var, &[point]));
    }
    if let Expr::Add(..) | Expr::Sub(..) = expr {
        return fix_sum(expr, var, u_offset);
    }
    // otherwise descend
    let mut changed = false;
    let rebuilt = expr.map_children(&mut |child| match new_expr(child, var, u_offset) {
        Some(fixed) => {
            changed = true;
            fixed
        }
        None => child.clone(),
    });
    if changed { Some(rebuilt) } else { None }
}

/// Sums need care: `a/(exp(..) - 1) - b/(exp(..) - 1)` must be patched as a
/// single window over the whole sum, or the two interpolations reintroduce
/// the blow-up in each other's `otherwise` branch.
fn fix_sum(expr: &Expr, var: &str, u_offset: f64) -> Option<Expr> {
    let mut terms = Vec::new();
    flatten_add(expr, &mut terms);
    let points: Vec<Option<SingularPoint>> = terms
        .iter()
        .map(|t| find_singularity(t, var, u_offset))
        .collect();

    // points present in two or more terms get a joint window
    let mut shared: Vec<SingularPoint> = Vec::new();
    for p in points.iter().flatten() {
        if shared.iter().any(|s| same_point(s.sp, p.sp)) {
            continue;
        }
        let occurrences = points
            .iter()
            .filter(|q| q.is_some_and(|q| same_point(q.sp, p.sp)))
            .count();
        if occurrences >= 2 {
            shared.push(*p);
        }
    }

    let mut changed = false;
    let rebuilt_terms: Vec<Expr> = terms
        .iter()
        .zip(points.iter())
        .map(|(term, point)| {
            match point {
                // shared points are handled on the whole sum below
                Some(p) if shared.iter().any(|s| same_point(s.sp, p.sp)) => term.clone(),
                Some(p) => {
                    changed = true;
                    interpolate(term, var, &[*p])
                }
                None => match new_expr(term, var, u_offset) {
                    Some(fixed) => {
                        changed = true;
                        fixed
                    }
                    None => term.clone(),
                },
            }
        })
        .collect();
    let rebuilt = rebuilt_terms
        .into_iter()
        .reduce(|a, b| a + b)
        .unwrap_or(Expr::Const(0.0));

    if !shared.is_empty() {
        Some(interpolate(&rebuilt, var, &shared))
    } else if changed {
        Some(rebuilt)
    } else {
        None
    }
}

fn contains_piecewise(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |node| {
        if node.is_piecewise() {
            found = true;
        }
    });
    found
}

/// Patches every equation of the system whose right-hand side carries a
/// removable singularity in `var`. An equation is replaced atomically:
/// either its rhs becomes the patched expression, or it is left
/// byte-for-byte as it was.
///
/// Equations are examined in name order for reproducibility, output keeps
/// the original list order. Each right-hand side is scanned with the results
/// of earlier patched assignments substituted in, so a downstream equation
/// never keeps a reference to the unpatched form of an upstream rate.
/// Assignments naming a modifiable parameter, constant assignments and
/// equations that already contain a piecewise are skipped. Returns the
/// rewritten system and the number of patched equations.
pub fn fix_singularity_equations(
    equations: &[Equation],
    var: &str,
    modifiable_parameters: &[String],
    u_offset: f64,
    optimize: bool,
) -> (Vec<Equation>, usize) {
    let params: HashSet<&str> = modifiable_parameters.iter().map(|s| s.as_str()).collect();
    let mut out: Vec<Equation> = equations.to_vec();
    let mut fixed_defs: HashMap<String, Expr> = HashMap::new();
    let mut fixed = 0;
    for idx in name_sorted_indices(equations) {
        let eq = &equations[idx];
        if !eq.is_derivative() && params.contains(eq.lhs.name()) {
            continue;
        }
        if eq.rhs.as_const().is_some() || contains_piecewise(&eq.rhs) {
            continue;
        }
        let candidate = eq.rhs.substitute_map(&fixed_defs);
        if let Some(patched) = new_expr(&candidate, var, u_offset) {
            let patched = if optimize { patched.simplify() } else { patched };
            if !eq.is_derivative() {
                fixed_defs.insert(eq.lhs.name().to_string(), patched.clone());
            }
            out[idx].rhs = patched;
            fixed += 1;
        }
    }
    info!("patched {} removable singularities in {}", fixed, var);
    (out, fixed)
}

/// [`fix_singularity_equations`] with no parameter set and the default
/// window half-width.
pub fn fix_singularities(equations: &[Equation], var: &str) -> (Vec<Equation>, usize) {
    fix_singularity_equations(equations, var, &[], U_OFFSET, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbolic_engine::Expr;

    fn v(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    /// The Hodgkin-Huxley alpha_n rate:
    /// 0.01*(V + 10)/(exp((V + 10)/10) - 1), singular at V = -10.
    fn alpha_n() -> Expr {
        let num = Expr::Const(0.01) * (v("V") + Expr::Const(10.0));
        let den = Expr::Exp(Box::new((v("V") + Expr::Const(10.0)) / Expr::Const(10.0)))
            - Expr::Const(1.0);
        num / den
    }

    #[test]
    fn test_match_denominator_finds_root() {
        let den = Expr::Exp(Box::new((v("V") + Expr::Const(10.0)) / Expr::Const(10.0)))
            - Expr::Const(1.0);
        let p = match_denominator(&den, "V", 1e-7).unwrap();
        assert!((p.sp - (-10.0)).abs() < 1e-9);
        assert!(p.vs < p.sp && p.sp < p.ve);
    }

    #[test]
    fn test_match_denominator_rejects_rootless() {
        // exp is always positive: exp(V) + 1 has no real root
        let den = Expr::Exp(Box::new(v("V"))) + Expr::Const(1.0);
        assert!(match_denominator(&den, "V", 1e-7).is_none());
        // no constant term at all
        let den = Expr::Exp(Box::new(v("V"))) * Expr::Const(2.0);
        assert!(match_denominator(&den, "V", 1e-7).is_none());
    }

    #[test]
    fn test_sign_variants() {
        // c5 - exp(c3*V + c4)
        let den = Expr::Const(2.0) - Expr::Exp(Box::new(v("V") * Expr::Const(0.5)));
        let p = match_denominator(&den, "V", 1e-7).unwrap();
        assert!((p.sp - 2.0_f64.ln() / 0.5).abs() < 1e-9);
        // -3*exp(V) + 6
        let den = Expr::Const(-3.0) * Expr::Exp(Box::new(v("V"))) + Expr::Const(6.0);
        let p = match_denominator(&den, "V", 1e-7).unwrap();
        assert!((p.sp - 2.0_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_true_pole_not_patched() {
        // 1/(exp(V) - 1) with a constant numerator is a true pole
        let expr = Expr::Const(1.0) / (Expr::Exp(Box::new(v("V"))) - Expr::Const(1.0));
        assert!(new_expr(&expr, "V", 1e-7).is_none());
    }

    #[test]
    fn test_alpha_n_is_patched() {
        let patched = new_expr(&alpha_n(), "V", 1e-7).expect("singularity not found");
        assert!(patched.is_piecewise());
        // well away from the singular point the patch is inert
        let orig = alpha_n();
        for vv in [-50.0, -20.0, 0.0, 40.0] {
            let a = orig.eval_expression(&["V"], &[vv]);
            let b = patched.eval_expression(&["V"], &[vv]);
            assert!((a - b).abs() < 1e-12, "patched value drifted at V={}", vv);
        }
        // at the singular point the original is 0/0 but the patch is finite
        // and close to the removable limit 0.1
        let at_sp = patched.eval_expression(&["V"], &[-10.0]);
        assert!(at_sp.is_finite());
        assert!((at_sp - 0.1).abs() < 1e-3, "limit value off: {}", at_sp);
    }

    #[test]
    fn test_shared_point_patched_jointly() {
        let e = Expr::Exp(Box::new(v("V"))) - Expr::Const(1.0);
        let t1 = (v("V") * Expr::Const(2.0)) / e.clone();
        let t2 = (v("V") * Expr::Const(-1.0)) / e;
        let sum = t1 + t2;
        let patched = new_expr(&sum, "V", 1e-7).unwrap();
        // one piecewise around the whole sum, not one per term
        match &patched {
            Expr::Piecewise(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected a piecewise at the top, got {}", other),
        }
        let at_sp = patched.eval_expression(&["V"], &[0.0]);
        // limit of (2V - V)/(exp(V)-1) = V/(exp(V)-1) at 0 is 1
        assert!((at_sp - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_equation_driver_replaces_atomically() {
        let eqs = vec![
            Equation::assignment(
                "alpha",
                v("V") / (Expr::Exp(Box::new(v("V"))) - Expr::Const(1.0)),
            ),
            Equation::assignment("beta", Expr::Exp(Box::new(v("V") * Expr::Const(-0.1)))),
            Equation::ode("n", "t", v("alpha") * (Expr::Const(1.0) - v("n")) - v("beta") * v("n")),
        ];
        let (out, fixed) = fix_singularities(&eqs, "V");
        assert_eq!(out.len(), eqs.len());
        assert_eq!(fixed, 1);
        let alpha = out.iter().find(|e| e.lhs.name() == "alpha").unwrap();
        assert!(contains_piecewise(&alpha.rhs));
        // the untouched equations are byte-identical
        assert_eq!(out[1].rhs, eqs[1].rhs);
        assert_eq!(out[2].rhs, eqs[2].rhs);
    }

    #[test]
    fn test_equation_driver_skips_modifiable_parameters() {
        let quotient = v("V") / (Expr::Exp(Box::new(v("V"))) - Expr::Const(1.0));
        let eqs = vec![
            Equation::assignment("scale", quotient.clone()),
            Equation::assignment("alpha", quotient),
        ];
        let (out, fixed) =
            fix_singularity_equations(&eqs, "V", &["scale".to_string()], 1e-7, false);
        assert_eq!(fixed, 1);
        assert_eq!(out[0].rhs, eqs[0].rhs);
        assert!(contains_piecewise(&out[1].rhs));
    }

    #[test]
    fn test_equation_driver_substitutes_upstream_fixes() {
        // gamma references alpha; after alpha is patched, gamma must be
        // scanned with the patched alpha in place, so its own rewrite keeps
        // no reference to the unpatched rate
        let quotient = v("V") / (Expr::Exp(Box::new(v("V"))) - Expr::Const(1.0));
        let eqs = vec![
            Equation::assignment("alpha", quotient.clone() * Expr::Const(2.0)),
            Equation::assignment("gamma", v("alpha") + quotient),
        ];
        let (out, fixed) = fix_singularities(&eqs, "V");
        assert_eq!(fixed, 2);
        assert!(contains_piecewise(&out[0].rhs));
        let gamma = &out[1].rhs;
        assert!(contains_piecewise(gamma));
        assert!(!gamma.contains_variable("alpha"));
        // finite everywhere, including the shared singular point
        assert!(gamma.eval_expression(&["V"], &[0.0]).is_finite());
    }
}
