//! # Symbolic Simplification Module
//!
//! Rule-based simplification of the expression tree: constant folding,
//! algebraic identities (`x + 0`, `x * 1`, `x - x`, power rules), like-term
//! collection over flattened sums, and piecewise branch pruning. `expand`
//! distributes products over sums so that downstream structural matchers see
//! a flat polynomial-like form.
//!
//! Simplification is conservative: anything it cannot prove is returned
//! unchanged, never approximated.

use crate::symbolic::symbolic_engine::Expr;
use std::collections::{BTreeMap, HashMap};

impl Expr {
    /// Public interface for expression simplification. Applies the full rule
    /// set bottom-up in a single pass.
    pub fn simplify(&self) -> Expr {
        self.simplify_()
    }

    /// Core recursive simplification:
    /// 1. constant folding on every arithmetic node
    /// 2. identity elimination (x+0, x*1, x*0, x^1, x^0, exp(0), ln(1))
    /// 3. power rules (x^a * x^b, (x^a)^b, x/x)
    /// 4. like-term collection over flattened sums (3x + 2x -> 5x)
    /// 5. piecewise pruning (drop false branches, stop at the first
    ///    statically-true condition, collapse single-branch piecewise)
    pub fn simplify_(&self) -> Expr {
        match self {
            Expr::Var(_) => self.clone(),
            Expr::Const(_) => self.clone(),
            Expr::Add(lhs, rhs) => {
                let lhs = lhs.simplify_();
                let rhs = rhs.simplify_();
                match (&lhs, &rhs) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
                    (Expr::Const(0.0), _) => rhs, // 0 + x = x
                    (_, Expr::Const(0.0)) => lhs, // x + 0 = x
                    _ => {
                        let expr = Expr::Add(Box::new(lhs), Box::new(rhs));
                        Self::simplify_polynomial(&expr).unwrap_or(expr)
                    }
                }
            }
            Expr::Sub(lhs, rhs) => {
                let lhs = lhs.simplify_();
                let rhs = rhs.simplify_();
                match (&lhs, &rhs) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a - b),
                    (_, Expr::Const(0.0)) => lhs, // x - 0 = x
                    _ if lhs == rhs => Expr::Const(0.0), // x - x = 0
                    _ => {
                        // a - b = a + (-1)*b, so the sum collector sees it
                        let neg_rhs =
                            Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(rhs)).simplify_();
                        let add_expr = Expr::Add(Box::new(lhs), Box::new(neg_rhs));
                        Self::simplify_polynomial(&add_expr).unwrap_or(add_expr)
                    }
                }
            }
            Expr::Mul(lhs, rhs) => {
                let lhs = lhs.simplify_();
                let rhs = rhs.simplify_();
                match (&lhs, &rhs) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
                    (Expr::Const(0.0), _) | (_, Expr::Const(0.0)) => Expr::Const(0.0),
                    (Expr::Const(1.0), _) => rhs, // 1 * x = x
                    (_, Expr::Const(1.0)) => lhs, // x * 1 = x
                    // x^a * x^b = x^(a+b)
                    (Expr::Pow(base1, exp1), Expr::Pow(base2, exp2)) if base1 == base2 => {
                        let new_exp = Expr::Add(exp1.clone(), exp2.clone()).simplify_();
                        Expr::Pow(base1.clone(), Box::new(new_exp))
                    }
                    (Expr::Var(v1), Expr::Pow(base, exp))
                    | (Expr::Pow(base, exp), Expr::Var(v1)) => {
                        if let Expr::Var(v2) = base.as_ref() {
                            if v1 == v2 {
                                let new_exp =
                                    Expr::Add(Box::new(Expr::Const(1.0)), exp.clone()).simplify_();
                                return Expr::Pow(
                                    Box::new(Expr::Var(v1.clone())),
                                    Box::new(new_exp),
                                );
                            }
                        }
                        Expr::Mul(Box::new(lhs), Box::new(rhs))
                    }
                    (Expr::Var(v1), Expr::Var(v2)) if v1 == v2 => {
                        Expr::Pow(Box::new(Expr::Var(v1.clone())), Box::new(Expr::Const(2.0)))
                    }
                    // exp(a) * exp(b) = exp(a + b)
                    (Expr::Exp(a), Expr::Exp(b)) => {
                        Expr::Exp(Box::new(Expr::Add(a.clone(), b.clone()).simplify_()))
                    }
                    // collect nested constants: (c1 * expr) * c2 = (c1*c2) * expr
                    (Expr::Mul(inner_lhs, inner_rhs), Expr::Const(c)) => {
                        match (inner_lhs.as_ref(), inner_rhs.as_ref()) {
                            (Expr::Const(c1), _) => {
                                Expr::Mul(Box::new(Expr::Const(c1 * c)), inner_rhs.clone())
                                    .simplify_()
                            }
                            (_, Expr::Const(c1)) => {
                                Expr::Mul(Box::new(Expr::Const(c1 * c)), inner_lhs.clone())
                                    .simplify_()
                            }
                            _ => Expr::Mul(Box::new(lhs), Box::new(rhs)),
                        }
                    }
                    (Expr::Const(c), Expr::Mul(inner_lhs, inner_rhs)) => {
                        match (inner_lhs.as_ref(), inner_rhs.as_ref()) {
                            (Expr::Const(c1), _) => {
                                Expr::Mul(Box::new(Expr::Const(c * c1)), inner_rhs.clone())
                                    .simplify_()
                            }
                            (_, Expr::Const(c1)) => {
                                Expr::Mul(Box::new(Expr::Const(c * c1)), inner_lhs.clone())
                                    .simplify_()
                            }
                            _ => Expr::Mul(Box::new(lhs), Box::new(rhs)),
                        }
                    }
                    _ => Expr::Mul(Box::new(lhs), Box::new(rhs)),
                }
            }
            Expr::Div(lhs, rhs) => {
                let lhs = lhs.simplify_();
                let rhs = rhs.simplify_();
                match (&lhs, &rhs) {
                    (Expr::Const(a), Expr::Const(b)) if *b != 0.0 => Expr::Const(a / b),
                    (Expr::Const(0.0), _) => Expr::Const(0.0), // 0 / x = 0
                    (_, Expr::Const(1.0)) => lhs,              // x / 1 = x
                    _ if lhs == rhs => Expr::Const(1.0),       // x / x = 1
                    // x^a / x^b = x^(a-b)
                    (Expr::Pow(base1, exp1), Expr::Pow(base2, exp2)) if base1 == base2 => {
                        let new_exp = Expr::Sub(exp1.clone(), exp2.clone()).simplify_();
                        match new_exp {
                            Expr::Const(0.0) => Expr::Const(1.0),
                            _ => Expr::Pow(base1.clone(), Box::new(new_exp)),
                        }
                    }
                    (Expr::Var(v1), Expr::Pow(base, exp)) => {
                        if let Expr::Var(v2) = base.as_ref() {
                            if v1 == v2 {
                                let new_exp =
                                    Expr::Sub(Box::new(Expr::Const(1.0)), exp.clone()).simplify_();
                                return match new_exp {
                                    Expr::Const(0.0) => Expr::Const(1.0),
                                    _ => Expr::Pow(
                                        Box::new(Expr::Var(v1.clone())),
                                        Box::new(new_exp),
                                    ),
                                };
                            }
                        }
                        Expr::Div(Box::new(lhs), Box::new(rhs))
                    }
                    (Expr::Pow(base, exp), Expr::Var(v2)) => {
                        if let Expr::Var(v1) = base.as_ref() {
                            if v1 == v2 {
                                let new_exp =
                                    Expr::Sub(exp.clone(), Box::new(Expr::Const(1.0))).simplify_();
                                return match new_exp {
                                    Expr::Const(0.0) => Expr::Const(1.0),
                                    _ => Expr::Pow(
                                        Box::new(Expr::Var(v1.clone())),
                                        Box::new(new_exp),
                                    ),
                                };
                            }
                        }
                        Expr::Div(Box::new(lhs), Box::new(rhs))
                    }
                    // (c1 * expr) / c2 = (c1/c2) * expr
                    (Expr::Mul(inner_lhs, inner_rhs), Expr::Const(c)) if *c != 0.0 => {
                        match (inner_lhs.as_ref(), inner_rhs.as_ref()) {
                            (Expr::Const(c1), _) => {
                                Expr::Mul(Box::new(Expr::Const(c1 / c)), inner_rhs.clone())
                                    .simplify_()
                            }
                            (_, Expr::Const(c1)) => {
                                Expr::Mul(Box::new(Expr::Const(c1 / c)), inner_lhs.clone())
                                    .simplify_()
                            }
                            _ => Expr::Div(Box::new(lhs), Box::new(rhs)),
                        }
                    }
                    (_, Expr::Mul(inner_lhs, inner_rhs)) => {
                        match (inner_lhs.as_ref(), inner_rhs.as_ref()) {
                            (Expr::Const(c1), Expr::Const(c2)) => {
                                Expr::Div(Box::new(lhs), Box::new(Expr::Const(c1 * c2)))
                                    .simplify_()
                            }
                            _ => Expr::Div(Box::new(lhs), Box::new(rhs)),
                        }
                    }
                    _ => Expr::Div(Box::new(lhs), Box::new(rhs)),
                }
            }
            Expr::Pow(base, exp) => {
                let base = base.simplify_();
                let exp = exp.simplify_();
                match (&base, &exp) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a.powf(*b)),
                    (_, Expr::Const(0.0)) => Expr::Const(1.0), // x ^ 0 = 1
                    (_, Expr::Const(1.0)) => base,             // x ^ 1 = x
                    (Expr::Const(0.0), _) => Expr::Const(0.0),
                    (Expr::Const(1.0), _) => Expr::Const(1.0),
                    // (x^a)^b = x^(a*b)
                    (Expr::Pow(inner_base, inner_exp), _) => {
                        let new_exp = Expr::Mul(inner_exp.clone(), Box::new(exp)).simplify_();
                        Expr::Pow(inner_base.clone(), Box::new(new_exp))
                    }
                    _ => Expr::Pow(Box::new(base), Box::new(exp)),
                }
            }
            Expr::Exp(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(1.0),
                    Expr::Ln(inner) => inner.as_ref().clone(), // exp(ln(x)) = x
                    _ => Expr::Exp(Box::new(expr)),
                }
            }
            Expr::Ln(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(1.0) => Expr::Const(0.0),
                    Expr::Exp(inner) => inner.as_ref().clone(), // ln(exp(x)) = x
                    _ => Expr::Ln(Box::new(expr)),
                }
            }
            Expr::abs(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(c) => Expr::Const(c.abs()),
                    _ => Expr::abs(Box::new(expr)),
                }
            }
            Expr::floor(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(c) => Expr::Const(c.floor()),
                    _ => Expr::floor(Box::new(expr)),
                }
            }
            Expr::ceiling(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(c) => Expr::Const(c.ceil()),
                    _ => Expr::ceiling(Box::new(expr)),
                }
            }
            Expr::sin(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::sin(Box::new(expr)),
                }
            }
            Expr::cos(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(1.0),
                    _ => Expr::cos(Box::new(expr)),
                }
            }
            Expr::tg(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::tg(Box::new(expr)),
                }
            }
            Expr::ctg(expr) => Expr::ctg(Box::new(expr.simplify_())),
            Expr::arcsin(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::arcsin(Box::new(expr)),
                }
            }
            Expr::arccos(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(1.0) => Expr::Const(0.0),
                    _ => Expr::arccos(Box::new(expr)),
                }
            }
            Expr::arctg(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::arctg(Box::new(expr)),
                }
            }
            Expr::arcctg(expr) => Expr::arcctg(Box::new(expr.simplify_())),
            Expr::sh(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::sh(Box::new(expr)),
                }
            }
            Expr::ch(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(1.0),
                    _ => Expr::ch(Box::new(expr)),
                }
            }
            Expr::th(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::th(Box::new(expr)),
                }
            }
            Expr::cth(expr) => Expr::cth(Box::new(expr.simplify_())),
            Expr::arsh(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::arsh(Box::new(expr)),
                }
            }
            Expr::arch(expr) => Expr::arch(Box::new(expr.simplify_())),
            Expr::arth(expr) => {
                let expr = expr.simplify_();
                match &expr {
                    Expr::Const(0.0) => Expr::Const(0.0),
                    _ => Expr::arth(Box::new(expr)),
                }
            }
            Expr::Lt(a, b) => Self::simplify_cmp(a, b, |x, y| x < y, Expr::Lt),
            Expr::Le(a, b) => Self::simplify_cmp(a, b, |x, y| x <= y, Expr::Le),
            Expr::Gt(a, b) => Self::simplify_cmp(a, b, |x, y| x > y, Expr::Gt),
            Expr::Ge(a, b) => Self::simplify_cmp(a, b, |x, y| x >= y, Expr::Ge),
            Expr::And(a, b) => {
                let a = a.simplify_();
                let b = b.simplify_();
                match (&a, &b) {
                    (Expr::Const(x), Expr::Const(y)) => {
                        Expr::Const(if *x != 0.0 && *y != 0.0 { 1.0 } else { 0.0 })
                    }
                    (Expr::Const(0.0), _) | (_, Expr::Const(0.0)) => Expr::Const(0.0),
                    (Expr::Const(_), _) => b, // non-zero constant is true
                    (_, Expr::Const(_)) => a,
                    _ => Expr::And(Box::new(a), Box::new(b)),
                }
            }
            Expr::Or(a, b) => {
                let a = a.simplify_();
                let b = b.simplify_();
                match (&a, &b) {
                    (Expr::Const(x), Expr::Const(y)) => {
                        Expr::Const(if *x != 0.0 || *y != 0.0 { 1.0 } else { 0.0 })
                    }
                    (Expr::Const(0.0), _) => b,
                    (_, Expr::Const(0.0)) => a,
                    (Expr::Const(_), _) | (_, Expr::Const(_)) => Expr::Const(1.0),
                    _ => Expr::Or(Box::new(a), Box::new(b)),
                }
            }
            Expr::Not(e) => {
                let e = e.simplify_();
                match &e {
                    Expr::Const(c) => Expr::Const(if *c == 0.0 { 1.0 } else { 0.0 }),
                    _ => Expr::Not(Box::new(e)),
                }
            }
            Expr::Piecewise(pairs) => {
                let mut out: Vec<(Expr, Expr)> = Vec::new();
                for (value, cond) in pairs {
                    let cond = cond.simplify_();
                    match cond.as_const() {
                        Some(0.0) => continue, // statically false branch
                        Some(_) => {
                            // statically true: this branch ends the piecewise
                            out.push((value.simplify_(), cond));
                            break;
                        }
                        None => out.push((value.simplify_(), cond)),
                    }
                }
                if out.is_empty() {
                    return Expr::Piecewise(pairs.clone());
                }
                // single live branch with a true condition collapses to its value
                if out.len() == 1 {
                    if let Some(c) = out[0].1.as_const() {
                        if c != 0.0 {
                            return out.into_iter().next().map(|(v, _)| v).unwrap_or_else(|| {
                                unreachable!()
                            });
                        }
                    }
                }
                // all branches carry the same value
                if out.iter().skip(1).all(|(v, _)| *v == out[0].0) {
                    if out
                        .last()
                        .map(|(_, c)| c.as_const().is_some_and(|c| c != 0.0))
                        .unwrap_or(false)
                    {
                        return out.into_iter().next().map(|(v, _)| v).unwrap_or_else(|| {
                            unreachable!()
                        });
                    }
                }
                Expr::Piecewise(out)
            }
            Expr::Fun(name, args) => Expr::Fun(
                name.clone(),
                args.iter().map(|a| a.simplify_()).collect(),
            ),
        }
    }

    fn simplify_cmp(
        a: &Expr,
        b: &Expr,
        op: fn(f64, f64) -> bool,
        rebuild: fn(Box<Expr>, Box<Expr>) -> Expr,
    ) -> Expr {
        let a = a.simplify_();
        let b = b.simplify_();
        match (&a, &b) {
            (Expr::Const(x), Expr::Const(y)) => {
                Expr::Const(if op(*x, *y) { 1.0 } else { 0.0 })
            }
            _ => rebuild(Box::new(a), Box::new(b)),
        }
    }

    /// Collects like terms in a flattened sum: `3x + 2x -> 5x`,
    /// `(a + b) - (a + b) -> 0`. Returns `None` when a term is not a product
    /// of constants and variable powers, or when nothing collapses.
    fn simplify_polynomial(expr: &Expr) -> Option<Expr> {
        let mut terms = Vec::new();
        flatten_add(expr, &mut terms);
        if terms.len() < 2 {
            return None;
        }
        for term in &terms {
            let (_, coeff) = extract_monomial(term);
            if coeff == 0.0 && !matches!(term, Expr::Const(0.0)) {
                return None; // non-polynomial term, leave the sum alone
            }
        }
        let poly_map = collect_add_terms(&terms);
        if poly_map.len() == terms.len() {
            return None;
        }
        let mut keys: Vec<_> = poly_map.into_iter().collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        let mut result_terms = Vec::new();
        for (monomial, coeff) in keys {
            if coeff == 0.0 {
                continue;
            }
            result_terms.push(Self::build_monomial_term(&monomial, coeff));
        }
        if result_terms.is_empty() {
            Some(Expr::Const(0.0))
        } else {
            Some(
                result_terms
                    .into_iter()
                    .reduce(|a, b| Expr::Add(Box::new(a), Box::new(b)))
                    .unwrap_or(Expr::Const(0.0)),
            )
        }
    }

    /// Rebuilds `coeff * x^n * y^m ...` from a monomial key.
    fn build_monomial_term(monomial: &MonomialKey, coeff: f64) -> Expr {
        if monomial.0.is_empty() {
            return Expr::Const(coeff);
        }
        let mut factors = Vec::new();
        if coeff != 1.0 {
            factors.push(Expr::Const(coeff));
        }
        for (var, exp) in &monomial.0 {
            let var_expr = Expr::Var(var.clone());
            if *exp == 1 {
                factors.push(var_expr);
            } else if *exp != 0 {
                factors.push(Expr::Pow(
                    Box::new(var_expr),
                    Box::new(Expr::Const(*exp as f64)),
                ));
            }
        }
        if factors.is_empty() {
            Expr::Const(1.0)
        } else {
            factors
                .into_iter()
                .reduce(|a, b| Expr::Mul(Box::new(a), Box::new(b)))
                .unwrap_or(Expr::Const(1.0))
        }
    }

    /// EXPANSION

    /// Distributes products and integer powers over sums:
    /// `a * (b + c) -> a*b + a*c`, `(a + b)^2 -> a^2 + 2ab + b^2` (small
    /// positive integer exponents only), `(a + b)/d -> a/d + b/d`.
    ///
    /// Used to put a right-hand side into a flat sum-of-products shape before
    /// linear-coefficient extraction. Non-arithmetic nodes (piecewise,
    /// comparisons, function calls) are left structurally intact, their
    /// children expanded.
    pub fn expand(&self) -> Expr {
        match self {
            Expr::Mul(lhs, rhs) => {
                let lhs = lhs.expand();
                let rhs = rhs.expand();
                Self::distribute_mul(&lhs, &rhs)
            }
            Expr::Div(lhs, rhs) => {
                let lhs = lhs.expand();
                let rhs = rhs.expand();
                match &lhs {
                    // (a + b)/d = a/d + b/d
                    Expr::Add(a, b) => Expr::Add(
                        Box::new(Expr::Div(a.clone(), Box::new(rhs.clone())).expand()),
                        Box::new(Expr::Div(b.clone(), Box::new(rhs)).expand()),
                    ),
                    Expr::Sub(a, b) => Expr::Sub(
                        Box::new(Expr::Div(a.clone(), Box::new(rhs.clone())).expand()),
                        Box::new(Expr::Div(b.clone(), Box::new(rhs)).expand()),
                    ),
                    _ => Expr::Div(Box::new(lhs), Box::new(rhs)),
                }
            }
            Expr::Pow(base, exp) => {
                let base = base.expand();
                let exp = exp.expand();
                if let Expr::Const(n) = exp {
                    let is_small_int = n.fract() == 0.0 && n >= 2.0 && n <= 4.0;
                    if is_small_int && matches!(base, Expr::Add(..) | Expr::Sub(..)) {
                        let mut acc = base.clone();
                        for _ in 1..(n as usize) {
                            acc = Self::distribute_mul(&acc, &base);
                        }
                        return acc;
                    }
                }
                Expr::Pow(Box::new(base), Box::new(exp))
            }
            _ => self.map_children(&mut |child| child.expand()),
        }
    }

    fn distribute_mul(lhs: &Expr, rhs: &Expr) -> Expr {
        match (lhs, rhs) {
            (Expr::Add(a, b), _) => Expr::Add(
                Box::new(Self::distribute_mul(a, rhs)),
                Box::new(Self::distribute_mul(b, rhs)),
            ),
            (Expr::Sub(a, b), _) => Expr::Sub(
                Box::new(Self::distribute_mul(a, rhs)),
                Box::new(Self::distribute_mul(b, rhs)),
            ),
            (_, Expr::Add(a, b)) => Expr::Add(
                Box::new(Self::distribute_mul(lhs, a)),
                Box::new(Self::distribute_mul(lhs, b)),
            ),
            (_, Expr::Sub(a, b)) => Expr::Sub(
                Box::new(Self::distribute_mul(lhs, a)),
                Box::new(Self::distribute_mul(lhs, b)),
            ),
            _ => Expr::Mul(Box::new(lhs.clone()), Box::new(rhs.clone())),
        }
    }
}

/// Variable part of a polynomial term: variable name -> exponent. `BTreeMap`
/// keeps the key canonical, so `x*y` and `y*x` collect together.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonomialKey(pub BTreeMap<String, i32>);

/// Flattens nested Add/Sub into a list of terms, pushing negation inward:
/// `a - b` contributes `[a, -1*b]`, `-1 * (a + b)` contributes
/// `[-1*a, -1*b]`.
pub(crate) fn flatten_add(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Add(a, b) => {
            flatten_add(a, out);
            flatten_add(b, out);
        }
        Expr::Sub(a, b) => {
            flatten_add(a, out);
            let neg_b = Expr::Mul(Box::new(Expr::Const(-1.0)), b.clone());
            flatten_add(&neg_b, out);
        }
        Expr::Mul(lhs, rhs) => {
            if let Expr::Const(-1.0) = lhs.as_ref() {
                match rhs.as_ref() {
                    Expr::Add(a, b) => {
                        let neg_a = Expr::Mul(Box::new(Expr::Const(-1.0)), a.clone());
                        let neg_b = Expr::Mul(Box::new(Expr::Const(-1.0)), b.clone());
                        flatten_add(&neg_a, out);
                        flatten_add(&neg_b, out);
                    }
                    _ => out.push(expr.clone()),
                }
            } else if let Expr::Const(-1.0) = rhs.as_ref() {
                match lhs.as_ref() {
                    Expr::Add(a, b) => {
                        let neg_a = Expr::Mul(Box::new(Expr::Const(-1.0)), a.clone());
                        let neg_b = Expr::Mul(Box::new(Expr::Const(-1.0)), b.clone());
                        flatten_add(&neg_a, out);
                        flatten_add(&neg_b, out);
                    }
                    _ => out.push(expr.clone()),
                }
            } else {
                out.push(expr.clone());
            }
        }
        _ => out.push(expr.clone()),
    }
}

/// Flattens nested multiplications into a factor list: `(a*b)*c -> [a, b, c]`.
pub(crate) fn flatten_mul(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Mul(a, b) => {
            flatten_mul(a, out);
            flatten_mul(b, out);
        }
        _ => out.push(expr.clone()),
    }
}

/// Groups a flattened term list by monomial, summing coefficients.
fn collect_add_terms(terms: &[Expr]) -> HashMap<MonomialKey, f64> {
    let mut poly = HashMap::new();
    for t in terms {
        let (mon, coeff) = extract_monomial(t);
        *poly.entry(mon).or_insert(0.0) += coeff;
    }
    poly
}

/// Splits a term into (monomial, coefficient) if it is a product of constants
/// and variable powers; non-polynomial terms report coefficient 0.0 with an
/// empty monomial.
pub(crate) fn extract_monomial(expr: &Expr) -> (MonomialKey, f64) {
    match expr {
        Expr::Const(c) => (MonomialKey(BTreeMap::new()), *c),
        Expr::Var(v) => {
            let mut m = BTreeMap::new();
            m.insert(v.clone(), 1);
            (MonomialKey(m), 1.0)
        }
        Expr::Mul(lhs, rhs) => match (lhs.as_ref(), rhs.as_ref()) {
            (Expr::Const(-1.0), other) | (other, Expr::Const(-1.0)) => {
                let (mon, coeff) = extract_monomial(other);
                (mon, -coeff)
            }
            (Expr::Const(c), other) | (other, Expr::Const(c)) => {
                let (mon, coeff) = extract_monomial(other);
                (mon, c * coeff)
            }
            _ => {
                let mut factors = Vec::new();
                flatten_mul(expr, &mut factors);
                let mut coeff = 1.0;
                let mut map = BTreeMap::new();
                let mut has_non_poly = false;
                for f in factors {
                    match f {
                        Expr::Const(c) => coeff *= c,
                        Expr::Var(v) => *map.entry(v).or_insert(0) += 1,
                        Expr::Pow(base, exp) => {
                            if let (Expr::Var(v), Expr::Const(n)) = (*base, *exp) {
                                *map.entry(v).or_insert(0) += n as i32;
                            } else {
                                has_non_poly = true;
                            }
                        }
                        _ => has_non_poly = true,
                    }
                }
                if has_non_poly {
                    (MonomialKey(BTreeMap::new()), 0.0)
                } else {
                    (MonomialKey(map), coeff)
                }
            }
        },
        Expr::Pow(base, exp) => {
            if let (Expr::Var(v), Expr::Const(n)) = (base.as_ref(), exp.as_ref()) {
                let mut m = BTreeMap::new();
                m.insert(v.clone(), *n as i32);
                (MonomialKey(m), 1.0)
            } else {
                (MonomialKey(BTreeMap::new()), 0.0)
            }
        }
        _ => (MonomialKey(BTreeMap::new()), 0.0),
    }
}

#[cfg(test)]
mod tests {
    use crate::symbolic::symbolic_engine::Expr;

    #[test]
    fn test_collect_like_terms() {
        let x = Expr::Var("x".to_owned());
        // 3x + 2x = 5x
        let e = Expr::Const(3.0) * x.clone() + Expr::Const(2.0) * x.clone();
        assert_eq!(e.simplify(), Expr::Const(5.0) * x.clone());
        // x - x = 0
        let e = x.clone() - x.clone();
        assert_eq!(e.simplify(), Expr::Const(0.0));
    }

    #[test]
    fn test_exp_ln_identities() {
        let x = Expr::Var("x".to_owned());
        assert_eq!(Expr::Exp(Box::new(Expr::Const(0.0))).simplify(), Expr::Const(1.0));
        assert_eq!(Expr::Ln(Box::new(Expr::Const(1.0))).simplify(), Expr::Const(0.0));
        assert_eq!(Expr::Exp(Box::new(Expr::Ln(x.clone().boxed()))).simplify(), x);
    }

    #[test]
    fn test_piecewise_pruning() {
        let x = Expr::Var("x".to_owned());
        // false branch dropped, single true-conditioned branch collapses
        let pw = Expr::Piecewise(vec![
            (Expr::Const(7.0), Expr::Const(0.0)),
            (x.clone(), Expr::otherwise()),
        ]);
        assert_eq!(pw.simplify(), x);
        // live symbolic condition survives
        let pw = Expr::Piecewise(vec![
            (Expr::Const(7.0), x.clone().lt(Expr::Const(0.0))),
            (x.clone(), Expr::otherwise()),
        ]);
        assert!(matches!(pw.simplify(), Expr::Piecewise(ref pairs) if pairs.len() == 2));
    }

    #[test]
    fn test_expand_distributes() {
        let a = Expr::Var("a".to_owned());
        let b = Expr::Var("b".to_owned());
        let c = Expr::Var("c".to_owned());
        let e = a.clone() * (b.clone() + c.clone());
        let expanded = e.expand();
        let expected = a.clone() * b.clone() + a.clone() * c.clone();
        assert_eq!(expanded, expected);
    }

    #[test]
    fn test_expand_pow() {
        let a = Expr::Var("a".to_owned());
        let b = Expr::Var("b".to_owned());
        let e = Expr::Pow(Box::new(a.clone() + b.clone()), Box::new(Expr::Const(2.0)));
        // (a+b)^2 expands then collects to a^2 + 2ab + b^2
        let collected = e.expand().simplify();
        let mut terms = Vec::new();
        super::flatten_add(&collected, &mut terms);
        assert_eq!(terms.len(), 3);
    }
}
