//! # Symbolic Engine Derivatives Module
//!
//! Extends the symbolic engine with analytical differentiation and direct
//! numerical evaluation. Differentiation implements the standard calculus
//! rules (product, quotient, chain) over the full node set; piecewise
//! expressions differentiate branch-by-branch under unchanged conditions.
//!
//! Boolean and comparison nodes are never differentiated directly - they can
//! only appear inside piecewise conditions, which the derivative leaves
//! untouched. Hitting one outside that position is a caller bug and panics.

use crate::symbolic::symbolic_engine::Expr;

impl Expr {
    /// DIFFERENTIATION

    /// Computes the analytical derivative of the expression with respect to
    /// a variable.
    ///
    /// Implements all standard differentiation rules:
    /// - Power rule: d/dx(x^n) = n*x^(n-1)
    /// - Product rule: d/dx(f*g) = f'*g + f*g'
    /// - Quotient rule: d/dx(f/g) = (f'*g - f*g')/g^2
    /// - Chain rule: d/dx(f(g(x))) = f'(g(x))*g'(x)
    ///
    /// For multivariable expressions this is the partial derivative.
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Var(name) => {
                if name == var {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Add(lhs, rhs) => Expr::Add(Box::new(lhs.diff(var)), Box::new(rhs.diff(var))),
            Expr::Sub(lhs, rhs) => Expr::Sub(Box::new(lhs.diff(var)), Box::new(rhs.diff(var))),
            Expr::Mul(lhs, rhs) => Expr::Add(
                Box::new(Expr::Mul(Box::new(lhs.diff(var)), rhs.clone())),
                Box::new(Expr::Mul(lhs.clone(), Box::new(rhs.diff(var)))),
            ),
            Expr::Div(lhs, rhs) => Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(Box::new(lhs.diff(var)), rhs.clone())),
                    Box::new(Expr::Mul(Box::new(rhs.diff(var)), lhs.clone())),
                )),
                Box::new(Expr::Mul(rhs.clone(), rhs.clone())),
            ),
            Expr::Pow(base, exp) => {
                if exp.contains_variable(var) {
                    // general rule: d(u^v) = u^v * (v' ln u + v u'/u)
                    let u = base.clone();
                    let v = exp.clone();
                    Expr::Mul(
                        Box::new(Expr::Pow(u.clone(), v.clone())),
                        Box::new(Expr::Add(
                            Box::new(Expr::Mul(
                                Box::new(exp.diff(var)),
                                Box::new(Expr::Ln(u.clone())),
                            )),
                            Box::new(Expr::Div(
                                Box::new(Expr::Mul(v, Box::new(base.diff(var)))),
                                u,
                            )),
                        )),
                    )
                } else {
                    Expr::Mul(
                        Box::new(Expr::Mul(
                            exp.clone(),
                            Box::new(Expr::Pow(
                                base.clone(),
                                Box::new(Expr::Sub(exp.clone(), Box::new(Expr::Const(1.0)))),
                            )),
                        )),
                        Box::new(base.diff(var)),
                    )
                }
            }
            Expr::Exp(expr) => {
                Expr::Mul(Box::new(Expr::Exp(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::Ln(expr) => Expr::Div(Box::new(expr.diff(var)), expr.clone()),
            Expr::abs(expr) => Expr::Piecewise(vec![
                (
                    Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(expr.diff(var))),
                    Expr::Lt(expr.clone(), Box::new(Expr::Const(0.0))),
                ),
                (expr.diff(var), Expr::otherwise()),
            ]),
            // piecewise-constant almost everywhere
            Expr::floor(_) | Expr::ceiling(_) => Expr::Const(0.0),
            Expr::sin(expr) => {
                Expr::Mul(Box::new(Expr::cos(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::cos(expr) => Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(Expr::sin(expr.clone())),
                )),
                Box::new(expr.diff(var)),
            ),
            Expr::tg(expr) => Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Pow(
                        Box::new(Expr::cos(expr.clone())),
                        Box::new(Expr::Const(2.0)),
                    )),
                )),
                Box::new(expr.diff(var)),
            ),
            Expr::ctg(expr) => Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(Expr::Pow(
                        Box::new(Expr::sin(expr.clone())),
                        Box::new(Expr::Const(2.0)),
                    )),
                )),
                Box::new(expr.diff(var)),
            ),
            Expr::arcsin(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Pow(
                    Box::new(Expr::Sub(
                        Box::new(Expr::Const(1.0)),
                        Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                    )),
                    Box::new(Expr::Const(0.5)),
                )),
            ),
            Expr::arccos(expr) => Expr::Div(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(expr.diff(var)),
                )),
                Box::new(Expr::Pow(
                    Box::new(Expr::Sub(
                        Box::new(Expr::Const(1.0)),
                        Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                    )),
                    Box::new(Expr::Const(0.5)),
                )),
            ),
            Expr::arctg(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Add(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                )),
            ),
            Expr::arcctg(expr) => Expr::Div(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(expr.diff(var)),
                )),
                Box::new(Expr::Add(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                )),
            ),
            Expr::sh(expr) => {
                Expr::Mul(Box::new(Expr::ch(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::ch(expr) => {
                Expr::Mul(Box::new(Expr::sh(expr.clone())), Box::new(expr.diff(var)))
            }
            Expr::th(expr) => Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Pow(
                        Box::new(Expr::ch(expr.clone())),
                        Box::new(Expr::Const(2.0)),
                    )),
                )),
                Box::new(expr.diff(var)),
            ),
            Expr::cth(expr) => Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(Expr::Pow(
                        Box::new(Expr::sh(expr.clone())),
                        Box::new(Expr::Const(2.0)),
                    )),
                )),
                Box::new(expr.diff(var)),
            ),
            Expr::arsh(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Pow(
                    Box::new(Expr::Add(
                        Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                        Box::new(Expr::Const(1.0)),
                    )),
                    Box::new(Expr::Const(0.5)),
                )),
            ),
            Expr::arch(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Pow(
                    Box::new(Expr::Sub(
                        Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                        Box::new(Expr::Const(1.0)),
                    )),
                    Box::new(Expr::Const(0.5)),
                )),
            ),
            Expr::arth(expr) => Expr::Div(
                Box::new(expr.diff(var)),
                Box::new(Expr::Sub(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Pow(expr.clone(), Box::new(Expr::Const(2.0)))),
                )),
            ),
            // branch derivatives under unchanged conditions
            Expr::Piecewise(pairs) => Expr::Piecewise(
                pairs
                    .iter()
                    .map(|(value, cond)| (value.diff(var), cond.clone()))
                    .collect(),
            ),
            Expr::Lt(..)
            | Expr::Le(..)
            | Expr::Gt(..)
            | Expr::Ge(..)
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Not(..) => {
                panic!("cannot differentiate boolean expression {}", self)
            }
            Expr::Fun(name, args) => {
                if args.iter().any(|a| a.contains_variable(var)) {
                    panic!(
                        "cannot differentiate opaque function call {}(..) with respect to {}",
                        name, var
                    )
                } else {
                    Expr::Const(0.0)
                }
            }
        }
    } // end of diff

    /// DIRECT EXPRESSION EVALUATION

    /// Evaluates the symbolic expression at a point, without building a
    /// closure. `vars` lists variable names in the order of `values`.
    ///
    /// Comparison and boolean nodes evaluate to 1.0 / 0.0; a piecewise picks
    /// the first branch whose condition is non-zero.
    ///
    /// # Panics
    /// On unknown variables, opaque function calls, or a piecewise where no
    /// condition holds.
    pub fn eval_expression(&self, vars: &[&str], values: &[f64]) -> f64 {
        match self {
            Expr::Var(name) => {
                let index = vars
                    .iter()
                    .position(|x| x == name)
                    .unwrap_or_else(|| panic!("variable {} missing from evaluation point", name));
                values[index]
            }
            Expr::Const(val) => *val,
            Expr::Add(a, b) => a.eval_expression(vars, values) + b.eval_expression(vars, values),
            Expr::Sub(a, b) => a.eval_expression(vars, values) - b.eval_expression(vars, values),
            Expr::Mul(a, b) => a.eval_expression(vars, values) * b.eval_expression(vars, values),
            Expr::Div(a, b) => a.eval_expression(vars, values) / b.eval_expression(vars, values),
            Expr::Pow(a, b) => a
                .eval_expression(vars, values)
                .powf(b.eval_expression(vars, values)),
            Expr::Exp(e) => e.eval_expression(vars, values).exp(),
            Expr::Ln(e) => e.eval_expression(vars, values).ln(),
            Expr::abs(e) => e.eval_expression(vars, values).abs(),
            Expr::floor(e) => e.eval_expression(vars, values).floor(),
            Expr::ceiling(e) => e.eval_expression(vars, values).ceil(),
            Expr::sin(e) => e.eval_expression(vars, values).sin(),
            Expr::cos(e) => e.eval_expression(vars, values).cos(),
            Expr::tg(e) => e.eval_expression(vars, values).tan(),
            Expr::ctg(e) => 1.0 / e.eval_expression(vars, values).tan(),
            Expr::arcsin(e) => e.eval_expression(vars, values).asin(),
            Expr::arccos(e) => e.eval_expression(vars, values).acos(),
            Expr::arctg(e) => e.eval_expression(vars, values).atan(),
            Expr::arcctg(e) => std::f64::consts::FRAC_PI_2 - e.eval_expression(vars, values).atan(),
            Expr::sh(e) => e.eval_expression(vars, values).sinh(),
            Expr::ch(e) => e.eval_expression(vars, values).cosh(),
            Expr::th(e) => e.eval_expression(vars, values).tanh(),
            Expr::cth(e) => 1.0 / e.eval_expression(vars, values).tanh(),
            Expr::arsh(e) => e.eval_expression(vars, values).asinh(),
            Expr::arch(e) => e.eval_expression(vars, values).acosh(),
            Expr::arth(e) => e.eval_expression(vars, values).atanh(),
            Expr::Lt(a, b) => {
                bool_to_f64(a.eval_expression(vars, values) < b.eval_expression(vars, values))
            }
            Expr::Le(a, b) => {
                bool_to_f64(a.eval_expression(vars, values) <= b.eval_expression(vars, values))
            }
            Expr::Gt(a, b) => {
                bool_to_f64(a.eval_expression(vars, values) > b.eval_expression(vars, values))
            }
            Expr::Ge(a, b) => {
                bool_to_f64(a.eval_expression(vars, values) >= b.eval_expression(vars, values))
            }
            Expr::And(a, b) => bool_to_f64(
                a.eval_expression(vars, values) != 0.0 && b.eval_expression(vars, values) != 0.0,
            ),
            Expr::Or(a, b) => bool_to_f64(
                a.eval_expression(vars, values) != 0.0 || b.eval_expression(vars, values) != 0.0,
            ),
            Expr::Not(e) => bool_to_f64(e.eval_expression(vars, values) == 0.0),
            Expr::Piecewise(pairs) => {
                for (value, cond) in pairs {
                    if cond.eval_expression(vars, values) != 0.0 {
                        return value.eval_expression(vars, values);
                    }
                }
                panic!("piecewise expression has no branch for this point: {}", self)
            }
            Expr::Fun(name, _) => {
                panic!("cannot evaluate opaque function call {}(..)", name)
            }
        }
    } // end of eval_expression
}

fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
