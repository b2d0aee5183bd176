/// # Symbolic engine
/// the expression tree every other module works on:
/// 1) construct symbolic expressions from Rust code (`Expr::Symbols`, operator overloads)
/// 2) substitute variables and constants
/// 3) turn a symbolic expression into a string for printing and control of results
/// # Example
/// ```
/// use ionsym::symbolic::symbolic_engine::Expr;
/// let v = Expr::Var("V".to_owned());
/// let rhs = Expr::Const(2.0) * v.clone() + Expr::Const(1.0);
/// assert_eq!(rhs.to_string(), "((2 * V) + 1)");
/// assert_eq!(rhs.set_variable("V", 3.0).to_string(), "((2 * 3) + 1)");
/// ```
/// ________________________________________________________________________________________________________________________________
pub mod symbolic_engine;
/// # Symbolic differentiation and evaluation
/// analytical derivatives over the full node set and direct numerical
/// evaluation at a point (piecewise picks the first branch whose condition
/// holds).
/// # Example
/// ```
/// use ionsym::symbolic::symbolic_engine::Expr;
/// let v = Expr::Var("V".to_owned());
/// let f = Expr::Exp(Box::new(v.clone())) * v.clone();
/// let df = f.diff("V");
/// assert!((df.eval_expression(&["V"], &[0.0]) - 1.0).abs() < 1e-12);
/// ```
/// ________________________________________________________________________________________________________________________________
pub mod symbolic_engine_derivatives;
/// # Simplification and expansion
/// constant folding, algebraic identities, like-term collection and full
/// distribution (`expand`), used to normalize expressions before structural
/// pattern matching.
/// ________________________________________________________________________________________________________________________________
pub mod symbolic_simplify;
/// # Common subexpression elimination
/// factors repeated non-trivial subexpressions out of a family of
/// expressions into named intermediates, in first-occurrence order.
/// ________________________________________________________________________________________________________________________________
pub mod symbolic_cse;

#[cfg(test)]
pub mod symbolic_engine_tests;
