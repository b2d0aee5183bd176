//! # Symbolic Engine Module
//!
//! Core symbolic-expression representation for the equation-transformation
//! pipeline. Expressions are immutable trees over named variables, numeric
//! constants and a closed operator/function set; they are compared and hashed
//! structurally so they can key memo tables and CSE maps.
//!
//! ## Main structures
//!
//! ### `Expr` Enum
//! The symbolic expression type supporting:
//! - **Variables**: `Var(String)` - named quantities (state variables,
//!   parameters, intermediates)
//! - **Constants**: `Const(f64)` - numerical constants
//! - **Operations**: `Add`, `Sub`, `Mul`, `Div`, `Pow` - basic arithmetic
//! - **Functions**: `Exp`, `Ln`, trigonometric, hyperbolic and their
//!   inverses, `abs`/`floor`/`ceiling`
//! - **Branching**: `Piecewise` with comparison (`Lt`..`Ge`) and boolean
//!   (`And`/`Or`/`Not`) conditions
//! - **Opaque calls**: `Fun(name, args)` for externally defined functions
//!   such as the stimulus-area current
//!
//! ## Key methods
//! - `Symbols(symbols: &str)` - create multiple variables from a
//!   comma-separated string
//! - `substitute_variable` / `substitute_map` - replace variables by
//!   expressions
//! - `map_children` / `for_each_child` - generic rebuild/visit over the
//!   closed node set, so every structural walk is exhaustive by construction
//! - `print_with` - pretty-printing with a customizable per-node hook
//!   (used by the lookup-table substitution layer)
//!
//! Operator overloading (`+`, `-`, `*`, `/`) gives natural mathematical
//! syntax: `x + y * z`. Trigonometric names follow mathematical notation
//! (`tg`, `ctg`, `sh`, `ch`) rather than programming conventions.

#![allow(non_camel_case_types)]

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Core symbolic expression enum representing mathematical expressions as an
/// abstract syntax tree. The enum uses Box<Expr> for recursive structures,
/// allowing arbitrarily deep expression trees.
///
/// The node set is closed: every transformation in this crate matches on it
/// exhaustively, so adding a variant forces every pass to handle it.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Symbolic variable with a name (e.g. "V", "m", "h_gate")
    Var(String),
    /// Numerical constant value
    Const(f64),
    /// Addition operation: left + right
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction operation: left - right
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication operation: left * right
    Mul(Box<Expr>, Box<Expr>),
    /// Division operation: left / right
    Div(Box<Expr>, Box<Expr>),
    /// Power operation: base ^ exponent
    Pow(Box<Expr>, Box<Expr>),
    /// Exponential function: e^x
    Exp(Box<Expr>),
    /// Natural logarithm: ln(x)
    Ln(Box<Expr>),
    /// Absolute value
    abs(Box<Expr>),
    /// Floor function
    floor(Box<Expr>),
    /// Ceiling function
    ceiling(Box<Expr>),
    /// Sine
    sin(Box<Expr>),
    /// Cosine
    cos(Box<Expr>),
    /// Tangent - mathematical notation 'tg'
    tg(Box<Expr>),
    /// Cotangent - mathematical notation 'ctg'
    ctg(Box<Expr>),
    /// Arcsine
    arcsin(Box<Expr>),
    /// Arccosine
    arccos(Box<Expr>),
    /// Arctangent - mathematical notation 'arctg'
    arctg(Box<Expr>),
    /// Arccotangent - mathematical notation 'arcctg'
    arcctg(Box<Expr>),
    /// Hyperbolic sine - mathematical notation 'sh'
    sh(Box<Expr>),
    /// Hyperbolic cosine - mathematical notation 'ch'
    ch(Box<Expr>),
    /// Hyperbolic tangent - mathematical notation 'th'
    th(Box<Expr>),
    /// Hyperbolic cotangent - mathematical notation 'cth'
    cth(Box<Expr>),
    /// Inverse hyperbolic sine
    arsh(Box<Expr>),
    /// Inverse hyperbolic cosine
    arch(Box<Expr>),
    /// Inverse hyperbolic tangent
    arth(Box<Expr>),
    /// Comparison: left < right
    Lt(Box<Expr>, Box<Expr>),
    /// Comparison: left <= right
    Le(Box<Expr>, Box<Expr>),
    /// Comparison: left > right
    Gt(Box<Expr>, Box<Expr>),
    /// Comparison: left >= right
    Ge(Box<Expr>, Box<Expr>),
    /// Boolean conjunction of two conditions
    And(Box<Expr>, Box<Expr>),
    /// Boolean disjunction of two conditions
    Or(Box<Expr>, Box<Expr>),
    /// Boolean negation of a condition
    Not(Box<Expr>),
    /// Piecewise expression: ordered (value, condition) pairs. A constant
    /// non-zero condition acts as the trailing "otherwise" branch.
    Piecewise(Vec<(Expr, Expr)>),
    /// Opaque call to an externally defined function, e.g. the stimulus-area
    /// current. Arguments are symbolic, the body is unknown to this crate.
    Fun(String, Vec<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.print_with(&mut |_| None))
    }
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(self))
    }
}

impl std::ops::AddAssign for Expr {
    fn add_assign(&mut self, rhs: Self) {
        *self = Expr::Add(Box::new(self.clone()), Box::new(rhs));
    }
}

impl std::ops::SubAssign for Expr {
    fn sub_assign(&mut self, rhs: Self) {
        *self = Expr::Sub(Box::new(self.clone()), Box::new(rhs));
    }
}

impl std::ops::MulAssign for Expr {
    fn mul_assign(&mut self, rhs: Self) {
        *self = Expr::Mul(Box::new(self.clone()), Box::new(rhs));
    }
}

impl Eq for Expr {}

/// Structural hash: discriminant plus payload, children in order. Float
/// constants hash by bit pattern, so structurally equal trees collide.
impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expr::Var(name) => name.hash(state),
            Expr::Const(val) => val.to_bits().hash(state),
            Expr::Fun(name, _) => name.hash(state),
            Expr::Piecewise(pairs) => pairs.len().hash(state),
            _ => {}
        }
        self.for_each_child(&mut |child| child.hash(state));
    }
}

impl Expr {
    /// BASIC FEATURES

    /// Creates multiple symbolic variables from a comma-separated string.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let vars = Expr::Symbols("V, m, h");
    /// assert_eq!(vars.len(), 3);
    /// ```
    #[allow(non_snake_case)]
    pub fn Symbols(symbols: &str) -> Vec<Expr> {
        symbols
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| Expr::Var(s.to_string()))
            .collect()
    }

    /// Convenience method to wrap expression in Box for recursive structures.
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Creates exponential function e^(self).
    pub fn exp(self) -> Expr {
        Expr::Exp(self.boxed())
    }

    /// Creates natural logarithm ln(self).
    pub fn ln(self) -> Expr {
        Expr::Ln(self.boxed())
    }

    /// Creates power expression self^rhs.
    pub fn pow(self, rhs: Expr) -> Expr {
        Expr::Pow(self.boxed(), rhs.boxed())
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::Lt(self.boxed(), rhs.boxed())
    }

    pub fn le(self, rhs: Expr) -> Expr {
        Expr::Le(self.boxed(), rhs.boxed())
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::Gt(self.boxed(), rhs.boxed())
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::Ge(self.boxed(), rhs.boxed())
    }

    /// The always-true "otherwise" condition of a trailing piecewise branch.
    pub fn otherwise() -> Expr {
        Expr::Const(1.0)
    }

    /// Checks if expression is exactly zero (constant 0.0).
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(val) if *val == 0.0)
    }

    /// Returns the numeric value if this node is a constant.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(val) => Some(*val),
            _ => None,
        }
    }

    pub fn is_piecewise(&self) -> bool {
        matches!(self, Expr::Piecewise(_))
    }

    /// GENERIC TRAVERSAL
    ///
    /// The two methods below are the only places that enumerate the full node
    /// set for traversal purposes; every structural walk in the crate is
    /// built on them, so a new variant cannot be silently skipped.

    /// Visits every direct child of this node.
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        match self {
            Expr::Var(_) | Expr::Const(_) => {}
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Pow(a, b)
            | Expr::Lt(a, b)
            | Expr::Le(a, b)
            | Expr::Gt(a, b)
            | Expr::Ge(a, b)
            | Expr::And(a, b)
            | Expr::Or(a, b) => {
                f(a);
                f(b);
            }
            Expr::Not(e)
            | Expr::Exp(e)
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
            | Expr::arth(e) => f(e),
            Expr::Piecewise(pairs) => {
                for (value, cond) in pairs {
                    f(value);
                    f(cond);
                }
            }
            Expr::Fun(_, args) => {
                for a in args {
                    f(a);
                }
            }
        }
    }

    /// Rebuilds this node with every direct child replaced by `f(child)`.
    /// Leaves (`Var`, `Const`) are cloned unchanged.
    pub fn map_children(&self, f: &mut dyn FnMut(&Expr) -> Expr) -> Expr {
        match self {
            Expr::Var(_) | Expr::Const(_) => self.clone(),
            Expr::Add(a, b) => Expr::Add(Box::new(f(a)), Box::new(f(b))),
            Expr::Sub(a, b) => Expr::Sub(Box::new(f(a)), Box::new(f(b))),
            Expr::Mul(a, b) => Expr::Mul(Box::new(f(a)), Box::new(f(b))),
            Expr::Div(a, b) => Expr::Div(Box::new(f(a)), Box::new(f(b))),
            Expr::Pow(a, b) => Expr::Pow(Box::new(f(a)), Box::new(f(b))),
            Expr::Lt(a, b) => Expr::Lt(Box::new(f(a)), Box::new(f(b))),
            Expr::Le(a, b) => Expr::Le(Box::new(f(a)), Box::new(f(b))),
            Expr::Gt(a, b) => Expr::Gt(Box::new(f(a)), Box::new(f(b))),
            Expr::Ge(a, b) => Expr::Ge(Box::new(f(a)), Box::new(f(b))),
            Expr::And(a, b) => Expr::And(Box::new(f(a)), Box::new(f(b))),
            Expr::Or(a, b) => Expr::Or(Box::new(f(a)), Box::new(f(b))),
            Expr::Not(e) => Expr::Not(Box::new(f(e))),
            Expr::Exp(e) => Expr::Exp(Box::new(f(e))),
            Expr::Ln(e) => Expr::Ln(Box::new(f(e))),
            Expr::abs(e) => Expr::abs(Box::new(f(e))),
            Expr::floor(e) => Expr::floor(Box::new(f(e))),
            Expr::ceiling(e) => Expr::ceiling(Box::new(f(e))),
            Expr::sin(e) => Expr::sin(Box::new(f(e))),
            Expr::cos(e) => Expr::cos(Box::new(f(e))),
            Expr::tg(e) => Expr::tg(Box::new(f(e))),
            Expr::ctg(e) => Expr::ctg(Box::new(f(e))),
            Expr::arcsin(e) => Expr::arcsin(Box::new(f(e))),
            Expr::arccos(e) => Expr::arccos(Box::new(f(e))),
            Expr::arctg(e) => Expr::arctg(Box::new(f(e))),
            Expr::arcctg(e) => Expr::arcctg(Box::new(f(e))),
            Expr::sh(e) => Expr::sh(Box::new(f(e))),
            Expr::ch(e) => Expr::ch(Box::new(f(e))),
            Expr::th(e) => Expr::th(Box::new(f(e))),
            Expr::cth(e) => Expr::cth(Box::new(f(e))),
            Expr::arsh(e) => Expr::arsh(Box::new(f(e))),
            Expr::arch(e) => Expr::arch(Box::new(f(e))),
            Expr::arth(e) => Expr::arth(Box::new(f(e))),
            Expr::Piecewise(pairs) => {
                Expr::Piecewise(pairs.iter().map(|(v, c)| (f(v), f(c))).collect())
            }
            Expr::Fun(name, args) => Expr::Fun(name.clone(), args.iter().map(|a| f(a)).collect()),
        }
    }

    /// SUBSTITUTION

    /// Substitutes a variable with an expression throughout the tree.
    pub fn substitute_variable(&self, var: &str, replacement: &Expr) -> Expr {
        match self {
            Expr::Var(name) if name == var => replacement.clone(),
            _ => self.map_children(&mut |child| child.substitute_variable(var, replacement)),
        }
    }

    /// Substitutes a variable with a constant value throughout the expression.
    pub fn set_variable(&self, var: &str, value: f64) -> Expr {
        self.substitute_variable(var, &Expr::Const(value))
    }

    /// Substitutes multiple variables with expressions using a map. More
    /// efficient than repeated `substitute_variable` calls; only variables
    /// present in the map are replaced.
    pub fn substitute_map(&self, map: &HashMap<String, Expr>) -> Expr {
        match self {
            Expr::Var(name) if map.contains_key(name) => map[name].clone(),
            _ => self.map_children(&mut |child| child.substitute_map(map)),
        }
    }

    /// INSPECTION

    /// Checks if the expression contains a variable.
    pub fn contains_variable(&self, var_name: &str) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if let Expr::Var(name) = node {
                if name == var_name {
                    found = true;
                }
            }
        });
        found
    }

    /// Checks if the expression contains any `Exp` node.
    pub fn contains_exp(&self) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if matches!(node, Expr::Exp(_)) {
                found = true;
            }
        });
        found
    }

    /// Extracts all unique variable names from the symbolic expression,
    /// sorted and deduplicated.
    pub fn all_arguments_are_variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.visit(&mut |node| {
            if let Expr::Var(name) = node {
                vars.push(name.clone());
            }
        });
        vars.sort();
        vars.dedup();
        vars
    }

    /// Depth-first pre-order visit of the whole tree, including `self`.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        self.for_each_child(&mut |child| child.visit(f));
    }

    /// PRINTING

    /// Pretty-prints the expression, consulting `hook` at every node first.
    /// When the hook returns `Some(text)` that text replaces the whole
    /// subtree in the output; `None` falls through to the default notation.
    /// The lookup-table layer uses this to splice in table-row references.
    pub fn print_with(&self, hook: &mut dyn FnMut(&Expr) -> Option<String>) -> String {
        if let Some(text) = hook(self) {
            return text;
        }
        match self {
            Expr::Var(name) => name.clone(),
            Expr::Const(val) => val.to_string(),
            Expr::Add(a, b) => format!("({} + {})", a.print_with(hook), b.print_with(hook)),
            Expr::Sub(a, b) => format!("({} - {})", a.print_with(hook), b.print_with(hook)),
            Expr::Mul(a, b) => format!("({} * {})", a.print_with(hook), b.print_with(hook)),
            Expr::Div(a, b) => format!("({} / {})", a.print_with(hook), b.print_with(hook)),
            Expr::Pow(a, b) => format!("({} ^ {})", a.print_with(hook), b.print_with(hook)),
            Expr::Lt(a, b) => format!("({} < {})", a.print_with(hook), b.print_with(hook)),
            Expr::Le(a, b) => format!("({} <= {})", a.print_with(hook), b.print_with(hook)),
            Expr::Gt(a, b) => format!("({} > {})", a.print_with(hook), b.print_with(hook)),
            Expr::Ge(a, b) => format!("({} >= {})", a.print_with(hook), b.print_with(hook)),
            Expr::And(a, b) => format!("({} & {})", a.print_with(hook), b.print_with(hook)),
            Expr::Or(a, b) => format!("({} | {})", a.print_with(hook), b.print_with(hook)),
            Expr::Not(e) => format!("!({})", e.print_with(hook)),
            Expr::Exp(e) => format!("exp({})", e.print_with(hook)),
            Expr::Ln(e) => format!("ln({})", e.print_with(hook)),
            Expr::abs(e) => format!("abs({})", e.print_with(hook)),
            Expr::floor(e) => format!("floor({})", e.print_with(hook)),
            Expr::ceiling(e) => format!("ceiling({})", e.print_with(hook)),
            Expr::sin(e) => format!("sin({})", e.print_with(hook)),
            Expr::cos(e) => format!("cos({})", e.print_with(hook)),
            Expr::tg(e) => format!("tg({})", e.print_with(hook)),
            Expr::ctg(e) => format!("ctg({})", e.print_with(hook)),
            Expr::arcsin(e) => format!("arcsin({})", e.print_with(hook)),
            Expr::arccos(e) => format!("arccos({})", e.print_with(hook)),
            Expr::arctg(e) => format!("arctg({})", e.print_with(hook)),
            Expr::arcctg(e) => format!("arcctg({})", e.print_with(hook)),
            Expr::sh(e) => format!("sh({})", e.print_with(hook)),
            Expr::ch(e) => format!("ch({})", e.print_with(hook)),
            Expr::th(e) => format!("th({})", e.print_with(hook)),
            Expr::cth(e) => format!("cth({})", e.print_with(hook)),
            Expr::arsh(e) => format!("arsh({})", e.print_with(hook)),
            Expr::arch(e) => format!("arch({})", e.print_with(hook)),
            Expr::arth(e) => format!("arth({})", e.print_with(hook)),
            Expr::Piecewise(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(v, c)| format!("{} if {}", v.print_with(hook), c.print_with(hook)))
                    .collect();
                format!("piecewise({})", parts.join(", "))
            }
            Expr::Fun(name, args) => {
                let parts: Vec<String> = args.iter().map(|a| a.print_with(hook)).collect();
                format!("{}({})", name, parts.join(", "))
            }
        }
    }
}

//___________________________________MACROS____________________________________

/// Macro to create symbolic variables from a comma-separated list
/// Usage: symbols!(x, y, z) -> creates variables x, y, z
#[macro_export]
macro_rules! symbols {
    ($($var:ident),+ $(,)?) => {
        {
            let var_names = stringify!($($var),+);
            let vars = Expr::Symbols(var_names);
            let mut iter = vars.into_iter();
            ($(
                {
                    let $var = iter.next().unwrap();
                    $var
                }
            ),+)
        }
    };
}
