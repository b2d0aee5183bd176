//! # Common Subexpression Elimination Module
//!
//! Factors subexpressions that occur more than once across a family of
//! expressions into named intermediates. Counting and replacement are purely
//! structural (the `Expr` `Hash`/`Eq` impls), no canonicalization or
//! topological resorting is attempted: intermediates come out in the order
//! the rewrite first reaches them, which for nested subexpressions is already
//! definition-before-use.

use crate::symbolic::symbolic_engine::Expr;
use std::collections::HashMap;

/// Rewrites `exprs` with repeated subexpressions factored out.
///
/// Returns `(intermediates, rewritten)`: `intermediates` is the ordered list
/// of `(name, definition)` pairs (`<prefix><i>` numbering from 0), and
/// `rewritten` mirrors the input with every repeated subtree replaced by a
/// `Var` reference to its intermediate. Definitions themselves reference
/// earlier intermediates, never later ones.
///
/// Leaves (`Var`, `Const`) are never extracted.
pub fn cse(exprs: &[Expr], prefix: &str) -> (Vec<(String, Expr)>, Vec<Expr>) {
    let mut counts: HashMap<Expr, usize> = HashMap::new();
    for expr in exprs {
        count_subtrees(expr, &mut counts);
    }

    let mut names: HashMap<Expr, String> = HashMap::new();
    let mut intermediates: Vec<(String, Expr)> = Vec::new();
    let rewritten = exprs
        .iter()
        .map(|e| rewrite(e, &counts, prefix, &mut names, &mut intermediates))
        .collect();
    (intermediates, rewritten)
}

fn is_atomic(expr: &Expr) -> bool {
    matches!(expr, Expr::Var(_) | Expr::Const(_))
}

fn count_subtrees(expr: &Expr, counts: &mut HashMap<Expr, usize>) {
    if is_atomic(expr) {
        return;
    }
    let seen = counts.entry(expr.clone()).or_insert(0);
    *seen += 1;
    // children of an already-counted subtree repeat exactly as often as the
    // parent does, no need to descend twice
    if *seen > 1 {
        return;
    }
    expr.for_each_child(&mut |child| count_subtrees(child, counts));
}

fn rewrite(
    expr: &Expr,
    counts: &HashMap<Expr, usize>,
    prefix: &str,
    names: &mut HashMap<Expr, String>,
    intermediates: &mut Vec<(String, Expr)>,
) -> Expr {
    if is_atomic(expr) {
        return expr.clone();
    }
    if let Some(name) = names.get(expr) {
        return Expr::Var(name.clone());
    }
    let body = expr.map_children(&mut |child| {
        rewrite(child, counts, prefix, names, intermediates)
    });
    if counts.get(expr).copied().unwrap_or(0) > 1 {
        let name = format!("{}{}", prefix, intermediates.len());
        names.insert(expr.clone(), name.clone());
        intermediates.push((name.clone(), body));
        Expr::Var(name)
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::cse;
    use crate::symbolic::symbolic_engine::Expr;

    #[test]
    fn test_no_repeats_no_intermediates() {
        let x = Expr::Var("x".to_owned());
        let y = Expr::Var("y".to_owned());
        let e = x.clone() + y.clone();
        let (defs, rewritten) = cse(&[e.clone()], "cse_");
        assert!(defs.is_empty());
        assert_eq!(rewritten, vec![e]);
    }

    #[test]
    fn test_repeated_subtree_extracted_once() {
        let x = Expr::Var("x".to_owned());
        let shared = Expr::Exp(Box::new(x.clone() * Expr::Const(2.0)));
        let e1 = shared.clone() + x.clone();
        let e2 = shared.clone() * Expr::Const(3.0);
        let (defs, rewritten) = cse(&[e1, e2], "cse_");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].0, "cse_0");
        assert_eq!(defs[0].1, shared);
        let cse0 = Expr::Var("cse_0".to_owned());
        assert_eq!(rewritten[0], cse0.clone() + x.clone());
        assert_eq!(rewritten[1], cse0 * Expr::Const(3.0));
    }

    #[test]
    fn test_nested_intermediates_defined_before_use() {
        let x = Expr::Var("x".to_owned());
        let inner = x.clone() * x.clone();
        let outer = Expr::Exp(Box::new(inner.clone()));
        // both inner and outer repeat; inner must come out first
        let e1 = outer.clone() + inner.clone();
        let e2 = outer.clone();
        let (defs, rewritten) = cse(&[e1, e2], "cse_");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].1, inner);
        assert_eq!(defs[1].1, Expr::Exp(Box::new(Expr::Var("cse_0".to_owned()))));
        assert_eq!(rewritten[1], Expr::Var("cse_1".to_owned()));
    }

    #[test]
    fn test_leaves_never_extracted() {
        let x = Expr::Var("x".to_owned());
        let e = x.clone() + x.clone();
        let (defs, _) = cse(&[e], "cse_");
        assert!(defs.is_empty());
    }
}
