use crate::symbolic::symbolic_engine::Expr;
use std::collections::HashMap;
//___________________________________TESTS____________________________________

mod tests {
    use super::*;

    #[test]
    fn test_add_assign() {
        let mut expr = Expr::Var("x".to_string());
        expr += Expr::Const(2.0);
        let expected = Expr::Add(
            Box::new(Expr::Var("x".to_string())),
            Box::new(Expr::Const(2.0)),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_neg() {
        let expr = Expr::Var("x".to_string());
        let neg_expr = -expr;
        let expected = Expr::Mul(
            Box::new(Expr::Const(-1.0)),
            Box::new(Expr::Var("x".to_string())),
        );
        assert_eq!(neg_expr, expected);
    }

    #[test]
    fn test_symbols() {
        let symbols = Expr::Symbols("V, m, h");
        assert_eq!(
            symbols,
            vec![
                Expr::Var("V".to_string()),
                Expr::Var("m".to_string()),
                Expr::Var("h".to_string()),
            ]
        );
    }

    #[test]
    fn test_substitute_variable() {
        let v = Expr::Var("V".to_string());
        let expr = v.clone() * Expr::Const(2.0);
        let replaced = expr.substitute_variable("V", &Expr::Var("E".to_string()));
        assert_eq!(replaced, Expr::Var("E".to_string()) * Expr::Const(2.0));
    }

    #[test]
    fn test_substitute_map_simultaneous() {
        // a -> b while b -> a must not cascade
        let a = Expr::Var("a".to_string());
        let b = Expr::Var("b".to_string());
        let mut map = HashMap::new();
        map.insert("a".to_string(), b.clone());
        map.insert("b".to_string(), a.clone());
        let expr = a.clone() + b.clone();
        assert_eq!(expr.substitute_map(&map), b + a);
    }

    #[test]
    fn test_all_arguments_are_variables() {
        let v = Expr::Var("V".to_string());
        let m = Expr::Var("m".to_string());
        let expr = Expr::Exp(Box::new(v.clone())) * m.clone() + v.clone();
        let mut vars = expr.all_arguments_are_variables();
        vars.sort();
        assert_eq!(vars, vec!["V".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_contains_exp() {
        let v = Expr::Var("V".to_string());
        assert!(Expr::Exp(Box::new(v.clone())).contains_exp());
        assert!((v.clone() * Expr::Const(2.0) + Expr::Exp(v.clone().boxed())).contains_exp());
        assert!(!(v.clone() + Expr::Const(1.0)).contains_exp());
    }

    #[test]
    fn test_structural_hash_eq() {
        let build = || {
            Expr::Exp(Box::new(
                Expr::Var("V".to_string()) * Expr::Const(0.1) + Expr::Const(-5.0),
            ))
        };
        let mut memo: HashMap<Expr, usize> = HashMap::new();
        memo.insert(build(), 1);
        assert_eq!(memo.get(&build()), Some(&1));
    }

    #[test]
    fn test_piecewise_display() {
        let v = Expr::Var("V".to_string());
        let pw = Expr::Piecewise(vec![
            (Expr::Const(1.0), v.clone().lt(Expr::Const(0.0))),
            (Expr::Const(2.0), Expr::otherwise()),
        ]);
        assert_eq!(pw.to_string(), "piecewise(1 if (V < 0), 2 if 1)");
    }

    #[test]
    fn test_diff_product_rule() {
        let x = Expr::Var("x".to_string());
        // d/dx (x * exp(x)) at x = 0 is 1
        let f = x.clone() * Expr::Exp(x.clone().boxed());
        let df = f.diff("x");
        assert!((df.eval_expression(&["x"], &[0.0]) - 1.0).abs() < 1e-12);
        // and at x = 1 is 2e
        assert!(
            (df.eval_expression(&["x"], &[1.0]) - 2.0 * std::f64::consts::E).abs() < 1e-12
        );
    }

    #[test]
    fn test_diff_quotient_rule() {
        let x = Expr::Var("x".to_string());
        // d/dx (1 / x) = -1/x^2
        let f = Expr::Const(1.0) / x.clone();
        let df = f.diff("x");
        assert!((df.eval_expression(&["x"], &[2.0]) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_diff_of_other_variable_is_zero() {
        let x = Expr::Var("x".to_string());
        let df = x.diff("y").simplify();
        assert_eq!(df, Expr::Const(0.0));
    }

    #[test]
    fn test_diff_piecewise_per_branch() {
        let v = Expr::Var("V".to_string());
        let pw = Expr::Piecewise(vec![
            (v.clone() * Expr::Const(2.0), v.clone().lt(Expr::Const(0.0))),
            (v.clone() * Expr::Const(3.0), Expr::otherwise()),
        ]);
        let d = pw.diff("V");
        assert!((d.eval_expression(&["V"], &[-1.0]) - 2.0).abs() < 1e-12);
        assert!((d.eval_expression(&["V"], &[1.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_eval_piecewise_first_true_branch() {
        let v = Expr::Var("V".to_string());
        let pw = Expr::Piecewise(vec![
            (Expr::Const(10.0), v.clone().lt(Expr::Const(0.0))),
            (Expr::Const(20.0), v.clone().lt(Expr::Const(5.0))),
            (Expr::Const(30.0), Expr::otherwise()),
        ]);
        assert_eq!(pw.eval_expression(&["V"], &[-1.0]), 10.0);
        assert_eq!(pw.eval_expression(&["V"], &[2.0]), 20.0);
        assert_eq!(pw.eval_expression(&["V"], &[7.0]), 30.0);
    }

    #[test]
    fn test_eval_hyperbolic() {
        let x = Expr::Var("x".to_string());
        let f = Expr::th(x.clone().boxed());
        assert!((f.eval_expression(&["x"], &[0.5]) - 0.5_f64.tanh()).abs() < 1e-12);
        let df = f.diff("x");
        let expected = 1.0 / 0.5_f64.cosh().powi(2);
        assert!((df.eval_expression(&["x"], &[0.5]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_print_with_hook() {
        let v = Expr::Var("V".to_string());
        let inner = Expr::Exp(Box::new(v.clone() * Expr::Const(0.1)));
        let expr = inner.clone() + Expr::Const(1.0);
        let printed = expr.print_with(&mut |node| {
            if *node == inner {
                Some("_lt_0_row[0]".to_string())
            } else {
                None
            }
        });
        assert_eq!(printed, "(_lt_0_row[0] + 1)");
    }
}
