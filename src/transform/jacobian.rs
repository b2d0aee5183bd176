//! Symbolic Jacobian builder.
//!
//! Builds the matrix of partial derivatives of a function vector with
//! respect to a variable vector, factors repeated subexpressions into named
//! intermediates, and formats entries for code emission in either loop
//! order, optionally skipping structural zeros. Everything is
//! single-threaded and deterministic: same input, same output, entry by
//! entry.

use crate::symbolic::symbolic_cse::cse;
use crate::symbolic::symbolic_engine::Expr;
use log::info;
use nalgebra::DMatrix;

#[derive(Debug)]
pub struct Jacobian {
    /// differentiation variables, one per column
    pub state_vars: Vec<String>,
    /// functions, one per row
    pub vector_of_functions: Vec<Expr>,
    /// J[i][j] = d f_i / d x_j, populated by [`Jacobian::calc_jacobian`]
    pub symbolic_jacobian: Vec<Vec<Expr>>,
    /// `(name, definition)` pairs factored out of the matrix entries by
    /// [`Jacobian::calc_cse`]; definition order is reference order
    pub cse_intermediates: Vec<(String, Expr)>,
}

impl Default for Jacobian {
    fn default() -> Self {
        Self::new()
    }
}

impl Jacobian {
    pub fn new() -> Self {
        Jacobian {
            state_vars: Vec::new(),
            vector_of_functions: Vec::new(),
            symbolic_jacobian: Vec::new(),
            cse_intermediates: Vec::new(),
        }
    }

    pub fn from_vectors(vector_of_functions: Vec<Expr>, state_vars: Vec<String>) -> Self {
        let mut jac = Jacobian::new();
        jac.vector_of_functions = vector_of_functions;
        jac.state_vars = state_vars;
        jac
    }

    /// Differentiates every function by every variable and stores the
    /// simplified matrix. An empty function vector yields an empty matrix.
    ///
    /// # Panics
    /// When functions are present but the variable list is empty.
    pub fn calc_jacobian(&mut self) {
        if self.vector_of_functions.is_empty() {
            self.symbolic_jacobian = Vec::new();
            return;
        }
        assert!(
            !self.state_vars.is_empty(),
            "function vector without differentiation variables"
        );
        let mut new_jac: Vec<Vec<Expr>> = Vec::new();
        for f in &self.vector_of_functions {
            let mut row: Vec<Expr> = Vec::new();
            for var in &self.state_vars {
                row.push(f.diff(var).simplify());
            }
            new_jac.push(row);
        }
        info!(
            "jacobian {}x{} built",
            new_jac.len(),
            self.state_vars.len()
        );
        self.symbolic_jacobian = new_jac;
    }

    /// Factors repeated subexpressions out of the matrix entries into
    /// `<prefix><i>` intermediates, rewriting the entries in place.
    ///
    /// # Panics
    /// Before [`Jacobian::calc_jacobian`] has run on a non-empty system.
    pub fn calc_cse(&mut self, prefix: &str) {
        if self.vector_of_functions.is_empty() {
            return;
        }
        assert!(
            !self.symbolic_jacobian.is_empty(),
            "calc_cse called before calc_jacobian"
        );
        let cols = self.state_vars.len();
        let flat: Vec<Expr> = self
            .symbolic_jacobian
            .iter()
            .flat_map(|row| row.iter().cloned())
            .collect();
        let (intermediates, rewritten) = cse(&flat, prefix);
        info!("jacobian cse extracted {} intermediates", intermediates.len());
        self.cse_intermediates = intermediates;
        self.symbolic_jacobian = rewritten
            .chunks(cols)
            .map(|chunk| chunk.to_vec())
            .collect();
    }

    /// Formats the matrix entries as `(row, column, text)` triples.
    ///
    /// `swap_inner_outer_loop` emits column-major order instead of
    /// row-major; `skip_0_entries` drops entries that are the constant zero.
    /// Intermediate definitions are not included; see
    /// [`Jacobian::cse_intermediates`].
    pub fn format_entries(
        &self,
        swap_inner_outer_loop: bool,
        skip_0_entries: bool,
    ) -> Vec<(usize, usize, String)> {
        let rows = self.symbolic_jacobian.len();
        let cols = self.state_vars.len();
        let mut out = Vec::new();
        let mut push = |i: usize, j: usize, out: &mut Vec<(usize, usize, String)>| {
            let entry = &self.symbolic_jacobian[i][j];
            if skip_0_entries && entry.is_zero() {
                return;
            }
            out.push((i, j, entry.to_string()));
        };
        if swap_inner_outer_loop {
            for j in 0..cols {
                for i in 0..rows {
                    push(i, j, &mut out);
                }
            }
        } else {
            for i in 0..rows {
                for j in 0..cols {
                    push(i, j, &mut out);
                }
            }
        }
        out
    }

    /// Numerically evaluates the matrix at a point. `vars`/`values` must
    /// cover every free symbol of the entries other than the intermediates,
    /// which are evaluated in definition order first.
    pub fn evaluate(&self, vars: &[&str], values: &[f64]) -> DMatrix<f64> {
        let mut all_vars: Vec<String> = vars.iter().map(|s| s.to_string()).collect();
        let mut all_values: Vec<f64> = values.to_vec();
        for (name, def) in &self.cse_intermediates {
            let refs: Vec<&str> = all_vars.iter().map(|s| s.as_str()).collect();
            let value = def.eval_expression(&refs, &all_values);
            all_vars.push(name.clone());
            all_values.push(value);
        }
        let refs: Vec<&str> = all_vars.iter().map(|s| s.as_str()).collect();
        let rows = self.symbolic_jacobian.len();
        let cols = self.state_vars.len();
        DMatrix::from_fn(rows, cols, |i, j| {
            self.symbolic_jacobian[i][j].eval_expression(&refs, &all_values)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbolic_engine::Expr;
    use approx::assert_relative_eq;

    fn v(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn test_empty_system_empty_matrix() {
        let mut jac = Jacobian::new();
        jac.calc_jacobian();
        assert!(jac.symbolic_jacobian.is_empty());
        jac.calc_cse("cse_");
        assert!(jac.cse_intermediates.is_empty());
    }

    #[test]
    fn test_two_by_two() {
        // f0 = x*y, f1 = x + y^2
        let f0 = v("x") * v("y");
        let f1 = v("x") + Expr::Pow(Box::new(v("y")), Box::new(Expr::Const(2.0)));
        let mut jac = Jacobian::from_vectors(vec![f0, f1], vec!["x".to_string(), "y".to_string()]);
        jac.calc_jacobian();
        let m = jac.evaluate(&["x", "y"], &[2.0, 3.0]);
        assert_relative_eq!(m[(0, 0)], 3.0); // d(xy)/dx = y
        assert_relative_eq!(m[(0, 1)], 2.0); // d(xy)/dy = x
        assert_relative_eq!(m[(1, 0)], 1.0);
        assert_relative_eq!(m[(1, 1)], 6.0); // 2y
    }

    #[test]
    fn test_cse_preserves_values() {
        // both entries of the row share exp(x*y)
        let shared = Expr::Exp(Box::new(v("x") * v("y")));
        let f0 = shared.clone() * v("x");
        let f1 = shared * v("y");
        let mut jac = Jacobian::from_vectors(vec![f0, f1], vec!["x".to_string(), "y".to_string()]);
        jac.calc_jacobian();
        let plain = jac.evaluate(&["x", "y"], &[0.3, 0.7]);
        jac.calc_cse("cse_");
        assert!(!jac.cse_intermediates.is_empty());
        let factored = jac.evaluate(&["x", "y"], &[0.3, 0.7]);
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(plain[(i, j)], factored[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_column_order_follows_supplied_variables() {
        // same functions, reversed variable order: columns must follow the
        // supplied order, not any internal one
        let f0 = v("x") * v("y");
        let f1 = v("x") + Expr::Pow(Box::new(v("y")), Box::new(Expr::Const(2.0)));
        let mut jac =
            Jacobian::from_vectors(vec![f0, f1], vec!["y".to_string(), "x".to_string()]);
        jac.calc_jacobian();
        let m = jac.evaluate(&["x", "y"], &[2.0, 3.0]);
        assert_relative_eq!(m[(0, 0)], 2.0); // d(xy)/dy = x
        assert_relative_eq!(m[(0, 1)], 3.0); // d(xy)/dx = y
        assert_relative_eq!(m[(1, 0)], 6.0); // 2y
        assert_relative_eq!(m[(1, 1)], 1.0);
    }

    #[test]
    fn test_format_skips_structural_zeros() {
        // f0 depends on x only, f1 on y only
        let f0 = v("x") * Expr::Const(2.0);
        let f1 = v("y") * Expr::Const(3.0);
        let mut jac = Jacobian::from_vectors(vec![f0, f1], vec!["x".to_string(), "y".to_string()]);
        jac.calc_jacobian();
        let entries = jac.format_entries(false, true);
        let coords: Vec<(usize, usize)> = entries.iter().map(|(i, j, _)| (*i, *j)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_format_loop_orders() {
        let f0 = v("x") + v("y");
        let f1 = v("x") * v("y");
        let mut jac = Jacobian::from_vectors(vec![f0, f1], vec!["x".to_string(), "y".to_string()]);
        jac.calc_jacobian();
        let row_major: Vec<(usize, usize)> = jac
            .format_entries(false, false)
            .iter()
            .map(|(i, j, _)| (*i, *j))
            .collect();
        assert_eq!(row_major, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        let col_major: Vec<(usize, usize)> = jac
            .format_entries(true, false)
            .iter()
            .map(|(i, j, _)| (*i, *j))
            .collect();
        assert_eq!(col_major, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }
}
