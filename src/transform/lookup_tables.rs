//! Lookup-table analyzer.
//!
//! Scans expressions for subexpressions that are expensive to evaluate
//! (exponentials, logarithms, trigonometric and hyperbolic calls,
//! non-integer powers) and depend on exactly one tabulation variable. Each
//! such maximal subexpression becomes a row of the per-variable table, and
//! printed output refers to the row instead of the expression.
//!
//! The analyzer is two-phase. While building, [`LookupTables::calc_lookup_tables`]
//! may be called any number of times, across any number of output methods.
//! The first call to [`LookupTables::print_lut_expr`] freezes the
//! collection: row indices are assigned once, empty tables are dropped, and
//! any later attempt to register candidates is a
//! [`TransformError::Sequencing`] error, because already-printed references
//! could not be renumbered.

use crate::global::{CALCIUM_TABLE, CALCIUM_TAG, VOLTAGE_TABLE, VOLTAGE_TAG};
use crate::symbolic::symbolic_engine::Expr;
use crate::transform::TransformError;
use itertools::Itertools;
use log::info;
use std::collections::{BTreeSet, HashMap};

/// Tabulation range of one variable: `[min, max]` sampled every `step`.
/// `step_inv` is kept alongside because generated code indexes with a
/// multiplication, not a division.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableBounds {
    pub min: f64,
    pub step: f64,
    pub step_inv: f64,
    pub max: f64,
}

impl TableBounds {
    pub fn new(table: (f64, f64, f64, f64)) -> Self {
        let (min, step, step_inv, max) = table;
        assert!(min < max, "table bounds out of order");
        assert!(step > 0.0, "table step must be positive");
        TableBounds {
            min,
            step,
            step_inv,
            max,
        }
    }
}

/// One frozen table: the variable it is keyed on and its rows in index
/// order.
#[derive(Clone, Debug)]
pub struct TableDescriptor {
    pub var: String,
    pub bounds: TableBounds,
    pub rows: Vec<Expr>,
}

pub struct LookupTables {
    /// tabulation variables in table-index order
    tab_vars: Vec<(String, TableBounds)>,
    /// candidate rows per variable, in first-seen order
    candidates: Vec<Vec<Expr>>,
    /// methods each candidate was seen in, for the parameter report
    methods: HashMap<Expr, BTreeSet<String>>,
    current_method: Option<String>,
    frozen: bool,
    descriptors: Vec<TableDescriptor>,
    row_index: HashMap<Expr, (usize, usize)>,
}

impl LookupTables {
    /// An analyzer with no tabulation variables registered.
    pub fn new() -> Self {
        LookupTables {
            tab_vars: Vec::new(),
            candidates: Vec::new(),
            methods: HashMap::new(),
            current_method: None,
            frozen: false,
            descriptors: Vec::new(),
            row_index: HashMap::new(),
        }
    }

    /// The conventional setup: membrane voltage and cytosolic calcium with
    /// their default ranges.
    pub fn with_defaults(voltage_var: &str, calcium_var: Option<&str>) -> Self {
        let mut tables = LookupTables::new();
        tables.push_tab_var(voltage_var, TableBounds::new(VOLTAGE_TABLE));
        if let Some(ca) = calcium_var {
            tables.push_tab_var(ca, TableBounds::new(CALCIUM_TABLE));
        }
        info!(
            "lookup tables keyed on {} ({}{})",
            voltage_var,
            VOLTAGE_TAG,
            if calcium_var.is_some() {
                format!(", {}", CALCIUM_TAG)
            } else {
                String::new()
            }
        );
        tables
    }

    /// Registers a tabulation variable.
    ///
    /// Returns [`TransformError::Sequencing`] once the tables are frozen,
    /// like [`LookupTables::calc_lookup_tables`].
    ///
    /// # Panics
    /// On a duplicate variable.
    pub fn add_tab_var(&mut self, var: &str, bounds: TableBounds) -> Result<(), TransformError> {
        if self.frozen {
            return Err(TransformError::Sequencing(
                "lookup tables are frozen, cannot add tabulation variables".to_string(),
            ));
        }
        self.push_tab_var(var, bounds);
        Ok(())
    }

    fn push_tab_var(&mut self, var: &str, bounds: TableBounds) {
        assert!(
            !self.tab_vars.iter().any(|(v, _)| v == var),
            "tabulation variable {} registered twice",
            var
        );
        self.tab_vars.push((var.to_string(), bounds));
        self.candidates.push(Vec::new());
    }

    /// Names the output method subsequent candidates belong to. Purely
    /// bookkeeping for [`LookupTables::print_lookup_parameters`]; candidates
    /// are shared across methods.
    pub fn with_method(&mut self, name: &str) {
        self.current_method = Some(name.to_string());
    }

    /// Registers every maximal tabulatable subexpression of `exprs`.
    ///
    /// Returns [`TransformError::Sequencing`] once the tables are frozen.
    pub fn calc_lookup_tables(&mut self, exprs: &[Expr]) -> Result<(), TransformError> {
        if self.frozen {
            return Err(TransformError::Sequencing(
                "lookup tables are frozen, cannot register new candidates".to_string(),
            ));
        }
        for expr in exprs {
            self.scan(expr);
        }
        Ok(())
    }

    fn scan(&mut self, expr: &Expr) {
        for ti in 0..self.tab_vars.len() {
            if self.is_candidate(expr, ti) {
                // maximal subexpression: do not descend into it
                if !self.candidates[ti].contains(expr) {
                    self.candidates[ti].push(expr.clone());
                }
                if let Some(method) = &self.current_method {
                    self.methods
                        .entry(expr.clone())
                        .or_default()
                        .insert(method.clone());
                }
                return;
            }
        }
        expr.for_each_child(&mut |child| self.scan(child));
    }

    /// A candidate is expensive and depends on the table variable and
    /// nothing else.
    fn is_candidate(&self, expr: &Expr, tab_index: usize) -> bool {
        if !is_expensive(expr) {
            return false;
        }
        let free = expr.all_arguments_are_variables();
        free.len() == 1 && free[0] == self.tab_vars[tab_index].0
    }

    fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        self.frozen = true;
        let mut descriptors = Vec::new();
        let mut row_index = HashMap::new();
        for (ti, (var, bounds)) in self.tab_vars.iter().enumerate() {
            let rows = self.candidates[ti].clone();
            if rows.is_empty() {
                continue; // empty tables are dropped, indices stay dense
            }
            let table = descriptors.len();
            for (j, row) in rows.iter().enumerate() {
                row_index.insert(row.clone(), (table, j));
            }
            descriptors.push(TableDescriptor {
                var: var.clone(),
                bounds: *bounds,
                rows,
            });
        }
        info!(
            "lookup tables frozen: {}",
            descriptors
                .iter()
                .map(|d| format!("{} x{}", d.var, d.rows.len()))
                .join(", ")
        );
        self.descriptors = descriptors;
        self.row_index = row_index;
    }

    /// Table-row reference for `expr`, or `None` when the node is not a
    /// table row. Freezes the collection on first use; meant to be passed to
    /// [`Expr::print_with`] as the hook.
    pub fn print_lut_expr(&mut self, expr: &Expr) -> Option<String> {
        self.freeze();
        self.row_index
            .get(expr)
            .map(|(table, row)| format!("_lt_{}_row[{}]", table, row))
    }

    /// Prints `expr` with table rows spliced in. Freezes on first use.
    pub fn print_expr(&mut self, expr: &Expr) -> String {
        expr.print_with(&mut |node| self.print_lut_expr(node))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The frozen tables. Freezes as a side effect, so a model with no
    /// printable output still reports its tables.
    pub fn descriptors(&mut self) -> &[TableDescriptor] {
        self.freeze();
        &self.descriptors
    }

    /// One report line per frozen table:
    /// `<var>: min=<min> step=<step> max=<max> rows=<n> methods=[..]`.
    pub fn print_lookup_parameters(&mut self) -> Vec<String> {
        self.freeze();
        self.descriptors
            .iter()
            .map(|d| {
                let methods: BTreeSet<&str> = d
                    .rows
                    .iter()
                    .flat_map(|row| {
                        self.methods
                            .get(row)
                            .into_iter()
                            .flat_map(|s| s.iter().map(|m| m.as_str()))
                    })
                    .collect();
                format!(
                    "{}: min={} step={} max={} rows={} methods=[{}]",
                    d.var,
                    d.bounds.min,
                    d.bounds.step,
                    d.bounds.max,
                    d.rows.len(),
                    methods.iter().join(", ")
                )
            })
            .collect()
    }
}

impl Default for LookupTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Worth tabulating: anything transcendental, or a power with a non-integer
/// exponent.
fn is_expensive(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |node| match node {
        Expr::Exp(_)
        | Expr::Ln(_)
        | Expr::sin(_)
        | Expr::cos(_)
        | Expr::tg(_)
        | Expr::ctg(_)
        | Expr::arcsin(_)
        | Expr::arccos(_)
        | Expr::arctg(_)
        | Expr::arcctg(_)
        | Expr::sh(_)
        | Expr::ch(_)
        | Expr::th(_)
        | Expr::cth(_)
        | Expr::arsh(_)
        | Expr::arch(_)
        | Expr::arth(_) => found = true,
        Expr::Pow(_, exp) => match exp.as_const() {
            Some(p) if p.fract() == 0.0 => {}
            _ => found = true,
        },
        _ => {}
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::symbolic_engine::Expr;
    use crate::transform::TransformError;

    fn v(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    fn exp_of_v() -> Expr {
        Expr::Exp(Box::new(v("V") * Expr::Const(0.1)))
    }

    #[test]
    fn test_maximal_candidate_marked() {
        let mut tables = LookupTables::with_defaults("V", None);
        // (exp(0.1*V) + 2) * m : the sum depends on V only and contains an
        // exp, so the whole sum is the row, not the bare exp
        let candidate = exp_of_v() + Expr::Const(2.0);
        let expr = candidate.clone() * v("m");
        tables.calc_lookup_tables(std::slice::from_ref(&expr)).unwrap();
        assert_eq!(tables.print_lut_expr(&candidate), Some("_lt_0_row[0]".to_string()));
        assert_eq!(tables.print_lut_expr(&exp_of_v()), None);
    }

    #[test]
    fn test_mixed_variable_expression_descends() {
        let mut tables = LookupTables::with_defaults("V", None);
        // exp(V*m) depends on two variables: not tabulatable, and neither is
        // any of its parts
        let expr = Expr::Exp(Box::new(v("V") * v("m")));
        tables.calc_lookup_tables(std::slice::from_ref(&expr)).unwrap();
        tables.freeze();
        assert!(tables.descriptors().is_empty());
    }

    #[test]
    fn test_cheap_expression_not_tabulated() {
        let mut tables = LookupTables::with_defaults("V", None);
        let expr = v("V") * Expr::Const(2.0) + Expr::Const(1.0);
        tables.calc_lookup_tables(std::slice::from_ref(&expr)).unwrap();
        assert!(tables.descriptors().is_empty());
    }

    #[test]
    fn test_print_splices_row_reference() {
        let mut tables = LookupTables::with_defaults("V", None);
        let expr = exp_of_v() * v("m");
        tables.calc_lookup_tables(std::slice::from_ref(&expr)).unwrap();
        let printed = tables.print_expr(&expr);
        assert_eq!(printed, "(_lt_0_row[0] * m)");
    }

    #[test]
    fn test_calc_after_print_is_sequencing_error() {
        let mut tables = LookupTables::with_defaults("V", None);
        let expr = exp_of_v();
        tables.calc_lookup_tables(std::slice::from_ref(&expr)).unwrap();
        let _ = tables.print_expr(&expr);
        let err = tables
            .calc_lookup_tables(std::slice::from_ref(&expr))
            .unwrap_err();
        assert!(matches!(err, TransformError::Sequencing(_)));
    }

    #[test]
    fn test_add_tab_var_after_freeze_is_sequencing_error() {
        let mut tables = LookupTables::with_defaults("V", None);
        tables
            .calc_lookup_tables(std::slice::from_ref(&exp_of_v()))
            .unwrap();
        let _ = tables.print_expr(&exp_of_v());
        let err = tables
            .add_tab_var("Ca", TableBounds::new(CALCIUM_TABLE))
            .unwrap_err();
        assert!(matches!(err, TransformError::Sequencing(_)));
    }

    #[test]
    fn test_empty_tables_dropped_and_indices_dense() {
        let mut tables = LookupTables::with_defaults("V", Some("Ca"));
        // only a calcium row: its table must still be table 0 after the
        // empty voltage table is dropped
        let expr = Expr::Ln(Box::new(v("Ca")));
        tables.calc_lookup_tables(std::slice::from_ref(&expr)).unwrap();
        assert_eq!(tables.print_lut_expr(&expr), Some("_lt_0_row[0]".to_string()));
        let descriptors = tables.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].var, "Ca");
    }

    #[test]
    fn test_row_order_is_first_seen() {
        let mut tables = LookupTables::with_defaults("V", None);
        let first = exp_of_v();
        let second = Expr::Exp(Box::new(v("V") * Expr::Const(-0.2)));
        tables
            .calc_lookup_tables(&[first.clone() * v("m"), second.clone() * v("h")])
            .unwrap();
        assert_eq!(tables.print_lut_expr(&first), Some("_lt_0_row[0]".to_string()));
        assert_eq!(tables.print_lut_expr(&second), Some("_lt_0_row[1]".to_string()));
    }

    #[test]
    fn test_parameter_report_names_methods() {
        let mut tables = LookupTables::with_defaults("V", None);
        tables.with_method("compute_rates");
        tables
            .calc_lookup_tables(std::slice::from_ref(&exp_of_v()))
            .unwrap();
        let report = tables.print_lookup_parameters();
        assert_eq!(report.len(), 1);
        assert!(report[0].starts_with("V: min=-150.0001 step=0.001"));
        assert!(report[0].contains("compute_rates"));
    }
}
