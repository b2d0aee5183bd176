//! Model orchestrator.
//!
//! Drives the whole pipeline for one output flavor: partial evaluation,
//! singularity patching, linearity analysis, flavor-specific rearrangement
//! or Jacobian construction, lookup-table analysis, and final formatting.
//! The orchestrator owns pass ordering; the passes themselves know nothing
//! about each other.

use crate::global::U_OFFSET;
use crate::symbolic::symbolic_engine::Expr;
use crate::transform::equations::{
    assignment_map, inlined_derivative_rhs, substitute_touching, Equation,
};
use crate::transform::jacobian::Jacobian;
use crate::transform::linearity::get_non_linear_state_vars;
use crate::transform::lookup_tables::LookupTables;
use crate::transform::partial_eval::partial_eval;
use crate::transform::rearrange::{collect_linear, match_alpha_beta};
use crate::transform::singularity::fix_singularity_equations;
use crate::transform::TransformError;
use log::info;
use std::collections::{HashMap, HashSet};
use strum_macros::Display;

/// Output flavor the pipeline targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum OutputFlavor {
    /// plain derivative evaluation, no rearrangement
    Direct,
    /// linear state variables as `g + h*x` pairs, non-linear ones as a
    /// Jacobian-backed implicit subsystem
    BackwardEuler,
    /// linear gates as alpha/beta pairs where written that way,
    /// `(x_inf - x)/tau` otherwise, everything else direct
    RushLarsen,
    /// direct derivatives plus the full analytic Jacobian
    Cvode,
}

/// The symbolic description the pipeline consumes.
pub struct OdeSystem {
    pub equations: Vec<Equation>,
    pub state_vars: Vec<String>,
    pub voltage_var: String,
    pub time_var: String,
    /// calcium variable to key a second lookup table on, when the model has
    /// one
    pub calcium_var: Option<String>,
    /// parameters a caller may change at run time; never folded away
    pub modifiable_parameters: Vec<String>,
}

/// One emitted equation, ready for a code printer.
#[derive(Clone, Debug, PartialEq)]
pub struct FormattedEquation {
    pub lhs: String,
    pub rhs: String,
    /// derivative is linear in its own state variable
    pub linear: bool,
    /// right-hand side also feeds the Jacobian of this flavor
    pub in_jacobian: bool,
    pub is_voltage: bool,
}

#[derive(Debug)]
pub struct TransformedModel {
    pub flavor: OutputFlavor,
    pub equations: Vec<FormattedEquation>,
    pub non_linear_state_vars: Vec<String>,
    pub jacobian: Option<Jacobian>,
    pub lookup_report: Vec<String>,
}

/// Runs the pipeline. The input system is not modified.
///
/// Pass order is fixed: fold intermediates first (so the singularity matcher
/// and classifier see full expressions), patch singularities second (so
/// every later consumer sees patched algebra), analyze and rearrange third,
/// and only then freeze lookup tables by printing.
pub fn transform(
    system: &OdeSystem,
    flavor: OutputFlavor,
) -> Result<TransformedModel, TransformError> {
    validate(system)?;
    info!(
        "transforming model: {} equations, {} state variables, flavor {}",
        system.equations.len(),
        system.state_vars.len(),
        flavor
    );

    let mut protected = system.state_vars.clone();
    protected.extend(system.modifiable_parameters.iter().cloned());
    let folded = partial_eval(&system.equations, &protected, true);

    let (patched, fixed) = fix_singularity_equations(
        &folded,
        &system.voltage_var,
        &system.modifiable_parameters,
        U_OFFSET,
        false,
    );
    if fixed > 0 {
        info!("singularity fixer patched {} equations", fixed);
    }

    let inlined = inlined_derivative_rhs(&patched);
    for var in &system.state_vars {
        if !inlined.contains_key(var) {
            return Err(TransformError::MissingDerivative(var.clone()));
        }
    }
    let mut non_linear =
        get_non_linear_state_vars(&inlined, &system.voltage_var, &system.state_vars);

    let mut tables = LookupTables::with_defaults(
        &system.voltage_var,
        system.calcium_var.as_deref(),
    );
    tables.with_method(&flavor.to_string());

    let mut jacobian = None;
    let mut extra: Vec<(String, Expr, bool)> = Vec::new(); // (lhs, rhs, in_jacobian)
    let mut derivative_rhs_override: Vec<(String, Expr)> = Vec::new();

    let defs = assignment_map(&patched);
    let derivative_rhs: HashMap<String, Expr> = patched
        .iter()
        .filter(|eq| eq.is_derivative())
        .map(|eq| (eq.lhs.name().to_string(), eq.rhs.clone()))
        .collect();

    match flavor {
        OutputFlavor::Direct => {}
        OutputFlavor::RushLarsen => {
            let mut residual = Vec::new();
            for var in linear_gates(system, &non_linear) {
                let rhs = gate_rhs(&derivative_rhs, &defs, &non_linear, &var);
                if let Some((alpha, beta)) = match_alpha_beta(&rhs, &var) {
                    extra.push((format!("{}_alpha", var), alpha, false));
                    extra.push((format!("{}_beta", var), beta, false));
                    derivative_rhs_override.push((
                        var.clone(),
                        Expr::Var(format!("{}_alpha", var))
                            * (Expr::Const(1.0) - Expr::Var(var.clone()))
                            - Expr::Var(format!("{}_beta", var)) * Expr::Var(var.clone()),
                    ));
                } else if let Some((inf, tau)) =
                    collect_linear(&rhs, &var).and_then(|parts| parts.inf_tau())
                {
                    extra.push((format!("{}_inf", var), inf, false));
                    extra.push((format!("{}_tau", var), tau, false));
                    derivative_rhs_override.push((
                        var.clone(),
                        (Expr::Var(format!("{}_inf", var)) - Expr::Var(var.clone()))
                            / Expr::Var(format!("{}_tau", var)),
                    ));
                } else {
                    // no closed form: leave the derivative as written
                    residual.push(var);
                }
            }
            non_linear.extend(residual);
            non_linear.sort();
        }
        OutputFlavor::BackwardEuler => {
            let mut residual = Vec::new();
            for var in linear_gates(system, &non_linear) {
                let rhs = gate_rhs(&derivative_rhs, &defs, &non_linear, &var);
                match collect_linear(&rhs, &var) {
                    Some(parts) => {
                        extra.push((format!("{}_g", var), parts.g_or_zero().simplify(), false));
                        extra.push((format!("{}_h", var), parts.h_or_zero().simplify(), false));
                        derivative_rhs_override.push((
                            var.clone(),
                            Expr::Var(format!("{}_g", var))
                                + Expr::Var(format!("{}_h", var)) * Expr::Var(var.clone()),
                        ));
                    }
                    None => residual.push(var),
                }
            }
            non_linear.extend(residual);
            non_linear.sort();
            if !non_linear.is_empty() {
                let funcs: Vec<Expr> =
                    non_linear.iter().map(|v| inlined[v].clone()).collect();
                let mut jac = Jacobian::from_vectors(funcs, non_linear.clone());
                jac.calc_jacobian();
                jac.calc_cse("cse_");
                jacobian = Some(jac);
            }
        }
        OutputFlavor::Cvode => {
            let vars: Vec<String> = system.state_vars.clone();
            let funcs: Vec<Expr> = vars.iter().map(|v| inlined[v].clone()).collect();
            let mut jac = Jacobian::from_vectors(funcs, vars);
            jac.calc_jacobian();
            jac.calc_cse("cse_");
            jacobian = Some(jac);
        }
    }

    // register every expression the printer will emit, then freeze by
    // printing
    let mut emitted: Vec<Equation> = patched.clone();
    for (var, rhs) in &derivative_rhs_override {
        if let Some(eq) = emitted
            .iter_mut()
            .find(|eq| eq.is_derivative() && eq.lhs.name() == var)
        {
            eq.rhs = rhs.clone();
        }
    }
    let scan_exprs: Vec<Expr> = emitted
        .iter()
        .map(|eq| eq.rhs.clone())
        .chain(extra.iter().map(|(_, rhs, _)| rhs.clone()))
        .chain(jacobian.iter().flat_map(|j| {
            j.cse_intermediates
                .iter()
                .map(|(_, def)| def.clone())
                .chain(j.symbolic_jacobian.iter().flatten().cloned())
        }))
        .collect();
    tables.calc_lookup_tables(&scan_exprs)?;

    let jacobian_vars: HashSet<&str> = match &jacobian {
        Some(j) => j.state_vars.iter().map(|s| s.as_str()).collect(),
        None => HashSet::new(),
    };
    let mut equations = Vec::new();
    for eq in &emitted {
        let name = eq.lhs.name().to_string();
        let is_voltage = eq.is_derivative() && name == system.voltage_var;
        equations.push(FormattedEquation {
            lhs: eq.lhs.to_string(),
            rhs: tables.print_expr(&eq.rhs),
            linear: eq.is_derivative() && !non_linear.contains(&name) && !is_voltage,
            in_jacobian: eq.is_derivative() && jacobian_vars.contains(name.as_str()),
            is_voltage,
        });
    }
    for (lhs, rhs, in_jacobian) in &extra {
        equations.push(FormattedEquation {
            lhs: lhs.clone(),
            rhs: tables.print_expr(rhs),
            linear: true,
            in_jacobian: *in_jacobian,
            is_voltage: false,
        });
    }
    let lookup_report = tables.print_lookup_parameters();
    info!(
        "flavor {} produced {} equations ({} non-linear state variables)",
        flavor,
        equations.len(),
        non_linear.len()
    );

    Ok(TransformedModel {
        flavor,
        equations,
        non_linear_state_vars: non_linear,
        jacobian,
        lookup_report,
    })
}

/// Rearrangement input for one gate: its derivative rhs with only the
/// intermediates that transitively touch a non-linear state variable or the
/// gate itself substituted in. Everything else keeps its name, so shared
/// rate expressions survive as standalone assignments in the output.
fn gate_rhs(
    derivative_rhs: &HashMap<String, Expr>,
    defs: &HashMap<String, Expr>,
    non_linear: &[String],
    var: &str,
) -> Expr {
    let mut targets: HashSet<String> = non_linear.iter().cloned().collect();
    targets.insert(var.to_string());
    substitute_touching(&derivative_rhs[var], defs, &targets)
}

/// Non-voltage state variables with a linear derivative, in state order.
fn linear_gates(system: &OdeSystem, non_linear: &[String]) -> Vec<String> {
    system
        .state_vars
        .iter()
        .filter(|v| **v != system.voltage_var && !non_linear.contains(v))
        .cloned()
        .collect()
}

fn validate(system: &OdeSystem) -> Result<(), TransformError> {
    assert!(!system.state_vars.is_empty(), "model has no state variables");
    assert!(
        system.state_vars.contains(&system.voltage_var),
        "voltage variable {} is not a state variable",
        system.voltage_var
    );
    let mut defined: HashSet<String> = assignment_map(&system.equations)
        .into_keys()
        .collect();
    defined.extend(system.state_vars.iter().cloned());
    defined.insert(system.voltage_var.clone());
    defined.insert(system.time_var.clone());
    defined.extend(system.modifiable_parameters.iter().cloned());
    for eq in &system.equations {
        let mut undefined = None;
        eq.rhs.visit(&mut |node| {
            if let Expr::Var(name) = node {
                if undefined.is_none() && !defined.contains(name) {
                    undefined = Some(name.clone());
                }
            }
        });
        if let Some(name) = undefined {
            return Err(TransformError::UndefinedVariable(name));
        }
    }
    for var in &system.state_vars {
        let has_derivative = system
            .equations
            .iter()
            .any(|eq| eq.is_derivative() && eq.lhs.name() == var);
        if !has_derivative {
            return Err(TransformError::MissingDerivative(var.clone()));
        }
    }
    Ok(())
}
