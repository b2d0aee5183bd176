//! Crate-wide numeric configuration.
//!
//! All floating-point table bounds, steps and patch widths used by the
//! transformation pipeline live here as overridable defaults; nothing in the
//! core hard-codes them at the point of use.

/// Relative tolerance for "same singular point" and structural float checks.
pub const THRESHOLD: f64 = 1e-10;

/// Default half-width (in units of the exponent argument) of the linear patch
/// placed around a removable singularity.
pub const U_OFFSET: f64 = 1e-7;

/// Default membrane-voltage lookup table: min, step, 1/step, max.
pub const VOLTAGE_TABLE: (f64, f64, f64, f64) = (-150.0001, 0.001, 1000.0, 199.9999);

/// Default cytosolic-calcium-concentration lookup table: min, step, 1/step, max.
pub const CALCIUM_TABLE: (f64, f64, f64, f64) = (0.00001, 0.001, 1000.0, 30.00001);

/// Ontology tags for the default tabulation variables.
pub const VOLTAGE_TAG: &str = "membrane_voltage";
pub const CALCIUM_TAG: &str = "cytosolic_calcium_concentration";
