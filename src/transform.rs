/// # Equation containers
/// assignment and derivative equations, usage counting and deterministic
/// ordering helpers shared by every pass.
/// ________________________________________________________________________________________________________________________________
pub mod equations;
/// # Partial evaluator
/// inlines single-use intermediate assignments into their consumers while
/// preserving equation order and multiply-used intermediates.
/// ________________________________________________________________________________________________________________________________
pub mod partial_eval;
/// # Linearity classifier
/// decides, per state variable, whether a derivative right-hand side is
/// constant, linear or non-linear in that variable.
/// ________________________________________________________________________________________________________________________________
pub mod linearity;
/// # Algebraic rearranger
/// rewrites linear gate ODEs `dx/dt = g + h*x` into the
/// `alpha*(1-x) - beta*x` and `(inf - x)/tau` closed forms.
/// ________________________________________________________________________________________________________________________________
pub mod rearrange;
/// # Jacobian builder
/// symbolic Jacobian matrices with common-subexpression factoring and
/// row/column-major formatted output.
/// ________________________________________________________________________________________________________________________________
pub mod jacobian;
/// # Singularity fixer
/// detects removable singularities of the `(c1*V - c2)/(exp(c3*V + c4) - c5)`
/// family and patches them with a piecewise linear interpolation.
/// ________________________________________________________________________________________________________________________________
pub mod singularity;
/// # Lookup-table analyzer
/// marks expensive univariate subexpressions for tabulation and splices
/// table-row references into printed output; two-phase building/frozen
/// protocol.
/// ________________________________________________________________________________________________________________________________
pub mod lookup_tables;
/// # Model orchestrator
/// drives the full pipeline for one output flavor (direct, backward Euler,
/// Rush-Larsen, CVODE).
/// ________________________________________________________________________________________________________________________________
pub mod model;


use thiserror::Error;

/// Errors the transformation pipeline can hand back to a caller. Programmer
/// errors (malformed inputs that can never occur in a well-formed model)
/// panic instead, with a message naming the precondition.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A protocol step was invoked out of order, e.g. registering new
    /// lookup-table candidates after the tables were frozen by printing.
    #[error("out-of-order pipeline step: {0}")]
    Sequencing(String),
    /// A state variable has no derivative equation in the system.
    #[error("state variable '{0}' has no derivative equation")]
    MissingDerivative(String),
    /// The system references a variable no equation or parameter defines.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
}
