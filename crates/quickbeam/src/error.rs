//! Error types for host-level failures
//!
//! These are failures of an operation, not of a formula. A formula that
//! divides by zero produces a [`FormulaValue::Error`]; a formula that reads
//! a slot the host has since removed fails the whole evaluation with an
//! [`EvalError`].

use thiserror::Error;

use crate::value::FormulaValue;

/// Host-level failure of one evaluation.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Cancellation was requested
    #[error("Evaluation was cancelled")]
    Cancelled,

    /// A global referenced by the IR no longer exists
    #[error("Symbol '{name}' no longer exists")]
    StaleSlot {
        /// Symbol name
        name: String,
    },

    /// A global changed type after the IR was bound
    #[error("Symbol '{name}' changed type: expected {expected}, found {found}")]
    SlotTypeChanged {
        /// Symbol name
        name: String,
        /// Type the IR was bound against
        expected: String,
        /// Current slot type
        found: String,
    },

    /// A global exists but has no value
    #[error("Symbol '{name}' has no value")]
    UninitializedSlot {
        /// Symbol name
        name: String,
    },

    /// The IR calls a function the registry does not know
    #[error("Unknown function: {name}")]
    UnknownFunction {
        /// Registry key
        name: String,
    },

    /// The IR calls an undefined user-defined function
    #[error("Unknown user-defined function: {name}")]
    UnknownUdf {
        /// Function name
        name: String,
    },

    /// A scoped name could not be resolved
    #[error("Unresolved field: {name}")]
    UnresolvedField {
        /// Field name
        name: String,
    },

    /// A function received a value where it needed a lambda, or the
    /// reverse
    #[error("Invalid use of a lazy argument in {function}")]
    InvalidLambdaUse {
        /// Function being invoked
        function: String,
    },

    /// A host service broke its contract
    #[error("Service {service} returned an invalid result: {message}")]
    ServiceContract {
        /// Service name
        service: &'static str,
        /// What was wrong
        message: String,
    },

    /// A `Set` inside the expression violated the engine's rules
    #[error("Assignment failed: {0}")]
    Assignment(Box<EngineError>),

    /// Could not start an async runtime for a blocking call
    #[error("Failed to start async runtime: {0}")]
    NoRuntime(#[source] std::io::Error),
}

/// Host-level failure of a recalculation engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A formula references a name nobody defined
    #[error("Undefined name: {name}")]
    UndefinedName {
        /// Missing name
        name: String,
    },

    /// The name is taken
    #[error("'{name}' is already defined")]
    AlreadyDefined {
        /// Name
        name: String,
    },

    /// A variable's fixed type does not accept the new value
    #[error("Type mismatch for '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Variable name
        name: String,
        /// Fixed type
        expected: String,
        /// Type of the rejected value
        found: String,
    },

    /// Other formulas still reference the name
    #[error("Cannot delete '{name}': referenced by {}", dependents.join(", "))]
    HasDependents {
        /// Name being deleted
        name: String,
        /// Formulas that reference it
        dependents: Vec<String>,
    },

    /// Definition would make formulas depend on themselves
    #[error("Circular reference: {}", path.join(" -> "))]
    Cycle {
        /// Names along the cycle
        path: Vec<String>,
    },

    /// No formula or variable with this name
    #[error("Unknown name: {name}")]
    UnknownName {
        /// Name
        name: String,
    },

    /// Formulas cannot be assigned
    #[error("'{name}' is a formula and cannot be assigned")]
    ReadOnly {
        /// Name
        name: String,
    },

    /// Evaluating a formula failed at host level
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Could not build the engine's runtime
    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl From<EngineError> for EvalError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Eval(inner) => inner,
            other => EvalError::Assignment(Box::new(other)),
        }
    }
}

/// Consistency problem found by
/// [`FunctionRegistry::validate`](crate::functions::FunctionRegistry::validate).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A tabular overload whose scalar base is not registered
    #[error("Tabular overload {name} has no scalar base {base}")]
    OrphanOverload {
        /// Overload key
        name: String,
        /// Missing base
        base: String,
    },

    /// Two registrations under one key
    #[error("Function {name} registered twice")]
    Duplicate {
        /// Key
        name: String,
    },
}

/// Result type alias for evaluation
pub type Result<T> = std::result::Result<T, EvalError>;

/// Get a human-readable type name for a value
pub fn type_name(value: &FormulaValue) -> &'static str {
    match value {
        FormulaValue::Blank(_) => "Blank",
        FormulaValue::Boolean(_) => "Boolean",
        FormulaValue::Number(_) => "Number",
        FormulaValue::Decimal(_) => "Decimal",
        FormulaValue::String(_) => "Text",
        FormulaValue::Date(_) => "Date",
        FormulaValue::Time(_) => "Time",
        FormulaValue::DateTime(_) => "DateTime",
        FormulaValue::Guid(_) => "GUID",
        FormulaValue::Color(_) => "Color",
        FormulaValue::OptionSet(_) => "OptionSetValue",
        FormulaValue::Record(_) => "Record",
        FormulaValue::Table(_) => "Table",
        FormulaValue::Error(_) => "Error",
        FormulaValue::Lambda(_) => "Lambda",
        FormulaValue::UntypedObject(_) => "UntypedObject",
        FormulaValue::Void => "Void",
    }
}
