//! # Quickbeam
//!
//! Evaluation core for a spreadsheet-style formula language.
//!
//! Quickbeam takes formulas that have already been parsed and type-bound
//! into an intermediate representation ([`IrNode`]) and computes their
//! values. Named formulas recalculate incrementally when the variables they
//! read change, the same way cells in a spreadsheet do.
//!
//! ## Architecture
//!
//! - **Value model**: [`FormulaValue`], a closed sum type, plus tables,
//!   records and error values
//! - **Evaluator**: an async tree walker over the IR with lazy lambda
//!   arguments, row scopes and bounded user-defined function recursion
//! - **Function pipeline**: built-in functions wrapped in declarative
//!   argument, blank, type, value and return policies
//! - **Recalculation**: [`RecalcEngine`] keeps a dependency graph of named
//!   formulas and recomputes dependents in order, once per batch
//!
//! ## Example
//!
//! ```
//! use quickbeam::{EvalContext, Evaluator, FormulaType, FormulaValue, IrNode};
//!
//! let ir = IrNode::call(
//!     "Concatenate",
//!     vec![IrNode::text("quick"), IrNode::text("beam")],
//!     FormulaType::String,
//! );
//! let value = Evaluator::new().eval_blocking(&ir, &EvalContext::new()).unwrap();
//! assert_eq!(value, FormulaValue::from("quickbeam"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod functions;
pub mod governor;
pub mod ir;
pub mod recalc;
pub mod services;
pub mod symbols;
pub mod udf;
pub mod value;

// Re-export main types
pub use config::{Culture, Features, RuntimeConfig};
pub use context::{CancellationToken, EvalContext};
pub use error::{EngineError, EvalError, RegistryError, Result};
pub use eval::{Evaluated, Evaluator, VariableSink};
pub use functions::{FunctionRegistry, RegistryBuilder};
pub use governor::Governor;
pub use ir::{BinaryOp, Coercion, IrContext, IrKind, IrNode, Qualifier, Span, UnaryOp};
pub use recalc::{update_callback, DependencyGraph, RecalcEngine, UpdateCallback};
pub use services::{RandomService, ServiceRegistry};
pub use symbols::{ComposedSymbolTable, RowScope, ScopeStore, SymbolTable, SymbolValues};
pub use udf::{UdfTable, UserDefinedFunction};
pub use value::{
    Color, ErrorKind, ErrorValue, ExpressionError, FormulaType, FormulaValue, LambdaValue,
    OptionSetValue, RecordType, RecordValue, RowOutcome, Severity, TableValue, UntypedObject,
    ValueKind,
};

/// Quickbeam version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
