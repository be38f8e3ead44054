//! In-band error values
//!
//! Formula-level failures (division by zero, bad arguments, type mismatches
//! discovered at runtime) are ordinary values. They flow through the
//! evaluator like any other result and are only inspected by functions that
//! ask for them (`IfError`, `IsError`). Host-level failures never take this
//! shape; see [`EvalError`](crate::EvalError).

use std::fmt;

use crate::ir::{IrContext, Span};

use super::FormulaType;

/// Classification of an expression error.
///
/// The numeric codes are stable and are what `FirstError.Kind` exposes to
/// formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Runtime value did not have the expected type
    RuntimeTypeMismatch,
    /// Unclassified failure
    Unknown,
    /// Division by zero
    DivideByZero,
    /// Unsupported language code
    BadLanguageCode,
    /// Function used in an unsupported way
    InvalidFunctionUsage,
    /// Operation not supported by this runtime
    NotSupported,
    /// Allocation refused by the governor
    InsufficientMemory,
    /// Non-finite numeric result
    Numeric,
    /// Argument has the right type but an unusable value
    InvalidArgument,
    /// Internal failure inside a function
    Internal,
    /// No applicable value exists
    NotApplicable,
    /// Argument outside its permitted range
    ArgumentOutOfRange,
    /// User-defined function recursion went past the configured limit
    CallDepthExceeded,
    /// Raised by a formula through `Error()`
    Custom,
}

impl ErrorKind {
    /// Stable numeric code.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::RuntimeTypeMismatch => 11,
            ErrorKind::Unknown => 12,
            ErrorKind::DivideByZero => 13,
            ErrorKind::BadLanguageCode => 14,
            ErrorKind::InvalidFunctionUsage => 16,
            ErrorKind::NotSupported => 20,
            ErrorKind::InsufficientMemory => 21,
            ErrorKind::Numeric => 24,
            ErrorKind::InvalidArgument => 25,
            ErrorKind::Internal => 26,
            ErrorKind::NotApplicable => 27,
            ErrorKind::ArgumentOutOfRange => 28,
            ErrorKind::CallDepthExceeded => 29,
            ErrorKind::Custom => 1000,
        }
    }

    /// Reverse of [`code`](Self::code). Codes at or above 1000 are custom.
    pub fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            11 => ErrorKind::RuntimeTypeMismatch,
            12 => ErrorKind::Unknown,
            13 => ErrorKind::DivideByZero,
            14 => ErrorKind::BadLanguageCode,
            16 => ErrorKind::InvalidFunctionUsage,
            20 => ErrorKind::NotSupported,
            21 => ErrorKind::InsufficientMemory,
            24 => ErrorKind::Numeric,
            25 => ErrorKind::InvalidArgument,
            26 => ErrorKind::Internal,
            27 => ErrorKind::NotApplicable,
            28 => ErrorKind::ArgumentOutOfRange,
            29 => ErrorKind::CallDepthExceeded,
            c if c >= 1000 => ErrorKind::Custom,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How serious an expression error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    /// Informational, the result is still usable
    Warning,
    /// Result is wrong but evaluation continued
    Moderate,
    /// Result is unusable
    #[default]
    Severe,
}

/// One failure record inside an [`ErrorValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionError {
    /// Classification
    pub kind: ErrorKind,
    /// Optional human-readable message
    pub message: Option<String>,
    /// Source location of the failing call, when known
    pub span: Option<Span>,
    /// Severity
    pub severity: Severity,
}

impl ExpressionError {
    /// New severe error of the given kind with no message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            span: None,
            severity: Severity::Severe,
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a source span.
    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    /// Change the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A non-empty, ordered collection of expression errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    ty: FormulaType,
    errors: Vec<ExpressionError>,
}

impl ErrorValue {
    /// Error value holding one record.
    pub fn new(ty: FormulaType, error: ExpressionError) -> Self {
        Self {
            ty,
            errors: vec![error],
        }
    }

    /// Build from a list of records. Returns `None` for an empty list.
    pub fn from_errors(ty: FormulaType, errors: Vec<ExpressionError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { ty, errors })
        }
    }

    /// Union several error values, preserving order.
    ///
    /// Returns `None` when the iterator yields nothing.
    pub fn combine<'a>(
        ty: FormulaType,
        values: impl IntoIterator<Item = &'a ErrorValue>,
    ) -> Option<Self> {
        let errors = values
            .into_iter()
            .flat_map(|e| e.errors.iter().cloned())
            .collect();
        Self::from_errors(ty, errors)
    }

    /// Static type the failed expression would have produced.
    pub fn ty(&self) -> &FormulaType {
        &self.ty
    }

    /// Records in the order they were produced.
    pub fn errors(&self) -> &[ExpressionError] {
        &self.errors
    }

    /// First record.
    pub fn first(&self) -> &ExpressionError {
        // Non-empty by construction
        &self.errors[0]
    }

    /// Same records, different static type.
    pub fn with_type(mut self, ty: FormulaType) -> Self {
        self.ty = ty;
        self
    }

    /// Fill in `span` on records that have none.
    pub fn with_default_span(mut self, span: Option<Span>) -> Self {
        if span.is_some() {
            for error in &mut self.errors {
                if error.span.is_none() {
                    error.span = span;
                }
            }
        }
        self
    }

    /// Append the records of `other`.
    pub fn extend(&mut self, other: &ErrorValue) {
        self.errors.extend(other.errors.iter().cloned());
    }

    // ═══════════════════════════════════════════════════════════════════
    // Common errors
    // ═══════════════════════════════════════════════════════════════════

    /// Error of `kind` located at the call described by `ir`.
    pub fn at(ir: &IrContext, kind: ErrorKind) -> Self {
        Self::new(ir.result_type.clone(), ExpressionError::new(kind).with_span(ir.span))
    }

    /// Error of `kind` with a message, located at `ir`.
    pub fn at_with_message(ir: &IrContext, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(
            ir.result_type.clone(),
            ExpressionError::new(kind)
                .with_span(ir.span)
                .with_message(message),
        )
    }

    /// Division by zero.
    pub fn divide_by_zero(ir: &IrContext) -> Self {
        Self::at_with_message(ir, ErrorKind::DivideByZero, "Invalid operation: division by zero.")
    }

    /// Non-finite numeric result.
    pub fn numeric(ir: &IrContext) -> Self {
        Self::at_with_message(
            ir,
            ErrorKind::Numeric,
            "Invalid operation: the result is not a finite number.",
        )
    }

    /// Argument outside its permitted range.
    pub fn argument_out_of_range(ir: &IrContext) -> Self {
        Self::at_with_message(
            ir,
            ErrorKind::ArgumentOutOfRange,
            "Argument out of range.",
        )
    }

    /// Argument with an unusable value.
    pub fn invalid_argument(ir: &IrContext, message: impl Into<String>) -> Self {
        Self::at_with_message(ir, ErrorKind::InvalidArgument, message)
    }

    /// Runtime value did not have the declared type.
    pub fn runtime_type_mismatch(ir: &IrContext) -> Self {
        Self::at_with_message(
            ir,
            ErrorKind::RuntimeTypeMismatch,
            "Runtime type mismatch.",
        )
    }

    /// Governor refused an allocation.
    pub fn insufficient_memory(ir: &IrContext) -> Self {
        Self::at_with_message(
            ir,
            ErrorKind::InsufficientMemory,
            "Insufficient memory to complete the operation.",
        )
    }

    /// Language code not recognised.
    pub fn bad_language_code(ir: &IrContext, code: &str) -> Self {
        Self::at_with_message(
            ir,
            ErrorKind::BadLanguageCode,
            format!("Language code {code} not supported."),
        )
    }

    /// Feature not available in this runtime.
    pub fn not_supported(ir: &IrContext, what: &str) -> Self {
        Self::at_with_message(ir, ErrorKind::NotSupported, format!("{what} is not supported."))
    }

    /// Recursion through user-defined functions exceeded the limit.
    pub fn call_depth_exceeded(ir: &IrContext, max: usize) -> Self {
        Self::at_with_message(
            ir,
            ErrorKind::CallDepthExceeded,
            format!("Maximum call depth of {max} exceeded."),
        )
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            return write!(f, "Error({})", self.errors[0]);
        }
        f.write_str("Error([")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        f.write_str("])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_preserves_order() {
        let a = ErrorValue::new(FormulaType::Number, ExpressionError::new(ErrorKind::DivideByZero));
        let b = ErrorValue::from_errors(
            FormulaType::Number,
            vec![
                ExpressionError::new(ErrorKind::Numeric),
                ExpressionError::new(ErrorKind::Custom),
            ],
        )
        .unwrap();
        let combined = ErrorValue::combine(FormulaType::String, [&a, &b]).unwrap();
        let kinds: Vec<_> = combined.errors().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::DivideByZero, ErrorKind::Numeric, ErrorKind::Custom]
        );
        assert_eq!(combined.ty(), &FormulaType::String);
    }

    #[test]
    fn test_combine_of_nothing_is_none() {
        assert!(ErrorValue::combine(FormulaType::Number, []).is_none());
        assert!(ErrorValue::from_errors(FormulaType::Number, vec![]).is_none());
    }

    #[test]
    fn test_codes_round_trip() {
        for kind in [ErrorKind::DivideByZero, ErrorKind::InvalidArgument, ErrorKind::Custom] {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(1234), Some(ErrorKind::Custom));
        assert_eq!(ErrorKind::from_code(3), None);
    }
}
