//! FormulaValue trait implementations: constructors, predicates, extractors, From traits, PartialEq

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;

use super::*;

// ═══════════════════════════════════════════════════════════════════
// Convenience Constructors
// ═══════════════════════════════════════════════════════════════════

impl FormulaValue {
    /// Untyped blank, the value of `Blank()`
    pub fn blank() -> Self {
        FormulaValue::Blank(FormulaType::Blank)
    }

    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        FormulaValue::String(Arc::from(s.as_ref()))
    }

    /// Create a record value
    pub fn record<N: Into<Arc<str>>>(fields: impl IntoIterator<Item = (N, FormulaValue)>) -> Self {
        FormulaValue::Record(RecordValue::from_fields(fields))
    }

    /// Create a single-column table of numbers
    pub fn number_table(values: impl IntoIterator<Item = f64>) -> Self {
        FormulaValue::Table(TableValue::single_column(
            FormulaType::Number,
            values.into_iter().map(FormulaValue::Number),
        ))
    }

    /// Create an error value from one record
    pub fn error(ty: FormulaType, error: ExpressionError) -> Self {
        FormulaValue::Error(ErrorValue::new(ty, error))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Predicates
    // ═══════════════════════════════════════════════════════════════════

    /// Check if value is blank
    pub fn is_blank(&self) -> bool {
        matches!(self, FormulaValue::Blank(_))
    }

    /// Blank or the empty string
    pub fn is_blank_or_empty(&self) -> bool {
        match self {
            FormulaValue::Blank(_) => true,
            FormulaValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Check if value is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Number or decimal
    pub fn is_numeric(&self) -> bool {
        matches!(self, FormulaValue::Number(_) | FormulaValue::Decimal(_))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors
    // ═══════════════════════════════════════════════════════════════════

    /// Extract boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract a number, widening decimals
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Extract string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FormulaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract record
    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            FormulaValue::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Extract table
    pub fn as_table(&self) -> Option<&TableValue> {
        match self {
            FormulaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Extract error
    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            FormulaValue::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Extract lambda
    pub fn as_lambda(&self) -> Option<&LambdaValue> {
        match self {
            FormulaValue::Lambda(l) => Some(l),
            _ => None,
        }
    }

    /// Reshape records and tables to `ty`; retag blanks and errors.
    pub fn conform_to(self, ty: &FormulaType) -> FormulaValue {
        match (self, ty) {
            (value, FormulaType::Deferred) => value,
            (FormulaValue::Void, _) => FormulaValue::Void,
            (FormulaValue::Record(r), FormulaType::Record(rt)) => {
                FormulaValue::Record(r.conform_to(rt))
            }
            (FormulaValue::Table(t), FormulaType::Table(rt)) => {
                FormulaValue::Table(t.conform_to(rt))
            }
            (FormulaValue::Blank(_), ty) => FormulaValue::Blank(ty.clone()),
            (FormulaValue::Error(e), ty) => FormulaValue::Error(e.with_type(ty.clone())),
            (value, _) => value,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// PartialEq
// ═══════════════════════════════════════════════════════════════════

impl PartialEq for FormulaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FormulaValue::Blank(a), FormulaValue::Blank(b)) => a == b,
            (FormulaValue::Boolean(a), FormulaValue::Boolean(b)) => a == b,
            (FormulaValue::Number(a), FormulaValue::Number(b)) => a == b,
            (FormulaValue::Decimal(a), FormulaValue::Decimal(b)) => a == b,
            (FormulaValue::String(a), FormulaValue::String(b)) => a == b,
            (FormulaValue::Date(a), FormulaValue::Date(b)) => a == b,
            (FormulaValue::Time(a), FormulaValue::Time(b)) => a == b,
            (FormulaValue::DateTime(a), FormulaValue::DateTime(b)) => a == b,
            (FormulaValue::Guid(a), FormulaValue::Guid(b)) => a == b,
            (FormulaValue::Color(a), FormulaValue::Color(b)) => a == b,
            (FormulaValue::OptionSet(a), FormulaValue::OptionSet(b)) => a == b,
            (FormulaValue::Record(a), FormulaValue::Record(b)) => a == b,
            (FormulaValue::Table(a), FormulaValue::Table(b)) => a == b,
            (FormulaValue::Error(a), FormulaValue::Error(b)) => a == b,
            (FormulaValue::Lambda(a), FormulaValue::Lambda(b)) => a == b,
            (FormulaValue::UntypedObject(a), FormulaValue::UntypedObject(b)) => {
                Arc::ptr_eq(a, b)
            }
            (FormulaValue::Void, FormulaValue::Void) => true,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<i32> for FormulaValue {
    fn from(n: i32) -> Self {
        FormulaValue::Number(f64::from(n))
    }
}

impl From<Decimal> for FormulaValue {
    fn from(d: Decimal) -> Self {
        FormulaValue::Decimal(d)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::string(s)
    }
}

impl From<String> for FormulaValue {
    fn from(s: String) -> Self {
        FormulaValue::String(Arc::from(s))
    }
}

impl From<ErrorValue> for FormulaValue {
    fn from(e: ErrorValue) -> Self {
        FormulaValue::Error(e)
    }
}

impl From<RecordValue> for FormulaValue {
    fn from(r: RecordValue) -> Self {
        FormulaValue::Record(r)
    }
}

impl From<TableValue> for FormulaValue {
    fn from(t: TableValue) -> Self {
        FormulaValue::Table(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_carries_type() {
        let v = FormulaValue::Blank(FormulaType::Number);
        assert_eq!(v.formula_type(), FormulaType::Number);
        assert!(v.is_blank());
        assert!(FormulaValue::string("").is_blank_or_empty());
    }

    #[test]
    fn test_decimal_widens_to_f64() {
        let v = FormulaValue::Decimal(Decimal::new(125, 2));
        assert_eq!(v.as_f64(), Some(1.25));
    }

    #[test]
    fn test_conform_retags_errors() {
        let err = FormulaValue::error(
            FormulaType::Number,
            ExpressionError::new(ErrorKind::Numeric),
        );
        let conformed = err.conform_to(&FormulaType::String);
        assert_eq!(conformed.formula_type(), FormulaType::String);
    }
}
