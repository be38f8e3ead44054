//! Static type descriptors attached to values and IR nodes

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// The static type of a formula value.
///
/// Scalar values derive their type from the variant they are stored in.
/// Blank, error, record and table values carry one explicitly so that an
/// empty or failed result still reports the type the binder inferred.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormulaType {
    /// Type of the untyped `Blank()` literal
    Blank,
    /// Boolean
    Boolean,
    /// Binary floating point number
    Number,
    /// Exact decimal number
    Decimal,
    /// Text
    String,
    /// Calendar date
    Date,
    /// Time of day or duration
    Time,
    /// Date and time
    DateTime,
    /// GUID
    Guid,
    /// RGBA color
    Color,
    /// Member of the named option set
    OptionSet(Arc<str>),
    /// Record with the given field types
    Record(RecordType),
    /// Table whose rows have the given type
    Table(RecordType),
    /// Dynamically typed host object
    UntypedObject,
    /// Result of a side-effecting expression
    Void,
    /// Type not known until runtime
    #[default]
    Deferred,
}

impl FormulaType {
    /// Whether the type is only known at runtime.
    pub fn is_deferred(&self) -> bool {
        matches!(self, FormulaType::Deferred)
    }

    /// Row type for table types.
    pub fn row_type(&self) -> Option<&RecordType> {
        match self {
            FormulaType::Table(row) => Some(row),
            _ => None,
        }
    }

    /// Field type for record types.
    pub fn record_type(&self) -> Option<&RecordType> {
        match self {
            FormulaType::Record(rec) => Some(rec),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is
    /// expected.
    ///
    /// Blank fits everywhere; deferred types accept anything; numbers and
    /// decimals are kept apart.
    pub fn accepts(&self, other: &FormulaType) -> bool {
        match (self, other) {
            (_, FormulaType::Blank) | (FormulaType::Deferred, _) | (_, FormulaType::Deferred) => {
                true
            }
            (FormulaType::Record(a), FormulaType::Record(b))
            | (FormulaType::Table(a), FormulaType::Table(b)) => a.accepts(b),
            (a, b) => a == b,
        }
    }

    /// Single-column table of the given element type, column `Value`.
    pub fn single_column_table(element: FormulaType) -> Self {
        FormulaType::Table(RecordType::new().with_field(SINGLE_COLUMN, element))
    }
}

/// Column name used by single-column tables produced by the runtime.
pub const SINGLE_COLUMN: &str = "Value";

/// Ordered set of named, typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordType {
    fields: Arc<IndexMap<Arc<str>, FormulaType>>,
}

impl RecordType {
    /// Empty record type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn with_field(mut self, name: impl Into<Arc<str>>, ty: FormulaType) -> Self {
        Arc::make_mut(&mut self.fields).insert(name.into(), ty);
        self
    }

    /// Look up a field type.
    pub fn get(&self, name: &str) -> Option<&FormulaType> {
        self.fields.get(name)
    }

    /// Whether the record type declares `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &FormulaType)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Name of the only column, if there is exactly one.
    pub fn single_column(&self) -> Option<&Arc<str>> {
        if self.fields.len() == 1 {
            self.fields.keys().next()
        } else {
            None
        }
    }

    fn accepts(&self, other: &RecordType) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, ty)| other.get(name).is_some_and(|o| ty.accepts(o)))
    }
}

/// Discriminant of a [`FormulaValue`](super::FormulaValue), used for runtime
/// type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Blank
    Blank,
    /// Boolean
    Boolean,
    /// Number
    Number,
    /// Decimal
    Decimal,
    /// String
    String,
    /// Date
    Date,
    /// Time
    Time,
    /// DateTime
    DateTime,
    /// Guid
    Guid,
    /// Color
    Color,
    /// Option set member
    OptionSet,
    /// Record
    Record,
    /// Table
    Table,
    /// Error
    Error,
    /// Unevaluated argument
    Lambda,
    /// Untyped object
    UntypedObject,
    /// Void
    Void,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Blank => "Blank",
            ValueKind::Boolean => "Boolean",
            ValueKind::Number => "Number",
            ValueKind::Decimal => "Decimal",
            ValueKind::String => "Text",
            ValueKind::Date => "Date",
            ValueKind::Time => "Time",
            ValueKind::DateTime => "DateTime",
            ValueKind::Guid => "GUID",
            ValueKind::Color => "Color",
            ValueKind::OptionSet => "OptionSetValue",
            ValueKind::Record => "Record",
            ValueKind::Table => "Table",
            ValueKind::Error => "Error",
            ValueKind::Lambda => "Lambda",
            ValueKind::UntypedObject => "UntypedObject",
            ValueKind::Void => "Void",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FormulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaType::OptionSet(name) => write!(f, "OptionSet({name})"),
            FormulaType::Record(rec) => write!(f, "Record{rec}"),
            FormulaType::Table(rec) => write!(f, "Table{rec}"),
            FormulaType::Blank => f.write_str("Blank"),
            FormulaType::Boolean => f.write_str("Boolean"),
            FormulaType::Number => f.write_str("Number"),
            FormulaType::Decimal => f.write_str("Decimal"),
            FormulaType::String => f.write_str("Text"),
            FormulaType::Date => f.write_str("Date"),
            FormulaType::Time => f.write_str("Time"),
            FormulaType::DateTime => f.write_str("DateTime"),
            FormulaType::Guid => f.write_str("GUID"),
            FormulaType::Color => f.write_str("Color"),
            FormulaType::UntypedObject => f.write_str("UntypedObject"),
            FormulaType::Void => f.write_str("Void"),
            FormulaType::Deferred => f.write_str("Deferred"),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {ty}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_fits_any_type() {
        assert!(FormulaType::Number.accepts(&FormulaType::Blank));
        assert!(!FormulaType::Number.accepts(&FormulaType::String));
        assert!(!FormulaType::Number.accepts(&FormulaType::Decimal));
    }

    #[test]
    fn test_record_types_compare_by_fields() {
        let a = RecordType::new()
            .with_field("x", FormulaType::Number)
            .with_field("y", FormulaType::String);
        let b = RecordType::new()
            .with_field("y", FormulaType::String)
            .with_field("x", FormulaType::Number);
        assert!(FormulaType::Record(a.clone()).accepts(&FormulaType::Record(b)));
        assert_eq!(a.to_string(), "{x: Number, y: Text}");
    }
}
