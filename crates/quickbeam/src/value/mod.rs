//! Value representation for formula results

mod display;
mod error;
mod impls;
mod record;
mod scalar;
mod types;
mod untyped;

pub use error::{ErrorKind, ErrorValue, ExpressionError, Severity};
pub use record::{RecordValue, RowOutcome, TableValue};
pub use scalar::{Color, LambdaValue, OptionSetValue};
pub use types::{FormulaType, RecordType, ValueKind, SINGLE_COLUMN};
pub use untyped::{JsonUntyped, UntypedKind, UntypedObject};

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Runtime value produced by evaluating a formula.
///
/// Values are organized into three tiers:
/// - Scalars, stored inline or behind a cheap `Arc`
/// - Compound records and tables, shared through `Arc`
/// - Runtime-only forms: errors, unevaluated arguments, host objects
///
/// Cloning is always cheap.
#[derive(Debug, Clone)]
pub enum FormulaValue {
    // ═══════════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// Absence of a value, tagged with the type it stands in for
    Blank(FormulaType),

    /// `true` or `false`
    Boolean(bool),

    /// Binary floating point number
    Number(f64),

    /// Exact decimal number
    Decimal(Decimal),

    /// Text
    String(Arc<str>),

    /// Calendar date
    Date(NaiveDate),

    /// Time of day or duration
    Time(Duration),

    /// Date and time in the context time zone
    DateTime(NaiveDateTime),

    /// GUID
    Guid(Uuid),

    /// RGBA color
    Color(Color),

    /// Member of an option set
    OptionSet(OptionSetValue),

    // ═══════════════════════════════════════════════════════════════════
    // Compound
    // ═══════════════════════════════════════════════════════════════════
    /// Record
    Record(RecordValue),

    /// Table
    Table(TableValue),

    // ═══════════════════════════════════════════════════════════════════
    // Runtime-only
    // ═══════════════════════════════════════════════════════════════════
    /// One or more expression errors
    Error(ErrorValue),

    /// Unevaluated argument for control-flow functions
    Lambda(LambdaValue),

    /// Dynamically typed host object
    UntypedObject(Arc<dyn UntypedObject>),

    /// Result of a side-effecting expression
    Void,
}

impl FormulaValue {
    /// Runtime discriminant.
    pub fn kind(&self) -> ValueKind {
        match self {
            FormulaValue::Blank(_) => ValueKind::Blank,
            FormulaValue::Boolean(_) => ValueKind::Boolean,
            FormulaValue::Number(_) => ValueKind::Number,
            FormulaValue::Decimal(_) => ValueKind::Decimal,
            FormulaValue::String(_) => ValueKind::String,
            FormulaValue::Date(_) => ValueKind::Date,
            FormulaValue::Time(_) => ValueKind::Time,
            FormulaValue::DateTime(_) => ValueKind::DateTime,
            FormulaValue::Guid(_) => ValueKind::Guid,
            FormulaValue::Color(_) => ValueKind::Color,
            FormulaValue::OptionSet(_) => ValueKind::OptionSet,
            FormulaValue::Record(_) => ValueKind::Record,
            FormulaValue::Table(_) => ValueKind::Table,
            FormulaValue::Error(_) => ValueKind::Error,
            FormulaValue::Lambda(_) => ValueKind::Lambda,
            FormulaValue::UntypedObject(_) => ValueKind::UntypedObject,
            FormulaValue::Void => ValueKind::Void,
        }
    }

    /// Static type of the value.
    pub fn formula_type(&self) -> FormulaType {
        match self {
            FormulaValue::Blank(ty) => ty.clone(),
            FormulaValue::Boolean(_) => FormulaType::Boolean,
            FormulaValue::Number(_) => FormulaType::Number,
            FormulaValue::Decimal(_) => FormulaType::Decimal,
            FormulaValue::String(_) => FormulaType::String,
            FormulaValue::Date(_) => FormulaType::Date,
            FormulaValue::Time(_) => FormulaType::Time,
            FormulaValue::DateTime(_) => FormulaType::DateTime,
            FormulaValue::Guid(_) => FormulaType::Guid,
            FormulaValue::Color(_) => FormulaType::Color,
            FormulaValue::OptionSet(o) => FormulaType::OptionSet(o.option_set.clone()),
            FormulaValue::Record(r) => FormulaType::Record(r.ty().clone()),
            FormulaValue::Table(t) => FormulaType::Table(t.row_type().clone()),
            FormulaValue::Error(e) => e.ty().clone(),
            FormulaValue::Lambda(l) => l.ty().clone(),
            FormulaValue::UntypedObject(_) => FormulaType::UntypedObject,
            FormulaValue::Void => FormulaType::Void,
        }
    }
}
