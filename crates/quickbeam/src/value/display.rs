//! Display implementation for FormulaValue
//!
//! Renders values the way they would be written as formula literals. This
//! is for diagnostics and tests, not for the culture-aware `Text` function.

use std::fmt;

use super::*;

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Blank(_) => write!(f, "Blank()"),
            FormulaValue::Boolean(b) => write!(f, "{}", b),
            FormulaValue::Number(n) => write!(f, "{}", n),
            FormulaValue::Decimal(d) => write!(f, "{}", d),
            FormulaValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaValue::Date(d) => write!(f, "Date({})", d.format("%Y,%m,%d")),
            FormulaValue::Time(t) => write!(f, "Time({}ms)", t.num_milliseconds()),
            FormulaValue::DateTime(dt) => {
                write!(f, "DateTime({})", dt.format("%Y-%m-%dT%H:%M:%S%.3f"))
            }
            FormulaValue::Guid(g) => write!(f, "GUID(\"{}\")", g),
            FormulaValue::Color(c) => write!(f, "ColorValue(\"{}\")", c),
            FormulaValue::OptionSet(o) => write!(f, "{}.{}", o.option_set, o.logical_name),
            FormulaValue::Record(r) => {
                write!(f, "{{")?;
                for (i, (name, _)) in r.ty().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, r.field(name))?;
                }
                write!(f, "}}")
            }
            FormulaValue::Table(t) => {
                write!(f, "Table(")?;
                for (i, row) in t.rows().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", row.to_value(t.row_type()))?;
                }
                write!(f, ")")
            }
            FormulaValue::Error(e) => write!(f, "{}", e),
            FormulaValue::Lambda(_) => write!(f, "<lambda>"),
            FormulaValue::UntypedObject(_) => write!(f, "<untyped>"),
            FormulaValue::Void => write!(f, "<void>"),
        }
    }
}
