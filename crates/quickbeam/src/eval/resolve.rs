//! Name and field resolution

use super::Evaluator;
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::ir::{IrContext, Qualifier};
use crate::value::{ErrorValue, FormulaType, FormulaValue, TableValue, UntypedKind};

/// Name that addresses the whole current row.
const THIS_RECORD: &str = "ThisRecord";

impl Evaluator {
    /// Resolve a name reference.
    ///
    /// Ambient names try the row scopes first, innermost first, skipping
    /// aliased scopes, then the globals.
    pub(super) fn resolve_name(
        &self,
        name: &str,
        qualifier: &Qualifier,
        ir: &IrContext,
        ctx: &EvalContext,
    ) -> Result<FormulaValue, EvalError> {
        match qualifier {
            Qualifier::Ambient => match ctx.scope().ambient(name) {
                Some(value) => Ok(value),
                None => self.globals.read(name, &ir.result_type),
            },
            Qualifier::Global => self.globals.read(name, &ir.result_type),
            Qualifier::ThisRow => {
                let row = ctx.scope().this_row().ok_or_else(|| unresolved(name))?;
                if name == THIS_RECORD {
                    return Ok(row.record());
                }
                row.field(name).ok_or_else(|| unresolved(name))
            }
            Qualifier::Alias(alias) => {
                let row = ctx.scope().aliased(alias).ok_or_else(|| unresolved(alias))?;
                if name == &**alias {
                    return Ok(row.record());
                }
                row.field(name).ok_or_else(|| unresolved(name))
            }
        }
    }
}

fn unresolved(name: &str) -> EvalError {
    EvalError::UnresolvedField {
        name: name.to_string(),
    }
}

/// `source.field`.
///
/// A blank record yields a blank field, a table projects to the single
/// column of that field, and untyped objects read properties with JSON
/// null as blank.
pub(super) fn field_access(source: FormulaValue, field: &str, ir: &IrContext) -> FormulaValue {
    match source {
        FormulaValue::Record(record) => record.field(field).conform_to(&ir.result_type),
        FormulaValue::Blank(_) => FormulaValue::Blank(ir.result_type.clone()),
        FormulaValue::Error(e) => FormulaValue::Error(e.with_type(ir.result_type.clone())),
        FormulaValue::Table(table) => project(&table, field, ir),
        FormulaValue::UntypedObject(obj) => match obj.property(field) {
            Some(value) if value.kind() == UntypedKind::Null => {
                FormulaValue::Blank(ir.result_type.clone())
            }
            Some(value) => FormulaValue::UntypedObject(value),
            None => FormulaValue::Blank(ir.result_type.clone()),
        },
        _ => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    }
}

fn project(table: &TableValue, field: &str, ir: &IrContext) -> FormulaValue {
    let element = table
        .row_type()
        .get(field)
        .cloned()
        .unwrap_or(FormulaType::Blank);
    let values = table.rows().iter().map(|row| {
        let value = row.to_value(table.row_type());
        match value {
            FormulaValue::Record(r) => r.field(field),
            FormulaValue::Error(e) => FormulaValue::Error(e),
            _ => FormulaValue::Blank(element.clone()),
        }
    });
    FormulaValue::Table(TableValue::single_column(element.clone(), values.collect::<Vec<_>>()))
        .conform_to(&ir.result_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ErrorKind, JsonUntyped, RecordValue};
    use std::sync::Arc;

    #[test]
    fn test_field_of_blank_record_is_blank() {
        let ir = IrContext::new(FormulaType::Number);
        let v = field_access(FormulaValue::blank(), "a", &ir);
        assert_eq!(v, FormulaValue::Blank(FormulaType::Number));
    }

    #[test]
    fn test_field_of_record() {
        let ir = IrContext::new(FormulaType::Number);
        let rec =
            FormulaValue::Record(RecordValue::from_fields([("a", FormulaValue::Number(2.0))]));
        assert_eq!(field_access(rec, "a", &ir), FormulaValue::Number(2.0));
    }

    #[test]
    fn test_field_of_scalar_is_type_mismatch() {
        let ir = IrContext::new(FormulaType::Number);
        let v = field_access(FormulaValue::Number(1.0), "a", &ir);
        assert_eq!(v.as_error().unwrap().first().kind, ErrorKind::RuntimeTypeMismatch);
    }

    #[test]
    fn test_untyped_null_property_is_blank() {
        let ir = IrContext::new(FormulaType::UntypedObject);
        let obj = JsonUntyped::parse(r#"{"a": null, "b": 1}"#).unwrap();
        let obj = FormulaValue::UntypedObject(Arc::new(obj));
        assert!(field_access(obj.clone(), "a", &ir).is_blank());
        assert!(matches!(
            field_access(obj, "b", &ir),
            FormulaValue::UntypedObject(_)
        ));
    }

    #[test]
    fn test_table_projection() {
        let row_type = crate::value::RecordType::new().with_field("a", FormulaType::Number);
        let table = TableValue::from_records(
            row_type,
            vec![
                RecordValue::from_fields([("a", FormulaValue::Number(1.0))]),
                RecordValue::from_fields([("a", FormulaValue::Number(2.0))]),
            ],
        );
        let ir = IrContext::new(FormulaType::single_column_table(FormulaType::Number));
        let projected = field_access(FormulaValue::Table(table), "a", &ir);
        let t = projected.as_table().unwrap();
        assert_eq!(t.column_value(1), Some(FormulaValue::Number(2.0)));
    }
}
