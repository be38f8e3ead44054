//! Tabular overloads: scalar functions lifted over table rows

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::policy::BlankReplacement;
use super::FunctionImpl;
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue, RecordType, TableValue, SINGLE_COLUMN};

/// Static context for one scalar call inside a lifted call.
fn scalar_ir(ir: &IrContext) -> IrContext {
    let element = ir
        .result_type
        .row_type()
        .and_then(|row| row.iter().next().map(|(_, ty)| ty.clone()))
        .unwrap_or_default();
    ir.with_type(element)
}

fn result_row_type(ir: &IrContext, results: &[FormulaValue]) -> RecordType {
    match ir.result_type.row_type() {
        Some(row) => row.clone(),
        None => {
            let element = results
                .iter()
                .find(|v| !v.is_blank() && !v.is_error())
                .map(FormulaValue::formula_type)
                .unwrap_or(FormulaType::Blank);
            RecordType::new().with_field(SINGLE_COLUMN, element)
        }
    }
}

/// Row `index` of a single-column table as a scalar.
fn cell(table: &TableValue, index: usize) -> FormulaValue {
    table
        .column_value(index)
        .or_else(|| table.row(index))
        .unwrap_or_else(FormulaValue::blank)
}

/// Collect per-row results into a table, or the union of their errors.
fn finish(ir: &IrContext, results: Vec<FormulaValue>) -> FormulaValue {
    if let Some(err) = ErrorValue::combine(
        ir.result_type.clone(),
        results.iter().filter_map(FormulaValue::as_error),
    ) {
        return FormulaValue::Error(err);
    }
    let row_type = result_row_type(ir, &results);
    FormulaValue::Table(TableValue::from_results(row_type, results))
}

/// Overload taking one single-column table in place of the first scalar
/// argument (`AbsT`, `LenT`, ...).
pub struct TabularOverload {
    name: Arc<str>,
    scalar: Arc<dyn FunctionImpl>,
    blanks: BlankReplacement,
}

impl TabularOverload {
    /// Lift `scalar`; blank cells are replaced per `blanks` before each
    /// scalar call.
    pub fn new(name: Arc<str>, scalar: Arc<dyn FunctionImpl>, blanks: BlankReplacement) -> Self {
        Self {
            name,
            scalar,
            blanks,
        }
    }

    async fn run(
        &self,
        ev: &Evaluator,
        ctx: &EvalContext,
        ir: &IrContext,
        args: Vec<FormulaValue>,
    ) -> Result<FormulaValue, EvalError> {
        let mut args = args.into_iter();
        let table = match args.next() {
            Some(FormulaValue::Table(t)) => t,
            Some(FormulaValue::Error(e)) => {
                return Ok(FormulaValue::Error(e.with_type(ir.result_type.clone())))
            }
            Some(FormulaValue::Blank(_)) => return Ok(FormulaValue::Blank(ir.result_type.clone())),
            _ => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
        };
        let rest: Vec<_> = args.collect();
        let element_ir = scalar_ir(ir);

        let mut results = Vec::with_capacity(table.len());
        for i in 0..table.len() {
            ctx.check_cancelled()?;
            let mut value = cell(&table, i);
            if value.is_blank() {
                if let Some(r) = self.blanks.replacement(0) {
                    value = r.clone();
                }
            }
            let mut call_args = Vec::with_capacity(rest.len() + 1);
            call_args.push(value);
            call_args.extend(rest.iter().cloned());
            results.push(self.scalar.invoke(ev, ctx, &element_ir, call_args).await?);
        }
        log::trace!("{}: lifted over {} rows", self.name, results.len());
        Ok(finish(ir, results))
    }
}

impl FunctionImpl for TabularOverload {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke<'a>(
        &'a self,
        ev: &'a Evaluator,
        ctx: &'a EvalContext,
        ir: &'a IrContext,
        args: Vec<FormulaValue>,
    ) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
        self.run(ev, ctx, ir, args).boxed()
    }
}

/// Overload where any argument may be a single-column table.
///
/// Tables are zipped by row index and scalar arguments are broadcast. The
/// result has as many rows as the longest table; shorter tables read as
/// blank past their end, then the blank replacement policy applies.
pub struct MultiTableOverload {
    name: Arc<str>,
    scalar: Arc<dyn FunctionImpl>,
    blanks: BlankReplacement,
}

impl MultiTableOverload {
    /// Lift `scalar` over several tables.
    pub fn new(name: Arc<str>, scalar: Arc<dyn FunctionImpl>, blanks: BlankReplacement) -> Self {
        Self {
            name,
            scalar,
            blanks,
        }
    }

    async fn run(
        &self,
        ev: &Evaluator,
        ctx: &EvalContext,
        ir: &IrContext,
        args: Vec<FormulaValue>,
    ) -> Result<FormulaValue, EvalError> {
        if let Some(err) = ErrorValue::combine(
            ir.result_type.clone(),
            args.iter().filter_map(FormulaValue::as_error),
        ) {
            return Ok(FormulaValue::Error(err));
        }

        let rows = args
            .iter()
            .filter_map(FormulaValue::as_table)
            .map(TableValue::len)
            .max()
            .unwrap_or(0);
        let element_ir = scalar_ir(ir);

        let mut results = Vec::with_capacity(rows);
        for i in 0..rows {
            ctx.check_cancelled()?;
            let call_args = args
                .iter()
                .enumerate()
                .map(|(j, arg)| {
                    let value = match arg {
                        FormulaValue::Table(t) if i < t.len() => cell(t, i),
                        FormulaValue::Table(_) => FormulaValue::blank(),
                        scalar => scalar.clone(),
                    };
                    match (value.is_blank(), self.blanks.replacement(j)) {
                        (true, Some(r)) => r.clone(),
                        _ => value,
                    }
                })
                .collect();
            results.push(self.scalar.invoke(ev, ctx, &element_ir, call_args).await?);
        }
        log::trace!("{}: broadcast over {} rows", self.name, rows);
        Ok(finish(ir, results))
    }
}

impl FunctionImpl for MultiTableOverload {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke<'a>(
        &'a self,
        ev: &'a Evaluator,
        ctx: &'a EvalContext,
        ir: &'a IrContext,
        args: Vec<FormulaValue>,
    ) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
        self.run(ev, ctx, ir, args).boxed()
    }
}
