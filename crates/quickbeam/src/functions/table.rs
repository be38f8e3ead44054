//! Table functions
//!
//! Per-row expressions arrive as row lambdas and are forced once per row
//! with the row's fields in scope. Error rows never reach the lambda:
//! their error stands in for its result.

use futures_util::future::{BoxFuture, FutureExt};

use super::math::{average_values, extreme_values, sum_values};
use super::policy::{Accept, ReturnBehavior, TypeCheck};
use super::{
    arg, errors_among, lambda_arg, NoErrorHandling, RegistryBuilder, StandardErrorHandling,
    Target,
};
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue, RowOutcome, TableValue, ValueKind};

/// Rows `Sequence` may produce.
const MAX_SEQUENCE_ROWS: f64 = 50_000.0;

const TABLE: Accept = Accept::ExactOrBlank(ValueKind::Table);
const LAMBDA: Accept = Accept::ExactOrBlank(ValueKind::Lambda);

/// Aggregate over a table and a per-row expression.
fn aggregate(name: &'static str, target: Target) -> StandardErrorHandling {
    StandardErrorHandling::new(name, target)
        .types(TypeCheck::Sequence(vec![TABLE, LAMBDA]))
        .behavior(ReturnBehavior::ReturnBlankIfAnyArgIsBlank)
}

pub(crate) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .add(NoErrorHandling::new("Table", Target::Sync(table)))
        .add(aggregate("ForAll", Target::Async(for_all)))
        .add(aggregate("Filter", Target::Async(filter)))
        .add(aggregate("LookUp", Target::Async(look_up)))
        .add(aggregate("CountIf", Target::Async(count_if)))
        .add(aggregate("SumT", Target::Async(sum_t)))
        .add(aggregate("AverageT", Target::Async(average_t)))
        .add(aggregate("MaxT", Target::Async(max_t)))
        .add(aggregate("MinT", Target::Async(min_t)))
        .add(
            StandardErrorHandling::new("CountRows", Target::Sync(count_rows))
                .types(TypeCheck::Uniform(TABLE)),
        )
        .add(
            StandardErrorHandling::new("Count", Target::Sync(count))
                .types(TypeCheck::Uniform(TABLE)),
        )
        .add(
            StandardErrorHandling::new("CountA", Target::Sync(count_a))
                .types(TypeCheck::Uniform(TABLE)),
        )
        .add(
            StandardErrorHandling::new("First", Target::Sync(first))
                .types(TypeCheck::Uniform(TABLE))
                .behavior(ReturnBehavior::ReturnBlankIfAnyArgIsBlank),
        )
        .add(
            StandardErrorHandling::new("Last", Target::Sync(last))
                .types(TypeCheck::Uniform(TABLE))
                .behavior(ReturnBehavior::ReturnBlankIfAnyArgIsBlank),
        )
        .add(
            StandardErrorHandling::new("Sequence", Target::Sync(sequence))
                .types(TypeCheck::Uniform(Accept::Numeric))
                .behavior(ReturnBehavior::ReturnBlankIfAnyArgIsBlank),
        )
}

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

fn table_arg<'v>(args: &'v [FormulaValue], ir: &IrContext) -> Result<&'v TableValue, FormulaValue> {
    match arg(args, 0) {
        FormulaValue::Table(t) => Ok(t),
        _ => Err(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
    }
}

/// Force the row lambda at `args[1]` on every row.
async fn per_row(
    ev: &Evaluator,
    ctx: &EvalContext,
    function: &str,
    table: &TableValue,
    args: &[FormulaValue],
) -> Result<Vec<FormulaValue>, EvalError> {
    let body = lambda_arg(function, args, 1)?;
    let mut results = Vec::with_capacity(table.len());
    for row in table.rows() {
        ctx.check_cancelled()?;
        results.push(ev.force_in_row(body, ctx, row, table.row_type()).await?);
    }
    Ok(results)
}

/// Whether a predicate result selects its row. Errors are reported
/// separately.
fn selects(value: &FormulaValue) -> bool {
    value.as_bool().unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════════════════════════════

/// `Table(r1, r2, ...)`: records become rows, blanks blank rows and
/// errors error rows.
fn table(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let row_type = ir.result_type.row_type().cloned().unwrap_or_default();
    let mut rows = Vec::with_capacity(args.len());
    for a in args {
        rows.push(match a {
            FormulaValue::Record(r) => RowOutcome::Record(r.clone()),
            FormulaValue::Blank(_) => RowOutcome::Blank,
            FormulaValue::Error(e) => RowOutcome::Error(e.clone()),
            _ => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
        });
    }
    Ok(FormulaValue::Table(TableValue::new(row_type, rows)))
}

/// `ForAll(table, expression)`: one result per row.
fn for_all<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let source = match table_arg(&args, ir) {
            Ok(t) => t,
            Err(e) => return Ok(e),
        };
        let results = per_row(ev, ctx, "ForAll", source, &args).await?;
        if let Some(err) = errors_among(&results, ir) {
            return Ok(err);
        }
        if !results.is_empty() && results.iter().all(|v| matches!(v, FormulaValue::Void)) {
            return Ok(FormulaValue::Void);
        }
        let row_type = ir.result_type.row_type().cloned().unwrap_or_default();
        Ok(FormulaValue::Table(TableValue::from_results(row_type, results)))
    }
    .boxed()
}

/// `Filter(table, predicate)`
fn filter<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let source = match table_arg(&args, ir) {
            Ok(t) => t,
            Err(e) => return Ok(e),
        };
        let verdicts = per_row(ev, ctx, "Filter", source, &args).await?;
        if let Some(err) = errors_among(&verdicts, ir) {
            return Ok(err);
        }
        let rows: Vec<RowOutcome> = source
            .rows()
            .iter()
            .zip(&verdicts)
            .filter(|(_, v)| selects(v))
            .map(|(row, _)| row.clone())
            .collect();
        Ok(FormulaValue::Table(TableValue::new(source.row_type().clone(), rows)))
    }
    .boxed()
}

/// `LookUp(table, predicate)`: first selected row, or blank.
fn look_up<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let source = match table_arg(&args, ir) {
            Ok(t) => t,
            Err(e) => return Ok(e),
        };
        let body = lambda_arg("LookUp", &args, 1)?;
        for (i, row) in source.rows().iter().enumerate() {
            ctx.check_cancelled()?;
            match ev.force_in_row(body, ctx, row, source.row_type()).await? {
                FormulaValue::Error(e) => {
                    return Ok(FormulaValue::Error(e.with_type(ir.result_type.clone())))
                }
                v if selects(&v) => {
                    return Ok(source
                        .row(i)
                        .unwrap_or_else(|| FormulaValue::Blank(ir.result_type.clone())))
                }
                _ => {}
            }
        }
        Ok(FormulaValue::Blank(ir.result_type.clone()))
    }
    .boxed()
}

// ═══════════════════════════════════════════════════════════════════
// Aggregates
// ═══════════════════════════════════════════════════════════════════

fn count_if<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let source = match table_arg(&args, ir) {
            Ok(t) => t,
            Err(e) => return Ok(e),
        };
        let verdicts = per_row(ev, ctx, "CountIf", source, &args).await?;
        if let Some(err) = errors_among(&verdicts, ir) {
            return Ok(err);
        }
        Ok(FormulaValue::Number(
            verdicts.iter().filter(|v| selects(v)).count() as f64,
        ))
    }
    .boxed()
}

/// Shared body of the numeric aggregates: evaluate the expression for
/// every row, fail with the union of the row errors, then fold.
async fn numeric_aggregate(
    ev: &Evaluator,
    ctx: &EvalContext,
    ir: &IrContext,
    function: &str,
    args: &[FormulaValue],
    fold: fn(&IrContext, &[FormulaValue]) -> FormulaValue,
) -> Result<FormulaValue, EvalError> {
    let source = match table_arg(args, ir) {
        Ok(t) => t,
        Err(e) => return Ok(e),
    };
    let values = per_row(ev, ctx, function, source, args).await?;
    if let Some(err) = errors_among(&values, ir) {
        return Ok(err);
    }
    Ok(fold(ir, &values))
}

fn sum_t<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move { numeric_aggregate(ev, ctx, ir, "Sum", &args, |ir, v| sum_values(ir, v)).await }
        .boxed()
}

fn average_t<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        numeric_aggregate(ev, ctx, ir, "Average", &args, |ir, v| average_values(ir, v)).await
    }
    .boxed()
}

fn max_t<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        numeric_aggregate(ev, ctx, ir, "Max", &args, |ir, v| extreme_values(ir, v, true)).await
    }
    .boxed()
}

fn min_t<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        numeric_aggregate(ev, ctx, ir, "Min", &args, |ir, v| extreme_values(ir, v, false)).await
    }
    .boxed()
}

fn count_rows(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::Number(match arg(args, 0) {
        FormulaValue::Table(t) => t.len() as f64,
        _ => 0.0,
    }))
}

/// Single-column values of a table, error rows included.
fn column(args: &[FormulaValue]) -> Vec<FormulaValue> {
    match arg(args, 0) {
        FormulaValue::Table(t) => (0..t.len()).filter_map(|i| t.column_value(i)).collect(),
        _ => Vec::new(),
    }
}

/// `Count(column)`: numeric cells.
fn count(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let values = column(args);
    if let Some(err) = errors_among(&values, ir) {
        return Ok(err);
    }
    Ok(FormulaValue::Number(
        values.iter().filter(|v| v.is_numeric()).count() as f64,
    ))
}

/// `CountA(column)`: non-blank cells.
fn count_a(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let values = column(args);
    if let Some(err) = errors_among(&values, ir) {
        return Ok(err);
    }
    Ok(FormulaValue::Number(
        values.iter().filter(|v| !v.is_blank_or_empty()).count() as f64,
    ))
}

// ═══════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════

fn first(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(match arg(args, 0) {
        FormulaValue::Table(t) => t
            .row(0)
            .unwrap_or_else(|| FormulaValue::Blank(ir.result_type.clone())),
        _ => FormulaValue::Blank(ir.result_type.clone()),
    })
}

fn last(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(match arg(args, 0) {
        FormulaValue::Table(t) if !t.is_empty() => t
            .row(t.len() - 1)
            .unwrap_or_else(|| FormulaValue::Blank(ir.result_type.clone())),
        _ => FormulaValue::Blank(ir.result_type.clone()),
    })
}

/// `Sequence(records, [start = 1], [step = 1])`
fn sequence(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let records = arg(args, 0).as_f64().unwrap_or(0.0).trunc();
    let start = args.get(1).and_then(FormulaValue::as_f64).unwrap_or(1.0);
    let step = args.get(2).and_then(FormulaValue::as_f64).unwrap_or(1.0);
    if !(0.0..=MAX_SEQUENCE_ROWS).contains(&records) {
        return Ok(FormulaValue::Error(ErrorValue::argument_out_of_range(ir)));
    }
    let values = (0..records as usize).map(|i| FormulaValue::Number(start + step * i as f64));
    Ok(FormulaValue::Table(TableValue::single_column(
        FormulaType::Number,
        values,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, IrNode, Qualifier};
    use crate::value::{ErrorKind, RecordType};
    use pretty_assertions::assert_eq;

    fn eval(node: IrNode) -> FormulaValue {
        Evaluator::new()
            .eval_blocking(&node, &EvalContext::new())
            .unwrap()
    }

    fn numbers(values: &[f64]) -> IrNode {
        IrNode::literal(FormulaValue::number_table(values.iter().copied()))
    }

    fn value_row() -> RecordType {
        RecordType::new().with_field("Value", FormulaType::Number)
    }

    fn value() -> IrNode {
        IrNode::qualified("Value", Qualifier::ThisRow, FormulaType::Number)
    }

    fn per_row(body: IrNode) -> IrNode {
        IrNode::row_lambda(body, value_row(), None)
    }

    fn greater_than(n: f64) -> IrNode {
        per_row(IrNode::binary(
            BinaryOp::Gt,
            value(),
            IrNode::number(n),
            FormulaType::Boolean,
        ))
    }

    fn column_of(value: &FormulaValue) -> Vec<FormulaValue> {
        let table = value.as_table().unwrap();
        (0..table.len()).filter_map(|i| table.column_value(i)).collect()
    }

    #[test]
    fn test_for_all_maps_rows() {
        let node = IrNode::call(
            "ForAll",
            vec![
                numbers(&[1.0, 2.0, 3.0]),
                per_row(IrNode::binary(
                    BinaryOp::Mul,
                    value(),
                    IrNode::number(10.0),
                    FormulaType::Number,
                )),
            ],
            FormulaType::single_column_table(FormulaType::Number),
        );
        assert_eq!(
            column_of(&eval(node)),
            vec![
                FormulaValue::Number(10.0),
                FormulaValue::Number(20.0),
                FormulaValue::Number(30.0)
            ]
        );
    }

    #[test]
    fn test_for_all_row_error_fails_the_call() {
        let node = IrNode::call(
            "ForAll",
            vec![
                numbers(&[1.0, 0.0]),
                per_row(IrNode::binary(
                    BinaryOp::Div,
                    IrNode::number(1.0),
                    value(),
                    FormulaType::Number,
                )),
            ],
            FormulaType::single_column_table(FormulaType::Number),
        );
        let value = eval(node);
        assert_eq!(value.as_error().unwrap().first().kind, ErrorKind::DivideByZero);
    }

    #[test]
    fn test_filter_and_count_if() {
        let filtered = eval(IrNode::call(
            "Filter",
            vec![numbers(&[1.0, 5.0, 2.0, 7.0]), greater_than(2.0)],
            FormulaType::Table(value_row()),
        ));
        assert_eq!(
            column_of(&filtered),
            vec![FormulaValue::Number(5.0), FormulaValue::Number(7.0)]
        );
        let counted = eval(IrNode::call(
            "CountIf",
            vec![numbers(&[1.0, 5.0, 2.0, 7.0]), greater_than(2.0)],
            FormulaType::Number,
        ));
        assert_eq!(counted, FormulaValue::Number(2.0));
    }

    #[test]
    fn test_look_up_first_match_or_blank() {
        let found = eval(IrNode::call(
            "LookUp",
            vec![numbers(&[1.0, 5.0, 7.0]), greater_than(2.0)],
            FormulaType::Record(value_row()),
        ));
        assert_eq!(
            found.as_record().unwrap().field("Value"),
            FormulaValue::Number(5.0)
        );
        let missing = eval(IrNode::call(
            "LookUp",
            vec![numbers(&[1.0]), greater_than(2.0)],
            FormulaType::Record(value_row()),
        ));
        assert!(missing.is_blank());
    }

    #[test]
    fn test_sum_and_average_over_table() {
        let sum = eval(IrNode::call(
            "SumT",
            vec![numbers(&[1.0, 2.0, 3.5]), per_row(value())],
            FormulaType::Number,
        ));
        assert_eq!(sum, FormulaValue::Number(6.5));
        let average = eval(IrNode::call(
            "AverageT",
            vec![numbers(&[]), per_row(value())],
            FormulaType::Number,
        ));
        assert_eq!(
            average.as_error().unwrap().first().kind,
            ErrorKind::DivideByZero
        );
    }

    #[test]
    fn test_first_last_count_rows() {
        let first = eval(IrNode::call(
            "First",
            vec![numbers(&[4.0, 5.0])],
            FormulaType::Record(value_row()),
        ));
        assert_eq!(
            first.as_record().unwrap().field("Value"),
            FormulaValue::Number(4.0)
        );
        let last = eval(IrNode::call(
            "Last",
            vec![numbers(&[])],
            FormulaType::Record(value_row()),
        ));
        assert!(last.is_blank());
        let rows = eval(IrNode::call(
            "CountRows",
            vec![numbers(&[4.0, 5.0])],
            FormulaType::Number,
        ));
        assert_eq!(rows, FormulaValue::Number(2.0));
    }

    #[test]
    fn test_table_keeps_blank_and_error_rows() {
        let node = IrNode::call(
            "Table",
            vec![
                IrNode::record(vec![("Value", IrNode::number(1.0))]),
                IrNode::blank(FormulaType::Record(value_row())),
                IrNode::binary(
                    BinaryOp::Div,
                    IrNode::number(1.0),
                    IrNode::number(0.0),
                    FormulaType::Number,
                ),
            ],
            FormulaType::Table(value_row()),
        );
        let value = eval(node);
        let table = value.as_table().unwrap();
        assert_eq!(table.len(), 3);
        assert!(matches!(table.rows()[1], RowOutcome::Blank));
        assert_eq!(table.row_errors().count(), 1);
    }

    #[test]
    fn test_count_and_count_a() {
        let column = IrNode::literal(FormulaValue::Table(TableValue::single_column(
            FormulaType::String,
            vec![
                FormulaValue::string("a"),
                FormulaValue::string(""),
                FormulaValue::Blank(FormulaType::String),
            ],
        )));
        assert_eq!(
            eval(IrNode::call("CountA", vec![column], FormulaType::Number)),
            FormulaValue::Number(1.0)
        );
        assert_eq!(
            eval(IrNode::call("Count", vec![numbers(&[1.0, 2.0])], FormulaType::Number)),
            FormulaValue::Number(2.0)
        );
    }

    #[test]
    fn test_sequence_bounds() {
        let seq = eval(IrNode::call(
            "Sequence",
            vec![IrNode::number(3.0), IrNode::number(10.0), IrNode::number(5.0)],
            FormulaType::single_column_table(FormulaType::Number),
        ));
        assert_eq!(
            column_of(&seq),
            vec![
                FormulaValue::Number(10.0),
                FormulaValue::Number(15.0),
                FormulaValue::Number(20.0)
            ]
        );
        let too_many = eval(IrNode::call(
            "Sequence",
            vec![IrNode::number(50_001.0)],
            FormulaType::single_column_table(FormulaType::Number),
        ));
        assert_eq!(
            too_many.as_error().unwrap().first().kind,
            ErrorKind::ArgumentOutOfRange
        );
    }
}
