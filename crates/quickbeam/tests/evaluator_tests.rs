use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use pretty_assertions::assert_eq;
use quickbeam::*;

fn eval(node: IrNode) -> FormulaValue {
    Evaluator::new()
        .eval_blocking(&node, &EvalContext::new())
        .unwrap()
}

fn lazy(node: IrNode) -> IrNode {
    IrNode::lambda(node)
}

/// Aborts the evaluation with a host error if it is ever reached.
fn poison() -> IrNode {
    IrNode::call("NotARealFunction", vec![], FormulaType::Number)
}

fn divide_by_zero() -> IrNode {
    IrNode::binary(
        BinaryOp::Div,
        IrNode::number(1.0),
        IrNode::number(0.0),
        FormulaType::Number,
    )
}

fn numbers(values: &[f64]) -> IrNode {
    IrNode::literal(FormulaValue::number_table(values.iter().copied()))
}

fn strings(values: &[&str]) -> IrNode {
    IrNode::literal(FormulaValue::Table(TableValue::single_column(
        FormulaType::String,
        values.iter().map(FormulaValue::string),
    )))
}

fn column_of(value: &FormulaValue) -> Vec<FormulaValue> {
    let table = value.as_table().expect("table result");
    (0..table.len()).filter_map(|i| table.column_value(i)).collect()
}

fn value_row() -> RecordType {
    RecordType::new().with_field("Value", FormulaType::Number)
}

fn kind(value: &FormulaValue) -> ErrorKind {
    value.as_error().expect("error value").first().kind
}

// ═══════════════════════════════════════════════════════════════════════
// Blank Handling
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_blank_stays_blank_until_arithmetic() {
    let blank = IrNode::call("Blank", vec![], FormulaType::Number);
    assert!(eval(blank.clone()).is_blank());

    let plus_one = IrNode::binary(BinaryOp::Add, blank, IrNode::number(1.0), FormulaType::Number);
    assert_eq!(eval(plus_one), FormulaValue::Number(1.0));
}

// ═══════════════════════════════════════════════════════════════════════
// Switch
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_switch_stops_at_first_match() {
    let node = IrNode::call(
        "Switch",
        vec![
            lazy(IrNode::number(1.0)),
            lazy(IrNode::number(1.0)),
            lazy(IrNode::text("one")),
            lazy(poison()),
            lazy(poison()),
            lazy(poison()),
        ],
        FormulaType::String,
    );
    assert_eq!(eval(node), FormulaValue::string("one"));
}

#[test]
fn test_switch_without_match_or_default_is_blank() {
    let node = IrNode::call(
        "Switch",
        vec![
            lazy(IrNode::number(5.0)),
            lazy(IrNode::number(1.0)),
            lazy(IrNode::text("one")),
            lazy(IrNode::number(2.0)),
            lazy(IrNode::text("two")),
        ],
        FormulaType::String,
    );
    assert_eq!(eval(node), FormulaValue::Blank(FormulaType::String));
}

#[test]
fn test_switch_surfaces_earlier_match_errors() {
    let node = IrNode::call(
        "Switch",
        vec![
            lazy(IrNode::number(2.0)),
            lazy(divide_by_zero()),
            lazy(IrNode::text("never")),
            lazy(IrNode::number(2.0)),
            lazy(IrNode::text("two")),
        ],
        FormulaType::String,
    );
    assert_eq!(kind(&eval(node)), ErrorKind::DivideByZero);
}

// ═══════════════════════════════════════════════════════════════════════
// IfError
// ═══════════════════════════════════════════════════════════════════════

fn error_row() -> RecordType {
    RecordType::new()
        .with_field("Kind", FormulaType::Number)
        .with_field("Message", FormulaType::String)
}

fn handler_row() -> RecordType {
    RecordType::new()
        .with_field("FirstError", FormulaType::Record(error_row()))
        .with_field("AllErrors", FormulaType::Table(error_row()))
}

#[test]
fn test_if_error_exposes_first_error() {
    let first = IrNode::qualified(
        "FirstError",
        Qualifier::ThisRow,
        FormulaType::Record(error_row()),
    );
    let kind_field = IrNode::new(
        IrKind::Field {
            source: Box::new(first),
            field: Arc::from("Kind"),
        },
        IrContext::new(FormulaType::Number),
    );
    let node = IrNode::call(
        "IfError",
        vec![
            lazy(divide_by_zero()),
            IrNode::row_lambda(kind_field, handler_row(), None),
        ],
        FormulaType::Number,
    );
    assert_eq!(
        eval(node),
        FormulaValue::Number(f64::from(ErrorKind::DivideByZero.code()))
    );
}

#[test]
fn test_if_error_counts_all_errors() {
    let both = IrNode::binary(
        BinaryOp::Add,
        divide_by_zero(),
        IrNode::call("Sqrt", vec![IrNode::number(-1.0)], FormulaType::Number),
        FormulaType::Number,
    );
    let all = IrNode::qualified("AllErrors", Qualifier::ThisRow, FormulaType::Table(error_row()));
    let node = IrNode::call(
        "IfError",
        vec![
            lazy(both),
            IrNode::row_lambda(
                IrNode::call("CountRows", vec![all], FormulaType::Number),
                handler_row(),
                None,
            ),
        ],
        FormulaType::Number,
    );
    assert_eq!(eval(node), FormulaValue::Number(2.0));
}

#[test]
fn test_if_error_passes_values_through() {
    let node = IrNode::call(
        "IfError",
        vec![lazy(IrNode::number(5.0)), lazy(poison())],
        FormulaType::Number,
    );
    assert_eq!(eval(node), FormulaValue::Number(5.0));
}

// ═══════════════════════════════════════════════════════════════════════
// Row Scopes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_alias_reaches_outer_row() {
    // ForAll([1, 2] As o, SumT([10, 20], o.Value + Value))
    let outer = IrNode::qualified(
        "Value",
        Qualifier::Alias(Arc::from("o")),
        FormulaType::Number,
    );
    let inner = IrNode::qualified("Value", Qualifier::ThisRow, FormulaType::Number);
    let sum = IrNode::call(
        "SumT",
        vec![
            numbers(&[10.0, 20.0]),
            IrNode::row_lambda(
                IrNode::binary(BinaryOp::Add, outer, inner, FormulaType::Number),
                value_row(),
                None,
            ),
        ],
        FormulaType::Number,
    );
    let node = IrNode::call(
        "ForAll",
        vec![numbers(&[1.0, 2.0]), IrNode::row_lambda(sum, value_row(), Some("o"))],
        FormulaType::single_column_table(FormulaType::Number),
    );
    assert_eq!(
        column_of(&eval(node)),
        vec![FormulaValue::Number(32.0), FormulaValue::Number(34.0)]
    );
}

#[test]
fn test_filter_reads_row_fields() {
    let keep = IrNode::row_lambda(
        IrNode::binary(
            BinaryOp::Gt,
            IrNode::name("Value", FormulaType::Number),
            IrNode::number(1.5),
            FormulaType::Boolean,
        ),
        value_row(),
        None,
    );
    let node = IrNode::call(
        "Filter",
        vec![numbers(&[1.0, 2.0, 3.0]), keep],
        FormulaType::Table(value_row()),
    );
    assert_eq!(
        column_of(&eval(node)),
        vec![FormulaValue::Number(2.0), FormulaValue::Number(3.0)]
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Row Errors
// ═══════════════════════════════════════════════════════════════════════

fn text_row() -> RecordType {
    RecordType::new().with_field("Value", FormulaType::String)
}

/// `Error(ThisRow.Value)`, typed as `ty`.
fn raise_row_value(ty: FormulaType) -> IrNode {
    IrNode::row_lambda(
        IrNode::call(
            "Error",
            vec![IrNode::qualified("Value", Qualifier::ThisRow, FormulaType::String)],
            ty,
        ),
        text_row(),
        None,
    )
}

fn messages(value: &FormulaValue) -> Vec<String> {
    value
        .as_error()
        .expect("error value")
        .errors()
        .iter()
        .filter_map(|e| e.message.clone())
        .collect()
}

#[test]
fn test_for_all_unions_every_row_error() {
    let node = IrNode::call(
        "ForAll",
        vec![strings(&["a", "b"]), raise_row_value(FormulaType::String)],
        FormulaType::single_column_table(FormulaType::String),
    );
    assert_eq!(messages(&eval(node)), vec!["a", "b"]);
}

#[test]
fn test_filter_unions_every_row_error() {
    let node = IrNode::call(
        "Filter",
        vec![strings(&["a", "b", "c"]), raise_row_value(FormulaType::Boolean)],
        FormulaType::Table(text_row()),
    );
    assert_eq!(messages(&eval(node)), vec!["a", "b", "c"]);
}

#[test]
fn test_concat_evaluates_every_row_before_failing() {
    let node = IrNode::call(
        "Concat",
        vec![strings(&["a", "b"]), raise_row_value(FormulaType::String)],
        FormulaType::String,
    );
    let value = eval(node);
    assert_eq!(value.as_error().unwrap().errors().len(), 2);
    assert_eq!(messages(&value), vec!["a", "b"]);
}

#[test]
fn test_sum_unions_every_row_error() {
    let per_row = IrNode::row_lambda(
        IrNode::binary(
            BinaryOp::Div,
            IrNode::qualified("Value", Qualifier::ThisRow, FormulaType::Number),
            IrNode::number(0.0),
            FormulaType::Number,
        ),
        value_row(),
        None,
    );
    let node = IrNode::call(
        "SumT",
        vec![numbers(&[1.0, 2.0]), per_row],
        FormulaType::Number,
    );
    let value = eval(node);
    let kinds: Vec<_> = value.as_error().unwrap().errors().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::DivideByZero, ErrorKind::DivideByZero]);
}

#[test]
fn test_count_unions_error_rows() {
    let failed = |message: &str| {
        FormulaValue::error(
            FormulaType::Number,
            ExpressionError::new(ErrorKind::Custom).with_message(message),
        )
    };
    let column = TableValue::single_column(
        FormulaType::Number,
        [failed("x"), FormulaValue::Number(1.0), failed("y")],
    );
    for function in ["Count", "CountA"] {
        let node = IrNode::call(
            function,
            vec![IrNode::literal(FormulaValue::Table(column.clone()))],
            FormulaType::Number,
        );
        assert_eq!(messages(&eval(node)), vec!["x", "y"], "{function}");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tabular Overloads
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_single_table_broadcast() {
    let node = IrNode::call(
        "AbsT",
        vec![numbers(&[-1.0, 2.0, -3.5])],
        FormulaType::single_column_table(FormulaType::Number),
    );
    assert_eq!(
        column_of(&eval(node)),
        vec![
            FormulaValue::Number(1.0),
            FormulaValue::Number(2.0),
            FormulaValue::Number(3.5)
        ]
    );
}

#[test]
fn test_multi_table_broadcast_zips_and_pads() {
    let node = IrNode::call(
        "LeftT",
        vec![strings(&["abc", "de", "fgh"]), numbers(&[1.0, 2.0])],
        FormulaType::single_column_table(FormulaType::String),
    );
    // The third row reads a blank count, replaced by zero
    assert_eq!(
        column_of(&eval(node)),
        vec![
            FormulaValue::string("a"),
            FormulaValue::string("de"),
            FormulaValue::string("")
        ]
    );
}

#[test]
fn test_multi_table_broadcasts_scalars() {
    let node = IrNode::call(
        "MidT",
        vec![strings(&["hello", "world"]), IrNode::number(2.0), IrNode::number(3.0)],
        FormulaType::single_column_table(FormulaType::String),
    );
    assert_eq!(
        column_of(&eval(node)),
        vec![FormulaValue::string("ell"), FormulaValue::string("orl")]
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Globals
// ═══════════════════════════════════════════════════════════════════════

fn with_rate(table: &Arc<SymbolTable>) -> Evaluator {
    Evaluator::new().with_globals(ScopeStore::new(table.clone()))
}

fn rate() -> IrNode {
    IrNode::name("Rate", FormulaType::Number)
}

#[test]
fn test_global_read() {
    let table = Arc::new(SymbolTable::new("host"));
    let slot = table.add_slot("Rate", FormulaType::Number).unwrap();
    table.set(&slot, FormulaValue::Number(0.5)).unwrap();
    let value = with_rate(&table)
        .eval_blocking(&rate(), &EvalContext::new())
        .unwrap();
    assert_eq!(value, FormulaValue::Number(0.5));
}

#[test]
fn test_removed_slot_is_a_host_error() {
    let table = Arc::new(SymbolTable::new("host"));
    let slot = table.add_slot("Rate", FormulaType::Number).unwrap();
    table.set(&slot, FormulaValue::Number(0.5)).unwrap();
    table.remove_slot("Rate");
    let err = with_rate(&table)
        .eval_blocking(&rate(), &EvalContext::new())
        .unwrap_err();
    assert!(matches!(err, EvalError::StaleSlot { .. }));
}

#[test]
fn test_retyped_slot_is_a_host_error() {
    let table = Arc::new(SymbolTable::new("host"));
    table.add_slot("Rate", FormulaType::String).unwrap();
    let err = with_rate(&table)
        .eval_blocking(&rate(), &EvalContext::new())
        .unwrap_err();
    assert!(matches!(err, EvalError::SlotTypeChanged { .. }));
}

#[test]
fn test_layered_tables_shadow() {
    let base = Arc::new(SymbolTable::new("base"));
    let top = Arc::new(SymbolTable::new("top"));
    let low = base.add_slot("Rate", FormulaType::Number).unwrap();
    base.set(&low, FormulaValue::Number(1.0)).unwrap();
    let high = top.add_slot("Rate", FormulaType::Number).unwrap();
    top.set(&high, FormulaValue::Number(2.0)).unwrap();

    let composed = ComposedSymbolTable::new()
        .with_layer(base)
        .with_layer(top);
    let ev = Evaluator::new().with_globals(ScopeStore::new(Arc::new(composed)));
    assert_eq!(
        ev.eval_blocking(&rate(), &EvalContext::new()).unwrap(),
        FormulaValue::Number(2.0)
    );
}

#[test]
fn test_set_without_sink_fails() {
    let err = Evaluator::new()
        .eval_blocking(&IrNode::set("x", IrNode::number(1.0)), &EvalContext::new())
        .unwrap_err();
    assert!(matches!(err, EvalError::Assignment(_)));
}

// ═══════════════════════════════════════════════════════════════════════
// Diagnostics and Cancellation
// ═══════════════════════════════════════════════════════════════════════

fn mismatched_comparison() -> IrNode {
    IrNode::binary(
        BinaryOp::Eq,
        IrNode::number(1.0),
        IrNode::text("1"),
        FormulaType::Boolean,
    )
}

#[tokio::test]
async fn test_mismatched_comparison_is_a_warning() {
    let ev = Evaluator::new();
    let evaluated = ev
        .eval_with_diagnostics(&mismatched_comparison(), &EvalContext::new())
        .await
        .unwrap();
    assert_eq!(evaluated.value, FormulaValue::Boolean(false));
    assert_eq!(evaluated.warnings.len(), 1);
    assert_eq!(evaluated.warnings[0].kind, ErrorKind::InvalidArgument);
}

#[test]
fn test_strict_comparison_is_an_error() {
    let config = RuntimeConfig::default().with_features(Features {
        strict_type_comparison: true,
        ..Features::default()
    });
    let ctx = EvalContext::from_config(
        &config,
        Arc::new(ServiceRegistry::new()),
        CancellationToken::new(),
    );
    let value = Evaluator::new()
        .eval_blocking(&mismatched_comparison(), &ctx)
        .unwrap();
    assert_eq!(kind(&value), ErrorKind::InvalidArgument);
}

#[test]
fn test_cancelled_context_aborts() {
    let ctx = EvalContext::new();
    ctx.cancellation().cancel();
    let err = Evaluator::new()
        .eval_blocking(&IrNode::number(1.0), &ctx)
        .unwrap_err();
    assert!(matches!(err, EvalError::Cancelled));
}

/// Random service that waits on a tokio timer before answering.
struct TimedRandom;

impl RandomService for TimedRandom {
    fn next_f64(&self) -> BoxFuture<'_, f64> {
        async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            0.25
        }
        .boxed()
    }
}

#[test]
fn test_blocking_eval_drives_timer_services() {
    let services = ServiceRegistry::new().with(Arc::new(TimedRandom) as Arc<dyn RandomService>);
    let ctx = EvalContext::from_config(
        &RuntimeConfig::default(),
        Arc::new(services),
        CancellationToken::new(),
    );
    let node = IrNode::call("Rand", vec![], FormulaType::Number);
    let value = Evaluator::new().eval_blocking(&node, &ctx).unwrap();
    assert_eq!(value, FormulaValue::Number(0.25));
}
