//! Logical and control-flow functions
//!
//! Branches arrive as lambdas and are forced only when control reaches
//! them, so `If`, `Switch`, `And`, `Or`, `Coalesce` and `IfError`
//! short-circuit.

use futures_util::future::{BoxFuture, FutureExt};
use rust_decimal::prelude::ToPrimitive;

use super::convert;
use super::policy::{BlankReplacement, ReturnBehavior};
use super::{
    arg, errors_or, lambda_arg, NoErrorHandling, RegistryBuilder, StandardErrorHandling, Target,
};
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::eval::{self, Evaluator};
use crate::ir::IrContext;
use crate::value::{
    ErrorKind, ErrorValue, ExpressionError, FormulaType, FormulaValue, RecordType, RecordValue,
    RowOutcome, TableValue, UntypedKind,
};

pub(crate) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .add(NoErrorHandling::new("If", Target::Async(if_)))
        .add(NoErrorHandling::new("IfError", Target::Async(if_error)))
        .add(NoErrorHandling::new("Switch", Target::Async(switch)))
        .add(NoErrorHandling::new("Coalesce", Target::Async(coalesce)))
        .add(NoErrorHandling::new("And", Target::Async(and)))
        .add(NoErrorHandling::new("Or", Target::Async(or)))
        .add(
            StandardErrorHandling::new("Not", Target::Sync(not))
                .blanks(BlankReplacement::All(FormulaValue::Boolean(false))),
        )
        .add(
            StandardErrorHandling::new("With", Target::Async(with))
                .behavior(ReturnBehavior::ReturnBlankIfAnyArgIsBlank),
        )
        .add(NoErrorHandling::new("Blank", Target::Sync(blank)))
        .add(StandardErrorHandling::new("IsBlank", Target::Sync(is_blank)))
        .add(NoErrorHandling::new("IsBlankOrError", Target::Sync(is_blank_or_error)))
        .add(StandardErrorHandling::new("IsEmpty", Target::Sync(is_empty)))
        .add(NoErrorHandling::new("IsError", Target::Sync(is_error)))
        .add(StandardErrorHandling::new("IsNumeric", Target::Sync(is_numeric)))
        .add(
            StandardErrorHandling::new("Error", Target::Sync(error))
                .behavior(ReturnBehavior::ReturnFalseIfAnyArgIsBlank),
        )
}

/// Condition value. Blank and anything without a boolean form is false.
fn truthy(value: &FormulaValue) -> bool {
    convert::to_boolean(value).unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════
// Branching
// ═══════════════════════════════════════════════════════════════════

/// `If(c1, r1, c2, r2, ..., [else])`
fn if_<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let last = args.len().saturating_sub(1);
        let mut i = 0;
        while i < last {
            ctx.check_cancelled()?;
            let condition = ev.force_arg(&args[i], ctx).await?;
            if let FormulaValue::Error(e) = condition {
                return Ok(FormulaValue::Error(e.with_type(ir.result_type.clone())));
            }
            if truthy(&condition) {
                return ev.force_arg(&args[i + 1], ctx).await;
            }
            if i + 2 == last {
                return ev.force_arg(&args[last], ctx).await;
            }
            i += 2;
        }
        Ok(FormulaValue::Blank(ir.result_type.clone()))
    }
    .boxed()
}

fn error_record_type() -> RecordType {
    RecordType::new()
        .with_field("Kind", FormulaType::Number)
        .with_field("Message", FormulaType::String)
}

fn error_record(error: &ExpressionError) -> RecordValue {
    let message = match &error.message {
        Some(m) => FormulaValue::string(m),
        None => FormulaValue::Blank(FormulaType::String),
    };
    RecordValue::new(error_record_type())
        .with_field("Kind", FormulaValue::Number(f64::from(error.kind.code())))
        .with_field("Message", message)
}

/// Row visible to an `IfError` handler: `FirstError` and `AllErrors`.
fn error_scope(err: &ErrorValue) -> RecordValue {
    let all = TableValue::from_records(
        error_record_type(),
        err.errors().iter().map(error_record),
    );
    RecordValue::from_fields([
        ("FirstError", FormulaValue::Record(error_record(err.first()))),
        ("AllErrors", FormulaValue::Table(all)),
    ])
}

/// `IfError(v1, fallback1, v2, fallback2, ..., [else])`
fn if_error<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let last = args.len().saturating_sub(1);
        let mut i = 0;
        while i < last {
            ctx.check_cancelled()?;
            let value = ev.force_arg(&args[i], ctx).await?;
            if let FormulaValue::Error(err) = &value {
                log::trace!("IfError: handling {} error(s)", err.errors().len());
                let scope = error_scope(err);
                let row_type = scope.ty().clone();
                return match &args[i + 1] {
                    FormulaValue::Lambda(handler) => {
                        ev.force_in_row(handler, ctx, &RowOutcome::Record(scope), &row_type)
                            .await
                    }
                    other => Ok(other.clone()),
                };
            }
            if i + 1 == last {
                return Ok(value);
            }
            if i + 2 == last {
                return ev.force_arg(&args[last], ctx).await;
            }
            i += 2;
        }
        Ok(FormulaValue::Blank(ir.result_type.clone()))
    }
    .boxed()
}

/// `Switch(subject, m1, r1, m2, r2, ..., [default])`
///
/// Errors raised by the subject or by match values evaluated on the way
/// are surfaced even when a later match succeeds.
fn switch<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let mut errors = Vec::new();
        let subject = ev.force_arg(arg(&args, 0), ctx).await?;
        if let FormulaValue::Error(e) = &subject {
            errors.push(e.clone());
        }

        let mut i = 1;
        while i + 1 < args.len() {
            ctx.check_cancelled()?;
            let candidate = ev.force_arg(&args[i], ctx).await?;
            if let FormulaValue::Error(e) = candidate {
                errors.push(e);
            } else if !subject.is_error() {
                match eval::equals(&subject, &candidate, ir, ctx) {
                    Ok(true) => {
                        let result = ev.force_arg(&args[i + 1], ctx).await?;
                        return Ok(errors_or(&errors, result, ir));
                    }
                    Ok(false) => {}
                    Err(e) => errors.push(e),
                }
            }
            i += 2;
        }

        let has_default = args.len() >= 4 && args.len() % 2 == 0;
        let fallback = if has_default {
            ev.force_arg(&args[args.len() - 1], ctx).await?
        } else {
            FormulaValue::Blank(ir.result_type.clone())
        };
        Ok(errors_or(&errors, fallback, ir))
    }
    .boxed()
}

/// `Coalesce(v1, v2, ...)`: first value that is neither blank, empty nor
/// an error. With none, the union of the errors seen, else blank.
fn coalesce<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let mut errors = Vec::new();
        for a in &args {
            ctx.check_cancelled()?;
            match ev.force_arg(a, ctx).await? {
                FormulaValue::Error(e) => errors.push(e),
                v if v.is_blank_or_empty() => {}
                v => return Ok(v),
            }
        }
        Ok(errors_or(&errors, FormulaValue::Blank(ir.result_type.clone()), ir))
    }
    .boxed()
}

fn and<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    _ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        for a in &args {
            ctx.check_cancelled()?;
            let value = ev.force_arg(a, ctx).await?;
            if value.is_error() {
                return Ok(value);
            }
            if !truthy(&value) {
                return Ok(FormulaValue::Boolean(false));
            }
        }
        Ok(FormulaValue::Boolean(true))
    }
    .boxed()
}

fn or<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    _ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        for a in &args {
            ctx.check_cancelled()?;
            let value = ev.force_arg(a, ctx).await?;
            if value.is_error() {
                return Ok(value);
            }
            if truthy(&value) {
                return Ok(FormulaValue::Boolean(true));
            }
        }
        Ok(FormulaValue::Boolean(false))
    }
    .boxed()
}

fn not(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(match convert::to_boolean(arg(args, 0)) {
        Some(b) => FormulaValue::Boolean(!b),
        None => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    })
}

/// `With(record, body)`: evaluate `body` with the record's fields in scope.
fn with<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let body = lambda_arg("With", &args, 1)?;
        let Some(record) = arg(&args, 0).as_record() else {
            return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)));
        };
        let row_type = record.ty().clone();
        ev.force_in_row(body, ctx, &RowOutcome::Record(record.clone()), &row_type)
            .await
    }
    .boxed()
}

// ═══════════════════════════════════════════════════════════════════
// Predicates
// ═══════════════════════════════════════════════════════════════════

fn blank(_: &EvalContext, ir: &IrContext, _: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::Blank(ir.result_type.clone()))
}

fn is_blank(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let blank = match arg(args, 0) {
        FormulaValue::Blank(_) => true,
        FormulaValue::String(s) => s.is_empty(),
        FormulaValue::UntypedObject(obj) => match obj.kind() {
            UntypedKind::Null => true,
            UntypedKind::String => obj.as_string().is_some_and(|s| s.is_empty()),
            _ => false,
        },
        _ => false,
    };
    Ok(FormulaValue::Boolean(blank))
}

fn is_blank_or_error(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let value = arg(args, 0);
    Ok(FormulaValue::Boolean(value.is_blank() || value.is_error()))
}

fn is_error(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::Boolean(arg(args, 0).is_error()))
}

fn is_empty(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(match arg(args, 0) {
        FormulaValue::Blank(_) => FormulaValue::Boolean(true),
        FormulaValue::Table(t) => FormulaValue::Boolean(t.is_empty()),
        _ => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    })
}

fn is_numeric(
    ctx: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let numeric = match arg(args, 0) {
        FormulaValue::Number(_)
        | FormulaValue::Decimal(_)
        | FormulaValue::Date(_)
        | FormulaValue::DateTime(_)
        | FormulaValue::Time(_) => true,
        FormulaValue::String(s) => convert::parse_number(s, ctx.culture()).is_some(),
        _ => false,
    };
    Ok(FormulaValue::Boolean(numeric))
}

// ═══════════════════════════════════════════════════════════════════
// Error()
// ═══════════════════════════════════════════════════════════════════

fn kind_from_name(name: &str) -> Option<ErrorKind> {
    let kind = match name {
        "RuntimeTypeMismatch" => ErrorKind::RuntimeTypeMismatch,
        "Unknown" => ErrorKind::Unknown,
        "Div0" | "DivideByZero" => ErrorKind::DivideByZero,
        "BadLanguageCode" => ErrorKind::BadLanguageCode,
        "InvalidFunctionUsage" => ErrorKind::InvalidFunctionUsage,
        "NotSupported" => ErrorKind::NotSupported,
        "InsufficientMemory" => ErrorKind::InsufficientMemory,
        "Numeric" => ErrorKind::Numeric,
        "InvalidArgument" => ErrorKind::InvalidArgument,
        "Internal" => ErrorKind::Internal,
        "NotApplicable" => ErrorKind::NotApplicable,
        "ArgumentOutOfRange" => ErrorKind::ArgumentOutOfRange,
        "CallDepthExceeded" => ErrorKind::CallDepthExceeded,
        "Custom" => ErrorKind::Custom,
        _ => return None,
    };
    Some(kind)
}

/// `Error(record | table of records | text)`
fn error(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let records: Vec<RecordValue> = match arg(args, 0) {
        FormulaValue::Record(r) => vec![r.clone()],
        FormulaValue::Table(t) => t
            .rows()
            .iter()
            .filter_map(|row| match row {
                RowOutcome::Record(r) => Some(r.clone()),
                _ => None,
            })
            .collect(),
        FormulaValue::String(s) => {
            return Ok(FormulaValue::Error(ErrorValue::at_with_message(
                ir,
                ErrorKind::Custom,
                s.to_string(),
            )))
        }
        _ => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
    };

    let mut errors = Vec::with_capacity(records.len());
    for record in records {
        let kind = match record.field("Kind") {
            FormulaValue::Error(e) => {
                return Ok(FormulaValue::Error(e.with_type(ir.result_type.clone())))
            }
            FormulaValue::Number(n) if n >= 0.0 => ErrorKind::from_code(n as u32),
            FormulaValue::Decimal(d) => d.to_u32().and_then(ErrorKind::from_code),
            FormulaValue::OptionSet(o) => kind_from_name(&o.logical_name),
            FormulaValue::Number(_) | FormulaValue::Blank(_) => None,
            _ => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
        }
        .unwrap_or(ErrorKind::Custom);
        let mut error = ExpressionError::new(kind).with_span(ir.span);
        if let FormulaValue::String(message) = record.field("Message") {
            error = error.with_message(message.to_string());
        }
        errors.push(error);
    }
    Ok(match ErrorValue::from_errors(ir.result_type.clone(), errors) {
        Some(err) => FormulaValue::Error(err),
        None => FormulaValue::Blank(ir.result_type.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, IrNode, Qualifier};
    use pretty_assertions::assert_eq;

    fn eval(node: IrNode) -> FormulaValue {
        Evaluator::new()
            .eval_blocking(&node, &EvalContext::new())
            .unwrap()
    }

    fn lazy(node: IrNode) -> IrNode {
        IrNode::lambda(node)
    }

    /// Fails the whole evaluation if it is ever evaluated.
    fn poison() -> IrNode {
        IrNode::call("NoSuchFunction", vec![], FormulaType::Number)
    }

    fn divide_by_zero() -> IrNode {
        IrNode::binary(
            BinaryOp::Div,
            IrNode::number(1.0),
            IrNode::number(0.0),
            FormulaType::Number,
        )
    }

    #[test]
    fn test_if_stops_at_first_true_branch() {
        let node = IrNode::call(
            "If",
            vec![
                lazy(IrNode::literal(true)),
                lazy(IrNode::number(1.0)),
                lazy(poison()),
            ],
            FormulaType::Number,
        );
        assert_eq!(eval(node), FormulaValue::Number(1.0));
    }

    #[test]
    fn test_if_without_else_is_blank() {
        let node = IrNode::call(
            "If",
            vec![lazy(IrNode::literal(false)), lazy(poison())],
            FormulaType::Number,
        );
        assert_eq!(eval(node), FormulaValue::Blank(FormulaType::Number));
    }

    #[test]
    fn test_if_error_condition_propagates() {
        let node = IrNode::call(
            "If",
            vec![lazy(divide_by_zero()), lazy(poison()), lazy(poison())],
            FormulaType::Number,
        );
        let value = eval(node);
        assert_eq!(value.as_error().unwrap().first().kind, ErrorKind::DivideByZero);
    }

    #[test]
    fn test_switch_default_and_no_match() {
        let call = |default: bool| {
            let mut args = vec![
                lazy(IrNode::number(3.0)),
                lazy(IrNode::number(1.0)),
                lazy(IrNode::text("one")),
            ];
            if default {
                args.push(lazy(IrNode::text("other")));
            }
            IrNode::call("Switch", args, FormulaType::String)
        };
        assert_eq!(eval(call(true)), FormulaValue::string("other"));
        assert_eq!(eval(call(false)), FormulaValue::Blank(FormulaType::String));
    }

    #[test]
    fn test_coalesce_skips_blank_and_empty() {
        let node = IrNode::call(
            "Coalesce",
            vec![
                lazy(IrNode::blank(FormulaType::String)),
                lazy(IrNode::text("")),
                lazy(IrNode::text("x")),
                lazy(poison()),
            ],
            FormulaType::String,
        );
        assert_eq!(eval(node), FormulaValue::string("x"));
    }

    #[test]
    fn test_and_or_short_circuit() {
        let and = IrNode::call(
            "And",
            vec![lazy(IrNode::literal(false)), lazy(poison())],
            FormulaType::Boolean,
        );
        assert_eq!(eval(and), FormulaValue::Boolean(false));
        let or = IrNode::call(
            "Or",
            vec![lazy(IrNode::blank(FormulaType::Boolean)), lazy(IrNode::literal(true))],
            FormulaType::Boolean,
        );
        assert_eq!(eval(or), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_not_treats_blank_as_false() {
        let node = IrNode::call(
            "Not",
            vec![IrNode::blank(FormulaType::Boolean)],
            FormulaType::Boolean,
        );
        assert_eq!(eval(node), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_with_exposes_record_fields() {
        let row = RecordType::new().with_field("x", FormulaType::Number);
        let body = IrNode::binary(
            BinaryOp::Mul,
            IrNode::qualified("x", Qualifier::ThisRow, FormulaType::Number),
            IrNode::number(2.0),
            FormulaType::Number,
        );
        let node = IrNode::call(
            "With",
            vec![
                IrNode::record(vec![("x", IrNode::number(21.0))]),
                IrNode::row_lambda(body, row, None),
            ],
            FormulaType::Number,
        );
        assert_eq!(eval(node), FormulaValue::Number(42.0));
    }

    #[test]
    fn test_is_blank_family() {
        let call = |f: &str, a: IrNode| eval(IrNode::call(f, vec![a], FormulaType::Boolean));
        assert_eq!(call("IsBlank", IrNode::text("")), FormulaValue::Boolean(true));
        assert_eq!(call("IsBlank", IrNode::number(0.0)), FormulaValue::Boolean(false));
        assert_eq!(call("IsError", divide_by_zero()), FormulaValue::Boolean(true));
        assert_eq!(
            call("IsBlankOrError", IrNode::blank(FormulaType::Number)),
            FormulaValue::Boolean(true)
        );
        assert_eq!(call("IsNumeric", IrNode::text("12.5")), FormulaValue::Boolean(true));
        assert_eq!(call("IsNumeric", IrNode::text("abc")), FormulaValue::Boolean(false));
        assert_eq!(
            call("IsEmpty", IrNode::table(vec![], FormulaType::Number)),
            FormulaValue::Boolean(true)
        );
    }

    #[test]
    fn test_error_from_record_and_text() {
        let record = IrNode::record(vec![
            ("Kind", IrNode::number(25.0)),
            ("Message", IrNode::text("bad input")),
        ]);
        let value = eval(IrNode::call("Error", vec![record], FormulaType::Number));
        let err = value.as_error().unwrap();
        assert_eq!(err.first().kind, ErrorKind::InvalidArgument);
        assert_eq!(err.first().message.as_deref(), Some("bad input"));

        let value = eval(IrNode::call("Error", vec![IrNode::text("boom")], FormulaType::Number));
        assert_eq!(value.as_error().unwrap().first().kind, ErrorKind::Custom);
    }

    #[test]
    fn test_error_kind_must_be_a_code() {
        let record = IrNode::record(vec![("Kind", IrNode::text("DivideByZero"))]);
        let value = eval(IrNode::call("Error", vec![record], FormulaType::Number));
        assert_eq!(
            value.as_error().unwrap().first().kind,
            ErrorKind::RuntimeTypeMismatch
        );

        let record = IrNode::record(vec![("Message", IrNode::text("no kind"))]);
        let value = eval(IrNode::call("Error", vec![record], FormulaType::Number));
        assert_eq!(value.as_error().unwrap().first().kind, ErrorKind::Custom);
    }

    #[test]
    fn test_error_of_blank_is_false() {
        let value = eval(IrNode::call(
            "Error",
            vec![IrNode::blank(FormulaType::String)],
            FormulaType::Boolean,
        ));
        assert_eq!(value, FormulaValue::Boolean(false));
    }
}
