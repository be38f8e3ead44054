//! Binary and unary operators, implicit coercions

use chrono::Duration;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::context::EvalContext;
use crate::functions::convert;
use crate::ir::{BinaryOp, Coercion, IrContext, UnaryOp};
use crate::value::{ErrorKind, ErrorValue, ExpressionError, FormulaType, FormulaValue};

fn error(err: ErrorValue) -> FormulaValue {
    FormulaValue::Error(err)
}

// ═══════════════════════════════════════════════════════════════════
// Binary
// ═══════════════════════════════════════════════════════════════════

/// Apply a binary operator to evaluated operands.
pub(super) fn binary(
    op: BinaryOp,
    left: FormulaValue,
    right: FormulaValue,
    ir: &IrContext,
    ctx: &EvalContext,
) -> FormulaValue {
    if let Some(err) = ErrorValue::combine(
        ir.result_type.clone(),
        [&left, &right].into_iter().filter_map(FormulaValue::as_error),
    ) {
        return error(err);
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            arithmetic(op, &left, &right, ir)
        }
        BinaryOp::Concat => concat(&left, &right, ir, ctx),
        BinaryOp::Eq | BinaryOp::NotEq => match equals(&left, &right, ir, ctx) {
            Ok(eq) => FormulaValue::Boolean(eq == (op == BinaryOp::Eq)),
            Err(err) => error(err),
        },
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            compare(op, &left, &right, ir)
        }
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &FormulaValue,
    right: &FormulaValue,
    ir: &IrContext,
) -> FormulaValue {
    if let Some(result) = temporal(op, left, right, ir) {
        return result;
    }

    let decimal = |v: &FormulaValue| match v {
        FormulaValue::Decimal(d) => Some(*d),
        FormulaValue::Blank(_) => Some(Decimal::ZERO),
        _ => None,
    };
    let is_decimal =
        matches!(left, FormulaValue::Decimal(_)) || matches!(right, FormulaValue::Decimal(_));
    if is_decimal && op != BinaryOp::Pow {
        if let (Some(a), Some(b)) = (decimal(left), decimal(right)) {
            return decimal_arithmetic(op, a, b, ir);
        }
    }

    let number = |v: &FormulaValue| match v {
        FormulaValue::Blank(_) => Some(0.0),
        other => other.as_f64(),
    };
    let (Some(a), Some(b)) = (number(left), number(right)) else {
        return error(ErrorValue::runtime_type_mismatch(ir));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return error(ErrorValue::divide_by_zero(ir)),
        BinaryOp::Div => a / b,
        BinaryOp::Pow if a == 0.0 && b < 0.0 => return error(ErrorValue::divide_by_zero(ir)),
        BinaryOp::Pow => a.powf(b),
        _ => return error(ErrorValue::runtime_type_mismatch(ir)),
    };
    if !result.is_finite() {
        return error(ErrorValue::numeric(ir));
    }
    match ir.result_type {
        FormulaType::Decimal => Decimal::from_f64(result)
            .map(FormulaValue::Decimal)
            .unwrap_or_else(|| error(ErrorValue::numeric(ir))),
        _ => FormulaValue::Number(result),
    }
}

fn decimal_arithmetic(op: BinaryOp, a: Decimal, b: Decimal, ir: &IrContext) -> FormulaValue {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div if b.is_zero() => return error(ErrorValue::divide_by_zero(ir)),
        BinaryOp::Div => a.checked_div(b),
        _ => None,
    };
    match result {
        Some(d) => FormulaValue::Decimal(d),
        None => error(ErrorValue::numeric(ir)),
    }
}

/// Date and time arithmetic. Numbers added to dates count days.
fn temporal(
    op: BinaryOp,
    left: &FormulaValue,
    right: &FormulaValue,
    ir: &IrContext,
) -> Option<FormulaValue> {
    use FormulaValue::{Date, DateTime, Time};

    let days = |v: &FormulaValue| match v {
        FormulaValue::Blank(_) => Some(0.0),
        other if other.is_numeric() => other.as_f64(),
        _ => None,
    };
    let out_of_range = || error(ErrorValue::argument_out_of_range(ir));

    let result = match (op, left, right) {
        (BinaryOp::Add | BinaryOp::Sub, Date(d), other) if days(other).is_some() => {
            let n = days(other)?;
            let n = if op == BinaryOp::Sub { -n } else { n };
            let dt = convert::midnight(*d).checked_add_signed(convert::serial_to_time(n)?);
            match (dt, &ir.result_type) {
                (Some(dt), FormulaType::DateTime) => DateTime(dt),
                (Some(dt), _) => Date(dt.date()),
                (None, _) => out_of_range(),
            }
        }
        (BinaryOp::Add, other, Date(_)) if days(other).is_some() => {
            return temporal(op, right, left, ir);
        }
        (BinaryOp::Add | BinaryOp::Sub, DateTime(dt), other) if days(other).is_some() => {
            let n = days(other)?;
            let n = if op == BinaryOp::Sub { -n } else { n };
            dt.checked_add_signed(convert::serial_to_time(n)?).map_or_else(out_of_range, DateTime)
        }
        (BinaryOp::Add, other, DateTime(_)) if days(other).is_some() => {
            return temporal(op, right, left, ir);
        }
        (BinaryOp::Add | BinaryOp::Sub, DateTime(dt), Time(t)) => {
            let t = if op == BinaryOp::Sub { -*t } else { *t };
            dt.checked_add_signed(t).map_or_else(out_of_range, DateTime)
        }
        (BinaryOp::Add | BinaryOp::Sub, Date(d), Time(t)) => {
            let t = if op == BinaryOp::Sub { -*t } else { *t };
            convert::midnight(*d)
                .checked_add_signed(t)
                .map_or_else(out_of_range, DateTime)
        }
        (BinaryOp::Add | BinaryOp::Sub, Time(a), Time(b)) => {
            let sum = if op == BinaryOp::Sub { *a - *b } else { *a + *b };
            Time(sum)
        }
        (BinaryOp::Add | BinaryOp::Sub, Time(t), other) if days(other).is_some() => {
            let n = days(other)?;
            let delta = Duration::milliseconds((n * 86_400_000.0).round() as i64);
            Time(if op == BinaryOp::Sub { *t - delta } else { *t + delta })
        }
        (BinaryOp::Sub, Date(_) | DateTime(_), Date(_) | DateTime(_)) => {
            let a = convert::to_datetime(left, crate::config::Culture::invariant())?;
            let b = convert::to_datetime(right, crate::config::Culture::invariant())?;
            let diff = a - b;
            match ir.result_type {
                FormulaType::Time => Time(diff),
                _ => FormulaValue::Number(convert::time_to_serial(diff)),
            }
        }
        _ => return None,
    };
    Some(result)
}

fn concat(
    left: &FormulaValue,
    right: &FormulaValue,
    ir: &IrContext,
    ctx: &EvalContext,
) -> FormulaValue {
    let culture = ctx.culture();
    let (Some(a), Some(b)) = (
        convert::to_text(left, culture),
        convert::to_text(right, culture),
    ) else {
        return error(ErrorValue::runtime_type_mismatch(ir));
    };
    if !ctx.governor().can_allocate_string(a.chars().count() + b.chars().count()) {
        return error(ErrorValue::insufficient_memory(ir));
    }
    FormulaValue::string(a + &b)
}

// ═══════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════

/// Equality. Comparing kinds that cannot be equal is a warning, or an
/// `InvalidArgument` error under strict type comparison.
pub(crate) fn equals(
    left: &FormulaValue,
    right: &FormulaValue,
    ir: &IrContext,
    ctx: &EvalContext,
) -> Result<bool, ErrorValue> {
    use FormulaValue as V;

    let features = ctx.features();
    match (left, right) {
        (V::Blank(_), V::Blank(_)) => return Ok(true),
        (V::Blank(_), V::String(s)) | (V::String(s), V::Blank(_)) => {
            return Ok(!features.powerfx_v1_blank_coercion && s.is_empty())
        }
        (V::Blank(_), _) | (_, V::Blank(_)) => return Ok(false),
        _ => {}
    }

    if left.is_numeric() && right.is_numeric() {
        return Ok(match (left, right) {
            (V::Decimal(a), V::Decimal(b)) => a == b,
            _ => left.as_f64() == right.as_f64(),
        });
    }
    if left.kind() != right.kind() {
        let mismatch = ExpressionError::new(ErrorKind::InvalidArgument)
            .with_message(format!(
                "Incompatible types for comparison: {} and {}",
                left.kind(),
                right.kind()
            ))
            .with_span(ir.span);
        if features.strict_type_comparison {
            return Err(ErrorValue::new(ir.result_type.clone(), mismatch));
        }
        ctx.warn(mismatch);
        return Ok(false);
    }
    Ok(left == right)
}

fn compare(
    op: BinaryOp,
    left: &FormulaValue,
    right: &FormulaValue,
    ir: &IrContext,
) -> FormulaValue {
    use std::cmp::Ordering;

    let key = |v: &FormulaValue| -> Option<f64> {
        match v {
            FormulaValue::Blank(_) => Some(0.0),
            FormulaValue::Date(d) => Some(convert::datetime_to_serial(convert::midnight(*d))),
            FormulaValue::DateTime(dt) => Some(convert::datetime_to_serial(*dt)),
            FormulaValue::Time(t) => Some(convert::time_to_serial(*t)),
            other => other.as_f64(),
        }
    };
    let ordering = match (left, right) {
        (FormulaValue::Decimal(a), FormulaValue::Decimal(b)) => Some(a.cmp(b)),
        _ => match (key(left), key(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return error(ErrorValue::runtime_type_mismatch(ir));
    };
    FormulaValue::Boolean(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

// ═══════════════════════════════════════════════════════════════════
// Unary
// ═══════════════════════════════════════════════════════════════════

/// Apply a unary operator.
pub(super) fn unary(op: UnaryOp, operand: FormulaValue, ir: &IrContext) -> FormulaValue {
    match (op, operand) {
        (_, FormulaValue::Error(e)) => error(e.with_type(ir.result_type.clone())),
        (UnaryOp::Not, FormulaValue::Blank(_)) => FormulaValue::Boolean(true),
        (UnaryOp::Not, FormulaValue::Boolean(b)) => FormulaValue::Boolean(!b),
        (UnaryOp::Not, _) => error(ErrorValue::runtime_type_mismatch(ir)),
        (_, FormulaValue::Blank(ty)) => FormulaValue::Blank(ty),
        (UnaryOp::Negate, FormulaValue::Number(n)) => FormulaValue::Number(-n),
        (UnaryOp::Negate, FormulaValue::Decimal(d)) => FormulaValue::Decimal(-d),
        (UnaryOp::Negate, FormulaValue::Time(t)) => FormulaValue::Time(-t),
        (UnaryOp::Percent, FormulaValue::Number(n)) => FormulaValue::Number(n / 100.0),
        (UnaryOp::Percent, FormulaValue::Decimal(d)) => d
            .checked_div(Decimal::ONE_HUNDRED)
            .map(FormulaValue::Decimal)
            .unwrap_or_else(|| error(ErrorValue::numeric(ir))),
        _ => error(ErrorValue::runtime_type_mismatch(ir)),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Coercion
// ═══════════════════════════════════════════════════════════════════

/// Apply an implicit conversion. Blanks and errors pass through retyped;
/// values that cannot be converted become `InvalidArgument` errors.
pub(super) fn coerce(
    to: Coercion,
    operand: FormulaValue,
    ir: &IrContext,
    ctx: &EvalContext,
) -> FormulaValue {
    let ty = ir.result_type.clone();
    match operand {
        FormulaValue::Error(e) => return error(e.with_type(ty)),
        FormulaValue::Blank(_) => return FormulaValue::Blank(ty),
        _ => {}
    }
    let culture = ctx.culture();
    let converted = match to {
        Coercion::ToText => convert::to_text(&operand, culture).map(FormulaValue::string),
        Coercion::ToNumber => convert::to_number(&operand, culture).map(FormulaValue::Number),
        Coercion::ToDecimal => convert::to_decimal(&operand, culture).map(FormulaValue::Decimal),
        Coercion::ToBoolean => convert::to_boolean(&operand).map(FormulaValue::Boolean),
        Coercion::ToDate => {
            convert::to_datetime(&operand, culture).map(|dt| FormulaValue::Date(dt.date()))
        }
        Coercion::ToDateTime => convert::to_datetime(&operand, culture).map(FormulaValue::DateTime),
    };
    converted.unwrap_or_else(|| {
        let shown =
            convert::to_text(&operand, culture).unwrap_or_else(|| operand.kind().to_string());
        error(ErrorValue::invalid_argument(
            ir,
            format!("Cannot convert '{shown}' to {ty}"),
        ))
    })
}
