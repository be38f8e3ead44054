//! Date and time construction and decomposition
//!
//! Out-of-range months and days roll over the way calendar arithmetic
//! does: `Date(2020, 13, 1)` is January 2021 and `Date(2021, 3, 0)` is the
//! last day of February.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::convert::{midnight, serial_to_datetime, time_of_day};
use super::policy::{Accept, ArgExpansion, BlankReplacement, TypeCheck};
use super::{arg, RegistryBuilder, StandardErrorHandling, Target};
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaValue, ValueKind};

/// Largest year a date may have.
const MAX_YEAR: f64 = 9999.0;

fn numeric(name: &'static str, target: Target) -> StandardErrorHandling {
    StandardErrorHandling::new(name, target)
        .blanks(BlankReplacement::zero())
        .types(TypeCheck::Uniform(Accept::Numeric))
}

fn padded(required: usize, optional: usize) -> ArgExpansion {
    ArgExpansion::PadTrailing {
        required,
        defaults: vec![FormulaValue::Number(0.0); optional],
    }
}

fn date_part(name: &'static str, target: Target) -> StandardErrorHandling {
    StandardErrorHandling::new(name, target).blanks(BlankReplacement::zero())
}

pub(crate) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .add(numeric("Date", Target::Sync(date)))
        .add(numeric("Time", Target::Sync(time)).expand(padded(3, 1)))
        .add(numeric("DateTime", Target::Sync(date_time)).expand(padded(6, 1)))
        .add(date_part("Year", Target::Sync(year)))
        .add(date_part("Month", Target::Sync(month)))
        .add(date_part("Day", Target::Sync(day)))
        .add(date_part("Hour", Target::Sync(hour)))
        .add(date_part("Minute", Target::Sync(minute)))
        .add(date_part("Second", Target::Sync(second)))
}

// ═══════════════════════════════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════════════════════════════

fn num(args: &[FormulaValue], i: usize) -> f64 {
    arg(args, i).as_f64().unwrap_or(0.0).trunc()
}

/// Calendar date from possibly overflowing parts. Two-digit style years
/// below 1900 are offset by 1900.
fn calendar_date(year: f64, month: f64, day: f64) -> Option<NaiveDate> {
    if !(year.is_finite() && month.is_finite() && day.is_finite()) {
        return None;
    }
    let year = if (0.0..1900.0).contains(&year) { year + 1900.0 } else { year };
    if !(0.0..=MAX_YEAR).contains(&year) {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year as i32, 1, 1)?;
    let months = month - 1.0;
    let first_of_month = if months >= 0.0 {
        first.checked_add_months(Months::new(months.min(u32::MAX as f64) as u32))?
    } else {
        first.checked_sub_months(Months::new((-months).min(u32::MAX as f64) as u32))?
    };
    let days = (day - 1.0).clamp(-1e7, 1e7) as i64;
    first_of_month.checked_add_signed(Duration::days(days))
}

fn clock(hours: f64, minutes: f64, seconds: f64, millis: f64) -> Duration {
    let ms = ((hours * 60.0 + minutes) * 60.0 + seconds) * 1000.0 + millis;
    Duration::milliseconds(ms.clamp(-1e15, 1e15) as i64)
}

/// `Date(year, month, day)`
fn date(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(match calendar_date(num(args, 0), num(args, 1), num(args, 2)) {
        Some(d) => FormulaValue::Date(d),
        None => FormulaValue::Error(ErrorValue::argument_out_of_range(ir)),
    })
}

/// `Time(hour, minute, second, [millisecond])`
fn time(_: &EvalContext, _: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::Time(clock(
        num(args, 0),
        num(args, 1),
        num(args, 2),
        num(args, 3),
    )))
}

/// `DateTime(year, month, day, hour, minute, second, [millisecond])`
fn date_time(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let Some(date) = calendar_date(num(args, 0), num(args, 1), num(args, 2)) else {
        return Ok(FormulaValue::Error(ErrorValue::argument_out_of_range(ir)));
    };
    let offset = clock(num(args, 3), num(args, 4), num(args, 5), num(args, 6));
    Ok(match midnight(date).checked_add_signed(offset) {
        Some(dt) => FormulaValue::DateTime(dt),
        None => FormulaValue::Error(ErrorValue::argument_out_of_range(ir)),
    })
}

// ═══════════════════════════════════════════════════════════════════
// Decomposition
// ═══════════════════════════════════════════════════════════════════

/// Date-time view of a date argument; `None` for other kinds.
fn as_datetime(value: &FormulaValue) -> Option<NaiveDateTime> {
    match value {
        FormulaValue::Date(d) => Some(midnight(*d)),
        FormulaValue::DateTime(dt) => Some(*dt),
        _ => None,
    }
}

/// Time-of-day view of a time argument. Numbers are days.
fn as_clock(value: &FormulaValue) -> Option<NaiveTime> {
    match value {
        FormulaValue::Time(t) => Some(time_of_day(*t)),
        FormulaValue::DateTime(dt) => Some(dt.time()),
        FormulaValue::Date(_) => Some(NaiveTime::MIN),
        FormulaValue::Number(_) | FormulaValue::Decimal(_) => {
            serial_to_datetime(value.as_f64()?).map(|dt| dt.time())
        }
        _ => None,
    }
}

fn date_component(
    ir: &IrContext,
    args: &[FormulaValue],
    part: fn(NaiveDateTime) -> u32,
) -> FormulaValue {
    let value = arg(args, 0);
    let dt = match value.kind() {
        ValueKind::Number | ValueKind::Decimal => {
            value.as_f64().and_then(serial_to_datetime)
        }
        _ => as_datetime(value),
    };
    match dt {
        Some(dt) => FormulaValue::Number(part(dt) as f64),
        None => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    }
}

fn time_component(
    ir: &IrContext,
    args: &[FormulaValue],
    part: fn(NaiveTime) -> u32,
) -> FormulaValue {
    match as_clock(arg(args, 0)) {
        Some(t) => FormulaValue::Number(part(t) as f64),
        None => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    }
}

fn year(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(date_component(ir, args, |dt| dt.year().max(0) as u32))
}

fn month(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(date_component(ir, args, |dt| dt.month()))
}

fn day(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(date_component(ir, args, |dt| dt.day()))
}

fn hour(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(time_component(ir, args, |t| t.hour()))
}

fn minute(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(time_component(ir, args, |t| t.minute()))
}

fn second(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(time_component(ir, args, |t| t.second()))
}
