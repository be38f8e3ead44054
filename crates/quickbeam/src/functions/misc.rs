//! Conversions between kinds and host-value helpers
//!
//! `Text`, `Value`, `Float`, `Decimal`, `Boolean`, `GUID` and the color
//! functions, plus the untyped-object and option set entry points.

use chrono::{Duration, NaiveDateTime};
use uuid::Uuid;

use super::convert::{self, epoch, midnight, time_of_day};
use super::datefmt::{self, MAX_FORMAT_LENGTH, UTC_PATTERN};
use super::numfmt;
use super::policy::{
    Accept, BlankReplacement, ReturnBehavior, TypeCheck, ValueCheck, ValueRule,
};
use super::{arg, RegistryBuilder, StandardErrorHandling, Target};
use crate::config::Culture;
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::ir::IrContext;
use crate::value::{Color, ErrorValue, FormulaType, FormulaValue, UntypedKind, ValueKind};

/// Conversion whose blank input is a blank output.
fn converter(name: &'static str, target: Target) -> StandardErrorHandling {
    StandardErrorHandling::new(name, target).behavior(ReturnBehavior::ReturnBlankIfAnyArgIsBlank)
}

/// Conversion of an untyped object.
fn untyped(name: &'static str, target: Target) -> StandardErrorHandling {
    converter(name, target).types(TypeCheck::Uniform(Accept::ExactOrBlank(
        ValueKind::UntypedObject,
    )))
}

pub(crate) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .add(
            StandardErrorHandling::new("Text", Target::Sync(text))
                .behavior(ReturnBehavior::ReturnEmptyStringIfAnyArgIsBlank),
        )
        .add(converter("Value", Target::Sync(value)))
        .add(converter("Float", Target::Sync(float)))
        .add(converter("Decimal", Target::Sync(decimal)))
        .add(converter("Boolean", Target::Sync(boolean)))
        .add(converter("GUID", Target::Sync(guid)))
        .add(converter("ColorValue", Target::Sync(color_value)))
        .add(
            StandardErrorHandling::new("ColorFade", Target::Sync(color_fade))
                .blanks(BlankReplacement::Positional(vec![
                    Some(FormulaValue::Color(Color::TRANSPARENT)),
                    Some(FormulaValue::Number(0.0)),
                ]))
                .types(TypeCheck::Sequence(vec![
                    Accept::Exact(ValueKind::Color),
                    Accept::Numeric,
                ]))
                .values(ValueCheck::Sequence(vec![
                    ValueRule::Any,
                    ValueRule::Range(-1.0, 1.0),
                ])),
        )
        .add(untyped("Text_UO", Target::Sync(text_untyped)))
        .add(untyped("Value_UO", Target::Sync(value_untyped)))
        .add(untyped("Boolean_UO", Target::Sync(boolean_untyped)))
        .add(
            StandardErrorHandling::new(
                "OptionSetValueToLogicalName",
                Target::Sync(option_set_logical_name),
            )
            .types(TypeCheck::Uniform(Accept::ExactOrBlank(ValueKind::OptionSet)))
            .behavior(ReturnBehavior::ReturnEmptyStringIfAnyArgIsBlank),
        )
        .tabular("BooleanT", "Boolean", BlankReplacement::DoNotReplace)
}

/// Culture named by the optional language argument at `i`.
fn language(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
    i: usize,
) -> Result<&'static Culture, FormulaValue> {
    match args.get(i).and_then(FormulaValue::as_str) {
        None => Ok(ctx.culture()),
        Some(code) => Culture::lookup(code)
            .ok_or_else(|| FormulaValue::Error(ErrorValue::bad_language_code(ir, code))),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Text
// ═══════════════════════════════════════════════════════════════════

/// `Text(value, [format], [language])`
fn text(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let culture = match language(ctx, ir, args, 2) {
        Ok(c) => c,
        Err(e) => return Ok(e),
    };
    let format = args.get(1).and_then(FormulaValue::as_str);
    if format.is_some_and(|f| f.chars().count() > MAX_FORMAT_LENGTH) {
        return Ok(FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            format!("Format strings are limited to {MAX_FORMAT_LENGTH} characters."),
        )));
    }

    let source = arg(args, 0);
    let Some(format) = format else {
        return Ok(match convert::to_text(source, culture) {
            Some(s) => FormulaValue::string(s),
            None => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
        });
    };

    let formatted = match source {
        FormulaValue::String(s) => Some(s.to_string()),
        FormulaValue::Boolean(b) => Some(b.to_string()),
        FormulaValue::Guid(g) => Some(g.hyphenated().to_string()),
        FormulaValue::Number(_) | FormulaValue::Decimal(_) => {
            let n = source.as_f64().unwrap_or(0.0);
            if is_date_format(format, culture) {
                convert::serial_to_datetime(n).map(|dt| format_datetime(ctx, dt, format, culture))
            } else {
                numfmt::format_number(n, format, culture)
            }
        }
        FormulaValue::Date(_) | FormulaValue::DateTime(_) | FormulaValue::Time(_) => {
            let dt = match source {
                FormulaValue::Date(d) => midnight(*d),
                FormulaValue::DateTime(dt) => *dt,
                FormulaValue::Time(t) => epoch().date().and_time(time_of_day(*t)),
                _ => epoch(),
            };
            if is_date_format(format, culture) {
                Some(format_datetime(ctx, dt, format, culture))
            } else {
                numfmt::format_number(convert::datetime_to_serial(dt), format, culture)
            }
        }
        other => convert::to_text(other, culture),
    };
    Ok(match formatted {
        Some(s) => FormulaValue::string(s),
        None => FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            format!("The format '{format}' is not valid for this value."),
        )),
    })
}

fn is_date_format(format: &str, culture: &Culture) -> bool {
    datefmt::named_pattern(format, culture).is_some() || datefmt::has_date_tokens(format)
}

/// Format a local date-time. The UTC format first shifts it by the
/// context's offset.
fn format_datetime(
    ctx: &EvalContext,
    dt: NaiveDateTime,
    format: &str,
    culture: &Culture,
) -> String {
    if datefmt::is_utc(format) {
        let offset = Duration::seconds(i64::from(ctx.time_zone().local_minus_utc()));
        let utc = dt.checked_sub_signed(offset).unwrap_or(dt);
        return datefmt::format(UTC_PATTERN, utc, culture);
    }
    match datefmt::named_pattern(format, culture) {
        Some(pattern) => datefmt::format(&pattern, dt, culture),
        None => datefmt::format(format, dt, culture),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Numbers
// ═══════════════════════════════════════════════════════════════════

/// Shared body of `Value`, `Float` and `Decimal`. Empty text is blank.
fn to_numeric(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
    as_decimal: bool,
) -> FormulaValue {
    let culture = match language(ctx, ir, args, 1) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let source = arg(args, 0);
    if source.as_str().is_some_and(str::is_empty) {
        return FormulaValue::Blank(ir.result_type.clone());
    }
    let converted = if as_decimal {
        convert::to_decimal(source, culture).map(FormulaValue::Decimal)
    } else {
        convert::to_number(source, culture).map(FormulaValue::Number)
    };
    converted.unwrap_or_else(|| FormulaValue::Error(ErrorValue::argument_out_of_range(ir)))
}

/// `Value(text, [language])`: decimal when the call is typed decimal.
fn value(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(to_numeric(ctx, ir, args, ir.result_type == FormulaType::Decimal))
}

fn float(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(to_numeric(ctx, ir, args, false))
}

fn decimal(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(to_numeric(ctx, ir, args, true))
}

// ═══════════════════════════════════════════════════════════════════
// Boolean and GUID
// ═══════════════════════════════════════════════════════════════════

fn boolean(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let source = arg(args, 0);
    if source.as_str().is_some_and(str::is_empty) {
        return Ok(FormulaValue::Blank(ir.result_type.clone()));
    }
    Ok(match convert::to_boolean(source) {
        Some(b) => FormulaValue::Boolean(b),
        None => FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            "The value cannot be converted to a boolean.",
        )),
    })
}

/// `GUID([text])`: parse, or a fresh random GUID without arguments.
fn guid(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let Some(source) = args.first() else {
        return Ok(FormulaValue::Guid(Uuid::new_v4()));
    };
    let parsed = source.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok());
    Ok(match parsed {
        Some(g) => FormulaValue::Guid(g),
        None => FormulaValue::Error(ErrorValue::invalid_argument(ir, "Invalid GUID.")),
    })
}

// ═══════════════════════════════════════════════════════════════════
// Colors
// ═══════════════════════════════════════════════════════════════════

const NAMED_COLORS: [(&str, Color); 12] = [
    ("black", Color::rgb(0, 0, 0)),
    ("white", Color::rgb(255, 255, 255)),
    ("red", Color::rgb(255, 0, 0)),
    ("green", Color::rgb(0, 128, 0)),
    ("lime", Color::rgb(0, 255, 0)),
    ("blue", Color::rgb(0, 0, 255)),
    ("yellow", Color::rgb(255, 255, 0)),
    ("cyan", Color::rgb(0, 255, 255)),
    ("magenta", Color::rgb(255, 0, 255)),
    ("gray", Color::rgb(128, 128, 128)),
    ("orange", Color::rgb(255, 165, 0)),
    ("transparent", Color::TRANSPARENT),
];

fn parse_color(text: &str) -> Option<Color> {
    let text = text.trim();
    let Some(hex) = text.strip_prefix('#') else {
        return NAMED_COLORS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(text))
            .map(|(_, c)| *c);
    };
    if !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
        8 => Some(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
        _ => None,
    }
}

/// `ColorValue(text)`: `#rrggbb`, `#rrggbbaa` or a color name.
fn color_value(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let text = arg(args, 0).as_str().unwrap_or_default();
    if text.is_empty() {
        return Ok(FormulaValue::Blank(ir.result_type.clone()));
    }
    Ok(match parse_color(text) {
        Some(c) => FormulaValue::Color(c),
        None => FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            format!("'{text}' is not a valid color."),
        )),
    })
}

/// `ColorFade(color, fade)`: positive fades toward white, negative toward
/// black. Alpha is kept.
fn color_fade(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let color = match arg(args, 0) {
        FormulaValue::Color(c) => *c,
        _ => Color::TRANSPARENT,
    };
    let fade = arg(args, 1).as_f64().unwrap_or(0.0);
    let channel = |c: u8| {
        let c = f64::from(c);
        let faded = if fade >= 0.0 {
            c + (255.0 - c) * fade
        } else {
            c * (1.0 + fade)
        };
        faded.round().clamp(0.0, 255.0) as u8
    };
    Ok(FormulaValue::Color(Color::rgba(
        channel(color.r),
        channel(color.g),
        channel(color.b),
        color.a,
    )))
}

// ═══════════════════════════════════════════════════════════════════
// Untyped Objects
// ═══════════════════════════════════════════════════════════════════

/// Untyped argument, or `None` when it is JSON null.
fn untyped_arg(args: &[FormulaValue]) -> Option<&FormulaValue> {
    match arg(args, 0) {
        FormulaValue::UntypedObject(obj) if obj.kind() == UntypedKind::Null => None,
        other => Some(other),
    }
}

fn text_untyped(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let Some(source) = untyped_arg(args) else {
        return Ok(FormulaValue::Blank(ir.result_type.clone()));
    };
    Ok(match convert::to_text(source, ctx.culture()) {
        Some(s) => FormulaValue::string(s),
        None => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    })
}

fn value_untyped(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let Some(source) = untyped_arg(args) else {
        return Ok(FormulaValue::Blank(ir.result_type.clone()));
    };
    let FormulaValue::UntypedObject(obj) = source else {
        return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)));
    };
    Ok(match obj.kind() {
        UntypedKind::Number | UntypedKind::String => {
            match convert::to_number(source, ctx.culture()) {
                Some(n) => FormulaValue::Number(n),
                None => FormulaValue::Error(ErrorValue::invalid_argument(
                    ir,
                    "The value cannot be converted to a number.",
                )),
            }
        }
        _ => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    })
}

fn boolean_untyped(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let Some(source) = untyped_arg(args) else {
        return Ok(FormulaValue::Blank(ir.result_type.clone()));
    };
    Ok(match convert::to_boolean(source) {
        Some(b) => FormulaValue::Boolean(b),
        None => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    })
}

// ═══════════════════════════════════════════════════════════════════
// Option Sets
// ═══════════════════════════════════════════════════════════════════

fn option_set_logical_name(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(match arg(args, 0) {
        FormulaValue::OptionSet(o) => FormulaValue::String(o.logical_name.clone()),
        _ => FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir)),
    })
}
