//! Conversions between scalar kinds shared by operators and functions
//!
//! Dates and times convert to numbers as serial days since 1899-12-30,
//! with the time of day as the fractional part.

use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::datefmt;
use crate::config::Culture;
use crate::value::{FormulaValue, UntypedKind};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Day zero of the serial date system.
pub(crate) fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════
// Dates
// ═══════════════════════════════════════════════════════════════════

/// Serial number of a date-time.
pub(crate) fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    (dt - epoch()).num_milliseconds() as f64 / MS_PER_DAY
}

/// Date-time of a serial number, `None` when out of range.
pub(crate) fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let ms = (serial * MS_PER_DAY).round();
    if ms.abs() > 1e15 {
        return None;
    }
    epoch().checked_add_signed(Duration::milliseconds(ms as i64))
}

/// Fraction of a day.
pub(crate) fn time_to_serial(t: Duration) -> f64 {
    t.num_milliseconds() as f64 / MS_PER_DAY
}

/// Duration of a fraction of a day.
pub(crate) fn serial_to_time(serial: f64) -> Option<Duration> {
    serial
        .is_finite()
        .then(|| Duration::milliseconds((serial * MS_PER_DAY).round() as i64))
}

/// A time-of-day duration as a clock time, wrapping at midnight.
pub(crate) fn time_of_day(t: Duration) -> NaiveTime {
    let ms = t.num_milliseconds().rem_euclid(86_400_000);
    NaiveTime::from_num_seconds_from_midnight_opt(
        (ms / 1000) as u32,
        ((ms % 1000) * 1_000_000) as u32,
    )
    .unwrap_or_default()
}

/// Date-time at midnight of `date`.
pub(crate) fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

// ═══════════════════════════════════════════════════════════════════
// To Text
// ═══════════════════════════════════════════════════════════════════

/// General number format: up to 15 significant digits, no trailing zeros.
pub(crate) fn number_to_text(n: f64, culture: &Culture) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs().log10().floor() as i32;
    let text = if !(-5..15).contains(&magnitude) {
        let s = format!("{:.14E}", n);
        trim_exponent(&s)
    } else {
        let decimals = (14 - magnitude).clamp(0, 15) as usize;
        trim_fraction(&format!("{:.*}", decimals, n))
    };
    localize(&text, culture)
}

/// Decimal in general format.
pub(crate) fn decimal_to_text(d: Decimal, culture: &Culture) -> String {
    localize(&d.normalize().to_string(), culture)
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn trim_exponent(s: &str) -> String {
    match s.split_once('E') {
        Some((mantissa, exp)) => {
            let exp = exp.strip_prefix('-').map_or_else(
                || format!("+{exp}"),
                |e| format!("-{e}"),
            );
            format!("{}E{}", trim_fraction(mantissa), exp)
        }
        None => s.to_string(),
    }
}

fn localize(s: &str, culture: &Culture) -> String {
    if culture.decimal_separator == '.' {
        s.to_string()
    } else {
        s.replace('.', &culture.decimal_separator.to_string())
    }
}

/// Text form of a scalar, `None` for kinds with no text form.
pub(crate) fn to_text(value: &FormulaValue, culture: &Culture) -> Option<String> {
    Some(match value {
        FormulaValue::Blank(_) => String::new(),
        FormulaValue::Boolean(b) => b.to_string(),
        FormulaValue::Number(n) => number_to_text(*n, culture),
        FormulaValue::Decimal(d) => decimal_to_text(*d, culture),
        FormulaValue::String(s) => s.to_string(),
        FormulaValue::Date(d) => datefmt::format(culture.short_date, midnight(*d), culture),
        FormulaValue::DateTime(dt) => {
            let pattern = format!("{} {}", culture.short_date, culture.short_time);
            datefmt::format(&pattern, *dt, culture)
        }
        FormulaValue::Time(t) => {
            datefmt::format(culture.long_time, epoch().date().and_time(time_of_day(*t)), culture)
        }
        FormulaValue::Guid(g) => g.hyphenated().to_string(),
        FormulaValue::OptionSet(o) => o.display_name.to_string(),
        FormulaValue::UntypedObject(obj) => match obj.kind() {
            UntypedKind::String => obj.as_string()?,
            UntypedKind::Number => number_to_text(obj.as_number()?, culture),
            UntypedKind::Boolean => obj.as_bool()?.to_string(),
            UntypedKind::Null => String::new(),
            UntypedKind::Array | UntypedKind::Object => return None,
        },
        FormulaValue::Color(_)
        | FormulaValue::Record(_)
        | FormulaValue::Table(_)
        | FormulaValue::Error(_)
        | FormulaValue::Lambda(_)
        | FormulaValue::Void => return None,
    })
}

// ═══════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════

/// Normalize culture-specific numeric text to the `.`-decimal form Rust
/// parses. A trailing `%` divides by 100.
fn normalize_numeric(text: &str, culture: &Culture) -> Option<(String, bool)> {
    let trimmed = text.trim();
    let (body, percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };
    if body.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(body.len());
    for c in body.chars() {
        if c == culture.decimal_separator {
            out.push('.');
        } else if c == culture.group_separator
            || (c == '\u{a0}' && culture.group_separator == '\u{202f}')
        {
            continue;
        } else if c.is_ascii_digit() || matches!(c, '+' | '-' | 'e' | 'E') {
            out.push(c);
        } else {
            return None;
        }
    }
    Some((out, percent))
}

/// Parse a number written in `culture`.
pub(crate) fn parse_number(text: &str, culture: &Culture) -> Option<f64> {
    let (normalized, percent) = normalize_numeric(text, culture)?;
    let n = f64::from_str(&normalized).ok()?;
    let n = if percent { n / 100.0 } else { n };
    n.is_finite().then_some(n)
}

/// Parse a decimal written in `culture`.
pub(crate) fn parse_decimal(text: &str, culture: &Culture) -> Option<Decimal> {
    let (normalized, percent) = normalize_numeric(text, culture)?;
    let d = Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()?;
    if percent {
        d.checked_div(Decimal::ONE_HUNDRED)
    } else {
        Some(d)
    }
}

/// `true`/`false`, case-insensitive.
pub(crate) fn parse_boolean(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse a date or date-time: ISO 8601 first, then the culture's
/// day/month/year order with an optional time part.
pub(crate) fn parse_datetime(text: &str, culture: &Culture) -> Option<NaiveDateTime> {
    let text = text.trim();
    const ISO: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
    ];
    if let Some(dt) = ISO
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(midnight(d));
    }

    let (date_part, time_part) = match text.split_once(' ') {
        Some((d, t)) => (d, Some(t.trim())),
        None => (text, None),
    };
    let parts: Vec<u32> = date_part
        .split(['/', '.', '-'])
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    let [a, b, c] = parts[..] else {
        return None;
    };
    let (year, month, day) = match culture.short_date.trim_start().chars().next() {
        Some('m') | Some('M') => (c, a, b),
        Some('y') | Some('Y') => (a, b, c),
        _ => (c, b, a),
    };
    let year = if year < 100 { 2000 + year } else { year };
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = match time_part {
        Some(t) => parse_time(t, culture)?,
        None => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}

/// `h:mm[:ss] [AM|PM]`.
pub(crate) fn parse_time(text: &str, culture: &Culture) -> Option<NaiveTime> {
    let text = text.trim();
    let upper = text.to_uppercase();
    let (clock, meridiem) = if let Some(rest) = strip_designator(&upper, culture.pm, "PM") {
        (rest, Some(true))
    } else if let Some(rest) = strip_designator(&upper, culture.am, "AM") {
        (rest, Some(false))
    } else {
        (upper.as_str(), None)
    };
    let mut fields = clock.trim().split(':');
    let hour: u32 = fields.next()?.trim().parse().ok()?;
    let minute: u32 = fields.next()?.trim().parse().ok()?;
    let seconds: f64 = match fields.next() {
        Some(s) => s.trim().replace(culture.decimal_separator, ".").parse().ok()?,
        None => 0.0,
    };
    let hour = match meridiem {
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        _ => hour,
    };
    let whole = seconds.trunc() as u32;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
    NaiveTime::from_hms_nano_opt(hour, minute, whole, nanos)
}

fn strip_designator<'a>(text: &'a str, local: &str, fallback: &str) -> Option<&'a str> {
    let local = local.to_uppercase();
    if !local.is_empty() {
        if let Some(rest) = text.strip_suffix(local.as_str()) {
            return Some(rest);
        }
    }
    text.strip_suffix(fallback)
}

// ═══════════════════════════════════════════════════════════════════
// To Number
// ═══════════════════════════════════════════════════════════════════

/// Numeric form of a scalar. Text is parsed in `culture`.
pub(crate) fn to_number(value: &FormulaValue, culture: &Culture) -> Option<f64> {
    match value {
        FormulaValue::Number(n) => Some(*n),
        FormulaValue::Decimal(d) => d.to_f64(),
        FormulaValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        FormulaValue::String(s) => parse_number(s, culture),
        FormulaValue::Date(d) => Some(datetime_to_serial(midnight(*d))),
        FormulaValue::DateTime(dt) => Some(datetime_to_serial(*dt)),
        FormulaValue::Time(t) => Some(time_to_serial(*t)),
        FormulaValue::UntypedObject(obj) => match obj.kind() {
            UntypedKind::Number => obj.as_number(),
            UntypedKind::String => parse_number(&obj.as_string()?, culture),
            UntypedKind::Boolean => obj.as_bool().map(|b| if b { 1.0 } else { 0.0 }),
            _ => None,
        },
        _ => None,
    }
}

/// Decimal form of a scalar.
pub(crate) fn to_decimal(value: &FormulaValue, culture: &Culture) -> Option<Decimal> {
    match value {
        FormulaValue::Decimal(d) => Some(*d),
        FormulaValue::Number(n) => Decimal::from_f64(*n),
        FormulaValue::Boolean(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
        FormulaValue::String(s) => parse_decimal(s, culture),
        other => to_number(other, culture).and_then(Decimal::from_f64),
    }
}

/// Boolean form of a scalar.
pub(crate) fn to_boolean(value: &FormulaValue) -> Option<bool> {
    match value {
        FormulaValue::Boolean(b) => Some(*b),
        FormulaValue::Number(n) => Some(*n != 0.0),
        FormulaValue::Decimal(d) => Some(!d.is_zero()),
        FormulaValue::String(s) => parse_boolean(s),
        FormulaValue::UntypedObject(obj) => match obj.kind() {
            UntypedKind::Boolean => obj.as_bool(),
            UntypedKind::String => parse_boolean(&obj.as_string()?),
            UntypedKind::Number => obj.as_number().map(|n| n != 0.0),
            _ => None,
        },
        _ => None,
    }
}

/// Date-time form of a scalar.
pub(crate) fn to_datetime(value: &FormulaValue, culture: &Culture) -> Option<NaiveDateTime> {
    match value {
        FormulaValue::DateTime(dt) => Some(*dt),
        FormulaValue::Date(d) => Some(midnight(*d)),
        FormulaValue::String(s) => parse_datetime(s, culture),
        other => serial_to_datetime(to_number(other, culture)?),
    }
}

/// Round half away from zero to `digits` decimal places. Negative digits
/// round to the left of the decimal point.
pub(crate) fn round_half_away(n: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits.clamp(-300, 300));
    let scaled = n * factor;
    // Absorb representation error such as 2.675 * 100 = 267.49999999999997
    let nudged = scaled + scaled.signum() * scaled.abs() * f64::EPSILON * 4.0;
    nudged.round() / factor
}
