//! Date and time formatting with the formula token alphabet
//!
//! Formatting runs in three passes over the pattern:
//!
//! 1. double-quoted literals are cut out and replaced by a marker
//! 2. format letters are rewritten into private-use marker characters,
//!    deciding for each `m` whether it means month or minute
//! 3. runs of markers are replaced by the date's components, then the
//!    quoted literals are put back
//!
//! An `m` is a minute when a seconds token follows it with no date or hour
//! letter in between, or when an hour token precedes it with no date or
//! month letter in between. Every other `m` is a month.

use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDateTime, Timelike};
use regex::Regex;

use crate::config::Culture;

const AMPM: char = '\u{E001}';
const AP: char = '\u{E002}';
const MONTH: char = '\u{E003}';
const DAY: char = '\u{E004}';
const YEAR: char = '\u{E005}';
const HOUR: char = '\u{E006}';
const MINUTE: char = '\u{E007}';
const SECOND: char = '\u{E008}';
const FRACTION: char = '\u{E009}';
const QUOTED: char = '\u{E00A}';

/// Pattern of the `'utc'` named format, applied to the UTC time.
pub(crate) const UTC_PATTERN: &str = "yyyy-mm-ddThh:mm:ss.000Z";

/// Longest accepted format string.
pub(crate) const MAX_FORMAT_LENGTH: usize = 100;

struct Patterns {
    ampm: Regex,
    ap: Regex,
    minutes_before_seconds: Regex,
    minutes_after_hours: Regex,
    minute: Regex,
    quoted: Regex,
    designator: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |re: &str| Regex::new(re).expect("valid regex");
        Patterns {
            ampm: compile("[aA][mM]/[pP][mM]"),
            ap: compile("[aA]/[pP]"),
            minutes_before_seconds: compile("[mM][^dDyYhH]+[sS]"),
            minutes_after_hours: compile("[hH][^dDyYmM]+[mM]"),
            minute: compile("[mM]"),
            quoted: compile("\"[^\"]*\""),
            designator: compile(r"\s*([aA][mM]/[pP][mM]|[aA]/[pP])"),
        }
    })
}

// ═══════════════════════════════════════════════════════════════════
// Named Formats
// ═══════════════════════════════════════════════════════════════════

/// Expand a named format (`'shortdate'`, `'longtime24'`, ...) into a
/// pattern. `None` for anything else.
pub(crate) fn named_pattern(format: &str, culture: &Culture) -> Option<Cow<'static, str>> {
    let pattern = match format.to_ascii_lowercase().as_str() {
        "'shortdate'" => Cow::Borrowed(culture.short_date),
        "'longdate'" => Cow::Borrowed(culture.long_date),
        "'shorttime'" => Cow::Borrowed(culture.short_time),
        "'shorttime24'" => Cow::Owned(to_24_hour(culture.short_time)),
        "'longtime'" => Cow::Borrowed(culture.long_time),
        "'longtime24'" => Cow::Owned(to_24_hour(culture.long_time)),
        "'shortdatetime'" => Cow::Owned(format!("{} {}", culture.short_date, culture.short_time)),
        "'shortdatetime24'" => Cow::Owned(to_24_hour(&format!(
            "{} {}",
            culture.short_date, culture.short_time
        ))),
        "'longdatetime'" => Cow::Owned(format!("{} {}", culture.long_date, culture.long_time)),
        "'longdatetime24'" => Cow::Owned(to_24_hour(&format!(
            "{} {}",
            culture.long_date, culture.long_time
        ))),
        "'utc'" | "utc" => Cow::Borrowed(UTC_PATTERN),
        _ => return None,
    };
    Some(pattern)
}

/// Whether `format` names the UTC format.
pub(crate) fn is_utc(format: &str) -> bool {
    matches!(format.to_ascii_lowercase().as_str(), "'utc'" | "utc")
}

/// Drop the AM/PM designator so hours render on the 24-hour clock.
fn to_24_hour(pattern: &str) -> String {
    patterns()
        .designator
        .replace_all(pattern, "")
        .trim()
        .to_string()
}

/// Whether `format` contains date or time tokens outside quoted literals.
pub(crate) fn has_date_tokens(format: &str) -> bool {
    let unquoted = patterns().quoted.replace_all(format, "");
    unquoted
        .chars()
        .any(|c| matches!(c, 'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S'))
        || patterns().ampm.is_match(&unquoted)
}

// ═══════════════════════════════════════════════════════════════════
// Formatting
// ═══════════════════════════════════════════════════════════════════

/// Format `dt` with a pattern in the formula token alphabet.
pub(crate) fn format(pattern: &str, dt: NaiveDateTime, culture: &Culture) -> String {
    let mut literals = Vec::new();
    let body = patterns().quoted.replace_all(pattern, |caps: &regex::Captures<'_>| {
        literals.push(caps[0].trim_matches('"').to_string());
        QUOTED.to_string()
    });
    let tokens = tokenize(&body);
    let text = detokenize(&tokens, dt, culture);

    let mut literals = literals.into_iter();
    text.chars()
        .fold(String::with_capacity(text.len()), |mut out, c| {
            if c == QUOTED {
                out.push_str(&literals.next().unwrap_or_default());
            } else {
                out.push(c);
            }
            out
        })
}

/// Rewrite format letters into markers.
fn tokenize(format: &str) -> String {
    let p = patterns();
    let ampm = AMPM.to_string();
    let ap = AP.to_string();
    let minute = MINUTE.to_string();

    let mut format = p.ampm.replace_all(format, ampm.as_str()).into_owned();
    format = p.ap.replace_all(&format, ap.as_str()).into_owned();

    // Minutes before seconds
    while let Some(m) = p.minutes_before_seconds.find(&format) {
        let at = m.start();
        format.replace_range(at..at + 1, &minute);
    }

    // Minutes after hours
    while let Some(m) = p.minutes_after_hours.find(&format) {
        let Some(first) = p.minute.find(&format[m.start()..]) else {
            break;
        };
        let at = m.start() + first.start();
        format.replace_range(at..at + 1, &minute);
    }

    format
        .chars()
        .map(|c| match c {
            'm' | 'M' => MONTH,
            'd' | 'D' => DAY,
            'y' | 'Y' => YEAR,
            'h' | 'H' => HOUR,
            's' | 'S' => SECOND,
            '0' => FRACTION,
            other => other,
        })
        .collect()
}

/// Replace runs of markers with date components.
fn detokenize(tokens: &str, dt: NaiveDateTime, culture: &Culture) -> String {
    let twelve_hour = tokens.contains(AMPM) || tokens.contains(AP);
    let chars: Vec<char> = tokens.chars().collect();
    let mut out = String::with_capacity(chars.len() * 2);

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let consumed = match c {
            DAY => {
                let weekday = dt.weekday().num_days_from_sunday() as usize;
                match run {
                    1 => out.push_str(&dt.day().to_string()),
                    2 => out.push_str(&format!("{:02}", dt.day())),
                    3 => out.push_str(culture.day_abbreviations[weekday]),
                    _ => out.push_str(culture.day_names[weekday]),
                }
                run
            }
            MONTH => {
                let month = dt.month0() as usize;
                match run {
                    1 => out.push_str(&dt.month().to_string()),
                    2 => out.push_str(&format!("{:02}", dt.month())),
                    3 => out.push_str(culture.month_abbreviations[month]),
                    _ => out.push_str(culture.month_names[month]),
                }
                run
            }
            YEAR => {
                if run >= 3 {
                    out.push_str(&format!("{:04}", dt.year()));
                } else {
                    out.push_str(&format!("{:02}", dt.year().rem_euclid(100)));
                }
                run
            }
            HOUR => {
                let hour = if twelve_hour {
                    match dt.hour() % 12 {
                        0 => 12,
                        h => h,
                    }
                } else {
                    dt.hour()
                };
                push_padded(&mut out, hour, run);
                run
            }
            MINUTE => {
                push_padded(&mut out, dt.minute(), run);
                run
            }
            SECOND => {
                push_padded(&mut out, dt.second(), run);
                run
            }
            FRACTION => {
                let nanos = format!("{:09}", dt.nanosecond() % 1_000_000_000);
                let digits = run.min(9);
                out.push_str(&nanos[..digits]);
                out.extend(std::iter::repeat('0').take(run - digits));
                run
            }
            AMPM => {
                out.push_str(designator(dt, culture));
                1
            }
            AP => {
                if let Some(first) = designator(dt, culture).chars().next() {
                    out.extend(first.to_lowercase());
                }
                1
            }
            other => {
                out.push(other);
                1
            }
        };
        i += consumed;
    }
    out
}

fn push_padded(out: &mut String, value: u32, run: usize) {
    if run >= 2 {
        out.push_str(&format!("{value:02}"));
    } else {
        out.push_str(&value.to_string());
    }
}

fn designator(dt: NaiveDateTime, culture: &Culture) -> &'static str {
    if dt.hour() < 12 {
        culture.am
    } else {
        culture.pm
    }
}
