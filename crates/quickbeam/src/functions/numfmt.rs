//! Custom number formats for `Text(number, format)`
//!
//! Supported: `0` and `#` digit placeholders, `,` grouping (or scaling by
//! 1000 when trailing), `.` decimal point, `%`, double-quoted literals,
//! backslash escapes, and an optional second `;` section for negatives.

use super::convert::round_half_away;
use crate::config::Culture;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Digit { zero: bool },
    Point,
    Comma,
    Percent,
    Literal(String),
}

fn tokenize(section: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        let token = match c {
            '0' => Token::Digit { zero: true },
            '#' => Token::Digit { zero: false },
            '.' => Token::Point,
            ',' => Token::Comma,
            '%' => Token::Percent,
            '\\' => Token::Literal(chars.next()?.to_string()),
            '"' => {
                let literal: String = chars.by_ref().take_while(|&c| c != '"').collect();
                Token::Literal(literal)
            }
            other => Token::Literal(other.to_string()),
        };
        tokens.push(token);
    }
    Some(tokens)
}

struct Layout {
    int_zeros: usize,
    frac_zeros: usize,
    frac_max: usize,
    grouping: bool,
    scale: i32,
    percents: i32,
}

fn layout(tokens: &[Token]) -> Layout {
    let point = tokens
        .iter()
        .position(|t| *t == Token::Point)
        .unwrap_or(tokens.len());
    let (int_part, frac_part) = tokens.split_at(point);

    let is_digit = |t: &Token| matches!(t, Token::Digit { .. });
    let first_int_digit = int_part.iter().position(is_digit);
    let last_int_digit = int_part.iter().rposition(is_digit);
    let last_digit = tokens.iter().rposition(is_digit);

    // Commas between integer digits group; commas trailing the digits scale.
    let mut grouping = false;
    let mut scale = 0;
    for (i, t) in tokens.iter().enumerate() {
        if *t != Token::Comma {
            continue;
        }
        let in_int = i < point;
        match (first_int_digit, last_int_digit) {
            (Some(first), Some(last)) if in_int && i > first && i < last => grouping = true,
            (Some(_), Some(last)) if in_int && i > last => scale += 1,
            _ if last_digit.is_some_and(|d| i > d) => scale += 1,
            _ => {}
        }
    }

    Layout {
        int_zeros: int_part
            .iter()
            .filter(|t| **t == Token::Digit { zero: true })
            .count(),
        frac_zeros: frac_part
            .iter()
            .filter(|t| **t == Token::Digit { zero: true })
            .count(),
        frac_max: frac_part.iter().filter(|t| is_digit(t)).count(),
        grouping,
        scale,
        percents: tokens.iter().filter(|t| **t == Token::Percent).count() as i32,
    }
}

fn group(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Format `n` with a custom number format. `None` if the format is
/// malformed.
pub(crate) fn format_number(n: f64, format: &str, culture: &Culture) -> Option<String> {
    let mut sections = format.splitn(2, ';');
    let positive = sections.next().unwrap_or_default();
    let negative = sections.next();
    let (section, explicit_sign) = match negative {
        Some(neg) if n < 0.0 => (neg, true),
        _ => (positive, false),
    };

    let tokens = tokenize(section)?;
    let layout = layout(&tokens);

    let scaled = n.abs() * 100f64.powi(layout.percents) / 1000f64.powi(layout.scale);
    let rounded = round_half_away(scaled, layout.frac_max as i32);
    let text = format!("{:.*}", layout.frac_max, rounded);
    let (int_digits, frac_digits) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut frac = frac_digits.to_string();
    while frac.len() > layout.frac_zeros && frac.ends_with('0') {
        frac.pop();
    }
    let mut int = int_digits.trim_start_matches('0').to_string();
    while int.len() < layout.int_zeros {
        int.insert(0, '0');
    }
    if layout.grouping {
        int = group(&int, culture.group_separator);
    }

    let mut out = String::new();
    let mut int_done = false;
    let mut frac_done = false;
    let mut after_point = false;
    for token in &tokens {
        match token {
            Token::Digit { .. } if !after_point => {
                if !int_done {
                    out.push_str(&int);
                    int_done = true;
                }
            }
            Token::Digit { .. } => {
                if !frac_done {
                    out.push_str(&frac);
                    frac_done = true;
                }
            }
            Token::Point => {
                after_point = true;
                if !frac.is_empty() {
                    out.push(culture.decimal_separator);
                }
            }
            Token::Comma => {}
            Token::Percent => out.push('%'),
            Token::Literal(s) => out.push_str(s),
        }
    }

    let nonzero = int.chars().chain(frac.chars()).any(|c| c.is_ascii_digit() && c != '0');
    if n < 0.0 && !explicit_sign && nonzero {
        out.insert(0, '-');
    }
    Some(out)
}
