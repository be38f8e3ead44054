//! String functions
//!
//! Positions and lengths count characters, starting at 1. Functions that
//! build strings whose size the arguments do not bound ask the governor
//! first.

use std::borrow::Cow;
use std::sync::OnceLock;

use futures_util::future::{BoxFuture, FutureExt};
use regex::Regex;

use super::convert;
use super::policy::{Accept, ArgExpansion, BlankReplacement, TypeCheck, ValueCheck, ValueRule};
use super::{arg, errors_among, lambda_arg, RegistryBuilder, StandardErrorHandling, Target};
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue, TableValue, ValueKind};

const TEXT: Accept = Accept::ExactOrBlank(ValueKind::String);

fn empty() -> Option<FormulaValue> {
    Some(FormulaValue::string(""))
}

fn zero() -> Option<FormulaValue> {
    Some(FormulaValue::Number(0.0))
}

/// Function of one text argument; blank reads as `""`.
fn unary(name: &'static str, target: Target) -> StandardErrorHandling {
    StandardErrorHandling::new(name, target)
        .blanks(BlankReplacement::empty_string())
        .types(TypeCheck::Uniform(TEXT))
}

pub(crate) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    let builder = builder
        .add(unary("Len", Target::Sync(len)))
        .add(
            StandardErrorHandling::new("Left", Target::Sync(left))
                .blanks(BlankReplacement::Positional(vec![empty(), zero()]))
                .types(TypeCheck::Sequence(vec![TEXT, Accept::Numeric])),
        )
        .add(
            StandardErrorHandling::new("Right", Target::Sync(right))
                .blanks(BlankReplacement::Positional(vec![empty(), zero()]))
                .types(TypeCheck::Sequence(vec![TEXT, Accept::Numeric])),
        )
        .add(
            StandardErrorHandling::new("Mid", Target::Sync(mid))
                .blanks(BlankReplacement::Positional(vec![empty(), zero(), zero()]))
                .types(TypeCheck::Sequence(vec![TEXT, Accept::Numeric])),
        )
        .add(unary("Upper", Target::Sync(upper)))
        .add(unary("Lower", Target::Sync(lower)))
        .add(unary("Proper", Target::Sync(proper)))
        .add(unary("Trim", Target::Sync(trim)))
        .add(unary("TrimEnds", Target::Sync(trim_ends)))
        .add(
            StandardErrorHandling::new("Concatenate", Target::Sync(concatenate))
                .blanks(BlankReplacement::empty_string()),
        )
        .add(
            StandardErrorHandling::new("Concat", Target::Async(concat))
                .expand(ArgExpansion::PadTrailing {
                    required: 2,
                    defaults: vec![FormulaValue::string("")],
                })
                .blanks(BlankReplacement::Positional(vec![None, None, empty()])),
        );

    let builder = builder
        .add(
            StandardErrorHandling::new("Find", Target::Sync(find))
                .expand(ArgExpansion::PadTrailing {
                    required: 2,
                    defaults: vec![FormulaValue::Number(1.0)],
                })
                .blanks(BlankReplacement::Positional(vec![
                    empty(),
                    empty(),
                    Some(FormulaValue::Number(1.0)),
                ]))
                .types(TypeCheck::Sequence(vec![TEXT, TEXT, Accept::Numeric])),
        )
        .add(
            StandardErrorHandling::new("Replace", Target::Sync(replace))
                .blanks(BlankReplacement::Positional(vec![empty(), zero(), zero(), empty()]))
                .types(TypeCheck::Sequence(vec![TEXT, Accept::Numeric, Accept::Numeric, TEXT])),
        )
        .add(
            StandardErrorHandling::new("Substitute", Target::Sync(substitute))
                .blanks(BlankReplacement::Positional(vec![empty(), empty(), empty()]))
                .types(TypeCheck::Sequence(vec![TEXT, TEXT, TEXT, Accept::Numeric]))
                .values(ValueCheck::Sequence(vec![
                    ValueRule::Any,
                    ValueRule::Any,
                    ValueRule::Any,
                    ValueRule::Positive,
                ])),
        )
        .add(
            StandardErrorHandling::new("Split", Target::Sync(split))
                .blanks(BlankReplacement::empty_string())
                .types(TypeCheck::Uniform(TEXT)),
        )
        .add(
            StandardErrorHandling::new("StartsWith", Target::Sync(starts_with))
                .blanks(BlankReplacement::empty_string())
                .types(TypeCheck::Uniform(TEXT)),
        )
        .add(
            StandardErrorHandling::new("EndsWith", Target::Sync(ends_with))
                .blanks(BlankReplacement::empty_string())
                .types(TypeCheck::Uniform(TEXT)),
        )
        .add(
            StandardErrorHandling::new("Char", Target::Sync(char_))
                .blanks(BlankReplacement::zero())
                .types(TypeCheck::Uniform(Accept::Numeric)),
        )
        .add(unary("EncodeUrl", Target::Sync(encode_url)));

    builder
        .tabular("LenT", "Len", BlankReplacement::empty_string())
        .tabular("UpperT", "Upper", BlankReplacement::empty_string())
        .tabular("LowerT", "Lower", BlankReplacement::empty_string())
        .tabular("TrimT", "Trim", BlankReplacement::empty_string())
        .multi_tabular(
            "LeftT",
            "Left",
            BlankReplacement::Positional(vec![empty(), zero()]),
        )
        .multi_tabular(
            "RightT",
            "Right",
            BlankReplacement::Positional(vec![empty(), zero()]),
        )
        .multi_tabular("ConcatenateT", "Concatenate", BlankReplacement::empty_string())
        .multi_tabular(
            "MidT",
            "Mid",
            BlankReplacement::Positional(vec![empty(), zero(), zero()]),
        )
}

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

fn text(args: &[FormulaValue], i: usize) -> &str {
    arg(args, i).as_str().unwrap_or_default()
}

fn num(args: &[FormulaValue], i: usize) -> f64 {
    arg(args, i).as_f64().unwrap_or(0.0)
}

/// Text form of any scalar, as used by `Concatenate` and `Concat`.
fn text_of<'v>(ctx: &EvalContext, value: &'v FormulaValue) -> Option<Cow<'v, str>> {
    match value {
        FormulaValue::String(s) => Some(Cow::Borrowed(s)),
        other => convert::to_text(other, ctx.culture()).map(Cow::Owned),
    }
}

/// `s` as a value, if the governor allows a string of its size.
fn governed(ctx: &EvalContext, ir: &IrContext, s: String) -> FormulaValue {
    if ctx.governor().can_allocate_string(s.chars().count()) {
        FormulaValue::String(s.into())
    } else {
        FormulaValue::Error(ErrorValue::insufficient_memory(ir))
    }
}

/// Byte offset of character `index`, clamped to the end.
fn byte_offset(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map_or(s.len(), |(b, _)| b)
}

// ═══════════════════════════════════════════════════════════════════
// Slicing
// ═══════════════════════════════════════════════════════════════════

fn len(_: &EvalContext, _: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::Number(text(args, 0).chars().count() as f64))
}

fn left(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let count = num(args, 1).trunc();
    if count < 0.0 || count.is_nan() {
        return Ok(FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            "Left count must not be negative.",
        )));
    }
    let s = text(args, 0);
    Ok(FormulaValue::string(&s[..byte_offset(s, count as usize)]))
}

fn right(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let count = num(args, 1).trunc();
    if count < 0.0 || count.is_nan() {
        return Ok(FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            "Right count must not be negative.",
        )));
    }
    let s = text(args, 0);
    let total = s.chars().count();
    let skip = total.saturating_sub(count as usize);
    Ok(FormulaValue::string(&s[byte_offset(s, skip)..]))
}

/// `Mid(text, start, [count])`
fn mid(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let start = num(args, 1);
    let count = if args.len() > 2 { num(args, 2) } else { f64::MAX };

    let mut errors = Vec::new();
    if !start.is_finite() || start.trunc() <= 0.0 {
        errors.push(ErrorValue::argument_out_of_range(ir));
    }
    if count.is_nan() || count.is_infinite() || count < 0.0 {
        errors.push(ErrorValue::argument_out_of_range(ir));
    }
    if let Some(err) = ErrorValue::combine(ir.result_type.clone(), &errors) {
        return Ok(FormulaValue::Error(err));
    }

    let s = text(args, 0);
    let from = byte_offset(s, start.trunc() as usize - 1);
    let rest = &s[from..];
    let to = byte_offset(rest, count.trunc().min(usize::MAX as f64) as usize);
    Ok(FormulaValue::string(&rest[..to]))
}

// ═══════════════════════════════════════════════════════════════════
// Case and Whitespace
// ═══════════════════════════════════════════════════════════════════

fn upper(_: &EvalContext, _: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::string(text(args, 0).to_uppercase()))
}

fn lower(_: &EvalContext, _: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::string(text(args, 0).to_lowercase()))
}

/// Upper-case the first letter of every word, lower-case the rest.
fn proper(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let mut out = String::with_capacity(text(args, 0).len());
    let mut word_start = true;
    for c in text(args, 0).chars() {
        if c.is_alphabetic() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = !c.is_numeric();
        }
    }
    Ok(FormulaValue::string(out))
}

/// Runs of spaces and tabs. Line breaks and non-breaking spaces survive.
fn inner_spaces() -> &'static Regex {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    SPACES.get_or_init(|| Regex::new(r"[^\S\xA0\n\x0B\f\r]+").expect("valid regex"))
}

fn trim(_: &EvalContext, _: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let collapsed = inner_spaces().replace_all(text(args, 0), " ");
    Ok(FormulaValue::string(collapsed.trim()))
}

fn trim_ends(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(FormulaValue::string(text(args, 0).trim()))
}

// ═══════════════════════════════════════════════════════════════════
// Joining
// ═══════════════════════════════════════════════════════════════════

fn concatenate(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let mut out = String::new();
    for a in args {
        match text_of(ctx, a) {
            Some(s) => out.push_str(&s),
            None => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
        }
    }
    Ok(governed(ctx, ir, out))
}

/// `Concat(table, expression, [separator])`
fn concat<'a>(
    ev: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let table = match arg(&args, 0) {
            FormulaValue::Table(t) => t,
            FormulaValue::Blank(_) => return Ok(FormulaValue::string("")),
            _ => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
        };
        let body = lambda_arg("Concat", &args, 1)?;
        let separator = text(&args, 2);

        let mut values = Vec::with_capacity(table.len());
        for row in table.rows() {
            ctx.check_cancelled()?;
            values.push(ev.force_in_row(body, ctx, row, table.row_type()).await?);
        }
        if let Some(err) = errors_among(&values, ir) {
            return Ok(err);
        }

        let mut parts = Vec::with_capacity(values.len());
        for value in &values {
            match text_of(ctx, value) {
                Some(s) => parts.push(s.into_owned()),
                None => return Ok(FormulaValue::Error(ErrorValue::runtime_type_mismatch(ir))),
            }
        }
        Ok(governed(ctx, ir, parts.join(separator)))
    }
    .boxed()
}

fn split(_: &EvalContext, _: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let (s, separator) = (text(args, 0), text(args, 1));
    let parts: Vec<FormulaValue> = if separator.is_empty() {
        s.chars().map(|c| FormulaValue::string(c.to_string())).collect()
    } else {
        s.split(separator).map(FormulaValue::string).collect()
    };
    Ok(FormulaValue::Table(TableValue::single_column(
        FormulaType::String,
        parts,
    )))
}

// ═══════════════════════════════════════════════════════════════════
// Searching and Replacing
// ═══════════════════════════════════════════════════════════════════

/// `Find(find, within, [start = 1])`: 1-based position or blank.
fn find(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let (needle, haystack) = (text(args, 0), text(args, 1));
    let start = num(args, 2).trunc();
    let total = haystack.chars().count();
    if start.is_nan() || start < 1.0 || start > total as f64 + 1.0 {
        return Ok(FormulaValue::Error(ErrorValue::argument_out_of_range(ir)));
    }
    let from = byte_offset(haystack, start as usize - 1);
    Ok(match haystack[from..].find(needle) {
        Some(at) => FormulaValue::Number((haystack[..from + at].chars().count() + 1) as f64),
        None => FormulaValue::Blank(ir.result_type.clone()),
    })
}

/// `Replace(text, start, count, replacement)`
fn replace(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (start, count) = (num(args, 1).trunc(), num(args, 2).trunc());
    if start.is_nan() || start <= 0.0 || count.is_nan() || count < 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::argument_out_of_range(ir)));
    }
    let (s, replacement) = (text(args, 0), text(args, 3));
    let start = start.min(usize::MAX as f64) as usize - 1;
    let prefix_end = byte_offset(s, start);
    let suffix_start = byte_offset(s, start.saturating_add(count.min(usize::MAX as f64) as usize));
    let out = format!("{}{}{}", &s[..prefix_end], replacement, &s[suffix_start..]);
    Ok(governed(ctx, ir, out))
}

/// Upper bound on the length of a `Substitute` result.
fn substitute_result_length(source: usize, old: usize, new: usize, replace_all: bool) -> usize {
    let estimate = if old > source {
        source
    } else if replace_all {
        if old == 0 {
            source
        } else {
            source.div_ceil(old).saturating_mul(new)
        }
    } else {
        (source - old).saturating_add(new)
    };
    estimate.max(source)
}

/// `Substitute(text, old, new, [instance])`
///
/// Without an instance every occurrence is replaced; otherwise only the
/// given one, counting non-overlapping matches from the left.
fn substitute(
    ctx: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (source, old, new) = (text(args, 0), text(args, 1), text(args, 2));
    let instance = arg(args, 3).as_f64().map(f64::trunc);
    let source_len = source.chars().count();

    if instance.is_some_and(|n| n > source_len as f64) {
        return Ok(FormulaValue::string(source));
    }

    let max_len = substitute_result_length(
        source_len,
        old.chars().count(),
        new.chars().count(),
        instance.is_none(),
    );
    if !ctx.governor().can_allocate_string(max_len) {
        return Ok(FormulaValue::Error(ErrorValue::insufficient_memory(ir)));
    }

    if old.is_empty() {
        return Ok(FormulaValue::string(source));
    }
    let out = match instance {
        None => source.replace(old, new),
        Some(n) => match source.match_indices(old).nth(n as usize - 1) {
            Some((at, _)) => format!("{}{}{}", &source[..at], new, &source[at + old.len()..]),
            None => source.to_string(),
        },
    };
    Ok(FormulaValue::string(out))
}

fn starts_with(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (s, prefix) = (text(args, 0).to_lowercase(), text(args, 1).to_lowercase());
    Ok(FormulaValue::Boolean(s.starts_with(&prefix)))
}

fn ends_with(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (s, suffix) = (text(args, 0).to_lowercase(), text(args, 1).to_lowercase());
    Ok(FormulaValue::Boolean(s.ends_with(&suffix)))
}

// ═══════════════════════════════════════════════════════════════════
// Characters and Encoding
// ═══════════════════════════════════════════════════════════════════

fn char_(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let code = num(args, 0).trunc();
    if !(1.0..256.0).contains(&code) {
        return Ok(FormulaValue::Error(ErrorValue::invalid_argument(
            ir,
            "Char code must be between 1 and 255.",
        )));
    }
    Ok(match char::from_u32(code as u32) {
        Some(c) => FormulaValue::string(c.to_string()),
        None => FormulaValue::Error(ErrorValue::invalid_argument(ir, "Invalid character code.")),
    })
}

/// Percent-encode everything except unreserved characters.
fn encode_url(
    _: &EvalContext,
    _: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let s = text(args, 0);
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    Ok(FormulaValue::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::context::CancellationToken;
    use crate::ir::IrNode;
    use crate::services::ServiceRegistry;
    use crate::value::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn call_in(ctx: &EvalContext, f: &str, args: Vec<IrNode>, ty: FormulaType) -> FormulaValue {
        Evaluator::new()
            .eval_blocking(&IrNode::call(f, args, ty), ctx)
            .unwrap()
    }

    fn call(f: &str, args: Vec<IrNode>) -> FormulaValue {
        call_in(&EvalContext::new(), f, args, FormulaType::String)
    }

    fn t(s: &str) -> IrNode {
        IrNode::text(s)
    }

    fn n(x: f64) -> IrNode {
        IrNode::number(x)
    }

    fn s(v: &str) -> FormulaValue {
        FormulaValue::string(v)
    }

    fn kind(value: &FormulaValue) -> ErrorKind {
        value.as_error().unwrap().first().kind
    }

    #[test]
    fn test_left_right_mid() {
        assert_eq!(call("Left", vec![t("hello"), n(2.0)]), s("he"));
        assert_eq!(call("Left", vec![t("hi"), n(10.0)]), s("hi"));
        assert_eq!(call("Right", vec![t("hello"), n(3.0)]), s("llo"));
        assert_eq!(call("Mid", vec![t("hello"), n(2.0), n(3.0)]), s("ell"));
        assert_eq!(call("Mid", vec![t("hello"), n(9.0), n(3.0)]), s(""));
        assert_eq!(call("Mid", vec![t("hello"), n(4.0)]), s("lo"));
        assert_eq!(kind(&call("Left", vec![t("x"), n(-1.0)])), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_mid_bad_arguments_are_combined() {
        let value = call("Mid", vec![t("hello"), n(0.0), n(-1.0)]);
        let err = value.as_error().unwrap();
        assert_eq!(err.errors().len(), 2);
        assert!(err
            .errors()
            .iter()
            .all(|e| e.kind == ErrorKind::ArgumentOutOfRange));
    }

    #[test]
    fn test_blank_arguments_are_replaced_before_target() {
        let blank = IrNode::blank(FormulaType::String);
        assert_eq!(
            call("Left", vec![blank, IrNode::blank(FormulaType::Number)]),
            s("")
        );
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(call("Upper", vec![t("abc")]), s("ABC"));
        assert_eq!(call("Proper", vec![t("hello wORLD")]), s("Hello World"));
        assert_eq!(call("Trim", vec![t("  a \t  b  ")]), s("a b"));
        assert_eq!(call("TrimEnds", vec![t("  a   b  ")]), s("a   b"));
    }

    #[test]
    fn test_find_positions() {
        let find = |needle: &str, hay: &str, start: Option<f64>| {
            let mut args = vec![t(needle), t(hay)];
            args.extend(start.map(n));
            call_in(&EvalContext::new(), "Find", args, FormulaType::Number)
        };
        assert_eq!(find("lo", "hello", None), FormulaValue::Number(4.0));
        assert_eq!(find("l", "hello", Some(4.0)), FormulaValue::Number(4.0));
        assert_eq!(find("z", "hello", None), FormulaValue::Blank(FormulaType::Number));
        assert_eq!(kind(&find("l", "hello", Some(9.0))), ErrorKind::ArgumentOutOfRange);
    }

    #[test]
    fn test_replace() {
        assert_eq!(
            call("Replace", vec![t("abcdef"), n(2.0), n(3.0), t("XY")]),
            s("aXYef")
        );
        assert_eq!(
            kind(&call("Replace", vec![t("abc"), n(0.0), n(1.0), t("x")])),
            ErrorKind::ArgumentOutOfRange
        );
    }

    #[test]
    fn test_substitute_all_and_nth() {
        assert_eq!(
            call("Substitute", vec![t("a-b-c"), t("-"), t("+")]),
            s("a+b+c")
        );
        assert_eq!(
            call("Substitute", vec![t("a-b-c"), t("-"), t("+"), n(2.0)]),
            s("a-b+c")
        );
        assert_eq!(
            kind(&call("Substitute", vec![t("abc"), t("b"), t("x"), n(0.0)])),
            ErrorKind::ArgumentOutOfRange
        );
    }

    #[test]
    fn test_substitute_instance_past_length_returns_source() {
        assert_eq!(
            call("Substitute", vec![t("abc"), t(""), t("x"), n(4.0)]),
            s("abc")
        );
        assert_eq!(
            call("Substitute", vec![t("abc"), t("b"), t("x"), n(100.0)]),
            s("abc")
        );
    }

    #[test]
    fn test_substitute_is_governed() {
        let config = RuntimeConfig::default().with_max_string_length(20);
        let ctx = EvalContext::from_config(
            &config,
            Arc::new(ServiceRegistry::new()),
            CancellationToken::new(),
        );
        let value = call_in(
            &ctx,
            "Substitute",
            vec![t("aaaaaaaaaa"), t("a"), t("bbbbbbbbbb")],
            FormulaType::String,
        );
        assert_eq!(kind(&value), ErrorKind::InsufficientMemory);
    }

    #[test]
    fn test_substitute_length_estimate() {
        assert_eq!(substitute_result_length(10, 20, 5, true), 10);
        assert_eq!(substitute_result_length(10, 0, 5, true), 10);
        assert_eq!(substitute_result_length(10, 3, 6, true), 24);
        assert_eq!(substitute_result_length(10, 2, 1, false), 10);
        assert_eq!(substitute_result_length(10, 2, 7, false), 15);
    }

    #[test]
    fn test_split_and_concatenate() {
        let value = call_in(
            &EvalContext::new(),
            "Split",
            vec![t("a,b,c"), t(",")],
            FormulaType::single_column_table(FormulaType::String),
        );
        let table = value.as_table().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column_value(1), Some(s("b")));
        assert_eq!(
            call("Concatenate", vec![t("a"), n(1.0), IrNode::blank(FormulaType::String)]),
            s("a1")
        );
    }

    #[test]
    fn test_starts_ends_with_ignore_case() {
        let b = |f: &str, a: &str, c: &str| {
            call_in(&EvalContext::new(), f, vec![t(a), t(c)], FormulaType::Boolean)
        };
        assert_eq!(b("StartsWith", "Hello", "he"), FormulaValue::Boolean(true));
        assert_eq!(b("EndsWith", "Hello", "LO"), FormulaValue::Boolean(true));
        assert_eq!(b("EndsWith", "Hello", "x"), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_char_and_encode_url() {
        assert_eq!(call("Char", vec![n(65.0)]), s("A"));
        assert_eq!(kind(&call("Char", vec![n(0.0)])), ErrorKind::InvalidArgument);
        assert_eq!(call("EncodeUrl", vec![t("a b&c")]), s("a%20b%26c"));
    }
}
