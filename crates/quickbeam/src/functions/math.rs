//! Numeric functions
//!
//! Arguments arrive as `Number` or `Decimal`. Decimal arguments keep
//! exact arithmetic where the operation allows it (`Abs`, `Int`, the
//! rounding family, `Sum`); everything else is computed in `f64` and
//! converted back when the call is typed `Decimal`. Non-finite results
//! become `Numeric` errors.

use std::f64::consts::{FRAC_PI_2, PI};

use futures_util::future::{BoxFuture, FutureExt};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::convert::round_half_away;
use super::policy::{Accept, ArgExpansion, BlankReplacement, TypeCheck, ValueCheck, ValueRule};
use super::{arg, RegistryBuilder, StandardErrorHandling, Target};
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue};

/// Scalar numeric function: blanks are zero, arguments must be numeric.
fn numeric(name: &'static str, target: Target) -> StandardErrorHandling {
    StandardErrorHandling::new(name, target)
        .blanks(BlankReplacement::zero())
        .types(TypeCheck::Uniform(Accept::Numeric))
}

pub(crate) fn register(builder: RegistryBuilder) -> RegistryBuilder {
    let builder = builder
        .add(numeric("Abs", Target::Sync(abs)))
        .add(numeric("Sqrt", Target::Sync(sqrt)))
        .add(numeric("Power", Target::Sync(power)))
        .add(numeric("Exp", Target::Sync(exp)))
        .add(numeric("Ln", Target::Sync(ln)))
        .add(numeric("Log", Target::Sync(log)).expand(ArgExpansion::PadTrailing {
            required: 1,
            defaults: vec![FormulaValue::Number(10.0)],
        }))
        .add(numeric("Int", Target::Sync(int)))
        .add(numeric("Trunc", Target::Sync(trunc)).expand(ArgExpansion::PadTrailing {
            required: 1,
            defaults: vec![FormulaValue::Number(0.0)],
        }))
        .add(numeric("Round", Target::Sync(round)))
        .add(numeric("RoundUp", Target::Sync(round_up)))
        .add(numeric("RoundDown", Target::Sync(round_down)))
        .add(numeric("Mod", Target::Sync(modulo)));

    let builder = builder
        .add(numeric("Acos", Target::Sync(acos)))
        .add(numeric("Asin", Target::Sync(asin)))
        .add(numeric("Atan", Target::Sync(atan)))
        .add(numeric("Cos", Target::Sync(cos)))
        .add(numeric("Sin", Target::Sync(sin)))
        .add(numeric("Tan", Target::Sync(tan)))
        .add(numeric("Cot", Target::Sync(cot)))
        .add(numeric("Acot", Target::Sync(acot)))
        .add(numeric("Atan2", Target::Sync(atan2)))
        .add(StandardErrorHandling::new("Pi", Target::Sync(pi)));

    let builder = builder
        .add(numeric("Sum", Target::Sync(sum)))
        .add(
            StandardErrorHandling::new("Average", Target::Sync(average))
                .types(TypeCheck::Uniform(Accept::Numeric)),
        )
        .add(
            StandardErrorHandling::new("Max", Target::Sync(max))
                .types(TypeCheck::Uniform(Accept::Numeric)),
        )
        .add(
            StandardErrorHandling::new("Min", Target::Sync(min))
                .types(TypeCheck::Uniform(Accept::Numeric)),
        )
        .add(StandardErrorHandling::new("Rand", Target::Async(rand)))
        .add(
            numeric("RandBetween", Target::Async(rand_between))
                .values(ValueCheck::Uniform(ValueRule::Finite)),
        );

    builder
        .tabular("AbsT", "Abs", BlankReplacement::zero())
        .tabular("SqrtT", "Sqrt", BlankReplacement::zero())
        .tabular("IntT", "Int", BlankReplacement::zero())
        .multi_tabular("RoundT", "Round", BlankReplacement::zero())
}

// ═══════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════

fn num(args: &[FormulaValue], i: usize) -> f64 {
    arg(args, i).as_f64().unwrap_or(0.0)
}

/// `n` as a value of the call's type, or a `Numeric` error.
pub(crate) fn number_result(ir: &IrContext, n: f64) -> FormulaValue {
    if !n.is_finite() {
        return FormulaValue::Error(ErrorValue::numeric(ir));
    }
    match ir.result_type {
        FormulaType::Decimal => match Decimal::from_f64(n) {
            Some(d) => FormulaValue::Decimal(d),
            None => FormulaValue::Error(ErrorValue::numeric(ir)),
        },
        _ => FormulaValue::Number(n),
    }
}

/// Exact result for decimal calls, widened for number calls.
fn decimal_result(ir: &IrContext, d: Decimal) -> FormulaValue {
    match ir.result_type {
        FormulaType::Number => number_result(ir, d.to_f64().unwrap_or(f64::NAN)),
        _ => FormulaValue::Decimal(d),
    }
}

macro_rules! unary_fn {
    ($name:ident, $f:expr) => {
        fn $name(
            _: &EvalContext,
            ir: &IrContext,
            args: &[FormulaValue],
        ) -> Result<FormulaValue, EvalError> {
            let f: fn(f64) -> f64 = $f;
            Ok(number_result(ir, f(num(args, 0))))
        }
    };
}

// ═══════════════════════════════════════════════════════════════════
// Elementary
// ═══════════════════════════════════════════════════════════════════

fn abs(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(match arg(args, 0) {
        FormulaValue::Decimal(d) => decimal_result(ir, d.abs()),
        other => number_result(ir, other.as_f64().unwrap_or(0.0).abs()),
    })
}

unary_fn!(sqrt, f64::sqrt);
unary_fn!(exp, f64::exp);

fn power(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (base, exponent) = (num(args, 0), num(args, 1));
    if base == 0.0 && exponent < 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::divide_by_zero(ir)));
    }
    Ok(number_result(ir, base.powf(exponent)))
}

fn ln(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let n = num(args, 0);
    if n <= 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::numeric(ir)));
    }
    Ok(number_result(ir, n.ln()))
}

/// `Log(n, [base = 10])`
fn log(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let (n, base) = (num(args, 0), num(args, 1));
    if n <= 0.0 || base <= 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::numeric(ir)));
    }
    if base == 1.0 {
        return Ok(FormulaValue::Error(ErrorValue::divide_by_zero(ir)));
    }
    let value = if base == 10.0 {
        n.log10()
    } else if base == 2.0 {
        n.log2()
    } else {
        n.ln() / base.ln()
    };
    Ok(number_result(ir, value))
}

fn int(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(match arg(args, 0) {
        FormulaValue::Decimal(d) => decimal_result(ir, d.floor()),
        other => number_result(ir, other.as_f64().unwrap_or(0.0).floor()),
    })
}

/// `Mod(n, divisor)`; the result takes the sign of the divisor.
fn modulo(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (n, d) = (num(args, 0), num(args, 1));
    if d == 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::divide_by_zero(ir)));
    }
    Ok(number_result(ir, n - d * (n / d).floor()))
}

// ═══════════════════════════════════════════════════════════════════
// Rounding
// ═══════════════════════════════════════════════════════════════════

fn round_decimal(d: Decimal, digits: i64, strategy: RoundingStrategy) -> Option<Decimal> {
    if digits >= 0 {
        return Some(d.round_dp_with_strategy(digits.min(28) as u32, strategy));
    }
    let mut scale = Decimal::ONE;
    for _ in 0..(-digits) {
        scale = scale.checked_mul(Decimal::TEN)?;
    }
    d.checked_div(scale)?
        .round_dp_with_strategy(0, strategy)
        .checked_mul(scale)
}

fn round_float(n: f64, digits: i64, strategy: RoundingStrategy) -> f64 {
    // Decimal first: it sees 1.15 as 1.15, not 1.149999...
    if let Some(rounded) = Decimal::from_f64(n)
        .and_then(|d| round_decimal(d, digits, strategy))
        .and_then(|d| d.to_f64())
    {
        return rounded;
    }
    let digits = digits.clamp(-300, 300) as i32;
    let factor = 10f64.powi(digits);
    match strategy {
        RoundingStrategy::AwayFromZero => (n.abs() * factor).ceil().copysign(n) / factor,
        RoundingStrategy::ToZero => (n * factor).trunc() / factor,
        _ => round_half_away(n, digits),
    }
}

fn round_with(ir: &IrContext, args: &[FormulaValue], strategy: RoundingStrategy) -> FormulaValue {
    let digits = num(args, 1).trunc();
    if !digits.is_finite() {
        return FormulaValue::Error(ErrorValue::numeric(ir));
    }
    let digits = digits as i64;
    match arg(args, 0) {
        FormulaValue::Decimal(d) => match round_decimal(*d, digits, strategy) {
            Some(rounded) => decimal_result(ir, rounded),
            None => FormulaValue::Error(ErrorValue::numeric(ir)),
        },
        other => number_result(ir, round_float(other.as_f64().unwrap_or(0.0), digits, strategy)),
    }
}

fn round(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(round_with(ir, args, RoundingStrategy::MidpointAwayFromZero))
}

fn round_up(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(round_with(ir, args, RoundingStrategy::AwayFromZero))
}

fn round_down(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(round_with(ir, args, RoundingStrategy::ToZero))
}

/// `Trunc(n, [digits = 0])`
fn trunc(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(round_with(ir, args, RoundingStrategy::ToZero))
}

// ═══════════════════════════════════════════════════════════════════
// Trigonometry
// ═══════════════════════════════════════════════════════════════════

unary_fn!(acos, f64::acos);
unary_fn!(asin, f64::asin);
unary_fn!(atan, f64::atan);
unary_fn!(cos, f64::cos);
unary_fn!(sin, f64::sin);
unary_fn!(tan, f64::tan);
unary_fn!(acot, |x: f64| FRAC_PI_2 - x.atan());

fn cot(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    let t = num(args, 0).tan();
    if t == 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::divide_by_zero(ir)));
    }
    Ok(number_result(ir, 1.0 / t))
}

/// `Atan2(x, y)`: angle of the point `(x, y)`.
fn atan2(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    let (x, y) = (num(args, 0), num(args, 1));
    if x == 0.0 && y == 0.0 {
        return Ok(FormulaValue::Error(ErrorValue::divide_by_zero(ir)));
    }
    Ok(number_result(ir, y.atan2(x)))
}

fn pi(_: &EvalContext, ir: &IrContext, _: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(number_result(ir, PI))
}

// ═══════════════════════════════════════════════════════════════════
// Aggregates
// ═══════════════════════════════════════════════════════════════════

/// Sum of numeric values. Exact when every value is a decimal.
pub(crate) fn sum_values<'v>(
    ir: &IrContext,
    values: impl IntoIterator<Item = &'v FormulaValue>,
) -> FormulaValue {
    let values: Vec<_> = values.into_iter().filter(|v| !v.is_blank()).collect();
    let all_decimal =
        !values.is_empty() && values.iter().all(|v| matches!(v, FormulaValue::Decimal(_)));
    if all_decimal {
        let mut total = Decimal::ZERO;
        for v in &values {
            if let FormulaValue::Decimal(d) = v {
                match total.checked_add(*d) {
                    Some(t) => total = t,
                    None => return FormulaValue::Error(ErrorValue::numeric(ir)),
                }
            }
        }
        return decimal_result(ir, total);
    }
    number_result(ir, values.iter().filter_map(|v| v.as_f64()).sum())
}

/// Mean of the non-blank values; no values divides by zero.
pub(crate) fn average_values<'v>(
    ir: &IrContext,
    values: impl IntoIterator<Item = &'v FormulaValue>,
) -> FormulaValue {
    let numbers: Vec<f64> = values.into_iter().filter_map(FormulaValue::as_f64).collect();
    if numbers.is_empty() {
        return FormulaValue::Error(ErrorValue::divide_by_zero(ir));
    }
    number_result(ir, numbers.iter().sum::<f64>() / numbers.len() as f64)
}

/// Largest (or smallest) non-blank value; blank when there is none.
pub(crate) fn extreme_values<'v>(
    ir: &IrContext,
    values: impl IntoIterator<Item = &'v FormulaValue>,
    largest: bool,
) -> FormulaValue {
    let best = values
        .into_iter()
        .filter_map(FormulaValue::as_f64)
        .reduce(|a, b| if (b > a) == largest { b } else { a });
    match best {
        Some(n) => number_result(ir, n),
        None => FormulaValue::Blank(ir.result_type.clone()),
    }
}

fn sum(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(sum_values(ir, args))
}

fn average(
    _: &EvalContext,
    ir: &IrContext,
    args: &[FormulaValue],
) -> Result<FormulaValue, EvalError> {
    Ok(average_values(ir, args))
}

fn max(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(extreme_values(ir, args, true))
}

fn min(_: &EvalContext, ir: &IrContext, args: &[FormulaValue]) -> Result<FormulaValue, EvalError> {
    Ok(extreme_values(ir, args, false))
}

// ═══════════════════════════════════════════════════════════════════
// Random
// ═══════════════════════════════════════════════════════════════════

/// Next value from the host's random service, checked to lie in `[0, 1)`.
async fn next_random(ctx: &EvalContext) -> Result<f64, EvalError> {
    let value = ctx.services().random().next_f64().await;
    if (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        log::warn!("random service returned {value}, outside [0, 1)");
        Err(EvalError::ServiceContract {
            service: "random",
            message: format!("{value} is outside [0, 1)"),
        })
    }
}

fn rand<'a>(
    _: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    _: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move { Ok(number_result(ir, next_random(ctx).await?)) }.boxed()
}

/// `RandBetween(lo, hi)`: integer in `[ceil(lo), floor(hi)]`.
fn rand_between<'a>(
    _: &'a Evaluator,
    ctx: &'a EvalContext,
    ir: &'a IrContext,
    args: Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
    async move {
        let lo = num(&args, 0).ceil();
        let hi = num(&args, 1).floor();
        if lo > hi {
            return Ok(FormulaValue::Error(ErrorValue::argument_out_of_range(ir)));
        }
        let r = next_random(ctx).await?;
        Ok(number_result(ir, (r * (hi - lo + 1.0)).floor() + lo))
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationToken;
    use crate::config::RuntimeConfig;
    use crate::ir::IrNode;
    use crate::services::{RandomService, ServiceRegistry};
    use crate::value::ErrorKind;
    use futures_util::future;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn call(f: &str, args: Vec<IrNode>) -> FormulaValue {
        let node = IrNode::call(f, args, FormulaType::Number);
        Evaluator::new()
            .eval_blocking(&node, &EvalContext::new())
            .unwrap()
    }

    fn n(x: f64) -> IrNode {
        IrNode::number(x)
    }

    fn kind(value: &FormulaValue) -> ErrorKind {
        value.as_error().unwrap().first().kind
    }

    #[test]
    fn test_abs_and_blank_as_zero() {
        assert_eq!(call("Abs", vec![n(-3.5)]), FormulaValue::Number(3.5));
        assert_eq!(
            call("Abs", vec![IrNode::blank(FormulaType::Number)]),
            FormulaValue::Number(0.0)
        );
    }

    #[test]
    fn test_rounding_family() {
        assert_eq!(call("Round", vec![n(2.675), n(2.0)]), FormulaValue::Number(2.68));
        assert_eq!(call("Round", vec![n(-2.5), n(0.0)]), FormulaValue::Number(-3.0));
        assert_eq!(call("Round", vec![n(1234.0), n(-2.0)]), FormulaValue::Number(1200.0));
        assert_eq!(call("RoundUp", vec![n(2.01), n(0.0)]), FormulaValue::Number(3.0));
        assert_eq!(call("RoundDown", vec![n(1.15), n(2.0)]), FormulaValue::Number(1.15));
        assert_eq!(call("Trunc", vec![n(-7.9)]), FormulaValue::Number(-7.0));
        assert_eq!(call("Int", vec![n(-7.1)]), FormulaValue::Number(-8.0));
    }

    #[test]
    fn test_decimal_stays_exact() {
        let d = |s: &str| IrNode::literal(FormulaValue::Decimal(s.parse().unwrap()));
        let node = IrNode::call("Sum", vec![d("0.1"), d("0.2")], FormulaType::Decimal);
        let value = Evaluator::new()
            .eval_blocking(&node, &EvalContext::new())
            .unwrap();
        assert_eq!(value, FormulaValue::Decimal("0.3".parse().unwrap()));
    }

    #[test]
    fn test_domain_errors() {
        assert_eq!(kind(&call("Sqrt", vec![n(-1.0)])), ErrorKind::Numeric);
        assert_eq!(kind(&call("Ln", vec![n(0.0)])), ErrorKind::Numeric);
        assert_eq!(kind(&call("Log", vec![n(8.0), n(1.0)])), ErrorKind::DivideByZero);
        assert_eq!(kind(&call("Mod", vec![n(1.0), n(0.0)])), ErrorKind::DivideByZero);
    }

    #[test]
    fn test_log_default_base() {
        assert_eq!(call("Log", vec![n(1000.0)]), FormulaValue::Number(3.0));
        assert_eq!(call("Log", vec![n(8.0), n(2.0)]), FormulaValue::Number(3.0));
    }

    #[test]
    fn test_mod_sign_follows_divisor() {
        assert_eq!(call("Mod", vec![n(-3.0), n(2.0)]), FormulaValue::Number(1.0));
        assert_eq!(call("Mod", vec![n(3.0), n(-2.0)]), FormulaValue::Number(-1.0));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(call("Sum", vec![n(1.0), n(2.0), n(3.0)]), FormulaValue::Number(6.0));
        assert_eq!(call("Average", vec![n(1.0), n(2.0)]), FormulaValue::Number(1.5));
        assert_eq!(call("Max", vec![n(1.0), n(9.0), n(2.0)]), FormulaValue::Number(9.0));
        assert_eq!(call("Min", vec![n(1.0), n(-9.0)]), FormulaValue::Number(-9.0));
        assert_eq!(
            call("Max", vec![IrNode::blank(FormulaType::Number)]),
            FormulaValue::Blank(FormulaType::Number)
        );
    }

    #[test]
    fn test_type_check_rejects_text() {
        assert_eq!(
            kind(&call("Abs", vec![IrNode::text("x")])),
            ErrorKind::RuntimeTypeMismatch
        );
    }

    struct Fixed(f64);

    impl RandomService for Fixed {
        fn next_f64(&self) -> BoxFuture<'_, f64> {
            future::ready(self.0).boxed()
        }
    }

    fn with_random(value: f64) -> EvalContext {
        let services =
            ServiceRegistry::new().with(Arc::new(Fixed(value)) as Arc<dyn RandomService>);
        EvalContext::from_config(
            &RuntimeConfig::default(),
            Arc::new(services),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_rand_between_uses_service() {
        let node = IrNode::call("RandBetween", vec![n(1.0), n(10.0)], FormulaType::Number);
        let value = Evaluator::new()
            .eval_blocking(&node, &with_random(0.55))
            .unwrap();
        assert_eq!(value, FormulaValue::Number(6.0));
    }

    #[test]
    fn test_misbehaving_random_service_is_host_error() {
        let node = IrNode::call("Rand", vec![], FormulaType::Number);
        let result = Evaluator::new().eval_blocking(&node, &with_random(1.5));
        assert!(matches!(
            result,
            Err(EvalError::ServiceContract { service: "random", .. })
        ));
    }
}
