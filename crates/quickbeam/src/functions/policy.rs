//! Declarative argument policies applied by the invocation pipeline

use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue, ValueKind};

/// How missing optional trailing arguments are filled in.
#[derive(Debug, Clone, Default)]
pub enum ArgExpansion {
    /// Arguments are passed as given
    #[default]
    None,
    /// Positions from `required` onwards take `defaults` when absent
    PadTrailing {
        /// Number of mandatory arguments
        required: usize,
        /// Defaults for the optional positions, in order
        defaults: Vec<FormulaValue>,
    },
}

impl ArgExpansion {
    pub(crate) fn apply(&self, mut args: Vec<FormulaValue>) -> Vec<FormulaValue> {
        if let ArgExpansion::PadTrailing { required, defaults } = self {
            let full = required + defaults.len();
            while args.len() < full && args.len() >= *required {
                let idx = args.len() - required;
                args.push(defaults[idx].clone());
            }
        }
        args
    }
}

/// Which blank arguments are replaced before the target runs.
#[derive(Debug, Clone, Default)]
pub enum BlankReplacement {
    /// Blanks reach the target
    #[default]
    DoNotReplace,
    /// The binder already inserted coercions; nothing left to do
    NoOp,
    /// Every blank argument becomes this value
    All(FormulaValue),
    /// Per-position replacement; `None` and positions past the end keep
    /// the blank
    Positional(Vec<Option<FormulaValue>>),
}

impl BlankReplacement {
    /// Replace blanks with the empty string.
    pub fn empty_string() -> Self {
        BlankReplacement::All(FormulaValue::string(""))
    }

    /// Replace blanks with zero.
    pub fn zero() -> Self {
        BlankReplacement::All(FormulaValue::Number(0.0))
    }

    /// Replacement for a blank at `position`, if any.
    pub(crate) fn replacement(&self, position: usize) -> Option<&FormulaValue> {
        match self {
            BlankReplacement::DoNotReplace | BlankReplacement::NoOp => None,
            BlankReplacement::All(v) => Some(v),
            BlankReplacement::Positional(list) => list.get(position).and_then(Option::as_ref),
        }
    }

    pub(crate) fn apply(&self, args: &mut [FormulaValue]) {
        for (i, arg) in args.iter_mut().enumerate() {
            if arg.is_blank() {
                if let Some(v) = self.replacement(i) {
                    *arg = v.clone();
                }
            }
        }
    }
}

/// What kinds a single argument may have at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// Anything
    Any,
    /// Exactly this kind
    Exact(ValueKind),
    /// This kind or blank
    ExactOrBlank(ValueKind),
    /// Number, decimal or blank
    Numeric,
}

impl Accept {
    fn admits(self, value: &FormulaValue) -> bool {
        match self {
            Accept::Any => true,
            Accept::Exact(kind) => value.kind() == kind,
            Accept::ExactOrBlank(kind) => value.is_blank() || value.kind() == kind,
            Accept::Numeric => value.is_blank() || value.is_numeric(),
        }
    }
}

/// Runtime type check of the arguments.
#[derive(Debug, Clone, Default)]
pub enum TypeCheck {
    /// The target checks types itself
    #[default]
    Defer,
    /// Every argument must satisfy the same rule
    Uniform(Accept),
    /// One rule per position; the last rule covers any further
    /// (variadic) positions
    Sequence(Vec<Accept>),
}

impl TypeCheck {
    pub(crate) fn check(&self, ir: &IrContext, args: &[FormulaValue]) -> Option<ErrorValue> {
        let ok = match self {
            TypeCheck::Defer => true,
            TypeCheck::Uniform(rule) => args.iter().all(|a| rule.admits(a)),
            TypeCheck::Sequence(rules) => args.iter().enumerate().all(|(i, a)| {
                rules
                    .get(i)
                    .or_else(|| rules.last())
                    .map_or(true, |rule| rule.admits(a))
            }),
        };
        (!ok).then(|| ErrorValue::runtime_type_mismatch(ir))
    }
}

/// Constraint on the value of a numeric argument. Non-numeric and blank
/// arguments always pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRule {
    /// No constraint
    Any,
    /// Not NaN or infinite
    Finite,
    /// `>= 0`
    NonNegative,
    /// `> 0`
    Positive,
    /// Inclusive range
    Range(f64, f64),
}

impl ValueRule {
    fn violation(self, ir: &IrContext, value: &FormulaValue) -> Option<ErrorValue> {
        let n = value.as_f64()?;
        let ok = match self {
            ValueRule::Any => true,
            ValueRule::Finite => n.is_finite(),
            ValueRule::NonNegative => n >= 0.0,
            ValueRule::Positive => n > 0.0,
            ValueRule::Range(lo, hi) => (lo..=hi).contains(&n),
        };
        match (ok, self) {
            (true, _) => None,
            (false, ValueRule::Finite) => Some(ErrorValue::numeric(ir)),
            (false, _) => Some(ErrorValue::argument_out_of_range(ir)),
        }
    }
}

/// Runtime value check of the arguments.
#[derive(Debug, Clone, Default)]
pub enum ValueCheck {
    /// The target checks values itself
    #[default]
    Defer,
    /// Same rule for every argument
    Uniform(ValueRule),
    /// One rule per position; positions past the end are unconstrained
    Sequence(Vec<ValueRule>),
}

impl ValueCheck {
    pub(crate) fn check(&self, ir: &IrContext, args: &[FormulaValue]) -> Option<ErrorValue> {
        let rule_for = |i: usize| match self {
            ValueCheck::Defer => ValueRule::Any,
            ValueCheck::Uniform(rule) => *rule,
            ValueCheck::Sequence(rules) => rules.get(i).copied().unwrap_or(ValueRule::Any),
        };
        args.iter()
            .enumerate()
            .find_map(|(i, a)| rule_for(i).violation(ir, a))
    }
}

/// What to return without calling the target when an argument is blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnBehavior {
    /// Always call the target
    #[default]
    AlwaysEvaluateAndReturnResult,
    /// Blank of the result type
    ReturnBlankIfAnyArgIsBlank,
    /// `false`
    ReturnFalseIfAnyArgIsBlank,
    /// `""`
    ReturnEmptyStringIfAnyArgIsBlank,
}

impl ReturnBehavior {
    pub(crate) fn short_circuit(
        self,
        ir: &IrContext,
        args: &[FormulaValue],
    ) -> Option<FormulaValue> {
        if self == ReturnBehavior::AlwaysEvaluateAndReturnResult
            || !args.iter().any(FormulaValue::is_blank)
        {
            return None;
        }
        Some(match self {
            ReturnBehavior::ReturnBlankIfAnyArgIsBlank => {
                FormulaValue::Blank(ir.result_type.clone())
            }
            ReturnBehavior::ReturnFalseIfAnyArgIsBlank => FormulaValue::Boolean(false),
            ReturnBehavior::ReturnEmptyStringIfAnyArgIsBlank => FormulaValue::string(""),
            ReturnBehavior::AlwaysEvaluateAndReturnResult => {
                FormulaValue::Blank(FormulaType::Blank)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ErrorKind;

    #[test]
    fn test_pad_trailing_fills_missing_defaults() {
        let expand = ArgExpansion::PadTrailing {
            required: 1,
            defaults: vec![FormulaValue::Number(10.0), FormulaValue::Number(20.0)],
        };
        let args = expand.apply(vec![FormulaValue::Number(1.0)]);
        assert_eq!(args.len(), 3);
        assert_eq!(args[2], FormulaValue::Number(20.0));
        let args = expand.apply(vec![FormulaValue::Number(1.0), FormulaValue::Number(2.0)]);
        assert_eq!(args[1], FormulaValue::Number(2.0));
        assert_eq!(args[2], FormulaValue::Number(20.0));
    }

    #[test]
    fn test_positional_replacement() {
        let mut args = vec![FormulaValue::blank(), FormulaValue::blank(), FormulaValue::blank()];
        BlankReplacement::Positional(vec![Some(FormulaValue::string("")), None])
            .apply(&mut args);
        assert_eq!(args[0], FormulaValue::string(""));
        assert!(args[1].is_blank());
        assert!(args[2].is_blank());
    }

    #[test]
    fn test_sequence_type_check_repeats_last_rule() {
        let ir = IrContext::new(FormulaType::Number);
        let check = TypeCheck::Sequence(vec![Accept::Exact(ValueKind::String), Accept::Numeric]);
        let ok = [
            FormulaValue::string("a"),
            FormulaValue::Number(1.0),
            FormulaValue::Number(2.0),
        ];
        assert!(check.check(&ir, &ok).is_none());
        let bad = [
            FormulaValue::string("a"),
            FormulaValue::Number(1.0),
            FormulaValue::string("b"),
        ];
        let err = check.check(&ir, &bad).unwrap();
        assert_eq!(err.first().kind, ErrorKind::RuntimeTypeMismatch);
    }

    #[test]
    fn test_value_rules() {
        let ir = IrContext::new(FormulaType::Number);
        let check = ValueCheck::Uniform(ValueRule::NonNegative);
        assert!(check.check(&ir, &[FormulaValue::Number(0.0)]).is_none());
        let err = check.check(&ir, &[FormulaValue::Number(-1.0)]).unwrap();
        assert_eq!(err.first().kind, ErrorKind::ArgumentOutOfRange);
        let err = ValueCheck::Uniform(ValueRule::Finite)
            .check(&ir, &[FormulaValue::Number(f64::NAN)])
            .unwrap();
        assert_eq!(err.first().kind, ErrorKind::Numeric);
    }

    #[test]
    fn test_return_behavior_sentinels() {
        let ir = IrContext::new(FormulaType::String);
        let args = [FormulaValue::blank(), FormulaValue::Number(1.0)];
        assert_eq!(
            ReturnBehavior::ReturnEmptyStringIfAnyArgIsBlank.short_circuit(&ir, &args),
            Some(FormulaValue::string(""))
        );
        assert_eq!(
            ReturnBehavior::ReturnBlankIfAnyArgIsBlank.short_circuit(&ir, &args),
            Some(FormulaValue::Blank(FormulaType::String))
        );
        assert_eq!(
            ReturnBehavior::AlwaysEvaluateAndReturnResult.short_circuit(&ir, &args),
            None
        );
    }
}
