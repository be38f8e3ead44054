//! The standard invocation pipeline
//!
//! Steps, in order:
//!
//! 1. expand optional trailing arguments
//! 2. if any argument is an error, return the union of all of them
//! 3. return a sentinel if the return behavior says so and an argument is
//!    blank
//! 4. replace blanks
//! 5. runtime type check
//! 6. runtime value check
//! 7. call the target and tag the result with the call's static type
//!
//! The sentinel check in step 3 looks at the arguments before blank
//! replacement.

use futures_util::future::{BoxFuture, FutureExt};

use super::policy::{ArgExpansion, BlankReplacement, ReturnBehavior, TypeCheck, ValueCheck};
use super::FunctionImpl;
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue};

/// Target that needs no evaluator access.
pub type SyncTarget =
    fn(&EvalContext, &IrContext, &[FormulaValue]) -> Result<FormulaValue, EvalError>;

/// Target that forces lambdas or awaits host services.
pub type AsyncTarget = for<'a> fn(
    &'a Evaluator,
    &'a EvalContext,
    &'a IrContext,
    Vec<FormulaValue>,
) -> BoxFuture<'a, Result<FormulaValue, EvalError>>;

/// The body of a function.
#[derive(Clone, Copy)]
pub enum Target {
    /// Synchronous
    Sync(SyncTarget),
    /// Asynchronous
    Async(AsyncTarget),
}

impl Target {
    async fn call(
        self,
        ev: &Evaluator,
        ctx: &EvalContext,
        ir: &IrContext,
        args: Vec<FormulaValue>,
    ) -> Result<FormulaValue, EvalError> {
        match self {
            Target::Sync(f) => f(ctx, ir, &args),
            Target::Async(f) => f(ev, ctx, ir, args).await,
        }
    }
}

/// A target wrapped in the standard argument policies.
pub struct StandardErrorHandling {
    name: &'static str,
    expand: ArgExpansion,
    blanks: BlankReplacement,
    types: TypeCheck,
    values: ValueCheck,
    behavior: ReturnBehavior,
    target: Target,
}

impl StandardErrorHandling {
    /// Wrap `target` with the default policies: no expansion, blanks kept,
    /// no checks, always evaluate.
    pub fn new(name: &'static str, target: Target) -> Self {
        Self {
            name,
            expand: ArgExpansion::None,
            blanks: BlankReplacement::DoNotReplace,
            types: TypeCheck::Defer,
            values: ValueCheck::Defer,
            behavior: ReturnBehavior::AlwaysEvaluateAndReturnResult,
            target,
        }
    }

    /// Set the argument expansion.
    pub fn expand(mut self, expand: ArgExpansion) -> Self {
        self.expand = expand;
        self
    }

    /// Set the blank replacement.
    pub fn blanks(mut self, blanks: BlankReplacement) -> Self {
        self.blanks = blanks;
        self
    }

    /// Set the runtime type check.
    pub fn types(mut self, types: TypeCheck) -> Self {
        self.types = types;
        self
    }

    /// Set the runtime value check.
    pub fn values(mut self, values: ValueCheck) -> Self {
        self.values = values;
        self
    }

    /// Set the return behavior.
    pub fn behavior(mut self, behavior: ReturnBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    async fn run(
        &self,
        ev: &Evaluator,
        ctx: &EvalContext,
        ir: &IrContext,
        args: Vec<FormulaValue>,
    ) -> Result<FormulaValue, EvalError> {
        let mut args = self.expand.apply(args);

        let arg_errors = args.iter().filter_map(FormulaValue::as_error);
        if let Some(err) = ErrorValue::combine(ir.result_type.clone(), arg_errors) {
            log::trace!(
                "{}: propagating {} argument error(s)",
                self.name,
                err.errors().len()
            );
            return Ok(adjust_to_compile_time_type(FormulaValue::Error(err), ir));
        }

        if let Some(sentinel) = self.behavior.short_circuit(ir, &args) {
            log::trace!("{}: blank argument, returning {}", self.name, sentinel);
            return Ok(sentinel);
        }

        self.blanks.apply(&mut args);

        if let Some(err) = self.types.check(ir, &args) {
            return Ok(FormulaValue::Error(err));
        }
        if let Some(err) = self.values.check(ir, &args) {
            return Ok(FormulaValue::Error(err));
        }

        let result = self.target.call(ev, ctx, ir, args).await?;
        Ok(adjust_to_compile_time_type(result, ir))
    }
}

impl FunctionImpl for StandardErrorHandling {
    fn name(&self) -> &str {
        self.name
    }

    fn invoke<'a>(
        &'a self,
        ev: &'a Evaluator,
        ctx: &'a EvalContext,
        ir: &'a IrContext,
        args: Vec<FormulaValue>,
    ) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
        self.run(ev, ctx, ir, args).boxed()
    }
}

/// A target that handles errors and blanks itself (`If`, `IsError`,
/// `IfError`, ...). Only the result tagging of step 7 applies.
pub struct NoErrorHandling {
    name: &'static str,
    target: Target,
}

impl NoErrorHandling {
    /// Wrap `target`.
    pub fn new(name: &'static str, target: Target) -> Self {
        Self { name, target }
    }
}

impl FunctionImpl for NoErrorHandling {
    fn name(&self) -> &str {
        self.name
    }

    fn invoke<'a>(
        &'a self,
        ev: &'a Evaluator,
        ctx: &'a EvalContext,
        ir: &'a IrContext,
        args: Vec<FormulaValue>,
    ) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
        async move {
            let result = self.target.call(ev, ctx, ir, args).await?;
            Ok(adjust_to_compile_time_type(result, ir))
        }
        .boxed()
    }
}

/// Tag a result with the static type of the call that produced it.
///
/// Errors and blanks take the call's type; records and tables are
/// conformed to it; anything produced for a void call becomes void.
pub fn adjust_to_compile_time_type(value: FormulaValue, ir: &IrContext) -> FormulaValue {
    match (&ir.result_type, value) {
        (FormulaType::Void, FormulaValue::Error(e)) => {
            FormulaValue::Error(e.with_type(FormulaType::Void).with_default_span(ir.span))
        }
        (FormulaType::Void, _) => FormulaValue::Void,
        (ty, FormulaValue::Error(e)) => {
            FormulaValue::Error(e.with_type(ty.clone()).with_default_span(ir.span))
        }
        (ty, value) => value.conform_to(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ErrorKind, ExpressionError, RecordType, RecordValue};

    #[test]
    fn test_adjust_conforms_records() {
        let ty = RecordType::new()
            .with_field("a", FormulaType::Number)
            .with_field("b", FormulaType::String);
        let ir = IrContext::new(FormulaType::Record(ty));
        let rec =
            FormulaValue::Record(RecordValue::from_fields([("a", FormulaValue::Number(1.0))]));
        let adjusted = adjust_to_compile_time_type(rec, &ir);
        let FormulaValue::Record(r) = adjusted else {
            panic!("expected record");
        };
        assert_eq!(r.field("b"), FormulaValue::Blank(FormulaType::String));
    }

    #[test]
    fn test_adjust_void() {
        let ir = IrContext::new(FormulaType::Void);
        assert_eq!(
            adjust_to_compile_time_type(FormulaValue::Number(1.0), &ir),
            FormulaValue::Void
        );
        let err = FormulaValue::error(FormulaType::Number, ExpressionError::new(ErrorKind::Custom));
        assert_eq!(
            adjust_to_compile_time_type(err, &ir).formula_type(),
            FormulaType::Void
        );
    }
}
