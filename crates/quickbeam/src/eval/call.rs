//! Function and user-defined function calls

use super::Evaluator;
use crate::context::EvalContext;
use crate::error::EvalError;
use crate::functions::adjust_to_compile_time_type;
use crate::ir::IrNode;
use crate::symbols::RowScope;
use crate::value::{ErrorValue, FormulaValue, RecordType, RecordValue};

impl Evaluator {
    /// Evaluate the arguments and invoke a registered function. Lambda
    /// arguments evaluate to [`FormulaValue::Lambda`] and are forced by the
    /// function itself.
    pub(super) async fn call_function(
        &self,
        function: &str,
        args: &[IrNode],
        node: &IrNode,
        ctx: &EvalContext,
    ) -> Result<FormulaValue, EvalError> {
        let entry = self
            .functions
            .get(function)
            .ok_or_else(|| EvalError::UnknownFunction {
                name: function.to_string(),
            })?;
        let implementation = entry.implementation().clone();

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_node(arg, ctx).await?);
        }
        log::trace!("call {function}/{}", values.len());
        implementation.invoke(self, ctx, &node.ctx, values).await
    }

    /// Call a user-defined function.
    ///
    /// Arguments are evaluated eagerly in the caller's scope. The body
    /// sees only its parameters. Exceeding the call depth limit yields a
    /// `CallDepthExceeded` error value rather than failing the evaluation.
    pub(super) async fn call_udf(
        &self,
        name: &str,
        args: &[IrNode],
        node: &IrNode,
        ctx: &EvalContext,
    ) -> Result<FormulaValue, EvalError> {
        let udf = self.udfs.get(name).ok_or_else(|| EvalError::UnknownUdf {
            name: name.to_string(),
        })?;

        let mut params = RecordType::new();
        let mut record = RecordValue::new(RecordType::new());
        for ((param, ty), arg) in udf.params.iter().zip(args) {
            let value = self.eval_node(arg, ctx).await?;
            params = params.with_field(param.clone(), ty.clone());
            record = record.with_field(param.clone(), value.conform_to(ty));
        }
        let record = record.conform_to(&params);

        let Some(inner) = ctx.enter_udf(RowScope::new(record, None)) else {
            log::debug!("{name}: call depth {} exceeded", ctx.max_call_depth());
            return Ok(FormulaValue::Error(ErrorValue::call_depth_exceeded(
                &node.ctx,
                ctx.max_call_depth(),
            )));
        };
        let result = self.eval_node(&udf.body, &inner).await?;
        Ok(adjust_to_compile_time_type(result, &node.ctx))
    }
}
