//! IR evaluation
//!
//! A tree walker over [`IrNode`]s. Evaluation is async so functions can
//! await host services; every recursive step returns a boxed future.
//! Expression-level failures come back as [`FormulaValue::Error`] inside
//! `Ok`; only host-level failures use `Err`.

mod call;
mod operators;
mod resolve;

pub(crate) use operators::equals;

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::context::EvalContext;
use crate::error::{EngineError, EvalError};
use crate::functions::FunctionRegistry;
use crate::ir::{IrKind, IrNode};
use crate::symbols::{RowScope, ScopeStore};
use crate::udf::UdfTable;
use crate::value::{
    ExpressionError, FormulaType, FormulaValue, LambdaValue, RecordType, RecordValue, RowOutcome,
    TableValue,
};

/// Receiver for `Set` inside an expression.
pub trait VariableSink: Send + Sync {
    /// Assign a variable. The new value must be visible to reads made
    /// after this call returns.
    fn assign(&self, name: &str, value: FormulaValue) -> Result<(), EngineError>;
}

/// Result of [`Evaluator::eval_with_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    /// The value
    pub value: FormulaValue,
    /// Warnings recorded while evaluating
    pub warnings: Vec<ExpressionError>,
}

/// Evaluates IR against a function registry and a set of globals.
///
/// # Example
///
/// ```
/// use quickbeam::{EvalContext, Evaluator, FormulaType, FormulaValue, IrNode};
///
/// let ev = Evaluator::new();
/// let ir = IrNode::call(
///     "Abs",
///     vec![IrNode::number(-4.0)],
///     FormulaType::Number,
/// );
/// let value = ev.eval_blocking(&ir, &EvalContext::new()).unwrap();
/// assert_eq!(value, FormulaValue::Number(4.0));
/// ```
#[derive(Clone)]
pub struct Evaluator {
    functions: Arc<FunctionRegistry>,
    globals: ScopeStore,
    udfs: Arc<UdfTable>,
    variables: Option<Arc<dyn VariableSink>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Evaluator with the standard library and no globals.
    pub fn new() -> Self {
        Self {
            functions: FunctionRegistry::standard(),
            globals: ScopeStore::empty(),
            udfs: Arc::new(UdfTable::new()),
            variables: None,
        }
    }

    /// Use a different function registry.
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Read globals from `globals`.
    pub fn with_globals(mut self, globals: ScopeStore) -> Self {
        self.globals = globals;
        self
    }

    /// Make user-defined functions callable.
    pub fn with_udfs(mut self, udfs: Arc<UdfTable>) -> Self {
        self.udfs = udfs;
        self
    }

    /// Route `Set` to `sink`. Without one, `Set` fails.
    pub fn with_variables(mut self, sink: Arc<dyn VariableSink>) -> Self {
        self.variables = Some(sink);
        self
    }

    /// The function registry.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    // ═══════════════════════════════════════════════════════════════════
    // Entry Points
    // ═══════════════════════════════════════════════════════════════════

    /// Evaluate an expression.
    pub async fn eval(&self, node: &IrNode, ctx: &EvalContext) -> Result<FormulaValue, EvalError> {
        self.eval_node(node, ctx).await
    }

    /// Evaluate and collect the warnings recorded on `ctx`.
    pub async fn eval_with_diagnostics(
        &self,
        node: &IrNode,
        ctx: &EvalContext,
    ) -> Result<Evaluated, EvalError> {
        let value = self.eval_node(node, ctx).await?;
        Ok(Evaluated {
            value,
            warnings: ctx.take_warnings(),
        })
    }

    /// Evaluate on a private current-thread runtime.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`eval`](Self::eval) there.
    pub fn eval_blocking(
        &self,
        node: &IrNode,
        ctx: &EvalContext,
    ) -> Result<FormulaValue, EvalError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(EvalError::NoRuntime)?;
        runtime.block_on(self.eval(node, ctx))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Main Dispatcher
    // ═══════════════════════════════════════════════════════════════════

    /// Evaluate one node.
    pub fn eval_node<'a>(
        &'a self,
        node: &'a IrNode,
        ctx: &'a EvalContext,
    ) -> BoxFuture<'a, Result<FormulaValue, EvalError>> {
        async move {
            // Check for cancellation before each node
            ctx.check_cancelled()?;

            match &node.kind {
                IrKind::Literal(value) => Ok(value.clone()),
                IrKind::Name { name, qualifier } => {
                    self.resolve_name(name, qualifier, &node.ctx, ctx)
                }
                IrKind::Field { source, field } => {
                    let source = self.eval_node(source, ctx).await?;
                    Ok(resolve::field_access(source, field, &node.ctx))
                }
                IrKind::Record(fields) => {
                    let mut record = RecordValue::new(RecordType::new());
                    for (name, field) in fields {
                        let value = self.eval_node(field, ctx).await?;
                        record = record.with_field(name.clone(), value);
                    }
                    Ok(FormulaValue::Record(record).conform_to(&node.ctx.result_type))
                }
                IrKind::Table(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval_node(item, ctx).await?);
                    }
                    let row_type = node.ctx.result_type.row_type().cloned().unwrap_or_default();
                    Ok(FormulaValue::Table(TableValue::from_results(row_type, values)))
                }
                IrKind::Call { function, args } => {
                    self.call_function(function, args, node, ctx).await
                }
                IrKind::UdfCall { name, args } => self.call_udf(name, args, node, ctx).await,
                IrKind::Lambda { body, alias, .. } => Ok(FormulaValue::Lambda(LambdaValue {
                    body: body.clone(),
                    scope: ctx.scope().clone(),
                    alias: alias.clone(),
                })),
                IrKind::Binary { op, left, right } => {
                    let left = self.eval_node(left, ctx).await?;
                    let right = self.eval_node(right, ctx).await?;
                    Ok(operators::binary(*op, left, right, &node.ctx, ctx))
                }
                IrKind::Unary { op, operand } => {
                    let operand = self.eval_node(operand, ctx).await?;
                    Ok(operators::unary(*op, operand, &node.ctx))
                }
                IrKind::Coerce { to, operand } => {
                    let operand = self.eval_node(operand, ctx).await?;
                    Ok(operators::coerce(*to, operand, &node.ctx, ctx))
                }
                IrKind::Chain(items) => {
                    let mut last = FormulaValue::Void;
                    for item in items {
                        last = self.eval_node(item, ctx).await?;
                    }
                    Ok(last)
                }
                IrKind::Set { name, value } => {
                    let value = self.eval_node(value, ctx).await?;
                    self.assign(name, value)?;
                    Ok(FormulaValue::Void)
                }
            }
        }
        .boxed()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lambdas
    // ═══════════════════════════════════════════════════════════════════

    /// Evaluate a lazy argument in the scopes it captured.
    pub async fn force(
        &self,
        lambda: &LambdaValue,
        ctx: &EvalContext,
    ) -> Result<FormulaValue, EvalError> {
        let inner = ctx.with_scope(lambda.scope.clone());
        self.eval_node(&lambda.body, &inner).await
    }

    /// Evaluate a lazy argument against one row.
    ///
    /// Error rows yield their error without evaluating the lambda; blank
    /// rows are visible as a scope whose fields are all blank.
    pub async fn force_in_row(
        &self,
        lambda: &LambdaValue,
        ctx: &EvalContext,
        row: &RowOutcome,
        row_type: &RecordType,
    ) -> Result<FormulaValue, EvalError> {
        let scope = match row {
            RowOutcome::Record(r) => RowScope::new(r.clone(), lambda.alias.clone()),
            RowOutcome::Blank => RowScope::blank(row_type.clone(), lambda.alias.clone()),
            RowOutcome::Error(e) => {
                return Ok(FormulaValue::Error(e.clone().with_type(lambda.ty().clone())))
            }
        };
        let inner = ctx.with_scope(lambda.scope.push(scope));
        self.eval_node(&lambda.body, &inner).await
    }

    /// Evaluate an argument that may or may not be lazy.
    pub async fn force_arg(
        &self,
        arg: &FormulaValue,
        ctx: &EvalContext,
    ) -> Result<FormulaValue, EvalError> {
        match arg {
            FormulaValue::Lambda(lambda) => self.force(lambda, ctx).await,
            value => Ok(value.clone()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Assignment
    // ═══════════════════════════════════════════════════════════════════

    fn assign(&self, name: &str, value: FormulaValue) -> Result<(), EvalError> {
        let sink = self.variables.as_ref().ok_or_else(|| {
            EvalError::Assignment(Box::new(EngineError::ReadOnly {
                name: name.to_string(),
            }))
        })?;
        log::trace!("Set({name})");
        sink.assign(name, value).map_err(EvalError::from)
    }
}

/// Blank of the type a lambda would have produced.
pub(crate) fn blank_like(lambda: &LambdaValue) -> FormulaValue {
    match lambda.ty() {
        FormulaType::Deferred => FormulaValue::blank(),
        ty => FormulaValue::Blank(ty.clone()),
    }
}
