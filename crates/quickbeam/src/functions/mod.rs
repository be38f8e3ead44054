//! Built-in functions and the invocation pipeline
//!
//! Every function is a [`FunctionImpl`]. Most are a
//! [`StandardErrorHandling`] wrapper around a plain target: the wrapper
//! applies the declared argument policies (expansion, error propagation,
//! blank handling, runtime type and value checks) so the target only sees
//! arguments it can work with. Tabular overloads (`AbsT`, `LeftT`, ...)
//! lift a scalar base over the rows of their table arguments.

pub(crate) mod convert;
mod datefmt;
mod datetime;
mod logical;
mod math;
mod misc;
mod numfmt;
mod pipeline;
mod policy;
mod table;
mod tabular;
mod text;

pub use pipeline::{
    adjust_to_compile_time_type, AsyncTarget, NoErrorHandling, StandardErrorHandling, SyncTarget,
    Target,
};
pub use policy::{
    Accept, ArgExpansion, BlankReplacement, ReturnBehavior, TypeCheck, ValueCheck, ValueRule,
};
pub use tabular::{MultiTableOverload, TabularOverload};

use std::fmt;
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;

use crate::context::EvalContext;
use crate::error::{EvalError, RegistryError};
use crate::eval::Evaluator;
use crate::ir::IrContext;
use crate::value::{ErrorValue, FormulaType, FormulaValue, LambdaValue};

/// A callable function.
pub trait FunctionImpl: Send + Sync {
    /// Registry key.
    fn name(&self) -> &str;

    /// Invoke with already evaluated arguments. Lazy arguments arrive as
    /// [`FormulaValue::Lambda`].
    fn invoke<'a>(
        &'a self,
        ev: &'a Evaluator,
        ctx: &'a EvalContext,
        ir: &'a IrContext,
        args: Vec<FormulaValue>,
    ) -> BoxFuture<'a, Result<FormulaValue, EvalError>>;
}

/// One registered function.
#[derive(Clone)]
pub struct FunctionEntry {
    implementation: Arc<dyn FunctionImpl>,
    base: Option<Arc<str>>,
}

impl FunctionEntry {
    /// The implementation.
    pub fn implementation(&self) -> &Arc<dyn FunctionImpl> {
        &self.implementation
    }

    /// Scalar base, for tabular overloads.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }
}

/// Immutable map from registry key to implementation.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: IndexMap<Arc<str>, FunctionEntry>,
    problems: Vec<RegistryError>,
}

impl FunctionRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The standard library, built once per process.
    pub fn standard() -> Arc<FunctionRegistry> {
        static STANDARD: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();
        STANDARD
            .get_or_init(|| Arc::new(standard_builder().build()))
            .clone()
    }

    /// Look up a function.
    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.entries.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered keys in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| &**k)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consistency problems recorded while building: tabular overloads
    /// without a scalar base and duplicate keys.
    pub fn validate(&self) -> Result<(), Vec<RegistryError>> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(self.problems.clone())
        }
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.entries.len())
            .field("problems", &self.problems)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum OverloadShape {
    SingleTable,
    MultiTable,
}

struct PendingOverload {
    name: Arc<str>,
    base: Arc<str>,
    blanks: BlankReplacement,
    shape: OverloadShape,
}

/// Collects registrations. Building never fails; problems are kept for
/// [`FunctionRegistry::validate`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: IndexMap<Arc<str>, FunctionEntry>,
    overloads: Vec<PendingOverload>,
    problems: Vec<RegistryError>,
}

impl RegistryBuilder {
    /// Register a function under its own name.
    pub fn add(mut self, function: impl FunctionImpl + 'static) -> Self {
        let name: Arc<str> = Arc::from(function.name());
        self.insert(
            name,
            FunctionEntry {
                implementation: Arc::new(function),
                base: None,
            },
        );
        self
    }

    /// Register a single-table overload of `base`.
    pub fn tabular(mut self, name: &str, base: &str, blanks: BlankReplacement) -> Self {
        self.overloads.push(PendingOverload {
            name: Arc::from(name),
            base: Arc::from(base),
            blanks,
            shape: OverloadShape::SingleTable,
        });
        self
    }

    /// Register a multi-table overload of `base`.
    pub fn multi_tabular(mut self, name: &str, base: &str, blanks: BlankReplacement) -> Self {
        self.overloads.push(PendingOverload {
            name: Arc::from(name),
            base: Arc::from(base),
            blanks,
            shape: OverloadShape::MultiTable,
        });
        self
    }

    /// Resolve overloads against their bases and freeze the registry.
    pub fn build(mut self) -> FunctionRegistry {
        for pending in std::mem::take(&mut self.overloads) {
            let Some(scalar) = self
                .entries
                .get(&pending.base)
                .map(|e| e.implementation.clone())
            else {
                self.problems.push(RegistryError::OrphanOverload {
                    name: pending.name.to_string(),
                    base: pending.base.to_string(),
                });
                continue;
            };
            let implementation: Arc<dyn FunctionImpl> = match pending.shape {
                OverloadShape::SingleTable => Arc::new(TabularOverload::new(
                    pending.name.clone(),
                    scalar,
                    pending.blanks,
                )),
                OverloadShape::MultiTable => Arc::new(MultiTableOverload::new(
                    pending.name.clone(),
                    scalar,
                    pending.blanks,
                )),
            };
            self.insert(
                pending.name,
                FunctionEntry {
                    implementation,
                    base: Some(pending.base),
                },
            );
        }
        FunctionRegistry {
            entries: self.entries,
            problems: self.problems,
        }
    }

    fn insert(&mut self, name: Arc<str>, entry: FunctionEntry) {
        if self.entries.contains_key(&name) {
            self.problems.push(RegistryError::Duplicate {
                name: name.to_string(),
            });
            return;
        }
        self.entries.insert(name, entry);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Argument Helpers
// ═══════════════════════════════════════════════════════════════════

static MISSING: FormulaValue = FormulaValue::Blank(FormulaType::Blank);

/// Argument `i`, blank when absent.
pub(crate) fn arg(args: &[FormulaValue], i: usize) -> &FormulaValue {
    args.get(i).unwrap_or(&MISSING)
}

/// Argument `i` as a lambda. Anything else is a binder bug.
pub(crate) fn lambda_arg<'v>(
    function: &str,
    args: &'v [FormulaValue],
    i: usize,
) -> Result<&'v LambdaValue, EvalError> {
    args.get(i)
        .and_then(FormulaValue::as_lambda)
        .ok_or_else(|| EvalError::InvalidLambdaUse {
            function: function.to_string(),
        })
}

/// Union of `errors` if there are any, otherwise `value`.
pub(crate) fn errors_or(
    errors: &[ErrorValue],
    value: FormulaValue,
    ir: &IrContext,
) -> FormulaValue {
    match ErrorValue::combine(ir.result_type.clone(), errors) {
        Some(err) => FormulaValue::Error(err),
        None => value,
    }
}

/// Union of the errors among `values`, if any.
pub(crate) fn errors_among(values: &[FormulaValue], ir: &IrContext) -> Option<FormulaValue> {
    let errors = values.iter().filter_map(FormulaValue::as_error);
    ErrorValue::combine(ir.result_type.clone(), errors).map(FormulaValue::Error)
}

/// Builder preloaded with the standard library, for hosts that want to
/// add their own functions on top.
pub fn standard_builder() -> RegistryBuilder {
    let builder = FunctionRegistry::builder();
    let builder = logical::register(builder);
    let builder = math::register(builder);
    let builder = text::register(builder);
    let builder = table::register(builder);
    let builder = datetime::register(builder);
    misc::register(builder)
}
