//! The recalculation engine
//!
//! Named formulas and variables live in one [`SymbolTable`]. Each formula
//! records the globals its IR reads when it is defined; a change to any
//! of them recomputes every transitive dependent once, in dependency
//! order, and notifies the formula's update callback.
//!
//! Define, set, delete and each propagation pass are serialised by an
//! async mutex, so one pass (callbacks included) finishes before the next
//! starts. Reads through [`RecalcEngine::get_value`] never wait on it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};
use tokio::runtime::Runtime;

use super::graph::DependencyGraph;
use crate::config::RuntimeConfig;
use crate::context::{CancellationToken, EvalContext};
use crate::error::{EngineError, EvalError};
use crate::eval::{Evaluator, VariableSink};
use crate::functions::FunctionRegistry;
use crate::ir::IrNode;
use crate::services::ServiceRegistry;
use crate::symbols::{ScopeStore, SymbolTable};
use crate::udf::{UdfTable, UserDefinedFunction};
use crate::value::FormulaValue;

/// Called with a formula's name and new value after each recomputation.
///
/// Callbacks run inside the propagation pass. A callback must not call
/// back into the engine that invoked it; the pass lock is not reentrant.
pub type UpdateCallback = Arc<dyn Fn(&str, &FormulaValue) + Send + Sync>;

/// Wrap a closure as an [`UpdateCallback`].
pub fn update_callback<F>(f: F) -> UpdateCallback
where
    F: Fn(&str, &FormulaValue) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A registered formula.
#[derive(Clone)]
pub struct NamedFormula {
    /// Bound body
    pub ir: Arc<IrNode>,
    /// Globals the body reads, fixed at definition
    pub reads: IndexSet<Arc<str>>,
    on_update: Option<UpdateCallback>,
}

impl fmt::Debug for NamedFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedFormula")
            .field("reads", &self.reads)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct EngineState {
    graph: DependencyGraph,
    formulas: IndexMap<Arc<str>, NamedFormula>,
    udfs: Arc<UdfTable>,
}

fn read(state: &RwLock<EngineState>) -> RwLockReadGuard<'_, EngineState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(state: &RwLock<EngineState>) -> RwLockWriteGuard<'_, EngineState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Host-level view of an evaluation failure. Assignment failures surface
/// as the engine error that caused them.
fn host(error: EvalError) -> EngineError {
    match error {
        EvalError::Assignment(inner) => *inner,
        other => EngineError::Eval(other),
    }
}

/// Write a variable, creating it on first use.
///
/// The first value fixes the variable's type. Formulas are read-only.
fn store_variable(
    symbols: &SymbolTable,
    state: &RwLock<EngineState>,
    name: &str,
    value: FormulaValue,
) -> Result<(), EngineError> {
    if read(state).formulas.contains_key(name) {
        return Err(EngineError::ReadOnly {
            name: name.to_string(),
        });
    }
    let ty = value.formula_type();
    let slot = match symbols.slot(name) {
        Some(slot) if !slot.ty.accepts(&ty) => {
            return Err(EngineError::TypeMismatch {
                name: name.to_string(),
                expected: slot.ty.to_string(),
                found: ty.to_string(),
            });
        }
        Some(slot) => slot,
        None => {
            debug!("new variable {name}: {ty}");
            symbols.add_slot(name, ty)?
        }
    };
    symbols.set(&slot, value)?;
    Ok(())
}

/// Collects the `Set`s of one evaluation into a single batch.
struct BatchRecorder {
    symbols: Arc<SymbolTable>,
    state: Arc<RwLock<EngineState>>,
    changed: Mutex<IndexSet<Arc<str>>>,
}

impl BatchRecorder {
    fn take(&self) -> Vec<Arc<str>> {
        let mut changed = self.changed.lock().unwrap_or_else(PoisonError::into_inner);
        changed.drain(..).collect()
    }
}

impl VariableSink for BatchRecorder {
    fn assign(&self, name: &str, value: FormulaValue) -> Result<(), EngineError> {
        store_variable(&self.symbols, &self.state, name, value)?;
        self.changed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::from(name));
        Ok(())
    }
}

/// Named formulas and variables with incremental recalculation.
///
/// # Example
///
/// ```
/// use quickbeam::{BinaryOp, FormulaType, FormulaValue, IrNode, RecalcEngine};
///
/// let engine = RecalcEngine::new();
/// engine.set_variable("A", FormulaValue::Number(1.0)).unwrap();
///
/// let a = IrNode::name("A", FormulaType::Number);
/// let b = IrNode::binary(BinaryOp::Mul, a, IrNode::number(10.0), FormulaType::Number);
/// engine.define_formula("B", b, None).unwrap();
///
/// engine.set_variable("A", FormulaValue::Number(2.0)).unwrap();
/// assert_eq!(engine.get_value("B").unwrap(), FormulaValue::Number(20.0));
/// ```
pub struct RecalcEngine {
    config: RuntimeConfig,
    services: Arc<ServiceRegistry>,
    functions: Arc<FunctionRegistry>,
    symbols: Arc<SymbolTable>,
    state: Arc<RwLock<EngineState>>,
    pass: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    runtime: OnceLock<Runtime>,
}

impl Default for RecalcEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecalcEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecalcEngine")
            .field("config", &self.config)
            .field("formulas", &read(&self.state).formulas.len())
            .finish()
    }
}

impl RecalcEngine {
    /// Engine with the default configuration and the standard library.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            services: Arc::new(ServiceRegistry::new()),
            functions: FunctionRegistry::standard(),
            symbols: Arc::new(SymbolTable::new("recalc")),
            state: Arc::new(RwLock::new(EngineState::default())),
            pass: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            runtime: OnceLock::new(),
        }
    }

    /// Builder: use `config` for every evaluation.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: host services available to functions.
    pub fn with_services(mut self, services: ServiceRegistry) -> Self {
        self.services = Arc::new(services);
        self
    }

    /// Builder: use a different function registry.
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Token that cancels running evaluations. Reset it before reuse.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The table holding every variable and formula value.
    pub fn symbols(&self) -> Arc<SymbolTable> {
        self.symbols.clone()
    }

    /// Formula names in definition order.
    pub fn formula_names(&self) -> Vec<String> {
        read(&self.state).formulas.keys().map(|k| k.to_string()).collect()
    }

    /// Whether `name` is a formula.
    pub fn is_formula(&self, name: &str) -> bool {
        read(&self.state).formulas.contains_key(name)
    }

    /// Globals a formula reads.
    pub fn dependencies(&self, name: &str) -> Option<Vec<String>> {
        let state = read(&self.state);
        let reads = state.graph.reads(name)?;
        Some(reads.iter().map(|n| n.to_string()).collect())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Blocking API
    // ═══════════════════════════════════════════════════════════════════

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, EngineError> {
        let runtime = match self.runtime.get() {
            Some(runtime) => runtime,
            None => {
                let built = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(EngineError::Runtime)?;
                self.runtime.get_or_init(|| built)
            }
        };
        Ok(runtime.block_on(future))
    }

    /// Define a formula, evaluate it once and notify `on_update`.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`define_formula_async`](Self::define_formula_async) there. The same
    /// holds for every other blocking method.
    pub fn define_formula(
        &self,
        name: &str,
        ir: IrNode,
        on_update: Option<UpdateCallback>,
    ) -> Result<(), EngineError> {
        self.block_on(self.define_formula_async(name, ir, on_update))?
    }

    /// Write a variable and recompute its dependents.
    pub fn set_variable(&self, name: &str, value: FormulaValue) -> Result<(), EngineError> {
        self.block_on(self.set_variable_async(name, value))?
    }

    /// Remove a formula or variable nothing reads.
    pub fn delete_formula(&self, name: &str) -> Result<(), EngineError> {
        self.block_on(self.delete_formula_async(name))?
    }

    /// Evaluate an expression over the engine's names. Variables written
    /// by `Set` are propagated as one batch afterwards.
    ///
    /// Expressions that cannot assign run without waiting for a running
    /// propagation pass and may observe its intermediate values.
    pub fn eval(&self, ir: &IrNode) -> Result<FormulaValue, EngineError> {
        self.block_on(self.eval_async(ir))?
    }

    /// Make a user-defined function callable from formulas.
    pub fn define_function(&self, udf: UserDefinedFunction) -> Result<(), EngineError> {
        self.block_on(self.define_function_async(udf))?
    }

    /// Cached value of a variable or formula.
    pub fn get_value(&self, name: &str) -> Result<FormulaValue, EngineError> {
        self.symbols.get(name).ok_or_else(|| EngineError::UnknownName {
            name: name.to_string(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Async API
    // ═══════════════════════════════════════════════════════════════════

    /// Async form of [`define_formula`](Self::define_formula).
    ///
    /// A failed definition leaves the engine as it was.
    pub async fn define_formula_async(
        &self,
        name: &str,
        ir: IrNode,
        on_update: Option<UpdateCallback>,
    ) -> Result<(), EngineError> {
        let _pass = self.pass.lock().await;

        let (reads, udfs) = {
            let state = read(&self.state);
            if state.formulas.contains_key(name) || self.symbols.slot(name).is_some() {
                return Err(EngineError::AlreadyDefined {
                    name: name.to_string(),
                });
            }
            let reads = ir.global_names(&*state.udfs);
            if let Some(path) = state.graph.cycle_through(name, &reads) {
                return Err(EngineError::Cycle { path });
            }
            if let Some(missing) = reads.iter().find(|r| self.symbols.slot(r).is_none()) {
                return Err(EngineError::UndefinedName {
                    name: missing.to_string(),
                });
            }
            (reads, state.udfs.clone())
        };

        let value = self.evaluate(&ir, udfs, None).await.map_err(host)?;

        let slot = self.symbols.add_slot(name, ir.ctx.result_type.clone())?;
        self.symbols.set(&slot, value.clone())?;
        let name: Arc<str> = slot.name.clone();
        {
            let mut state = write(&self.state);
            state.graph.add(name.clone(), reads.clone());
            state.formulas.insert(
                name.clone(),
                NamedFormula {
                    ir: Arc::new(ir),
                    reads,
                    on_update: on_update.clone(),
                },
            );
        }
        debug!("defined formula {name}");

        if let Some(callback) = on_update {
            callback(&name, &value);
        }
        Ok(())
    }

    /// Async form of [`set_variable`](Self::set_variable).
    pub async fn set_variable_async(
        &self,
        name: &str,
        value: FormulaValue,
    ) -> Result<(), EngineError> {
        let _pass = self.pass.lock().await;
        store_variable(&self.symbols, &self.state, name, value)?;
        self.propagate(&[Arc::from(name)]).await
    }

    /// Async form of [`delete_formula`](Self::delete_formula).
    pub async fn delete_formula_async(&self, name: &str) -> Result<(), EngineError> {
        let _pass = self.pass.lock().await;
        let mut state = write(&self.state);

        let is_formula = state.formulas.contains_key(name);
        if !is_formula && self.symbols.slot(name).is_none() {
            return Err(EngineError::UnknownName {
                name: name.to_string(),
            });
        }
        let dependents = state.graph.dependents(name);
        if !dependents.is_empty() {
            return Err(EngineError::HasDependents {
                name: name.to_string(),
                dependents: dependents.iter().map(|d| d.to_string()).collect(),
            });
        }

        state.formulas.shift_remove(name);
        state.graph.remove(name);
        self.symbols.remove_slot(name);
        debug!("deleted {name}");
        Ok(())
    }

    /// Async form of [`eval`](Self::eval).
    pub async fn eval_async(&self, ir: &IrNode) -> Result<FormulaValue, EngineError> {
        if !ir.has_side_effects() {
            let udfs = read(&self.state).udfs.clone();
            return self.evaluate(ir, udfs, None).await.map_err(host);
        }

        let _pass = self.pass.lock().await;
        let udfs = read(&self.state).udfs.clone();
        let recorder = Arc::new(BatchRecorder {
            symbols: self.symbols.clone(),
            state: self.state.clone(),
            changed: Mutex::new(IndexSet::new()),
        });

        let sink: Arc<dyn VariableSink> = recorder.clone();
        let value = self.evaluate(ir, udfs, Some(sink)).await;

        // Writes made before a failure are kept, so dependents still update
        let changed = recorder.take();
        let propagated = if changed.is_empty() {
            Ok(())
        } else {
            self.propagate(&changed).await
        };
        let value = value.map_err(host)?;
        propagated?;
        Ok(value)
    }

    /// Async form of [`define_function`](Self::define_function).
    pub async fn define_function_async(&self, udf: UserDefinedFunction) -> Result<(), EngineError> {
        let _pass = self.pass.lock().await;
        let name = udf.name.clone();
        let mut state = write(&self.state);
        Arc::make_mut(&mut state.udfs).insert(udf)?;
        debug!("defined function {name}");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Propagation
    // ═══════════════════════════════════════════════════════════════════

    fn context(&self) -> EvalContext {
        EvalContext::from_config(&self.config, self.services.clone(), self.cancel.clone())
    }

    async fn evaluate(
        &self,
        ir: &IrNode,
        udfs: Arc<UdfTable>,
        sink: Option<Arc<dyn VariableSink>>,
    ) -> Result<FormulaValue, EvalError> {
        let mut evaluator = Evaluator::new()
            .with_functions(self.functions.clone())
            .with_globals(ScopeStore::new(self.symbols.clone()))
            .with_udfs(udfs);
        if let Some(sink) = sink {
            evaluator = evaluator.with_variables(sink);
        }
        evaluator.eval(ir, &self.context()).await
    }

    /// Recompute everything that depends on `changed`. The caller holds
    /// the pass lock.
    async fn propagate(&self, changed: &[Arc<str>]) -> Result<(), EngineError> {
        let (order, udfs) = {
            let state = read(&self.state);
            let order = state.graph.affected(changed.iter().map(|n| &**n));
            (order, state.udfs.clone())
        };
        if order.is_empty() {
            return Ok(());
        }
        debug!("recalc after {changed:?}: {order:?}");

        for name in order {
            let formula = read(&self.state).formulas.get(&name).cloned();
            let Some(formula) = formula else {
                continue;
            };
            let value = self
                .evaluate(&formula.ir, udfs.clone(), None)
                .await
                .map_err(host)?;
            if let Some(slot) = self.symbols.slot(&name) {
                self.symbols.set(&slot, value.clone())?;
            }
            trace!("{name} = {value:?}");
            if let Some(callback) = &formula.on_update {
                callback(&name, &value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;
    use crate::value::FormulaType;
    use pretty_assertions::assert_eq;

    fn a_times(n: f64) -> IrNode {
        IrNode::binary(
            BinaryOp::Mul,
            IrNode::name("A", FormulaType::Number),
            IrNode::number(n),
            FormulaType::Number,
        )
    }

    #[test]
    fn test_define_evaluates_immediately() {
        let engine = RecalcEngine::new();
        engine.set_variable("A", FormulaValue::Number(3.0)).unwrap();
        engine.define_formula("B", a_times(2.0), None).unwrap();
        assert_eq!(engine.get_value("B").unwrap(), FormulaValue::Number(6.0));
        assert_eq!(engine.dependencies("B"), Some(vec!["A".to_string()]));
    }

    #[test]
    fn test_unknown_name_lookup() {
        let engine = RecalcEngine::new();
        assert!(matches!(
            engine.get_value("nope"),
            Err(EngineError::UnknownName { .. })
        ));
        assert!(matches!(
            engine.delete_formula("nope"),
            Err(EngineError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_variable_cannot_shadow_formula() {
        let engine = RecalcEngine::new();
        engine.set_variable("A", FormulaValue::Number(1.0)).unwrap();
        engine.define_formula("B", a_times(2.0), None).unwrap();
        assert!(matches!(
            engine.set_variable("B", FormulaValue::Number(5.0)),
            Err(EngineError::ReadOnly { .. })
        ));
        assert!(matches!(
            engine.define_formula("A", IrNode::number(1.0), None),
            Err(EngineError::AlreadyDefined { .. })
        ));
    }

    #[tokio::test]
    async fn test_async_api() {
        let engine = RecalcEngine::new();
        engine
            .set_variable_async("A", FormulaValue::Number(4.0))
            .await
            .unwrap();
        engine
            .define_formula_async("B", a_times(0.5), None)
            .await
            .unwrap();
        assert_eq!(engine.get_value("B").unwrap(), FormulaValue::Number(2.0));
    }
}
