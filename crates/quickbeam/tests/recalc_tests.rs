use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use pretty_assertions::assert_eq;
use quickbeam::*;

/// Records every update notification in order.
#[derive(Clone, Default)]
struct Updates(Arc<Mutex<Vec<(String, FormulaValue)>>>);

impl Updates {
    fn callback(&self) -> Option<UpdateCallback> {
        let log = self.0.clone();
        Some(update_callback(move |name, value| {
            log.lock().unwrap().push((name.to_string(), value.clone()));
        }))
    }

    fn take(&self) -> Vec<(String, FormulaValue)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

fn num(name: &str) -> IrNode {
    IrNode::name(name, FormulaType::Number)
}

fn add(left: IrNode, right: IrNode) -> IrNode {
    IrNode::binary(BinaryOp::Add, left, right, FormulaType::Number)
}

fn mul(left: IrNode, right: IrNode) -> IrNode {
    IrNode::binary(BinaryOp::Mul, left, right, FormulaType::Number)
}

fn n(value: f64) -> FormulaValue {
    FormulaValue::Number(value)
}

fn update(name: &str, value: f64) -> (String, FormulaValue) {
    (name.to_string(), n(value))
}

/// `A = 1; B = A*10; C = B+5; D = B+A`
fn abcd(updates: &Updates) -> RecalcEngine {
    let engine = RecalcEngine::new();
    engine.set_variable("A", n(1.0)).unwrap();
    engine
        .define_formula("B", mul(num("A"), IrNode::number(10.0)), updates.callback())
        .unwrap();
    engine
        .define_formula("C", add(num("B"), IrNode::number(5.0)), updates.callback())
        .unwrap();
    engine
        .define_formula("D", add(num("B"), num("A")), updates.callback())
        .unwrap();
    engine
}

// ═══════════════════════════════════════════════════════════════════════
// Definition
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_define_notifies_once_with_initial_value() {
    let updates = Updates::default();
    let _engine = abcd(&updates);
    assert_eq!(
        updates.take(),
        vec![update("B", 10.0), update("C", 15.0), update("D", 11.0)]
    );
}

#[test]
fn test_define_twice_rejected() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    let err = engine
        .define_formula("C", IrNode::number(0.0), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyDefined { ref name } if name == "C"));
    assert_eq!(engine.get_value("C").unwrap(), n(15.0));
}

#[test]
fn test_undefined_name_leaves_no_state() {
    let engine = RecalcEngine::new();
    let err = engine
        .define_formula("E", add(num("Z"), IrNode::number(1.0)), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::UndefinedName { ref name } if name == "Z"));
    assert!(engine.formula_names().is_empty());
    assert!(engine.get_value("E").is_err());

    // The same name can be defined once its input exists
    engine.set_variable("Z", n(1.0)).unwrap();
    engine
        .define_formula("E", add(num("Z"), IrNode::number(1.0)), None)
        .unwrap();
    assert_eq!(engine.get_value("E").unwrap(), n(2.0));
}

#[test]
fn test_self_reference_is_a_cycle() {
    let engine = RecalcEngine::new();
    let err = engine
        .define_formula("S", add(num("S"), IrNode::number(1.0)), None)
        .unwrap_err();
    match err {
        EngineError::Cycle { path } => assert_eq!(path, vec!["S".to_string(), "S".to_string()]),
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(!engine.is_formula("S"));
}

// ═══════════════════════════════════════════════════════════════════════
// Propagation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_update_fires_dependents_in_order() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    updates.take();

    engine.set_variable("A", n(2.0)).unwrap();
    assert_eq!(
        updates.take(),
        vec![update("B", 20.0), update("C", 25.0), update("D", 22.0)]
    );
    assert_eq!(engine.get_value("A").unwrap(), n(2.0));
    assert_eq!(engine.get_value("D").unwrap(), n(22.0));
}

#[test]
fn test_unread_input_fires_nothing() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    updates.take();

    engine.set_variable("Unrelated", n(7.0)).unwrap();
    assert!(updates.take().is_empty());
}

#[test]
fn test_partial_graph_only_recomputes_reachable() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    engine.set_variable("K", n(3.0)).unwrap();
    engine
        .define_formula("E", mul(num("K"), num("C")), updates.callback())
        .unwrap();
    updates.take();

    engine.set_variable("K", n(4.0)).unwrap();
    assert_eq!(updates.take(), vec![update("E", 60.0)]);
}

#[test]
fn test_blank_formula_propagates_blank() {
    let engine = RecalcEngine::new();
    engine
        .define_formula("X", IrNode::call("Blank", vec![], FormulaType::Blank), None)
        .unwrap();
    engine
        .define_formula("Y", IrNode::name("X", FormulaType::Blank), None)
        .unwrap();
    engine
        .define_formula("Z", add(IrNode::name("X", FormulaType::Blank), IrNode::number(1.0)), None)
        .unwrap();
    assert!(engine.get_value("X").unwrap().is_blank());
    assert!(engine.get_value("Y").unwrap().is_blank());
    assert_eq!(engine.get_value("Z").unwrap(), n(1.0));
}

// ═══════════════════════════════════════════════════════════════════════
// Variables
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_variable_type_is_fixed() {
    let engine = RecalcEngine::new();
    engine.set_variable("a", n(12.0)).unwrap();
    let err = engine
        .set_variable("a", FormulaValue::string("s"))
        .unwrap_err();
    assert!(matches!(err, EngineError::TypeMismatch { .. }));
    assert_eq!(engine.get_value("a").unwrap(), n(12.0));
}

#[test]
fn test_formula_is_read_only() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    assert!(matches!(
        engine.set_variable("B", n(0.0)),
        Err(EngineError::ReadOnly { .. })
    ));
    assert!(matches!(
        engine.eval(&IrNode::set("C", IrNode::number(0.0))),
        Err(EngineError::ReadOnly { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Deletion
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_delete_respects_dependents() {
    let updates = Updates::default();
    let engine = abcd(&updates);

    match engine.delete_formula("B").unwrap_err() {
        EngineError::HasDependents { dependents, .. } => {
            assert_eq!(dependents, vec!["C".to_string(), "D".to_string()])
        }
        other => panic!("expected HasDependents, got {other:?}"),
    }

    engine.delete_formula("D").unwrap();
    engine.delete_formula("C").unwrap();
    engine.delete_formula("B").unwrap();
    assert!(engine.formula_names().is_empty());
    assert!(matches!(
        engine.get_value("B"),
        Err(EngineError::UnknownName { .. })
    ));
}

#[test]
fn test_deleted_formula_no_longer_notified() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    engine.delete_formula("D").unwrap();
    updates.take();

    engine.set_variable("A", n(3.0)).unwrap();
    assert_eq!(updates.take(), vec![update("B", 30.0), update("C", 35.0)]);
}

// ═══════════════════════════════════════════════════════════════════════
// Set inside expressions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_sets_in_one_eval_form_one_batch() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    engine.set_variable("K", n(0.0)).unwrap();
    updates.take();

    let ir = IrNode::chain(vec![
        IrNode::set("A", IrNode::number(2.0)),
        IrNode::set("K", IrNode::number(9.0)),
        IrNode::set("A", IrNode::number(3.0)),
    ]);
    assert_eq!(engine.eval(&ir).unwrap(), FormulaValue::Void);
    assert_eq!(
        updates.take(),
        vec![update("B", 30.0), update("C", 35.0), update("D", 33.0)]
    );
    assert_eq!(engine.get_value("K").unwrap(), n(9.0));
}

#[test]
fn test_set_is_visible_later_in_the_expression() {
    let engine = RecalcEngine::new();
    engine.set_variable("A", n(1.0)).unwrap();
    let ir = IrNode::chain(vec![
        IrNode::set("A", IrNode::number(5.0)),
        mul(num("A"), IrNode::number(2.0)),
    ]);
    assert_eq!(engine.eval(&ir).unwrap(), n(10.0));
}

#[test]
fn test_set_creates_variable() {
    let engine = RecalcEngine::new();
    engine
        .eval(&IrNode::set("Fresh", IrNode::text("hi")))
        .unwrap();
    assert_eq!(engine.get_value("Fresh").unwrap(), FormulaValue::string("hi"));
}

// ═══════════════════════════════════════════════════════════════════════
// User-Defined Functions
// ═══════════════════════════════════════════════════════════════════════

fn double() -> UserDefinedFunction {
    let x = IrNode::qualified("x", Qualifier::ThisRow, FormulaType::Number);
    UserDefinedFunction::new("Double", FormulaType::Number, mul(x, IrNode::number(2.0)))
        .with_param("x", FormulaType::Number)
}

#[test]
fn test_formula_calling_function_tracks_arguments() {
    let engine = RecalcEngine::new();
    engine.define_function(double()).unwrap();
    engine.set_variable("A", n(4.0)).unwrap();
    engine
        .define_formula(
            "F",
            IrNode::udf_call("Double", vec![num("A")], FormulaType::Number),
            None,
        )
        .unwrap();
    engine.set_variable("A", n(5.0)).unwrap();
    assert_eq!(engine.get_value("F").unwrap(), n(10.0));
}

#[test]
fn test_formula_tracks_globals_inside_function_body() {
    let engine = RecalcEngine::new();
    engine.set_variable("Factor", n(3.0)).unwrap();
    engine
        .define_function(UserDefinedFunction::new(
            "Scaled",
            FormulaType::Number,
            mul(num("Factor"), IrNode::number(2.0)),
        ))
        .unwrap();
    engine
        .define_formula("G", IrNode::udf_call("Scaled", vec![], FormulaType::Number), None)
        .unwrap();
    assert_eq!(engine.dependencies("G"), Some(vec!["Factor".to_string()]));

    engine.set_variable("Factor", n(4.0)).unwrap();
    assert_eq!(engine.get_value("G").unwrap(), n(8.0));
}

#[test]
fn test_function_redefinition_rejected() {
    let engine = RecalcEngine::new();
    engine.define_function(double()).unwrap();
    assert!(matches!(
        engine.define_function(double()),
        Err(EngineError::AlreadyDefined { .. })
    ));
}

#[test]
fn test_recursive_function_hits_depth_limit() {
    let engine = RecalcEngine::new().with_config(RuntimeConfig::default().with_max_call_depth(16));
    engine
        .define_function(UserDefinedFunction::new(
            "Forever",
            FormulaType::Number,
            IrNode::udf_call("Forever", vec![], FormulaType::Number),
        ))
        .unwrap();
    engine
        .define_formula(
            "R",
            IrNode::udf_call("Forever", vec![], FormulaType::Number),
            None,
        )
        .unwrap();
    let value = engine.get_value("R").unwrap();
    assert_eq!(
        value.as_error().unwrap().first().kind,
        ErrorKind::CallDepthExceeded
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_cancelled_pass_is_a_host_error() {
    let updates = Updates::default();
    let engine = abcd(&updates);
    updates.take();

    engine.cancellation().cancel();
    let err = engine.set_variable("A", n(2.0)).unwrap_err();
    assert!(matches!(err, EngineError::Eval(EvalError::Cancelled)));
    assert!(updates.take().is_empty());

    engine.cancellation().reset();
    engine.set_variable("A", n(3.0)).unwrap();
    assert_eq!(engine.get_value("D").unwrap(), n(33.0));
}

// ═══════════════════════════════════════════════════════════════════════
// Async API
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_async_engine_inside_runtime() {
    let updates = Updates::default();
    let engine = RecalcEngine::new();
    engine.set_variable_async("A", n(1.0)).await.unwrap();
    engine
        .define_formula_async("B", mul(num("A"), IrNode::number(10.0)), updates.callback())
        .await
        .unwrap();
    engine.set_variable_async("A", n(6.0)).await.unwrap();
    assert_eq!(updates.take(), vec![update("B", 10.0), update("B", 60.0)]);

    let value = engine
        .eval_async(&add(num("B"), IrNode::number(1.0)))
        .await
        .unwrap();
    assert_eq!(value, n(61.0));
}

/// Random service that keeps a propagation pass suspended for a while.
struct SlowRandom;

impl RandomService for SlowRandom {
    fn next_f64(&self) -> BoxFuture<'_, f64> {
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            0.5
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_read_only_eval_does_not_wait_for_a_pass() {
    let services = ServiceRegistry::new().with(Arc::new(SlowRandom) as Arc<dyn RandomService>);
    let engine = RecalcEngine::new().with_services(services);
    engine.set_variable_async("A", n(1.0)).await.unwrap();

    let pass_done = Arc::new(AtomicBool::new(false));
    let done = pass_done.clone();
    let rand = IrNode::call("Rand", vec![], FormulaType::Number);
    engine
        .define_formula_async(
            "B",
            add(num("A"), rand),
            Some(update_callback(move |_, value| {
                if value == &n(2.5) {
                    done.store(true, Ordering::SeqCst);
                }
            })),
        )
        .await
        .unwrap();

    let (set, read) = tokio::join!(engine.set_variable_async("A", n(2.0)), async {
        // The pass stores A, then suspends inside Rand while recomputing B
        while engine.get_value("A").unwrap() != n(2.0) {
            tokio::task::yield_now().await;
        }
        let value = engine.eval_async(&num("A")).await;
        (value, pass_done.load(Ordering::SeqCst))
    });
    set.unwrap();
    assert_eq!(read.0.unwrap(), n(2.0));
    assert!(!read.1, "read waited for the propagation pass");
    assert!(pass_done.load(Ordering::SeqCst));
}
