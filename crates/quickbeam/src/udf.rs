//! User-defined functions
//!
//! A user-defined function is a named, typed IR body whose parameters are
//! visible to it as the fields of a single row scope. Calls are bounded by
//! the context's maximum call depth, not by the dependency graph.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EngineError;
use crate::ir::{IrNode, UdfBodies};
use crate::value::FormulaType;

/// A function defined by the host or the formula author.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedFunction {
    /// Name used by [`IrNode::udf_call`]
    pub name: Arc<str>,
    /// Parameters in call order
    pub params: Vec<(Arc<str>, FormulaType)>,
    /// Declared result type
    pub return_type: FormulaType,
    /// Bound body
    pub body: Arc<IrNode>,
}

impl UserDefinedFunction {
    /// Function without parameters.
    pub fn new(name: &str, return_type: FormulaType, body: IrNode) -> Self {
        Self {
            name: Arc::from(name),
            params: Vec::new(),
            return_type,
            body: Arc::new(body),
        }
    }

    /// Builder: append a parameter.
    pub fn with_param(mut self, name: &str, ty: FormulaType) -> Self {
        self.params.push((Arc::from(name), ty));
        self
    }
}

/// Functions by name, in definition order.
#[derive(Debug, Clone, Default)]
pub struct UdfTable {
    functions: IndexMap<Arc<str>, Arc<UserDefinedFunction>>,
}

impl UdfTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a function.
    pub fn get(&self, name: &str) -> Option<Arc<UserDefinedFunction>> {
        self.functions.get(name).cloned()
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Add a function. Names cannot be redefined.
    pub fn insert(&mut self, udf: UserDefinedFunction) -> Result<(), EngineError> {
        if self.functions.contains_key(&udf.name) {
            return Err(EngineError::AlreadyDefined {
                name: udf.name.to_string(),
            });
        }
        self.functions.insert(udf.name.clone(), Arc::new(udf));
        Ok(())
    }

    /// Defined names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|k| &**k)
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no functions are defined.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl UdfBodies for UdfTable {
    fn udf_body(&self, name: &str) -> Option<(Vec<Arc<str>>, Arc<IrNode>)> {
        let udf = self.functions.get(name)?;
        let params = udf.params.iter().map(|(p, _)| p.clone()).collect();
        Some((params, udf.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalContext;
    use crate::eval::Evaluator;
    use crate::ir::{BinaryOp, Qualifier};
    use crate::value::{ErrorKind, FormulaValue};

    fn double() -> UserDefinedFunction {
        let x = IrNode::qualified("x", Qualifier::ThisRow, FormulaType::Number);
        UserDefinedFunction::new(
            "Double",
            FormulaType::Number,
            IrNode::binary(BinaryOp::Mul, x, IrNode::number(2.0), FormulaType::Number),
        )
        .with_param("x", FormulaType::Number)
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut table = UdfTable::new();
        table.insert(double()).unwrap();
        assert!(matches!(
            table.insert(double()),
            Err(EngineError::AlreadyDefined { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_call_binds_parameters() {
        let mut table = UdfTable::new();
        table.insert(double()).unwrap();
        let ev = Evaluator::new().with_udfs(Arc::new(table));
        let call = IrNode::udf_call("Double", vec![IrNode::number(21.0)], FormulaType::Number);
        assert_eq!(
            ev.eval_blocking(&call, &EvalContext::new()).unwrap(),
            FormulaValue::Number(42.0)
        );
    }

    #[test]
    fn test_unbounded_recursion_is_an_error_value() {
        let mut table = UdfTable::new();
        table
            .insert(UserDefinedFunction::new(
                "Forever",
                FormulaType::Number,
                IrNode::udf_call("Forever", vec![], FormulaType::Number),
            ))
            .unwrap();
        let ev = Evaluator::new().with_udfs(Arc::new(table));
        let call = IrNode::udf_call("Forever", vec![], FormulaType::Number);
        let value = ev
            .eval_blocking(&call, &EvalContext::with_max_call_depth(20))
            .unwrap();
        assert_eq!(
            value.as_error().unwrap().first().kind,
            ErrorKind::CallDepthExceeded
        );
    }

    #[test]
    fn test_bodies_expose_parameters() {
        let mut table = UdfTable::new();
        table.insert(double()).unwrap();
        let (params, _) = table.udf_body("Double").unwrap();
        assert_eq!(params, vec![Arc::<str>::from("x")]);
    }
}
