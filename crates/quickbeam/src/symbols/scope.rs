//! Row scopes
//!
//! A persistent stack: pushing returns a new stack sharing its tail with
//! the old one, so closures capture scopes by cloning an `Arc` and no
//! frame ever has to be popped.

use std::sync::Arc;

use crate::value::{FormulaType, FormulaValue, RecordType, RecordValue};

/// The current row of an iteration, or any record whose fields should be
/// addressable by bare name.
#[derive(Debug, Clone)]
pub struct RowScope {
    row: Option<RecordValue>,
    ty: RecordType,
    alias: Option<Arc<str>>,
}

impl RowScope {
    /// Scope over a record.
    pub fn new(row: RecordValue, alias: Option<Arc<str>>) -> Self {
        Self {
            ty: row.ty().clone(),
            row: Some(row),
            alias,
        }
    }

    /// Scope over a blank row of `ty`: every field reads as blank.
    pub fn blank(ty: RecordType, alias: Option<Arc<str>>) -> Self {
        Self {
            row: None,
            ty,
            alias,
        }
    }

    /// Alias, if the scope was pushed with one.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Field value, `None` when the scope does not declare `name`.
    pub fn field(&self, name: &str) -> Option<FormulaValue> {
        match &self.row {
            Some(row) if row.ty().contains(name) || row.get(name).is_some() => {
                Some(row.field(name))
            }
            Some(_) => None,
            None => self
                .ty
                .get(name)
                .map(|ty| FormulaValue::Blank(ty.clone())),
        }
    }

    /// The whole row as a value.
    pub fn record(&self) -> FormulaValue {
        match &self.row {
            Some(row) => FormulaValue::Record(row.clone()),
            None => FormulaValue::Blank(FormulaType::Record(self.ty.clone())),
        }
    }
}

#[derive(Debug)]
struct ScopeNode {
    scope: RowScope,
    parent: Option<Arc<ScopeNode>>,
}

/// Immutable stack of row scopes, innermost on top.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    head: Option<Arc<ScopeNode>>,
}

impl ScopeStack {
    /// No scopes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// New stack with `scope` on top of this one.
    pub fn push(&self, scope: RowScope) -> ScopeStack {
        ScopeStack {
            head: Some(Arc::new(ScopeNode {
                scope,
                parent: self.head.clone(),
            })),
        }
    }

    /// Scopes from innermost to outermost.
    pub fn iter(&self) -> impl Iterator<Item = &RowScope> {
        std::iter::successors(self.head.as_deref(), |node| node.parent.as_deref())
            .map(|node| &node.scope)
    }

    /// Number of scopes.
    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Unqualified lookup: the nearest non-aliased scope declaring `name`.
    pub fn ambient(&self, name: &str) -> Option<FormulaValue> {
        self.iter()
            .filter(|s| s.alias.is_none())
            .find_map(|s| s.field(name))
    }

    /// Nearest non-aliased scope.
    pub fn this_row(&self) -> Option<&RowScope> {
        self.iter().find(|s| s.alias.is_none())
    }

    /// Scope pushed under `alias`.
    pub fn aliased(&self, alias: &str) -> Option<&RowScope> {
        self.iter().find(|s| s.alias() == Some(alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, n: f64) -> RecordValue {
        RecordValue::from_fields([(name, FormulaValue::Number(n))])
    }

    #[test]
    fn test_inner_scope_wins() {
        let stack = ScopeStack::empty()
            .push(RowScope::new(row("x", 1.0), None))
            .push(RowScope::new(row("x", 2.0), None));
        assert_eq!(stack.ambient("x"), Some(FormulaValue::Number(2.0)));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_aliased_scope_hidden_from_ambient() {
        let stack = ScopeStack::empty()
            .push(RowScope::new(row("x", 1.0), None))
            .push(RowScope::new(row("x", 2.0), Some(Arc::from("inner"))));
        assert_eq!(stack.ambient("x"), Some(FormulaValue::Number(1.0)));
        assert_eq!(
            stack.aliased("inner").and_then(|s| s.field("x")),
            Some(FormulaValue::Number(2.0))
        );
    }

    #[test]
    fn test_push_does_not_disturb_parent() {
        let outer = ScopeStack::empty().push(RowScope::new(row("x", 1.0), None));
        let _inner = outer.push(RowScope::new(row("y", 2.0), None));
        assert_eq!(outer.ambient("y"), None);
    }

    #[test]
    fn test_blank_scope_fields_are_typed_blanks() {
        let ty = RecordType::new().with_field("x", FormulaType::Number);
        let stack = ScopeStack::empty().push(RowScope::blank(ty, None));
        assert_eq!(stack.ambient("x"), Some(FormulaValue::Blank(FormulaType::Number)));
        assert_eq!(stack.ambient("y"), None);
    }
}
