//! Symbols and scopes visible to an evaluation
//!
//! Globals live in [`SymbolTable`]s: named, typed slots over a backing
//! [`SymbolValues`] store. Tables can be layered with a
//! [`ComposedSymbolTable`], later layers shadowing earlier ones. Row
//! scopes pushed by `ForAll`, `With` and friends live on an immutable
//! [`ScopeStack`] carried by the evaluation context.

mod scope;
mod table;

pub use scope::{RowScope, ScopeStack};
pub use table::{ComposedSymbolTable, SymbolTable, SymbolValues};

use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;
use crate::value::{FormulaType, FormulaValue};

/// Identity of a slot: the owning table plus a per-table counter.
///
/// Ids are never reused, so a slot removed and re-added under the same
/// name gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    table: u64,
    index: u64,
}

/// A named, typed storage location for one global value.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Identity
    pub id: SlotId,
    /// Name
    pub name: Arc<str>,
    /// Type fixed when the slot was created
    pub ty: FormulaType,
}

/// Read access to global symbols.
pub trait SymbolLookup: fmt::Debug + Send + Sync {
    /// Resolve a name to its current slot.
    fn lookup(&self, name: &str) -> Option<Slot>;

    /// Current value of a slot, `None` if the slot is gone or unset.
    fn value(&self, slot: &Slot) -> Option<FormulaValue>;
}

/// Snapshot of the globals one evaluation reads from.
#[derive(Debug, Clone)]
pub struct ScopeStore {
    globals: Arc<dyn SymbolLookup>,
}

impl ScopeStore {
    /// Store reading from `globals`.
    pub fn new(globals: Arc<dyn SymbolLookup>) -> Self {
        Self { globals }
    }

    /// Store with no globals.
    pub fn empty() -> Self {
        Self::new(Arc::new(ComposedSymbolTable::new()))
    }

    /// Read a global, checking that its type still matches what the
    /// binder saw.
    pub fn read(&self, name: &str, expected: &FormulaType) -> Result<FormulaValue, EvalError> {
        let slot = self
            .globals
            .lookup(name)
            .ok_or_else(|| EvalError::StaleSlot {
                name: name.to_string(),
            })?;
        if !expected.accepts(&slot.ty) {
            return Err(EvalError::SlotTypeChanged {
                name: name.to_string(),
                expected: expected.to_string(),
                found: slot.ty.to_string(),
            });
        }
        self.globals
            .value(&slot)
            .ok_or_else(|| EvalError::UninitializedSlot {
                name: name.to_string(),
            })
    }

    /// Whether `name` resolves to a global.
    pub fn contains(&self, name: &str) -> bool {
        self.globals.lookup(name).is_some()
    }
}
