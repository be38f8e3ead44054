//! Symbol tables and their value stores

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Slot, SlotId, SymbolLookup};
use crate::error::{EngineError, EvalError};
use crate::value::{FormulaType, FormulaValue};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Concurrently readable storage for slot values.
#[derive(Debug, Default)]
pub struct SymbolValues {
    values: DashMap<SlotId, FormulaValue>,
}

impl SymbolValues {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a slot.
    pub fn get(&self, id: SlotId) -> Option<FormulaValue> {
        self.values.get(&id).map(|v| v.value().clone())
    }

    /// Replace the value of a slot.
    pub fn set(&self, id: SlotId, value: FormulaValue) {
        self.values.insert(id, value);
    }

    /// Drop the value of a slot.
    pub fn remove(&self, id: SlotId) {
        self.values.remove(&id);
    }
}

/// Named, typed slots over a [`SymbolValues`] store.
///
/// Only whoever holds the table mutates it; evaluations see it through
/// [`SymbolLookup`].
#[derive(Debug)]
pub struct SymbolTable {
    id: u64,
    name: String,
    slots: DashMap<Arc<str>, Slot>,
    values: Arc<SymbolValues>,
    next_index: AtomicU64,
}

impl SymbolTable {
    /// Empty table with its own value store. `name` is for diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_values(name, Arc::new(SymbolValues::new()))
    }

    /// Empty table over an existing value store.
    pub fn with_values(name: impl Into<String>, values: Arc<SymbolValues>) -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            slots: DashMap::new(),
            values,
            next_index: AtomicU64::new(0),
        }
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a slot. Fails if the name is taken.
    pub fn add_slot(&self, name: &str, ty: FormulaType) -> Result<Slot, EngineError> {
        match self.slots.entry(Arc::from(name)) {
            Entry::Occupied(_) => Err(EngineError::AlreadyDefined {
                name: name.to_string(),
            }),
            Entry::Vacant(entry) => {
                let slot = Slot {
                    id: SlotId {
                        table: self.id,
                        index: self.next_index.fetch_add(1, Ordering::Relaxed),
                    },
                    name: entry.key().clone(),
                    ty,
                };
                entry.insert(slot.clone());
                Ok(slot)
            }
        }
    }

    /// Remove a slot and its value.
    pub fn remove_slot(&self, name: &str) -> Option<Slot> {
        let (_, slot) = self.slots.remove(name)?;
        self.values.remove(slot.id);
        Some(slot)
    }

    /// Current slot for `name`.
    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).map(|s| s.value().clone())
    }

    /// Write the value of a slot of this table.
    pub fn set(&self, slot: &Slot, value: FormulaValue) -> Result<(), EvalError> {
        let live = self.slots.get(&*slot.name).is_some_and(|s| s.id == slot.id);
        if !live {
            return Err(EvalError::StaleSlot {
                name: slot.name.to_string(),
            });
        }
        self.values.set(slot.id, value);
        Ok(())
    }

    /// Current value by name.
    pub fn get(&self, name: &str) -> Option<FormulaValue> {
        let slot = self.slot(name)?;
        self.values.get(slot.id)
    }

    /// Names of all slots, unordered.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.slots.iter().map(|s| s.key().clone()).collect()
    }
}

impl SymbolLookup for SymbolTable {
    fn lookup(&self, name: &str) -> Option<Slot> {
        self.slot(name)
    }

    fn value(&self, slot: &Slot) -> Option<FormulaValue> {
        if slot.id.table != self.id {
            return None;
        }
        self.values.get(slot.id)
    }
}

/// Several symbol sources layered into one; later layers shadow earlier
/// ones.
#[derive(Debug, Default, Clone)]
pub struct ComposedSymbolTable {
    layers: Vec<Arc<dyn SymbolLookup>>,
}

impl ComposedSymbolTable {
    /// No layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer on top.
    pub fn with_layer(mut self, layer: Arc<dyn SymbolLookup>) -> Self {
        self.layers.push(layer);
        self
    }
}

impl SymbolLookup for ComposedSymbolTable {
    fn lookup(&self, name: &str) -> Option<Slot> {
        self.layers.iter().rev().find_map(|layer| layer.lookup(name))
    }

    fn value(&self, slot: &Slot) -> Option<FormulaValue> {
        self.layers.iter().rev().find_map(|layer| layer.value(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_slot_is_stale() {
        let table = SymbolTable::new("test");
        let slot = table.add_slot("x", FormulaType::Number).unwrap();
        table.set(&slot, FormulaValue::Number(1.0)).unwrap();
        table.remove_slot("x");
        assert!(table.set(&slot, FormulaValue::Number(2.0)).is_err());
        assert!(table.value(&slot).is_none());

        // Re-adding creates a new identity
        let again = table.add_slot("x", FormulaType::Number).unwrap();
        assert_ne!(again.id, slot.id);
    }

    #[test]
    fn test_later_layer_shadows() {
        let base = Arc::new(SymbolTable::new("base"));
        let top = Arc::new(SymbolTable::new("top"));
        let a = base.add_slot("x", FormulaType::Number).unwrap();
        base.set(&a, FormulaValue::Number(1.0)).unwrap();
        let b = top.add_slot("x", FormulaType::String).unwrap();
        top.set(&b, FormulaValue::string("top")).unwrap();

        let composed = ComposedSymbolTable::new()
            .with_layer(base.clone())
            .with_layer(top.clone());
        let slot = composed.lookup("x").unwrap();
        assert_eq!(slot.ty, FormulaType::String);
        assert_eq!(composed.value(&slot), Some(FormulaValue::string("top")));
        // Shadowed slots stay readable through their own identity
        assert_eq!(composed.value(&a), Some(FormulaValue::Number(1.0)));
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let table = SymbolTable::new("test");
        table.add_slot("x", FormulaType::Number).unwrap();
        assert!(matches!(
            table.add_slot("x", FormulaType::Number),
            Err(EngineError::AlreadyDefined { .. })
        ));
    }
}
