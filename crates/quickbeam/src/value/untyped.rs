//! Dynamically typed host objects

use std::fmt;
use std::sync::Arc;

/// Shape of an untyped object as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntypedKind {
    /// JSON-style null
    Null,
    /// Boolean
    Boolean,
    /// Number
    Number,
    /// String
    String,
    /// Ordered list
    Array,
    /// Property bag
    Object,
}

/// A value whose shape is only known at runtime, typically parsed JSON.
///
/// Formulas reach into it through field access and explicit conversions.
pub trait UntypedObject: fmt::Debug + Send + Sync {
    /// Runtime shape.
    fn kind(&self) -> UntypedKind;

    /// Boolean payload.
    fn as_bool(&self) -> Option<bool>;

    /// Numeric payload.
    fn as_number(&self) -> Option<f64>;

    /// String payload.
    fn as_string(&self) -> Option<String>;

    /// Number of array elements; zero for non-arrays.
    fn array_len(&self) -> usize;

    /// Array element.
    fn index(&self, index: usize) -> Option<Arc<dyn UntypedObject>>;

    /// Object property.
    fn property(&self, name: &str) -> Option<Arc<dyn UntypedObject>>;
}

/// [`UntypedObject`] backed by a `serde_json` value.
#[derive(Debug, Clone)]
pub struct JsonUntyped(pub serde_json::Value);

impl JsonUntyped {
    /// Parse JSON text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(JsonUntyped)
    }
}

impl UntypedObject for JsonUntyped {
    fn kind(&self) -> UntypedKind {
        match &self.0 {
            serde_json::Value::Null => UntypedKind::Null,
            serde_json::Value::Bool(_) => UntypedKind::Boolean,
            serde_json::Value::Number(_) => UntypedKind::Number,
            serde_json::Value::String(_) => UntypedKind::String,
            serde_json::Value::Array(_) => UntypedKind::Array,
            serde_json::Value::Object(_) => UntypedKind::Object,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    fn as_number(&self) -> Option<f64> {
        self.0.as_f64()
    }

    fn as_string(&self) -> Option<String> {
        self.0.as_str().map(str::to_owned)
    }

    fn array_len(&self) -> usize {
        self.0.as_array().map_or(0, Vec::len)
    }

    fn index(&self, index: usize) -> Option<Arc<dyn UntypedObject>> {
        let item = self.0.as_array()?.get(index)?;
        Some(Arc::new(JsonUntyped(item.clone())))
    }

    fn property(&self, name: &str) -> Option<Arc<dyn UntypedObject>> {
        let item = self.0.as_object()?.get(name)?;
        Some(Arc::new(JsonUntyped(item.clone())))
    }
}
