//! Small scalar payloads: colors, option set members and lambdas

use std::fmt;
use std::sync::Arc;

use crate::ir::IrNode;
use crate::symbols::ScopeStack;

use super::FormulaType;

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha, 255 is opaque
    pub a: u8,
}

impl Color {
    /// Opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Color with explicit alpha.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully transparent black.
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Member of a host-defined option set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionSetValue {
    /// Name of the option set
    pub option_set: Arc<str>,
    /// Stable logical name of the member
    pub logical_name: Arc<str>,
    /// Name shown to users
    pub display_name: Arc<str>,
}

/// An argument that has not been evaluated yet.
///
/// Functions with control-flow semantics (`If`, `ForAll`, `IfError`, ...)
/// receive these instead of values and force them on demand, optionally
/// inside an additional row scope. The lambda remembers the scopes that
/// were visible where it was created.
#[derive(Debug, Clone)]
pub struct LambdaValue {
    /// Expression to evaluate
    pub body: Arc<IrNode>,
    /// Row scopes visible at the creation site
    pub scope: ScopeStack,
    /// Name under which a row scope pushed for this lambda is reachable;
    /// an aliased scope does not take part in unqualified lookup
    pub alias: Option<Arc<str>>,
}

impl LambdaValue {
    /// Static type of the body.
    pub fn ty(&self) -> &FormulaType {
        &self.body.ctx.result_type
    }
}

impl PartialEq for LambdaValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}
