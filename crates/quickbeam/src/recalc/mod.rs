//! Incremental recalculation of named formulas
//!
//! [`RecalcEngine`] owns the variables and formulas; [`DependencyGraph`]
//! decides which formulas a change reaches and in which order they run.

mod engine;
mod graph;

pub use engine::{update_callback, NamedFormula, RecalcEngine, UpdateCallback};
pub use graph::DependencyGraph;
