//! Evaluation context configuration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{FixedOffset, Offset, Utc};

use crate::config::{Culture, Features, RuntimeConfig};
use crate::error::EvalError;
use crate::governor::Governor;
use crate::services::ServiceRegistry;
use crate::symbols::{RowScope, ScopeStack};
use crate::value::{ExpressionError, Severity};

/// Shared flag a host sets to abort evaluations.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// New, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Configuration and state for one evaluation.
///
/// This is passed through all evaluation calls. It is cheap to clone and
/// never mutated in place: entering a row scope or a user-defined function
/// produces a derived context. The cancellation flag, governor and
/// diagnostics sink are shared by every context derived from the same root.
#[derive(Debug, Clone)]
pub struct EvalContext {
    cancel: CancellationToken,
    governor: Arc<Governor>,
    culture: &'static Culture,
    time_zone: FixedOffset,
    call_depth: usize,
    max_call_depth: usize,
    scope: ScopeStack,
    services: Arc<ServiceRegistry>,
    features: Features,
    diagnostics: Arc<Mutex<Vec<ExpressionError>>>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::from_config(
            &RuntimeConfig::default(),
            Arc::new(ServiceRegistry::new()),
            CancellationToken::new(),
        )
    }
}

impl EvalContext {
    /// Create a new context with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a custom call depth limit.
    pub fn with_max_call_depth(max_depth: usize) -> Self {
        Self {
            max_call_depth: max_depth,
            ..Default::default()
        }
    }

    /// Root context for one evaluation. The governor is fresh.
    pub fn from_config(
        config: &RuntimeConfig,
        services: Arc<ServiceRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cancel,
            governor: Arc::new(Governor::new(config.max_string_length)),
            culture: config.resolve_culture(),
            time_zone: config.resolve_time_zone(),
            call_depth: 0,
            max_call_depth: config.max_call_depth,
            scope: ScopeStack::empty(),
            services,
            features: config.features,
            diagnostics: Arc::new(Mutex::new(Vec::new())),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Cancellation
    // ═══════════════════════════════════════════════════════════════════

    /// Check if evaluation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with [`EvalError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), EvalError> {
        if self.is_cancelled() {
            Err(EvalError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════

    /// Resource governor.
    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Culture for formatting and parsing.
    pub fn culture(&self) -> &'static Culture {
        self.culture
    }

    /// Local time zone.
    pub fn time_zone(&self) -> FixedOffset {
        self.time_zone
    }

    /// Behavior switches.
    pub fn features(&self) -> Features {
        self.features
    }

    /// Host services.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Row scopes currently visible.
    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    /// Current nesting of user-defined function calls.
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    /// Limit on [`call_depth`](Self::call_depth).
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    // ═══════════════════════════════════════════════════════════════════
    // Derived Contexts
    // ═══════════════════════════════════════════════════════════════════

    /// Same context, different row scopes.
    pub fn with_scope(&self, scope: ScopeStack) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    /// Same context with one more row scope.
    pub fn push_row(&self, row: RowScope) -> Self {
        self.with_scope(self.scope.push(row))
    }

    /// Same context, different culture. Used for explicit language codes.
    pub fn with_culture(&self, culture: &'static Culture) -> Self {
        Self {
            culture,
            ..self.clone()
        }
    }

    /// Same context in UTC.
    pub fn in_utc(&self) -> Self {
        Self {
            time_zone: Utc.fix(),
            ..self.clone()
        }
    }

    /// Context for the body of a user-defined function: one level deeper,
    /// with only the parameter scope visible. `None` when the call would
    /// exceed the depth limit.
    pub fn enter_udf(&self, params: RowScope) -> Option<Self> {
        if self.call_depth >= self.max_call_depth {
            return None;
        }
        Some(Self {
            call_depth: self.call_depth + 1,
            scope: ScopeStack::empty().push(params),
            ..self.clone()
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Diagnostics
    // ═══════════════════════════════════════════════════════════════════

    /// Record a warning. The result of the evaluation is unaffected.
    pub fn warn(&self, error: ExpressionError) {
        let error = error.with_severity(Severity::Warning);
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    /// Drain the recorded warnings.
    pub fn take_warnings(&self) -> Vec<ExpressionError> {
        std::mem::take(
            &mut *self
                .diagnostics
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}
