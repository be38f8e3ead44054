//! Host services reachable from functions
//!
//! Services are looked up by capability type. Functions that need one and
//! find none fall back to a built-in default.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

/// Source of random numbers for `Rand` and `RandBetween`.
///
/// Implementations must yield values in `[0, 1)`; anything else fails the
/// evaluation with [`EvalError::ServiceContract`](crate::EvalError::ServiceContract).
pub trait RandomService: Send + Sync {
    /// Next random number.
    fn next_f64(&self) -> BoxFuture<'_, f64>;
}

/// [`RandomService`] backed by the thread-local `rand` generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomService for ThreadRandom {
    fn next_f64(&self) -> BoxFuture<'_, f64> {
        future::ready(rand::random::<f64>()).boxed()
    }
}

/// Capability-keyed bag of host services.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    /// No services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its own type, replacing any previous one.
    ///
    /// Trait-object services are registered as `Arc<dyn Trait>`:
    ///
    /// ```
    /// use std::sync::Arc;
    /// use quickbeam::services::{RandomService, ServiceRegistry, ThreadRandom};
    ///
    /// let services = ServiceRegistry::new()
    ///     .with(Arc::new(ThreadRandom) as Arc<dyn RandomService>);
    /// assert!(services.get::<Arc<dyn RandomService>>().is_some());
    /// ```
    pub fn with<S: Send + Sync + 'static>(mut self, service: S) -> Self {
        self.services.insert(TypeId::of::<S>(), Arc::new(service));
        self
    }

    /// Service registered under type `S`.
    pub fn get<S: Clone + Send + Sync + 'static>(&self) -> Option<S> {
        self.services
            .get(&TypeId::of::<S>())
            .and_then(|s| s.downcast_ref::<S>())
            .cloned()
    }

    /// The random number service, or [`ThreadRandom`].
    pub fn random(&self) -> Arc<dyn RandomService> {
        self.get::<Arc<dyn RandomService>>()
            .unwrap_or_else(|| Arc::new(ThreadRandom))
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.len())
            .finish()
    }
}
