//! The per-fiber service environment.
//!
//! An [`Env`] is an immutable, append-only map from service type to a
//! shared instance. It is attached to a fiber at spawn time, inherited
//! by forked fibers, and visible to every instruction of the fiber via
//! [`Effect::service`](crate::Effect::service). Appending never mutates
//! an existing environment; it produces a new one sharing the old
//! entries.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ServiceMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// An immutable, append-only typed service map.
#[derive(Clone, Default)]
pub struct Env {
    services: Arc<ServiceMap>,
}

impl Env {
    /// An empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new environment extended with `service`.
    ///
    /// A service of the same type already present is shadowed in the new
    /// environment; the old environment is unchanged.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(&self, service: T) -> Self {
        let mut services: ServiceMap = (*self.services).clone();
        services.insert(TypeId::of::<T>(), Arc::new(service));
        Self {
            services: Arc::new(services),
        }
    }

    /// Looks up a service by type.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Returns true if a service of type `T` is present.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("services", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Clock(u64);

    #[test]
    fn append_does_not_mutate() {
        let base = Env::new();
        let extended = base.with(Clock(1));
        assert!(!base.contains::<Clock>());
        assert_eq!(extended.get::<Clock>().map(|c| c.0), Some(1));
    }

    #[test]
    fn same_type_shadows() {
        let env = Env::new().with(Clock(1)).with(Clock(2));
        assert_eq!(env.get::<Clock>().map(|c| c.0), Some(2));
        assert_eq!(env.len(), 1);
    }
}
