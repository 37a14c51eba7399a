use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigError;

/// Table of shared receiver instances, keyed by type identity.
///
/// Bound commands resolve their receiver here exactly once, while the
/// registry is built. A missing entry is a configuration error at build time,
/// never a script run-time error.
#[derive(Default)]
pub struct InstanceMap {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl InstanceMap {
    /// Create an empty instance map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the shared instance for receiver type `T`.
    ///
    /// A second insert for the same type replaces the first; each receiver
    /// type has exactly one live instance.
    pub fn insert<T: Any + Send + Sync>(&mut self, instance: Arc<T>) {
        self.entries.insert(TypeId::of::<T>(), instance);
    }

    /// True when an instance for `T` has been registered.
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Resolve the shared instance for receiver type `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ConfigError> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry).downcast::<T>().ok())
            .ok_or(ConfigError::MissingInstance {
                type_name: type_name::<T>(),
            })
    }
}

impl std::fmt::Debug for InstanceMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceMap")
            .field("receivers", &self.entries.len())
            .finish()
    }
}
