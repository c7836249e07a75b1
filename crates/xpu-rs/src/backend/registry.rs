//! Runtime backend registry for dynamic backend selection.
//!
//! Backends register a constructor under one or more names; callers pick a backend by name at
//! runtime instead of hardcoding concrete types. Registration can happen from any crate,
//! including through a load-time initializer.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::spec::TensorBackend;

/// Factory function that creates a new backend instance.
pub type BackendConstructor = Box<dyn Fn() -> Arc<dyn TensorBackend> + Send + Sync>;

/// Global backend registry mapping backend names to constructors.
struct BackendRegistry {
    backends: RwLock<HashMap<String, BackendConstructor>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: BackendConstructor) {
        let mut backends = self
            .backends
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if backends.insert(name.clone(), constructor).is_some() {
            log::debug!("backend '{name}' re-registered; previous constructor replaced");
        }
    }

    fn create(&self, name: &str) -> Option<Arc<dyn TensorBackend>> {
        let registry = self
            .backends
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_backend(&self, name: &str) -> bool {
        self.backends
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

fn global_registry() -> &'static BackendRegistry {
    GLOBAL_REGISTRY.get_or_init(BackendRegistry::new)
}

/// Register a backend by name with a constructor function.
///
/// The constructor is called each time the backend is requested via [`create_backend`].
pub fn register_backend<B, F>(name: impl Into<String>, constructor: F)
where
    B: TensorBackend + 'static,
    F: Fn() -> B + Send + Sync + 'static,
{
    global_registry().register(
        name.into(),
        Box::new(move || Arc::new(constructor()) as Arc<dyn TensorBackend>),
    );
}

/// Create a backend instance by name.
///
/// Returns `None` if no backend with the given name has been registered.
pub fn create_backend(name: &str) -> Option<Arc<dyn TensorBackend>> {
    global_registry().create(name)
}

/// List all registered backend names, sorted.
pub fn list_backends() -> Vec<String> {
    global_registry().list_backends()
}

/// Check if a backend with the given name is registered.
pub fn has_backend(name: &str) -> bool {
    global_registry().has_backend(name)
}
