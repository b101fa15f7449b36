//! Process-wide registry of loaded units
//!
//! Loaded namespaces are registered under a synthetic name so later loads
//! and `use` resolution can find them. The registry is an explicit handle
//! rather than ambient global state, so tests can isolate instances; a
//! shared process-wide default is still available via [`global`].

use crate::types::Namespace;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Recognized extension of a unit file
pub const UNIT_EXTENSION: &str = "loam";

/// Synthetic identifier a unit registers under, derived from the file stem
pub fn synthetic_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unit");
    format!("loaded_{}", stem)
}

/// Cloneable handle to a table of loaded units.
///
/// Insert-or-overwrite; entries accumulate for the life of the process,
/// there is no teardown. Two files sharing a stem share a synthetic name,
/// and the last load wins.
#[derive(Clone, Default)]
pub struct UnitRegistry {
    inner: Arc<Mutex<HashMap<String, Arc<Namespace>>>>,
}

impl UnitRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace under its synthetic name, replacing any
    /// previous entry
    pub fn insert(&self, name: &str, namespace: Arc<Namespace>) {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if table.insert(name.to_string(), namespace).is_some() {
            tracing::warn!("registry entry {} replaced", name);
        }
    }

    /// Look up a loaded unit by synthetic name
    pub fn get(&self, name: &str) -> Option<Arc<Namespace>> {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        table.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        table.contains_key(name)
    }

    /// Registered synthetic names, in no particular order
    pub fn names(&self) -> Vec<String> {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        table.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The shared process-wide registry used by loaders that are not handed
/// an explicit one
pub fn global() -> &'static UnitRegistry {
    static GLOBAL: OnceLock<UnitRegistry> = OnceLock::new();
    GLOBAL.get_or_init(UnitRegistry::new)
}
