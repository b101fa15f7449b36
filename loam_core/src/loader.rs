//! Loam unit loader
//!
//! [`UnitLoader`] wraps one unit file: it validates the path up front,
//! executes the file lazily on first access, and exposes reflective
//! accessors plus dynamic invocation over the resulting namespace.

use crate::error::{LoamError, Result};
use crate::eval;
use crate::registry::{self, UnitRegistry};
use crate::types::{Binding, ClassDef, FnDef, Namespace, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads one unit file and reflects over its contents.
///
/// The loader has exactly two states, unloaded and loaded, with a one-way
/// transition taken by [`load`](Self::load) or the first accessor call.
/// There is no unload.
pub struct UnitLoader {
    path: PathBuf,
    registry: UnitRegistry,
    unit: Option<Arc<Namespace>>,
}

impl UnitLoader {
    /// Create a loader backed by the process-wide registry.
    ///
    /// Validates the path without reading it: the file must exist and must
    /// carry the `.loam` extension. The file is not executed yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_registry(path, registry::global().clone())
    }

    /// Create a loader that registers into an explicit registry
    pub fn with_registry<P: AsRef<Path>>(path: P, registry: UnitRegistry) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(LoamError::NotFound(path.display().to_string()));
        }
        if path.extension().and_then(|e| e.to_str()) != Some(registry::UNIT_EXTENSION) {
            return Err(LoamError::InvalidKind(path.display().to_string()));
        }

        Ok(Self {
            path,
            registry,
            unit: None,
        })
    }

    /// The validated path this loader was built from
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.unit.is_some()
    }

    /// Execute the unit file and register the namespace.
    ///
    /// Calling again re-executes the file and replaces both the stored
    /// namespace and the registry entry. Errors raised by the file's own
    /// top-level defs propagate unmodified.
    pub fn load(&mut self) -> Result<Arc<Namespace>> {
        let namespace = eval::load_unit(&self.path, &self.registry, &mut Vec::new())?;
        self.unit = Some(namespace.clone());
        Ok(namespace)
    }

    fn ensure_loaded(&mut self) -> Result<Arc<Namespace>> {
        match &self.unit {
            Some(unit) => Ok(unit.clone()),
            None => self.load(),
        }
    }

    /// Functions defined by the unit, by name
    pub fn functions(&mut self) -> Result<HashMap<String, Arc<FnDef>>> {
        let unit = self.ensure_loaded()?;
        Ok(unit
            .iter()
            .filter_map(|(name, binding)| match binding {
                Binding::Function(f) => Some((name.clone(), f.clone())),
                _ => None,
            })
            .collect())
    }

    /// Classes defined by the unit, by name
    pub fn classes(&mut self) -> Result<HashMap<String, Arc<ClassDef>>> {
        let unit = self.ensure_loaded()?;
        Ok(unit
            .iter()
            .filter_map(|(name, binding)| match binding {
                Binding::Class(c) => Some((name.clone(), c.clone())),
                _ => None,
            })
            .collect())
    }

    /// Variables defined by the unit, by name.
    ///
    /// Names starting with `_` and nested-unit bindings are excluded.
    pub fn variables(&mut self) -> Result<HashMap<String, Value>> {
        let unit = self.ensure_loaded()?;
        Ok(unit
            .iter()
            .filter_map(|(name, binding)| match binding {
                Binding::Value(v) if !name.starts_with('_') => Some((name.clone(), v.clone())),
                _ => None,
            })
            .collect())
    }

    /// Look up a binding by name. Absence is a valid outcome, not an error.
    pub fn get(&mut self, name: &str) -> Result<Option<Binding>> {
        let unit = self.ensure_loaded()?;
        Ok(unit.get(name).cloned())
    }

    /// Invoke a function by name with positional and named arguments.
    ///
    /// Errors raised by the function body itself propagate unmodified.
    pub fn call(
        &mut self,
        name: &str,
        positional: &[Value],
        named: &HashMap<String, Value>,
    ) -> Result<Value> {
        let unit = self.ensure_loaded()?;
        match unit.get(name) {
            Some(Binding::Function(f)) => eval::call_function(f, &unit, positional, named),
            Some(_) => Err(LoamError::NotCallable(name.to_string())),
            None => Err(LoamError::NotFound(name.to_string())),
        }
    }

    /// Construct an instance of a class by name.
    ///
    /// Errors raised while evaluating field defaults propagate unmodified.
    pub fn instantiate(
        &mut self,
        name: &str,
        positional: &[Value],
        named: &HashMap<String, Value>,
    ) -> Result<Value> {
        let unit = self.ensure_loaded()?;
        match unit.get(name) {
            Some(Binding::Class(c)) => eval::instantiate_class(c, &unit, positional, named),
            Some(_) => Err(LoamError::NotAClass(name.to_string())),
            None => Err(LoamError::NotFound(name.to_string())),
        }
    }
}
