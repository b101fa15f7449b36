//! Loam Core
//!
//! Runtime loader for Loam unit files. A unit file defines functions,
//! classes, and variables; [`UnitLoader`] validates the path, executes the
//! file lazily into a namespace, and exposes reflective accessors and
//! dynamic invocation over it. Loaded units register under a synthetic
//! name in a [`UnitRegistry`].

pub mod error;
pub mod eval;
pub mod loader;
pub mod registry;
pub mod types;

pub use error::{LoamError, Result};
pub use loader::UnitLoader;
pub use registry::UnitRegistry;
pub use types::{Binding, BindingKind, Namespace, Value};
