//! Error types for Loam Core

use thiserror::Error;

/// Result type for Loam operations
pub type Result<T> = std::result::Result<T, LoamError>;

/// Errors that can occur while loading or using a unit
#[derive(Error, Debug)]
pub enum LoamError {
    /// Path absent at construction, or name unbound at call/instantiate time
    #[error("not found: {0}")]
    NotFound(String),

    /// Path does not carry the recognized unit-file extension
    #[error("not a loam unit file: {0}")]
    InvalidKind(String),

    /// The file could not be turned into an executable unit
    #[error("cannot load {path}: {message}")]
    Load { path: String, message: String },

    /// Name is bound but not a function, in `call`
    #[error("'{0}' is not callable")]
    NotCallable(String),

    /// Name is bound but not a class, in `instantiate`
    #[error("'{0}' is not a class")]
    NotAClass(String),

    /// Evaluation failure raised by the loaded code itself
    #[error("eval error: {0}")]
    Eval(String),

    /// Type mismatch during evaluation
    #[error("type error: expected {expected}, got {actual}")]
    Type { expected: String, actual: String },

    /// A call or instantiation left a parameter or field without a value
    #[error("missing argument: {0}")]
    MissingArgument(String),
}
