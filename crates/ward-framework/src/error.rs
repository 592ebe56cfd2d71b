//! Error types for the Ward framework layer.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by plugin and api hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a lifecycle or dispatch hook.
pub type HookResult = Result<(), BoxError>;

/// Errors raised by data containers and the data store.
#[derive(Debug, Error)]
pub enum DataError {
    /// The backing file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file does not contain valid data.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory value could not be serialized.
    #[error("failed to serialize data: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A field-level access needs the data to be a JSON object.
    #[error("field '{key}' cannot be accessed: {reason}")]
    Field { key: String, reason: String },

    /// Data was accessed before `load()` completed.
    #[error("data at {} is not loaded", path.display())]
    NotLoaded { path: PathBuf },

    /// The importable has not been attached to a data store yet.
    #[error("'{id}' is not attached to a data store")]
    Unbound { id: String },
}

/// A [`DataError`] shared between all callers awaiting the same save.
pub type SharedDataError = Arc<DataError>;

/// Result type for data operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors raised while wiring injection points.
#[derive(Debug, Clone, Error)]
pub enum InjectError {
    /// The resolved instance is not of the type the slot expects.
    #[error("'{target}' is not a {expected}")]
    TypeMismatch {
        target: String,
        expected: &'static str,
    },

    /// The slot already holds an instance.
    #[error("slot for '{target}' is already filled")]
    AlreadyInjected { target: String },

    /// No registered instance matches the target.
    #[error("no {kind} matches '{target}'")]
    Unresolved { target: String, kind: &'static str },

    /// A slot was read before the injection pass filled it.
    #[error("dependency '{0}' has not been injected")]
    Missing(&'static str),
}
