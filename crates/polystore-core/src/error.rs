use thiserror::Error;

/// Error taxonomy shared by every backend adapter.
///
/// "Not found" is deliberately absent: read/update/delete misses are
/// expressed as `Ok(None)` / `Ok(false)` by the contracts, never as an
/// error variant.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The native engine is not present or could not be opened. The hint
    /// tells the caller how to remedy the situation.
    #[error("backend '{backend}' unavailable: {hint}")]
    BackendUnavailable {
        backend: &'static str,
        hint: String,
    },

    /// The caller passed a value the codec cannot represent.
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    /// The key normalizes to an empty string.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The backend lacks the requested capability.
    #[error("operation '{operation}' is not supported by backend '{backend}'")]
    NotSupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// A stored body could not be decoded at all. Field-level corruption
    /// degrades to an absent field instead of raising this.
    #[error("malformed stored data: {0}")]
    MalformedStoredData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
