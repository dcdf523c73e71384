use thiserror::Error;

use crate::data::HandlerType;

/// Errors raised by the config tree encoders and the profile storage layer.
#[derive(Debug, Error)]
pub enum DataError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around rusqlite's error type.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around JSON encoding errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// Wrapper around IO errors (directory creation, file locking, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value does not have the type the key declares.
    #[error("type mismatch for {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// NaN and infinities have no JSON form, so no backend accepts them.
    #[error("non-finite double for {key}")]
    NonFiniteDouble { key: String },

    /// Returned when deserializing a document with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// A read or write reached a handler before `initialize` ran.
    #[error("{0} data handler used before initialization")]
    NotInitialized(HandlerType),

    /// Key id or serialized key token is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unknown data handler: {0}")]
    UnknownHandler(String),

    /// Config text decoded to something other than a mapping.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Internal error (poisoned locks, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for DataError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        DataError::Internal(format!("lock poisoned: {}", e))
    }
}
