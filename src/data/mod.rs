//! # Profile Data Layer
//!
//! Keyed player and server data persisted through one of three interchangeable
//! backends:
//!
//! - [`FlatFileDataHandler`] - a single JSON file (config tree layout)
//! - [`SqliteDataHandler`] - a relational table keyed by (entity, key)
//! - [`SledDataHandler`] - one document per entity in an embedded sled tree
//!
//! [`ProfileHandler`] owns the active backend, caches [`Profile`]s per entity
//! and moves all data to a newly configured backend on startup when migration
//! is enabled.
//!
//! ```rust,no_run
//! use profiled::config::StorageConfig;
//! use profiled::data::{HandlerType, PersistentDataKey, ProfileHandler};
//! use uuid::Uuid;
//!
//! fn main() -> Result<(), profiled::DataError> {
//!     let settings = StorageConfig::new("./data", HandlerType::Sled);
//!     let profiles = ProfileHandler::new(settings)?;
//!     let coins = profiles.keys().register(PersistentDataKey::player("shop:coins", 0i64)?);
//!     profiles.initialize(&Vec::<Uuid>::new())?;
//!
//!     let player = Uuid::new_v4();
//!     profiles.load(player).write(&coins, 250i64)?;
//!     profiles.save_keys_for(player, &[coins])?;
//!     profiles.save()?;
//!     Ok(())
//! }
//! ```

pub mod flat_file;
pub mod keys;
pub mod migration;
pub mod profile;
pub mod profiles;
pub mod sled_store;
pub mod sqlite;

pub use flat_file::FlatFileDataHandler;
pub use keys::{KeyRegistry, KeyScope, KeyType, PersistentDataKey, PersistentValue};
pub use migration::{EntityRegistry, InitOutcome, MigrationReport, MigrationState};
pub use profile::{Profile, ProfileKind};
pub use profiles::ProfileHandler;
pub use sled_store::SledDataHandler;
pub use sqlite::SqliteDataHandler;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::errors::DataError;

/// Reserved entity id for the server-wide profile.
pub const SERVER_PROFILE_ID: Uuid = Uuid::nil();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandlerType {
    /// Flat JSON file.
    #[default]
    Json,
    /// Relational (SQLite).
    Sqlite,
    /// Document store (sled).
    Sled,
}

impl HandlerType {
    pub const ALL: [HandlerType; 3] = [HandlerType::Json, HandlerType::Sqlite, HandlerType::Sled];

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerType::Json => "json",
            HandlerType::Sqlite => "sqlite",
            HandlerType::Sled => "sled",
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandlerType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DataError::UnknownHandler(s.to_string()))
    }
}

/// Storage backend contract shared by every handler.
///
/// `initialize` must run before `read`/`write` are trusted; calling it again
/// is a no-op. Values are stored type-erased; a stored value whose type
/// differs from the key's declared type is reported as
/// [`DataError::TypeMismatch`] on read. Writes go through
/// [`PersistentDataKey::check`] so every backend refuses the same values.
pub trait DataHandler: Send + Sync {
    fn handler_type(&self) -> HandlerType;

    fn initialize(&self) -> Result<(), DataError>;

    /// Overwrite the value of `key` for entity `id`.
    fn write(&self, id: Uuid, key: &PersistentDataKey, value: &PersistentValue) -> Result<(), DataError>;

    /// Previously written value, or `None` if never written.
    fn read(&self, id: Uuid, key: &PersistentDataKey) -> Result<Option<PersistentValue>, DataError>;

    /// Flush buffered state to durable storage.
    fn save(&self) -> Result<(), DataError>;

    /// Every entity id with at least one stored value.
    fn entity_ids(&self) -> Result<Vec<Uuid>, DataError>;
}

/// Build the handler for `kind` from storage settings. The handler is not
/// initialized yet.
pub fn create_handler(kind: HandlerType, settings: &StorageConfig) -> Arc<dyn DataHandler> {
    match kind {
        HandlerType::Json => Arc::new(FlatFileDataHandler::new(settings.json_path())),
        HandlerType::Sqlite => Arc::new(SqliteDataHandler::new(settings.sqlite_path())),
        HandlerType::Sled => Arc::new(SledDataHandler::new(settings.sled_path())),
    }
}

/// Parse an entity id argument; `server` names the server profile.
pub fn parse_entity_id(text: &str) -> Option<Uuid> {
    if text.eq_ignore_ascii_case("server") {
        Some(SERVER_PROFILE_ID)
    } else {
        Uuid::parse_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_type_parses_case_insensitively() {
        assert_eq!("SQLite".parse::<HandlerType>().unwrap(), HandlerType::Sqlite);
        assert_eq!(" sled ".parse::<HandlerType>().unwrap(), HandlerType::Sled);
        assert!(matches!(
            "mongo".parse::<HandlerType>(),
            Err(DataError::UnknownHandler(_))
        ));
    }

    #[test]
    fn entity_id_accepts_server_alias() {
        assert_eq!(parse_entity_id("server"), Some(SERVER_PROFILE_ID));
        assert!(parse_entity_id("not-a-uuid").is_none());
    }
}
