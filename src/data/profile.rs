use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use uuid::Uuid;

use super::keys::{KeyScope, KeyType, PersistentDataKey, PersistentValue};
use super::{DataHandler, SERVER_PROFILE_ID};
use crate::errors::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    Player,
    Server,
}

impl ProfileKind {
    pub fn for_id(id: Uuid) -> Self {
        if id == SERVER_PROFILE_ID {
            ProfileKind::Server
        } else {
            ProfileKind::Player
        }
    }

    pub fn scope(self) -> KeyScope {
        match self {
            ProfileKind::Player => KeyScope::Player,
            ProfileKind::Server => KeyScope::Server,
        }
    }
}

/// In-memory view of one entity's data.
///
/// Values are loaded from the data handler the first time they are read and
/// cached afterwards. Writes only touch the cache; they reach storage when
/// the [`ProfileHandler`](super::ProfileHandler) persists them.
pub struct Profile {
    id: Uuid,
    kind: ProfileKind,
    data: RwLock<HashMap<String, PersistentValue>>,
    handler: Arc<dyn DataHandler>,
}

impl Profile {
    pub(crate) fn new(id: Uuid, handler: Arc<dyn DataHandler>) -> Self {
        Self {
            id,
            kind: ProfileKind::for_id(id),
            data: RwLock::new(HashMap::new()),
            handler,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    /// Current value of `key`. Falls back to the key's default when storage
    /// has nothing for this entity.
    pub fn read(&self, key: &PersistentDataKey) -> Result<PersistentValue, DataError> {
        if let Some(value) = self.data.read()?.get(key.id()) {
            return Ok(value.clone());
        }

        let loaded = self
            .handler
            .read(self.id, key)?
            .unwrap_or_else(|| key.default_value().clone());

        // A write that raced this load takes precedence.
        let mut data = self.data.write()?;
        Ok(data.entry(key.id().to_string()).or_insert(loaded).clone())
    }

    /// Set `key` in memory. The value must have the key's declared type.
    pub fn write(&self, key: &PersistentDataKey, value: impl Into<PersistentValue>) -> Result<(), DataError> {
        let value = value.into();
        key.check(&value)?;
        if key.scope() != self.kind.scope() {
            debug!(
                "Writing {:?}-scoped key {} on {:?} profile {}",
                key.scope(),
                key,
                self.kind,
                self.id
            );
        }
        self.data.write()?.insert(key.id().to_string(), value);
        Ok(())
    }

    /// Cached value without touching storage.
    pub fn cached(&self, key: &PersistentDataKey) -> Option<PersistentValue> {
        self.data.read().ok()?.get(key.id()).cloned()
    }

    pub fn read_int(&self, key: &PersistentDataKey) -> Result<i64, DataError> {
        let value = self.read(key)?;
        value.as_int().ok_or_else(|| mismatch(key, KeyType::Int, &value))
    }

    pub fn read_double(&self, key: &PersistentDataKey) -> Result<f64, DataError> {
        let value = self.read(key)?;
        value.as_double().ok_or_else(|| mismatch(key, KeyType::Double, &value))
    }

    pub fn read_bool(&self, key: &PersistentDataKey) -> Result<bool, DataError> {
        let value = self.read(key)?;
        value.as_bool().ok_or_else(|| mismatch(key, KeyType::Boolean, &value))
    }

    pub fn read_string(&self, key: &PersistentDataKey) -> Result<String, DataError> {
        let value = self.read(key)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(key, KeyType::String, &value))
    }

    pub fn read_string_list(&self, key: &PersistentDataKey) -> Result<Vec<String>, DataError> {
        let value = self.read(key)?;
        value
            .as_string_list()
            .map(<[String]>::to_vec)
            .ok_or_else(|| mismatch(key, KeyType::StringList, &value))
    }
}

fn mismatch(key: &PersistentDataKey, expected: KeyType, found: &PersistentValue) -> DataError {
    DataError::TypeMismatch {
        key: key.id().to_string(),
        expected: expected.name(),
        found: found.key_type().name(),
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("backend", &self.handler.handler_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SledDataHandler;

    fn handler() -> (tempfile::TempDir, Arc<dyn DataHandler>) {
        let tmp = tempfile::tempdir().unwrap();
        let handler = SledDataHandler::new(tmp.path().join("sled"));
        handler.initialize().unwrap();
        (tmp, Arc::new(handler))
    }

    #[test]
    fn absent_value_reads_as_default_and_is_cached() {
        let (_tmp, handler) = handler();
        let key = PersistentDataKey::player("a:level", 1i64).unwrap();
        let profile = Profile::new(Uuid::new_v4(), handler);
        assert_eq!(profile.cached(&key), None);
        assert_eq!(profile.read_int(&key).unwrap(), 1);
        assert_eq!(profile.cached(&key), Some(PersistentValue::Int(1)));
    }

    #[test]
    fn writes_stay_in_memory() {
        let (_tmp, handler) = handler();
        let key = PersistentDataKey::player("a:level", 1i64).unwrap();
        let id = Uuid::new_v4();
        let profile = Profile::new(id, handler.clone());
        profile.write(&key, 7i64).unwrap();
        assert_eq!(profile.read_int(&key).unwrap(), 7);
        assert_eq!(handler.read(id, &key).unwrap(), None);
    }

    #[test]
    fn wrong_type_write_is_rejected() {
        let (_tmp, handler) = handler();
        let key = PersistentDataKey::player("a:level", 1i64).unwrap();
        let profile = Profile::new(Uuid::new_v4(), handler);
        assert!(matches!(
            profile.write(&key, "seven"),
            Err(DataError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn cross_scope_write_is_allowed() {
        let (_tmp, handler) = handler();
        let server_key = PersistentDataKey::server("a:motd", "hi").unwrap();
        let profile = Profile::new(Uuid::new_v4(), handler);
        assert_eq!(profile.kind(), ProfileKind::Player);
        profile.write(&server_key, "player-side").unwrap();
        assert_eq!(profile.read_string(&server_key).unwrap(), "player-side");
    }
}
