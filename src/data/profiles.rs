use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info};
use uuid::Uuid;

use super::keys::{KeyRegistry, KeyScope, PersistentDataKey};
use super::migration::{
    EntityRegistry, InitOutcome, MigrationState, PLAYER_KEYS_PATH, SERVER_KEYS_PATH,
};
use super::profile::Profile;
use super::{create_handler, DataHandler, HandlerType, SERVER_PROFILE_ID};
use crate::config::{ConfigFile, ConfigNode, ConfigType, StorageConfig};
use crate::errors::DataError;

/// Owns the active data handler and the single live [`Profile`] per entity.
pub struct ProfileHandler {
    pub(super) settings: StorageConfig,
    pub(super) handler: Arc<dyn DataHandler>,
    pub(super) keys: KeyRegistry,
    pub(super) manifest: Mutex<ConfigFile>,
    pub(super) state: Mutex<MigrationState>,
    loaded: RwLock<HashMap<Uuid, Arc<Profile>>>,
}

impl ProfileHandler {
    /// Build a handler for the backend named in `settings`. Nothing is opened
    /// until [`initialize`](Self::initialize).
    pub fn new(settings: StorageConfig) -> Result<Self, DataError> {
        let handler = create_handler(settings.handler, &settings);
        Self::with_handler(settings, handler)
    }

    /// Use an already constructed backend. Its type is recorded in the
    /// manifest in place of `settings.handler`.
    pub fn with_handler(settings: StorageConfig, handler: Arc<dyn DataHandler>) -> Result<Self, DataError> {
        let manifest = ConfigFile::load_or_empty(settings.manifest_path(), ConfigType::Json)?;
        Ok(Self {
            settings,
            handler,
            keys: KeyRegistry::new(),
            manifest: Mutex::new(manifest),
            state: Mutex::new(MigrationState::NotMigrating),
            loaded: RwLock::new(HashMap::new()),
        })
    }

    pub fn handler_type(&self) -> HandlerType {
        self.handler.handler_type()
    }

    pub fn handler(&self) -> Arc<dyn DataHandler> {
        self.handler.clone()
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    pub fn settings(&self) -> &StorageConfig {
        &self.settings
    }

    pub fn migration_state(&self) -> MigrationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the manifest tree.
    pub fn manifest(&self) -> ConfigNode {
        let manifest = self.manifest.lock().unwrap_or_else(PoisonError::into_inner);
        (**manifest).clone()
    }

    /// Register keys recorded in the manifest, open the backend, then move data
    /// over from a previous backend if migration is enabled and the backend
    /// changed.
    pub fn initialize(&self, registry: &dyn EntityRegistry) -> Result<InitOutcome, DataError> {
        {
            let manifest = self.manifest.lock()?;
            for (path, scope) in [(PLAYER_KEYS_PATH, KeyScope::Player), (SERVER_KEYS_PATH, KeyScope::Server)] {
                let tokens = manifest.get_strings(path).unwrap_or_default();
                let count = self
                    .keys
                    .register_tokens(tokens.iter().map(String::as_str), scope);
                debug!("Registered {} {:?} keys from manifest", count, scope);
            }
        }

        self.handler.initialize()?;
        info!("Initialized {} data handler", self.handler_type());

        self.migrate_if_needed(registry)
    }

    /// Cached profile for `id`, created on first use.
    pub fn load(&self, id: Uuid) -> Arc<Profile> {
        if let Some(profile) = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return profile.clone();
        }

        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        loaded
            .entry(id)
            .or_insert_with(|| Arc::new(Profile::new(id, self.handler.clone())))
            .clone()
    }

    pub fn load_server_profile(&self) -> Arc<Profile> {
        self.load(SERVER_PROFILE_ID)
    }

    pub fn is_loaded(&self, id: Uuid) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Write the in-memory values of `keys` for `id` through the data handler.
    ///
    /// Only values the profile has cached are written; keys never read or
    /// written in this session already match storage. Nothing happens when
    /// the profile is not loaded.
    pub fn save_keys_for(&self, id: Uuid, keys: &[PersistentDataKey]) -> Result<(), DataError> {
        let profile = match self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            Some(profile) => profile.clone(),
            None => return Ok(()),
        };

        for key in keys {
            if let Some(value) = profile.cached(key) {
                self.handler.write(id, key, &value)?;
            }
        }
        Ok(())
    }

    /// Drop the cached profile. Returns whether one was loaded.
    pub fn unload(&self, id: Uuid) -> bool {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Record the known keys in the manifest and flush the data handler.
    pub fn save(&self) -> Result<(), DataError> {
        {
            let mut manifest = self.manifest.lock()?;
            let tokens = |keys: Vec<PersistentDataKey>| -> Vec<String> {
                keys.iter().map(PersistentDataKey::to_token).collect()
            };
            manifest.set(PLAYER_KEYS_PATH, tokens(self.keys.player_keys()));
            manifest.set(SERVER_KEYS_PATH, tokens(self.keys.server_keys()));
            manifest.save()?;
        }
        self.handler.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(tmp: &tempfile::TempDir) -> ProfileHandler {
        let settings = StorageConfig::new(tmp.path(), HandlerType::Sled);
        let profiles = ProfileHandler::new(settings).unwrap();
        profiles.initialize(&Vec::<Uuid>::new()).unwrap();
        profiles
    }

    #[test]
    fn load_is_memoized_until_unload() {
        let tmp = tempfile::tempdir().unwrap();
        let profiles = handler(&tmp);
        let id = Uuid::new_v4();
        let a = profiles.load(id);
        let b = profiles.load(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(profiles.unload(id));
        assert!(!profiles.unload(id));
        let c = profiles.load(id);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn save_keys_for_unloaded_profile_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let profiles = handler(&tmp);
        let key = profiles.keys().register(PersistentDataKey::player("a:b", 2i64).unwrap());
        let id = Uuid::new_v4();
        profiles.save_keys_for(id, &[key.clone()]).unwrap();
        assert!(!profiles.is_loaded(id));
        assert_eq!(profiles.handler().read(id, &key).unwrap(), None);
    }

    #[test]
    fn server_profile_uses_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let profiles = handler(&tmp);
        let server = profiles.load_server_profile();
        assert_eq!(server.id(), SERVER_PROFILE_ID);
        assert!(Arc::ptr_eq(&server, &profiles.load(SERVER_PROFILE_ID)));
    }
}
