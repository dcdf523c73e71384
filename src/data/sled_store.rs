//! Document backend: one bincode document per entity in a sled tree.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};
use sled::IVec;
use uuid::Uuid;

use super::keys::{PersistentDataKey, PersistentValue};
use super::{DataHandler, HandlerType};
use crate::errors::DataError;

const TREE_PROFILES: &str = "profiles";
const DOCUMENT_PREFIX: &str = "profiles:";

pub const PROFILE_DOCUMENT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfileDocument {
    schema_version: u8,
    values: BTreeMap<String, PersistentValue>,
}

struct SledState {
    db: sled::Db,
    profiles: sled::Tree,
}

/// Sled-backed persistence for profile documents.
pub struct SledDataHandler {
    path: PathBuf,
    // Held across read-modify-write so concurrent writes to one document do
    // not drop each other's keys.
    state: Mutex<Option<SledState>>,
}

impl SledDataHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    fn document_key(id: Uuid) -> Vec<u8> {
        format!("{}{}", DOCUMENT_PREFIX, id).into_bytes()
    }

    fn decode(bytes: IVec) -> Result<ProfileDocument, DataError> {
        let doc: ProfileDocument = bincode::deserialize(&bytes)?;
        if doc.schema_version != PROFILE_DOCUMENT_SCHEMA_VERSION {
            return Err(DataError::SchemaMismatch {
                entity: "profile document",
                expected: PROFILE_DOCUMENT_SCHEMA_VERSION,
                found: doc.schema_version,
            });
        }
        Ok(doc)
    }

    fn with_state<T>(&self, f: impl FnOnce(&SledState) -> Result<T, DataError>) -> Result<T, DataError> {
        let guard = self.state.lock()?;
        match guard.as_ref() {
            Some(state) => f(state),
            None => Err(DataError::NotInitialized(HandlerType::Sled)),
        }
    }
}

impl DataHandler for SledDataHandler {
    fn handler_type(&self) -> HandlerType {
        HandlerType::Sled
    }

    fn initialize(&self) -> Result<(), DataError> {
        let mut guard = self.state.lock()?;
        if guard.is_some() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.path)?;
        let db = sled::open(&self.path)?;
        let profiles = db.open_tree(TREE_PROFILES)?;
        info!("Opened sled profile store at {}", self.path.display());
        *guard = Some(SledState { db, profiles });
        Ok(())
    }

    fn write(&self, id: Uuid, key: &PersistentDataKey, value: &PersistentValue) -> Result<(), DataError> {
        key.check(value)?;
        self.with_state(|state| {
            let doc_key = Self::document_key(id);
            let mut doc = match state.profiles.get(&doc_key)? {
                Some(bytes) => Self::decode(bytes)?,
                None => ProfileDocument {
                    schema_version: PROFILE_DOCUMENT_SCHEMA_VERSION,
                    values: BTreeMap::new(),
                },
            };
            doc.values.insert(key.id().to_string(), value.clone());
            state.profiles.insert(doc_key, bincode::serialize(&doc)?)?;
            Ok(())
        })
    }

    fn read(&self, id: Uuid, key: &PersistentDataKey) -> Result<Option<PersistentValue>, DataError> {
        let found = self.with_state(|state| {
            let Some(bytes) = state.profiles.get(Self::document_key(id))? else {
                return Ok(None);
            };
            Ok(Self::decode(bytes)?.values.remove(key.id()))
        })?;
        if let Some(value) = &found {
            key.check(value)?;
        }
        Ok(found)
    }

    fn save(&self) -> Result<(), DataError> {
        self.with_state(|state| {
            state.db.flush()?;
            Ok(())
        })
    }

    fn entity_ids(&self) -> Result<Vec<Uuid>, DataError> {
        self.with_state(|state| {
            let mut ids = Vec::new();
            for entry in state.profiles.scan_prefix(DOCUMENT_PREFIX.as_bytes()) {
                let (key, _) = entry?;
                let text = String::from_utf8_lossy(&key);
                if let Some(id) = text.strip_prefix(DOCUMENT_PREFIX).and_then(|s| Uuid::parse_str(s).ok()) {
                    ids.push(id);
                }
            }
            Ok(ids)
        })
    }
}
