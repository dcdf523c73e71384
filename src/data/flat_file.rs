//! Flat-file backend: every value lives in one JSON config tree at
//! `<player|server>.<uuid>.<key id>`. Writes stay in memory until `save`.

use std::path::PathBuf;
use std::sync::Mutex;

use log::info;
use uuid::Uuid;

use super::keys::{PersistentDataKey, PersistentValue};
use super::{DataHandler, HandlerType, SERVER_PROFILE_ID};
use crate::config::{ConfigFile, ConfigType, Value};
use crate::errors::DataError;

pub struct FlatFileDataHandler {
    path: PathBuf,
    file: Mutex<Option<ConfigFile>>,
}

impl FlatFileDataHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    fn value_path(id: Uuid, key: &PersistentDataKey) -> String {
        let section = if id == SERVER_PROFILE_ID { "server" } else { "player" };
        format!("{}.{}.{}", section, id, key.id())
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut ConfigFile) -> Result<T, DataError>) -> Result<T, DataError> {
        let mut guard = self.file.lock()?;
        match guard.as_mut() {
            Some(file) => f(file),
            None => Err(DataError::NotInitialized(HandlerType::Json)),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Int(_) => "INT",
        Value::Double(_) => "DOUBLE",
        Value::String(_) => "STRING",
        Value::List(_) => "LIST",
        Value::Map(_) => "SECTION",
    }
}

impl DataHandler for FlatFileDataHandler {
    fn handler_type(&self) -> HandlerType {
        HandlerType::Json
    }

    fn initialize(&self) -> Result<(), DataError> {
        let mut guard = self.file.lock()?;
        if guard.is_none() {
            let file = ConfigFile::load_or_empty(&self.path, ConfigType::Json)?;
            info!("Loaded flat-file profile data from {}", self.path.display());
            *guard = Some(file);
        }
        Ok(())
    }

    fn write(&self, id: Uuid, key: &PersistentDataKey, value: &PersistentValue) -> Result<(), DataError> {
        key.check(value)?;
        let path = Self::value_path(id, key);
        self.with_file(|file| {
            file.set(&path, value.to_config_value());
            Ok(())
        })
    }

    fn read(&self, id: Uuid, key: &PersistentDataKey) -> Result<Option<PersistentValue>, DataError> {
        let path = Self::value_path(id, key);
        self.with_file(|file| {
            let Some(raw) = file.get_raw(&path) else {
                return Ok(None);
            };
            PersistentValue::from_config_value(key.key_type(), raw)
                .map(Some)
                .ok_or_else(|| DataError::TypeMismatch {
                    key: key.id().to_string(),
                    expected: key.key_type().name(),
                    found: value_kind(raw),
                })
        })
    }

    fn save(&self) -> Result<(), DataError> {
        self.with_file(|file| file.save())
    }

    fn entity_ids(&self) -> Result<Vec<Uuid>, DataError> {
        self.with_file(|file| {
            let mut ids: Vec<Uuid> = ["player", "server"]
                .iter()
                .flat_map(|section| file.get_subsection(section).get_keys(false))
                .filter_map(|raw| Uuid::parse_str(&raw).ok())
                .collect();
            ids.sort();
            ids.dedup();
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_nest_under_entity_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("profiles.json");
        let handler = FlatFileDataHandler::new(&path);
        handler.initialize().unwrap();

        let key = PersistentDataKey::player("shop:coins", 0i64).unwrap();
        let player = Uuid::new_v4();
        handler.write(player, &key, &PersistentValue::Int(9)).unwrap();
        handler.write(SERVER_PROFILE_ID, &key, &PersistentValue::Int(1)).unwrap();
        handler.save().unwrap();

        let file = ConfigFile::load_or_empty(&path, ConfigType::Json).unwrap();
        assert_eq!(file.get_int(&format!("player.{}.shop:coins", player)), Some(9));
        assert_eq!(file.get_int(&format!("server.{}.shop:coins", SERVER_PROFILE_ID)), Some(1));
    }

    #[test]
    fn unsaved_writes_are_not_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("profiles.json");
        let handler = FlatFileDataHandler::new(&path);
        handler.initialize().unwrap();
        let key = PersistentDataKey::player("a:b", "x").unwrap();
        handler.write(Uuid::new_v4(), &key, &"y".into()).unwrap();
        assert!(!path.exists());
    }
}
