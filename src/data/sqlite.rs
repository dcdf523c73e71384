//! SQLite backend for profile data.
//!
//! One row per (entity, key) with the value JSON-encoded. Every write is an
//! upsert and durable immediately, so `save` has nothing to flush.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::keys::{PersistentDataKey, PersistentValue};
use super::{DataHandler, HandlerType};
use crate::errors::DataError;

/// Uses a Mutex for thread-safety since rusqlite Connection is not Sync.
pub struct SqliteDataHandler {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteDataHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, DataError>) -> Result<T, DataError> {
        let guard = self.conn.lock()?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(DataError::NotInitialized(HandlerType::Sqlite)),
        }
    }
}

impl DataHandler for SqliteDataHandler {
    fn handler_type(&self) -> HandlerType {
        HandlerType::Sqlite
    }

    fn initialize(&self) -> Result<(), DataError> {
        let mut guard = self.conn.lock()?;
        if guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = Path::new(&self.path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&self.path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS profile_data (
                entity TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (entity, key)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_profile_data_entity ON profile_data(entity)",
            [],
        )?;

        info!("Opened SQLite profile store at {}", self.path.display());
        *guard = Some(conn);
        Ok(())
    }

    fn write(&self, id: Uuid, key: &PersistentDataKey, value: &PersistentValue) -> Result<(), DataError> {
        key.check(value)?;
        let encoded = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profile_data (entity, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(entity, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP",
                params![id.to_string(), key.id(), encoded],
            )?;
            Ok(())
        })
    }

    fn read(&self, id: Uuid, key: &PersistentDataKey) -> Result<Option<PersistentValue>, DataError> {
        let stored: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM profile_data WHERE entity = ?1 AND key = ?2",
                    params![id.to_string(), key.id()],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        let Some(encoded) = stored else {
            return Ok(None);
        };
        let value: PersistentValue = serde_json::from_str(&encoded)?;
        key.check(&value)?;
        Ok(Some(value))
    }

    fn save(&self) -> Result<(), DataError> {
        self.with_conn(|_| Ok(()))
    }

    fn entity_ids(&self) -> Result<Vec<Uuid>, DataError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT entity FROM profile_data ORDER BY entity")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                if let Ok(id) = Uuid::parse_str(&row?) {
                    ids.push(id);
                }
            }
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_previous_value() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = SqliteDataHandler::new(tmp.path().join("db").join("profiles.db"));
        handler.initialize().unwrap();
        handler.initialize().unwrap();

        let key = PersistentDataKey::player("shop:tags", Vec::<String>::new()).unwrap();
        let id = Uuid::new_v4();
        handler
            .write(id, &key, &PersistentValue::StringList(vec!["a".into()]))
            .unwrap();
        handler
            .write(id, &key, &PersistentValue::StringList(vec!["b".into(), "c".into()]))
            .unwrap();

        assert_eq!(
            handler.read(id, &key).unwrap(),
            Some(PersistentValue::StringList(vec!["b".into(), "c".into()]))
        );
        assert_eq!(handler.entity_ids().unwrap(), vec![id]);
    }

    #[test]
    fn requires_initialize() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = SqliteDataHandler::new(tmp.path().join("profiles.db"));
        let key = PersistentDataKey::player("a:b", 0i64).unwrap();
        assert!(matches!(
            handler.read(Uuid::new_v4(), &key),
            Err(DataError::NotInitialized(HandlerType::Sqlite))
        ));
    }
}
