//! Startup migration between storage backends.
//!
//! The manifest records which backend last held authoritative data under
//! `previous-handler`. When the configured backend differs and migration is
//! enabled, every known value is copied from the previous backend into the
//! active one before any traffic is served:
//!
//! 1. Migration disabled: nothing happens.
//! 2. No `previous-handler` yet: the active backend is recorded (first run).
//! 3. Same backend: nothing happens.
//! 4. Otherwise every (entity, key) present in the old backend is written to
//!    the new one, the new backend is flushed, and only then is the manifest
//!    updated. A failure part way leaves the manifest untouched so the next
//!    start repeats the whole copy; writes are overwrites so repeating is safe.
//! 5. The caller receives [`InitOutcome::RestartRequested`] and decides how
//!    to restart. Profiles created before the copy are bound to stale data.

use std::collections::BTreeSet;
use std::fmt;

use log::info;
use uuid::Uuid;

use super::profiles::ProfileHandler;
use super::{create_handler, DataHandler, HandlerType, PersistentDataKey, SERVER_PROFILE_ID};
use crate::errors::DataError;

pub const PREVIOUS_HANDLER_PATH: &str = "previous-handler";
pub const PLAYER_KEYS_PATH: &str = "categorized-keys.player";
pub const SERVER_KEYS_PATH: &str = "categorized-keys.server";

/// Source of every entity id the host knows about.
pub trait EntityRegistry {
    fn entity_ids(&self) -> Vec<Uuid>;
}

impl<const N: usize> EntityRegistry for [Uuid; N] {
    fn entity_ids(&self) -> Vec<Uuid> {
        self.to_vec()
    }
}

impl EntityRegistry for Vec<Uuid> {
    fn entity_ids(&self) -> Vec<Uuid> {
        self.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    NotMigrating,
    Checking,
    Migrating,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: HandlerType,
    pub to: HandlerType,
    pub entities: usize,
    pub values_copied: usize,
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migrated {} values for {} entities from {} to {}",
            self.values_copied, self.entities, self.from, self.to
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    /// Data moved to a new backend; the process must restart before serving.
    RestartRequested(MigrationReport),
}

impl InitOutcome {
    pub fn restart_requested(&self) -> bool {
        matches!(self, InitOutcome::RestartRequested(_))
    }
}

/// Copy every value `previous` holds for `entities` x `keys` into `current`.
/// Absent values are skipped. Returns the number of values written.
pub fn copy_all(
    previous: &dyn DataHandler,
    current: &dyn DataHandler,
    entities: &[Uuid],
    keys: &[PersistentDataKey],
) -> Result<usize, DataError> {
    let total = entities.len();
    let mut copied = 0;
    for (i, id) in entities.iter().enumerate() {
        info!("Migrating data for {}... ({} / {})", id, i + 1, total);
        for key in keys {
            if let Some(value) = previous.read(*id, key)? {
                current.write(*id, key, &value)?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

impl ProfileHandler {
    fn set_state(&self, state: MigrationState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    pub(super) fn migrate_if_needed(&self, registry: &dyn EntityRegistry) -> Result<InitOutcome, DataError> {
        if !self.settings.perform_data_migration {
            return Ok(InitOutcome::Ready);
        }

        self.set_state(MigrationState::Checking);
        let current = self.handler_type();
        let mut manifest = self.manifest.lock()?;

        let Some(recorded) = manifest.get_string(PREVIOUS_HANDLER_PATH) else {
            manifest.set(PREVIOUS_HANDLER_PATH, current.as_str());
            manifest.save()?;
            info!("Recorded {} as the current data handler", current);
            self.set_state(MigrationState::NotMigrating);
            return Ok(InitOutcome::Ready);
        };
        let previous: HandlerType = recorded.parse()?;

        if previous == current {
            self.set_state(MigrationState::NotMigrating);
            return Ok(InitOutcome::Ready);
        }

        self.set_state(MigrationState::Migrating);
        info!("Detected a change in data handler!");
        info!("Migrating data from {} to {}", previous, current);
        info!("This will take a while!");

        let old = create_handler(previous, &self.settings);
        old.initialize()?;

        let mut ids: BTreeSet<Uuid> = registry.entity_ids().into_iter().collect();
        ids.extend(old.entity_ids()?);
        ids.insert(SERVER_PROFILE_ID);
        let entities: Vec<Uuid> = ids.into_iter().collect();
        info!("Found data for {} entities!", entities.len());

        let keys = self.keys.all();
        let copied = copy_all(old.as_ref(), self.handler.as_ref(), &entities, &keys)?;
        self.handler.save()?;

        info!("Updating previous handler...");
        manifest.set(PREVIOUS_HANDLER_PATH, current.as_str());
        manifest.save()?;
        self.set_state(MigrationState::Complete);

        let report = MigrationReport {
            from: previous,
            to: current,
            entities: entities.len(),
            values_copied: copied,
        };
        info!("Done! {}", report);
        info!("Restart required before serving requests");
        Ok(InitOutcome::RestartRequested(report))
    }
}
