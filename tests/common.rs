//! Test utilities & fixtures shared by the integration tests.

use profiled::config::StorageConfig;
use profiled::data::{HandlerType, PersistentDataKey, ProfileHandler};
use uuid::Uuid;

/// Storage settings rooted in a fresh temp dir.
pub fn storage(tmp: &tempfile::TempDir, handler: HandlerType) -> StorageConfig {
    StorageConfig::new(tmp.path(), handler)
}

/// Profile handler that has been initialized against an empty entity registry.
#[allow(dead_code)]
pub fn ready_profiles(settings: StorageConfig) -> ProfileHandler {
    let profiles = ProfileHandler::new(settings).expect("profile handler");
    let outcome = profiles.initialize(&Vec::<Uuid>::new()).expect("initialize");
    assert!(!outcome.restart_requested(), "unexpected migration on fresh store");
    profiles
}

/// One key per value type, all player-scoped.
#[allow(dead_code)]
pub fn sample_keys() -> Vec<PersistentDataKey> {
    vec![
        PersistentDataKey::player("shop:coins", 0i64).unwrap(),
        PersistentDataKey::player("shop:nick", "").unwrap(),
        PersistentDataKey::player("stats:ratio", 1.0f64).unwrap(),
        PersistentDataKey::player("stats:verified", false).unwrap(),
        PersistentDataKey::player("quests:completed", Vec::<String>::new()).unwrap(),
    ]
}
