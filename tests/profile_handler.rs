mod common;

use std::sync::Arc;

use profiled::config::{ConfigFile, ConfigType};
use profiled::data::{
    HandlerType, KeyScope, MigrationState, PersistentDataKey, PersistentValue, ProfileKind,
    SERVER_PROFILE_ID,
};
use profiled::DataError;
use uuid::Uuid;

#[test]
fn load_returns_same_instance_until_unload() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Json));
    let id = Uuid::new_v4();

    let first = profiles.load(id);
    assert!(Arc::ptr_eq(&first, &profiles.load(id)));
    assert!(profiles.is_loaded(id));
    assert_eq!(profiles.loaded_count(), 1);

    assert!(profiles.unload(id));
    assert!(!profiles.is_loaded(id));
    let second = profiles.load(id);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn concurrent_loads_share_one_profile() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Sqlite));
    let id = Uuid::new_v4();

    let shared = &profiles;
    let loaded: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(move || shared.load(id))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(loaded.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(profiles.loaded_count(), 1);
}

#[test]
fn server_profile_is_keyed_by_sentinel() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Json));
    let server = profiles.load_server_profile();
    assert_eq!(server.id(), SERVER_PROFILE_ID);
    assert_eq!(server.kind(), ProfileKind::Server);
    assert_eq!(profiles.load(Uuid::new_v4()).kind(), ProfileKind::Player);
}

#[test]
fn save_keys_for_persists_exactly_the_given_keys() {
    for kind in HandlerType::ALL {
        let tmp = tempfile::tempdir().unwrap();
        let profiles = common::ready_profiles(common::storage(&tmp, kind));
        let coins = profiles.keys().register(PersistentDataKey::player("shop:coins", 0i64).unwrap());
        let nick = profiles.keys().register(PersistentDataKey::player("shop:nick", "").unwrap());
        let id = Uuid::new_v4();

        let profile = profiles.load(id);
        profile.write(&coins, 500i64).unwrap();
        profile.write(&nick, "dirty").unwrap();
        profiles.save_keys_for(id, &[coins.clone()]).unwrap();

        let handler = profiles.handler();
        assert_eq!(handler.read(id, &coins).unwrap(), Some(PersistentValue::Int(500)), "{}", kind);
        assert_eq!(handler.read(id, &nick).unwrap(), None, "{}", kind);
    }
}

#[test]
fn unloaded_profile_rereads_persisted_values() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Sqlite));
    let level = profiles.keys().register(PersistentDataKey::player("stats:level", 1i64).unwrap());
    let id = Uuid::new_v4();

    profiles.load(id).write(&level, 12i64).unwrap();
    profiles.save_keys_for(id, &[level.clone()]).unwrap();
    profiles.unload(id);
    assert_eq!(profiles.load(id).read_int(&level).unwrap(), 12);

    // Unsaved writes are lost with the profile.
    profiles.load(id).write(&level, 40i64).unwrap();
    profiles.unload(id);
    assert_eq!(profiles.load(id).read_int(&level).unwrap(), 12);
}

#[test]
fn reads_fall_back_to_key_default() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Json));
    let keys = common::sample_keys();
    let profile = profiles.load(Uuid::new_v4());
    for key in &keys {
        assert_eq!(&profile.read(key).unwrap(), key.default_value());
    }
    assert_eq!(profile.read_string_list(&keys[4]).unwrap(), Vec::<String>::new());
    assert!(!profile.read_bool(&keys[3]).unwrap());
}

#[test]
fn typed_write_rejects_wrong_kind() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Json));
    let ratio = PersistentDataKey::player("stats:ratio", 1.0f64).unwrap();
    let profile = profiles.load(Uuid::new_v4());
    assert!(matches!(
        profile.write(&ratio, 3i64),
        Err(DataError::TypeMismatch { .. })
    ));
    assert!(matches!(
        profile.read_int(&ratio),
        Err(DataError::TypeMismatch { .. })
    ));
}

#[test]
fn non_finite_double_write_leaves_cache_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = common::ready_profiles(common::storage(&tmp, HandlerType::Sqlite));
    let ratio = profiles.keys().register(PersistentDataKey::player("stats:ratio", 1.0f64).unwrap());
    let id = Uuid::new_v4();
    let profile = profiles.load(id);

    assert!(matches!(
        profile.write(&ratio, f64::INFINITY),
        Err(DataError::NonFiniteDouble { .. })
    ));
    assert_eq!(profile.cached(&ratio), None);
    profiles.save_keys_for(id, &[ratio.clone()]).unwrap();
    assert_eq!(profiles.handler().read(id, &ratio).unwrap(), None);
    assert_eq!(profile.read_double(&ratio).unwrap(), 1.0);
}

#[test]
fn save_records_known_keys_in_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = common::storage(&tmp, HandlerType::Json);
    {
        let profiles = common::ready_profiles(settings.clone());
        profiles.keys().register(PersistentDataKey::player("shop:coins", 10i64).unwrap());
        profiles.keys().register(PersistentDataKey::server("world:motd", "hello").unwrap());
        profiles.save().unwrap();
    }

    let manifest = ConfigFile::load_or_empty(settings.manifest_path(), ConfigType::Json).unwrap();
    assert_eq!(
        manifest.get_strings("categorized-keys.player"),
        Some(vec!["shop:coins;INT;10".to_string()])
    );
    assert_eq!(
        manifest.get_strings("categorized-keys.server"),
        Some(vec!["world:motd;STRING;\"hello\"".to_string()])
    );

    let reopened = common::ready_profiles(settings);
    let coins = reopened.keys().get("shop:coins").expect("registered from manifest");
    assert_eq!(coins.scope(), KeyScope::Player);
    assert_eq!(coins.default_value(), &PersistentValue::Int(10));
    assert_eq!(reopened.keys().server_keys().len(), 1);
}

#[test]
fn malformed_manifest_tokens_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = common::storage(&tmp, HandlerType::Json);
    let mut manifest = ConfigFile::load_or_empty(settings.manifest_path(), ConfigType::Json).unwrap();
    manifest.set(
        "categorized-keys.player",
        vec!["shop:coins;INT;5", "no-namespace;INT;1", "a:b;NOPE;1", "a:c;INT;\"x\""],
    );
    manifest.save().unwrap();

    let profiles = common::ready_profiles(settings);
    assert_eq!(profiles.keys().len(), 1);
    assert!(profiles.keys().get("shop:coins").is_some());
}

#[test]
fn disabled_migration_leaves_manifest_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = common::storage(&tmp, HandlerType::Json);
    let profiles = common::ready_profiles(settings.clone());
    assert_eq!(profiles.migration_state(), MigrationState::NotMigrating);
    assert!(!settings.manifest_path().exists());
    assert!(profiles.manifest().get_string("previous-handler").is_none());
}
