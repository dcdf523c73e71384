//! Typed persistent keys and the values stored under them.
//!
//! A key is identified by a namespaced id such as `quests:completed`. Ids never
//! contain `.` so they can be embedded in dotted config paths.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::Value;
use crate::errors::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    String,
    Int,
    Double,
    Boolean,
    StringList,
}

impl KeyType {
    pub const ALL: [KeyType; 5] = [
        KeyType::String,
        KeyType::Int,
        KeyType::Double,
        KeyType::Boolean,
        KeyType::StringList,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KeyType::String => "STRING",
            KeyType::Int => "INT",
            KeyType::Double => "DOUBLE",
            KeyType::Boolean => "BOOLEAN",
            KeyType::StringList => "STRING_LIST",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Zero value of this type, used when a key is declared without a default.
    pub fn zero(self) -> PersistentValue {
        match self {
            KeyType::String => PersistentValue::String(String::new()),
            KeyType::Int => PersistentValue::Int(0),
            KeyType::Double => PersistentValue::Double(0.0),
            KeyType::Boolean => PersistentValue::Boolean(false),
            KeyType::StringList => PersistentValue::StringList(Vec::new()),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersistentValue {
    String(String),
    Int(i64),
    Double(f64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl PersistentValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            PersistentValue::String(_) => KeyType::String,
            PersistentValue::Int(_) => KeyType::Int,
            PersistentValue::Double(_) => KeyType::Double,
            PersistentValue::Boolean(_) => KeyType::Boolean,
            PersistentValue::StringList(_) => KeyType::StringList,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PersistentValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PersistentValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PersistentValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PersistentValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            PersistentValue::StringList(list) => Some(list),
            _ => None,
        }
    }

    /// Parse user-supplied text as a value of `kind`. Lists are comma-separated.
    pub fn parse_as(kind: KeyType, text: &str) -> Option<Self> {
        match kind {
            KeyType::String => Some(PersistentValue::String(text.to_string())),
            KeyType::Int => text.trim().parse().ok().map(PersistentValue::Int),
            KeyType::Double => text.trim().parse().ok().map(PersistentValue::Double),
            KeyType::Boolean => text.trim().parse().ok().map(PersistentValue::Boolean),
            KeyType::StringList => Some(PersistentValue::StringList(
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        }
    }

    pub fn to_config_value(&self) -> Value {
        match self {
            PersistentValue::String(s) => Value::String(s.clone()),
            PersistentValue::Int(i) => Value::Int(*i),
            PersistentValue::Double(d) => Value::Double(*d),
            PersistentValue::Boolean(b) => Value::Bool(*b),
            PersistentValue::StringList(list) => {
                Value::List(list.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Narrow a config value to `kind`. Integers widen to doubles; nothing
    /// else converts.
    pub fn from_config_value(kind: KeyType, value: &Value) -> Option<Self> {
        match (kind, value) {
            (KeyType::String, Value::String(s)) => Some(PersistentValue::String(s.clone())),
            (KeyType::Int, Value::Int(i)) => Some(PersistentValue::Int(*i)),
            (KeyType::Double, Value::Double(d)) => Some(PersistentValue::Double(*d)),
            (KeyType::Double, Value::Int(i)) => Some(PersistentValue::Double(*i as f64)),
            (KeyType::Boolean, Value::Bool(b)) => Some(PersistentValue::Boolean(*b)),
            (KeyType::StringList, Value::List(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(PersistentValue::StringList),
            _ => None,
        }
    }
}

impl fmt::Display for PersistentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistentValue::String(s) => f.write_str(s),
            PersistentValue::Int(i) => write!(f, "{}", i),
            PersistentValue::Double(d) => write!(f, "{}", d),
            PersistentValue::Boolean(b) => write!(f, "{}", b),
            PersistentValue::StringList(list) => write!(f, "[{}]", list.join(", ")),
        }
    }
}

impl From<&str> for PersistentValue {
    fn from(s: &str) -> Self {
        PersistentValue::String(s.to_string())
    }
}

impl From<String> for PersistentValue {
    fn from(s: String) -> Self {
        PersistentValue::String(s)
    }
}

impl From<i64> for PersistentValue {
    fn from(i: i64) -> Self {
        PersistentValue::Int(i)
    }
}

impl From<f64> for PersistentValue {
    fn from(d: f64) -> Self {
        PersistentValue::Double(d)
    }
}

impl From<bool> for PersistentValue {
    fn from(b: bool) -> Self {
        PersistentValue::Boolean(b)
    }
}

impl From<Vec<String>> for PersistentValue {
    fn from(list: Vec<String>) -> Self {
        PersistentValue::StringList(list)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyScope {
    Player,
    Server,
}

/// A named, typed unit of persisted profile data.
///
/// Equality and hashing use the id only.
#[derive(Debug, Clone)]
pub struct PersistentDataKey {
    id: String,
    default: PersistentValue,
    scope: KeyScope,
}

impl PersistentDataKey {
    pub fn new(
        id: impl Into<String>,
        default: impl Into<PersistentValue>,
        scope: KeyScope,
    ) -> Result<Self, DataError> {
        let id = id.into();
        validate_key_id(&id)?;
        let key = Self {
            id,
            default: default.into(),
            scope,
        };
        key.check(&key.default)?;
        Ok(key)
    }

    pub fn player(id: impl Into<String>, default: impl Into<PersistentValue>) -> Result<Self, DataError> {
        Self::new(id, default, KeyScope::Player)
    }

    pub fn server(id: impl Into<String>, default: impl Into<PersistentValue>) -> Result<Self, DataError> {
        Self::new(id, default, KeyScope::Server)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key_type(&self) -> KeyType {
        self.default.key_type()
    }

    pub fn default_value(&self) -> &PersistentValue {
        &self.default
    }

    pub fn scope(&self) -> KeyScope {
        self.scope
    }

    /// Fail unless `value` has this key's type and can be stored by every
    /// backend.
    pub fn check(&self, value: &PersistentValue) -> Result<(), DataError> {
        if value.key_type() != self.key_type() {
            return Err(DataError::TypeMismatch {
                key: self.id.clone(),
                expected: self.key_type().name(),
                found: value.key_type().name(),
            });
        }
        match value {
            PersistentValue::Double(d) if !d.is_finite() => Err(DataError::NonFiniteDouble {
                key: self.id.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// `namespace:name;TYPE;<json default>`
    pub fn to_token(&self) -> String {
        let default = serde_json::to_string(&self.default.to_config_value().to_json())
            .unwrap_or_default();
        format!("{};{};{}", self.id, self.key_type().name(), default)
    }

    /// Inverse of [`to_token`](Self::to_token). Malformed tokens yield `None`.
    pub fn from_token(token: &str, scope: KeyScope) -> Option<Self> {
        let mut parts = token.splitn(3, ';');
        let id = parts.next()?;
        let kind = KeyType::from_name(parts.next()?)?;
        let default = match parts.next() {
            Some(raw) if !raw.is_empty() => {
                let json: serde_json::Value = serde_json::from_str(raw).ok()?;
                PersistentValue::from_config_value(kind, &Value::from(json))?
            }
            _ => kind.zero(),
        };
        Self::new(id, default, scope).ok()
    }
}

impl PartialEq for PersistentDataKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PersistentDataKey {}

impl Hash for PersistentDataKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PersistentDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn validate_key_id(id: &str) -> Result<(), DataError> {
    let Some((namespace, name)) = id.split_once(':') else {
        return Err(DataError::InvalidKey(format!("'{}' is missing a namespace", id)));
    };
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '/'))
    };
    if !valid(namespace) || !valid(name) {
        return Err(DataError::InvalidKey(format!(
            "'{}' must be lowercase namespace:name using [a-z0-9_-/]",
            id
        )));
    }
    Ok(())
}

/// The set of keys known to a running instance.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: RwLock<BTreeMap<String, PersistentDataKey>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key`. The first registration of an id wins; the registered
    /// key is returned either way.
    pub fn register(&self, key: PersistentDataKey) -> PersistentDataKey {
        let mut keys = match self.keys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        keys.entry(key.id.clone()).or_insert(key).clone()
    }

    /// Register every token that parses; malformed entries are logged and skipped.
    pub fn register_tokens<'a>(&self, tokens: impl IntoIterator<Item = &'a str>, scope: KeyScope) -> usize {
        let mut count = 0;
        for token in tokens {
            match PersistentDataKey::from_token(token, scope) {
                Some(key) => {
                    self.register(key);
                    count += 1;
                }
                None => warn!("Skipping malformed {:?} key entry '{}'", scope, token),
            }
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<PersistentDataKey> {
        match self.keys.read() {
            Ok(guard) => guard.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    pub fn all(&self) -> Vec<PersistentDataKey> {
        self.snapshot().into_values().collect()
    }

    pub fn player_keys(&self) -> Vec<PersistentDataKey> {
        self.scoped(KeyScope::Player)
    }

    pub fn server_keys(&self) -> Vec<PersistentDataKey> {
        self.scoped(KeyScope::Server)
    }

    pub fn len(&self) -> usize {
        match self.keys.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scoped(&self, scope: KeyScope) -> Vec<PersistentDataKey> {
        self.all().into_iter().filter(|k| k.scope == scope).collect()
    }

    fn snapshot(&self) -> BTreeMap<String, PersistentDataKey> {
        match self.keys.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_type_and_default() {
        let key = PersistentDataKey::player("skills:mana", 12.5).unwrap();
        let token = key.to_token();
        assert_eq!(token, "skills:mana;DOUBLE;12.5");
        let parsed = PersistentDataKey::from_token(&token, KeyScope::Player).unwrap();
        assert_eq!(parsed.key_type(), KeyType::Double);
        assert_eq!(parsed.default_value(), &PersistentValue::Double(12.5));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(PersistentDataKey::from_token("nonamespace;INT;0", KeyScope::Player).is_none());
        assert!(PersistentDataKey::from_token("a:b;FLOAT;0", KeyScope::Player).is_none());
        assert!(PersistentDataKey::from_token("a:b;INT;\"x\"", KeyScope::Player).is_none());
        assert!(PersistentDataKey::from_token("", KeyScope::Player).is_none());
    }

    #[test]
    fn token_without_default_uses_zero() {
        let key = PersistentDataKey::from_token("a:list;STRING_LIST", KeyScope::Server).unwrap();
        assert_eq!(key.default_value(), &PersistentValue::StringList(vec![]));
        assert_eq!(key.scope(), KeyScope::Server);
    }

    #[test]
    fn dotted_ids_are_invalid() {
        assert!(PersistentDataKey::player("eco:a.b", 0i64).is_err());
        assert!(PersistentDataKey::player("Eco:upper", 0i64).is_err());
        assert!(PersistentDataKey::player("eco:path/ok-1_x", 0i64).is_ok());
    }

    #[test]
    fn registry_first_registration_wins() {
        let registry = KeyRegistry::new();
        registry.register(PersistentDataKey::player("a:x", 1i64).unwrap());
        let kept = registry.register(PersistentDataKey::server("a:x", "s").unwrap());
        assert_eq!(kept.key_type(), KeyType::Int);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.player_keys().len(), 1);
        assert!(registry.server_keys().is_empty());
    }

    #[test]
    fn check_reports_type_mismatch() {
        let key = PersistentDataKey::player("a:x", 1i64).unwrap();
        let err = key.check(&PersistentValue::Boolean(true)).unwrap_err();
        assert!(matches!(err, DataError::TypeMismatch { expected: "INT", found: "BOOLEAN", .. }));
    }

    #[test]
    fn non_finite_doubles_are_refused() {
        assert!(matches!(
            PersistentDataKey::player("a:nan", f64::NAN),
            Err(DataError::NonFiniteDouble { .. })
        ));
        let key = PersistentDataKey::player("a:ratio", 0.0).unwrap();
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            assert!(matches!(
                key.check(&PersistentValue::Double(bad)),
                Err(DataError::NonFiniteDouble { .. })
            ));
        }
        assert!(key.check(&PersistentValue::Double(-0.5)).is_ok());
    }
}
