//! Hierarchical key-value tree with dotted-path access.
//!
//! A [`ConfigNode`] is one level of the tree. Paths such as `a.b.c` are split
//! on `.` and resolved level by level. Reads never create anything; writes
//! create missing intermediate levels as empty mappings.
//!
//! Segments are matched literally: `a..b` looks up an empty-named child of
//! `a`, and a trailing dot addresses an empty-named key.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::placeholder::{apply_placeholders, StaticPlaceholder};
use super::value::{map_to_toml, Value, ValueMap};
use crate::errors::DataError;

/// Textual encoding a tree renders to and parses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    #[default]
    Json,
    Toml,
}

impl ConfigType {
    pub fn encode(self, values: &ValueMap) -> Result<String, DataError> {
        match self {
            ConfigType::Json => Ok(serde_json::to_string_pretty(&Value::Map(values.clone()).to_json())?),
            ConfigType::Toml => Ok(toml::to_string_pretty(&map_to_toml(values))?),
        }
    }

    pub fn decode(self, text: &str) -> Result<ValueMap, DataError> {
        if text.trim().is_empty() {
            return Ok(ValueMap::new());
        }
        match self {
            ConfigType::Json => {
                let json: serde_json::Value = serde_json::from_str(text)?;
                match Value::from(json) {
                    Value::Map(map) => Ok(map),
                    _ => Err(DataError::InvalidConfig("json root must be an object".into())),
                }
            }
            ConfigType::Toml => {
                let table: toml::Table = toml::from_str(text)?;
                Ok(table.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ConfigType::Json => "json",
            ConfigType::Toml => "toml",
        }
    }
}

/// What a path resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEntry {
    /// A nested mapping, wrapped as its own node.
    Section(ConfigNode),
    /// A list of mappings, each wrapped as a node.
    Sections(Vec<ConfigNode>),
    /// Any other scalar or list.
    Value(Value),
}

#[derive(Debug, Clone)]
pub struct ConfigNode {
    kind: ConfigType,
    values: ValueMap,
    injections: Vec<StaticPlaceholder>,
    rendered: OnceLock<String>,
}

impl ConfigNode {
    pub fn new(kind: ConfigType) -> Self {
        Self::from_map(kind, ValueMap::new())
    }

    pub fn from_map(kind: ConfigType, values: ValueMap) -> Self {
        Self {
            kind,
            values,
            injections: Vec::new(),
            rendered: OnceLock::new(),
        }
    }

    /// Parse `text` with the encoder for `kind`.
    pub fn parse(kind: ConfigType, text: &str) -> Result<Self, DataError> {
        Ok(Self::from_map(kind, kind.decode(text)?))
    }

    fn section(&self, values: ValueMap) -> Self {
        Self {
            kind: self.kind,
            values,
            injections: self.injections.clone(),
            rendered: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> ConfigType {
        self.kind
    }

    /// Replace the whole backing map.
    pub fn init(&mut self, values: ValueMap) {
        self.clear_cache();
        self.values = values;
    }

    pub fn clear_cache(&mut self) {
        self.rendered = OnceLock::new();
    }

    /// Raw value at `path`. Stored nulls read as absent.
    pub fn get_raw(&self, path: &str) -> Option<&Value> {
        lookup(&self.values, path)
    }

    /// Resolve `path`. Only lists made entirely of mappings become
    /// [`ConfigEntry::Sections`]; mixed lists are plain values.
    pub fn get(&self, path: &str) -> Option<ConfigEntry> {
        let raw = self.get_raw(path)?;
        Some(match raw {
            Value::Map(map) => ConfigEntry::Section(self.section(map.clone())),
            Value::List(items) if raw.is_section_list() => ConfigEntry::Sections(
                items
                    .iter()
                    .filter_map(Value::as_map)
                    .map(|map| self.section(map.clone()))
                    .collect(),
            ),
            other => ConfigEntry::Value(other.clone()),
        })
    }

    pub fn has(&self, path: &str) -> bool {
        self.get_raw(path).is_some()
    }

    /// Write `value` at `path`, creating missing levels. Writing
    /// [`Value::Null`] removes the key.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        self.clear_cache();
        store(&mut self.values, path, normalize(value.into()));
    }

    /// Top-level keys, or with `deep` every dotted path that names a value or
    /// a nested mapping.
    pub fn get_keys(&self, deep: bool) -> Vec<String> {
        if !deep {
            return self.values.keys().cloned().collect();
        }
        let mut keys = Vec::new();
        collect_keys(&self.values, "", &mut keys);
        keys
    }

    pub fn get_subsection(&self, path: &str) -> ConfigNode {
        self.get_subsection_or_none(path)
            .unwrap_or_else(|| self.section(ValueMap::new()))
    }

    pub fn get_subsection_or_none(&self, path: &str) -> Option<ConfigNode> {
        match self.get(path)? {
            ConfigEntry::Section(node) => Some(node),
            _ => None,
        }
    }

    /// Lists of mappings. An empty list yields an empty vector.
    pub fn get_subsections(&self, path: &str) -> Option<Vec<ConfigNode>> {
        match self.get(path)? {
            ConfigEntry::Sections(nodes) => Some(nodes),
            ConfigEntry::Value(Value::List(items)) if items.is_empty() => Some(Vec::new()),
            _ => None,
        }
    }

    pub fn get_int(&self, path: &str) -> Option<i32> {
        self.get_raw(path)?.as_int()
    }

    pub fn get_ints(&self, path: &str) -> Option<Vec<i32>> {
        self.list_of(path, Value::as_int)
    }

    pub fn get_long(&self, path: &str) -> Option<i64> {
        self.get_raw(path)?.as_long()
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_raw(path)?.as_bool()
    }

    pub fn get_bools(&self, path: &str) -> Option<Vec<bool>> {
        self.list_of(path, Value::as_bool)
    }

    pub fn get_double(&self, path: &str) -> Option<f64> {
        self.get_raw(path)?.as_double()
    }

    pub fn get_doubles(&self, path: &str) -> Option<Vec<f64>> {
        self.list_of(path, Value::as_double)
    }

    /// Scalar at `path` as text. Numbers and booleans are rendered.
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get_raw(path)?.as_text()
    }

    /// Like [`get_string`](Self::get_string) with injected placeholders applied.
    pub fn get_formatted_string(&self, path: &str) -> Option<String> {
        self.get_string(path)
            .map(|s| apply_placeholders(&s, &self.injections))
    }

    pub fn get_strings(&self, path: &str) -> Option<Vec<String>> {
        self.list_of(path, Value::as_text)
    }

    pub fn get_formatted_strings(&self, path: &str) -> Option<Vec<String>> {
        self.get_strings(path).map(|list| {
            list.iter()
                .map(|s| apply_placeholders(s, &self.injections))
                .collect()
        })
    }

    fn list_of<T>(&self, path: &str, narrow: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
        self.get_raw(path)?.as_list()?.iter().map(narrow).collect()
    }

    /// Add placeholders, replacing any already injected with the same identifier.
    pub fn inject_placeholders(&mut self, placeholders: impl IntoIterator<Item = StaticPlaceholder>) {
        for placeholder in placeholders {
            if let Some(pos) = self
                .injections
                .iter()
                .position(|p| p.identifier() == placeholder.identifier())
            {
                self.injections[pos] = placeholder;
            } else {
                self.injections.push(placeholder);
            }
        }
        self.clear_cache();
    }

    pub fn injected_placeholders(&self) -> &[StaticPlaceholder] {
        &self.injections
    }

    pub fn clear_injected_placeholders(&mut self) {
        self.injections.clear();
        self.clear_cache();
    }

    /// Snapshot of the backing map.
    pub fn to_map(&self) -> ValueMap {
        self.values.clone()
    }

    pub fn to_plaintext(&self) -> Result<String, DataError> {
        if let Some(text) = self.rendered.get() {
            return Ok(text.clone());
        }
        let text = self.kind.encode(&self.values)?;
        let _ = self.rendered.set(text.clone());
        Ok(text)
    }
}

impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.values == other.values
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_plaintext().map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<ConfigNode> for Value {
    fn from(node: ConfigNode) -> Self {
        Value::Map(node.values)
    }
}

fn lookup<'a>(map: &'a ValueMap, path: &str) -> Option<&'a Value> {
    let found = match path.split_once('.') {
        Some((head, rest)) => lookup(map.get(head)?.as_map()?, rest)?,
        None => map.get(path)?,
    };
    if found.is_null() {
        None
    } else {
        Some(found)
    }
}

fn store(map: &mut ValueMap, path: &str, value: Value) {
    match path.split_once('.') {
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(ValueMap::new()));
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(ValueMap::new());
            }
            if let Value::Map(child) = slot {
                store(child, rest, value);
            }
        }
        None if value.is_null() => {
            map.remove(path);
        }
        None => {
            map.insert(path.to_string(), value);
        }
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::List(items) if items.is_empty() => Value::List(Vec::new()),
        Value::List(items) => Value::List(items.into_iter().map(normalize).collect()),
        Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, normalize(v))).collect()),
        other => other,
    }
}

fn collect_keys(map: &ValueMap, root: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let full = format!("{}{}", root, key);
        if let Value::Map(child) = value {
            out.push(full.clone());
            collect_keys(child, &format!("{}.", full), out);
        } else {
            out.push(full);
        }
    }
}
