//! State values, partial updates and the deep-merge rules between them.

use crate::error::{json_kind, Result, StateSyncError};
use crate::JsonValue;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A full state snapshot: string keys mapped to arbitrary JSON values.
pub type State = serde_json::Map<String, JsonValue>;

/// A partial update to a [`State`].
///
/// Each entry either sets a top-level key or clears it. Keys that are not
/// mentioned are left alone when the update is merged. A JSON `null` is an
/// ordinary value; use [`PartialState::clear`] to remove a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialState {
    entries: BTreeMap<String, Option<JsonValue>>,
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.entries.insert(key.into(), Some(value.into()));
        self
    }

    /// Clear `key` from the state it is merged onto.
    #[must_use]
    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), None);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, update: Option<JsonValue>) {
        self.entries.insert(key.into(), update);
    }

    /// Build a partial update from a JSON object. Every key becomes a set.
    ///
    /// # Errors
    ///
    /// Returns [`StateSyncError::NotAnObject`] if `value` is not an object.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self::from(map)),
            other => Err(StateSyncError::NotAnObject {
                what: "partial state",
                found: json_kind(&other),
            }),
        }
    }

    /// The update for `key`: `None` if untouched, `Some(None)` if cleared.
    pub fn get(&self, key: &str) -> Option<Option<&JsonValue>> {
        self.entries.get(key).map(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, Option<&JsonValue>)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<State> for PartialState {
    fn from(state: State) -> Self {
        Self {
            entries: state.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Option<JsonValue>)> for PartialState {
    fn from_iter<I: IntoIterator<Item = (K, Option<JsonValue>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Cleared keys serialize as `null`.
impl Serialize for PartialState {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, &value.as_ref().unwrap_or(&JsonValue::Null))?;
        }
        map.end()
    }
}

/// A partial update addressed to one record of a remote store.
///
/// Serializes flat, as `{ "id": .., key: value, .. }`. The record id always
/// wins over an `id` key inside the changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRecord {
    pub id: String,
    pub changes: PartialState,
}

impl PatchRecord {
    pub fn new(id: impl Into<String>, changes: PartialState) -> Self {
        Self {
            id: id.into(),
            changes,
        }
    }
}

impl Serialize for PatchRecord {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        for (key, value) in self.changes.iter().filter(|(k, _)| k.as_str() != "id") {
            map.serialize_entry(key, &value.unwrap_or(&JsonValue::Null))?;
        }
        map.end()
    }
}

/// Merge `partial` onto `target` in place.
///
/// Object values merge key by key, recursively. Any other value, arrays
/// included, replaces what was there. Cleared keys are removed.
pub fn merge_into(target: &mut State, partial: &PartialState) {
    for (key, update) in partial.iter() {
        match update {
            None => {
                target.remove(key);
            }
            Some(value) => match target.get_mut(key) {
                Some(existing) => merge_value(existing, value),
                None => {
                    target.insert(key.clone(), value.clone());
                }
            },
        }
    }
}

/// Merge `partial` onto a copy of `state`.
#[must_use]
pub fn merged(state: &State, partial: &PartialState) -> State {
    let mut next = state.clone();
    merge_into(&mut next, partial);
    next
}

fn merge_value(target: &mut JsonValue, source: &JsonValue) {
    match (target, source) {
        (JsonValue::Object(existing), JsonValue::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
