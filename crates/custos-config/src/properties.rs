//! Flattened property views.
//!
//! Refreshable beans declare the property prefixes they depend on. When the
//! configuration reloads, the old and new [`PropertySnapshot`]s are diffed and
//! the changed keys decide which beans to discard.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

/// Properties flattened to dotted keys with string values.
///
/// Nested tables become dotted keys (`mail.smtp.host`). Arrays are kept
/// whole, rendered as JSON, under their own key.
///
/// # Example
///
/// ```
/// use custos_config::PropertySnapshot;
/// use serde_json::json;
///
/// let before = PropertySnapshot::from_value(&json!({ "db": { "url": "a", "pool": 4 } }));
/// let after = PropertySnapshot::from_value(&json!({ "db": { "url": "b", "pool": 4 } }));
///
/// assert_eq!(before.diff(&after), vec!["db.url".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySnapshot {
    values: BTreeMap<String, String>,
}

impl PropertySnapshot {
    /// Flattens a property table.
    #[must_use]
    pub fn from_properties(properties: &Map<String, Value>) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in properties {
            flatten_into(&mut values, key.clone(), value);
        }
        Self { values }
    }

    /// Flattens any JSON value; non-objects produce an empty snapshot.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(properties) => Self::from_properties(properties),
            _ => Self::default(),
        }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the keys starting with `prefix` as a whole segment.
    pub fn keys_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.values
            .keys()
            .map(String::as_str)
            .filter(move |key| is_under(key, prefix))
    }

    /// Returns the keys added, removed or changed between `self` and `newer`.
    ///
    /// Keys are returned in sorted order.
    #[must_use]
    pub fn diff(&self, newer: &Self) -> Vec<String> {
        let keys: BTreeSet<&String> = self.values.keys().chain(newer.values.keys()).collect();
        keys.into_iter()
            .filter(|key| self.values.get(*key) != newer.values.get(*key))
            .cloned()
            .collect()
    }

    /// Returns the number of flattened keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn is_under(key: &str, prefix: &str) -> bool {
    key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn flatten_into(values: &mut BTreeMap<String, String>, key: String, value: &Value) {
    match value {
        Value::Object(children) => {
            for (child, value) in children {
                flatten_into(values, format!("{key}.{child}"), value);
            }
        }
        Value::String(s) => {
            values.insert(key, s.clone());
        }
        Value::Null => {
            values.insert(key, String::new());
        }
        other => {
            values.insert(key, other.to_string());
        }
    }
}
