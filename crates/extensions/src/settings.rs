//! Settings merge: operator overrides layered over extension defaults.
//!
//! Every extension declares a defaults map. The operator may override any of
//! those keys (type parity enforced) and add keys the extension never
//! declared (passed through unchecked — secrets usually arrive this way).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};

/// A set of named setting values for one extension.
pub type SettingsMap = serde_json::Map<String, Value>;

/// Operator-supplied overrides, keyed by extension id. Built once at process
/// start; a reload re-reads the same map.
pub type ExtensionOverrides = HashMap<String, SettingsMap>;

/// JSON value kinds, used for type-parity checks and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "a boolean",
            Self::Number => "a number",
            Self::String => "a string",
            Self::Array => "an array",
            Self::Object => "an object",
        };
        write!(f, "{name}")
    }
}

/// Merged, type-checked settings for one extension instance. Read-only for
/// the extension's lifetime; the next reload produces a fresh value.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSettings {
    extension_id: String,
    values: SettingsMap,
}

impl ResolvedSettings {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Required string setting.
    pub fn str(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::missing_setting(&self.extension_id, key))
    }

    /// Optional string setting; absent and `null` both resolve to `None`.
    #[must_use]
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Required integer setting.
    pub fn int(&self, key: &str) -> Result<i64> {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::missing_setting(&self.extension_id, key))
    }

    /// Required boolean setting.
    pub fn bool(&self, key: &str) -> Result<bool> {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::missing_setting(&self.extension_id, key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Merge operator overrides into an extension's declared defaults.
///
/// With no override entry for `extension_id` the result is the defaults
/// verbatim. Otherwise the override entry wins key-by-key, defaults fill the
/// gaps, and every key that is also declared in defaults must keep the
/// default's value kind — a mismatch fails the whole resolution. Keys the
/// extension never declared pass through unchecked.
pub fn resolve(
    extension_id: &str,
    defaults: &SettingsMap,
    overrides: &ExtensionOverrides,
) -> Result<ResolvedSettings> {
    let Some(provided) = overrides.get(extension_id) else {
        return Ok(ResolvedSettings {
            extension_id: extension_id.to_string(),
            values: defaults.clone(),
        });
    };

    let mut merged = provided.clone();
    for (key, value) in defaults {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in &merged {
        if let Some(default) = defaults.get(key) {
            let expected = ValueKind::of(default);
            if ValueKind::of(value) != expected {
                return Err(Error::ConfigurationType {
                    extension: extension_id.to_string(),
                    key: key.clone(),
                    value: value.clone(),
                    expected,
                });
            }
        }
    }

    tracing::info!(extension_id, keys = merged.len(), "resolved extension settings");

    Ok(ResolvedSettings {
        extension_id: extension_id.to_string(),
        values: merged,
    })
}
