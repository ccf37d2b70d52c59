//! Resource property normalization
//!
//! The orchestrator delivers properties with PascalCase keys and every scalar
//! as a string. Keys are lower-first camel cased, empty entries are dropped
//! from arrays, and numeric fields accept either form.

use crate::Result;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Normalized resource properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Map<String, Value>);

impl Properties {
    /// Normalize raw properties
    pub fn normalize(raw: Map<String, Value>) -> Self {
        let props = raw
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::Array(items) => Value::Array(
                        items.into_iter().filter(|v| !is_blank(v)).collect(),
                    ),
                    other => other,
                };
                (lower_first(&key), value)
            })
            .collect();
        Self(props)
    }

    /// Property by its normalized key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize into a typed property set
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

impl From<Map<String, Value>> for Properties {
    fn from(raw: Map<String, Value>) -> Self {
        Self::normalize(raw)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn lower_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

/// Deserialize an unsigned number given either as a JSON number or a string
pub(crate) fn number<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let raw = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| de::Error::custom(format!("invalid number {:?}: {}", s, e)))?,
    };
    T::try_from(raw).map_err(|_| de::Error::custom(format!("number {} out of range", raw)))
}
