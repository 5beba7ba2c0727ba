//! Output Set parsed from `terraform output -json`

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::common::{Error, Result};

/// Shown in place of sensitive output values
pub const REDACTED: &str = "(sensitive)";

/// One entry of `terraform output -json`
#[derive(Deserialize, Debug)]
struct RawOutput {
    value: serde_json::Value,
    #[serde(default)]
    sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputValue {
    raw: serde_json::Value,
    text: String,
}

impl OutputValue {
    fn new(raw: serde_json::Value) -> Self {
        let text = match &raw {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self { raw, text }
    }
}

/// Declared outputs of an applied module, by name
///
/// Values compare as strings. Non-string outputs (numbers, lists, objects)
/// are rendered as compact JSON text for that; the typed value is kept for
/// JSON printing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSet {
    values: BTreeMap<String, OutputValue>,
    sensitive: BTreeSet<String>,
}

impl OutputSet {
    /// Parse the JSON document printed by `terraform output -json`
    pub fn from_terraform_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawOutput> =
            serde_json::from_str(json).map_err(|e| Error::OutputParse(e.to_string()))?;

        let mut set = Self::default();
        for (name, output) in raw {
            if output.sensitive {
                set.sensitive.insert(name.clone());
            }
            set.values.insert(name, OutputValue::new(output.value));
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|v| v.text.as_str())
    }

    /// Like `get`, but a missing output is an error rather than a default
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::MissingOutput(name.to_string()))
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(name)
    }

    /// `value` as it may be shown for output `name`
    pub fn displayed<'a>(&self, name: &str, value: &'a str) -> &'a str {
        if self.is_sensitive(name) {
            REDACTED
        } else {
            value
        }
    }

    /// Typed values as a JSON object, sensitive ones redacted
    pub fn to_redacted_json(&self) -> serde_json::Value {
        let map = self
            .values
            .iter()
            .map(|(name, value)| {
                let shown = if self.is_sensitive(name) {
                    serde_json::Value::from(REDACTED)
                } else {
                    value.raw.clone()
                };
                (name.clone(), shown)
            })
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.text.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OutputSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| {
                    let value = OutputValue::new(serde_json::Value::String(v.into()));
                    (k.into(), value)
                })
                .collect(),
            sensitive: BTreeSet::new(),
        }
    }
}
