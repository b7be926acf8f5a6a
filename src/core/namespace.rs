//! CF-004: Variable namespace — where live values are bound by name.

use indexmap::IndexMap;
use serde::Serialize;

/// Read access to live variable values.
///
/// Computation bodies mutate the namespace through the executor; the core
/// itself only reads it.
pub trait Namespace {
    type Value: Serialize;

    fn get(&self, name: &str) -> Option<&Self::Value>;

    fn bound(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// In-memory namespace of JSON values, in binding order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarStore {
    vars: IndexMap<String, serde_json::Value>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, returning the previous value.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn unset(&mut self, name: &str) -> Option<serde_json::Value> {
        self.vars.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Namespace for VarStore {
    type Value = serde_json::Value;

    fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.vars.get(name)
    }
}

impl FromIterator<(String, serde_json::Value)> for VarStore {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        VarStore {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Render a value the way a shell body expects to see it:
/// strings verbatim, everything else as compact JSON.
pub fn value_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
