//! Per-cycle tag → value storage, preserving declared order.

use crate::coerce::Value;
use indexmap::IndexMap;

pub const HEARTBEAT_TAG: &str = "HEARTBEAT";

/// One cycle's worth of decoded values, in declared tag order with
/// `HEARTBEAT` always last. A missing read is `None`.
#[derive(Debug, Default, Clone)]
pub struct Sample {
    values: IndexMap<String, Option<Value>>,
}

impl Sample {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, tag_name: impl Into<String>, value: Option<Value>) {
        self.values.insert(tag_name.into(), value);
    }

    pub fn set_heartbeat(&mut self, ok: bool) {
        self.values
            .insert(HEARTBEAT_TAG.to_string(), Some(Value::Bool(ok)));
    }

    /// Iterate tag name and value in the order they were inserted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    #[must_use]
    pub fn tag_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, tag_name: &str) -> Option<&Value> {
        self.values.get(tag_name).and_then(|v| v.as_ref())
    }
}
