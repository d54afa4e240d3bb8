//! Host-side collaborators: the variable namespace and the display sink.

mod display;

pub use display::{DisplayData, DisplayEntry, DisplayPayload, DisplaySink, FileDisplay, ImageStore};

use serde_json::Value;
use std::collections::BTreeMap;

/// Source tag attached to every published display payload.
pub const DISPLAY_SOURCE: &str = "IDLMagic.IDL";

/// Variables visible to the host.
pub trait Namespace {
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&mut self, name: &str, value: Value);
}

/// In-memory namespace used by IPC mode and tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MapNamespace {
    values: BTreeMap<String, Value>,
}

impl MapNamespace {
    pub fn new() -> Self {
        Self::default()
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
}

impl Namespace for MapNamespace {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }
}

impl<const N: usize> From<[(&str, Value); N]> for MapNamespace {
    fn from(entries: [(&str, Value); N]) -> Self {
        Self {
            values: entries
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_namespace_overwrites_on_set() {
        let mut ns = MapNamespace::from([("x", json!(1))]);
        assert_eq!(ns.get("x"), Some(json!(1)));
        ns.set("x", json!([1, 2]));
        ns.set("y", json!("s"));
        assert_eq!(ns.get("x"), Some(json!([1, 2])));
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(ns.len(), 2);
        assert!(ns.get("z").is_none());
    }
}
