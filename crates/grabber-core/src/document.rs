//! Optional-path lookups over loosely-typed provider documents
//!
//! Provider responses are kept as `serde_json::Value` and read with dotted paths
//! such as `"commit.committer.name"`. A missing segment yields `None`, never an
//! error, so absent provider fields map onto optional record attributes.

use serde_json::Value;

pub trait DocumentExt {
    /// Value at a dotted path; array elements are addressed by index
    fn at(&self, path: &str) -> Option<&Value>;

    /// Scalar at a dotted path rendered as a string
    ///
    /// Numbers and booleans are stringified so numeric provider ids read the
    /// same as string ones. `null`, objects and arrays yield `None`.
    fn str_at(&self, path: &str) -> Option<String>;

    fn u64_at(&self, path: &str) -> Option<u64>;

    /// Non-null value at a dotted path, cloned
    fn value_at(&self, path: &str) -> Option<Value>;

    /// Array of strings at a dotted path, skipping non-scalar elements
    fn strings_at(&self, path: &str) -> Vec<String>;
}

impl DocumentExt for Value {
    fn at(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |node, key| match node {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    fn str_at(&self, path: &str) -> Option<String> {
        match self.at(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn u64_at(&self, path: &str) -> Option<u64> {
        match self.at(path)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn value_at(&self, path: &str) -> Option<Value> {
        self.at(path).filter(|v| !v.is_null()).cloned()
    }

    fn strings_at(&self, path: &str) -> Vec<String> {
        match self.at(path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
