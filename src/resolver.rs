//! External lookups used by transforms.
//!
//! A transform that needs to ask something outside the source record (a user
//! name service, an operator prompt, another database) goes through a
//! [`Resolver`]. The engine never talks to those systems itself.

use std::collections::HashMap;

use serde_json::Value;

pub trait Resolver: Send + Sync {
    /// Returns the value for `key`, or `None` when the lookup has no answer.
    fn resolve(&self, key: &str) -> Option<Value>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn resolve(&self, key: &str) -> Option<Value> {
        self(key)
    }
}

/// A resolver backed by a fixed key/value table.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    values: HashMap<String, Value>,
}

impl MapResolver {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for MapResolver {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        MapResolver {
            values: iter.into_iter().collect(),
        }
    }
}

impl Resolver for MapResolver {
    fn resolve(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_resolver_answers_known_keys() {
        let r: MapResolver = [("1".to_string(), json!("alice"))].into_iter().collect();
        assert_eq!(r.resolve("1"), Some(json!("alice")));
        assert_eq!(r.resolve("2"), None);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn closures_are_resolvers() {
        let upper = |key: &str| Some(json!(key.to_uppercase()));
        assert_eq!(upper.resolve("abc"), Some(json!("ABC")));
    }
}
