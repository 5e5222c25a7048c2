//! Parameters value object module
//!
//! A named mapping of open JSON values used at three scopes: session-wide
//! globals, per-task locals, and explicit call parameters. Resolution merges
//! the scopes with call parameters taking precedence over locals, and locals
//! over globals.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A name-to-value parameter mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Parameters(HashMap<String, Value>);

impl Parameters {
    /// Creates an empty parameter mapping
    ///
    /// # Returns
    ///
    /// A new Parameters instance with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a binding by name
    ///
    /// # Arguments
    ///
    /// * `name` - The parameter name
    ///
    /// # Returns
    ///
    /// The bound value, or `None` when the name is unbound
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Binds a value to a name, replacing any existing binding
    ///
    /// # Arguments
    ///
    /// * `name` - The parameter name
    /// * `value` - The value to bind
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Checks whether any bindings exist
    ///
    /// # Returns
    ///
    /// `true` when the mapping holds no bindings
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Counts the bindings
    ///
    /// # Returns
    ///
    /// The number of bound names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Removes every binding
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterates over every binding
    ///
    /// # Returns
    ///
    /// An iterator of name and value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merges this mapping over a lower-precedence one
    ///
    /// # Arguments
    ///
    /// * `base` - The lower-precedence bindings
    ///
    /// # Returns
    ///
    /// A copy of `self` with every binding from `base` that `self` does not
    /// override; `self` wins on conflicts
    pub fn merged_over(&self, base: &Parameters) -> Parameters {
        let mut merged = base.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Parameters(merged)
    }

    /// Keeps only the named bindings
    ///
    /// # Arguments
    ///
    /// * `names` - The names to keep; `None` keeps everything (the open
    ///   signature case)
    pub fn retain_names(&mut self, names: Option<&[String]>) {
        if let Some(names) = names {
            self.0.retain(|key, _| names.iter().any(|n| n == key));
        }
    }
}

impl FromIterator<(String, Value)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Parameters(iter.into_iter().collect())
    }
}

impl From<HashMap<String, Value>> for Parameters {
    fn from(map: HashMap<String, Value>) -> Self {
        Parameters(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_wins_over_global() {
        let mut globals = Parameters::new();
        globals.insert("int_5", json!(3));
        globals.insert("extra_param", json!("something"));

        let mut locals = Parameters::new();
        locals.insert("int_5", json!(5));

        let merged = locals.merged_over(&globals);
        assert_eq!(merged.get("int_5"), Some(&json!(5)));
        assert_eq!(merged.get("extra_param"), Some(&json!("something")));
    }

    #[test]
    fn test_retain_names_filters() {
        let mut params = Parameters::new();
        params.insert("wanted", json!(1));
        params.insert("ignored", json!(2));

        params.retain_names(Some(&["wanted".to_string()]));
        assert_eq!(params.len(), 1);
        assert!(params.get("ignored").is_none());

        let mut open = Parameters::new();
        open.insert("anything", json!(true));
        open.retain_names(None);
        assert_eq!(open.len(), 1);
    }
}
