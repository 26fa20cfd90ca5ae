use std::collections::BTreeMap;

use crate::annotations::TRUE_STRING;

/// Flag values resolved from a parsed command line, keyed by flag name.
///
/// Booleans are stored as `"true"`/`"false"`. Flags that were not given and have no default
/// are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFlags {
    values: BTreeMap<String, String>,
}

impl ResolvedFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is_true(&self, name: &str) -> bool {
        self.get(name) == Some(TRUE_STRING)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedFlags {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        ResolvedFlags {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
