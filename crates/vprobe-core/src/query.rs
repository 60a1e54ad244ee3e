//! Free-form discovery filters.
//!
//! A [`QueryParams`] is one string-to-string filter map handed to every
//! provider. The meaning of each key is environment-specific; an empty map
//! selects every instance of the environment.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;

/// One discovery filter map.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pairs: BTreeMap<String, String>,
}

impl QueryParams {
    /// Create a new, empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pairs: BTreeMap::new(),
        }
    }

    /// Append a key/value pair, replacing an earlier value for the key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a key/value pair.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.insert(key.into(), value.into());
    }

    /// Look up the value of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Iterate over the pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if no parameters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// Parses `key=value[,key=value...]`.
impl FromStr for QueryParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut params = Self::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::InvalidQuery(format!("expected key=value, got `{part}`")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidQuery(format!("empty key in `{part}`")));
            }
            params.insert(key, value.trim());
        }
        Ok(params)
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}
