//! Query keys and invalidation filters.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one cached read: an operation name plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  name: String,
  params: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      params: BTreeMap::new(),
    }
  }

  pub fn param(mut self, key: &str, value: impl ToString) -> Self {
    self.params.insert(key.to_string(), value.to_string());
    self
  }

  /// Stable, fixed-length hash identifying the cache entry.
  ///
  /// Hashes the JSON encoding so separators inside values cannot collide.
  pub fn cache_hash(&self) -> String {
    let encoded = serde_json::to_vec(&(&self.name, &self.params))
      .unwrap_or_else(|_| self.to_string().into_bytes());
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)?;
    if !self.params.is_empty() {
      let params: Vec<String> = self
        .params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
      write!(f, "{{{}}}", params.join(","))?;
    }
    Ok(())
  }
}

/// Selects the keys an invalidation applies to.
///
/// A filter matches every key with the same operation name whose parameters
/// include all of the filter's parameters, so `QueryFilter::all("items")`
/// covers `items{owner=a}` and `items{owner=b}` alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
  name: String,
  params: BTreeMap<String, String>,
}

impl QueryFilter {
  pub fn all(name: &str) -> Self {
    Self {
      name: name.to_string(),
      params: BTreeMap::new(),
    }
  }

  pub fn matches(&self, key: &QueryKey) -> bool {
    self.name == key.name
      && self
        .params
        .iter()
        .all(|(k, v)| key.params.get(k) == Some(v))
  }
}

impl From<&QueryKey> for QueryFilter {
  fn from(key: &QueryKey) -> Self {
    Self {
      name: key.name.clone(),
      params: key.params.clone(),
    }
  }
}

impl From<QueryKey> for QueryFilter {
  fn from(key: QueryKey) -> Self {
    Self {
      name: key.name,
      params: key.params,
    }
  }
}

impl fmt::Display for QueryFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let key = QueryKey {
      name: self.name.clone(),
      params: self.params.clone(),
    };
    write!(f, "{}", key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_ignores_param_order() {
    let a = QueryKey::new("documents").param("class_id", "c1").param("owner", "u1");
    let b = QueryKey::new("documents").param("owner", "u1").param("class_id", "c1");
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn test_hash_differs_per_param() {
    let a = QueryKey::new("class").param("id", "1");
    let b = QueryKey::new("class").param("id", "2");
    assert_ne!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_hash_escapes_separators_in_values() {
    let packed = QueryKey::new("documents").param("a", "x,b=y");
    let split = QueryKey::new("documents").param("a", "x").param("b", "y");
    assert_eq!(packed.to_string(), split.to_string());
    assert_ne!(packed.cache_hash(), split.cache_hash());
  }

  #[test]
  fn test_display() {
    assert_eq!(QueryKey::new("items").to_string(), "items");
    assert_eq!(
      QueryKey::new("items").param("owner", "u1").to_string(),
      "items{owner=u1}"
    );
  }

  #[test]
  fn test_filter_all_matches_any_params() {
    let filter = QueryFilter::all("items");
    assert!(filter.matches(&QueryKey::new("items").param("owner", "a")));
    assert!(filter.matches(&QueryKey::new("items")));
    assert!(!filter.matches(&QueryKey::new("item").param("id", "a")));
  }

  #[test]
  fn test_filter_from_key_is_exact_on_params() {
    let filter = QueryFilter::from(QueryKey::new("item").param("id", "a"));
    assert!(filter.matches(&QueryKey::new("item").param("id", "a")));
    assert!(!filter.matches(&QueryKey::new("item").param("id", "b")));
  }
}
