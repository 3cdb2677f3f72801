use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Per-run memo of resolved expressions and templates, keyed by exact text.
///
/// Only successful resolutions are stored. Entries live for one run.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
  entries: HashMap<String, Value>,
  hits: u64,
  misses: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub entries: usize,
  pub hits: u64,
  pub misses: u64,
}

impl ResolutionCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Look up `key`, counting the hit or miss.
  pub fn get(&mut self, key: &str) -> Option<Value> {
    match self.entries.get(key) {
      Some(value) => {
        self.hits += 1;
        Some(value.clone())
      }
      None => {
        self.misses += 1;
        None
      }
    }
  }

  pub fn insert(&mut self, key: impl Into<String>, value: Value) {
    self.entries.insert(key.into(), value);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      entries: self.entries.len(),
      hits: self.hits,
      misses: self.misses,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_hits_and_misses() {
    let mut cache = ResolutionCache::new();
    assert_eq!(cache.get("{{a}}"), None);
    cache.insert("{{a}}", json!(1));
    assert_eq!(cache.get("{{a}}"), Some(json!(1)));
    assert_eq!(cache.get("{{a}}"), Some(json!(1)));

    assert_eq!(
      cache.stats(),
      CacheStats {
        entries: 1,
        hits: 2,
        misses: 1
      }
    );
  }
}
