use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use weft_task_runtime::NodeResult;

use crate::cache::{CacheStats, ResolutionCache};

/// Mutable state of one run.
///
/// Owned by the run, never shared across runs. The resolver reads results and
/// the key store from it and records cache entries into it.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  execution_id: String,
  input_data: Arc<Value>,
  results: HashMap<String, NodeResult>,
  key_store: BTreeMap<String, Value>,
  cache: ResolutionCache,
  visited: HashSet<String>,
  visit_order: Vec<String>,
  /// Nodes on branches a conditional or switch rejected.
  skipped: HashSet<String>,
  /// Nodes whose parameters are currently being resolved, outermost first.
  resolving: Vec<String>,
}

/// What remains of a context once a run ends.
#[derive(Debug, Clone)]
pub struct ContextSummary {
  pub results: HashMap<String, NodeResult>,
  pub key_store: BTreeMap<String, Value>,
  pub visit_order: Vec<String>,
  pub cache: CacheStats,
}

impl ExecutionContext {
  pub fn new(execution_id: impl Into<String>, input_data: Value) -> Self {
    Self {
      execution_id: execution_id.into(),
      input_data: Arc::new(input_data),
      results: HashMap::new(),
      key_store: BTreeMap::new(),
      cache: ResolutionCache::new(),
      visited: HashSet::new(),
      visit_order: Vec::new(),
      skipped: HashSet::new(),
      resolving: Vec::new(),
    }
  }

  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  pub fn input_data(&self) -> &Arc<Value> {
    &self.input_data
  }

  pub fn result(&self, node: &str) -> Option<&NodeResult> {
    self.results.get(node)
  }

  pub fn results(&self) -> &HashMap<String, NodeResult> {
    &self.results
  }

  /// Record a node's result. A node's first result is final; later ones are
  /// rejected and `false` is returned.
  pub fn record_result(&mut self, node: impl Into<String>, result: NodeResult) -> bool {
    let node = node.into();
    if self.results.contains_key(&node) {
      tracing::warn!(node = %node, "ignoring second result for node");
      return false;
    }
    self.results.insert(node, result);
    true
  }

  pub fn store(&mut self, key: impl Into<String>, value: Value) {
    self.key_store.insert(key.into(), value);
  }

  pub fn stored(&self, key: &str) -> Option<&Value> {
    self.key_store.get(key)
  }

  pub fn key_store(&self) -> &BTreeMap<String, Value> {
    &self.key_store
  }

  pub fn cache(&self) -> &ResolutionCache {
    &self.cache
  }

  pub fn cache_mut(&mut self) -> &mut ResolutionCache {
    &mut self.cache
  }

  /// Mark a node as visited by the walk. Returns `false` if it already was.
  pub fn mark_visited(&mut self, node: &str) -> bool {
    if !self.visited.insert(node.to_string()) {
      return false;
    }
    self.visit_order.push(node.to_string());
    true
  }

  pub fn is_visited(&self, node: &str) -> bool {
    self.visited.contains(node)
  }

  pub fn visit_order(&self) -> &[String] {
    &self.visit_order
  }

  /// Mark a node as pruned by a branch decision. A skipped node is never
  /// executed on demand; references to it resolve as missing.
  pub fn skip(&mut self, node: &str) {
    self.skipped.insert(node.to_string());
  }

  /// Clear the skip mark once the walk reaches the node another way.
  pub fn unskip(&mut self, node: &str) {
    self.skipped.remove(node);
  }

  pub fn is_skipped(&self, node: &str) -> bool {
    self.skipped.contains(node)
  }

  pub fn begin_resolving(&mut self, node: &str) {
    self.resolving.push(node.to_string());
  }

  pub fn end_resolving(&mut self, node: &str) {
    if let Some(pos) = self.resolving.iter().rposition(|n| n == node) {
      self.resolving.remove(pos);
    }
  }

  pub fn is_resolving(&self, node: &str) -> bool {
    self.resolving.iter().any(|n| n == node)
  }

  /// Nodes currently being resolved, outermost first.
  pub fn resolving_chain(&self) -> &[String] {
    &self.resolving
  }

  pub fn into_summary(self) -> ContextSummary {
    ContextSummary {
      cache: self.cache.stats(),
      results: self.results,
      key_store: self.key_store,
      visit_order: self.visit_order,
    }
  }

  #[cfg(test)]
  pub(crate) fn results_mut(&mut self) -> &mut HashMap<String, NodeResult> {
    &mut self.results
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_first_result_is_final() {
    let mut ctx = ExecutionContext::new("run-1", json!({}));
    assert!(ctx.record_result("a", NodeResult::success(json!(1))));
    assert!(!ctx.record_result("a", NodeResult::success(json!(2))));
    assert_eq!(ctx.result("a").map(|r| &r.result), Some(&json!(1)));
  }

  #[test]
  fn test_visit_order() {
    let mut ctx = ExecutionContext::new("run-1", json!({}));
    assert!(ctx.mark_visited("a"));
    assert!(ctx.mark_visited("b"));
    assert!(!ctx.mark_visited("a"));
    assert_eq!(ctx.visit_order(), &["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn test_skip_marks() {
    let mut ctx = ExecutionContext::new("run-1", json!({}));
    ctx.skip("a");
    assert!(ctx.is_skipped("a"));
    ctx.unskip("a");
    assert!(!ctx.is_skipped("a"));
  }

  #[test]
  fn test_resolving_stack() {
    let mut ctx = ExecutionContext::new("run-1", json!({}));
    ctx.begin_resolving("a");
    ctx.begin_resolving("b");
    assert!(ctx.is_resolving("a"));
    ctx.end_resolving("b");
    assert!(!ctx.is_resolving("b"));
    assert_eq!(ctx.resolving_chain(), &["a".to_string()]);
  }
}
