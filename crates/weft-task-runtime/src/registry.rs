//! Explicit executor registry.
//!
//! Node types map to executors only through [`ExecutorRegistry::register`].
//! Lookup is case-insensitive and falls back to a derived identifier so that
//! `SumNode`, `sum_node` and `sum` all reach the executor registered as `sum`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::executor::NodeExecutor;

/// Derive the canonical identifier of a type string.
///
/// Lowercases, drops `_`, `-` and whitespace, and strips a trailing `node`
/// unless that would leave nothing.
pub fn derive_identifier(type_name: &str) -> String {
  let compact: String = type_name
    .chars()
    .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
    .flat_map(char::to_lowercase)
    .collect();

  match compact.strip_suffix("node") {
    Some(stem) if !stem.is_empty() => stem.to_string(),
    _ => compact,
  }
}

/// Map from type identifier to executor.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
  executors: HashMap<String, Arc<dyn NodeExecutor>>,
  derived: HashMap<String, String>,
}

impl ExecutorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an executor under `id`, replacing any previous registration.
  pub fn register(&mut self, id: &str, executor: impl NodeExecutor + 'static) -> &mut Self {
    self.register_arc(id, Arc::new(executor))
  }

  pub fn register_arc(&mut self, id: &str, executor: Arc<dyn NodeExecutor>) -> &mut Self {
    let key = id.to_lowercase();
    debug!(id = %key, "registering executor");
    self.derived.insert(derive_identifier(&key), key.clone());
    self.executors.insert(key, executor);
    self
  }

  /// Find the executor for a node type.
  pub fn lookup(&self, node_type: &str) -> Option<&Arc<dyn NodeExecutor>> {
    let key = node_type.to_lowercase();
    if let Some(executor) = self.executors.get(&key) {
      return Some(executor);
    }
    self
      .derived
      .get(&derive_identifier(&key))
      .and_then(|id| self.executors.get(id))
  }

  pub fn contains(&self, node_type: &str) -> bool {
    self.lookup(node_type).is_some()
  }

  /// Registered identifiers, sorted.
  pub fn identifiers(&self) -> Vec<&str> {
    let mut ids: Vec<&str> = self.executors.keys().map(|k| k.as_str()).collect();
    ids.sort_unstable();
    ids
  }

  pub fn len(&self) -> usize {
    self.executors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.executors.is_empty()
  }
}

impl std::fmt::Debug for ExecutorRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutorRegistry")
      .field("executors", &self.identifiers())
      .finish()
  }
}
