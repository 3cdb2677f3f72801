//! The node executor contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

/// How the orchestrator picks successors after a node of this kind ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
  /// All declared successors are scheduled.
  #[default]
  Ordinary,
  /// Result is a boolean. The first edge is taken when true, the second when false.
  Conditional,
  /// Result names one of the declared successors in `selected_node`.
  MultiWay,
  /// Result carries a `key`/`value` pair written to the run's key store.
  KeyStore,
}

/// Everything an executor receives for one invocation.
#[derive(Debug, Clone)]
pub struct NodeInput {
  pub execution_id: String,
  pub node_name: String,
  /// Parameters after template resolution and coercion.
  pub params: Map<String, Value>,
  /// The payload that triggered the run.
  pub input_data: Arc<Value>,
  /// Cancelled when the run is cancelled or times out.
  pub cancel: CancellationToken,
}

impl NodeInput {
  /// Get a resolved parameter.
  pub fn param(&self, key: &str) -> Option<&Value> {
    self.params.get(key)
  }

  /// Get a resolved parameter, failing with `InvalidParams` when absent.
  pub fn require(&self, key: &str) -> Result<&Value, ExecutorError> {
    self
      .params
      .get(key)
      .ok_or_else(|| ExecutorError::invalid_params(format!("missing parameter '{}'", key)))
  }

  /// Get a string parameter, failing when absent or not a string.
  pub fn require_str(&self, key: &str) -> Result<&str, ExecutorError> {
    self.require(key)?.as_str().ok_or_else(|| {
      ExecutorError::invalid_params(format!("parameter '{}' must be a string", key))
    })
  }
}

/// A unit of work registered for a node type.
///
/// The returned value is normalized by the engine: an object with a `status`
/// field is taken as-is, anything else is recorded as a warning.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError>;

  fn kind(&self) -> NodeKind {
    NodeKind::Ordinary
  }

  /// Parameters that must be present in the definition of every node of this type.
  fn required_params(&self) -> &[&'static str] {
    &[]
  }

  /// Timeout used when neither the node nor the flow settings specify one.
  fn default_timeout(&self) -> Option<Duration> {
    None
  }

  /// Whether a raised error may succeed on another attempt.
  fn is_retryable(&self, _error: &ExecutorError) -> bool {
    false
  }
}

type SyncFn = dyn Fn(&NodeInput) -> Result<Value, ExecutorError> + Send + Sync;

/// Adapts a synchronous closure into a [`NodeExecutor`].
pub struct FnExecutor {
  kind: NodeKind,
  required: Vec<&'static str>,
  func: Box<SyncFn>,
}

impl FnExecutor {
  pub fn new<F>(func: F) -> Self
  where
    F: Fn(&NodeInput) -> Result<Value, ExecutorError> + Send + Sync + 'static,
  {
    Self {
      kind: NodeKind::Ordinary,
      required: Vec::new(),
      func: Box::new(func),
    }
  }

  pub fn with_kind(mut self, kind: NodeKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn with_required(mut self, params: &[&'static str]) -> Self {
    self.required = params.to_vec();
    self
  }
}

#[async_trait]
impl NodeExecutor for FnExecutor {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    (self.func)(&input)
  }

  fn kind(&self) -> NodeKind {
    self.kind
  }

  fn required_params(&self) -> &[&'static str] {
    &self.required
  }
}
