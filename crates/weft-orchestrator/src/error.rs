//! Orchestration error types.

use std::time::Duration;

use thiserror::Error;
use weft_resolver::ResolutionError;
use weft_task_runtime::ExecutorError;

use crate::engine::RunOutcome;

/// Errors from running a single node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
  #[error("no executor registered for type '{node_type}' (node '{node}')")]
  UnknownNodeType { node: String, node_type: String },

  #[error("node '{node}' timed out after {timeout:?}")]
  NodeTimeout { node: String, timeout: Duration },

  #[error("node '{node}' failed: {source}")]
  NodeExecution {
    node: String,
    #[source]
    source: ExecutorError,
  },

  #[error("failed to resolve parameters of node '{node}': {source}")]
  Resolution {
    node: String,
    #[source]
    source: ResolutionError,
  },
}

impl DispatchError {
  pub fn node(&self) -> &str {
    match self {
      Self::UnknownNodeType { node, .. }
      | Self::NodeTimeout { node, .. }
      | Self::NodeExecution { node, .. }
      | Self::Resolution { node, .. } => node,
    }
  }

  /// Message recorded on the failing node's result.
  pub(crate) fn result_message(&self) -> String {
    match self {
      Self::NodeTimeout { .. } => "timeout".to_string(),
      Self::NodeExecution { source, .. } => source.to_string(),
      Self::Resolution { source, .. } => source.to_string(),
      other => other.to_string(),
    }
  }
}

/// Errors that fail a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
  /// A node was reached a second time.
  #[error("loop detected: node '{node}' was already visited")]
  LoopDetected { node: String },

  #[error("node '{node}' selected '{target}', which is not one of its successors")]
  InvalidBranchTarget { node: String, target: String },

  #[error("node '{node}' produced {value}, which cannot select a branch")]
  InvalidBranchValue { node: String, value: String },

  #[error("store node '{node}' did not produce a key")]
  InvalidStoreResult { node: String },

  #[error("run exceeded its time limit of {timeout:?}")]
  RunTimeout { timeout: Duration },

  #[error("run cancelled")]
  Cancelled,

  /// A node finished with `error` status.
  #[error("node '{node}' failed: {message}")]
  NodeFailed { node: String, message: String },

  #[error("node '{0}' not found in workflow")]
  NodeNotFound(String),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),
}

impl OrchestrationError {
  /// The node the error is attributed to, if any.
  pub fn node(&self) -> Option<&str> {
    match self {
      Self::LoopDetected { node }
      | Self::InvalidBranchTarget { node, .. }
      | Self::InvalidBranchValue { node, .. }
      | Self::InvalidStoreResult { node }
      | Self::NodeFailed { node, .. } => Some(node),
      Self::NodeNotFound(node) => Some(node),
      Self::Dispatch(err) => Some(err.node()),
      Self::RunTimeout { .. } | Self::Cancelled => None,
    }
  }
}

/// Errors from serving a route.
#[derive(Debug, Error)]
pub enum RouteError {
  #[error("no route for {method} {path}")]
  RouteNotFound { method: String, path: String },

  #[error("run {execution_id} completed without reaching handler '{handler}'")]
  HandlerNotReached {
    execution_id: String,
    handler: String,
  },

  /// The run failed. `outcome` carries every node's result and state.
  #[error("run {} failed: {source}", .outcome.execution_id)]
  RunFailed {
    outcome: Box<RunOutcome>,
    #[source]
    source: OrchestrationError,
  },
}
