//! Resolution error types.

use thiserror::Error;

/// Errors that can occur while resolving a template against a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
  /// A path did not lead to a value under any lookup strategy.
  #[error("path not found: {reference}")]
  PathNotFound { reference: String },

  /// Resolving a value required itself.
  #[error("circular reference: {}", chain.join(" -> "))]
  CircularReference { chain: Vec<String> },

  /// A parameter, stored key, environment name or bare name does not exist.
  #[error("unresolved reference: {reference}")]
  UnresolvedRequiredReference { reference: String },

  /// A referenced node has not produced a result yet.
  ///
  /// The orchestrator answers this by executing the node and resolving again.
  #[error("node '{node}' has not produced a result yet")]
  DependencyPending { node: String },

  /// A referenced node sits on a branch that was not taken.
  #[error("node '{node}' was skipped")]
  SkippedNode { node: String },

  /// Malformed template or expression.
  #[error("template syntax error: {message}")]
  Syntax { message: String },

  /// A filter rejected its input.
  #[error("filter '{filter}' failed: {message}")]
  Filter { filter: String, message: String },

  /// A condition or computed expression failed to evaluate.
  #[error("failed to evaluate '{expression}': {message}")]
  Expression { expression: String, message: String },
}

impl ResolutionError {
  pub(crate) fn syntax(message: impl Into<String>) -> Self {
    Self::Syntax {
      message: message.into(),
    }
  }

  pub(crate) fn unresolved(reference: impl Into<String>) -> Self {
    Self::UnresolvedRequiredReference {
      reference: reference.into(),
    }
  }

  pub(crate) fn path_not_found(reference: impl Into<String>) -> Self {
    Self::PathNotFound {
      reference: reference.into(),
    }
  }

  /// Errors a fallback chain must never swallow.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      Self::CircularReference { .. } | Self::DependencyPending { .. }
    )
  }
}
