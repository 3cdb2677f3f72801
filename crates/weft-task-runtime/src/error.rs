//! Executor error types.

use thiserror::Error;

/// Errors raised by a node executor instead of returning a result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
  /// The resolved parameters are unusable.
  #[error("invalid parameters: {message}")]
  InvalidParams { message: String },

  /// The operation failed.
  #[error("{message}")]
  Failed { message: String },

  /// The operation failed in a way that may succeed on another attempt.
  #[error("transient failure: {message}")]
  Transient { message: String },

  /// The executor observed the cancellation token and stopped.
  #[error("cancelled")]
  Cancelled,
}

impl ExecutorError {
  pub fn invalid_params(message: impl Into<String>) -> Self {
    Self::InvalidParams {
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn transient(message: impl Into<String>) -> Self {
    Self::Transient {
      message: message.into(),
    }
  }
}
