//! Retry classification.
//!
//! Whether a raised error is worth another attempt is a pluggable predicate.
//! The engine asks the configured [`RetryPolicy`] after every failed attempt
//! while attempts remain.

use crate::error::ExecutorError;
use crate::executor::NodeExecutor;

pub trait RetryPolicy: Send + Sync {
  fn is_retryable(
    &self,
    node_type: &str,
    executor: &dyn NodeExecutor,
    error: &ExecutorError,
  ) -> bool;
}

/// Defers to the executor's own [`NodeExecutor::is_retryable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredRetryPolicy;

impl RetryPolicy for DeclaredRetryPolicy {
  fn is_retryable(
    &self,
    _node_type: &str,
    executor: &dyn NodeExecutor,
    error: &ExecutorError,
  ) -> bool {
    !matches!(error, ExecutorError::Cancelled) && executor.is_retryable(error)
  }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
  fn is_retryable(&self, _: &str, _: &dyn NodeExecutor, _: &ExecutorError) -> bool {
    false
  }
}

impl<F> RetryPolicy for F
where
  F: Fn(&str, &ExecutorError) -> bool + Send + Sync,
{
  fn is_retryable(&self, node_type: &str, _: &dyn NodeExecutor, error: &ExecutorError) -> bool {
    self(node_type, error)
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use serde_json::Value;

  use super::*;
  use crate::executor::{FnExecutor, NodeInput};

  struct Flaky;

  #[async_trait]
  impl NodeExecutor for Flaky {
    async fn execute(&self, _input: NodeInput) -> Result<Value, ExecutorError> {
      Err(ExecutorError::transient("busy"))
    }

    fn is_retryable(&self, error: &ExecutorError) -> bool {
      matches!(error, ExecutorError::Transient { .. })
    }
  }

  #[test]
  fn test_declared_policy_defers_to_executor() {
    let policy = DeclaredRetryPolicy;
    assert!(policy.is_retryable("flaky", &Flaky, &ExecutorError::transient("busy")));
    assert!(!policy.is_retryable("flaky", &Flaky, &ExecutorError::failed("bad")));
    assert!(!policy.is_retryable("flaky", &Flaky, &ExecutorError::Cancelled));

    let plain = FnExecutor::new(|_| Ok(Value::Null));
    assert!(!policy.is_retryable("plain", &plain, &ExecutorError::transient("busy")));
  }

  #[test]
  fn test_closure_policy() {
    let policy = |node_type: &str, _: &ExecutorError| node_type == "http";
    let plain = FnExecutor::new(|_| Ok(Value::Null));
    assert!(policy.is_retryable("http", &plain, &ExecutorError::failed("503")));
    assert!(!policy.is_retryable("sql", &plain, &ExecutorError::failed("503")));
    assert!(!NeverRetry.is_retryable("http", &Flaky, &ExecutorError::transient("x")));
  }
}
