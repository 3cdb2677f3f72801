//! Invoking a node's executor with timeout and retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use weft_config::{NodeDef, Settings};
use weft_task_runtime::{
  ExecutorError, ExecutorRegistry, NodeExecutor, NodeInput, NodeResult, RetryPolicy,
};

use crate::config::EngineConfig;
use crate::error::DispatchError;

/// Runs one node's executor.
///
/// Parameter resolution happens before dispatch; the dispatcher only sees
/// resolved values.
#[derive(Clone)]
pub struct Dispatcher {
  registry: Arc<ExecutorRegistry>,
  default_timeout: Option<Duration>,
  retry_policy: Arc<dyn RetryPolicy>,
}

impl Dispatcher {
  pub fn new(registry: Arc<ExecutorRegistry>, config: &EngineConfig) -> Self {
    Self {
      registry,
      default_timeout: config.default_node_timeout,
      retry_policy: Arc::clone(&config.retry_policy),
    }
  }

  /// Timeout for one attempt: node, then flow settings, then the executor's
  /// default, then the engine default.
  pub fn timeout_for(
    &self,
    node: &NodeDef,
    settings: &Settings,
    executor: &dyn NodeExecutor,
  ) -> Option<Duration> {
    node
      .timeout()
      .or_else(|| settings.node_timeout())
      .or_else(|| executor.default_timeout())
      .or(self.default_timeout)
  }

  /// Execute `node` with already-resolved `input`.
  ///
  /// A returned value is normalized into a [`NodeResult`]. A raised error is
  /// retried while attempts remain and the retry policy accepts it.
  #[instrument(skip_all, fields(node = %node.name, node_type = %node.node_type))]
  pub async fn dispatch(
    &self,
    node: &NodeDef,
    settings: &Settings,
    input: NodeInput,
  ) -> Result<NodeResult, DispatchError> {
    let executor =
      self
        .registry
        .lookup(&node.node_type)
        .cloned()
        .ok_or_else(|| DispatchError::UnknownNodeType {
          node: node.name.clone(),
          node_type: node.node_type.clone(),
        })?;
    let timeout = self.timeout_for(node, settings, executor.as_ref());
    let max_retries = node.max_retries.unwrap_or(settings.max_retries);
    let cancel = input.cancel.clone();

    let mut attempt: u32 = 0;
    loop {
      attempt += 1;
      let call = executor.execute(input.clone());
      let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
          Ok(outcome) => outcome,
          Err(_) => {
            warn!(attempt, timeout = ?limit, "node_timed_out");
            return Err(DispatchError::NodeTimeout {
              node: node.name.clone(),
              timeout: limit,
            });
          }
        },
        None => call.await,
      };

      let error = match outcome {
        Ok(raw) => {
          debug!(attempt, "node_returned");
          return Ok(NodeResult::from_raw(raw));
        }
        Err(error) => error,
      };

      let retry = attempt <= max_retries
        && !cancel.is_cancelled()
        && self
          .retry_policy
          .is_retryable(&node.node_type, executor.as_ref(), &error);
      if !retry {
        return Err(DispatchError::NodeExecution {
          node: node.name.clone(),
          source: error,
        });
      }

      warn!(attempt, max_retries, error = %error, "node_retrying");
      tokio::select! {
        _ = tokio::time::sleep(settings.retry_delay()) => {}
        _ = cancel.cancelled() => {
          return Err(DispatchError::NodeExecution {
            node: node.name.clone(),
            source: ExecutorError::Cancelled,
          });
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use serde_json::{Map, Value, json};
  use tokio_util::sync::CancellationToken;
  use weft_task_runtime::{FnExecutor, NeverRetry};

  use super::*;

  fn input() -> NodeInput {
    NodeInput {
      execution_id: "run-1".to_string(),
      node_name: "Flaky".to_string(),
      params: Map::new(),
      input_data: Arc::new(Value::Null),
      cancel: CancellationToken::new(),
    }
  }

  fn flaky_registry(failures: u32, calls: Arc<AtomicU32>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(
      "flaky",
      FnExecutor::new(move |_| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
          Err(ExecutorError::transient("try again"))
        } else {
          Ok(json!({"status": "success", "result": n}))
        }
      }),
    );
    registry
  }

  #[tokio::test]
  async fn test_retries_accepted_errors() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = Arc::new(flaky_registry(2, Arc::clone(&calls)));
    let config = EngineConfig::default().with_retry_policy(|_: &str, e: &ExecutorError| {
      matches!(e, ExecutorError::Transient { .. })
    });
    let dispatcher = Dispatcher::new(registry, &config);
    let mut node = NodeDef::new("Flaky", "flaky");
    node.max_retries = Some(2);

    let result = dispatcher
      .dispatch(&node, &Settings::default(), input())
      .await
      .unwrap();
    assert_eq!(result.result, json!(2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_gives_up_when_policy_refuses() {
    let calls = Arc::new(AtomicU32::new(0));
    let registry = Arc::new(flaky_registry(5, Arc::clone(&calls)));
    let config = EngineConfig::default().with_retry_policy(NeverRetry);
    let dispatcher = Dispatcher::new(registry, &config);
    let mut settings = Settings::default();
    settings.max_retries = 3;

    let err = dispatcher
      .dispatch(&NodeDef::new("Flaky", "flaky"), &settings, input())
      .await
      .unwrap_err();
    assert!(matches!(err, DispatchError::NodeExecution { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_unknown_type() {
    let config = EngineConfig::default();
    let dispatcher = Dispatcher::new(Arc::new(ExecutorRegistry::new()), &config);
    let err = dispatcher
      .dispatch(&NodeDef::new("X", "missing"), &Settings::default(), input())
      .await
      .unwrap_err();
    assert_eq!(
      err,
      DispatchError::UnknownNodeType {
        node: "X".into(),
        node_type: "missing".into()
      }
    );
  }

  #[test]
  fn test_timeout_precedence() {
    let config = EngineConfig::default().with_default_node_timeout(Some(Duration::from_secs(9)));
    let dispatcher = Dispatcher::new(Arc::new(ExecutorRegistry::new()), &config);
    let executor = FnExecutor::new(|_| Ok(Value::Null));
    let mut node = NodeDef::new("X", "x");
    let mut settings = Settings::default();

    assert_eq!(
      dispatcher.timeout_for(&node, &settings, &executor),
      Some(Duration::from_secs(9))
    );
    settings.timeout_seconds = Some(5.0);
    assert_eq!(
      dispatcher.timeout_for(&node, &settings, &executor),
      Some(Duration::from_secs(5))
    );
    node.timeout_seconds = Some(0.5);
    assert_eq!(
      dispatcher.timeout_for(&node, &settings, &executor),
      Some(Duration::from_millis(500))
    );
  }
}
