use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use weft_resolver::to_display;
use weft_task_runtime::{ExecutorError, NodeExecutor, NodeInput};

use crate::success;

/// Returns its `value` parameter as the result.
pub struct SetNode;

#[async_trait]
impl NodeExecutor for SetNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    Ok(success(input.param("value").cloned().unwrap_or(Value::Null)))
  }
}

/// Emits `message` as a tracing event at `level` (default `info`).
pub struct LogNode;

#[async_trait]
impl NodeExecutor for LogNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    let message = to_display(input.require("message")?);
    let level = input
      .param("level")
      .and_then(Value::as_str)
      .unwrap_or("info")
      .to_lowercase();
    let node = input.node_name.as_str();
    let execution_id = input.execution_id.as_str();

    match level.as_str() {
      "debug" | "trace" => debug!(execution_id, node, "{message}"),
      "info" => info!(execution_id, node, "{message}"),
      "warn" | "warning" => warn!(execution_id, node, "{message}"),
      "error" => error!(execution_id, node, "{message}"),
      other => {
        return Err(ExecutorError::invalid_params(format!("unknown log level '{other}'")));
      }
    }
    Ok(success(json!({ "message": message, "level": level })))
  }

  fn required_params(&self) -> &[&'static str] {
    &["message"]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::input;

  #[tokio::test]
  async fn test_set_returns_value() {
    let out = SetNode.execute(input(json!({"value": {"a": [1]}}))).await.unwrap();
    assert_eq!(out, json!({"status": "success", "result": {"a": [1]}}));
  }

  #[tokio::test]
  async fn test_log() {
    let out = LogNode
      .execute(input(json!({"message": 42, "level": "WARN"})))
      .await
      .unwrap();
    assert_eq!(out["result"], json!({"message": "42", "level": "warn"}));

    let err = LogNode
      .execute(input(json!({"message": "x", "level": "loud"})))
      .await
      .unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidParams { .. }));
  }
}
