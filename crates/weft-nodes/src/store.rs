use async_trait::async_trait;
use serde_json::{Value, json};
use weft_task_runtime::{ExecutorError, NodeExecutor, NodeInput, NodeKind};

use crate::success;

/// Writes `value` under `key` in the run's key store.
///
/// The write itself happens when the orchestrator records the result, so
/// later nodes read it as `{{ store.KEY }}`.
pub struct StoreNode;

#[async_trait]
impl NodeExecutor for StoreNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    let key = match input.require("key")? {
      Value::String(key) if !key.is_empty() => key.clone(),
      Value::Number(n) => n.to_string(),
      other => {
        return Err(ExecutorError::invalid_params(format!(
          "store key must be a non-empty string, got {other}"
        )));
      }
    };
    let value = input.param("value").cloned().unwrap_or(Value::Null);
    Ok(success(json!({ "key": key, "value": value })))
  }

  fn kind(&self) -> NodeKind {
    NodeKind::KeyStore
  }

  fn required_params(&self) -> &[&'static str] {
    &["key"]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::input;

  #[tokio::test]
  async fn test_store_result_shape() {
    let out = StoreNode
      .execute(input(json!({"key": "token", "value": "abc"})))
      .await
      .unwrap();
    assert_eq!(out["result"], json!({"key": "token", "value": "abc"}));
  }

  #[tokio::test]
  async fn test_store_rejects_empty_key() {
    let err = StoreNode.execute(input(json!({"key": ""}))).await.unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidParams { .. }));
  }
}
