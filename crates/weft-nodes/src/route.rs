use async_trait::async_trait;
use serde_json::Value;
use weft_task_runtime::{ExecutorError, NodeExecutor, NodeInput};

use crate::success;

/// Marks an HTTP route. Passes the request payload (the run input) through.
pub struct ApiRouteNode;

#[async_trait]
impl NodeExecutor for ApiRouteNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    Ok(success(input.input_data.as_ref().clone()))
  }

  fn required_params(&self) -> &[&'static str] {
    &["path"]
  }
}
