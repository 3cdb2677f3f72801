use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use weft_resolver::as_number;
use weft_task_runtime::{ExecutorError, NodeExecutor, NodeInput};

use crate::success;

/// Sleeps for `ms` milliseconds, returning early with `Cancelled` if the run
/// is cancelled.
pub struct DelayNode;

#[async_trait]
impl NodeExecutor for DelayNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    let ms = as_number(input.require("ms")?)
      .filter(|ms| *ms >= 0.0)
      .ok_or_else(|| ExecutorError::invalid_params("parameter 'ms' must be a non-negative number"))?
      as u64;

    debug!(node = %input.node_name, ms, "delaying");
    tokio::select! {
      _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
      _ = input.cancel.cancelled() => return Err(ExecutorError::Cancelled),
    }
    Ok(success(json!({ "slept_ms": ms })))
  }

  fn required_params(&self) -> &[&'static str] {
    &["ms"]
  }
}
