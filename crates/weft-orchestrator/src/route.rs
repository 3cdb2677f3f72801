//! Serving `api_route` bindings.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use weft_task_runtime::NodeResult;
use weft_workflow::RouteBinding;

use crate::engine::{Engine, RunOutcome};
use crate::error::RouteError;
use crate::events::ExecutionNotifier;

/// The handler's result for one request, with the run that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
  pub binding: RouteBinding,
  pub response: NodeResult,
  pub outcome: RunOutcome,
}

impl<N: ExecutionNotifier> Engine<N> {
  /// Run the workflow for a request to `method path`, with `body` as input
  /// data, and return the handler node's result.
  #[instrument(name = "engine_run_route", skip(self, body, cancel))]
  pub async fn run_route(
    &self,
    method: &str,
    path: &str,
    body: Value,
    cancel: CancellationToken,
  ) -> Result<RouteResponse, RouteError> {
    let workflow = self.workflow();
    let binding = workflow
      .route(method, path)
      .cloned()
      .ok_or_else(|| RouteError::RouteNotFound {
        method: method.to_uppercase(),
        path: path.to_string(),
      })?;
    info!(route = %binding.node, handler = %binding.handler, "route_matched");

    let outcome = self.run_with(workflow, body, cancel).await;
    if let Some(failure) = &outcome.failure {
      let source = failure.error.clone();
      return Err(RouteError::RunFailed {
        outcome: Box::new(outcome),
        source,
      });
    }
    let response = outcome
      .result(&binding.handler)
      .cloned()
      .ok_or_else(|| RouteError::HandlerNotReached {
        execution_id: outcome.execution_id.clone(),
        handler: binding.handler.clone(),
      })?;

    Ok(RouteResponse {
      binding,
      response,
      outcome,
    })
  }
}
