//! The workflow engine.
//!
//! [`Engine`] owns a validated workflow and an executor registry and walks
//! the graph once per [`Engine::run`]. Each run gets a fresh
//! [`ExecutionContext`]; nothing is shared between runs except the read-only
//! workflow and registry.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use weft_config::FlowDef;
use weft_resolver::{CacheStats, ExecutionContext, ResolutionError, Resolver};
use weft_task_runtime::{ExecutorError, ExecutorRegistry, NodeInput, NodeKind, NodeResult};
use weft_workflow::{Graph, ValidationError, Workflow};

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, OrchestrationError};
use crate::events::{
  ExecutionEvent, ExecutionNotifier, NodeState, NodeStateEntry, NoopNotifier, StatusBoard,
  StatusUpdate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Completed,
  Failed,
}

/// Why a run failed.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
  pub node: Option<String>,
  pub message: String,
  #[serde(skip)]
  pub error: OrchestrationError,
}

impl From<OrchestrationError> for RunFailure {
  fn from(error: OrchestrationError) -> Self {
    Self {
      node: error.node().map(str::to_string),
      message: error.to_string(),
      error,
    }
  }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
  pub execution_id: String,
  pub workflow: String,
  pub status: RunStatus,
  pub results: BTreeMap<String, NodeResult>,
  /// Node states in first-seen order.
  pub states: Vec<NodeStateEntry>,
  pub visit_order: Vec<String>,
  pub key_store: BTreeMap<String, Value>,
  pub cache: CacheStats,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<RunFailure>,
}

impl RunOutcome {
  pub fn is_success(&self) -> bool {
    self.status == RunStatus::Completed
  }

  pub fn result(&self, node: &str) -> Option<&NodeResult> {
    self.results.get(node)
  }
}

/// Runs a workflow.
///
/// The workflow can be replaced with [`Engine::reload`] while runs are in
/// flight; each run keeps the snapshot it started with.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  workflow: RwLock<Arc<Workflow>>,
  registry: Arc<ExecutorRegistry>,
  config: EngineConfig,
  dispatcher: Dispatcher,
  notifier: N,
}

impl Engine<NoopNotifier> {
  pub fn new(workflow: Workflow, registry: Arc<ExecutorRegistry>, config: EngineConfig) -> Self {
    let dispatcher = Dispatcher::new(Arc::clone(&registry), &config);
    Self {
      workflow: RwLock::new(Arc::new(workflow)),
      registry,
      config,
      dispatcher,
      notifier: NoopNotifier,
    }
  }
}

impl<N: ExecutionNotifier> Engine<N> {
  /// Replace the notifier that receives run and node events.
  pub fn with_notifier<M: ExecutionNotifier>(self, notifier: M) -> Engine<M> {
    Engine {
      workflow: self.workflow,
      registry: self.registry,
      config: self.config,
      dispatcher: self.dispatcher,
      notifier,
    }
  }

  /// The current workflow snapshot.
  pub fn workflow(&self) -> Arc<Workflow> {
    Arc::clone(&self.workflow.read().unwrap_or_else(PoisonError::into_inner))
  }

  pub fn registry(&self) -> &Arc<ExecutorRegistry> {
    &self.registry
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Validate `def` and swap it in for subsequent runs.
  ///
  /// On error the current workflow stays in place.
  pub fn reload(&self, def: FlowDef) -> Result<(), ValidationError> {
    let workflow = Workflow::load(def, &self.registry)?;
    info!(workflow = %workflow.name(), nodes = workflow.node_names().len(), "workflow_reloaded");
    *self.workflow.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(workflow);
    Ok(())
  }

  /// Execute the workflow with `input` as the run's input data.
  #[instrument(name = "engine_run", skip_all)]
  pub async fn run(&self, input: Value, cancel: CancellationToken) -> RunOutcome {
    self.run_with(self.workflow(), input, cancel).await
  }

  /// Execute a single node in isolation.
  ///
  /// Nodes it references are executed on demand first. Successors are not
  /// walked. When the node itself fails, its recorded error result is
  /// returned rather than the error.
  #[instrument(name = "engine_run_node", skip(self, input, cancel), fields(node = %name))]
  pub async fn run_node(
    &self,
    name: &str,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<NodeResult, OrchestrationError> {
    let workflow = self.workflow();
    if !workflow.contains_node(name) {
      return Err(OrchestrationError::NodeNotFound(name.to_string()));
    }

    let mut run = Run::new(self, workflow, input, &cancel);
    info!(execution_id = %run.ctx.execution_id(), node = %name, "invoke_node_started");
    let executed = run.execute_node(name).await;
    match executed {
      Ok(result) => Ok(result),
      Err(err) if err.node() == Some(name) => match run.ctx.result(name) {
        Some(result) => Ok(result.clone()),
        None => Err(err),
      },
      Err(err) => Err(err),
    }
  }

  pub(crate) async fn run_with(
    &self,
    workflow: Arc<Workflow>,
    input: Value,
    cancel: CancellationToken,
  ) -> RunOutcome {
    let mut run = Run::new(self, Arc::clone(&workflow), input, &cancel);
    let execution_id = run.ctx.execution_id().to_string();

    info!(
      execution_id = %execution_id,
      workflow = %workflow.name(),
      start_node = %workflow.start_node(),
      "workflow_started"
    );
    self.notifier.notify(&ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      workflow: workflow.name().to_string(),
    });

    let limit = workflow
      .settings()
      .sandbox_timeout()
      .or(self.config.sandbox_timeout);
    let walked = match limit {
      Some(limit) => {
        let timed = tokio::time::timeout(limit, run.walk()).await;
        match timed {
          Ok(walked) => walked,
          Err(_) => {
            run.cancel.cancel();
            run.abort_running("timeout");
            Err(OrchestrationError::RunTimeout { timeout: limit })
          }
        }
      }
      None => run.walk().await,
    };

    let failure = match walked {
      Ok(()) => {
        info!(execution_id = %execution_id, "workflow_completed");
        self.notifier.notify(&ExecutionEvent::RunCompleted {
          execution_id: execution_id.clone(),
        });
        None
      }
      Err(err) => {
        error!(execution_id = %execution_id, error = %err, "workflow_failed");
        self.notifier.notify(&ExecutionEvent::RunFailed {
          execution_id: execution_id.clone(),
          node: err.node().map(str::to_string),
          error: err.to_string(),
        });
        Some(RunFailure::from(err))
      }
    };

    let states = run.board.into_entries();
    let summary = run.ctx.into_summary();
    RunOutcome {
      execution_id,
      workflow: workflow.name().to_string(),
      status: if failure.is_none() {
        RunStatus::Completed
      } else {
        RunStatus::Failed
      },
      results: summary.results.into_iter().collect(),
      states,
      visit_order: summary.visit_order,
      key_store: summary.key_store,
      cache: summary.cache,
      failure,
    }
  }
}

/// State of one in-flight run.
struct Run<'e, N: ExecutionNotifier> {
  engine: &'e Engine<N>,
  workflow: Arc<Workflow>,
  resolver: Resolver,
  ctx: ExecutionContext,
  board: StatusBoard,
  cancel: CancellationToken,
}

impl<'e, N: ExecutionNotifier> Run<'e, N> {
  fn new(
    engine: &'e Engine<N>,
    workflow: Arc<Workflow>,
    input: Value,
    cancel: &CancellationToken,
  ) -> Self {
    let resolver = Resolver::new(Arc::clone(&workflow))
      .with_filters(engine.config.filters.clone())
      .with_environment(engine.config.environment_values());
    Self {
      engine,
      workflow,
      resolver,
      ctx: ExecutionContext::new(uuid::Uuid::new_v4().to_string(), input),
      board: StatusBoard::default(),
      cancel: cancel.child_token(),
    }
  }

  /// Walk the graph from the start node until nothing is left to run.
  async fn walk(&mut self) -> Result<(), OrchestrationError> {
    let workflow = Arc::clone(&self.workflow);
    let graph = workflow.graph();
    let start = workflow.start_node().to_string();

    self.mark_pending(&start);
    let mut frontier = VecDeque::from([start.clone()]);
    let mut queued = HashSet::from([start]);
    let mut waiting: Vec<String> = Vec::new();

    while let Some(name) = next_node(&mut frontier, &mut waiting, graph, &self.ctx) {
      queued.remove(&name);
      if self.cancel.is_cancelled() {
        return Err(OrchestrationError::Cancelled);
      }
      if !self.ctx.mark_visited(&name) {
        return Err(OrchestrationError::LoopDetected { node: name });
      }
      self.ctx.unskip(&name);

      let result = match self.ctx.result(&name) {
        Some(result) => {
          debug!(node = %name, "reusing on-demand result");
          result.clone()
        }
        None => self.execute_node(&name).await?,
      };

      for next in self.successors(&name, &result)? {
        if queued.contains(&next) {
          continue;
        }
        let ready = self.ctx.is_visited(&next)
          || graph
            .predecessors(&next)
            .iter()
            .all(|p| self.ctx.is_visited(p));
        self.mark_pending(&next);
        if ready {
          waiting.retain(|w| *w != next);
          queued.insert(next.clone());
          frontier.push_back(next);
        } else if !waiting.contains(&next) {
          debug!(node = %next, "waiting for predecessors");
          waiting.push(next);
        }
      }
    }
    Ok(())
  }

  /// Resolve, dispatch and record one node.
  ///
  /// A parameter referencing a node without a result runs that node first,
  /// then resolution is retried.
  fn execute_node<'r>(
    &'r mut self,
    name: &'r str,
  ) -> BoxFuture<'r, Result<NodeResult, OrchestrationError>> {
    Box::pin(async move {
      let workflow = Arc::clone(&self.workflow);
      let node = workflow
        .get_node(name)
        .ok_or_else(|| OrchestrationError::NodeNotFound(name.to_string()))?;

      info!(
        execution_id = %self.ctx.execution_id(),
        node = %name,
        node_type = %node.node_type,
        "node_started"
      );
      self.transition(name, NodeState::Running, None);

      let params = loop {
        self.ctx.begin_resolving(name);
        let resolved = self.resolver.resolve_params(name, &node.params, &mut self.ctx);
        self.ctx.end_resolving(name);
        match resolved {
          Ok(params) => break params,
          Err(ResolutionError::DependencyPending { node: dependency }) => {
            debug!(node = %name, dependency = %dependency, "running dependency on demand");
            self.ctx.begin_resolving(name);
            let ran = self.execute_node(&dependency).await;
            self.ctx.end_resolving(name);
            if let Err(err) = ran {
              self.mark_failed(name, format!("dependency '{dependency}' failed"));
              return Err(err);
            }
          }
          Err(source) => {
            return Err(self.fail(
              name,
              DispatchError::Resolution {
                node: name.to_string(),
                source,
              },
            ));
          }
        }
      };

      let resolved = Value::Object(params.clone());
      if workflow.settings().debug {
        info!(node = %name, params = %resolved, "resolved_params");
      } else {
        debug!(node = %name, params = %resolved, "resolved_params");
      }

      let input = NodeInput {
        execution_id: self.ctx.execution_id().to_string(),
        node_name: name.to_string(),
        params,
        input_data: Arc::clone(self.ctx.input_data()),
        cancel: self.cancel.clone(),
      };
      match self
        .engine
        .dispatcher
        .dispatch(node, workflow.settings(), input)
        .await
      {
        Ok(result) => self.record(name, result),
        Err(err) => Err(self.fail(name, err)),
      }
    })
  }

  /// Store a node's result, write key-store entries and notify.
  fn record(&mut self, name: &str, result: NodeResult) -> Result<NodeResult, OrchestrationError> {
    if self.workflow.kind(name) == NodeKind::KeyStore && !result.is_error() {
      let entry = result.result.as_object().and_then(|fields| {
        let key = match fields.get("key")? {
          Value::String(key) => key.clone(),
          Value::Number(n) => n.to_string(),
          _ => return None,
        };
        Some((key, fields.get("value").cloned().unwrap_or(Value::Null)))
      });
      match entry {
        Some((key, value)) => {
          debug!(node = %name, key = %key, "key_stored");
          self.ctx.store(key, value);
        }
        None => {
          let err = OrchestrationError::InvalidStoreResult {
            node: name.to_string(),
          };
          self.mark_failed(name, err.to_string());
          return Err(err);
        }
      }
    }

    self.ctx.record_result(name, result.clone());
    self.transition(name, result.status.into(), result.message.clone());

    if result.is_error() {
      let message = result.message.clone().unwrap_or_default();
      error!(node = %name, error = %message, "node_failed");
      return Err(OrchestrationError::NodeFailed {
        node: name.to_string(),
        message,
      });
    }
    info!(node = %name, status = %result.status, "node_completed");
    Ok(result)
  }

  /// Record a dispatch failure on the node and convert it for the run.
  fn fail(&mut self, name: &str, err: DispatchError) -> OrchestrationError {
    error!(node = %name, error = %err, "node_failed");
    if let DispatchError::NodeExecution {
      source: ExecutorError::Cancelled,
      ..
    } = err
    {
      self.mark_failed(name, "cancelled".to_string());
      return OrchestrationError::Cancelled;
    }
    self.mark_failed(name, err.result_message());
    OrchestrationError::Dispatch(err)
  }

  fn mark_failed(&mut self, name: &str, message: String) {
    self
      .ctx
      .record_result(name, NodeResult::error(message.clone()));
    self.transition(name, NodeState::Error, Some(message));
  }

  /// Fail every node still marked running.
  fn abort_running(&mut self, message: &str) {
    for name in self.board.running() {
      warn!(node = %name, "node_aborted");
      self.mark_failed(&name, message.to_string());
    }
  }

  /// Report a newly scheduled node as pending, once.
  fn mark_pending(&mut self, name: &str) {
    if self.ctx.result(name).is_none() && self.board.state(name).is_none() {
      self.transition(name, NodeState::Pending, None);
    }
  }

  fn transition(&mut self, name: &str, state: NodeState, message: Option<String>) {
    let snapshot = self.board.set(name, state);
    self
      .engine
      .notifier
      .notify(&ExecutionEvent::NodeStatus(StatusUpdate {
        execution_id: self.ctx.execution_id().to_string(),
        node: name.to_string(),
        state,
        message,
        snapshot,
      }));
  }

  /// Successors to schedule after `name` produced `result`.
  ///
  /// A branching node's rejected successors are pruned.
  fn successors(
    &mut self,
    name: &str,
    result: &NodeResult,
  ) -> Result<Vec<String>, OrchestrationError> {
    let workflow = Arc::clone(&self.workflow);
    let edges = workflow.edges_from(name);
    let selected = match workflow.kind(name) {
      NodeKind::Conditional => {
        let branch = match &result.result {
          Value::Bool(b) => Some(*b),
          Value::Object(fields) => fields.get("result").and_then(Value::as_bool),
          _ => None,
        }
        .ok_or_else(|| OrchestrationError::InvalidBranchValue {
          node: name.to_string(),
          value: result.result.to_string(),
        })?;
        let index = if branch { 0 } else { 1 };
        match edges.get(index) {
          Some(target) => vec![target.clone()],
          None => {
            warn!(node = %name, branch, "conditional_branch_missing");
            Vec::new()
          }
        }
      }
      NodeKind::MultiWay => {
        let target = result
          .result
          .get("selected_node")
          .and_then(Value::as_str)
          .ok_or_else(|| OrchestrationError::InvalidBranchValue {
            node: name.to_string(),
            value: result.result.to_string(),
          })?;
        if !edges.iter().any(|edge| edge == target) {
          return Err(OrchestrationError::InvalidBranchTarget {
            node: name.to_string(),
            target: target.to_string(),
          });
        }
        vec![target.to_string()]
      }
      NodeKind::Ordinary | NodeKind::KeyStore => return Ok(edges.to_vec()),
    };

    let rejected: Vec<&String> = edges.iter().filter(|e| !selected.contains(*e)).collect();
    self.prune(name, &selected, &rejected);
    Ok(selected)
  }

  /// Skip every node reachable only through rejected edges, so references
  /// to them never run them on demand.
  fn prune(&mut self, name: &str, selected: &[String], rejected: &[&String]) {
    let workflow = Arc::clone(&self.workflow);
    let graph = workflow.graph();
    let kept: HashSet<String> = selected
      .iter()
      .flat_map(|target| graph.reachable_from(target))
      .collect();
    for target in rejected {
      for node in graph.reachable_from(target) {
        if kept.contains(&node) || self.ctx.result(&node).is_some() || self.ctx.is_visited(&node) {
          continue;
        }
        debug!(node = %node, branch = %name, "node_skipped");
        self.ctx.skip(&node);
      }
    }
  }
}

/// Pop the frontier, or release a waiting node once it is empty.
///
/// A waiting node is preferred when none of its unvisited predecessors can
/// still be reached from another waiting node.
fn next_node(
  frontier: &mut VecDeque<String>,
  waiting: &mut Vec<String>,
  graph: &Graph,
  ctx: &ExecutionContext,
) -> Option<String> {
  if let Some(name) = frontier.pop_front() {
    return Some(name);
  }
  if waiting.is_empty() {
    return None;
  }
  let index = waiting
    .iter()
    .position(|candidate| {
      graph
        .predecessors(candidate)
        .iter()
        .filter(|p| !ctx.is_visited(p))
        .all(|p| {
          !waiting
            .iter()
            .any(|other| other != candidate && (other == p || graph.can_reach(other, p)))
        })
    })
    .unwrap_or(0);
  debug!(node = %waiting[index], "releasing join");
  Some(waiting.remove(index))
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use weft_config::NodeDef;
  use weft_task_runtime::FnExecutor;

  use super::*;

  fn registry() -> Arc<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::new();
    registry.register(
      "echo",
      FnExecutor::new(|input| Ok(json!({"status": "success", "result": input.params.clone()}))),
    );
    Arc::new(registry)
  }

  fn engine(def: FlowDef) -> Engine {
    let registry = registry();
    let workflow = Workflow::load(def, &registry).unwrap();
    Engine::new(workflow, registry, EngineConfig::default())
  }

  #[test]
  fn test_join_released_after_pruned_branch() {
    // A -> B -> D, A -> C -> D, with B already visited and C never scheduled
    let def = FlowDef::new("join", "A")
      .with_node(NodeDef::new("A", "echo"))
      .with_node(NodeDef::new("B", "echo"))
      .with_node(NodeDef::new("C", "echo"))
      .with_node(NodeDef::new("D", "echo"))
      .with_edge("A", "B")
      .with_edge("A", "C")
      .with_edge("B", "D")
      .with_edge("C", "D");
    let registry = registry();
    let workflow = Workflow::load(def, &registry).unwrap();
    let mut ctx = ExecutionContext::new("run", Value::Null);
    ctx.mark_visited("A");
    ctx.mark_visited("B");

    let mut frontier = VecDeque::new();
    let mut waiting = vec!["D".to_string()];
    let released = next_node(&mut frontier, &mut waiting, workflow.graph(), &ctx);
    assert_eq!(released.as_deref(), Some("D"));
    assert!(waiting.is_empty());
  }

  #[test]
  fn test_upstream_waiting_node_released_first() {
    // X -> Y -> Z, both Y and Z waiting: Y must go first
    let def = FlowDef::new("chain", "S")
      .with_node(NodeDef::new("S", "echo"))
      .with_node(NodeDef::new("X", "echo"))
      .with_node(NodeDef::new("Y", "echo"))
      .with_node(NodeDef::new("Z", "echo"))
      .with_edge("S", "Z")
      .with_edge("S", "Y")
      .with_edge("X", "Y")
      .with_edge("Y", "Z");
    let registry = registry();
    let workflow = Workflow::load(def, &registry).unwrap();
    let mut ctx = ExecutionContext::new("run", Value::Null);
    ctx.mark_visited("S");

    let mut frontier = VecDeque::new();
    let mut waiting = vec!["Z".to_string(), "Y".to_string()];
    let released = next_node(&mut frontier, &mut waiting, workflow.graph(), &ctx);
    assert_eq!(released.as_deref(), Some("Y"));
  }

  #[tokio::test]
  async fn test_outcome_serializes_without_error_detail() {
    let engine = engine(
      FlowDef::new("single", "A").with_node(NodeDef::new("A", "echo").with_param("x", 1)),
    );
    let outcome = engine.run(json!({}), CancellationToken::new()).await;
    assert!(outcome.is_success());

    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["status"], json!("completed"));
    assert_eq!(value["results"]["A"]["result"], json!({"x": 1}));
    assert_eq!(value["states"], json!([{"node": "A", "state": "success"}]));
    assert!(value.get("failure").is_none());
  }

  #[tokio::test]
  async fn test_reload_keeps_old_workflow_on_error() {
    let engine = engine(FlowDef::new("first", "A").with_node(NodeDef::new("A", "echo")));

    let broken = FlowDef::new("broken", "Missing").with_node(NodeDef::new("A", "echo"));
    assert!(engine.reload(broken).is_err());
    assert_eq!(engine.workflow().name(), "first");

    let next = FlowDef::new("second", "B").with_node(NodeDef::new("B", "echo"));
    engine.reload(next).unwrap();
    assert_eq!(engine.workflow().name(), "second");

    let outcome = engine.run(Value::Null, CancellationToken::new()).await;
    assert_eq!(outcome.visit_order, vec!["B"]);
  }
}
