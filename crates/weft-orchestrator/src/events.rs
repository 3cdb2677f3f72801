//! Execution events and notifiers for observability.
//!
//! The engine reports every run and node transition to an
//! [`ExecutionNotifier`] synchronously, in order. Consumers decide what to do
//! with them (stream to a UI, persist, log, ignore).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use weft_task_runtime::NodeStatus;

/// Lifecycle state of a node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
  Pending,
  Running,
  Success,
  Error,
  Warning,
}

impl From<NodeStatus> for NodeState {
  fn from(status: NodeStatus) -> Self {
    match status {
      NodeStatus::Success => Self::Success,
      NodeStatus::Error => Self::Error,
      NodeStatus::Warning => Self::Warning,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateEntry {
  pub node: String,
  pub state: NodeState,
}

/// One node transition, with the state of every node seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
  pub execution_id: String,
  pub node: String,
  pub state: NodeState,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  /// States in first-seen order.
  pub snapshot: Vec<NodeStateEntry>,
}

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  RunStarted {
    execution_id: String,
    workflow: String,
  },

  NodeStatus(StatusUpdate),

  RunCompleted { execution_id: String },

  RunFailed {
    execution_id: String,
    node: Option<String>,
    error: String,
  },
}

/// Receives execution events.
///
/// Called synchronously from the run; implementations should not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: &ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: &ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls a run; volume is a handful of
/// events per node.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier and the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: &ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event.clone());
  }
}

/// Writes events as tracing records.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl ExecutionNotifier for LogNotifier {
  fn notify(&self, event: &ExecutionEvent) {
    match event {
      ExecutionEvent::RunStarted {
        execution_id,
        workflow,
      } => info!(execution_id = %execution_id, workflow = %workflow, "run_started"),
      ExecutionEvent::NodeStatus(update) => info!(
        execution_id = %update.execution_id,
        node = %update.node,
        state = ?update.state,
        message = update.message.as_deref().unwrap_or(""),
        "node_status"
      ),
      ExecutionEvent::RunCompleted { execution_id } => {
        info!(execution_id = %execution_id, "run_completed")
      }
      ExecutionEvent::RunFailed {
        execution_id,
        node,
        error: message,
      } => error!(
        execution_id = %execution_id,
        node = node.as_deref().unwrap_or(""),
        error = %message,
        "run_failed"
      ),
    }
  }
}

impl<F> ExecutionNotifier for F
where
  F: Fn(&ExecutionEvent) + Send + Sync,
{
  fn notify(&self, event: &ExecutionEvent) {
    self(event)
  }
}

/// Ordered per-run node states.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatusBoard {
  entries: Vec<NodeStateEntry>,
}

impl StatusBoard {
  /// Set a node's state and return the full snapshot.
  pub(crate) fn set(&mut self, node: &str, state: NodeState) -> Vec<NodeStateEntry> {
    match self.entries.iter_mut().find(|e| e.node == node) {
      Some(entry) => entry.state = state,
      None => self.entries.push(NodeStateEntry {
        node: node.to_string(),
        state,
      }),
    }
    self.entries.clone()
  }

  pub(crate) fn state(&self, node: &str) -> Option<NodeState> {
    self.entries.iter().find(|e| e.node == node).map(|e| e.state)
  }

  pub(crate) fn running(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .filter(|e| e.state == NodeState::Running)
      .map(|e| e.node.clone())
      .collect()
  }

  pub(crate) fn into_entries(self) -> Vec<NodeStateEntry> {
    self.entries
  }
}
