//! Weft Orchestrator
//!
//! Runs validated workflows: walks the node graph from the start node,
//! resolves each node's parameters, dispatches it to its executor with
//! timeout and retry, records results and reports every transition.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │  - run(input, cancel) → RunOutcome                          │
//! │  - graph walk, branch selection, fail-fast, run timeout     │
//! │  - run_node / run_route / reload                            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Resolver (weft-resolver)                │
//! │  - {{ template }} parameters against the run's context      │
//! │  - DependencyPending → dependency is executed on demand     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Dispatcher                          │
//! │  - executor lookup, per-attempt timeout, retry policy       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use weft_orchestrator::{Engine, EngineConfig, LogNotifier};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = Arc::new(weft_nodes::builtin_registry());
//! let workflow = Workflow::load(FlowDef::from_path("flow.json")?, &registry)?;
//! let engine = Engine::new(workflow, registry, EngineConfig::default())
//!   .with_notifier(LogNotifier);
//!
//! let outcome = engine.run(json!({"user": "ada"}), CancellationToken::new()).await;
//! ```

mod config;
mod dispatch;
mod engine;
mod error;
mod events;
mod route;

pub use config::EngineConfig;
pub use dispatch::Dispatcher;
pub use engine::{Engine, RunFailure, RunOutcome, RunStatus};
pub use error::{DispatchError, OrchestrationError, RouteError};
pub use events::{
  ChannelNotifier, ExecutionEvent, ExecutionNotifier, LogNotifier, NodeState, NodeStateEntry,
  NoopNotifier, StatusUpdate,
};
pub use route::RouteResponse;
