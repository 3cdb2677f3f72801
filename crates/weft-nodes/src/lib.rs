//! Built-in node executors.
//!
//! Every builtin returns an object with an explicit `status`, so results are
//! recorded as-is rather than normalized to warnings.

mod basic;
mod branch;
mod compute;
mod delay;
mod route;
mod store;

pub use basic::{LogNode, SetNode};
pub use branch::{ConditionNode, SwitchNode};
pub use compute::ComputeNode;
pub use delay::DelayNode;
pub use route::ApiRouteNode;
pub use store::StoreNode;

use serde_json::{Value, json};
use weft_task_runtime::ExecutorRegistry;
use weft_workflow::ROUTE_NODE_TYPE;

/// Register every builtin under its type identifier.
pub fn register_builtins(registry: &mut ExecutorRegistry) -> &mut ExecutorRegistry {
  registry
    .register("compute", ComputeNode)
    .register("condition", ConditionNode)
    .register("switch", SwitchNode)
    .register("store", StoreNode)
    .register("set", SetNode)
    .register("log", LogNode)
    .register("delay", DelayNode)
    .register(ROUTE_NODE_TYPE, ApiRouteNode)
}

/// A registry holding only the builtins.
pub fn builtin_registry() -> ExecutorRegistry {
  let mut registry = ExecutorRegistry::new();
  register_builtins(&mut registry);
  registry
}

pub(crate) fn success(result: Value) -> Value {
  json!({ "status": "success", "result": result })
}
