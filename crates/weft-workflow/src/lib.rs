//! Weft Workflow
//!
//! This crate provides the validated workflow representation for weft.
//! A [`Workflow`] is a [`weft_config::FlowDef`] that has been checked against
//! an executor registry and is ready for execution.
//!
//! Key differences from `weft-config`:
//! - Node names are unique and every edge endpoint exists
//! - Every node type has a registered executor and its mandatory parameters
//! - No cycle is reachable from the start node through ordinary edges
//! - Predecessors, join points and reachability are precomputed
//! - Route markers for the HTTP binding are identified

mod error;
mod graph;
mod route;
mod workflow;

pub use error::ValidationError;
pub use graph::Graph;
pub use route::{ROUTE_NODE_TYPE, RouteBinding};
pub use workflow::Workflow;
