//! Weft Config
//!
//! This crate contains the serializable flow definition types for weft.
//! These types represent a flow before it is validated against the executor
//! registry and turned into a runnable `Workflow`.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `weft run flow.json`)
//! - Any JSON string produced by an external authoring tool
//!
//! Parameter values are kept as raw JSON. Strings may contain `{{ ... }}`
//! placeholders which are resolved at runtime.

mod error;
mod flow;
mod node;
mod settings;

pub use error::ParseError;
pub use flow::FlowDef;
pub use node::NodeDef;
pub use settings::Settings;

/// Raw parameter map of a node or flow. Ordered as authored.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;
