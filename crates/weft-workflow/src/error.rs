use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  #[error("duplicate node name: {0}")]
  DuplicateNode(String),

  #[error("start node '{0}' does not exist")]
  MissingStartNode(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  DanglingEdge { from: String, to: String },

  #[error("node '{node}' has unknown type '{node_type}'")]
  UnknownNodeType { node: String, node_type: String },

  #[error("node '{node}' is missing mandatory parameter '{param}'")]
  MissingParameter { node: String, param: String },

  #[error("cycle through ordinary edges: {}", path.join(" -> "))]
  CycleDetected { path: Vec<String> },

  #[error("invalid route on node '{node}': {message}")]
  InvalidRoute { node: String, message: String },
}
