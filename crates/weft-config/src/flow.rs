use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ParamMap;
use crate::error::ParseError;
use crate::node::NodeDef;
use crate::settings::Settings;

/// A flow as authored: metadata, parameters, nodes, edges and settings.
///
/// Nothing here is validated yet. Edge targets may dangle and node names may
/// repeat until the definition goes through `Workflow::load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub start_node: String,
  #[serde(default)]
  pub parameters: ParamMap,
  /// Names expected to be supplied by the environment at run time.
  #[serde(default)]
  pub environment: Vec<String>,
  #[serde(default)]
  pub settings: Settings,
  pub nodes: Vec<NodeDef>,
  /// Node name -> ordered successor names. Order matters for branching nodes.
  #[serde(default)]
  pub edges: BTreeMap<String, Vec<String>>,
}

impl FlowDef {
  /// Create an empty flow whose start node is `start_node`.
  pub fn new(name: impl Into<String>, start_node: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      start_node: start_node.into(),
      parameters: ParamMap::new(),
      environment: Vec::new(),
      settings: Settings::default(),
      nodes: Vec::new(),
      edges: BTreeMap::new(),
    }
  }

  /// Parse a JSON flow definition.
  pub fn from_json_str(content: &str) -> Result<Self, ParseError> {
    Ok(serde_json::from_str(content)?)
  }

  /// Read and parse a JSON flow definition from disk.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ParseError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&content)
  }

  pub fn with_node(mut self, node: NodeDef) -> Self {
    self.nodes.push(node);
    self
  }

  pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
    self.edges.entry(from.into()).or_default().push(to.into());
    self
  }

  pub fn with_parameter(
    mut self,
    name: impl Into<String>,
    value: impl Into<serde_json::Value>,
  ) -> Self {
    self.parameters.insert(name.into(), value.into());
    self
  }

  pub fn with_environment(mut self, name: impl Into<String>) -> Self {
    self.environment.push(name.into());
    self
  }

  /// Get a node by name.
  pub fn get_node(&self, name: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.name == name)
  }
}
