use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ParamMap;
use crate::settings::seconds_to_duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub name: String,
  /// Executor identifier, matched case-insensitively against the registry.
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(default)]
  pub params: ParamMap,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_seconds: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retries: Option<u32>,
}

impl NodeDef {
  /// Build a node with no parameters or overrides.
  pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      node_type: node_type.into(),
      label: None,
      params: ParamMap::new(),
      timeout_seconds: None,
      max_retries: None,
    }
  }

  /// Add a raw parameter.
  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  /// Per-node timeout override.
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_seconds.and_then(seconds_to_duration)
  }

  /// The label if one was authored, otherwise the name.
  pub fn display_name(&self) -> &str {
    self.label.as_deref().unwrap_or(&self.name)
  }
}
