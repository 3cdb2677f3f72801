//! Node result types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome class of a single node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
  Success,
  Error,
  Warning,
}

impl NodeStatus {
  /// Parse a status string as written by executors.
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "success" => Some(Self::Success),
      "error" => Some(Self::Error),
      "warning" => Some(Self::Warning),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::Error => "error",
      Self::Warning => "warning",
    }
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Result of a single node execution.
///
/// `result` is the payload later nodes reference through `{{ node.path }}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
  pub status: NodeStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default)]
  pub result: Value,
}

impl NodeResult {
  pub fn success(result: Value) -> Self {
    Self {
      status: NodeStatus::Success,
      message: None,
      result,
    }
  }

  pub fn warning(result: Value, message: Option<String>) -> Self {
    Self {
      status: NodeStatus::Warning,
      message,
      result,
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      status: NodeStatus::Error,
      message: Some(message.into()),
      result: Value::Null,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn is_error(&self) -> bool {
    self.status == NodeStatus::Error
  }

  /// Normalize a raw executor value.
  ///
  /// An object carrying a recognized `status` keeps it; its `result` field
  /// becomes the payload, or the remaining fields if there is none. Anything
  /// without a usable status is recorded as a warning with the original value
  /// untouched under `result`.
  pub fn from_raw(raw: Value) -> Self {
    let mut fields = match raw {
      Value::Object(fields) => fields,
      other => return Self::warning(other, None),
    };

    let status = fields
      .get("status")
      .and_then(Value::as_str)
      .and_then(NodeStatus::parse);
    let Some(status) = status else {
      return Self::warning(Value::Object(fields), None);
    };

    fields.remove("status");
    let message = match fields.remove("message") {
      Some(Value::String(s)) => Some(s),
      Some(Value::Null) | None => None,
      Some(other) => Some(other.to_string()),
    };
    let result = match fields.remove("result") {
      Some(result) => result,
      None if fields.is_empty() => Value::Null,
      None => Value::Object(fields),
    };

    Self {
      status,
      message,
      result,
    }
  }

  /// The result as a flat bag: payload fields plus `status` and `message`.
  pub fn flatten(&self) -> Map<String, Value> {
    let mut bag = match &self.result {
      Value::Object(fields) => fields.clone(),
      _ => Map::new(),
    };
    bag
      .entry("status")
      .or_insert_with(|| Value::String(self.status.to_string()));
    if let Some(message) = &self.message {
      bag
        .entry("message")
        .or_insert_with(|| Value::String(message.clone()));
    }
    bag
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_status_with_result_field() {
    let result = NodeResult::from_raw(json!({
      "status": "success",
      "message": "added",
      "result": 136
    }));

    assert_eq!(result.status, NodeStatus::Success);
    assert_eq!(result.message.as_deref(), Some("added"));
    assert_eq!(result.result, json!(136));
  }

  #[test]
  fn test_status_without_result_field_keeps_other_fields() {
    let result = NodeResult::from_raw(json!({
      "status": "success",
      "selected_node": "Alert"
    }));

    assert_eq!(result.status, NodeStatus::Success);
    assert_eq!(result.result, json!({ "selected_node": "Alert" }));
  }

  #[test]
  fn test_missing_status_becomes_warning() {
    let raw = json!({ "rows": [1, 2, 3], "count": 3 });
    let result = NodeResult::from_raw(raw.clone());

    assert_eq!(result.status, NodeStatus::Warning);
    assert_eq!(result.message, None);
    assert_eq!(result.result, raw);
  }

  #[test]
  fn test_unknown_status_and_scalars_become_warning() {
    let raw = json!({ "status": "done", "value": 1 });
    assert_eq!(NodeResult::from_raw(raw.clone()).result, raw);
    assert_eq!(NodeResult::from_raw(raw).status, NodeStatus::Warning);

    let scalar = NodeResult::from_raw(json!(7));
    assert_eq!(scalar.status, NodeStatus::Warning);
    assert_eq!(scalar.result, json!(7));
  }

  #[test]
  fn test_status_is_case_insensitive() {
    let result = NodeResult::from_raw(json!({ "status": "ERROR", "message": "boom" }));
    assert_eq!(result.status, NodeStatus::Error);
    assert_eq!(result.message.as_deref(), Some("boom"));
    assert_eq!(result.result, Value::Null);
  }

  #[test]
  fn test_flatten_prefers_payload_fields() {
    let result = NodeResult::success(json!({ "value": 1, "status": "shadowed" }))
      .with_message("hello");
    let bag = result.flatten();

    assert_eq!(bag["value"], json!(1));
    assert_eq!(bag["status"], json!("shadowed"));
    assert_eq!(bag["message"], json!("hello"));
  }

  #[test]
  fn test_serialized_shape() {
    let value = serde_json::to_value(NodeResult::error("timeout")).unwrap();
    assert_eq!(
      value,
      json!({ "status": "error", "message": "timeout", "result": null })
    );
  }
}
