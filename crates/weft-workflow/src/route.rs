//! HTTP route markers.
//!
//! A node of type [`ROUTE_NODE_TYPE`] declares an API route. An external HTTP
//! layer reads the bindings, registers the routes, and starts a run per
//! request with the request body as the run's input data. The response is the
//! result of the binding's handler node.

use serde::Serialize;
use serde_json::Value;
use weft_config::NodeDef;

use crate::error::ValidationError;

/// Node type identifier that marks a route definition.
pub const ROUTE_NODE_TYPE: &str = "api_route";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteBinding {
  /// The marker node.
  pub node: String,
  /// Upper-cased HTTP method, `POST` unless specified.
  pub method: String,
  pub path: String,
  /// Node whose result becomes the response. Defaults to the marker node.
  pub handler: String,
}

impl RouteBinding {
  pub(crate) fn is_route_node(node: &NodeDef) -> bool {
    weft_task_runtime::derive_identifier(&node.node_type)
      == weft_task_runtime::derive_identifier(ROUTE_NODE_TYPE)
  }

  pub(crate) fn from_node(node: &NodeDef) -> Result<Self, ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidRoute {
      node: node.name.clone(),
      message: message.to_string(),
    };

    let path = match node.params.get("path") {
      Some(Value::String(path)) if path.starts_with('/') => path.clone(),
      Some(Value::String(_)) => return Err(invalid("path must start with '/'")),
      _ => return Err(invalid("missing string parameter 'path'")),
    };
    let method = match node.params.get("method") {
      Some(Value::String(method)) if !method.trim().is_empty() => method.trim().to_uppercase(),
      None => "POST".to_string(),
      _ => return Err(invalid("method must be a non-empty string")),
    };
    let handler = match node.params.get("handler") {
      Some(Value::String(handler)) => handler.clone(),
      None => node.name.clone(),
      _ => return Err(invalid("handler must be a node name")),
    };

    Ok(Self {
      node: node.name.clone(),
      method,
      path,
      handler,
    })
  }

  /// Whether this binding serves `method` on `path`.
  pub fn matches(&self, method: &str, path: &str) -> bool {
    self.method.eq_ignore_ascii_case(method) && self.path == path
  }
}
