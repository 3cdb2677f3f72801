use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use weft_config::{FlowDef, NodeDef, ParamMap, Settings};
use weft_task_runtime::{ExecutorRegistry, NodeKind};

use crate::error::ValidationError;
use crate::graph::Graph;
use crate::route::RouteBinding;

/// A validated flow ready for execution.
///
/// Immutable once loaded. Runs share it behind an `Arc`; reloading a flow
/// builds a new `Workflow` and swaps it in whole.
#[derive(Debug, Clone)]
pub struct Workflow {
  name: String,
  description: String,
  start_node: String,
  parameters: ParamMap,
  environment: HashSet<String>,
  settings: Settings,
  nodes: HashMap<String, NodeDef>,
  node_order: Vec<String>,
  edges: BTreeMap<String, Vec<String>>,
  kinds: HashMap<String, NodeKind>,
  graph: Graph,
  routes: Vec<RouteBinding>,
}

impl Workflow {
  /// Validate a definition against the registry and build the workflow.
  pub fn load(def: FlowDef, registry: &ExecutorRegistry) -> Result<Self, ValidationError> {
    let mut nodes = HashMap::with_capacity(def.nodes.len());
    let mut node_order = Vec::with_capacity(def.nodes.len());
    for node in def.nodes {
      if nodes.contains_key(&node.name) {
        return Err(ValidationError::DuplicateNode(node.name));
      }
      node_order.push(node.name.clone());
      nodes.insert(node.name.clone(), node);
    }

    if !nodes.contains_key(&def.start_node) {
      return Err(ValidationError::MissingStartNode(def.start_node));
    }

    validate_edges(&nodes, &def.edges)?;

    let mut kinds = HashMap::with_capacity(nodes.len());
    let mut routes = Vec::new();
    for name in &node_order {
      let node = &nodes[name];
      let executor =
        registry
          .lookup(&node.node_type)
          .ok_or_else(|| ValidationError::UnknownNodeType {
            node: node.name.clone(),
            node_type: node.node_type.clone(),
          })?;

      for param in executor.required_params() {
        if !node.params.contains_key(*param) {
          return Err(ValidationError::MissingParameter {
            node: node.name.clone(),
            param: param.to_string(),
          });
        }
      }

      if RouteBinding::is_route_node(node) {
        let binding = RouteBinding::from_node(node)?;
        if !nodes.contains_key(&binding.handler) {
          return Err(ValidationError::InvalidRoute {
            node: node.name.clone(),
            message: format!("handler '{}' does not exist", binding.handler),
          });
        }
        routes.push(binding);
      }

      kinds.insert(name.clone(), executor.kind());
    }

    let graph = Graph::new(&node_order, &def.edges);
    detect_cycle(&def.start_node, &graph, &kinds)?;

    debug!(
      flow = %def.name,
      nodes = node_order.len(),
      routes = routes.len(),
      "workflow validated"
    );

    Ok(Self {
      name: def.name,
      description: def.description,
      start_node: def.start_node,
      parameters: def.parameters,
      environment: def.environment.into_iter().collect(),
      settings: def.settings,
      nodes,
      node_order,
      edges: def.edges,
      kinds,
      graph,
      routes,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn start_node(&self) -> &str {
    &self.start_node
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn parameters(&self) -> &ParamMap {
    &self.parameters
  }

  pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
    self.parameters.get(name)
  }

  /// Whether `name` is declared as an environment-supplied value.
  pub fn declares_environment(&self, name: &str) -> bool {
    self.environment.contains(name)
  }

  /// Get a node by name.
  pub fn get_node(&self, name: &str) -> Option<&NodeDef> {
    self.nodes.get(name)
  }

  pub fn contains_node(&self, name: &str) -> bool {
    self.nodes.contains_key(name)
  }

  /// Node names in declaration order.
  pub fn node_names(&self) -> &[String] {
    &self.node_order
  }

  /// Kind of the executor backing a node.
  pub fn kind(&self, name: &str) -> NodeKind {
    self.kinds.get(name).copied().unwrap_or_default()
  }

  /// Declared successors of a node, in order.
  pub fn edges_from(&self, name: &str) -> &[String] {
    self
      .edges
      .get(name)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn routes(&self) -> &[RouteBinding] {
    &self.routes
  }

  /// Find the route serving `method` on `path`.
  pub fn route(&self, method: &str, path: &str) -> Option<&RouteBinding> {
    self.routes.iter().find(|r| r.matches(method, path))
  }
}

/// Validate that all edges reference existing nodes.
fn validate_edges(
  nodes: &HashMap<String, NodeDef>,
  edges: &BTreeMap<String, Vec<String>>,
) -> Result<(), ValidationError> {
  for (from, targets) in edges {
    if !nodes.contains_key(from) {
      return Err(ValidationError::DanglingEdge {
        from: from.clone(),
        to: targets.first().cloned().unwrap_or_default(),
      });
    }
    for to in targets {
      if !nodes.contains_key(to) {
        return Err(ValidationError::DanglingEdge {
          from: from.clone(),
          to: to.clone(),
        });
      }
    }
  }
  Ok(())
}

/// Check for cycles reachable from the start node using DFS.
///
/// Only edges leaving ordinary and key-store nodes count. A cycle closed by a
/// branching node is legal to author and is rejected when a run revisits it.
fn detect_cycle(
  start: &str,
  graph: &Graph,
  kinds: &HashMap<String, NodeKind>,
) -> Result<(), ValidationError> {
  #[derive(Clone, Copy, PartialEq)]
  enum Color {
    InProgress,
    Done,
  }

  fn follows_normal_edges(kinds: &HashMap<String, NodeKind>, name: &str) -> bool {
    matches!(
      kinds.get(name),
      Some(NodeKind::Ordinary | NodeKind::KeyStore) | None
    )
  }

  fn dfs<'a>(
    node: &'a str,
    graph: &'a Graph,
    kinds: &HashMap<String, NodeKind>,
    color: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
  ) -> Option<Vec<String>> {
    color.insert(node, Color::InProgress);
    stack.push(node);

    if follows_normal_edges(kinds, node) {
      for next in graph.successors(node) {
        match color.get(next.as_str()) {
          Some(Color::InProgress) => {
            // Back edge: report the loop from its first occurrence
            let begin = stack.iter().position(|n| *n == next).unwrap_or(0);
            let mut path: Vec<String> = stack[begin..].iter().map(|n| n.to_string()).collect();
            path.push(next.clone());
            return Some(path);
          }
          Some(Color::Done) => {}
          None => {
            if let Some(path) = dfs(next, graph, kinds, color, stack) {
              return Some(path);
            }
          }
        }
      }
    }

    stack.pop();
    color.insert(node, Color::Done);
    None
  }

  let mut color = HashMap::new();
  let mut stack = Vec::new();
  match dfs(start, graph, kinds, &mut color, &mut stack) {
    Some(path) => Err(ValidationError::CycleDetected { path }),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::{Value, json};
  use weft_task_runtime::FnExecutor;

  use super::*;

  fn registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register("set", FnExecutor::new(|_| Ok(Value::Null)));
    registry.register(
      "condition",
      FnExecutor::new(|_| Ok(json!(true))).with_kind(NodeKind::Conditional),
    );
    registry.register(
      "send",
      FnExecutor::new(|_| Ok(Value::Null)).with_required(&["channel"]),
    );
    registry.register(
      "api_route",
      FnExecutor::new(|_| Ok(Value::Null)).with_required(&["path"]),
    );
    registry
  }

  fn chain() -> FlowDef {
    FlowDef::new("chain", "Fetch")
      .with_node(NodeDef::new("Fetch", "set"))
      .with_node(NodeDef::new("Check", "condition"))
      .with_node(NodeDef::new("Alert", "set"))
      .with_node(NodeDef::new("Continue", "set"))
      .with_edge("Fetch", "Check")
      .with_edge("Check", "Alert")
      .with_edge("Check", "Continue")
  }

  #[test]
  fn test_load_valid_flow() {
    let workflow = Workflow::load(chain(), &registry()).unwrap();

    assert_eq!(workflow.name(), "chain");
    assert_eq!(workflow.start_node(), "Fetch");
    assert_eq!(workflow.node_names().len(), 4);
    assert_eq!(workflow.kind("Check"), NodeKind::Conditional);
    assert_eq!(workflow.kind("Fetch"), NodeKind::Ordinary);
    assert_eq!(
      workflow.edges_from("Check"),
      &["Alert".to_string(), "Continue".to_string()]
    );
    assert!(workflow.edges_from("Alert").is_empty());
    assert_eq!(workflow.graph().predecessors("Check"), &["Fetch".to_string()]);
  }

  #[test]
  fn test_duplicate_node() {
    let def = chain().with_node(NodeDef::new("Fetch", "set"));
    let result = Workflow::load(def, &registry());
    assert_eq!(result.unwrap_err(), ValidationError::DuplicateNode("Fetch".into()));
  }

  #[test]
  fn test_missing_start_node() {
    let mut def = chain();
    def.start_node = "Nope".to_string();
    let result = Workflow::load(def, &registry());
    assert!(matches!(result, Err(ValidationError::MissingStartNode(name)) if name == "Nope"));
  }

  #[test]
  fn test_dangling_edge_target() {
    let def = chain().with_edge("Alert", "Ghost");
    let result = Workflow::load(def, &registry());
    assert_eq!(
      result.unwrap_err(),
      ValidationError::DanglingEdge {
        from: "Alert".into(),
        to: "Ghost".into()
      }
    );
  }

  #[test]
  fn test_dangling_edge_source() {
    let def = chain().with_edge("Ghost", "Alert");
    let result = Workflow::load(def, &registry());
    assert!(matches!(result, Err(ValidationError::DanglingEdge { from, .. }) if from == "Ghost"));
  }

  #[test]
  fn test_unknown_node_type() {
    let def = chain().with_node(NodeDef::new("Mystery", "teleport"));
    let result = Workflow::load(def, &registry());
    assert!(matches!(
      result,
      Err(ValidationError::UnknownNodeType { node_type, .. }) if node_type == "teleport"
    ));
  }

  #[test]
  fn test_node_type_derived_name_is_accepted() {
    let def = chain().with_node(NodeDef::new("Other", "SetNode"));
    assert!(Workflow::load(def, &registry()).is_ok());
  }

  #[test]
  fn test_missing_mandatory_parameter() {
    let def = chain().with_node(NodeDef::new("Notify", "send"));
    let result = Workflow::load(def, &registry());
    assert_eq!(
      result.unwrap_err(),
      ValidationError::MissingParameter {
        node: "Notify".into(),
        param: "channel".into()
      }
    );

    let def = chain().with_node(NodeDef::new("Notify", "send").with_param("channel", "#ops"));
    assert!(Workflow::load(def, &registry()).is_ok());
  }

  #[test]
  fn test_cycle_through_ordinary_edges_rejected() {
    let def = FlowDef::new("loop", "a")
      .with_node(NodeDef::new("a", "set"))
      .with_node(NodeDef::new("b", "set"))
      .with_node(NodeDef::new("c", "set"))
      .with_edge("a", "b")
      .with_edge("b", "c")
      .with_edge("c", "b");

    let result = Workflow::load(def, &registry());
    assert_eq!(
      result.unwrap_err(),
      ValidationError::CycleDetected {
        path: vec!["b".into(), "c".into(), "b".into()]
      }
    );
  }

  #[test]
  fn test_cycle_through_conditional_allowed() {
    let def = FlowDef::new("retry-loop", "a")
      .with_node(NodeDef::new("a", "set"))
      .with_node(NodeDef::new("check", "condition"))
      .with_node(NodeDef::new("done", "set"))
      .with_edge("a", "check")
      .with_edge("check", "a")
      .with_edge("check", "done");

    assert!(Workflow::load(def, &registry()).is_ok());
  }

  #[test]
  fn test_unreachable_cycle_is_ignored() {
    let def = chain()
      .with_node(NodeDef::new("x", "set"))
      .with_node(NodeDef::new("y", "set"))
      .with_edge("x", "y")
      .with_edge("y", "x");
    assert!(Workflow::load(def, &registry()).is_ok());
  }

  #[test]
  fn test_environment_and_parameters() {
    let def = chain()
      .with_environment("API_TOKEN")
      .with_parameter("threshold", 100);
    let workflow = Workflow::load(def, &registry()).unwrap();

    assert!(workflow.declares_environment("API_TOKEN"));
    assert!(!workflow.declares_environment("HOME"));
    assert_eq!(workflow.parameter("threshold"), Some(&json!(100)));
  }

  #[test]
  fn test_routes_collected() {
    let def = chain().with_node(
      NodeDef::new("Hook", "api_route")
        .with_param("path", "/alerts")
        .with_param("method", "post")
        .with_param("handler", "Check"),
    );
    let workflow = Workflow::load(def, &registry()).unwrap();

    assert_eq!(workflow.routes().len(), 1);
    let route = workflow.route("POST", "/alerts").unwrap();
    assert_eq!(route.node, "Hook");
    assert_eq!(route.method, "POST");
    assert_eq!(route.handler, "Check");
    assert!(workflow.route("GET", "/alerts").is_none());
  }

  #[test]
  fn test_route_with_unknown_handler() {
    let def = chain().with_node(
      NodeDef::new("Hook", "api_route")
        .with_param("path", "/alerts")
        .with_param("handler", "Ghost"),
    );
    let result = Workflow::load(def, &registry());
    assert!(matches!(result, Err(ValidationError::InvalidRoute { node, .. }) if node == "Hook"));
  }

  #[test]
  fn test_route_path_must_be_absolute() {
    let def = chain().with_node(NodeDef::new("Hook", "api_route").with_param("path", "alerts"));
    let result = Workflow::load(def, &registry());
    assert!(matches!(result, Err(ValidationError::InvalidRoute { .. })));
  }
}
