//! Branching executors: two-way conditions and multi-way switches.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use weft_resolver::{as_number, expression, is_truthy, to_display};
use weft_task_runtime::{ExecutorError, NodeExecutor, NodeInput, NodeKind};

use crate::success;

/// Evaluates to a boolean; the first edge is taken when true, the second
/// when false.
///
/// Accepts `condition` (a boolean, or an expression evaluated with the other
/// parameters in scope) or `left`/`operator`/`right`.
pub struct ConditionNode;

fn compare(left: &Value, operator: &str, right: &Value) -> Result<bool, ExecutorError> {
  let numeric = as_number(left).zip(as_number(right));
  let outcome = match operator.trim() {
    "==" | "eq" | "equals" => match numeric {
      Some((l, r)) => l == r,
      None => left == right || to_display(left) == to_display(right),
    },
    "!=" | "ne" | "not_equals" => !compare(left, "==", right)?,
    "<" | "lt" | ">" | "gt" | "<=" | "le" | ">=" | "ge" => {
      let ordering = match numeric {
        Some((l, r)) => l.partial_cmp(&r),
        None => Some(to_display(left).cmp(&to_display(right))),
      };
      let Some(ordering) = ordering else {
        return Ok(false);
      };
      match operator.trim() {
        "<" | "lt" => ordering.is_lt(),
        ">" | "gt" => ordering.is_gt(),
        "<=" | "le" => ordering.is_le(),
        _ => ordering.is_ge(),
      }
    }
    "contains" => match left {
      Value::Array(items) => items.contains(right),
      Value::Object(fields) => fields.contains_key(&to_display(right)),
      other => to_display(other).contains(&to_display(right)),
    },
    "in" => compare(right, "contains", left)?,
    other => {
      return Err(ExecutorError::invalid_params(format!("unknown operator '{other}'")));
    }
  };
  Ok(outcome)
}

#[async_trait]
impl NodeExecutor for ConditionNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    let outcome = match input.param("condition") {
      Some(Value::Bool(b)) => *b,
      Some(Value::String(text)) => {
        let scope = Value::Object(input.params.clone());
        expression::evaluate_condition(text, &scope)
          .map_err(|e| ExecutorError::failed(e.to_string()))?
      }
      Some(other) => is_truthy(other),
      None => {
        let operator = input.require_str("operator")?;
        compare(input.require("left")?, operator, input.require("right")?)?
      }
    };
    debug!(node = %input.node_name, outcome, "condition evaluated");
    Ok(success(Value::Bool(outcome)))
  }

  fn kind(&self) -> NodeKind {
    NodeKind::Conditional
  }
}

/// Picks one successor by matching `value` against `cases`.
///
/// `cases` is either an object mapping values to node names, or a list of
/// `{"value": .., "node": ..}` entries. Without a match, `default` is used.
pub struct SwitchNode;

fn case_matches(value: &Value, candidate: &Value) -> bool {
  value == candidate || to_display(value) == to_display(candidate)
}

fn select(value: &Value, cases: &Value) -> Result<Option<String>, ExecutorError> {
  match cases {
    Value::Object(map) => Ok(
      map
        .iter()
        .find(|(candidate, _)| to_display(value) == **candidate)
        .map(|(_, target)| to_display(target)),
    ),
    Value::Array(entries) => {
      for entry in entries {
        let candidate = entry.get("value").or_else(|| entry.get("when"));
        let target = entry.get("node").or_else(|| entry.get("target"));
        let (Some(candidate), Some(target)) = (candidate, target) else {
          return Err(ExecutorError::invalid_params(format!(
            "switch case must have 'value' and 'node': {entry}"
          )));
        };
        if case_matches(value, candidate) {
          return Ok(Some(to_display(target)));
        }
      }
      Ok(None)
    }
    Value::Null => Ok(None),
    other => Err(ExecutorError::invalid_params(format!(
      "parameter 'cases' must be an object or list, got {other}"
    ))),
  }
}

#[async_trait]
impl NodeExecutor for SwitchNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    let value = input.param("value").cloned().unwrap_or(Value::Null);
    let cases = input.param("cases").cloned().unwrap_or(Value::Null);

    let selected = match select(&value, &cases)? {
      Some(node) => node,
      None => match input.param("default") {
        Some(Value::String(node)) if !node.is_empty() => node.clone(),
        _ => {
          return Err(ExecutorError::failed(format!(
            "no case matched {value} and no default is set"
          )));
        }
      },
    };
    debug!(node = %input.node_name, selected = %selected, "switch selected");
    Ok(success(json!({ "selected_node": selected, "value": value })))
  }

  fn kind(&self) -> NodeKind {
    NodeKind::MultiWay
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::input;

  async fn condition(params: Value) -> Result<Value, ExecutorError> {
    ConditionNode.execute(input(params)).await
  }

  #[tokio::test]
  async fn test_condition_expression() {
    let out = condition(json!({"condition": "42 < 100"})).await.unwrap();
    assert_eq!(out["result"], json!(true));
    let out = condition(json!({"condition": "value < limit", "value": 500, "limit": 100}))
      .await
      .unwrap();
    assert_eq!(out["result"], json!(false));
    let out = condition(json!({"condition": true})).await.unwrap();
    assert_eq!(out["result"], json!(true));
  }

  #[tokio::test]
  async fn test_condition_operands() {
    let out = condition(json!({"left": "10", "operator": ">", "right": 9})).await.unwrap();
    assert_eq!(out["result"], json!(true));
    let out = condition(json!({"left": ["a", "b"], "operator": "contains", "right": "b"}))
      .await
      .unwrap();
    assert_eq!(out["result"], json!(true));
    let out = condition(json!({"left": "x", "operator": "in", "right": "xyz"})).await.unwrap();
    assert_eq!(out["result"], json!(true));
    let err = condition(json!({"left": 1, "operator": "~", "right": 2})).await.unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidParams { .. }));
  }

  #[tokio::test]
  async fn test_switch_object_cases() {
    let params = json!({"value": "b", "cases": {"a": "NodeA", "b": "NodeB"}, "default": "Other"});
    let out = SwitchNode.execute(input(params)).await.unwrap();
    assert_eq!(out["result"]["selected_node"], json!("NodeB"));
  }

  #[tokio::test]
  async fn test_switch_list_cases_and_default() {
    let cases = json!([{"value": 1, "node": "One"}, {"value": 2, "node": "Two"}]);
    let out = SwitchNode
      .execute(input(json!({"value": "2", "cases": cases.clone()})))
      .await
      .unwrap();
    assert_eq!(out["result"]["selected_node"], json!("Two"));

    let out = SwitchNode
      .execute(input(json!({"value": 9, "cases": cases.clone(), "default": "Fallback"})))
      .await
      .unwrap();
    assert_eq!(out["result"]["selected_node"], json!("Fallback"));

    let err = SwitchNode
      .execute(input(json!({"value": 9, "cases": cases})))
      .await
      .unwrap_err();
    assert!(matches!(err, ExecutorError::Failed { .. }));
  }
}
