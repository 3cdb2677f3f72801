use async_trait::async_trait;
use serde_json::Value;
use weft_resolver::{as_number, expression, number_value};
use weft_task_runtime::{ExecutorError, NodeExecutor, NodeInput};

use crate::success;

/// Arithmetic over resolved parameters.
///
/// Either `expression` (evaluated with the other parameters in scope) or
/// `operation` applied to `values`, or to `a` and `b`. Integral results stay
/// integers.
pub struct ComputeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
  Add,
  Subtract,
  Multiply,
  Divide,
  Modulo,
  Power,
  Min,
  Max,
  Average,
}

impl Operation {
  fn parse(name: &str) -> Option<Self> {
    let op = match name.trim().to_lowercase().as_str() {
      "add" | "sum" | "+" => Self::Add,
      "subtract" | "sub" | "-" => Self::Subtract,
      "multiply" | "mul" | "*" => Self::Multiply,
      "divide" | "div" | "/" => Self::Divide,
      "modulo" | "mod" | "%" => Self::Modulo,
      "power" | "pow" | "**" => Self::Power,
      "min" => Self::Min,
      "max" => Self::Max,
      "average" | "avg" | "mean" => Self::Average,
      _ => return None,
    };
    Some(op)
  }

  fn apply(self, values: &[f64]) -> Result<f64, ExecutorError> {
    let (first, rest) = values
      .split_first()
      .ok_or_else(|| ExecutorError::invalid_params("no operands"))?;
    let folded: f64 = match self {
      Self::Add => values.iter().sum(),
      Self::Multiply => values.iter().product(),
      Self::Subtract => rest.iter().fold(*first, |acc, v| acc - v),
      Self::Min => rest.iter().fold(*first, |acc, v| acc.min(*v)),
      Self::Max => rest.iter().fold(*first, |acc, v| acc.max(*v)),
      Self::Average => values.iter().sum::<f64>() / values.len() as f64,
      Self::Power => rest.iter().fold(*first, |acc, v| acc.powf(*v)),
      Self::Divide | Self::Modulo => {
        let mut acc = *first;
        for v in rest {
          if *v == 0.0 {
            return Err(ExecutorError::invalid_params("division by zero"));
          }
          acc = if self == Self::Divide { acc / v } else { acc % v };
        }
        acc
      }
    };
    if folded.is_finite() {
      Ok(folded)
    } else {
      Err(ExecutorError::failed(format!("result of {self:?} is not finite")))
    }
  }
}

fn operand(input: &NodeInput, value: &Value, name: &str) -> Result<f64, ExecutorError> {
  as_number(value).ok_or_else(|| {
    ExecutorError::invalid_params(format!(
      "{}: operand '{name}' is not a number: {value}",
      input.node_name
    ))
  })
}

fn operands(input: &NodeInput) -> Result<Vec<f64>, ExecutorError> {
  if let Some(values) = input.param("values") {
    let Value::Array(items) = values else {
      return Err(ExecutorError::invalid_params("parameter 'values' must be a list"));
    };
    return items
      .iter()
      .enumerate()
      .map(|(i, v)| operand(input, v, &format!("values[{i}]")))
      .collect();
  }
  Ok(vec![
    operand(input, input.require("a")?, "a")?,
    operand(input, input.require("b")?, "b")?,
  ])
}

#[async_trait]
impl NodeExecutor for ComputeNode {
  async fn execute(&self, input: NodeInput) -> Result<Value, ExecutorError> {
    if let Some(text) = input.param("expression").and_then(Value::as_str) {
      let scope = Value::Object(input.params.clone());
      let value =
        expression::evaluate(text, &scope).map_err(|e| ExecutorError::failed(e.to_string()))?;
      return Ok(success(value));
    }

    let name = input.require_str("operation")?;
    let operation = Operation::parse(name)
      .ok_or_else(|| ExecutorError::invalid_params(format!("unknown operation '{name}'")))?;
    let result = operation.apply(&operands(&input)?)?;
    Ok(success(number_value(result)))
  }
}
