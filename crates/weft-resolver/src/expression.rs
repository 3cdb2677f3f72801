//! Evaluation of computed expressions and conditions.
//!
//! Expressions use the minijinja expression language (`a > 3 and b == 'x'`,
//! arithmetic, `in`, filters). Callers substitute resolved values in as
//! literals with [`to_literal`] or pass them as variables.

use minijinja::Environment;
use serde_json::Value;

use crate::error::ResolutionError;

fn expression_error(expression: &str, err: impl std::fmt::Display) -> ResolutionError {
  ResolutionError::Expression {
    expression: expression.to_string(),
    message: err.to_string(),
  }
}

fn eval(expression: &str, vars: &Value) -> Result<minijinja::Value, ResolutionError> {
  let env = Environment::new();
  let compiled = env
    .compile_expression(expression)
    .map_err(|e| expression_error(expression, e))?;
  compiled
    .eval(minijinja::Value::from_serialize(vars))
    .map_err(|e| expression_error(expression, e))
}

/// Evaluate an expression with `vars` (a JSON object) in scope.
pub fn evaluate(expression: &str, vars: &Value) -> Result<Value, ResolutionError> {
  let value = eval(expression, vars)?;
  if value.is_undefined() {
    return Ok(Value::Null);
  }
  serde_json::to_value(&value).map_err(|e| expression_error(expression, e))
}

/// Evaluate an expression for truthiness.
pub fn evaluate_condition(expression: &str, vars: &Value) -> Result<bool, ResolutionError> {
  Ok(eval(expression, vars)?.is_true())
}

/// Render a value as an expression literal.
pub fn to_literal(value: &Value) -> String {
  match value {
    Value::Null => "none".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    // JSON string escapes are valid expression string escapes
    Value::String(s) => Value::String(s.clone()).to_string(),
    Value::Array(items) => {
      let items: Vec<String> = items.iter().map(to_literal).collect();
      format!("[{}]", items.join(", "))
    }
    Value::Object(fields) => {
      let fields: Vec<String> = fields
        .iter()
        .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), to_literal(v)))
        .collect();
      format!("{{{}}}", fields.join(", "))
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_evaluate_arithmetic() {
    assert_eq!(evaluate("a + b", &json!({"a": 47, "b": 89})).unwrap(), json!(136));
    assert_eq!(evaluate("x * 2", &json!({"x": 1.5})).unwrap(), json!(3.0));
  }

  #[test]
  fn test_evaluate_condition() {
    assert!(evaluate_condition("42 < 100", &json!({})).unwrap());
    assert!(!evaluate_condition("status == 'ok'", &json!({"status": "bad"})).unwrap());
    assert!(evaluate_condition("'a' in items", &json!({"items": ["a"]})).unwrap());
  }

  #[test]
  fn test_literals_round_trip_through_conditions() {
    let name = json!("it's \"quoted\"");
    let condition = format!("{} == name", to_literal(&name));
    assert!(evaluate_condition(&condition, &json!({"name": name})).unwrap());
    assert!(evaluate_condition(&format!("{} is none", to_literal(&Value::Null)), &json!({})).unwrap());
    assert_eq!(to_literal(&json!({"a": [1, true]})), r#"{"a": [1, true]}"#);
  }

  #[test]
  fn test_syntax_error() {
    let err = evaluate("1 +", &json!({})).unwrap_err();
    assert!(matches!(err, ResolutionError::Expression { .. }));
  }
}
