//! Helpers for treating JSON values as template values.

use serde_json::{Number, Value};

/// Text form used when a value is interpolated into a larger string.
///
/// Strings are inserted raw, `null` renders as nothing, structures as compact JSON.
pub fn to_display(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    other => other.to_string(),
  }
}

/// `null`, `""`, `[]` and `{}` are empty. `0` and `false` are not.
pub fn is_empty(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(fields) => fields.is_empty(),
    _ => false,
  }
}

pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => {
      let s = s.trim();
      !(s.is_empty()
        || s.eq_ignore_ascii_case("false")
        || s == "0"
        || s.eq_ignore_ascii_case("no")
        || s.eq_ignore_ascii_case("none"))
    }
    other => !is_empty(other),
  }
}

/// Numeric view of a value. Numeric strings count.
pub fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    _ => None,
  }
}

/// Build a JSON number, keeping integral values as integers.
pub fn number_value(f: f64) -> Value {
  if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
    Value::Number(Number::from(f as i64))
  } else {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_display() {
    assert_eq!(to_display(&json!(null)), "");
    assert_eq!(to_display(&json!("x")), "x");
    assert_eq!(to_display(&json!(1.5)), "1.5");
    assert_eq!(to_display(&json!([1, 2])), "[1,2]");
  }

  #[test]
  fn test_emptiness_and_truthiness() {
    assert!(is_empty(&json!("")));
    assert!(is_empty(&json!({})));
    assert!(!is_empty(&json!(0)));
    assert!(!is_empty(&json!(false)));

    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("false")));
    assert!(is_truthy(&json!("yes")));
    assert!(is_truthy(&json!([0])));
  }

  #[test]
  fn test_number_value_keeps_integers() {
    assert_eq!(number_value(136.0), json!(136));
    assert_eq!(number_value(2.5), json!(2.5));
    assert_eq!(number_value(f64::NAN), Value::Null);
  }
}
