//! Reference paths and the node-result lookup strategies.
//!
//! A reference such as `Fetch.result.items[0]['display name']` is parsed into a
//! head (`Fetch`) and a list of [`Segment`]s. Node references are looked up in
//! the node's [`NodeResult`] through [`PATH_STRATEGIES`], first hit wins.

use serde_json::Value;
use weft_task_runtime::NodeResult;

use crate::error::ResolutionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Object key. Numeric keys also index arrays.
  Key(String),
  /// Bracketed index. Negative values count from the end.
  Index(i64),
}

impl Segment {
  fn as_key(&self) -> std::borrow::Cow<'_, str> {
    match self {
      Segment::Key(key) => key.as_str().into(),
      Segment::Index(i) => i.to_string().into(),
    }
  }
}

/// Parse a dotted/bracketed path into segments.
///
/// Accepts `a.b`, `a.0`, `a[0]`, `a[-1]`, `a['x y']` and `a["x y"]`.
pub fn parse_path(text: &str) -> Result<Vec<Segment>, ResolutionError> {
  let empty_segment = || ResolutionError::syntax(format!("empty path segment in '{text}'"));
  let mut segments = Vec::new();
  let mut current = String::new();
  // Set after `]` until the next `.` or `[`
  let mut after_bracket = false;
  let mut pending_dot = false;
  let mut chars = text.trim().chars();

  while let Some(c) = chars.next() {
    match c {
      '.' => {
        if !current.is_empty() {
          segments.push(Segment::Key(std::mem::take(&mut current)));
        } else if !after_bracket {
          return Err(empty_segment());
        }
        after_bracket = false;
        pending_dot = true;
      }
      '[' => {
        if !current.is_empty() {
          segments.push(Segment::Key(std::mem::take(&mut current)));
        } else if segments.is_empty() || pending_dot {
          return Err(ResolutionError::syntax(format!("misplaced '[' in '{text}'")));
        }
        let mut inner = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
          if c == ']' && !in_quotes(&inner) {
            closed = true;
            break;
          }
          inner.push(c);
        }
        if !closed {
          return Err(ResolutionError::syntax(format!("unclosed '[' in '{text}'")));
        }
        segments.push(bracket_segment(inner.trim(), text)?);
        after_bracket = true;
        pending_dot = false;
      }
      c if c.is_whitespace() => {
        return Err(ResolutionError::syntax(format!("unexpected whitespace in path '{text}'")));
      }
      c => {
        if after_bracket {
          return Err(ResolutionError::syntax(format!("expected '.' after ']' in '{text}'")));
        }
        current.push(c);
        pending_dot = false;
      }
    }
  }

  if !current.is_empty() {
    segments.push(Segment::Key(current));
  } else if segments.is_empty() || pending_dot {
    return Err(empty_segment());
  }
  Ok(segments)
}

fn in_quotes(text: &str) -> bool {
  let Some(quote) = text.trim_start().chars().next().filter(|c| *c == '\'' || *c == '"') else {
    return false;
  };
  let body = text.trim_start();
  body.len() == 1 || !body[1..].contains(quote)
}

fn bracket_segment(inner: &str, text: &str) -> Result<Segment, ResolutionError> {
  for quote in ['\'', '"'] {
    if inner.len() >= 2 && inner.starts_with(quote) && inner.ends_with(quote) {
      return Ok(Segment::Key(inner[1..inner.len() - 1].to_string()));
    }
  }
  inner
    .parse::<i64>()
    .map(Segment::Index)
    .map_err(|_| ResolutionError::syntax(format!("invalid index '[{inner}]' in '{text}'")))
}

/// Render segments back into dotted form for error messages.
pub fn display_path(segments: &[Segment]) -> String {
  let mut out = String::new();
  for segment in segments {
    match segment {
      Segment::Key(key) => {
        if !out.is_empty() {
          out.push('.');
        }
        out.push_str(key);
      }
      Segment::Index(i) => out.push_str(&format!("[{i}]")),
    }
  }
  out
}

/// Walk `path` into `value`.
pub fn lookup<'v>(value: &'v Value, path: &[Segment]) -> Option<&'v Value> {
  path.iter().try_fold(value, |current, segment| step(current, segment))
}

fn step<'v>(value: &'v Value, segment: &Segment) -> Option<&'v Value> {
  match (value, segment) {
    (Value::Object(fields), segment) => fields.get(segment.as_key().as_ref()),
    (Value::Array(items), Segment::Index(i)) => index(items, *i),
    (Value::Array(items), Segment::Key(key)) => key.parse::<i64>().ok().and_then(|i| index(items, i)),
    _ => None,
  }
}

fn index(items: &[Value], i: i64) -> Option<&Value> {
  let position = if i < 0 {
    items.len().checked_sub(i.unsigned_abs() as usize)?
  } else {
    i as usize
  };
  items.get(position)
}

pub type PathStrategy = fn(&NodeResult, &[Segment]) -> Option<Value>;

/// Lookup strategies for `NODE.path` references, tried in order.
pub const PATH_STRATEGIES: [(&str, PathStrategy); 4] = [
  ("exact", exact),
  ("strip_result", strip_result),
  ("prepend_result", prepend_result),
  ("flat", flat),
];

/// Resolve a path in a node result, trying each strategy in order.
pub fn resolve_in_result(result: &NodeResult, path: &[Segment]) -> Option<Value> {
  PATH_STRATEGIES.iter().find_map(|(name, strategy)| {
    let found = strategy(result, path);
    if found.is_some() {
      tracing::trace!(strategy = *name, path = %display_path(path), "path resolved");
    }
    found
  })
}

fn is_result_segment(segment: Option<&Segment>) -> bool {
  matches!(segment, Some(Segment::Key(key)) if key == "result")
}

/// The path as given, relative to the payload.
fn exact(result: &NodeResult, path: &[Segment]) -> Option<Value> {
  lookup(&result.result, path).cloned()
}

/// `result.x` means `x` in the payload.
fn strip_result(result: &NodeResult, path: &[Segment]) -> Option<Value> {
  if !is_result_segment(path.first()) {
    return None;
  }
  lookup(&result.result, &path[1..]).cloned()
}

/// `x` means `result.x` for payloads that nest their own `result` field.
fn prepend_result(result: &NodeResult, path: &[Segment]) -> Option<Value> {
  if path.is_empty() || is_result_segment(path.first()) {
    return None;
  }
  let nested = result.result.get("result")?;
  lookup(nested, path).cloned()
}

/// Payload fields plus `status` and `message` in one bag. A dotted path is
/// tried as a single literal key before being walked.
fn flat(result: &NodeResult, path: &[Segment]) -> Option<Value> {
  let bag = Value::Object(result.flatten());
  if path.len() > 1 && path.iter().all(|s| matches!(s, Segment::Key(_))) {
    let joined = display_path(path);
    if let Some(value) = bag.get(&joined) {
      return Some(value.clone());
    }
  }
  lookup(&bag, path).cloned()
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use weft_task_runtime::NodeStatus;

  use super::*;

  fn key(k: &str) -> Segment {
    Segment::Key(k.to_string())
  }

  #[test]
  fn test_parse_path_forms() {
    assert_eq!(parse_path("a.b").unwrap(), vec![key("a"), key("b")]);
    assert_eq!(parse_path("a.0").unwrap(), vec![key("a"), key("0")]);
    assert_eq!(
      parse_path("a[0].b").unwrap(),
      vec![key("a"), Segment::Index(0), key("b")]
    );
    assert_eq!(
      parse_path("a['x y'][-1]").unwrap(),
      vec![key("a"), key("x y"), Segment::Index(-1)]
    );
    assert_eq!(parse_path("a[\"k.j\"]").unwrap(), vec![key("a"), key("k.j")]);
  }

  #[test]
  fn test_parse_path_rejects_malformed() {
    assert!(parse_path("").is_err());
    assert!(parse_path("a..b").is_err());
    assert!(parse_path("a.").is_err());
    assert!(parse_path("a[0").is_err());
    assert!(parse_path("a[x]").is_err());
    assert!(parse_path("a b").is_err());
  }

  #[test]
  fn test_lookup_arrays_and_negative_index() {
    let value = json!({"items": [{"v": 1}, {"v": 2}]});
    assert_eq!(lookup(&value, &parse_path("items.1.v").unwrap()), Some(&json!(2)));
    assert_eq!(lookup(&value, &parse_path("items[-1].v").unwrap()), Some(&json!(2)));
    assert_eq!(lookup(&value, &parse_path("items[5]").unwrap()), None);
    assert_eq!(lookup(&value, &parse_path("items[-3]").unwrap()), None);
  }

  #[test]
  fn test_strategy_exact() {
    let result = NodeResult::success(json!({"value": 42}));
    assert_eq!(resolve_in_result(&result, &[key("value")]), Some(json!(42)));
  }

  #[test]
  fn test_strategy_strip_result() {
    let result = NodeResult::success(json!({"value": 42}));
    assert_eq!(
      resolve_in_result(&result, &[key("result"), key("value")]),
      Some(json!(42))
    );
    assert_eq!(resolve_in_result(&result, &[key("result")]), Some(json!({"value": 42})));
  }

  #[test]
  fn test_strategy_prepend_result() {
    let result = NodeResult::success(json!({"result": {"value": 7}}));
    assert_eq!(resolve_in_result(&result, &[key("value")]), Some(json!(7)));
  }

  #[test]
  fn test_strategy_flat_bag() {
    let result = NodeResult {
      status: NodeStatus::Warning,
      message: Some("partial".to_string()),
      result: json!({"a.b": "literal", "a": {"b": "nested"}}),
    };
    assert_eq!(resolve_in_result(&result, &[key("status")]), Some(json!("warning")));
    assert_eq!(resolve_in_result(&result, &[key("message")]), Some(json!("partial")));
    // Exact wins over the literal dotted key
    assert_eq!(
      resolve_in_result(&result, &[key("a"), key("b")]),
      Some(json!("nested"))
    );
    let only_literal = NodeResult::success(json!({"a.b": "literal"}));
    assert_eq!(
      resolve_in_result(&only_literal, &[key("a"), key("b")]),
      Some(json!("literal"))
    );
  }

  #[test]
  fn test_null_is_defined() {
    let result = NodeResult::success(json!({"value": null}));
    assert_eq!(resolve_in_result(&result, &[key("value")]), Some(Value::Null));
    assert_eq!(resolve_in_result(&result, &[key("missing")]), None);
  }
}
