//! Named value transformations applied with `{{ value | filter(args) }}`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ResolutionError;
use crate::value::{as_number, is_empty, is_truthy, number_value, to_display};

/// Signature of a filter: the piped value and the literal arguments.
pub type FilterFn = dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync;

/// Filters by name. Starts with the builtin set; more can be registered.
#[derive(Clone)]
pub struct FilterRegistry {
  filters: HashMap<String, Arc<FilterFn>>,
}

impl std::fmt::Debug for FilterRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut names: Vec<&str> = self.filters.keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    f.debug_struct("FilterRegistry").field("filters", &names).finish()
  }
}

impl Default for FilterRegistry {
  fn default() -> Self {
    Self::with_builtins()
  }
}

impl FilterRegistry {
  /// A registry with no filters at all.
  pub fn empty() -> Self {
    Self {
      filters: HashMap::new(),
    }
  }

  pub fn with_builtins() -> Self {
    let mut registry = Self::empty();
    registry
      .register("upper", |v, _| Ok(Value::String(to_display(v).to_uppercase())))
      .register("lower", |v, _| Ok(Value::String(to_display(v).to_lowercase())))
      .register("capitalize", |v, _| Ok(Value::String(capitalize(&to_display(v)))))
      .register("title", |v, _| Ok(Value::String(title(&to_display(v)))))
      .register("trim", |v, _| Ok(Value::String(to_display(v).trim().to_string())))
      .register("truncate", truncate)
      .register("replace", replace)
      .register("split", split)
      .register("join", join)
      .register("first", |v, _| Ok(first_or_last(v, true)))
      .register("last", |v, _| Ok(first_or_last(v, false)))
      .register("sort", sort)
      .register("reverse", reverse)
      .register("unique", unique)
      .register("length", |v, _| Ok(Value::from(length(v))))
      .register("keys", |v, _| {
        Ok(Value::Array(
          object(v, "keys")?.keys().cloned().map(Value::String).collect(),
        ))
      })
      .register("values", |v, _| {
        Ok(Value::Array(object(v, "values")?.values().cloned().collect()))
      })
      .register("round", round)
      .register("abs", |v, _| Ok(number_value(number(v, "abs")?.abs())))
      .register("floor", |v, _| Ok(number_value(number(v, "floor")?.floor())))
      .register("ceil", |v, _| Ok(number_value(number(v, "ceil")?.ceil())))
      .register("sum", |v, _| {
        let total = numbers(v, "sum")?.into_iter().sum::<f64>();
        Ok(number_value(total))
      })
      .register("max", |v, _| Ok(extreme(numbers(v, "max")?, f64::max)))
      .register("min", |v, _| Ok(extreme(numbers(v, "min")?, f64::min)))
      .register("int", |v, _| Ok(Value::from(to_int(v)?)))
      .register("float", to_float)
      .register("string", |v, _| Ok(Value::String(to_display(v))))
      .register("bool", |v, _| Ok(Value::Bool(is_truthy(v))))
      .register("json", |v, _| {
        serde_json::to_string(v)
          .map(Value::String)
          .map_err(|e| e.to_string())
      })
      .register("default", |v, args| {
        if is_empty(v) {
          Ok(args.first().cloned().unwrap_or(Value::Null))
        } else {
          Ok(v.clone())
        }
      });
    registry
  }

  pub fn register<F>(&mut self, name: &str, filter: F) -> &mut Self
  where
    F: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
  {
    self.filters.insert(name.to_string(), Arc::new(filter));
    self
  }

  pub fn contains(&self, name: &str) -> bool {
    self.filters.contains_key(name)
  }

  pub fn apply(&self, name: &str, value: &Value, args: &[Value]) -> Result<Value, ResolutionError> {
    let filter = self.filters.get(name).ok_or_else(|| ResolutionError::Filter {
      filter: name.to_string(),
      message: "unknown filter".to_string(),
    })?;
    filter(value, args).map_err(|message| ResolutionError::Filter {
      filter: name.to_string(),
      message,
    })
  }
}

fn capitalize(text: &str) -> String {
  let mut chars = text.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
    None => String::new(),
  }
}

fn title(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut word_start = true;
  for c in text.chars() {
    if c.is_alphanumeric() {
      if word_start {
        out.extend(c.to_uppercase());
      } else {
        out.extend(c.to_lowercase());
      }
      word_start = false;
    } else {
      out.push(c);
      word_start = true;
    }
  }
  out
}

fn arg_str(args: &[Value], index: usize) -> Option<String> {
  args.get(index).map(to_display)
}

fn arg_usize(args: &[Value], index: usize, filter: &str) -> Result<Option<usize>, String> {
  match args.get(index) {
    None => Ok(None),
    Some(v) => as_number(v)
      .filter(|n| *n >= 0.0)
      .map(|n| Some(n as usize))
      .ok_or_else(|| format!("{filter} expects a non-negative number, got {v}")),
  }
}

fn truncate(value: &Value, args: &[Value]) -> Result<Value, String> {
  let text = to_display(value);
  let length = arg_usize(args, 0, "truncate")?.unwrap_or(255);
  let suffix = arg_str(args, 1).unwrap_or_else(|| "...".to_string());
  if text.chars().count() <= length {
    return Ok(Value::String(text));
  }
  let mut truncated: String = text.chars().take(length).collect();
  truncated.push_str(&suffix);
  Ok(Value::String(truncated))
}

fn replace(value: &Value, args: &[Value]) -> Result<Value, String> {
  let (Some(from), Some(to)) = (arg_str(args, 0), arg_str(args, 1)) else {
    return Err("replace expects two arguments".to_string());
  };
  Ok(Value::String(to_display(value).replace(&from, &to)))
}

fn split(value: &Value, args: &[Value]) -> Result<Value, String> {
  let text = to_display(value);
  let parts: Vec<Value> = match arg_str(args, 0) {
    Some(sep) if !sep.is_empty() => text.split(sep.as_str()).map(Value::from).collect(),
    _ => text.split_whitespace().map(Value::from).collect(),
  };
  Ok(Value::Array(parts))
}

fn join(value: &Value, args: &[Value]) -> Result<Value, String> {
  let separator = arg_str(args, 0).unwrap_or_else(|| ", ".to_string());
  let items = array(value, "join")?;
  let parts: Vec<String> = items.iter().map(to_display).collect();
  Ok(Value::String(parts.join(&separator)))
}

fn first_or_last(value: &Value, first: bool) -> Value {
  match value {
    Value::Array(items) => {
      let item = if first { items.first() } else { items.last() };
      item.cloned().unwrap_or(Value::Null)
    }
    Value::String(s) => {
      let c = if first { s.chars().next() } else { s.chars().last() };
      c.map(|c| Value::String(c.to_string())).unwrap_or(Value::Null)
    }
    _ => Value::Null,
  }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
  match (as_number(a), as_number(b)) {
    (Some(x), Some(y)) if !a.is_string() || !b.is_string() => x.total_cmp(&y),
    _ => to_display(a).cmp(&to_display(b)),
  }
}

fn sort(value: &Value, _: &[Value]) -> Result<Value, String> {
  let mut items = array(value, "sort")?.clone();
  items.sort_by(compare);
  Ok(Value::Array(items))
}

fn reverse(value: &Value, _: &[Value]) -> Result<Value, String> {
  match value {
    Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
    Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
    other => Err(format!("reverse expects a list or string, got {other}")),
  }
}

fn unique(value: &Value, _: &[Value]) -> Result<Value, String> {
  let mut seen: Vec<&Value> = Vec::new();
  for item in array(value, "unique")? {
    if !seen.contains(&item) {
      seen.push(item);
    }
  }
  Ok(Value::Array(seen.into_iter().cloned().collect()))
}

fn length(value: &Value) -> usize {
  match value {
    Value::Null => 0,
    Value::String(s) => s.chars().count(),
    Value::Array(items) => items.len(),
    Value::Object(fields) => fields.len(),
    other => to_display(other).chars().count(),
  }
}

fn round(value: &Value, args: &[Value]) -> Result<Value, String> {
  let n = number(value, "round")?;
  let digits = arg_usize(args, 0, "round")?.unwrap_or(0).min(15) as i32;
  if digits == 0 {
    return Ok(number_value(n.round()));
  }
  let factor = 10f64.powi(digits);
  let rounded = (n * factor).round() / factor;
  Ok(serde_json::Number::from_f64(rounded).map_or(Value::Null, Value::Number))
}

fn to_int(value: &Value) -> Result<i64, String> {
  match value {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
      .ok_or_else(|| format!("cannot convert {n} to int")),
    Value::Bool(b) => Ok(i64::from(*b)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .or_else(|_| s.parse::<f64>().map(|f| f.trunc() as i64))
        .map_err(|_| format!("cannot convert '{s}' to int"))
    }
    other => Err(format!("cannot convert {other} to int")),
  }
}

fn to_float(value: &Value, _: &[Value]) -> Result<Value, String> {
  as_number(value)
    .and_then(serde_json::Number::from_f64)
    .map(Value::Number)
    .ok_or_else(|| format!("cannot convert {value} to float"))
}

fn number(value: &Value, filter: &str) -> Result<f64, String> {
  as_number(value).ok_or_else(|| format!("{filter} expects a number, got {value}"))
}

fn array<'v>(value: &'v Value, filter: &str) -> Result<&'v Vec<Value>, String> {
  value
    .as_array()
    .ok_or_else(|| format!("{filter} expects a list, got {value}"))
}

fn object<'v>(value: &'v Value, filter: &str) -> Result<&'v Map<String, Value>, String> {
  value
    .as_object()
    .ok_or_else(|| format!("{filter} expects an object, got {value}"))
}

fn numbers(value: &Value, filter: &str) -> Result<Vec<f64>, String> {
  array(value, filter)?
    .iter()
    .map(|item| number(item, filter))
    .collect()
}

fn extreme(values: Vec<f64>, pick: fn(f64, f64) -> f64) -> Value {
  values.into_iter().reduce(pick).map_or(Value::Null, number_value)
}
