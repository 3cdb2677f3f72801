//! Type coercion for resolved top-level parameters.

use serde_json::{Number, Value};

/// Parameter names containing one of these are parsed as JSON eagerly.
const STRUCTURED_KEY_HINTS: [&str; 3] = ["data", "messages", "config"];

/// Coerce a resolved top-level parameter value.
///
/// Only strings change: `true`/`false` become booleans, numeric text becomes a
/// number, and `{..}`/`[..]` text that parses as JSON becomes a structure.
pub fn coerce_param(key: &str, value: Value) -> Value {
  let Value::String(text) = value else {
    return value;
  };

  let lowered = key.to_lowercase();
  if STRUCTURED_KEY_HINTS.iter().any(|hint| lowered.contains(hint))
    && let Ok(parsed) = serde_json::from_str::<Value>(text.trim())
  {
    return parsed;
  }

  coerce_str(&text).unwrap_or(Value::String(text))
}

/// Typed form of a string, if it has one.
pub fn coerce_str(text: &str) -> Option<Value> {
  let trimmed = text.trim();
  if trimmed.eq_ignore_ascii_case("true") {
    return Some(Value::Bool(true));
  }
  if trimmed.eq_ignore_ascii_case("false") {
    return Some(Value::Bool(false));
  }
  if looks_integer(trimmed)
    && let Ok(i) = trimmed.parse::<i64>()
  {
    return Some(Value::from(i));
  }
  if looks_decimal(trimmed) {
    return trimmed
      .parse::<f64>()
      .ok()
      .and_then(Number::from_f64)
      .map(Value::Number);
  }
  let structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
    || (trimmed.starts_with('[') && trimmed.ends_with(']'));
  if structured {
    return serde_json::from_str(trimmed).ok();
  }
  None
}

fn digits(text: &str) -> bool {
  !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn strip_sign(text: &str) -> &str {
  text.strip_prefix(['+', '-']).unwrap_or(text)
}

fn looks_integer(text: &str) -> bool {
  digits(strip_sign(text))
}

fn looks_decimal(text: &str) -> bool {
  let body = strip_sign(text);
  let (mantissa, exponent) = match body.find(['e', 'E']) {
    Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
    None => (body, None),
  };
  let mantissa_ok = match mantissa.split_once('.') {
    Some((whole, frac)) => {
      (whole.is_empty() || digits(whole))
        && (frac.is_empty() || digits(frac))
        && !(whole.is_empty() && frac.is_empty())
    }
    None => digits(mantissa),
  };
  let exponent_ok = exponent.is_none_or(|e| digits(strip_sign(e)));
  mantissa_ok && exponent_ok && (mantissa.contains('.') || exponent.is_some())
}
