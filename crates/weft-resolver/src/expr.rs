//! Parsing of the text between `{{` and `}}`.
//!
//! ```text
//! expression := operand ('|' segment)*
//! segment    := filter | operand
//! filter     := NAME | NAME '(' literal (',' literal)* ')'
//! operand    := literal | reference
//! ```
//!
//! A pipe segment naming a registered filter transforms the operand before
//! it. Any other segment starts a new fallback operand, so
//! `{{ a | upper | b | default('x') }}` is "`a` uppercased, else `b` with a
//! default".

use serde_json::Value;

use crate::error::ResolutionError;
use crate::filters::FilterRegistry;
use crate::path::{Segment, parse_path};

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
  /// Fallback alternatives in order.
  pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
  pub term: Term,
  pub filters: Vec<FilterCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
  Literal(Value),
  Reference(Reference),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
  /// First path segment: a scope (`params`, `input`, ...), a node, a
  /// parameter or a loop variable.
  pub head: String,
  pub path: Vec<Segment>,
  /// Source text, for error messages.
  pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
  pub name: String,
  pub args: Vec<Value>,
}

impl Expression {
  pub fn parse(text: &str, filters: &FilterRegistry) -> Result<Self, ResolutionError> {
    let segments = split_top_level(text, '|')?;
    let mut operands: Vec<Operand> = Vec::new();

    for segment in segments {
      let segment = segment.trim();
      if segment.is_empty() {
        return Err(ResolutionError::syntax(format!("empty segment in '{}'", text.trim())));
      }
      if let Some(operand) = operands.last_mut()
        && let Some(call) = parse_filter_call(segment, filters)?
      {
        operand.filters.push(call);
        continue;
      }
      operands.push(Operand {
        term: parse_term(segment)?,
        filters: Vec::new(),
      });
    }

    if operands.is_empty() {
      return Err(ResolutionError::syntax("empty expression"));
    }
    Ok(Self { operands })
  }
}

fn parse_term(text: &str) -> Result<Term, ResolutionError> {
  if let Some(literal) = parse_literal(text) {
    return Ok(Term::Literal(literal));
  }
  let mut path = parse_path(text)?;
  let head = match path.remove(0) {
    Segment::Key(head) => head,
    Segment::Index(_) => return Err(ResolutionError::syntax(format!("invalid reference '{text}'"))),
  };
  Ok(Term::Reference(Reference {
    head,
    path,
    text: text.to_string(),
  }))
}

/// `Some` if `segment` names a registered filter.
fn parse_filter_call(
  segment: &str,
  filters: &FilterRegistry,
) -> Result<Option<FilterCall>, ResolutionError> {
  let (name, rest) = match segment.find('(') {
    Some(pos) => (segment[..pos].trim(), Some(&segment[pos..])),
    None => (segment, None),
  };
  if !is_identifier(name) || !filters.contains(name) {
    return Ok(None);
  }

  let args = match rest {
    None => Vec::new(),
    Some(rest) => {
      let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| ResolutionError::syntax(format!("malformed filter call '{segment}'")))?;
      if inner.trim().is_empty() {
        Vec::new()
      } else {
        split_top_level(inner, ',')?
          .into_iter()
          .map(|arg| {
            let arg = arg.trim();
            parse_literal(arg).unwrap_or_else(|| Value::String(arg.to_string()))
          })
          .collect()
      }
    }
  };

  Ok(Some(FilterCall {
    name: name.to_string(),
    args,
  }))
}

fn is_identifier(text: &str) -> bool {
  let mut chars = text.chars();
  chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a quoted string, number, `true`, `false` or `null`/`none`.
pub fn parse_literal(text: &str) -> Option<Value> {
  let text = text.trim();
  match text {
    "true" => return Some(Value::Bool(true)),
    "false" => return Some(Value::Bool(false)),
    "null" | "none" => return Some(Value::Null),
    _ => {}
  }
  if let Some(quoted) = parse_quoted(text) {
    return Some(Value::String(quoted));
  }
  let numeric = text
    .strip_prefix('-')
    .unwrap_or(text)
    .chars()
    .next()
    .is_some_and(|c| c.is_ascii_digit());
  if numeric {
    if let Ok(i) = text.parse::<i64>() {
      return Some(Value::from(i));
    }
    return text
      .parse::<f64>()
      .ok()
      .and_then(serde_json::Number::from_f64)
      .map(Value::Number);
  }
  None
}

fn parse_quoted(text: &str) -> Option<String> {
  let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
  if text.len() < 2 || !text.ends_with(quote) {
    return None;
  }
  let body = &text[1..text.len() - 1];
  let mut out = String::with_capacity(body.len());
  let mut chars = body.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.next() {
        Some('n') => out.push('\n'),
        Some('t') => out.push('\t'),
        Some(other) => out.push(other),
        None => return None,
      },
      c if c == quote => return None,
      c => out.push(c),
    }
  }
  Some(out)
}

/// Split on `sep` outside quotes, parentheses and brackets.
pub(crate) fn split_top_level(text: &str, sep: char) -> Result<Vec<&str>, ResolutionError> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut quote: Option<char> = None;
  let mut escaped = false;
  let mut start = 0;

  for (i, c) in text.char_indices() {
    if let Some(q) = quote {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == q {
        quote = None;
      }
      continue;
    }
    match c {
      '\'' | '"' => quote = Some(c),
      '(' | '[' => depth += 1,
      ')' | ']' => {
        depth = depth
          .checked_sub(1)
          .ok_or_else(|| ResolutionError::syntax(format!("unbalanced '{c}' in '{text}'")))?;
      }
      c if c == sep && depth == 0 => {
        parts.push(&text[start..i]);
        start = i + c.len_utf8();
      }
      _ => {}
    }
  }
  if quote.is_some() {
    return Err(ResolutionError::syntax(format!("unterminated string in '{text}'")));
  }
  if depth != 0 {
    return Err(ResolutionError::syntax(format!("unbalanced brackets in '{text}'")));
  }
  parts.push(&text[start..]);
  Ok(parts)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn parse(text: &str) -> Expression {
    Expression::parse(text, &FilterRegistry::with_builtins()).unwrap()
  }

  fn reference(term: &Term) -> &Reference {
    match term {
      Term::Reference(r) => r,
      other => panic!("expected reference, got {other:?}"),
    }
  }

  #[test]
  fn test_single_reference() {
    let expr = parse(" Fetch.result.value ");
    assert_eq!(expr.operands.len(), 1);
    let r = reference(&expr.operands[0].term);
    assert_eq!(r.head, "Fetch");
    assert_eq!(r.path.len(), 2);
  }

  #[test]
  fn test_filters_attach_to_preceding_operand() {
    let expr = parse("name | upper | truncate(3, '..')");
    assert_eq!(expr.operands.len(), 1);
    let filters = &expr.operands[0].filters;
    assert_eq!(filters[0].name, "upper");
    assert_eq!(filters[1].args, vec![json!(3), json!("..")]);
  }

  #[test]
  fn test_non_filter_segments_are_fallbacks() {
    let expr = parse("primary.value | backup.value | 'none left'");
    assert_eq!(expr.operands.len(), 3);
    assert_eq!(expr.operands[2].term, Term::Literal(json!("none left")));
  }

  #[test]
  fn test_pipes_inside_strings_do_not_split() {
    let expr = parse("a | default('x | y')");
    assert_eq!(expr.operands.len(), 1);
    assert_eq!(expr.operands[0].filters[0].args, vec![json!("x | y")]);
  }

  #[test]
  fn test_literals() {
    assert_eq!(parse_literal("'it\\'s'"), Some(json!("it's")));
    assert_eq!(parse_literal("-3"), Some(json!(-3)));
    assert_eq!(parse_literal("2.5"), Some(json!(2.5)));
    assert_eq!(parse_literal("none"), Some(json!(null)));
    assert_eq!(parse_literal("value"), None);
    assert_eq!(parse_literal("'a' + 'b'"), None);
  }

  #[test]
  fn test_syntax_errors() {
    let filters = FilterRegistry::with_builtins();
    assert!(Expression::parse("", &filters).is_err());
    assert!(Expression::parse("a |", &filters).is_err());
    assert!(Expression::parse("a | default('x", &filters).is_err());
    assert!(Expression::parse("a[0", &filters).is_err());
  }
}
