use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument};
use weft_config::ParamMap;
use weft_task_runtime::NodeKind;
use weft_workflow::Workflow;

use crate::coerce::coerce_param;
use crate::context::ExecutionContext;
use crate::env::EnvironmentValues;
use crate::error::ResolutionError;
use crate::expr::{Expression, Operand, Reference, Term};
use crate::expression;
use crate::filters::FilterRegistry;
use crate::path::{Segment, lookup, resolve_in_result};
use crate::template::{Piece, Template, has_markers};
use crate::value::{is_empty, is_truthy, to_display};

/// Resolves templates and parameter maps against a run's context.
///
/// Stateless apart from its configuration; all per-run state, including the
/// cache, lives in the [`ExecutionContext`] passed to each call.
///
/// Reference lookup order for `{{ name.path }}`:
/// 1. loop variables (`this`, `index`, `first`, `last`, `length`, `key`)
/// 2. scopes: `params.`/`parameters.`, `input.`, `store.`, `env.`
/// 3. node results
/// 4. workflow parameters
#[derive(Debug, Clone)]
pub struct Resolver {
  workflow: Arc<Workflow>,
  filters: Arc<FilterRegistry>,
  environment: Arc<EnvironmentValues>,
}

impl Resolver {
  pub fn new(workflow: Arc<Workflow>) -> Self {
    Self {
      workflow,
      filters: Arc::new(FilterRegistry::with_builtins()),
      environment: Arc::new(EnvironmentValues::from_process()),
    }
  }

  pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
    self.filters = Arc::new(filters);
    self
  }

  pub fn with_environment(mut self, environment: EnvironmentValues) -> Self {
    self.environment = Arc::new(environment);
    self
  }

  pub fn workflow(&self) -> &Arc<Workflow> {
    &self.workflow
  }

  pub fn filters(&self) -> &FilterRegistry {
    &self.filters
  }

  /// Resolve one template string.
  ///
  /// A template that is exactly one `{{ expression }}` yields the typed value;
  /// anything else yields a string.
  pub fn resolve_template(
    &self,
    template: &str,
    ctx: &mut ExecutionContext,
  ) -> Result<Value, ResolutionError> {
    Session::new(self, ctx).template(template)
  }

  /// Resolve every string inside `value`, recursing into arrays and objects.
  pub fn resolve_value(
    &self,
    value: &Value,
    ctx: &mut ExecutionContext,
  ) -> Result<Value, ResolutionError> {
    Session::new(self, ctx).value(value)
  }

  /// Resolve a node's parameter map. Top-level values are type-coerced.
  ///
  /// The `condition` of a conditional node keeps its expression form: each
  /// `{{ .. }}` marker is replaced by the literal of its value, so strings
  /// arrive quoted.
  #[instrument(skip_all, fields(node = %node))]
  pub fn resolve_params(
    &self,
    node: &str,
    params: &ParamMap,
    ctx: &mut ExecutionContext,
  ) -> Result<ParamMap, ResolutionError> {
    let conditional = self.workflow.kind(node) == NodeKind::Conditional;
    let mut session = Session::new(self, ctx);
    let mut resolved = ParamMap::new();
    for (key, value) in params {
      let value = match value {
        Value::String(text) if conditional && key == "condition" && text.contains("{{") => {
          Value::String(session.substitute_literals(text)?)
        }
        other => session.value(other)?,
      };
      resolved.insert(key.clone(), coerce_param(key, value));
    }
    debug!(count = resolved.len(), "resolved parameters");
    Ok(resolved)
  }

  /// Resolve a condition the way `{#if ...}` does.
  pub fn resolve_condition(
    &self,
    condition: &str,
    ctx: &mut ExecutionContext,
  ) -> Result<bool, ResolutionError> {
    Session::new(self, ctx).condition(condition)
  }
}

/// One resolution call: the context plus loop scopes and the parameter stack.
struct Session<'a> {
  resolver: &'a Resolver,
  ctx: &'a mut ExecutionContext,
  /// Loop frames, innermost last. Nothing is cached while any are active.
  scopes: Vec<Map<String, Value>>,
  /// Parameters being resolved, outermost first.
  parameters: Vec<String>,
}

impl<'a> Session<'a> {
  fn new(resolver: &'a Resolver, ctx: &'a mut ExecutionContext) -> Self {
    Self {
      resolver,
      ctx,
      scopes: Vec::new(),
      parameters: Vec::new(),
    }
  }

  fn cacheable(&self) -> bool {
    self.scopes.is_empty()
  }

  fn cached(&mut self, key: &str) -> Option<Value> {
    if !self.cacheable() {
      return None;
    }
    self.ctx.cache_mut().get(key)
  }

  fn remember(&mut self, key: &str, value: &Value) {
    if self.cacheable() {
      self.ctx.cache_mut().insert(key, value.clone());
    }
  }

  fn value(&mut self, value: &Value) -> Result<Value, ResolutionError> {
    match value {
      Value::String(text) => self.template(text),
      Value::Array(items) => items
        .iter()
        .map(|item| self.value(item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array),
      Value::Object(fields) => {
        let mut resolved = Map::with_capacity(fields.len());
        for (key, item) in fields {
          resolved.insert(key.clone(), self.value(item)?);
        }
        Ok(Value::Object(resolved))
      }
      other => Ok(other.clone()),
    }
  }

  fn template(&mut self, text: &str) -> Result<Value, ResolutionError> {
    if !has_markers(text) {
      return Ok(Value::String(text.to_string()));
    }
    if let Some(hit) = self.cached(text) {
      return Ok(hit);
    }

    let template = Template::parse(text)?;
    let value = match template.single_expression() {
      Some((_, inner)) => self.evaluate(inner)?,
      None => Value::String(self.render(template.pieces())?),
    };
    self.remember(text, &value);
    Ok(value)
  }

  /// A `{{ .. }}` marker inside a larger template, cached by its raw text.
  fn expression(&mut self, raw: &str, inner: &str) -> Result<Value, ResolutionError> {
    if let Some(hit) = self.cached(raw) {
      return Ok(hit);
    }
    let value = self.evaluate(inner)?;
    self.remember(raw, &value);
    Ok(value)
  }

  fn evaluate(&mut self, text: &str) -> Result<Value, ResolutionError> {
    let expression = Expression::parse(text, &self.resolver.filters)?;
    self.fallback(&expression)
  }

  /// First operand that resolves to a non-empty value wins. If none does,
  /// the last empty success is returned, else the first error.
  fn fallback(&mut self, expression: &Expression) -> Result<Value, ResolutionError> {
    let mut first_error = None;
    let mut last_empty = None;
    for operand in &expression.operands {
      match self.operand(operand) {
        Ok(value) if !is_empty(&value) => return Ok(value),
        Ok(value) => last_empty = Some(value),
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
          first_error.get_or_insert(err);
        }
      }
    }
    match (last_empty, first_error) {
      (Some(value), _) => Ok(value),
      (None, Some(err)) => Err(err),
      (None, None) => Ok(Value::Null),
    }
  }

  fn operand(&mut self, operand: &Operand) -> Result<Value, ResolutionError> {
    let (mut value, filters) = match self.term(&operand.term) {
      Ok(value) => (value, operand.filters.as_slice()),
      // `missing | default(x)` yields x
      Err(err) if !err.is_fatal() => match operand.filters.iter().position(|f| f.name == "default") {
        Some(pos) => (Value::Null, &operand.filters[pos..]),
        None => return Err(err),
      },
      Err(err) => return Err(err),
    };
    for call in filters {
      value = self.resolver.filters.apply(&call.name, &value, &call.args)?;
    }
    Ok(value)
  }

  fn term(&mut self, term: &Term) -> Result<Value, ResolutionError> {
    match term {
      Term::Literal(value) => Ok(value.clone()),
      Term::Reference(reference) => self.reference(reference),
    }
  }

  fn reference(&mut self, r: &Reference) -> Result<Value, ResolutionError> {
    if let Some(local) = self.scopes.iter().rev().find_map(|frame| frame.get(&r.head)) {
      return found(lookup(local, &r.path), r);
    }

    let workflow = Arc::clone(&self.resolver.workflow);
    match r.head.as_str() {
      "params" | "parameters" => {
        let (name, rest) = split_name(r)?;
        self.parameter(name, rest, r)
      }
      "input" => found(lookup(self.ctx.input_data(), &r.path), r),
      "store" => {
        let (key, rest) = split_name(r)?;
        let stored = self
          .ctx
          .stored(key)
          .ok_or_else(|| ResolutionError::unresolved(&r.text))?;
        found(lookup(stored, rest), r)
      }
      "env" => {
        let (name, rest) = split_name(r)?;
        if !rest.is_empty() {
          return Err(ResolutionError::syntax(format!(
            "environment reference '{}' cannot have a path",
            r.text
          )));
        }
        if !workflow.declares_environment(name) {
          return Err(ResolutionError::unresolved(&r.text));
        }
        Ok(Value::String(
          self.resolver.environment.get(name).unwrap_or_default(),
        ))
      }
      head if workflow.contains_node(head) => self.node(head, r),
      head if workflow.parameter(head).is_some() => self.parameter(head, &r.path, r),
      _ => Err(ResolutionError::unresolved(&r.text)),
    }
  }

  fn node(&mut self, name: &str, r: &Reference) -> Result<Value, ResolutionError> {
    if let Some(result) = self.ctx.result(name) {
      return resolve_in_result(result, &r.path)
        .ok_or_else(|| ResolutionError::path_not_found(&r.text));
    }
    if self.ctx.is_skipped(name) {
      return Err(ResolutionError::SkippedNode {
        node: name.to_string(),
      });
    }
    if self.ctx.is_resolving(name) {
      let chain = self.ctx.resolving_chain();
      let start = chain.iter().position(|n| n == name).unwrap_or(0);
      let mut chain = chain[start..].to_vec();
      chain.push(name.to_string());
      return Err(ResolutionError::CircularReference { chain });
    }
    Err(ResolutionError::DependencyPending {
      node: name.to_string(),
    })
  }

  fn parameter(
    &mut self,
    name: &str,
    path: &[Segment],
    r: &Reference,
  ) -> Result<Value, ResolutionError> {
    if let Some(start) = self.parameters.iter().position(|p| p == name) {
      let mut chain: Vec<String> = self.parameters[start..]
        .iter()
        .map(|p| format!("params.{p}"))
        .collect();
      chain.push(format!("params.{name}"));
      return Err(ResolutionError::CircularReference { chain });
    }
    let raw = self
      .resolver
      .workflow
      .parameter(name)
      .cloned()
      .ok_or_else(|| ResolutionError::unresolved(&r.text))?;

    self.parameters.push(name.to_string());
    let resolved = self.value(&raw);
    self.parameters.pop();
    found(lookup(&resolved?, path), r)
  }

  fn render(&mut self, pieces: &[Piece]) -> Result<String, ResolutionError> {
    let mut out = String::new();
    for piece in pieces {
      match piece {
        Piece::Text(text) => out.push_str(text),
        Piece::Expr { raw, inner } => out.push_str(&to_display(&self.expression(raw, inner)?)),
        Piece::If {
          condition,
          then,
          otherwise,
        } => {
          let branch = if self.condition(condition)? { then } else { otherwise };
          out.push_str(&self.render(branch)?);
        }
        Piece::Each { source, body } => {
          for frame in self.iteration(source)? {
            self.scopes.push(frame);
            let rendered = self.render(body);
            self.scopes.pop();
            out.push_str(&rendered?);
          }
        }
      }
    }
    Ok(out)
  }

  /// Loop frames for `{#each source}`.
  fn iteration(&mut self, source: &str) -> Result<Vec<Map<String, Value>>, ResolutionError> {
    let inner = strip_marker(source);
    let entries: Vec<(Option<String>, Value)> = match self.evaluate(inner)? {
      Value::Array(items) => items.into_iter().map(|item| (None, item)).collect(),
      Value::Object(fields) => fields.into_iter().map(|(k, v)| (Some(k), v)).collect(),
      Value::Null => Vec::new(),
      other => {
        return Err(ResolutionError::syntax(format!(
          "cannot iterate over {other} from '{source}'"
        )));
      }
    };

    let length = entries.len();
    Ok(
      entries
        .into_iter()
        .enumerate()
        .map(|(index, (key, item))| {
          let mut frame = Map::new();
          frame.insert("this".to_string(), item);
          frame.insert("index".to_string(), Value::from(index));
          frame.insert("first".to_string(), Value::Bool(index == 0));
          frame.insert("last".to_string(), Value::Bool(index + 1 == length));
          frame.insert("length".to_string(), Value::from(length));
          if let Some(key) = key {
            frame.insert("key".to_string(), Value::String(key));
          }
          frame
        })
        .collect(),
    )
  }

  /// Evaluate an `{#if}` condition.
  ///
  /// `{{ .. }}` markers are replaced by the literal form of their values, and
  /// so are bare references (`Fetch.value > 40`) other than loop variables.
  /// The result is evaluated as an expression. A condition without operators
  /// is a template expression tested for truthiness.
  fn condition(&mut self, condition: &str) -> Result<bool, ResolutionError> {
    let condition = condition.trim();
    let substituted = if condition.contains("{{") {
      self.substitute_literals(condition)?
    } else if is_operator_expression(condition) {
      condition.to_string()
    } else {
      return Ok(is_truthy(&self.evaluate(condition)?));
    };
    let bound = self.bind_references(&substituted)?;
    debug!(condition, bound = %bound, "evaluating condition");
    expression::evaluate_condition(&bound, &self.locals())
  }

  /// Replace bare references in an expression with value literals.
  ///
  /// Quoted strings, numbers, keywords, loop variables, filter and test names
  /// and function calls are left alone, as are references that do not
  /// resolve, so the expression language reports them.
  fn bind_references(&mut self, text: &str) -> Result<String, ResolutionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    // Set after `|` or `is`: the next name is a filter or a test
    let mut naming = false;
    let mut i = 0;
    while i < chars.len() {
      let c = chars[i];
      if c == '\'' || c == '"' {
        let start = i;
        i += 1;
        while i < chars.len() && chars[i] != c {
          if chars[i] == '\\' {
            i += 1;
          }
          i += 1;
        }
        i = (i + 1).min(chars.len());
        out.extend(&chars[start..i]);
        naming = false;
        continue;
      }
      if c.is_ascii_digit() {
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
          i += 1;
        }
        out.extend(&chars[start..i]);
        naming = false;
        continue;
      }
      if !(c.is_alphabetic() || c == '_') {
        out.push(c);
        if c == '|' {
          naming = true;
        } else if !c.is_whitespace() {
          naming = false;
        }
        i += 1;
        continue;
      }

      let start = i;
      i = path_end(&chars, i);
      let token: String = chars[start..i].iter().collect();
      let head = token
        .split(['.', '['])
        .next()
        .unwrap_or_default();
      let called = chars[i..].iter().find(|c| !c.is_whitespace()) == Some(&'(');

      if KEYWORDS.contains(&head) {
        out.push_str(&token);
        if head == "is" {
          naming = true;
        } else if head != "not" {
          naming = false;
        }
        continue;
      }
      let local = self.scopes.iter().any(|frame| frame.contains_key(head));
      if naming || called || local {
        out.push_str(&token);
        naming = false;
        continue;
      }
      match self.evaluate(&token) {
        Ok(value) => out.push_str(&expression::to_literal(&value)),
        Err(err) if err.is_fatal() => return Err(err),
        Err(_) => out.push_str(&token),
      }
    }
    Ok(out)
  }

  fn substitute_literals(&mut self, text: &str) -> Result<String, ResolutionError> {
    let template = Template::parse(text)?;
    let mut out = String::new();
    for piece in template.pieces() {
      match piece {
        Piece::Text(text) => out.push_str(text),
        Piece::Expr { raw, inner } => {
          let value = self.expression(raw, inner)?;
          out.push_str(&expression::to_literal(&value));
        }
        _ => return Err(ResolutionError::syntax(format!("blocks are not allowed in condition '{text}'"))),
      }
    }
    Ok(out)
  }

  /// Loop variables flattened into one object, inner frames winning.
  fn locals(&self) -> Value {
    let mut merged = Map::new();
    for frame in &self.scopes {
      for (key, value) in frame {
        merged.insert(key.clone(), value.clone());
      }
    }
    Value::Object(merged)
  }
}

fn found(value: Option<&Value>, r: &Reference) -> Result<Value, ResolutionError> {
  value
    .cloned()
    .ok_or_else(|| ResolutionError::path_not_found(&r.text))
}

/// Split `scope.name.rest` into `name` and `rest`.
fn split_name(r: &Reference) -> Result<(&str, &[Segment]), ResolutionError> {
  match r.path.split_first() {
    Some((Segment::Key(name), rest)) => Ok((name.as_str(), rest)),
    _ => Err(ResolutionError::unresolved(&r.text)),
  }
}

fn strip_marker(text: &str) -> &str {
  let text = text.trim();
  text
    .strip_prefix("{{")
    .and_then(|t| t.strip_suffix("}}"))
    .map(str::trim)
    .unwrap_or(text)
}

const KEYWORDS: [&str; 14] = [
  "and", "or", "not", "in", "is", "if", "else", "true", "false", "none", "True", "False", "None",
  "loop",
];

/// End of the dotted path starting at `start`: names joined by `.` with
/// optional `[..]` subscripts.
fn path_end(chars: &[char], start: usize) -> usize {
  let mut i = start;
  loop {
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
      i += 1;
    }
    while i < chars.len() && chars[i] == '[' {
      match chars[i..].iter().position(|c| *c == ']') {
        Some(close) => i += close + 1,
        None => return i,
      }
    }
    match chars.get(i + 1) {
      Some(next) if chars[i] == '.' && (next.is_alphanumeric() || *next == '_') => i += 1,
      _ => return i,
    }
  }
}

const OPERATOR_WORDS: [&str; 5] = ["and", "or", "not", "in", "is"];

/// Whether a marker-free condition uses operators rather than being a plain
/// reference or filter chain.
fn is_operator_expression(text: &str) -> bool {
  let mut quote: Option<char> = None;
  let mut bare = String::with_capacity(text.len());
  for c in text.chars() {
    match quote {
      Some(q) if c == q => quote = None,
      Some(_) => {}
      None if c == '\'' || c == '"' => quote = Some(c),
      None => bare.push(c),
    }
  }
  bare.chars().any(|c| "<>=!+*/%".contains(c))
    || bare
      .split_whitespace()
      .any(|word| OPERATOR_WORDS.contains(&word))
}
