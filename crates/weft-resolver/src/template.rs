//! Template structure: literal text, `{{ expression }}` markers and blocks.
//!
//! ```text
//! {{ expr }}
//! {#if cond} ... {else} ... {/if}
//! {#each expr} ... {/each}
//! ```
//!
//! An opening `{{` without a closing `}}` is literal text. Unbalanced blocks
//! are syntax errors.

use std::collections::VecDeque;

use crate::error::ResolutionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
  Text(String),
  /// `raw` is the full marker including braces; it keys the cache.
  Expr { raw: String, inner: String },
  If {
    condition: String,
    then: Vec<Piece>,
    otherwise: Vec<Piece>,
  },
  Each { source: String, body: Vec<Piece> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  pieces: Vec<Piece>,
}

/// Whether `text` contains anything the resolver would act on.
pub fn has_markers(text: &str) -> bool {
  text.contains("{{") || text.contains("{#")
}

impl Template {
  pub fn parse(text: &str) -> Result<Self, ResolutionError> {
    let mut tokens = tokenize(text);
    let (pieces, stop) = parse_sequence(&mut tokens)?;
    match stop {
      Stop::End => Ok(Self { pieces }),
      Stop::Else => Err(ResolutionError::syntax("{else} outside of {#if}")),
      Stop::EndIf => Err(ResolutionError::syntax("{/if} without {#if}")),
      Stop::EndEach => Err(ResolutionError::syntax("{/each} without {#each}")),
    }
  }

  pub fn pieces(&self) -> &[Piece] {
    &self.pieces
  }

  /// The marker, if the template is exactly one expression.
  ///
  /// Such templates resolve to the expression's typed value instead of a string.
  pub fn single_expression(&self) -> Option<(&str, &str)> {
    match self.pieces.as_slice() {
      [Piece::Expr { raw, inner }] => Some((raw, inner)),
      _ => None,
    }
  }
}

#[derive(Debug, PartialEq)]
enum Token {
  Text(String),
  Expr { raw: String, inner: String },
  If(String),
  Each(String),
  Else,
  EndIf,
  EndEach,
}

fn push_text(tokens: &mut VecDeque<Token>, text: &str) {
  if text.is_empty() {
    return;
  }
  if let Some(Token::Text(existing)) = tokens.back_mut() {
    existing.push_str(text);
  } else {
    tokens.push_back(Token::Text(text.to_string()));
  }
}

fn tokenize(text: &str) -> VecDeque<Token> {
  let mut tokens = VecDeque::new();
  let mut rest = text;

  while let Some(pos) = rest.find('{') {
    push_text(&mut tokens, &rest[..pos]);
    let tail = &rest[pos..];

    if let Some(after) = tail.strip_prefix("{{") {
      match after.find("}}") {
        Some(end) => {
          let raw = &tail[..end + 4];
          tokens.push_back(Token::Expr {
            raw: raw.to_string(),
            inner: after[..end].trim().to_string(),
          });
          rest = &after[end + 2..];
        }
        None => {
          push_text(&mut tokens, tail);
          rest = "";
        }
      }
      continue;
    }

    let tag = [
      ("{else}", Token::Else),
      ("{/if}", Token::EndIf),
      ("{/each}", Token::EndEach),
    ]
    .into_iter()
    .find(|(tag, _)| tail.starts_with(tag));
    if let Some((tag, token)) = tag {
      tokens.push_back(token);
      rest = &tail[tag.len()..];
      continue;
    }

    let opener = [("{#if ", true), ("{#each ", false)]
      .into_iter()
      .find(|(open, _)| tail.starts_with(open));
    if let Some((open, is_if)) = opener
      && let Some(len) = block_header_len(&tail[open.len()..])
    {
      let header = tail[open.len()..open.len() + len].trim().to_string();
      tokens.push_back(if is_if { Token::If(header) } else { Token::Each(header) });
      rest = &tail[open.len() + len + 1..];
      continue;
    }

    push_text(&mut tokens, "{");
    rest = &tail[1..];
  }
  push_text(&mut tokens, rest);
  tokens
}

/// Length of a block header up to its closing `}`, skipping `{{ .. }}` and
/// quoted strings.
fn block_header_len(text: &str) -> Option<usize> {
  let bytes = text.as_bytes();
  let mut i = 0;
  let mut quote: Option<u8> = None;
  while i < bytes.len() {
    let b = bytes[i];
    match quote {
      Some(q) if b == q => quote = None,
      Some(_) => {}
      None => match b {
        b'\'' | b'"' => quote = Some(b),
        b'{' if bytes.get(i + 1) == Some(&b'{') => {
          let end = text[i + 2..].find("}}")?;
          i += end + 4;
          continue;
        }
        b'}' => return Some(i),
        _ => {}
      },
    }
    i += 1;
  }
  None
}

#[derive(Debug, PartialEq)]
enum Stop {
  End,
  Else,
  EndIf,
  EndEach,
}

fn parse_sequence(tokens: &mut VecDeque<Token>) -> Result<(Vec<Piece>, Stop), ResolutionError> {
  let mut pieces = Vec::new();
  while let Some(token) = tokens.pop_front() {
    match token {
      Token::Text(text) => pieces.push(Piece::Text(text)),
      Token::Expr { raw, inner } => pieces.push(Piece::Expr { raw, inner }),
      Token::If(condition) => {
        let (then, stop) = parse_sequence(tokens)?;
        let otherwise = match stop {
          Stop::EndIf => Vec::new(),
          Stop::Else => {
            let (otherwise, stop) = parse_sequence(tokens)?;
            if stop != Stop::EndIf {
              return Err(ResolutionError::syntax(format!(
                "{{#if {condition}}} is not closed by {{/if}}"
              )));
            }
            otherwise
          }
          _ => {
            return Err(ResolutionError::syntax(format!(
              "{{#if {condition}}} is not closed by {{/if}}"
            )));
          }
        };
        pieces.push(Piece::If {
          condition,
          then,
          otherwise,
        });
      }
      Token::Each(source) => {
        let (body, stop) = parse_sequence(tokens)?;
        if stop != Stop::EndEach {
          return Err(ResolutionError::syntax(format!(
            "{{#each {source}}} is not closed by {{/each}}"
          )));
        }
        pieces.push(Piece::Each { source, body });
      }
      Token::Else => return Ok((pieces, Stop::Else)),
      Token::EndIf => return Ok((pieces, Stop::EndIf)),
      Token::EndEach => return Ok((pieces, Stop::EndEach)),
    }
  }
  Ok((pieces, Stop::End))
}
