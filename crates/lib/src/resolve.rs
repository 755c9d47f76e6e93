//! Binding-string resolution.
//!
//! A binding string takes one of three shapes, tried in order:
//!
//! - a bare property path such as `query1.data.rows` (only word characters
//!   and dots), looked up directly without the evaluator; missing segments
//!   yield `null`
//! - exactly one `{{ expression }}` run, evaluated to a JSON value
//! - a template mixing literal text and `{{ ... }}` runs, producing a string
//!
//! # Example
//!
//! ```
//! use bindscope_lib::resolve::{parse, Segment};
//!
//! let segments = parse("Hello {{ user.name }}!");
//! assert_eq!(segments, vec![
//!     Segment::Literal("Hello ".to_string()),
//!     Segment::Expression { code: " user.name ".to_string(), raw: "{{ user.name }}".to_string() },
//!     Segment::Literal("!".to_string()),
//! ]);
//! ```

use indexmap::IndexSet;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{debug, warn};

use crate::expr::{EvalError, Evaluator, format_number};

/// A segment of a binding string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text
  Literal(String),

  /// A `{{ ... }}` run: the code between the braces and the run as written
  Expression { code: String, raw: String },
}

/// Splits `input` into literal and `{{ ... }}` segments.
///
/// Inside a run, nested braces and quoted strings are tracked so object
/// literals like `{{ {a: {b: 1}} }}` are not cut short. An unclosed run is
/// kept as literal text.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find("{{") {
    literal.push_str(&rest[..start]);
    let body = &rest[start + 2..];
    match find_close(body) {
      Some(end) => {
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Expression {
          code: body[..end].to_string(),
          raw: rest[start..start + 2 + end + 2].to_string(),
        });
        rest = &body[end + 2..];
      }
      None => {
        literal.push_str(&rest[start..]);
        rest = "";
      }
    }
  }
  literal.push_str(rest);

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  segments
}

/// Byte offset of the `}}` closing a run whose body starts at `body[0]`.
fn find_close(body: &str) -> Option<usize> {
  let bytes = body.as_bytes();
  let mut depth = 0usize;
  let mut quote: Option<u8> = None;
  let mut i = 0;

  while i < bytes.len() {
    let b = bytes[i];
    if let Some(q) = quote {
      if b == b'\\' {
        i += 2;
        continue;
      }
      if b == q {
        quote = None;
      }
      i += 1;
      continue;
    }
    match b {
      b'\'' | b'"' | b'`' => quote = Some(b),
      b'{' => depth += 1,
      b'}' if depth > 0 => depth -= 1,
      b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
      _ => {}
    }
    i += 1;
  }
  None
}

/// True when `input` contains at least one complete `{{ ... }}` run.
pub fn is_expression(input: &str) -> bool {
  parse(input).iter().any(|s| matches!(s, Segment::Expression { .. }))
}

/// True for the bare property-path shape (`[A-Za-z0-9_.]+`).
pub fn is_property_path(input: &str) -> bool {
  !input.is_empty() && input.chars().all(|c| c == '.' || c == '_' || c.is_ascii_alphanumeric())
}

/// Walks a dotted path through objects and arrays. Missing segments yield `None`.
pub fn get_by_path<'a>(context: &'a JsonMap<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
  let mut parts = path.split('.');
  let first = parts.next()?;
  let mut current = context.get(first)?;
  for part in parts {
    current = match current {
      JsonValue::Object(map) => map.get(part)?,
      JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(current)
}

/// String form used when a value is interpolated into a template.
///
/// `null` becomes empty, numbers follow JavaScript formatting and
/// composites are compact JSON.
pub fn template_text(value: &JsonValue) -> String {
  match value {
    JsonValue::Null => String::new(),
    JsonValue::Bool(b) => b.to_string(),
    JsonValue::Number(n) => {
      if n.is_i64() || n.is_u64() {
        n.to_string()
      } else {
        format_number(n.as_f64().unwrap_or(f64::NAN))
      }
    }
    JsonValue::String(s) => s.clone(),
    composite => composite.to_string(),
  }
}

/// Resolves binding strings with a configured [`Evaluator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
  evaluator: Evaluator,
}

impl Resolver {
  pub fn new(evaluator: Evaluator) -> Self {
    Self { evaluator }
  }

  pub fn evaluator(&self) -> &Evaluator {
    &self.evaluator
  }

  /// Resolves `input` against `context`.
  ///
  /// Only the single-run shape can fail; a failing run inside a template
  /// keeps its original text.
  pub fn resolve(&self, input: &str, context: &JsonMap<String, JsonValue>) -> Result<JsonValue, EvalError> {
    if is_property_path(input) {
      return Ok(get_by_path(context, input).cloned().unwrap_or(JsonValue::Null));
    }

    let segments = parse(input);
    match segments.as_slice() {
      [Segment::Expression { code, .. }] => self.evaluator.evaluate(code, context),
      [] => Ok(JsonValue::String(String::new())),
      _ if !segments.iter().any(|s| matches!(s, Segment::Expression { .. })) => {
        Ok(JsonValue::String(input.to_string()))
      }
      _ => Ok(JsonValue::String(self.interpolate(&segments, context))),
    }
  }

  fn interpolate(&self, segments: &[Segment], context: &JsonMap<String, JsonValue>) -> String {
    let mut out = String::new();
    for segment in segments {
      match segment {
        Segment::Literal(text) => out.push_str(text),
        Segment::Expression { code, raw } => match self.evaluator.evaluate(code, context) {
          Ok(value) => out.push_str(&template_text(&value)),
          Err(err) => {
            warn!(expression = %raw, error = %err, "template run failed, keeping original text");
            out.push_str(raw);
          }
        },
      }
    }
    out
  }

  /// Root names `input` depends on, in first-use order.
  ///
  /// Meant for tooling; runs that fail to parse contribute nothing.
  pub fn extract_dependencies(&self, input: &str) -> Vec<String> {
    if is_property_path(input) {
      return input
        .split('.')
        .next()
        .filter(|root| !root.is_empty() && !root.starts_with(|c: char| c.is_ascii_digit()))
        .map(|root| vec![root.to_string()])
        .unwrap_or_default();
    }

    let mut deps = IndexSet::new();
    for segment in parse(input) {
      if let Segment::Expression { code, .. } = segment {
        match self.evaluator.free_identifiers(&code) {
          Ok(names) => deps.extend(names),
          Err(err) => debug!(code = %code, error = %err, "skipping unparsable run"),
        }
      }
    }
    deps.into_iter().collect()
  }
}

/// Resolves with the default evaluator.
pub fn resolve(input: &str, context: &JsonMap<String, JsonValue>) -> Result<JsonValue, EvalError> {
  Resolver::default().resolve(input, context)
}

/// Dependencies with the default evaluator.
pub fn extract_dependencies(input: &str) -> Vec<String> {
  Resolver::default().extract_dependencies(input)
}
