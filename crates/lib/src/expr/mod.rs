//! Sandboxed expression evaluator.
//!
//! Expressions are a JavaScript-like subset (see [`parser`]) evaluated by a
//! tree-walking interpreter against a JSON context. Free identifiers resolve
//! through an interception [`scope`](scope::Scope): snippet locals first,
//! then global aliases, the denylist, caller context and finally built-ins.

mod ast;
mod builtins;
mod deps;
mod error;
mod interp;
mod lexer;
mod methods;
mod parser;
mod scope;
mod value;

use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::trace;

pub use error::EvalError;
pub use parser::KEYWORDS;
pub use scope::{DENYLIST, GLOBAL_ALIASES};
pub use value::format_number;

/// Default bound on syntactic nesting and lambda call depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
  max_depth: usize,
}

impl Default for Evaluator {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_DEPTH)
  }
}

impl Evaluator {
  pub fn new(max_depth: usize) -> Self {
    Self {
      max_depth: max_depth.max(1),
    }
  }

  pub fn max_depth(&self) -> usize {
    self.max_depth
  }

  /// Evaluates `code` once against `context`.
  ///
  /// Each call builds a fresh scope; nothing is retained between calls.
  pub fn evaluate(&self, code: &str, context: &JsonMap<String, JsonValue>) -> Result<JsonValue, EvalError> {
    let program = parser::parse(code, self.max_depth)?;
    let scope = scope::Scope::new(context);
    let value = interp::Interpreter::new(&scope, self.max_depth).run(&program)?;
    trace!(code, "evaluated expression");
    Ok(value.to_json())
  }

  /// Parses without evaluating.
  pub fn check(&self, code: &str) -> Result<(), EvalError> {
    parser::parse(code, self.max_depth).map(|_| ())
  }

  /// Root identifiers `code` reads from its context.
  pub fn free_identifiers(&self, code: &str) -> Result<Vec<String>, EvalError> {
    let program = parser::parse(code, self.max_depth)?;
    Ok(deps::free_identifiers(&program))
  }
}

/// Evaluates with the default configuration.
pub fn evaluate(code: &str, context: &JsonMap<String, JsonValue>) -> Result<JsonValue, EvalError> {
  Evaluator::default().evaluate(code, context)
}
