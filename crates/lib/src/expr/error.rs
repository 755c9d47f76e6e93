use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
  #[error("syntax error at {pos}: {message}")]
  Syntax { pos: usize, message: String },

  #[error("expression nests deeper than {0} levels")]
  TooDeep(usize),

  #[error("type error: {0}")]
  Type(String),

  /// Writes, deletes and prototype changes on the scope are forbidden.
  #[error("write denied: {0}")]
  WriteDenied(String),

  /// A built-in rejected its input (bad JSON, malformed URI, ...).
  #[error("{builtin}: {message}")]
  Builtin { builtin: String, message: String },
}

impl EvalError {
  pub(crate) fn syntax(pos: usize, message: impl Into<String>) -> Self {
    EvalError::Syntax {
      pos,
      message: message.into(),
    }
  }

  pub(crate) fn builtin(builtin: &str, message: impl Into<String>) -> Self {
    EvalError::Builtin {
      builtin: builtin.to_string(),
      message: message.into(),
    }
  }
}
