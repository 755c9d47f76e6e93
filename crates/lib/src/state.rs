//! Bindable value cells.
//!
//! A [`CompState`] holds either a static value or a binding expression,
//! never both. Its derived value follows the namespace when bound.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::namespace::Namespace;
use crate::reactive::{Memo, Signal};
use crate::resolve::{Resolver, is_expression};

/// The persisted half of a bindable cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellMode {
  Static(JsonValue),
  Bound(String),
}

impl CellMode {
  /// Strings containing a `{{ ... }}` run bind; everything else is static.
  pub fn from_json(value: JsonValue) -> Self {
    match value {
      JsonValue::String(s) if is_expression(&s) => CellMode::Bound(s),
      other => CellMode::Static(other),
    }
  }

  pub fn to_json(&self) -> JsonValue {
    match self {
      CellMode::Static(value) => value.clone(),
      CellMode::Bound(expression) => JsonValue::String(expression.clone()),
    }
  }
}

impl Serialize for CellMode {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      CellMode::Static(value) => value.serialize(serializer),
      CellMode::Bound(expression) => serializer.serialize_str(expression),
    }
  }
}

impl<'de> Deserialize<'de> for CellMode {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    JsonValue::deserialize(deserializer).map(CellMode::from_json)
  }
}

/// A bindable value cell evaluated against the live namespace.
#[derive(Clone)]
pub struct CompState {
  mode: Signal<CellMode>,
  default: JsonValue,
  value: Memo<JsonValue>,
}

impl CompState {
  pub fn new(default: JsonValue, namespace: Namespace, resolver: Resolver) -> Self {
    let mode = Signal::new(CellMode::Static(default.clone()));
    let value = {
      let mode = mode.clone();
      let default = default.clone();
      Memo::new(move || match mode.get() {
        CellMode::Static(value) => value,
        CellMode::Bound(expression) if expression.trim().is_empty() => default.clone(),
        CellMode::Bound(expression) => {
          let context = namespace.get();
          match resolver.resolve(&expression, &context) {
            Ok(value) => value,
            Err(err) => {
              warn!(expression = %expression, error = %err, "binding failed, using default");
              default.clone()
            }
          }
        }
      })
    };
    Self { mode, default, value }
  }

  /// Builds a cell and applies a persisted mode.
  pub fn with_mode(default: JsonValue, mode: CellMode, namespace: Namespace, resolver: Resolver) -> Self {
    let state = Self::new(default, namespace, resolver);
    state.mode.set(mode);
    state
  }

  /// Switches to static mode.
  pub fn set(&self, value: JsonValue) {
    self.mode.set(CellMode::Static(value));
  }

  /// Switches to bound mode.
  pub fn bind(&self, expression: impl Into<String>) {
    self.mode.set(CellMode::Bound(expression.into()));
  }

  /// Applies a persisted value, binding when it contains a `{{ ... }}` run.
  pub fn assign(&self, value: JsonValue) {
    self.mode.set(CellMode::from_json(value));
  }

  pub fn mode(&self) -> CellMode {
    self.mode.get_untracked()
  }

  pub fn is_bound(&self) -> bool {
    matches!(self.mode(), CellMode::Bound(_))
  }

  pub fn expression(&self) -> Option<String> {
    match self.mode() {
      CellMode::Bound(expression) => Some(expression),
      CellMode::Static(_) => None,
    }
  }

  pub fn default_value(&self) -> &JsonValue {
    &self.default
  }

  /// Tracked read of the derived value.
  pub fn value(&self) -> JsonValue {
    self.value.get()
  }

  pub fn value_untracked(&self) -> JsonValue {
    self.value.get_untracked()
  }

  /// Persisted form: the static value or the expression text.
  pub fn to_json(&self) -> JsonValue {
    self.mode().to_json()
  }
}

impl fmt::Debug for CompState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompState")
      .field("mode", &self.mode())
      .field("default", &self.default)
      .finish()
  }
}
