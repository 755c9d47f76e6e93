//! Temporary state: a plain value cell authors can write from scripts.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::debug;

use super::Entity;
use crate::app::AppRef;
use crate::namespace::EntityKind;
use crate::reactive::Signal;

/// Highest array index `set_in` will pad up to.
pub const MAX_ARRAY_INDEX: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("index {index} in path '{path}' is past the array limit of {MAX_ARRAY_INDEX}")]
pub struct PathError {
  pub path: String,
  pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempStateDefinition {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub initial_value: JsonValue,
}

pub struct TempState {
  definition: TempStateDefinition,
  value: Signal<JsonValue>,
}

impl TempState {
  /// Tracked read of the current value.
  pub fn value(&self) -> JsonValue {
    self.value.get()
  }

  pub fn initial_value(&self) -> &JsonValue {
    &self.definition.initial_value
  }

  pub fn set_value(&self, value: JsonValue) {
    debug!(state = %self.definition.name, "temp state set");
    self.value.set(value);
  }

  /// Restores the initial value.
  pub fn reset(&self) {
    self.value.set(self.definition.initial_value.clone());
  }

  /// Replaces the value with a copy where the dotted `path` holds `value`.
  ///
  /// Missing or non-container steps become objects; numeric steps index
  /// into arrays, padding with `null`. An index past [`MAX_ARRAY_INDEX`]
  /// leaves the value untouched.
  pub fn set_in(&self, path: &str, value: JsonValue) -> Result<(), PathError> {
    let mut next = self.value.get_untracked();
    let steps: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if steps.is_empty() {
      self.set_value(value);
      return Ok(());
    }
    write_path(&mut next, &steps, value).map_err(|index| PathError {
      path: path.to_string(),
      index,
    })?;
    self.set_value(next);
    Ok(())
  }
}

/// Fails with the offending index when it is past the array limit.
fn write_path(target: &mut JsonValue, steps: &[&str], value: JsonValue) -> Result<(), usize> {
  let Some((step, rest)) = steps.split_first() else {
    *target = value;
    return Ok(());
  };

  let slot = match (target, step.parse::<usize>()) {
    (JsonValue::Array(items), Ok(index)) => {
      if index > MAX_ARRAY_INDEX {
        return Err(index);
      }
      if items.len() <= index {
        items.resize(index + 1, JsonValue::Null);
      }
      &mut items[index]
    }
    (target, _) => {
      if !target.is_object() {
        *target = json!({});
      }
      match target {
        JsonValue::Object(map) => map.entry(step.to_string()).or_insert(JsonValue::Null),
        _ => return Ok(()),
      }
    }
  };
  write_path(slot, rest, value)
}

impl Entity for TempState {
  type Definition = TempStateDefinition;

  const KIND: EntityKind = EntityKind::TempState;

  fn create(definition: TempStateDefinition, _app: AppRef) -> Rc<Self> {
    let value = Signal::new(definition.initial_value.clone());
    Rc::new(Self { definition, value })
  }

  fn definition_id(definition: &TempStateDefinition) -> &str {
    &definition.id
  }

  fn definition(&self) -> &TempStateDefinition {
    &self.definition
  }

  fn id(&self) -> &str {
    &self.definition.id
  }

  fn name(&self) -> &str {
    &self.definition.name
  }

  fn exposed(&self) -> JsonValue {
    json!({
      "value": self.value.get(),
      "initialValue": self.definition.initial_value,
    })
  }
}
