//! Runtime entities: queries, transformers, temp states and data responders.
//!
//! Each kind pairs a serializable definition with a live instance holding
//! private reactive cells. Instances are never patched: an update stops the
//! old instance and builds a new one from the new definition.

pub mod manager;
pub mod query;
pub mod responder;
pub mod temp_state;
pub mod transformer;

use std::fmt::Debug;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::app::AppRef;
use crate::namespace::EntityKind;

pub use manager::Manager;
pub use query::{Query, QueryAction, QueryDefinition, QueryResult};
pub use responder::{DataResponder, DataResponderDefinition};
pub use temp_state::{PathError, TempState, TempStateDefinition};
pub use transformer::{Transformer, TransformerDefinition};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
  #[error("{kind} '{id}' already exists")]
  DuplicateId { kind: EntityKind, id: String },

  #[error("{kind} '{id}' not found")]
  NotFound { kind: EntityKind, id: String },

  #[error("{kind} '{id}' has an empty name")]
  EmptyName { kind: EntityKind, id: String },
}

/// Lifecycle state shared by every entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
  #[default]
  Idle,
  Loading,
  Computing,
  Running,
  Success,
  Error,
}

impl RunState {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunState::Idle => "idle",
      RunState::Loading => "loading",
      RunState::Computing => "computing",
      RunState::Running => "running",
      RunState::Success => "success",
      RunState::Error => "error",
    }
  }

  /// Whether this is a finished state a cancellation can revert to.
  pub fn is_settled(&self) -> bool {
    matches!(self, RunState::Success | RunState::Error)
  }
}

/// A live instance managed by [`Manager`].
pub trait Entity: Sized + 'static {
  type Definition: Clone + Debug + PartialEq + Serialize + DeserializeOwned + 'static;

  const KIND: EntityKind;

  fn create(definition: Self::Definition, app: AppRef) -> Rc<Self>;

  /// Id carried by a definition, before any instance exists.
  fn definition_id(definition: &Self::Definition) -> &str;

  fn definition(&self) -> &Self::Definition;

  fn id(&self) -> &str;

  fn name(&self) -> &str;

  /// Exposed values; reads are tracked so the namespace follows them.
  fn exposed(&self) -> JsonValue;

  /// Takes over runtime state from the instance this one replaces.
  fn carry_over(&self, _previous: &Self) {}

  /// Called once the instance is registered. Subscriptions start here.
  fn start(self: &Rc<Self>) {}

  /// Called before the instance is discarded.
  fn stop(&self) {}
}

pub(crate) fn default_true() -> bool {
  true
}
