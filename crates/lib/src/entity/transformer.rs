//! Transformers: pure Lua computations over the namespace.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use super::{Entity, RunState, default_true};
use crate::app::AppRef;
use crate::namespace::EntityKind;
use crate::reactive::{Effect, Signal, batch, untracked};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerDefinition {
  pub id: String,
  pub name: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
  pub code: String,
}

pub struct Transformer {
  definition: TransformerDefinition,
  app: AppRef,
  value: Signal<JsonValue>,
  error: Signal<Option<String>>,
  state: Signal<RunState>,
  /// Bumped by `refresh` to force a rerun.
  tick: Signal<u64>,
  /// Tick of the last script run and the namespace entries it read.
  last_input: RefCell<Option<(u64, Vec<(String, Option<JsonValue>)>)>>,
  runs: Cell<u64>,
  effect: RefCell<Option<Effect>>,
}

impl Transformer {
  pub fn value(&self) -> JsonValue {
    self.value.get()
  }

  pub fn error(&self) -> Option<String> {
    self.error.get()
  }

  pub fn state(&self) -> RunState {
    self.state.get()
  }

  /// Number of times the script has run.
  pub fn run_count(&self) -> u64 {
    self.runs.get()
  }

  pub fn is_running(&self) -> bool {
    self.effect.borrow().is_some()
  }

  /// Recomputes now, even if nothing it reads changed.
  pub fn refresh(&self) {
    if !self.is_running() {
      debug!(transformer = %self.definition.name, "refresh ignored, transformer is not running");
      return;
    }
    self.state.set(RunState::Computing);
    self.tick.update(|tick| *tick += 1);
  }

  fn compute(&self) {
    let Some(app) = self.app.upgrade() else {
      return;
    };
    let mut namespace = app.namespace_cell().get();
    let tick = self.tick.get();
    if self.last_input.borrow().as_ref().is_some_and(|(last_tick, reads)| {
      *last_tick == tick && reads.iter().all(|(name, value)| namespace.get(name) == value.as_ref())
    }) {
      debug!(transformer = %self.definition.name, "inputs unchanged, skipping run");
      return;
    }
    // Our own exposed value is an output, never an input.
    if namespace.contains_key(&self.definition.name) {
      Rc::make_mut(&mut namespace).remove(&self.definition.name);
    }
    self.runs.set(self.runs.get() + 1);

    untracked(|| {
      let (outcome, reads) = app
        .scripts()
        .run_tracked(&self.definition.name, &self.definition.code, &namespace);
      let reads = reads
        .into_iter()
        .map(|name| {
          let value = namespace.get(&name).cloned();
          (name, value)
        })
        .collect();
      *self.last_input.borrow_mut() = Some((tick, reads));
      batch(|| match outcome {
        Ok(value) => {
          self.value.set(value);
          self.error.set(None);
          self.state.set(RunState::Success);
        }
        Err(err) => {
          warn!(transformer = %self.definition.name, error = %err, "transformer failed");
          self.error.set(Some(err.to_string()));
          self.state.set(RunState::Error);
        }
      });
    });
  }
}

impl Entity for Transformer {
  type Definition = TransformerDefinition;

  const KIND: EntityKind = EntityKind::Transformer;

  fn create(definition: TransformerDefinition, app: AppRef) -> Rc<Self> {
    Rc::new(Self {
      definition,
      app,
      value: Signal::new(JsonValue::Null),
      error: Signal::new(None),
      state: Signal::new(RunState::Idle),
      tick: Signal::new(0),
      last_input: RefCell::new(None),
      runs: Cell::new(0),
      effect: RefCell::new(None),
    })
  }

  fn definition_id(definition: &TransformerDefinition) -> &str {
    &definition.id
  }

  fn definition(&self) -> &TransformerDefinition {
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
      "error": self.error.get(),
      "state": self.state.get().as_str(),
    })
  }

  fn carry_over(&self, previous: &Self) {
    self.value.set(previous.value.get_untracked());
  }

  fn start(self: &Rc<Self>) {
    if !self.definition.enabled {
      debug!(transformer = %self.definition.name, "transformer disabled, keeping last value");
      return;
    }
    let this = Rc::downgrade(self);
    let effect = Effect::new(move || {
      if let Some(this) = this.upgrade() {
        this.compute();
      }
    });
    *self.effect.borrow_mut() = Some(effect);
  }

  fn stop(&self) {
    if let Some(effect) = self.effect.borrow_mut().take() {
      effect.dispose();
    }
  }
}
