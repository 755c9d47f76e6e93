//! Data responders: watch expressions that run Lua when their values change.
//!
//! A responder subscribes to the whole namespace, re-resolves its watch list
//! on every recomputation and compares the result with the last snapshot.
//! Execution is always deferred to a local task so author code never mutates
//! cells while the namespace is being evaluated.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{Entity, RunState, default_true};
use crate::app::AppRef;
use crate::namespace::EntityKind;
use crate::reactive::{Effect, Signal, batch, untracked};
use crate::script::bridge;
use crate::task;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponderDefinition {
  pub id: String,
  pub name: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Binding strings, e.g. `{{ input1.value }}`.
  #[serde(default)]
  pub watch: Vec<String>,
  pub code: String,
  #[serde(default)]
  pub debounce_ms: u64,
  #[serde(default)]
  pub run_on_init: bool,
}

pub struct DataResponder {
  definition: DataResponderDefinition,
  app: AppRef,
  state: Signal<RunState>,
  error: Signal<Option<String>>,
  last_run_time: Signal<Option<u64>>,
  run_count: Signal<u64>,
  snapshot: RefCell<Option<Vec<JsonValue>>>,
  effect: RefCell<Option<Effect>>,
  /// Pending debounced execution; replaced on every qualifying change.
  timer: RefCell<Option<JoinHandle<()>>>,
  /// Next-tick executions not yet finished.
  pending: RefCell<Vec<JoinHandle<()>>>,
  stopped: Cell<bool>,
}

impl DataResponder {
  pub fn state(&self) -> RunState {
    self.state.get()
  }

  pub fn error(&self) -> Option<String> {
    self.error.get()
  }

  pub fn run_count(&self) -> u64 {
    self.run_count.get_untracked()
  }

  pub fn is_subscribed(&self) -> bool {
    self.effect.borrow().is_some()
  }

  /// Last observed watch values, if the responder has observed at all.
  pub fn snapshot(&self) -> Option<Vec<JsonValue>> {
    self.snapshot.borrow().clone()
  }

  /// Schedules an execution on the next tick, ignoring the debounce window.
  pub fn trigger(self: &Rc<Self>) {
    self.schedule(Duration::ZERO);
  }

  fn observe(self: &Rc<Self>) {
    let Some(app) = self.app.upgrade() else {
      return;
    };
    let namespace = app.namespace_cell().get();

    let values: Vec<JsonValue> = untracked(|| {
      self
        .definition
        .watch
        .iter()
        .map(|expression| {
          app.resolver().resolve(expression, &namespace).unwrap_or_else(|err| {
            debug!(responder = %self.definition.name, expression = %expression, error = %err, "watch expression failed");
            JsonValue::Null
          })
        })
        .collect()
    });

    let previous = self.snapshot.replace(Some(values.clone()));
    let fire = match previous {
      None => self.definition.run_on_init,
      Some(previous) => previous != values,
    };
    if fire {
      debug!(responder = %self.definition.name, "watched values changed");
      self.schedule(Duration::from_millis(self.definition.debounce_ms));
    }
  }

  fn schedule(self: &Rc<Self>, delay: Duration) {
    if self.stopped.get() {
      return;
    }
    let this = Rc::downgrade(self);
    let handle = task::spawn("data responder", async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      if let Some(this) = this.upgrade() {
        this.execute();
      }
    });

    let Some(handle) = handle else {
      return;
    };

    if delay.is_zero() {
      let mut pending = self.pending.borrow_mut();
      pending.retain(|h| !h.is_finished());
      pending.push(handle);
    } else if let Some(previous) = self.timer.replace(Some(handle)) {
      debug!(responder = %self.definition.name, "debounce timer replaced");
      previous.abort();
    }
  }

  fn abort_scheduled(&self) {
    if let Some(timer) = self.timer.borrow_mut().take() {
      timer.abort();
    }
    for handle in self.pending.borrow_mut().drain(..) {
      handle.abort();
    }
  }

  fn execute(&self) {
    if self.stopped.get() {
      return;
    }
    let Some(app) = self.app.upgrade() else {
      return;
    };
    let name = &self.definition.name;
    info!(responder = %name, "executing data responder");
    self.state.set(RunState::Running);

    let started = Instant::now();
    let namespace = app.snapshot();
    let outcome = batch(|| {
      bridge::effect_env(&app, &namespace, &JsonValue::Null)
        .and_then(|env| app.scripts().eval(name, &self.definition.code, env))
    });
    let elapsed = started.elapsed().as_millis() as u64;

    batch(|| {
      match outcome {
        Ok(_) => {
          self.error.set(None);
          self.state.set(RunState::Success);
        }
        Err(err) => {
          error!(responder = %name, error = %err, "data responder failed");
          self.error.set(Some(err.to_string()));
          self.state.set(RunState::Error);
        }
      }
      self.last_run_time.set(Some(elapsed));
      self.run_count.update(|count| *count += 1);
    });
  }
}

impl Entity for DataResponder {
  type Definition = DataResponderDefinition;

  const KIND: EntityKind = EntityKind::DataResponder;

  fn create(definition: DataResponderDefinition, app: AppRef) -> Rc<Self> {
    Rc::new(Self {
      definition,
      app,
      state: Signal::new(RunState::Idle),
      error: Signal::new(None),
      last_run_time: Signal::new(None),
      run_count: Signal::new(0),
      snapshot: RefCell::new(None),
      effect: RefCell::new(None),
      timer: RefCell::new(None),
      pending: RefCell::new(Vec::new()),
      stopped: Cell::new(false),
    })
  }

  fn definition_id(definition: &DataResponderDefinition) -> &str {
    &definition.id
  }

  fn definition(&self) -> &DataResponderDefinition {
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
      "state": self.state.get().as_str(),
      "error": self.error.get(),
      "lastRunTime": self.last_run_time.get(),
      "runCount": self.run_count.get(),
    })
  }

  fn start(self: &Rc<Self>) {
    if !self.definition.enabled {
      debug!(responder = %self.definition.name, "data responder disabled");
      return;
    }
    let this = Rc::downgrade(self);
    let effect = Effect::new(move || {
      if let Some(this) = this.upgrade() {
        this.observe();
      }
    });
    *self.effect.borrow_mut() = Some(effect);
  }

  fn stop(&self) {
    self.stopped.set(true);
    if let Some(effect) = self.effect.borrow_mut().take() {
      effect.dispose();
    }
    self.abort_scheduled();
  }
}

impl Drop for DataResponder {
  fn drop(&mut self) {
    self.abort_scheduled();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn definition_defaults() {
    let definition: DataResponderDefinition =
      serde_json::from_value(json!({"id": "r1", "name": "onChange", "code": "log('x')"})).unwrap();
    assert!(definition.enabled);
    assert!(definition.watch.is_empty());
    assert_eq!(definition.debounce_ms, 0);
    assert!(!definition.run_on_init);
  }

  #[test]
  fn disabled_responder_never_subscribes() {
    let responder = DataResponder::create(
      serde_json::from_value(json!({"id": "r1", "name": "r", "code": "", "enabled": false})).unwrap(),
      AppRef::default(),
    );
    responder.start();
    assert!(!responder.is_subscribed());
    assert!(responder.snapshot().is_none());
  }

  #[test]
  fn stop_releases_the_subscription() {
    let responder = DataResponder::create(
      serde_json::from_value(json!({"id": "r1", "name": "r", "code": ""})).unwrap(),
      AppRef::default(),
    );
    responder.start();
    assert!(responder.is_subscribed());
    responder.stop();
    assert!(!responder.is_subscribed());
  }
}
