//! Generic instance manager shared by every entity kind.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::{Entity, EntityError};
use crate::app::AppRef;
use crate::reactive::{Memo, Signal, batch, untracked};

/// Owns the live instances of one entity kind, keyed by id in insertion order.
pub struct Manager<E: Entity> {
  instances: Signal<IndexMap<String, Rc<E>>>,
  exposed: Memo<Rc<Vec<(String, JsonValue)>>>,
  app: AppRef,
}

impl<E: Entity> Manager<E> {
  pub(crate) fn new(app: AppRef) -> Self {
    let instances: Signal<IndexMap<String, Rc<E>>> = Signal::new(IndexMap::new());
    let exposed = {
      let instances = instances.clone();
      Memo::new(move || {
        let live: Vec<Rc<E>> = instances.with(|map| map.values().cloned().collect());
        Rc::new(
          live
            .iter()
            .map(|instance| (instance.name().to_string(), instance.exposed()))
            .collect(),
        )
      })
    };
    Self { instances, exposed, app }
  }

  fn validate(&self, instance: &E) -> Result<(), EntityError> {
    if instance.name().trim().is_empty() {
      return Err(EntityError::EmptyName {
        kind: E::KIND,
        id: instance.id().to_string(),
      });
    }
    Ok(())
  }

  /// Builds and starts an instance for a new definition.
  pub fn add(&self, definition: E::Definition) -> Result<Rc<E>, EntityError> {
    let instance = E::create(definition, self.app.clone());
    self.validate(&instance)?;
    let id = instance.id().to_string();
    if self.instances.with_untracked(|map| map.contains_key(&id)) {
      return Err(EntityError::DuplicateId { kind: E::KIND, id });
    }

    batch(|| self.instances.update(|map| {
      map.insert(id.clone(), instance.clone());
    }));
    instance.start();
    info!(kind = %E::KIND, id = %id, name = %instance.name(), "entity added");
    Ok(instance)
  }

  /// Replaces an instance wholesale: the old one is stopped, a new one built.
  pub fn update(&self, definition: E::Definition) -> Result<Rc<E>, EntityError> {
    let instance = E::create(definition, self.app.clone());
    self.validate(&instance)?;
    let id = instance.id().to_string();
    let Some(previous) = self.get(&id) else {
      return Err(EntityError::NotFound { kind: E::KIND, id });
    };

    previous.stop();
    instance.carry_over(&previous);
    batch(|| self.instances.update(|map| {
      map.insert(id.clone(), instance.clone());
    }));
    instance.start();
    info!(kind = %E::KIND, id = %id, name = %instance.name(), "entity updated");
    Ok(instance)
  }

  /// Adds or updates depending on whether the id is known.
  pub fn upsert(&self, definition: E::Definition) -> Result<Rc<E>, EntityError> {
    if self.get(E::definition_id(&definition)).is_some() { self.update(definition) } else { self.add(definition) }
  }

  pub fn remove(&self, id: &str) -> Result<Rc<E>, EntityError> {
    let removed = self.instances.with_untracked(|map| map.get(id).cloned());
    let Some(instance) = removed else {
      return Err(EntityError::NotFound {
        kind: E::KIND,
        id: id.to_string(),
      });
    };
    instance.stop();
    batch(|| self.instances.update(|map| {
      map.shift_remove(id);
    }));
    info!(kind = %E::KIND, id = %id, "entity removed");
    Ok(instance)
  }

  /// Stops and drops every instance.
  pub fn clear(&self) {
    let all = self.all();
    for instance in &all {
      instance.stop();
    }
    batch(|| self.instances.update(|map| map.clear()));
    debug!(kind = %E::KIND, count = all.len(), "entities cleared");
  }

  pub fn get(&self, id: &str) -> Option<Rc<E>> {
    self.instances.with_untracked(|map| map.get(id).cloned())
  }

  pub fn get_by_name(&self, name: &str) -> Option<Rc<E>> {
    self
      .instances
      .with_untracked(|map| map.values().find(|i| i.name() == name).cloned())
  }

  pub fn ids(&self) -> Vec<String> {
    self.instances.with_untracked(|map| map.keys().cloned().collect())
  }

  pub fn all(&self) -> Vec<Rc<E>> {
    self.instances.with_untracked(|map| map.values().cloned().collect())
  }

  pub fn definitions(&self) -> Vec<E::Definition> {
    self
      .instances
      .with_untracked(|map| map.values().map(|i| i.definition().clone()).collect())
  }

  pub fn len(&self) -> usize {
    self.instances.with_untracked(|map| map.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Tracked `(name, exposed)` pairs for the namespace.
  pub fn exposed(&self) -> Rc<Vec<(String, JsonValue)>> {
    self.exposed.get()
  }

  /// Exposed values by name, without subscribing.
  pub fn exposed_map(&self) -> IndexMap<String, JsonValue> {
    untracked(|| self.exposed.get().iter().cloned().collect())
  }
}

impl<E: Entity> Drop for Manager<E> {
  fn drop(&mut self) {
    for instance in self.all() {
      instance.stop();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::temp_state::{TempState, TempStateDefinition};
  use crate::namespace::EntityKind;
  use serde_json::json;

  fn def(id: &str, name: &str, initial: JsonValue) -> TempStateDefinition {
    TempStateDefinition {
      id: id.into(),
      name: name.into(),
      initial_value: initial,
    }
  }

  #[test]
  fn add_get_and_duplicates() {
    let manager: Manager<TempState> = Manager::new(AppRef::default());
    manager.add(def("s1", "counter", json!(0))).unwrap();
    assert_eq!(manager.ids(), vec!["s1"]);
    assert!(manager.get_by_name("counter").is_some());
    assert_eq!(
      manager.add(def("s1", "other", json!(1))).err(),
      Some(EntityError::DuplicateId {
        kind: EntityKind::TempState,
        id: "s1".into(),
      })
    );
  }

  #[test]
  fn update_replaces_the_instance() {
    let manager: Manager<TempState> = Manager::new(AppRef::default());
    let first = manager.add(def("s1", "counter", json!(0))).unwrap();
    first.set_value(json!(5));
    let second = manager.update(def("s1", "renamed", json!(10))).unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(second.value(), json!(10));
    assert!(manager.get_by_name("counter").is_none());
    assert!(manager.update(def("missing", "x", json!(null))).is_err());
  }

  #[test]
  fn exposed_map_follows_changes() {
    let manager: Manager<TempState> = Manager::new(AppRef::default());
    let state = manager.add(def("s1", "counter", json!(0))).unwrap();
    assert_eq!(manager.exposed_map()["counter"]["value"], json!(0));
    state.set_value(json!(3));
    assert_eq!(manager.exposed_map()["counter"]["value"], json!(3));
    manager.remove("s1").unwrap();
    assert!(manager.exposed_map().is_empty());
    assert!(matches!(manager.remove("s1"), Err(EntityError::NotFound { .. })));
  }

  #[test]
  fn empty_names_are_rejected() {
    let manager: Manager<TempState> = Manager::new(AppRef::default());
    assert!(matches!(
      manager.add(def("s1", "  ", json!(0))),
      Err(EntityError::EmptyName { .. })
    ));
    assert!(manager.is_empty());
  }

  #[test]
  fn upsert_adds_then_updates() {
    let manager: Manager<TempState> = Manager::new(AppRef::default());
    manager.upsert(def("s1", "a", json!(1))).unwrap();
    manager.upsert(def("s1", "b", json!(2))).unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.definitions()[0].name, "b");
  }
}
