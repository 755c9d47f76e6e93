//! Live widget instances.
//!
//! A component's props are bindable cells the widget layer reads for
//! rendering. Its exposed state (what other entities see in the namespace)
//! is written by the widget layer through [`Component::set_exposed`].

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::entity::EntityError;
use crate::namespace::{EntityKind, Namespace};
use crate::reactive::{Memo, Signal, batch};
use crate::registry::{ComponentType, TypeRegistry};
use crate::resolve::Resolver;
use crate::state::{CellMode, CompState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub component_type: String,
  #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
  pub props: IndexMap<String, CellMode>,
}

pub struct Component {
  id: String,
  component_type: String,
  name: Signal<String>,
  props: RefCell<IndexMap<String, CompState>>,
  /// Props that were persisted or assigned, as opposed to registry defaults.
  explicit: RefCell<IndexSet<String>>,
  exposed: Signal<JsonMap<String, JsonValue>>,
  namespace: Namespace,
  resolver: Resolver,
}

impl Component {
  fn new(definition: ComponentDefinition, known: Option<&ComponentType>, namespace: Namespace, resolver: Resolver) -> Self {
    let mut props = IndexMap::new();
    let mut explicit = IndexSet::new();
    for (prop, mode) in definition.props {
      let default = known
        .and_then(|t| t.default_props.get(&prop))
        .cloned()
        .unwrap_or(JsonValue::Null);
      props.insert(
        prop.clone(),
        CompState::with_mode(default, mode, namespace.clone(), resolver),
      );
      explicit.insert(prop);
    }
    if let Some(known) = known {
      for (prop, default) in &known.default_props {
        if !props.contains_key(prop) {
          props.insert(prop.clone(), CompState::new(default.clone(), namespace.clone(), resolver));
        }
      }
    }

    Self {
      id: definition.id,
      component_type: definition.component_type,
      name: Signal::new(definition.name),
      props: RefCell::new(props),
      explicit: RefCell::new(explicit),
      exposed: Signal::new(known.map(|t| t.default_exposed.clone()).unwrap_or_default()),
      namespace,
      resolver,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn component_type(&self) -> &str {
    &self.component_type
  }

  pub fn name(&self) -> String {
    self.name.get_untracked()
  }

  /// Handle on a prop cell.
  pub fn prop(&self, name: &str) -> Option<CompState> {
    self.props.borrow().get(name).cloned()
  }

  /// Tracked read of a prop's derived value.
  pub fn prop_value(&self, name: &str) -> Option<JsonValue> {
    self.prop(name).map(|cell| cell.value())
  }

  pub fn prop_names(&self) -> Vec<String> {
    self.props.borrow().keys().cloned().collect()
  }

  /// Assigns a prop, binding when the value contains a `{{ ... }}` run.
  /// Unknown props are created with a `null` default.
  pub fn set_prop(&self, name: &str, value: JsonValue) {
    let existing = self.prop(name);
    let cell = match existing {
      Some(cell) => cell,
      None => {
        let cell = CompState::new(JsonValue::Null, self.namespace.clone(), self.resolver);
        self.props.borrow_mut().insert(name.to_string(), cell.clone());
        cell
      }
    };
    self.explicit.borrow_mut().insert(name.to_string());
    cell.assign(value);
  }

  /// Tracked read of the exposed state.
  pub fn exposed(&self) -> JsonValue {
    JsonValue::Object(self.exposed.get())
  }

  /// Writes one exposed key. Equal values do not notify.
  pub fn set_exposed(&self, key: &str, value: JsonValue) {
    if self.exposed.with_untracked(|map| map.get(key) == Some(&value)) {
      return;
    }
    debug!(component = %self.name(), key, "exposed state changed");
    self.exposed.update(|map| {
      map.insert(key.to_string(), value);
    });
  }

  /// Persisted form: explicit props keep their bind mode.
  pub fn definition(&self) -> ComponentDefinition {
    let explicit = self.explicit.borrow();
    let props = self
      .props
      .borrow()
      .iter()
      .filter(|(name, cell)| explicit.contains(*name) || cell.mode() != CellMode::Static(cell.default_value().clone()))
      .map(|(name, cell)| (name.clone(), cell.mode()))
      .collect();
    ComponentDefinition {
      id: self.id.clone(),
      name: self.name(),
      component_type: self.component_type.clone(),
      props,
    }
  }
}

/// All components of an application, keyed by id.
pub struct ComponentSet {
  components: Signal<IndexMap<String, Rc<Component>>>,
  exposed: Memo<Rc<Vec<(String, JsonValue)>>>,
  registry: TypeRegistry,
  namespace: Namespace,
  resolver: Resolver,
}

impl ComponentSet {
  pub(crate) fn new(registry: TypeRegistry, namespace: Namespace, resolver: Resolver) -> Self {
    let components: Signal<IndexMap<String, Rc<Component>>> = Signal::new(IndexMap::new());
    let exposed = {
      let components = components.clone();
      Memo::new(move || {
        let live: Vec<Rc<Component>> = components.with(|map| map.values().cloned().collect());
        Rc::new(
          live
            .iter()
            .map(|component| (component.name.get(), component.exposed()))
            .collect(),
        )
      })
    };
    Self {
      components,
      exposed,
      registry,
      namespace,
      resolver,
    }
  }

  pub fn registry(&self) -> &TypeRegistry {
    &self.registry
  }

  pub fn add(&self, definition: ComponentDefinition) -> Result<Rc<Component>, EntityError> {
    if definition.name.trim().is_empty() {
      return Err(EntityError::EmptyName {
        kind: EntityKind::Component,
        id: definition.id,
      });
    }
    if self.get(&definition.id).is_some() {
      return Err(EntityError::DuplicateId {
        kind: EntityKind::Component,
        id: definition.id,
      });
    }

    let known = self.registry.get(&definition.component_type);
    if known.is_none() {
      warn!(component_type = %definition.component_type, id = %definition.id, "unknown component type, props have no defaults");
    }
    let component = Rc::new(Component::new(definition, known, self.namespace.clone(), self.resolver));
    let id = component.id.clone();
    batch(|| self.components.update(|map| {
      map.insert(id.clone(), component.clone());
    }));
    info!(id = %id, name = %component.name(), component_type = %component.component_type, "component added");
    Ok(component)
  }

  pub fn remove(&self, id: &str) -> Result<Rc<Component>, EntityError> {
    let Some(component) = self.get(id) else {
      return Err(EntityError::NotFound {
        kind: EntityKind::Component,
        id: id.to_string(),
      });
    };
    batch(|| self.components.update(|map| {
      map.shift_remove(id);
    }));
    info!(id = %id, "component removed");
    Ok(component)
  }

  /// Renames a component; its namespace key moves with it.
  pub fn rename(&self, id: &str, name: impl Into<String>) -> Result<(), EntityError> {
    let name = name.into();
    let Some(component) = self.get(id) else {
      return Err(EntityError::NotFound {
        kind: EntityKind::Component,
        id: id.to_string(),
      });
    };
    if name.trim().is_empty() {
      return Err(EntityError::EmptyName {
        kind: EntityKind::Component,
        id: id.to_string(),
      });
    }
    info!(id = %id, from = %component.name(), to = %name, "component renamed");
    component.name.set(name);
    Ok(())
  }

  pub fn clear(&self) {
    batch(|| self.components.update(|map| map.clear()));
  }

  pub fn get(&self, id: &str) -> Option<Rc<Component>> {
    self.components.with_untracked(|map| map.get(id).cloned())
  }

  pub fn get_by_name(&self, name: &str) -> Option<Rc<Component>> {
    self
      .components
      .with_untracked(|map| map.values().find(|c| c.name.with_untracked(|n| n == name)).cloned())
  }

  pub fn all(&self) -> Vec<Rc<Component>> {
    self.components.with_untracked(|map| map.values().cloned().collect())
  }

  pub fn ids(&self) -> Vec<String> {
    self.components.with_untracked(|map| map.keys().cloned().collect())
  }

  pub fn definitions(&self) -> Vec<ComponentDefinition> {
    self.all().iter().map(|c| c.definition()).collect()
  }

  pub fn len(&self) -> usize {
    self.components.with_untracked(|map| map.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Tracked `(name, exposed)` pairs for the namespace.
  pub fn exposed(&self) -> Rc<Vec<(String, JsonValue)>> {
    self.exposed.get()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::namespace::NamespaceMap;
  use serde_json::json;

  fn fixed_namespace(value: JsonValue) -> (Signal<NamespaceMap>, Namespace) {
    let cell = Signal::new(value.as_object().cloned().unwrap());
    let source = cell.clone();
    (cell, Namespace::new(Memo::new(move || Rc::new(source.get()))))
  }

  fn set() -> (Signal<NamespaceMap>, ComponentSet) {
    let (cell, namespace) = fixed_namespace(json!({"state1": {"value": "bound"}}));
    (cell, ComponentSet::new(TypeRegistry::standard(), namespace, Resolver::default()))
  }

  fn input(id: &str, name: &str) -> ComponentDefinition {
    ComponentDefinition {
      id: id.into(),
      name: name.into(),
      component_type: "textInput".into(),
      props: IndexMap::new(),
    }
  }

  #[test]
  fn props_take_registry_defaults() {
    let (_ns, components) = set();
    let component = components.add(input("c1", "input1")).unwrap();
    assert_eq!(component.prop_value("placeholder"), Some(json!("")));
    assert_eq!(component.exposed(), json!({"value": ""}));
    assert!(component.definition().props.is_empty());
  }

  #[test]
  fn bound_props_follow_the_namespace() {
    let (ns, components) = set();
    let mut definition = input("c1", "input1");
    definition.props.insert("label".into(), CellMode::Bound("{{ state1.value }}".into()));
    let component = components.add(definition).unwrap();
    assert_eq!(component.prop_value("label"), Some(json!("bound")));

    ns.set(json!({"state1": {"value": "changed"}}).as_object().cloned().unwrap());
    assert_eq!(component.prop_value("label"), Some(json!("changed")));
  }

  #[test]
  fn rename_moves_the_exposed_entry() {
    let (_ns, components) = set();
    components.add(input("c1", "input1")).unwrap();
    assert_eq!(components.exposed()[0].0, "input1");
    components.rename("c1", "nameField").unwrap();
    assert_eq!(components.exposed()[0].0, "nameField");
    assert!(components.get_by_name("input1").is_none());
    assert!(matches!(components.rename("c1", ""), Err(EntityError::EmptyName { .. })));
    assert!(matches!(components.rename("nope", "x"), Err(EntityError::NotFound { .. })));
  }

  #[test]
  fn set_exposed_skips_equal_values() {
    let (_ns, components) = set();
    let component = components.add(input("c1", "input1")).unwrap();
    let before = components.exposed();
    component.set_exposed("value", json!(""));
    assert!(Rc::ptr_eq(&before, &components.exposed()));
    component.set_exposed("value", json!("typed"));
    assert_eq!(components.exposed()[0].1, json!({"value": "typed"}));
  }

  #[test]
  fn definitions_round_trip_explicit_props() {
    let (_ns, components) = set();
    let definition: ComponentDefinition = serde_json::from_value(json!({
      "id": "c1",
      "name": "input1",
      "type": "textInput",
      "props": {"label": "Name", "placeholder": "{{ state1.value }}"}
    }))
    .unwrap();
    let component = components.add(definition.clone()).unwrap();
    assert_eq!(component.definition(), definition);

    component.set_prop("disabled", json!(true));
    assert_eq!(component.definition().props["disabled"], CellMode::Static(json!(true)));
  }

  #[test]
  fn duplicate_ids_are_rejected() {
    let (_ns, components) = set();
    components.add(input("c1", "a")).unwrap();
    assert!(matches!(components.add(input("c1", "b")), Err(EntityError::DuplicateId { .. })));
    components.remove("c1").unwrap();
    assert!(components.is_empty());
  }
}
