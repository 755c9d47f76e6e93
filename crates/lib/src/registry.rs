//! Component type defaults.
//!
//! The registry is an explicit value owned by the application; nothing here
//! is global. The widget layer registers its types before loading a schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tracing::debug;

/// Defaults for one widget type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentType {
  pub name: String,
  /// Prop defaults; a prop's bound expression falls back to these on failure.
  #[serde(default)]
  pub default_props: IndexMap<String, JsonValue>,
  /// Exposed state a fresh instance starts with.
  #[serde(default)]
  pub default_exposed: JsonMap<String, JsonValue>,
}

impl ComponentType {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  pub fn prop(mut self, name: impl Into<String>, default: JsonValue) -> Self {
    self.default_props.insert(name.into(), default);
    self
  }

  pub fn exposes(mut self, name: impl Into<String>, initial: JsonValue) -> Self {
    self.default_exposed.insert(name.into(), initial);
    self
  }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
  types: IndexMap<String, ComponentType>,
}

impl TypeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with a handful of common widgets.
  pub fn standard() -> Self {
    let mut registry = Self::new();
    registry.register(
      ComponentType::new("text")
        .prop("text", json!(""))
        .prop("hidden", json!(false)),
    );
    registry.register(
      ComponentType::new("textInput")
        .prop("label", json!(""))
        .prop("placeholder", json!(""))
        .prop("defaultValue", json!(""))
        .prop("disabled", json!(false))
        .exposes("value", json!("")),
    );
    registry.register(
      ComponentType::new("numberInput")
        .prop("label", json!(""))
        .prop("defaultValue", json!(0))
        .exposes("value", json!(0)),
    );
    registry.register(
      ComponentType::new("button")
        .prop("text", json!("Button"))
        .prop("disabled", json!(false))
        .prop("loading", json!(false)),
    );
    registry.register(
      ComponentType::new("select")
        .prop("options", json!([]))
        .prop("defaultValue", JsonValue::Null)
        .exposes("value", JsonValue::Null)
        .exposes("selectedOption", JsonValue::Null),
    );
    registry.register(
      ComponentType::new("checkbox")
        .prop("label", json!(""))
        .prop("defaultValue", json!(false))
        .exposes("value", json!(false)),
    );
    registry.register(
      ComponentType::new("table")
        .prop("data", json!([]))
        .prop("pageSize", json!(10))
        .exposes("selectedRow", JsonValue::Null)
        .exposes("selectedRowIndex", json!(-1))
        .exposes("page", json!(1)),
    );
    registry.register(ComponentType::new("container").prop("hidden", json!(false)));
    registry
  }

  /// Adds or replaces a type.
  pub fn register(&mut self, component_type: ComponentType) {
    debug!(component_type = %component_type.name, "registering component type");
    self.types.insert(component_type.name.clone(), component_type);
  }

  pub fn get(&self, name: &str) -> Option<&ComponentType> {
    self.types.get(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.types.keys().map(String::as_str)
  }
}
