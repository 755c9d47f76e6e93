//! Namespace assembly, transformers, components and schema round trips.

use bindscope_lib::AppError;
use bindscope_lib::component::ComponentDefinition;
use bindscope_lib::entity::{EntityError, RunState, TransformerDefinition};
use bindscope_lib::namespace::{EntityKind, NameCollision};
use bindscope_lib::state::CellMode;
use serde_json::{Value as JsonValue, json};

use super::common::{app, schema};

fn sample() -> JsonValue {
  json!({
    "components": [
      {"id": "c1", "name": "input1", "type": "textInput", "props": {"label": "{{ greeting.value }}", "placeholder": "Type"}},
      {"id": "c2", "name": "table1", "type": "table", "props": {"data": "{{ double.value }}"}}
    ],
    "queries": [{
      "id": "q1",
      "name": "users",
      "enabled": true,
      "action": {"type": "restApi", "method": "GET", "url": "https://api.test/users?q={{ input1.value }}"},
      "cacheTimeMs": 1000,
      "cancelPrevious": true,
      "runOnLoad": false
    }],
    "tempStates": [
      {"id": "s1", "name": "greeting", "initialValue": "Hello"},
      {"id": "s2", "name": "numbers", "initialValue": [1, 2, 3]}
    ],
    "transformers": [
      {"id": "t1", "name": "double", "enabled": true, "code": "local out = {}\nfor i, v in ipairs(numbers.value) do out[i] = v * 2 end\nreturn out"}
    ],
    "dataResponders": [{
      "id": "r1",
      "name": "onInput",
      "enabled": true,
      "watch": ["{{ input1.value }}"],
      "code": "users.run()",
      "debounceMs": 250,
      "runOnInit": false
    }]
  })
}

#[test]
fn namespace_holds_every_kind() {
  let app = app();
  app.load_schema(schema(sample())).unwrap();

  let namespace = app.snapshot();
  let names: Vec<&str> = namespace.keys().map(String::as_str).collect();
  assert_eq!(
    names,
    vec!["input1", "table1", "users", "greeting", "numbers", "double", "onInput"]
  );
  assert_eq!(namespace["users"]["state"], json!("idle"));
  assert_eq!(namespace["onInput"]["runCount"], json!(0));
}

#[test]
fn schema_round_trips() {
  let app = app();
  let original = schema(sample());
  app.load_schema(original.clone()).unwrap();
  assert_eq!(app.to_schema(), original);

  let component = app.components().get("c1").unwrap();
  assert_eq!(
    component.definition().props["label"],
    CellMode::Bound("{{ greeting.value }}".into())
  );
}

#[test]
fn transformers_follow_their_inputs() {
  let app = app();
  app.load_schema(schema(sample())).unwrap();
  assert_eq!(app.resolve("{{ double.value }}").unwrap(), json!([2, 4, 6]));

  app.temp_states().get("s2").unwrap().set_value(json!([5]));
  assert_eq!(app.resolve("{{ double.value }}").unwrap(), json!([10]));

  let table = app.components().get("c2").unwrap();
  assert_eq!(table.prop_value("data"), Some(json!([10])));
}

#[test]
fn bound_props_follow_temp_state() {
  let app = app();
  app.load_schema(schema(sample())).unwrap();
  let input = app.components().get("c1").unwrap();
  assert_eq!(input.prop_value("label"), Some(json!("Hello")));
  app.temp_states().get("s1").unwrap().set_value(json!("Hi"));
  assert_eq!(input.prop_value("label"), Some(json!("Hi")));
}

#[test]
fn renaming_a_component_moves_its_entry() {
  let app = app();
  app.load_schema(schema(sample())).unwrap();
  let input = app.components().get("c1").unwrap();
  input.set_exposed("value", json!("ada"));
  assert_eq!(app.resolve("{{ input1.value }}").unwrap(), json!("ada"));

  app.components().rename("c1", "nameField").unwrap();
  assert_eq!(app.resolve("{{ nameField.value }}").unwrap(), json!("ada"));
  assert_eq!(app.resolve("input1.value").unwrap(), JsonValue::Null);
  assert_eq!(app.resolve("{{ input1?.value }}").unwrap(), JsonValue::Null);
}

#[test]
fn failing_transformers_keep_their_last_value() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "n", "initialValue": 2}],
      "transformers": [{"id": "t1", "name": "half", "code": "assert(type(n.value) == 'number', 'n must be a number')\nreturn n.value / 2"}]
    })))
    .unwrap();
  let half = app.transformers().get("t1").unwrap();
  assert_eq!(half.value(), json!(1.0));

  app.temp_states().get("s1").unwrap().set_value(json!("two"));
  assert_eq!(half.state(), RunState::Error);
  assert!(half.error().unwrap().contains("n must be a number"));
  assert_eq!(half.value(), json!(1.0));

  app.temp_states().get("s1").unwrap().set_value(json!(8));
  assert_eq!(half.state(), RunState::Success);
  assert_eq!(half.value(), json!(4.0));
  assert_eq!(half.error(), None);
}

#[test]
fn disabled_transformers_keep_the_value_they_replace() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "n", "initialValue": 3}],
      "transformers": [{"id": "t1", "name": "square", "code": "return n.value * n.value"}]
    })))
    .unwrap();
  assert_eq!(app.resolve("{{ square.value }}").unwrap(), json!(9));

  app
    .transformers()
    .update(TransformerDefinition {
      id: "t1".into(),
      name: "square".into(),
      enabled: false,
      code: "return n.value * n.value".into(),
    })
    .unwrap();
  app.temp_states().get("s1").unwrap().set_value(json!(4));
  assert_eq!(app.resolve("{{ square.value }}").unwrap(), json!(9));
  assert!(!app.transformers().get("t1").unwrap().is_running());
}

#[test]
fn refresh_recomputes_the_transformer() {
  let app = app();
  app
    .load_schema(schema(json!({
      "transformers": [{"id": "t1", "name": "stamp", "code": "return 1"}]
    })))
    .unwrap();
  let stamp = app.transformers().get("t1").unwrap();
  let before = stamp.run_count();
  stamp.refresh();
  assert_eq!(stamp.state(), RunState::Success);
  assert_eq!(stamp.value(), json!(1));
  assert_eq!(stamp.run_count(), before + 1);
}

#[test]
fn transformers_run_once_per_input_change() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [
        {"id": "s1", "name": "n", "initialValue": 1},
        {"id": "s2", "name": "other", "initialValue": 0}
      ],
      "transformers": [
        {"id": "t1", "name": "double", "code": "return n.value * 2"},
        {"id": "t2", "name": "quad", "code": "return double.value * 2"}
      ]
    })))
    .unwrap();
  let double = app.transformers().get("t1").unwrap();
  let quad = app.transformers().get("t2").unwrap();
  let (double_before, quad_before) = (double.run_count(), quad.run_count());

  app.temp_states().get("s1").unwrap().set_value(json!(5));
  assert_eq!(double.value(), json!(10));
  assert_eq!(quad.value(), json!(20));
  assert_eq!(double.run_count(), double_before + 1);
  assert_eq!(quad.run_count(), quad_before + 1);

  // entries the code never reads do not rerun it
  app.temp_states().get("s2").unwrap().set_value(json!(7));
  assert_eq!(double.run_count(), double_before + 1);
  assert_eq!(quad.run_count(), quad_before + 1);
}

#[test]
fn name_collisions_are_reported() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "shared", "initialValue": "state"}],
      "transformers": [{"id": "t1", "name": "shared", "code": "return 'transformer'"}]
    })))
    .unwrap();

  assert_eq!(app.resolve("{{ shared.value }}").unwrap(), json!("transformer"));
  assert_eq!(
    app.name_collisions(),
    vec![NameCollision {
      name: "shared".into(),
      shadowed: EntityKind::TempState,
      winner: EntityKind::Transformer,
    }]
  );

  app.temp_states().remove("s1").unwrap();
  assert!(app.name_collisions().is_empty());
}

#[test]
fn duplicate_ids_fail_the_load() {
  let app = app();
  let err = app
    .load_schema(schema(json!({
      "tempStates": [
        {"id": "s1", "name": "a", "initialValue": 1},
        {"id": "s1", "name": "b", "initialValue": 2}
      ]
    })))
    .unwrap_err();
  assert!(matches!(
    err,
    AppError::Entity(EntityError::DuplicateId {
      kind: EntityKind::TempState,
      ..
    })
  ));
}

#[test]
fn components_with_unknown_types_still_load() {
  let app = app();
  app
    .components()
    .add(ComponentDefinition {
      id: "c1".into(),
      name: "chart1".into(),
      component_type: "chart".into(),
      props: [("title".to_string(), CellMode::Static(json!("Sales")))].into_iter().collect(),
    })
    .unwrap();
  assert_eq!(app.resolve("chart1").unwrap(), json!({}));
  assert_eq!(app.components().get("c1").unwrap().prop_value("title"), Some(json!("Sales")));
}

#[test]
fn clear_empties_the_namespace() {
  let app = app();
  app.load_schema(schema(sample())).unwrap();
  app.clear();
  assert!(app.snapshot().is_empty());
  assert!(app.to_schema().is_empty());
}

#[test]
fn denylisted_names_evaluate_to_null() {
  let app = app();
  assert_eq!(app.evaluate("document").unwrap(), JsonValue::Null);
  assert_eq!(app.evaluate("typeof fetch").unwrap(), json!("undefined"));
  assert_eq!(app.evaluate("1 + 2").unwrap(), json!(3));
}
