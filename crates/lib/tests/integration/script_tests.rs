//! Mutators reachable from effect scripts.

use bindscope_lib::task::run_local;
use serde_json::json;

use super::common::{app, schema, settle};

#[tokio::test]
async fn temp_state_mutators() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "filters", "initialValue": {"page": 1}}],
      "queries": [
        {"id": "q1", "name": "nextPage", "action": {"type": "script", "code": "filters.setIn('page', filters.value.page + 1)"}},
        {"id": "q2", "name": "clearFilters", "action": {"type": "script", "code": "filters.reset()"}},
        {"id": "q3", "name": "replace", "action": {"type": "script", "code": "filters.setValue({ page = 9, sort = 'name' })"}}
      ]
    })))
    .unwrap();

  app.run_query("nextPage", json!(null)).await.unwrap();
  assert_eq!(app.resolve("{{ filters.value }}").unwrap(), json!({"page": 2}));
  app.run_query("replace", json!(null)).await.unwrap();
  assert_eq!(app.resolve("{{ filters.value.sort }}").unwrap(), json!("name"));
  app.run_query("clearFilters", json!(null)).await.unwrap();
  assert_eq!(app.resolve("{{ filters.value }}").unwrap(), json!({"page": 1}));
}

#[tokio::test]
async fn set_in_requires_a_path() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "s", "initialValue": 0}],
      "queries": [{"id": "q1", "name": "bad", "action": {"type": "script", "code": "s.setIn(1, 2)"}}]
    })))
    .unwrap();

  let result = app.run_query("bad", json!(null)).await.unwrap();
  assert!(!result.success);
  assert!(result.message.unwrap().contains("setIn expects a path string"));
}

#[tokio::test]
async fn set_in_refuses_huge_array_indices() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "s", "initialValue": {"rows": [1]}}],
      "queries": [{"id": "q1", "name": "grow", "action": {"type": "script", "code": "s.setIn('rows.18446744073709551615', 1)"}}]
    })))
    .unwrap();

  let result = app.run_query("grow", json!(null)).await.unwrap();
  assert!(!result.success);
  assert!(result.message.unwrap().contains("past the array limit"));
  assert_eq!(app.resolve("{{ s.value }}").unwrap(), json!({"rows": [1]}));
}

#[tokio::test]
async fn mutations_inside_a_script_settle_after_it() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [
        {"id": "s1", "name": "a", "initialValue": 0},
        {"id": "s2", "name": "b", "initialValue": 0}
      ],
      "transformers": [{"id": "t1", "name": "sum", "code": "return a.value + b.value"}],
      "queries": [{"id": "q1", "name": "setBoth", "action": {"type": "script", "code": "a.setValue(2)\nb.setValue(3)\nreturn 'done'"}}]
    })))
    .unwrap();

  let result = app.run_query("setBoth", json!(null)).await.unwrap();
  assert_eq!(result.data, json!("done"));
  assert_eq!(app.resolve("{{ sum.value }}").unwrap(), json!(5));
}

#[tokio::test]
async fn responders_trigger_on_demand() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [{"id": "s1", "name": "count", "initialValue": 0}],
        "dataResponders": [{"id": "r1", "name": "bump", "code": "count.setValue(count.value + 1)"}],
        "queries": [{"id": "q1", "name": "kick", "action": {"type": "script", "code": "bump.trigger()"}}]
      })))
      .unwrap();

    app.run_query("kick", json!(null)).await.unwrap();
    settle().await;
    assert_eq!(app.resolve("count.value").unwrap(), json!(1));

    app.responders().get("r1").unwrap().trigger();
    settle().await;
    assert_eq!(app.resolve("count.value").unwrap(), json!(2));
  })
  .await;
}

#[tokio::test]
async fn script_queries_cannot_reach_removed_entities() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "gone", "initialValue": 1}],
      "queries": [{"id": "q1", "name": "check", "action": {"type": "script", "code": "return gone == nil"}}]
    })))
    .unwrap();
  app.temp_states().remove("s1").unwrap();

  let result = app.run_query("check", json!(null)).await.unwrap();
  assert_eq!(result.data, json!(true));
}
