//! Data responder scheduling.

use std::time::Duration;

use bindscope_lib::entity::RunState;
use bindscope_lib::task::run_local;
use serde_json::json;
use tokio::time::sleep;

use super::common::{FakeExecutor, app, app_with, schema, settle};

#[tokio::test(start_paused = true)]
async fn debounce_runs_once_with_the_last_value() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [
          {"id": "s1", "name": "search", "initialValue": ""},
          {"id": "s2", "name": "seen", "initialValue": []}
        ],
        "dataResponders": [{
          "id": "r1",
          "name": "onSearch",
          "watch": ["{{ search.value }}"],
          "debounceMs": 300,
          "code": "local list = seen.value\nlist[#list + 1] = search.value\nseen.setValue(list)"
        }]
      })))
      .unwrap();
    let search = app.temp_states().get("s1").unwrap();
    let responder = app.responders().get("r1").unwrap();

    search.set_value(json!("a"));
    sleep(Duration::from_millis(100)).await;
    search.set_value(json!("ab"));

    sleep(Duration::from_millis(299)).await;
    assert_eq!(responder.run_count(), 0);

    sleep(Duration::from_millis(2)).await;
    assert_eq!(responder.run_count(), 1);
    assert_eq!(responder.state(), RunState::Success);
    assert_eq!(app.resolve("seen.value").unwrap(), json!(["ab"]));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(responder.run_count(), 1);
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn run_on_init_with_empty_watch_list_runs_once() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [{"id": "s1", "name": "hits", "initialValue": 0}],
        "dataResponders": [{
          "id": "r1",
          "name": "init",
          "runOnInit": true,
          "code": "hits.setValue(hits.value + 1)"
        }]
      })))
      .unwrap();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(app.resolve("hits.value").unwrap(), json!(1));
    assert_eq!(app.responders().get("r1").unwrap().run_count(), 1);
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn first_observation_only_records() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [{"id": "s1", "name": "value", "initialValue": 1}],
        "dataResponders": [{"id": "r1", "name": "watcher", "watch": ["{{ value.value }}"], "code": ""}]
      })))
      .unwrap();
    let responder = app.responders().get("r1").unwrap();

    settle().await;
    assert_eq!(responder.run_count(), 0);
    assert_eq!(responder.snapshot(), Some(vec![json!(1)]));

    app.temp_states().get("s1").unwrap().set_value(json!(1));
    settle().await;
    assert_eq!(responder.run_count(), 0);

    app.temp_states().get("s1").unwrap().set_value(json!(2));
    settle().await;
    assert_eq!(responder.run_count(), 1);
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn removal_aborts_the_pending_timer() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [
          {"id": "s1", "name": "input", "initialValue": ""},
          {"id": "s2", "name": "fired", "initialValue": false}
        ],
        "dataResponders": [{
          "id": "r1",
          "name": "watcher",
          "watch": ["{{ input.value }}"],
          "debounceMs": 200,
          "code": "fired.setValue(true)"
        }]
      })))
      .unwrap();

    app.temp_states().get("s1").unwrap().set_value(json!("x"));
    sleep(Duration::from_millis(50)).await;
    app.responders().remove("r1").unwrap();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(app.resolve("fired.value").unwrap(), json!(false));
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn zero_debounce_defers_to_the_next_tick() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [{"id": "s1", "name": "input", "initialValue": 0}],
        "dataResponders": [{"id": "r1", "name": "watcher", "watch": ["{{ input.value }}"], "code": ""}]
      })))
      .unwrap();
    let responder = app.responders().get("r1").unwrap();

    app.temp_states().get("s1").unwrap().set_value(json!(1));
    assert_eq!(responder.run_count(), 0);
    assert_eq!(responder.state(), RunState::Idle);

    settle().await;
    assert_eq!(responder.run_count(), 1);
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn trigger_leaves_the_debounce_window_intact() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [
          {"id": "s1", "name": "search", "initialValue": ""},
          {"id": "s2", "name": "seen", "initialValue": []}
        ],
        "dataResponders": [{
          "id": "r1",
          "name": "onSearch",
          "watch": ["{{ search.value }}"],
          "debounceMs": 300,
          "code": "local list = seen.value\nlist[#list + 1] = search.value\nseen.setValue(list)"
        }]
      })))
      .unwrap();
    let search = app.temp_states().get("s1").unwrap();
    let responder = app.responders().get("r1").unwrap();

    search.set_value(json!("a"));
    sleep(Duration::from_millis(50)).await;
    responder.trigger();
    settle().await;
    assert_eq!(responder.run_count(), 1);

    sleep(Duration::from_millis(10)).await;
    search.set_value(json!("ab"));
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(responder.run_count(), 2);
    assert_eq!(app.resolve("seen.value").unwrap(), json!(["a", "ab"]));
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn removal_aborts_next_tick_runs() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [{"id": "s1", "name": "fired", "initialValue": false}],
        "dataResponders": [{"id": "r1", "name": "watcher", "code": "fired.setValue(true)"}]
      })))
      .unwrap();

    app.responders().get("r1").unwrap().trigger();
    app.responders().remove("r1").unwrap();
    settle().await;
    assert_eq!(app.resolve("fired.value").unwrap(), json!(false));
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn disabled_responders_never_fire() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "tempStates": [{"id": "s1", "name": "input", "initialValue": 0}],
        "dataResponders": [{
          "id": "r1",
          "name": "watcher",
          "enabled": false,
          "runOnInit": true,
          "watch": ["{{ input.value }}"],
          "code": "input.setValue(100)"
        }]
      })))
      .unwrap();

    app.temp_states().get("s1").unwrap().set_value(json!(1));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(app.resolve("input.value").unwrap(), json!(1));
    assert!(!app.responders().get("r1").unwrap().is_subscribed());
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn responders_can_run_queries() {
  run_local(async {
    let executor = FakeExecutor::new();
    let app = app_with(executor.clone());
    app
      .load_schema(schema(json!({
        "queries": [{
          "id": "q1",
          "name": "user",
          "action": {"type": "restApi", "url": "https://api.test/users/{{ args.id }}"}
        }],
        "tempStates": [{"id": "s1", "name": "selected", "initialValue": null}],
        "dataResponders": [{
          "id": "r1",
          "name": "loadUser",
          "watch": ["{{ selected.value }}"],
          "code": "user.run({ id = selected.value })"
        }]
      })))
      .unwrap();

    app.temp_states().get("s1").unwrap().set_value(json!(42));
    sleep(Duration::from_millis(10)).await;

    assert_eq!(executor.calls.get(), 1);
    assert_eq!(executor.last_request().url, "https://api.test/users/42");
    assert_eq!(app.resolve("{{ user.data.url }}").unwrap(), json!("https://api.test/users/42"));
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn script_errors_are_exposed() {
  run_local(async {
    let app = app();
    app
      .load_schema(schema(json!({
        "dataResponders": [{"id": "r1", "name": "broken", "runOnInit": true, "code": "error('nope')"}]
      })))
      .unwrap();

    settle().await;
    let responder = app.responders().get("r1").unwrap();
    assert_eq!(responder.state(), RunState::Error);
    assert!(responder.error().unwrap().contains("nope"));
    assert_eq!(app.resolve("{{ broken.state }}").unwrap(), json!("error"));
  })
  .await;
}
