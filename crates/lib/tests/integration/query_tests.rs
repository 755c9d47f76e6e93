//! Query execution, caching and cancellation.

use std::time::Duration;

use bindscope_lib::entity::RunState;
use bindscope_lib::task::run_local;
use serde_json::{Value as JsonValue, json};
use tokio::time::sleep;

use super::common::{FakeExecutor, app, app_with, schema, settle};

fn rest_query(extra: JsonValue) -> JsonValue {
  let mut query = json!({
    "id": "q1",
    "name": "users",
    "action": {"type": "restApi", "url": "https://api.test/users"}
  });
  if let (Some(base), Some(extra)) = (query.as_object_mut(), extra.as_object()) {
    base.extend(extra.clone());
  }
  query
}

#[tokio::test(start_paused = true)]
async fn cached_results_skip_the_network() {
  let executor = FakeExecutor::new();
  let app = app_with(executor.clone());
  app
    .load_schema(schema(json!({"queries": [rest_query(json!({"cacheTimeMs": 5000}))]})))
    .unwrap();

  let first = app.run_query("users", JsonValue::Null).await.unwrap();
  assert!(first.success);
  assert!(!first.from_cache);

  sleep(Duration::from_millis(4000)).await;
  let second = app.run_query("users", JsonValue::Null).await.unwrap();
  assert!(second.from_cache);
  assert_eq!(second.data, first.data);
  assert_eq!(executor.calls.get(), 1);
  assert_eq!(app.queries().get("q1").unwrap().run_count(), 1);

  let other_args = app.run_query("users", json!({"page": 2})).await.unwrap();
  assert!(!other_args.from_cache);
  assert_eq!(executor.calls.get(), 2);

  sleep(Duration::from_millis(1001)).await;
  let expired = app.run_query("users", JsonValue::Null).await.unwrap();
  assert!(!expired.from_cache);
  assert_eq!(executor.calls.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn uncached_queries_always_call() {
  let executor = FakeExecutor::new();
  let app = app_with(executor.clone());
  app.load_schema(schema(json!({"queries": [rest_query(json!({}))]}))).unwrap();

  app.run_query("q1", JsonValue::Null).await.unwrap();
  app.run_query("q1", JsonValue::Null).await.unwrap();
  assert_eq!(executor.calls.get(), 2);
  assert_eq!(app.resolve("{{ users.runCount }}").unwrap(), json!(2));
}

#[tokio::test(start_paused = true)]
async fn cancel_previous_supersedes_the_running_call() {
  run_local(async {
    let executor = FakeExecutor::with_delay(Duration::from_millis(100));
    let app = app_with(executor.clone());
    app
      .load_schema(schema(json!({"queries": [rest_query(json!({"cancelPrevious": true}))]})))
      .unwrap();
    let query = app.queries().get("q1").unwrap();

    let first = tokio::task::spawn_local({
      let query = query.clone();
      async move { query.run(json!(1)).await }
    });
    settle().await;
    assert_eq!(query.state(), RunState::Loading);

    let second = query.run(json!(2)).await;
    let first = first.await.unwrap();

    assert!(first.cancelled);
    assert!(!first.success);
    assert!(second.success);
    assert_eq!(second.data["call"], json!(2));
    assert_eq!(query.state(), RunState::Success);
    assert_eq!(query.run_count(), 1);
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn cancel_restores_the_last_settled_state() {
  run_local(async {
    let executor = FakeExecutor::with_delay(Duration::from_millis(100));
    let app = app_with(executor.clone());
    app.load_schema(schema(json!({"queries": [rest_query(json!({}))]}))).unwrap();
    let query = app.queries().get("q1").unwrap();

    assert!(query.run(JsonValue::Null).await.success);
    let data = query.data();

    let pending = tokio::task::spawn_local({
      let query = query.clone();
      async move { query.run(JsonValue::Null).await }
    });
    settle().await;
    assert_eq!(app.resolve("{{ users.isLoading }}").unwrap(), json!(true));

    query.cancel();
    assert_eq!(query.state(), RunState::Success);
    assert!(pending.await.unwrap().cancelled);
    assert_eq!(query.data(), data);
    assert!(!query.is_in_flight());
  })
  .await;
}

#[tokio::test(start_paused = true)]
async fn cancel_without_history_returns_to_idle() {
  run_local(async {
    let executor = FakeExecutor::with_delay(Duration::from_millis(100));
    let app = app_with(executor);
    app.load_schema(schema(json!({"queries": [rest_query(json!({}))]}))).unwrap();
    let query = app.queries().get("q1").unwrap();

    let pending = tokio::task::spawn_local({
      let query = query.clone();
      async move { query.run(JsonValue::Null).await }
    });
    settle().await;
    query.cancel();
    assert_eq!(query.state(), RunState::Idle);
    assert!(pending.await.unwrap().cancelled);
  })
  .await;
}

#[tokio::test]
async fn request_templates_resolve_against_namespace_and_args() {
  let executor = FakeExecutor::new();
  let app = app_with(executor.clone());
  app
    .load_schema(schema(json!({
      "tempStates": [
        {"id": "s1", "name": "token", "initialValue": "secret"},
        {"id": "s2", "name": "form", "initialValue": {"name": "Ada"}}
      ],
      "queries": [{
        "id": "q1",
        "name": "save",
        "action": {
          "type": "restApi",
          "method": "post",
          "url": "https://api.test/users/{{ args.id }}",
          "headers": {"Authorization": "Bearer {{ token.value }}"},
          "params": {"notify": "{{ args.notify }}"},
          "body": "{{ { name: form.value.name, id: args.id } }}"
        }
      }]
    })))
    .unwrap();

  let result = app.run_query("save", json!({"id": 7, "notify": true})).await.unwrap();
  assert!(result.success);

  let request = executor.last_request();
  assert_eq!(request.method, "POST");
  assert_eq!(request.url, "https://api.test/users/7");
  assert_eq!(request.headers["Authorization"], "Bearer secret");
  assert_eq!(request.params["notify"], "true");
  assert_eq!(request.body, Some(json!({"name": "Ada", "id": 7})));
}

#[tokio::test]
async fn unresolvable_templates_fail_the_run() {
  let executor = FakeExecutor::new();
  let app = app_with(executor.clone());
  app
    .load_schema(schema(json!({
      "queries": [{
        "id": "q1",
        "name": "broken",
        "action": {"type": "restApi", "url": "{{ missing.value }}"}
      }]
    })))
    .unwrap();

  let result = app.run_query("q1", JsonValue::Null).await.unwrap();
  assert!(!result.success);
  assert_eq!(executor.calls.get(), 0);
  assert_eq!(app.queries().get("q1").unwrap().state(), RunState::Error);
  assert!(app.resolve("{{ broken.error }}").unwrap().is_string());
}

#[tokio::test]
async fn http_failures_move_to_error() {
  let executor = FakeExecutor::new();
  executor.status.set(500);
  let app = app_with(executor);
  app.load_schema(schema(json!({"queries": [rest_query(json!({"cacheTimeMs": 5000}))]}))).unwrap();

  let result = app.run_query("q1", JsonValue::Null).await.unwrap();
  assert!(!result.success);
  assert_eq!(result.code, Some(500));
  assert_eq!(app.resolve("{{ users.error }}").unwrap(), json!("HTTP 500"));

  let again = app.run_query("q1", JsonValue::Null).await.unwrap();
  assert!(!again.from_cache);
}

#[tokio::test]
async fn reset_clears_data_and_cache() {
  let executor = FakeExecutor::new();
  let app = app_with(executor.clone());
  app.load_schema(schema(json!({"queries": [rest_query(json!({"cacheTimeMs": 60000}))]}))).unwrap();
  let query = app.queries().get("q1").unwrap();

  query.run(JsonValue::Null).await;
  assert_eq!(query.state(), RunState::Success);
  query.reset();
  assert_eq!(query.state(), RunState::Idle);
  assert_eq!(query.data(), JsonValue::Null);

  let result = query.run(JsonValue::Null).await;
  assert!(!result.from_cache);
  assert_eq!(executor.calls.get(), 2);
}

#[tokio::test]
async fn script_queries_return_lua_values() {
  let app = app();
  app
    .load_schema(schema(json!({
      "tempStates": [{"id": "s1", "name": "items", "initialValue": [3, 4]}],
      "queries": [{
        "id": "q1",
        "name": "total",
        "action": {
          "type": "script",
          "code": "local sum = args.base\nfor _, v in ipairs(items.value) do sum = sum + v end\nreturn { sum = sum }"
        }
      }]
    })))
    .unwrap();

  let result = app.run_query("total", json!({"base": 10})).await.unwrap();
  assert!(result.success);
  assert_eq!(result.data, json!({"sum": 17}));
  assert_eq!(app.resolve("{{ total.data.sum }}").unwrap(), json!(17));
}

#[tokio::test]
async fn unknown_queries_are_reported() {
  let app = app();
  assert!(app.run_query("nope", JsonValue::Null).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn run_on_load_queries_start_with_the_schema() {
  run_local(async {
    let executor = FakeExecutor::new();
    let app = app_with(executor.clone());
    app
      .load_schema(schema(json!({"queries": [
        rest_query(json!({"runOnLoad": true})),
        {"id": "q2", "name": "later", "action": {"type": "restApi", "url": "https://api.test/later"}}
      ]})))
      .unwrap();

    sleep(Duration::from_millis(10)).await;
    assert_eq!(executor.calls.get(), 1);
    assert_eq!(app.queries().get("q1").unwrap().state(), RunState::Success);
    assert_eq!(app.queries().get("q2").unwrap().state(), RunState::Idle);
  })
  .await;
}
