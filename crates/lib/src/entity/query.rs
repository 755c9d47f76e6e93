//! Queries: REST calls or Lua scripts whose result feeds the namespace.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Entity, RunState, default_true};
use crate::app::{App, AppRef};
use crate::http::{RestRequest, RestResponse};
use crate::namespace::{EntityKind, NamespaceMap};
use crate::reactive::{Signal, batch};
use crate::resolve::template_text;
use crate::script::bridge;
use crate::task;

fn default_method() -> String {
  "GET".to_string()
}

/// What a query does when run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueryAction {
  /// Every string field may contain `{{ ... }}` runs, resolved against the
  /// namespace plus `args` right before the call.
  RestApi {
    #[serde(default = "default_method")]
    method: String,
    url: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    params: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
  },
  /// Lua run with effect access; its return value becomes `data`.
  Script { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
  pub id: String,
  pub name: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
  pub action: QueryAction,
  /// Falls back to the engine's `default_cache_time_ms`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache_time_ms: Option<u64>,
  #[serde(default)]
  pub cancel_previous: bool,
  /// Falls back to the engine's `http_timeout_ms`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default)]
  pub run_on_load: bool,
}

/// Outcome of [`Query::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
  pub success: bool,
  pub data: JsonValue,
  pub code: Option<u16>,
  pub headers: IndexMap<String, String>,
  pub run_time_ms: u64,
  pub timestamp: DateTime<Utc>,
  pub message: Option<String>,
  pub cancelled: bool,
  pub from_cache: bool,
}

impl QueryResult {
  pub fn failure(message: impl Into<String>) -> Self {
    RestResponse::failure(message, 0).into()
  }
}

impl From<RestResponse> for QueryResult {
  fn from(response: RestResponse) -> Self {
    Self {
      success: response.success,
      data: response.data,
      code: response.code,
      headers: response.headers,
      run_time_ms: response.run_time,
      timestamp: response.timestamp,
      message: response.message,
      cancelled: response.cancelled,
      from_cache: false,
    }
  }
}

struct CacheEntry {
  expires: Instant,
  result: QueryResult,
}

pub struct Query {
  definition: QueryDefinition,
  app: AppRef,
  data: Signal<JsonValue>,
  error: Signal<Option<String>>,
  state: Signal<RunState>,
  last_run_time: Signal<Option<u64>>,
  run_count: Signal<u64>,
  /// Last finished state, restored by `cancel`.
  settled: Cell<RunState>,
  /// Successful results keyed by the serialized args.
  cache: RefCell<IndexMap<String, CacheEntry>>,
  in_flight: RefCell<Vec<(u64, CancellationToken)>>,
  next_run: Cell<u64>,
}

impl Query {
  pub fn data(&self) -> JsonValue {
    self.data.get()
  }

  pub fn error(&self) -> Option<String> {
    self.error.get()
  }

  pub fn state(&self) -> RunState {
    self.state.get()
  }

  pub fn run_count(&self) -> u64 {
    self.run_count.get_untracked()
  }

  pub fn is_in_flight(&self) -> bool {
    !self.in_flight.borrow().is_empty()
  }

  /// Runs the query with `args`, or returns a fresh cached result for the same args.
  pub async fn run(&self, args: JsonValue) -> QueryResult {
    let name = self.definition.name.clone();
    if !self.definition.enabled {
      warn!(query = %name, "refusing to run a disabled query");
      return QueryResult::failure(format!("query '{}' is disabled", name));
    }

    let key = args.to_string();
    if let Some(hit) = self.cached(&key) {
      debug!(query = %name, "serving cached result");
      return hit;
    }

    let Some(app) = self.app.upgrade() else {
      return QueryResult::failure("application is gone");
    };
    let config = app.config();
    let cache_time = self.definition.cache_time_ms.unwrap_or(config.default_cache_time_ms);
    let timeout = self
      .definition
      .timeout_ms
      .map(Duration::from_millis)
      .unwrap_or_else(|| config.http_timeout());

    if self.definition.cancel_previous {
      self.cancel_in_flight();
    }
    let run_id = self.next_run.get() + 1;
    self.next_run.set(run_id);
    let token = CancellationToken::new();
    self.in_flight.borrow_mut().push((run_id, token.clone()));
    self.state.set(RunState::Loading);

    let started = Instant::now();
    let namespace = app.snapshot();
    let response = match &self.definition.action {
      QueryAction::RestApi { .. } => match self.build_request(&app, &namespace, &args, timeout) {
        Ok(request) => {
          let executor = app.executor();
          drop(app);
          let request_id = format!("{}#{}", self.definition.id, run_id);
          info!(query = %name, request_id = %request_id, "running query");
          tokio::select! {
            biased;
            _ = token.cancelled() => RestResponse::cancelled(elapsed_ms(started)),
            response = executor.execute(request, &request_id, token.clone()) => response,
          }
        }
        Err(message) => RestResponse::failure(message, elapsed_ms(started)),
      },
      QueryAction::Script { code } => {
        info!(query = %name, "running script query");
        let outcome =
          batch(|| bridge::effect_env(&app, &namespace, &args).and_then(|env| app.scripts().eval(&name, code, env)));
        match outcome {
          Ok(data) => RestResponse {
            success: true,
            data,
            ..RestResponse::failure("", elapsed_ms(started))
          },
          Err(err) => RestResponse::failure(err.to_string(), elapsed_ms(started)),
        }
      }
    };

    self.in_flight.borrow_mut().retain(|(id, _)| *id != run_id);
    if response.cancelled || token.is_cancelled() {
      debug!(query = %name, run_id, "run was cancelled");
      return RestResponse::cancelled(elapsed_ms(started)).into();
    }

    let mut result = QueryResult::from(response);
    result.run_time_ms = elapsed_ms(started);
    if result.success {
      result.message = None;
    }
    self.settle(&result);

    if result.success && cache_time > 0 {
      self.cache.borrow_mut().insert(
        key,
        CacheEntry {
          expires: Instant::now() + Duration::from_millis(cache_time),
          result: result.clone(),
        },
      );
    }
    result
  }

  /// Fire-and-forget run on the local task set.
  pub fn spawn_run(self: &Rc<Self>, args: JsonValue) -> bool {
    let query = self.clone();
    task::spawn("query run", async move {
      query.run(args).await;
    })
    .is_some()
  }

  /// Cancels every in-flight run and restores the last finished state.
  pub fn cancel(&self) {
    if self.cancel_in_flight() == 0 {
      return;
    }
    self.state.set(self.settled.get());
    info!(query = %self.definition.name, state = %self.settled.get().as_str(), "query cancelled");
  }

  /// Clears data, error and cache, and returns to `Idle`.
  pub fn reset(&self) {
    self.cancel_in_flight();
    self.cache.borrow_mut().clear();
    self.settled.set(RunState::Idle);
    batch(|| {
      self.data.set(JsonValue::Null);
      self.error.set(None);
      self.state.set(RunState::Idle);
    });
    debug!(query = %self.definition.name, "query reset");
  }

  fn cancel_in_flight(&self) -> usize {
    let runs: Vec<_> = self.in_flight.borrow_mut().drain(..).collect();
    for (run_id, token) in &runs {
      debug!(query = %self.definition.name, run_id, "cancelling run");
      token.cancel();
    }
    runs.len()
  }

  fn cached(&self, key: &str) -> Option<QueryResult> {
    let mut cache = self.cache.borrow_mut();
    let now = Instant::now();
    cache.retain(|_, entry| entry.expires > now);
    cache.get(key).map(|entry| QueryResult {
      from_cache: true,
      ..entry.result.clone()
    })
  }

  fn settle(&self, result: &QueryResult) {
    let finished = if result.success { RunState::Success } else { RunState::Error };
    self.settled.set(finished);
    let visible = if self.is_in_flight() { RunState::Loading } else { finished };
    if !result.success {
      error!(query = %self.definition.name, message = ?result.message, "query failed");
    }
    batch(|| {
      if result.success {
        self.data.set(result.data.clone());
        self.error.set(None);
      } else {
        self.error.set(result.message.clone());
      }
      self.last_run_time.set(Some(result.run_time_ms));
      self.run_count.update(|count| *count += 1);
      self.state.set(visible);
    });
  }

  fn build_request(
    &self,
    app: &App,
    namespace: &NamespaceMap,
    args: &JsonValue,
    timeout: Duration,
  ) -> Result<RestRequest, String> {
    let QueryAction::RestApi {
      method,
      url,
      headers,
      params,
      body,
    } = &self.definition.action
    else {
      return Err("not a REST query".to_string());
    };

    let mut context = namespace.clone();
    context.insert("args".to_string(), args.clone());
    let resolver = app.resolver();
    let resolve = |template: &str| {
      resolver
        .resolve(template, &context)
        .map_err(|err| format!("failed to resolve '{}': {}", template, err))
    };
    let text = |template: &str| resolve(template).map(|value| template_text(&value));

    let mut request = RestRequest {
      method: method.to_uppercase(),
      url: text(url)?,
      headers: IndexMap::new(),
      params: IndexMap::new(),
      body: None,
      timeout,
    };
    for (key, value) in headers {
      request.headers.insert(key.clone(), text(value)?);
    }
    for (key, value) in params {
      request.params.insert(key.clone(), text(value)?);
    }
    if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
      request.body = Some(resolve(body)?);
    }
    Ok(request)
  }
}

fn elapsed_ms(started: Instant) -> u64 {
  started.elapsed().as_millis() as u64
}

impl Entity for Query {
  type Definition = QueryDefinition;

  const KIND: EntityKind = EntityKind::Query;

  fn create(definition: QueryDefinition, app: AppRef) -> Rc<Self> {
    Rc::new(Self {
      definition,
      app,
      data: Signal::new(JsonValue::Null),
      error: Signal::new(None),
      state: Signal::new(RunState::Idle),
      last_run_time: Signal::new(None),
      run_count: Signal::new(0),
      settled: Cell::new(RunState::Idle),
      cache: RefCell::new(IndexMap::new()),
      in_flight: RefCell::new(Vec::new()),
      next_run: Cell::new(0),
    })
  }

  fn definition_id(definition: &QueryDefinition) -> &str {
    &definition.id
  }

  fn definition(&self) -> &QueryDefinition {
    &self.definition
  }

  fn id(&self) -> &str {
    &self.definition.id
  }

  fn name(&self) -> &str {
    &self.definition.name
  }

  fn exposed(&self) -> JsonValue {
    let state = self.state.get();
    json!({
      "data": self.data.get(),
      "error": self.error.get(),
      "state": state.as_str(),
      "isLoading": state == RunState::Loading,
      "lastRunTime": self.last_run_time.get(),
      "runCount": self.run_count.get(),
    })
  }

  fn stop(&self) {
    self.cancel_in_flight();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn definitions_parse_from_camel_case() {
    let definition: QueryDefinition = serde_json::from_value(json!({
      "id": "q1",
      "name": "users",
      "action": {
        "type": "restApi",
        "url": "https://api.test/users/{{ args.id }}",
        "headers": {"Authorization": "Bearer {{ token.value }}"}
      },
      "cacheTimeMs": 5000,
      "cancelPrevious": true
    }))
    .unwrap();

    assert!(definition.enabled);
    assert_eq!(definition.cache_time_ms, Some(5000));
    assert!(definition.cancel_previous);
    assert!(!definition.run_on_load);
    match &definition.action {
      QueryAction::RestApi { method, headers, .. } => {
        assert_eq!(method, "GET");
        assert_eq!(headers.len(), 1);
      }
      other => panic!("unexpected action {:?}", other),
    }
  }

  #[test]
  fn script_action_round_trips() {
    let action = QueryAction::Script {
      code: "return 1".into(),
    };
    let value = serde_json::to_value(&action).unwrap();
    assert_eq!(value, json!({"type": "script", "code": "return 1"}));
  }

  #[test]
  fn fresh_query_exposes_idle_state() {
    let query = Query::create(
      serde_json::from_value(json!({
        "id": "q1",
        "name": "users",
        "action": {"type": "script", "code": "return 1"}
      }))
      .unwrap(),
      AppRef::default(),
    );
    let exposed = query.exposed();
    assert_eq!(exposed["state"], json!("idle"));
    assert_eq!(exposed["isLoading"], json!(false));
    assert_eq!(exposed["runCount"], json!(0));
    assert_eq!(exposed["data"], JsonValue::Null);
  }

  #[tokio::test]
  async fn disabled_query_refuses_to_run() {
    let query = Query::create(
      serde_json::from_value(json!({
        "id": "q1",
        "name": "users",
        "enabled": false,
        "action": {"type": "script", "code": "return 1"}
      }))
      .unwrap(),
      AppRef::default(),
    );
    let result = query.run(JsonValue::Null).await;
    assert!(!result.success);
    assert!(!result.cancelled);
    assert_eq!(query.run_count(), 0);
  }
}
