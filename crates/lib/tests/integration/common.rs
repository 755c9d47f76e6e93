//! Shared helpers for library integration tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use bindscope_lib::http::{HttpExecutor, RestRequest, RestResponse};
use bindscope_lib::registry::TypeRegistry;
use bindscope_lib::{App, EngineConfig, Schema};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Records every request and answers after `delay` with the request echoed back.
#[derive(Default)]
pub struct FakeExecutor {
  pub delay: Duration,
  pub calls: Cell<usize>,
  pub requests: RefCell<Vec<RestRequest>>,
  pub status: Cell<u16>,
}

impl FakeExecutor {
  pub fn new() -> Rc<Self> {
    Rc::new(Self {
      status: Cell::new(200),
      ..Self::default()
    })
  }

  pub fn with_delay(delay: Duration) -> Rc<Self> {
    Rc::new(Self {
      delay,
      status: Cell::new(200),
      ..Self::default()
    })
  }

  pub fn last_request(&self) -> RestRequest {
    self.requests.borrow().last().cloned().expect("no request recorded")
  }
}

#[async_trait(?Send)]
impl HttpExecutor for FakeExecutor {
  async fn execute(&self, request: RestRequest, _request_id: &str, cancel: CancellationToken) -> RestResponse {
    let call = self.calls.get() + 1;
    self.calls.set(call);
    self.requests.borrow_mut().push(request.clone());
    let started = Instant::now();

    tokio::select! {
      _ = cancel.cancelled() => return RestResponse::cancelled(started.elapsed().as_millis() as u64),
      _ = tokio::time::sleep(self.delay) => {}
    }

    let code = self.status.get();
    let success = (200..300).contains(&code);
    RestResponse {
      success,
      data: json!({ "url": request.url, "call": call, "body": request.body }),
      code: Some(code),
      headers: IndexMap::new(),
      run_time: started.elapsed().as_millis() as u64,
      timestamp: Utc::now(),
      message: (!success).then(|| format!("HTTP {}", code)),
      cancelled: false,
    }
  }
}

pub fn app_with(executor: Rc<FakeExecutor>) -> App {
  App::new(EngineConfig::default(), TypeRegistry::standard(), executor).unwrap()
}

pub fn app() -> App {
  app_with(FakeExecutor::new())
}

pub fn schema(value: JsonValue) -> Schema {
  serde_json::from_value(value).unwrap()
}

/// Lets spawned local tasks run without advancing the clock.
pub async fn settle() {
  for _ in 0..10 {
    tokio::task::yield_now().await;
  }
}
