//! Outbound HTTP for REST queries.
//!
//! The engine resolves every template in a query's request before handing a
//! [`RestRequest`] to an [`HttpExecutor`]. [`ReqwestExecutor`] is the default
//! implementation; tests and embedders can supply their own.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A fully resolved REST request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestRequest {
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub headers: IndexMap<String, String>,
  #[serde(default)]
  pub params: IndexMap<String, String>,
  #[serde(default)]
  pub body: Option<JsonValue>,
  #[serde(with = "millis")]
  pub timeout: Duration,
}

/// Outcome of one REST call. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestResponse {
  pub success: bool,
  pub data: JsonValue,
  pub code: Option<u16>,
  #[serde(default)]
  pub headers: IndexMap<String, String>,
  /// Wall-clock duration in milliseconds.
  pub run_time: u64,
  pub timestamp: DateTime<Utc>,
  pub message: Option<String>,
  #[serde(default)]
  pub cancelled: bool,
}

impl RestResponse {
  pub fn failure(message: impl Into<String>, run_time: u64) -> Self {
    Self {
      success: false,
      data: JsonValue::Null,
      code: None,
      headers: IndexMap::new(),
      run_time,
      timestamp: Utc::now(),
      message: Some(message.into()),
      cancelled: false,
    }
  }

  pub fn cancelled(run_time: u64) -> Self {
    Self {
      cancelled: true,
      ..Self::failure("request cancelled", run_time)
    }
  }
}

/// Executes resolved REST requests.
///
/// Implementations must stop promptly once `cancel` fires and must respect
/// `request.timeout`.
#[async_trait(?Send)]
pub trait HttpExecutor {
  async fn execute(&self, request: RestRequest, request_id: &str, cancel: CancellationToken) -> RestResponse;
}

/// [`HttpExecutor`] backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
  client: reqwest::Client,
}

impl ReqwestExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }

  async fn send(&self, request: RestRequest) -> Result<(u16, IndexMap<String, String>, JsonValue), reqwest::Error> {
    let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = self
      .client
      .request(method, &request.url)
      .timeout(request.timeout)
      .query(&request.params);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match request.body {
      None | Some(JsonValue::Null) => builder,
      Some(JsonValue::String(text)) => builder.body(text),
      Some(json) => builder.json(&json),
    };

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
      .collect();
    let text = response.text().await?;
    let data = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));
    Ok((status, headers, data))
  }
}

#[async_trait(?Send)]
impl HttpExecutor for ReqwestExecutor {
  async fn execute(&self, request: RestRequest, request_id: &str, cancel: CancellationToken) -> RestResponse {
    let started = Instant::now();
    let elapsed = || started.elapsed().as_millis() as u64;
    info!(request_id, method = %request.method, url = %request.url, "sending request");

    let outcome = tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      result = self.send(request) => Some(result),
    };

    match outcome {
      None => {
        debug!(request_id, "request cancelled");
        RestResponse::cancelled(elapsed())
      }
      Some(Ok((code, headers, data))) => {
        let success = (200..300).contains(&code);
        RestResponse {
          success,
          message: (!success).then(|| format!("HTTP {}", code)),
          data,
          code: Some(code),
          headers,
          run_time: elapsed(),
          timestamp: Utc::now(),
          cancelled: false,
        }
      }
      Some(Err(err)) => {
        let message = if err.is_timeout() {
          "request timed out".to_string()
        } else {
          err.to_string()
        };
        RestResponse {
          code: err.status().map(|s| s.as_u16()),
          ..RestResponse::failure(message, elapsed())
        }
      }
    }
  }
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn response_serializes_camel_case() {
    let response = RestResponse::cancelled(12);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["runTime"], json!(12));
    assert_eq!(json["cancelled"], json!(true));
    assert_eq!(json["success"], json!(false));
  }

  #[tokio::test]
  async fn cancelled_token_short_circuits() {
    let executor = ReqwestExecutor::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let request = RestRequest {
      method: "GET".into(),
      url: "http://127.0.0.1:9/unreachable".into(),
      headers: IndexMap::new(),
      params: IndexMap::new(),
      body: None,
      timeout: Duration::from_secs(5),
    };
    let response = executor.execute(request, "r1", cancel).await;
    assert!(response.cancelled);
    assert!(!response.success);
  }

  #[test]
  fn request_timeout_round_trips_as_millis() {
    let json = json!({"method": "GET", "url": "http://x", "timeout": 1500});
    let request: RestRequest = serde_json::from_value(json).unwrap();
    assert_eq!(request.timeout, Duration::from_millis(1500));
    assert_eq!(serde_json::to_value(&request).unwrap()["timeout"], json!(1500));
  }
}
