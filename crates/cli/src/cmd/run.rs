//! Implementation of the `bscope run` command.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bindscope_lib::task::run_local;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::load_app;
use crate::output::{OutputFormat, format_duration, print_error, print_json, print_stat, print_success, print_value};

pub fn cmd_run(
  schema: &Path,
  query: &str,
  args: Option<&str>,
  config: Option<&Path>,
  settle: Option<Duration>,
  format: OutputFormat,
) -> Result<()> {
  let args: JsonValue = match args {
    Some(text) => serde_json::from_str(text).context("Failed to parse --args as JSON")?,
    None => JsonValue::Null,
  };

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;

  let result = runtime.block_on(run_local(async {
    let (app, _) = load_app(schema, config)?;
    debug!(query, args = %args, "running query");
    let result = app
      .run_query(query, args)
      .await
      .with_context(|| format!("Failed to run query: {}", query))?;
    if let Some(settle) = settle {
      debug!(settle = %humantime::format_duration(settle), "settling");
      tokio::time::sleep(settle).await;
    }
    anyhow::Ok(result)
  }))?;

  if format.is_json() {
    print_json(&result)?;
  } else if result.success {
    print_success(&format!(
      "Query '{}' succeeded in {}",
      query,
      format_duration(Duration::from_millis(result.run_time_ms))
    ));
    if let Some(code) = result.code {
      print_stat("Status", &code.to_string());
    }
    if result.from_cache {
      print_stat("Cached", "yes");
    }
    print_value(&result.data);
  } else {
    print_error(&format!(
      "Query '{}' failed: {}",
      query,
      result.message.as_deref().unwrap_or("unknown error")
    ));
  }

  if !result.success {
    bail!("query '{}' did not succeed", query);
  }
  Ok(())
}
