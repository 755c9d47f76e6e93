//! Implementation of the `bscope eval` command.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use bindscope_lib::expr;
use bindscope_lib::resolve;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::output::{OutputFormat, print_json, print_value};

fn load_context(path: Option<&Path>) -> Result<JsonMap<String, JsonValue>> {
  let Some(path) = path else {
    return Ok(JsonMap::new());
  };
  let content = fs::read_to_string(path).with_context(|| format!("Failed to read context: {}", path.display()))?;
  match serde_json::from_str(&content).with_context(|| format!("Failed to parse context: {}", path.display()))? {
    JsonValue::Object(map) => Ok(map),
    other => bail!("Context must be a JSON object, got {}", other),
  }
}

pub fn cmd_eval(input: &str, context: Option<&Path>, raw: bool, format: OutputFormat) -> Result<()> {
  let context = load_context(context)?;
  let value = if raw {
    expr::evaluate(input, &context)
  } else {
    resolve::resolve(input, &context)
  }
  .with_context(|| format!("Failed to evaluate: {}", input))?;

  if format.is_json() {
    print_json(&value)
  } else {
    print_value(&value);
    Ok(())
  }
}
