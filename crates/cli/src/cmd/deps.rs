//! Implementation of the `bscope deps` command.

use anyhow::Result;
use bindscope_lib::resolve::extract_dependencies;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_deps(inputs: &[String], format: OutputFormat) -> Result<()> {
  let found: Vec<(&String, Vec<String>)> = inputs.iter().map(|input| (input, extract_dependencies(input))).collect();

  if format.is_json() {
    let map: JsonMap<String, JsonValue> = found
      .into_iter()
      .map(|(input, deps)| (input.clone(), JsonValue::from(deps)))
      .collect();
    return print_json(&map);
  }

  for (input, deps) in found {
    let listed = if deps.is_empty() { "(none)".to_string() } else { deps.join(", ") };
    print_stat(input, &listed);
  }
  Ok(())
}
