//! Implementation of the `bscope inspect` command.
//!
//! Loads a schema into a fresh application and reports what the namespace
//! holds. Nothing runs: `runOnLoad` queries and responder timers are skipped.

use std::path::Path;

use anyhow::Result;
use bindscope_lib::App;
use bindscope_lib::entity::Entity;
use serde_json::json;

use super::load_app;
use crate::output::{OutputFormat, compact, print_json, print_stat, print_success, print_warning};

fn names(app: &App) -> serde_json::Value {
  json!({
    "components": app.components().all().iter().map(|c| c.name()).collect::<Vec<_>>(),
    "queries": app.queries().all().iter().map(|q| q.definition().name.clone()).collect::<Vec<_>>(),
    "tempStates": app.temp_states().all().iter().map(|s| s.definition().name.clone()).collect::<Vec<_>>(),
    "transformers": app.transformers().all().iter().map(|t| t.definition().name.clone()).collect::<Vec<_>>(),
    "dataResponders": app.responders().all().iter().map(|r| r.definition().name.clone()).collect::<Vec<_>>(),
  })
}

pub fn cmd_inspect(schema: &Path, config: Option<&Path>, verbose: bool, format: OutputFormat) -> Result<()> {
  let (app, definitions) = load_app(schema, config)?;
  let namespace = app.snapshot();
  let collisions = app.name_collisions();

  if format.is_json() {
    return print_json(&json!({
      "definitions": definitions,
      "entities": names(&app),
      "namespace": *namespace,
      "collisions": collisions,
    }));
  }

  print_success(&format!("Loaded {} ({} definitions)", schema.display(), definitions));
  print_stat("Components", &app.components().len().to_string());
  print_stat("Queries", &app.queries().len().to_string());
  print_stat("Temp states", &app.temp_states().len().to_string());
  print_stat("Transformers", &app.transformers().len().to_string());
  print_stat("Data responders", &app.responders().len().to_string());

  println!();
  println!("Namespace:");
  for (name, value) in namespace.iter() {
    if verbose {
      print_stat(name, &compact(value));
    } else {
      println!("  {}", name);
    }
  }

  for collision in &collisions {
    print_warning(&format!(
      "'{}': {} is shadowed by {}",
      collision.name, collision.shadowed, collision.winner
    ));
  }
  Ok(())
}
