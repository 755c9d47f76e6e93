mod deps;
mod eval;
mod inspect;
mod run;

use std::path::Path;

use anyhow::{Context, Result};
use bindscope_lib::{App, EngineConfig, Schema};

pub use deps::cmd_deps;
pub use eval::cmd_eval;
pub use inspect::cmd_inspect;
pub use run::cmd_run;

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
  match path {
    Some(path) => EngineConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display())),
    None => Ok(EngineConfig::default()),
  }
}

/// Builds an application and loads `schema` into it.
fn load_app(schema: &Path, config: Option<&Path>) -> Result<(App, usize)> {
  let config = load_config(config)?;
  let schema = Schema::load(schema).with_context(|| format!("Failed to load schema: {}", schema.display()))?;
  let definitions = schema.len();
  let app = App::with_config(config).context("Failed to create application")?;
  app.load_schema(schema).context("Failed to load schema definitions")?;
  Ok((app, definitions))
}
