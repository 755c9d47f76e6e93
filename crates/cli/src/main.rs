mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// bscope - evaluate bindings and inspect reactive application schemas
#[derive(Parser)]
#[command(name = "bscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve a binding string against a JSON context
  Eval {
    /// Binding string, e.g. "{{ user.name.toUpperCase() }}" or "Hi {{ user.name }}"
    input: String,

    /// JSON file holding the context object
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Treat the input as a bare expression instead of a binding string
    #[arg(long)]
    raw: bool,
  },

  /// List the root names binding strings depend on
  Deps {
    /// Binding strings to analyze
    #[arg(required = true)]
    inputs: Vec<String>,
  },

  /// Load an application schema and show its namespace
  Inspect {
    /// Path to the schema JSON file
    schema: PathBuf,

    /// Engine config (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,
  },

  /// Run one query of an application schema
  Run {
    /// Path to the schema JSON file
    schema: PathBuf,

    /// Query id or name
    query: String,

    /// Query arguments as JSON
    #[arg(long)]
    args: Option<String>,

    /// Engine config (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep the application alive this long after the run so responders can fire (e.g., "500ms", "2s")
    #[arg(long, value_parser = humantime::parse_duration)]
    settle: Option<Duration>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if cli.verbose {
      EnvFilter::new("debug")
    } else {
      EnvFilter::new("warn")
    }
  });
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Eval { input, context, raw } => cmd::cmd_eval(&input, context.as_deref(), raw, cli.output),
    Commands::Deps { inputs } => cmd::cmd_deps(&inputs, cli.output),
    Commands::Inspect { schema, config } => cmd::cmd_inspect(&schema, config.as_deref(), cli.verbose, cli.output),
    Commands::Run {
      schema,
      query,
      args,
      config,
      settle,
    } => cmd::cmd_run(&schema, &query, args.as_deref(), config.as_deref(), settle, cli.output),
  }
}
