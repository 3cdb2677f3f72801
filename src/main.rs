use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use weft_config::FlowDef;
use weft_orchestrator::{Engine, EngineConfig, LogNotifier};
use weft_workflow::Workflow;

/// Weft - a workflow engine for JSON-defined node graphs
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log at debug level (overridden by RUST_LOG)
  #[arg(long, short, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
  /// Path to the flow definition (JSON)
  flow_file: PathBuf,

  /// Input data as JSON (read from stdin when omitted)
  #[arg(long)]
  input: Option<String>,

  /// Environment value for `{{ env.NAME }}`, as NAME=VALUE
  #[arg(long = "env", value_parser = parse_env_pair)]
  env: Vec<(String, String)>,

  /// Fail the run after this many seconds
  #[arg(long)]
  timeout: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run an entire flow
  Run(RunArgs),

  /// Run a single node (and the nodes it references)
  Node {
    #[command(flatten)]
    args: RunArgs,

    /// The node to execute
    #[arg(long)]
    node: String,
  },

  /// Validate a flow definition without running it
  Validate {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,
  },

  /// List the HTTP routes a flow declares
  Routes {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
    )
    .with_writer(io::stderr)
    .with_target(false)
    .init();

  match cli.command {
    Commands::Run(args) => run_flow(args),
    Commands::Node { args, node } => run_node(args, node),
    Commands::Validate { flow_file } => {
      let workflow = load_workflow(&flow_file)?;
      eprintln!(
        "Flow '{}' is valid ({} nodes, start: {})",
        workflow.name(),
        workflow.node_names().len(),
        workflow.start_node()
      );
      Ok(())
    }
    Commands::Routes { flow_file } => {
      let workflow = load_workflow(&flow_file)?;
      println!("{}", serde_json::to_string_pretty(workflow.routes())?);
      Ok(())
    }
  }
}

fn load_workflow(flow_file: &Path) -> Result<Workflow> {
  let def = FlowDef::from_path(flow_file)
    .with_context(|| format!("failed to load flow file: {}", flow_file.display()))?;
  let registry = weft_nodes::builtin_registry();
  Workflow::load(def, &registry)
    .with_context(|| format!("invalid flow: {}", flow_file.display()))
}

fn build_engine(args: &RunArgs) -> Result<Engine<LogNotifier>> {
  let def = FlowDef::from_path(&args.flow_file)
    .with_context(|| format!("failed to load flow file: {}", args.flow_file.display()))?;
  let registry = Arc::new(weft_nodes::builtin_registry());
  let workflow = Workflow::load(def, &registry)
    .with_context(|| format!("invalid flow: {}", args.flow_file.display()))?;

  let mut config = EngineConfig::default();
  if let Some(seconds) = args.timeout {
    let timeout = Duration::try_from_secs_f64(seconds)
      .with_context(|| format!("invalid timeout: {seconds}"))?;
    config = config.with_sandbox_timeout(Some(timeout));
  }
  for (name, value) in &args.env {
    config = config.with_env(name.clone(), value.clone());
  }

  eprintln!("Loaded flow: {}", workflow.name());
  Ok(Engine::new(workflow, registry, config).with_notifier(LogNotifier))
}

fn run_flow(args: RunArgs) -> Result<()> {
  let engine = build_engine(&args)?;
  let input = read_input(args.input.as_deref())?;

  let rt = tokio::runtime::Runtime::new()?;
  let outcome = rt.block_on(async {
    let cancel = cancel_on_ctrl_c();
    engine.run(input, cancel).await
  });

  println!("{}", serde_json::to_string_pretty(&outcome)?);
  if let Some(failure) = &outcome.failure {
    bail!("run {} failed: {}", outcome.execution_id, failure.message);
  }
  eprintln!("Execution completed: {}", outcome.execution_id);
  Ok(())
}

fn run_node(args: RunArgs, node: String) -> Result<()> {
  let engine = build_engine(&args)?;
  let input = read_input(args.input.as_deref())?;

  let rt = tokio::runtime::Runtime::new()?;
  let result = rt
    .block_on(async {
      let cancel = cancel_on_ctrl_c();
      engine.run_node(&node, input, cancel).await
    })
    .with_context(|| format!("node '{node}' could not be executed"))?;

  println!("{}", serde_json::to_string_pretty(&result)?);
  if result.is_error() {
    bail!(
      "node '{node}' failed: {}",
      result.message.as_deref().unwrap_or("unknown error")
    );
  }
  Ok(())
}

/// A token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Cancelling...");
      token.cancel();
    }
  });
  cancel
}

fn parse_env_pair(pair: &str) -> Result<(String, String), String> {
  match pair.split_once('=') {
    Some((name, value)) if !name.trim().is_empty() => {
      Ok((name.trim().to_string(), value.to_string()))
    }
    _ => Err(format!("expected NAME=VALUE, got '{pair}'")),
  }
}

fn read_input(inline: Option<&str>) -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if let Some(inline) = inline {
    return serde_json::from_str(inline).context("failed to parse --input JSON");
  }

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    return Ok(serde_json::json!({}));
  }
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read input from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse input JSON from stdin")
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn test_parse_env_pair() {
    assert_eq!(
      parse_env_pair("API_KEY=a=b"),
      Ok(("API_KEY".to_string(), "a=b".to_string()))
    );
    assert!(parse_env_pair("=x").is_err());
    assert!(parse_env_pair("NOVALUE").is_err());
  }

  #[test]
  fn test_inline_input() {
    let input = read_input(Some(r#"{"value": 42}"#)).unwrap();
    assert_eq!(input["value"], 42);
    assert!(read_input(Some("{")).is_err());
  }

  #[test]
  fn test_load_workflow_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{
        "name": "sum",
        "start_node": "Sum",
        "nodes": [{{"name": "Sum", "type": "compute", "params": {{"operation": "add", "a": 1, "b": 2}}}}]
      }}"#
    )
    .unwrap();

    let workflow = load_workflow(file.path()).unwrap();
    assert_eq!(workflow.name(), "sum");
    assert_eq!(workflow.start_node(), "Sum");
  }

  #[test]
  fn test_demo_flow_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/threshold.json");
    let workflow = load_workflow(&path).unwrap();
    assert_eq!(workflow.edges_from("Check"), ["Alert", "Continue"]);
  }

  #[tokio::test]
  async fn test_status_demo_compares_strings() {
    let args = RunArgs {
      flow_file: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/status.json"),
      input: None,
      env: Vec::new(),
      timeout: None,
    };
    let engine = build_engine(&args).unwrap();

    let healthy = engine.run(serde_json::json!({}), CancellationToken::new()).await;
    assert_eq!(healthy.visit_order.last().map(String::as_str), Some("Healthy"));

    let degraded = engine
      .run(serde_json::json!({"state": "degraded"}), CancellationToken::new())
      .await;
    assert!(degraded.is_success());
    assert_eq!(degraded.visit_order, vec!["Fetch", "Check", "Page"]);
  }

  #[test]
  fn test_load_workflow_rejects_unknown_type() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"name": "bad", "start_node": "A", "nodes": [{{"name": "A", "type": "teleport"}}]}}"#
    )
    .unwrap();

    let err = load_workflow(file.path()).unwrap_err();
    assert!(err.to_string().contains("invalid flow"));
  }
}
