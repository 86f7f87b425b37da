// crates/graphcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use graphcore::generator::{build_graph, GeneratedStep};
use graphcore::{ExecutionEvent, MemoryCredentials, NodeEvent, NodeKind, Workflow, WorkflowDocument};
use graphruntime::{validate_workflow, FlowRuntime, NodeRegistry, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Workflow graph engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one node of a workflow document
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Node to run
        #[arg(short, long)]
        node: String,

        /// Treat every visited node as stale
        #[arg(long)]
        first_run: bool,

        /// Service credential, repeatable
        #[arg(long = "credential", value_name = "KEY=VALUE")]
        credentials: Vec<String>,

        /// Credentials as KEY=VALUE;KEY=VALUE
        #[arg(long, env = "FLOW_CREDENTIALS", hide_env_values = true)]
        credential_list: Option<String>,

        /// Ceiling for a single node computation
        #[arg(long, default_value_t = 500)]
        timeout_secs: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Write the updated document back to the file
        #[arg(short, long)]
        write: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Build a workflow from generator steps
    Generate {
        /// JSON array of `{id, description, suggestedService?}`
        #[arg(short, long)]
        steps: PathBuf,

        /// Workflow name
        #[arg(short, long, default_value = "Generated workflow")]
        name: String,

        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            node,
            first_run,
            credentials,
            credential_list,
            timeout_secs,
            verbose,
            write,
        } => {
            init_logging(verbose);
            let store = parse_credentials(&credentials, credential_list.as_deref())?;
            let config = RuntimeConfig {
                execution_timeout: Duration::from_secs(timeout_secs),
                ..RuntimeConfig::default()
            };
            run_workflow(file, &node, first_run, store, config, write).await?;
        }

        Commands::Validate { file } => {
            validate_file(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Generate { steps, name, output } => {
            generate_workflow(steps, &name, output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `--credential` flags win over the environment list
fn parse_credentials(flags: &[String], list: Option<&str>) -> Result<MemoryCredentials> {
    let store = MemoryCredentials::new();
    let from_env = list
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty());
    for pair in from_env.chain(flags.iter().map(String::as_str)) {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Credential must be KEY=VALUE, got {pair:?}");
        };
        store.set(key.trim(), value.trim());
    }
    Ok(store)
}

async fn run_workflow(
    file: PathBuf,
    node: &str,
    first_run: bool,
    credentials: MemoryCredentials,
    config: RuntimeConfig,
    write: bool,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;

    let mut registry = NodeRegistry::new();
    graphnodes::register_all(&mut registry);
    let runtime = FlowRuntime::with_registry(Arc::new(registry), Arc::new(credentials), config);

    let workflow_id = runtime.import_json(&json).await?;
    tracing::debug!(%workflow_id, "workflow imported");
    {
        let store = runtime.store().read().await;
        if let Some(workflow) = store.current() {
            println!("📋 Workflow: {}", workflow.name);
            println!("   Nodes: {}", workflow.nodes.len());
            println!("   Edges: {}", workflow.edges.len());
        }
        if store.node(node).is_none() {
            bail!("Node not found: {node}");
        }
    }
    println!();

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let summary = runtime.run_node(node, first_run).await;

    // Let the listener catch up before tearing it down
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", summary.run_id);
    println!("   Computed: {} nodes", summary.computed.len());
    if summary.cancelled {
        println!("   Cancelled");
    }

    println!();
    println!("📤 Nodes:");
    {
        let store = runtime.store().read().await;
        for spec in store.nodes() {
            let tag = spec.node_type.as_deref().unwrap_or("?");
            println!("   {} ({})", spec.id, tag);
            if let Some(error) = &spec.data.error {
                println!("     error: {}", error);
            }
            if let Some(output) = &spec.data.output {
                println!("     output: {}", preview(output));
            }
        }
    }

    if write {
        let document = runtime.export_json(&workflow_id).await?;
        std::fs::write(&file, document)?;
        println!();
        println!("💾 Wrote {}", file.display());
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::RunRequested { node_id, first_run, .. } => {
            let mode = if first_run { " (first run)" } else { "" };
            println!("▶️  Run requested: {}{}", node_id, mode);
        }
        ExecutionEvent::NodeStarted { node_id, node_type, input_count, .. } => {
            println!("  ⚡ Starting node: {} ({}, {} inputs)", node_id, node_type, input_count);
        }
        ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
            println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::NodeCancelled { node_id, .. } => {
            println!("  🛑 Node {} cancelled", node_id);
        }
        ExecutionEvent::NodeSkipped { node_id, reason, .. } => {
            println!("  ⏭️  Node {} skipped: {}", node_id, reason);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => {
                println!("     ℹ️  [{}] {}", node_id, message);
            }
            NodeEvent::Warning { message } => {
                println!("     ⚠️  [{}] {}", node_id, message);
            }
            NodeEvent::Partial { text } => {
                println!("     ✏️  [{}] {}", node_id, preview(&text));
            }
        },
    }
}

/// First line, at most 120 characters
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut short: String = line.chars().take(120).collect();
    if short.len() < text.len() {
        short.push('…');
    }
    short
}

fn validate_file(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let json = std::fs::read_to_string(&file)?;
    let value: serde_json::Value = serde_json::from_str(&json)?;

    let issues = graphcore::document::validate(&value);
    if !issues.is_empty() {
        println!("❌ Invalid workflow format:");
        for issue in &issues {
            println!("   {}", issue);
        }
        bail!("{} issue(s) found", issues.len());
    }

    let workflow = WorkflowDocument::from_value(value)?.into_workflow();
    let report = validate_workflow(&workflow);
    if !report.is_ok() {
        println!("❌ Graph problems:");
        for problem in report.problems() {
            println!("   {}", problem);
        }
        bail!("workflow graph is not runnable");
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!("   Order: {}", report.order.join(" → "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let mut registry = NodeRegistry::new();
    graphnodes::register_all(&mut registry);

    for kind in registry.list_node_types() {
        println!("  • {} ({})", kind, kind.category());
        println!("    {}", kind.description());
    }
    let missing: Vec<NodeKind> = NodeKind::ALL
        .into_iter()
        .filter(|kind| !registry.contains(*kind))
        .collect();
    if !missing.is_empty() {
        println!();
        println!("  Not runnable: {:?}", missing);
    }
}

fn generate_workflow(steps: PathBuf, name: &str, output: PathBuf) -> Result<()> {
    let json = std::fs::read_to_string(&steps)
        .with_context(|| format!("reading {}", steps.display()))?;
    let steps: Vec<GeneratedStep> = serde_json::from_str(&json)?;

    let (nodes, edges) = build_graph(&steps, name);
    let mut workflow = Workflow::new(name);
    workflow.nodes = nodes;
    workflow.edges = edges;

    let document = WorkflowDocument::from_workflow(&workflow).to_json()?;
    std::fs::write(&output, document)?;

    println!("✨ Created workflow: {}", output.display());
    println!("   Nodes: {}", workflow.nodes.len());
    println!();
    println!("Run it with:");
    println!("  flow run --file {} --node <id> --first-run", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphcore::CredentialStore;

    #[test]
    fn flags_override_the_environment_list() {
        let store = parse_credentials(
            &["Slack=flag".to_string()],
            Some("Slack=env; OpenAI = sk-1 ;"),
        )
        .unwrap();
        assert_eq!(store.get_credential("Slack").as_deref(), Some("flag"));
        assert_eq!(store.get_credential("OpenAI").as_deref(), Some("sk-1"));
    }

    #[test]
    fn malformed_credentials_are_rejected() {
        assert!(parse_credentials(&["nokey".to_string()], None).is_err());
    }

    #[test]
    fn preview_keeps_the_first_line() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("one\ntwo"), "one…");
    }
}
