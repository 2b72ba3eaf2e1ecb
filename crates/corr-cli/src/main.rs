//! Command-line entry point for the correlation engine
//!
//! Boots the full system around in-memory collaborator stubs, optionally
//! kicks off a workflow, and prints status tables on shutdown. Real
//! deployments embed the coordinator with production collaborators instead.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use corr_coordinator::{
    Collaborators, Coordinator, InMemoryMarketStore, StaticAnalysisService, StaticDataSource,
};
use corr_utils::EngineConfig;
use corr_workflow::WorkflowKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "corr-engine")]
#[command(about = "Multi-market correlation engine", long_about = None)]
struct Args {
    /// Path to an engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the system and run until interrupted
    Run {
        /// Start a workflow of this kind after boot (full, quick, ml_focused)
        #[arg(long)]
        workflow: Option<String>,

        /// Symbols for the workflow, comma-separated (defaults to config)
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,

        /// Stop automatically after this many seconds instead of on ctrl-c
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    corr_utils::init_tracing();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Run {
            workflow,
            symbols,
            duration_secs,
        } => run(config, workflow, symbols, duration_secs).await,
    }
}

async fn run(
    config: EngineConfig,
    workflow: Option<String>,
    symbols: Option<Vec<String>>,
    duration_secs: Option<u64>,
) -> anyhow::Result<()> {
    let store = Arc::new(InMemoryMarketStore::new());
    let collaborators = Collaborators {
        source: Arc::new(StaticDataSource::new(store.clone())),
        store,
        analysis: Arc::new(StaticAnalysisService),
    };

    let coordinator = Coordinator::new(config, collaborators)
        .map_err(|e| anyhow::anyhow!("failed to assemble system: {e}"))?;
    coordinator
        .start_system()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start system: {e}"))?;

    if let Some(kind) = workflow {
        let kind = WorkflowKind::parse(&kind);
        let id = coordinator.execute_workflow(kind, symbols, serde_json::json!({}));
        info!(workflow = %id, kind = %kind, "Workflow started from the command line");
    }

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                () = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("Interrupted");
        }
    }

    print_status(&coordinator);
    coordinator.stop_system().await;
    Ok(())
}

fn print_status(coordinator: &Coordinator) {
    let status = coordinator.get_system_status();

    let mut agents = Table::new();
    agents.load_preset(UTF8_FULL).set_header(vec![
        "Agent",
        "State",
        "Queue",
        "Completed",
        "Failed",
        "Avg (s)",
    ]);
    let mut rows: Vec<_> = status.agents.values().collect();
    rows.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    for agent in rows {
        agents.add_row(vec![
            agent.name.clone(),
            agent.state.to_string(),
            agent.queue_size.to_string(),
            agent.metrics.tasks_completed.to_string(),
            agent.metrics.tasks_failed.to_string(),
            format!("{:.3}", agent.metrics.average_task_time_secs),
        ]);
    }
    println!("{agents}");

    let mut workflows = Table::new();
    workflows
        .load_preset(UTF8_FULL)
        .set_header(vec!["Workflow", "Kind", "Status", "Stages", "Errors"]);
    for run in coordinator.engine().list_runs() {
        workflows.add_row(vec![
            run.workflow_id.to_string(),
            run.workflow_type.to_string(),
            run.status.to_string(),
            run.stages_completed.len().to_string(),
            run.errors.len().to_string(),
        ]);
    }
    println!("{workflows}");

    let scheduler = &status.scheduler;
    println!(
        "scheduler: {} jobs ({} enabled), {} in flight, {} executions logged, bus backlog {}",
        scheduler.total_jobs,
        scheduler.enabled_jobs,
        scheduler.in_flight,
        scheduler.history_len,
        status.bus_backlog
    );
}
