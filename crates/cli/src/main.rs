//! `trellis` CLI entry-point.
//!
//! Sub-commands:
//! - `start`   — create a new instance and run to completion or suspension.
//! - `resume`  — load an instance's checkpoint and continue from it.
//! - `status`  — inspect the latest checkpoint without mutating it.
//! - `respond` — answer an open pause point, then resume.
//! - `serve`   — start the HTTP API server.

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use engine::{
    EngineError, Executor, InstanceStatus, InterruptController, RetryPolicy, RunReport,
};
use steps::{Decision, InterruptResponse};
use store::FileStore;

#[derive(Parser)]
#[command(name = "trellis", about = "Durable step-orchestration engine", version)]
struct Cli {
    /// Directory checkpoints are stored in.
    #[arg(long, env = "TRELLIS_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Demo workflow definition to run against (pipeline, proposal, toolbox).
    #[arg(long, env = "TRELLIS_FLOW", default_value = "pipeline")]
    flow: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new instance and run to completion or suspension.
    Start {
        /// Initial state as a JSON object.
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Load an instance's checkpoint and continue from it.
    Resume { id: String },
    /// Inspect the latest checkpoint without mutating it.
    Status { id: String },
    /// Answer an open pause point, then resume the instance.
    Respond {
        id: String,
        /// approve, reject, or revise.
        #[arg(long)]
        decision: String,
        /// Free-form feedback forwarded to the pause handler.
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Start the HTTP API server over the same data directory.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let store = Arc::new(FileStore::new(&cli.data_dir).context("opening checkpoint store")?);
    let interrupts = Arc::new(InterruptController::new());
    let executor = Arc::new(Executor::new(
        store.clone(),
        Arc::clone(&interrupts),
        RetryPolicy::default(),
    ));

    match cli.command {
        Command::Start { input } => {
            let graph = demo::definition(&cli.flow)?;
            let input = serde_json::from_str(&input).context("parsing --input as JSON")?;
            let report = executor.start(&graph, input).await?;
            print_report(&report, &interrupts);
            Ok(exit_code(&report))
        }

        Command::Resume { id } => {
            let graph = demo::definition(&cli.flow)?;
            match executor.resume(&graph, &id).await {
                Ok(report) => {
                    print_report(&report, &interrupts);
                    Ok(exit_code(&report))
                }
                Err(EngineError::NotFound(msg)) => {
                    eprintln!("not found: {msg}");
                    Ok(1)
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::Status { id } => match executor.status(&id).await {
            Ok(instance) => {
                println!("{}", serde_json::to_string_pretty(&instance)?);
                Ok(0)
            }
            Err(EngineError::NotFound(msg)) => {
                eprintln!("not found: {msg}");
                Ok(1)
            }
            Err(err) => Err(err.into()),
        },

        Command::Respond {
            id,
            decision,
            payload,
        } => {
            let graph = demo::definition(&cli.flow)?;
            interrupts.submit_response(InterruptResponse {
                instance_id: id.clone(),
                decision: parse_decision(&decision)?,
                payload,
            });
            match executor.resume(&graph, &id).await {
                Ok(report) => {
                    print_report(&report, &interrupts);
                    Ok(exit_code(&report))
                }
                Err(EngineError::NotFound(msg)) => {
                    eprintln!("not found: {msg}");
                    Ok(1)
                }
                Err(err) => Err(err.into()),
            }
        }

        Command::Serve { bind } => {
            let state = api::AppState {
                executor,
                store,
                definitions: Arc::new(demo::all()),
            };
            info!("serving definitions: pipeline, proposal, toolbox");
            api::serve(&bind, state).await?;
            Ok(0)
        }
    }
}

fn parse_decision(raw: &str) -> Result<Decision> {
    match raw.to_ascii_lowercase().as_str() {
        "approve" => Ok(Decision::Approve),
        "reject" => Ok(Decision::Reject),
        "revise" => Ok(Decision::Revise),
        other => bail!("unknown decision '{other}' (expected approve, reject, or revise)"),
    }
}

fn print_report(report: &RunReport, interrupts: &InterruptController) {
    println!("instance: {}", report.instance_id);
    println!("status:   {}", report.status);
    if let Some(error) = &report.error {
        println!("error:    {error}");
    }
    if report.status == InstanceStatus::Suspended {
        if let Some(request) = interrupts.pending_request(&report.instance_id) {
            println!("awaiting: {}", request.prompt);
        }
        println!(
            "resume with: trellis respond {} --decision approve|reject|revise",
            report.instance_id
        );
    }
}

fn exit_code(report: &RunReport) -> i32 {
    match report.status {
        InstanceStatus::Failed => 1,
        _ => 0,
    }
}
