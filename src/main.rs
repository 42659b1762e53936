use std::path::Path;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use plan_runner::config::Config;
use plan_runner::plan::Plan;
use plan_runner::{face, report, runner};

#[derive(Parser)]
#[command(name = "plan-runner", about = "Execute declarative browser plans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a plan from a JSON file and print the report.
    Run {
        /// Path to the plan document.
        plan: PathBuf,
    },
    /// Serve the runner over HTTP (POST /run, GET /events, GET /healthz).
    Serve {
        /// Port to bind; falls back to the next few ports if taken.
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::from_env();
    init_tracing(&config);

    let cli = Cli::parse();
    match cli.command {
        Command::Run { plan } => run_file(&plan, config).await,
        Command::Serve { port } => face::serve(config, port).await,
    }
}

async fn run_file(path: &Path, config: Config) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read plan file {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&raw)
        .with_context(|| format!("invalid plan document {}", path.display()))?;
    let final_report = plan.final_report.clone();

    // The runner blocks on browser I/O; keep it off the async runtime.
    let outcome = tokio::task::spawn_blocking(move || runner::run(&plan, &config, &mut |_| {}))
        .await
        .context("runner task failed")??;

    println!("{}", report::render(&outcome));
    if let Some(serde_json::Value::String(template)) = final_report {
        println!("{}", report::format_final_report(&template, &outcome.extracted));
    }
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout carries only the report.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
