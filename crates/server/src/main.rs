use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use fanout_core::{CounterPipeline, FailurePolicy, RunConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod api;
mod config;
mod console;

use config::AppConfig;
use console::{render_outcome, ConsoleProgress};

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Scatter/gather counter pipeline", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "fanout.toml", env = "FANOUT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the counter pipeline once and print the result
    Run(RunArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Number of units to spawn
    #[arg(long, allow_hyphen_values = true)]
    fan_out: Option<i64>,

    /// Value the counter must reach
    #[arg(long, allow_hyphen_values = true)]
    expected: Option<i64>,

    /// Upper bound on concurrently running units
    #[arg(long)]
    workers: Option<usize>,

    /// Barrier deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Stop scheduling after the first unit failure
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing; stdout is reserved for the run report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanout_core=info,fanout_server=info,tower_http=debug".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(config, args).await,
        Command::Serve(args) => {
            let host = args.host.unwrap_or_else(|| config.server.host.clone());
            let port = args.port.unwrap_or(config.server.port);
            let addr = format!("{}:{}", host, port);
            tracing::info!("Starting API server on {}", addr);

            api::serve(&addr, config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: AppConfig, args: RunArgs) -> Result<ExitCode> {
    let defaults = config.pipeline.run_config();
    let run_config = RunConfig::new(
        args.fan_out.unwrap_or(defaults.fan_out_count),
        args.expected.unwrap_or(defaults.expected_total),
    );

    let mut runner_config = config.runner;
    if let Some(workers) = args.workers {
        runner_config.workers = workers;
    }
    if args.timeout_secs.is_some() {
        runner_config.timeout_secs = args.timeout_secs;
    }
    if args.fail_fast {
        runner_config.failure_policy = FailurePolicy::FailFast;
    }

    let outcome = CounterPipeline::new()
        .run_config(run_config)
        .runner_config(runner_config)
        .progress(Arc::new(ConsoleProgress))
        .run()
        .await?;

    println!("{}", render_outcome(&outcome));

    Ok(if outcome.succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
