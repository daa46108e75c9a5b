//! solverctl - operator CLI for the deterministic solver.
//!
//! Exit codes: 0 success, 1 configuration/validation/other failure,
//! 2 policy refusal, 3 job execution failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use solver_cli::commands;

/// solverctl - deterministic intent solver
#[derive(Parser, Debug)]
#[command(name = "solverctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Optional TOML config file merged over the environment
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration
    CheckConfig,

    /// Validate an intent file and print its normalized form
    PrintIntent {
        /// Path to the intent JSON file
        file: PathBuf,
    },

    /// Run an intent fixture through the full pipeline
    RunFixture {
        /// Path to the intent JSON file
        file: PathBuf,

        /// Hex-encoded secp256k1 secret key for receipt signing
        #[arg(long)]
        signing_key: Option<String>,
    },

    /// Assemble the evidence manifest for a run directory
    MakeEvidence {
        /// Path to `{dataDir}/runs/{runId}`
        run_dir: PathBuf,
    },

    /// Verify an evidence bundle
    ValidateEvidence {
        /// Path to `{dataDir}/runs/{runId}`
        run_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match cli.command {
        Commands::CheckConfig => commands::check_config::run(cli.config.as_deref()),
        Commands::PrintIntent { file } => commands::print_intent::run(cli.config.as_deref(), &file),
        Commands::RunFixture { file, signing_key } => {
            commands::run_fixture::run(cli.config.as_deref(), &file, signing_key.as_deref())
        },
        Commands::MakeEvidence { run_dir } => {
            commands::make_evidence::run(cli.config.as_deref(), &run_dir)
        },
        Commands::ValidateEvidence { run_dir } => commands::validate_evidence::run(&run_dir),
    };
    ExitCode::from(code)
}
