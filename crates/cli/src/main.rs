//! CPM agent CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP API
//! - `run`: Plan, execute and answer a task once
//! - `chat`: Answer a message with the tool-calling agent
//! - `lookup`: Query the performance catalog directly
//! - `download`: Fetch GGUF model files (feature `local`)
//! - `config`: Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "cpmagent",
    about = "CPM agent: find the best serving configuration for a model, engine and device",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (defaults to $CPMAGENT_CONFIG or ~/.cpmagent/config.toml)
    #[arg(short, long, global = true, env = "CPMAGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the plan/execute/reflect loop on a task
    Run {
        /// The task to carry out
        task: String,

        /// Print the plan and every intermediate result
        #[arg(long)]
        trace: bool,
    },

    /// Ask the tool-calling agent a question
    Chat {
        /// The message to send
        message: String,
    },

    /// Look up performance records without a model
    Lookup {
        /// Model name, e.g. Qwen/Qwen3-235B-A22B
        model: String,
        /// Inference engine, e.g. vllm
        engine: String,
        /// Device type, e.g. nvidia/h800
        device: String,
    },

    /// Download the configured GGUF model files
    #[cfg(feature = "local")]
    Download,

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    // Logs go to stderr so command output on stdout stays machine-readable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Run { task, trace } => commands::run::run(config, &task, trace).await?,
        Commands::Chat { message } => commands::chat::run(config, &message).await?,
        Commands::Lookup {
            model,
            engine,
            device,
        } => commands::lookup::run(&model, &engine, &device)?,
        #[cfg(feature = "local")]
        Commands::Download => commands::download::run(config).await?,
        Commands::Config => commands::config_cmd::show(config)?,
    }

    Ok(())
}
