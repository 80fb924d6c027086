//! powermond — the power-monitor daemon.
//!
//! Samples site load power over SNMP and switches the mining fleet off
//! when it crosses the high limit, back on once it has stayed low for
//! the cooldown.
//!
//! # Usage
//!
//! ```text
//! powermond run --config /etc/powermon/powermon.toml
//! powermond check
//! powermond sample
//! powermond switch off
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use powermon_core::PowerAction;

mod commands;

#[derive(Parser)]
#[command(
    name = "powermond",
    about = "Power monitor — load-driven mining fleet control",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to powermon.toml.
    #[arg(short, long, global = true, default_value = "powermon.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop until interrupted.
    Run,
    /// Validate the config file and print what it resolves to.
    Check,
    /// Take one load-power reading and print it.
    Sample,
    /// Send one power command to every worker and wait for the outcomes.
    Switch {
        /// on | off
        action: PowerAction,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,powermond=debug,powermon=debug"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run => commands::run(&cli.config).await,
        Command::Check => commands::check(&cli.config),
        Command::Sample => commands::sample(&cli.config).await,
        Command::Switch { action } => commands::switch(&cli.config, action).await,
    }
}
