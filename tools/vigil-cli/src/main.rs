//! Vigil CLI: attention monitoring with hysteretic warnings.
//!
//! Usage:
//!   vigil run [OPTIONS]        Monitor a live gaze feed
//!   vigil replay <LOG>         Re-run a recorded session through fresh trackers
//!   vigil validate <LOG>       Audit a session log
//!   vigil info <LOG>           Show session log information
//!   vigil emit [OPTIONS]       Send a synthetic gaze pattern over UDP
//!   vigil init-config          Write the default configuration file

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vigil_common::config::{config_file_path, AppConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Attention monitoring with hysteretic warnings",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the standard location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a live gaze feed
    Run {
        /// UDP address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Receive timeout in milliseconds (0 waits forever)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Directory for the session log
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Drive only the visual channel
        #[arg(long, conflicts_with = "auditory_only")]
        visual_only: bool,

        /// Drive only the auditory channel
        #[arg(long)]
        auditory_only: bool,
    },

    /// Re-run a recorded session through fresh trackers
    Replay {
        /// Path to the session log
        log: PathBuf,

        /// Override every channel's glance period (seconds)
        #[arg(long)]
        glance_secs: Option<f64>,

        /// Override every channel's warning period (seconds)
        #[arg(long)]
        warning_secs: Option<f64>,
    },

    /// Audit a session log
    Validate {
        /// Path to the session log
        log: PathBuf,
    },

    /// Show session log information
    Info {
        /// Path to the session log
        log: PathBuf,
    },

    /// Send a synthetic gaze-away / gaze-back pattern over UDP
    Emit {
        /// Destination address (defaults to the configured bind address)
        #[arg(long)]
        target: Option<SocketAddr>,

        /// Seconds spent looking away per cycle
        #[arg(long, default_value = "4.0")]
        away_secs: f64,

        /// Seconds spent looking back per cycle
        #[arg(long, default_value = "1.0")]
        back_secs: f64,

        /// Samples per second
        #[arg(long, default_value = "40", value_parser = clap::value_parser!(u32).range(1..=10_000))]
        rate_hz: u32,

        /// Number of away/back cycles
        #[arg(long, default_value = "3")]
        cycles: u32,

        /// Send JSON objects instead of bare literals
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, load_warning) = match &cli.command {
        Commands::InitConfig { .. } => (AppConfig::default(), None),
        _ => load_config(cli.config.as_deref())?,
    };

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    vigil_common::logging::init_logging(&logging);
    if let Some(warning) = load_warning {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Commands::Run {
            bind,
            timeout_ms,
            log_dir,
            visual_only,
            auditory_only,
        } => {
            commands::run::run(config, bind, timeout_ms, log_dir, visual_only, auditory_only)
                .await
        }
        Commands::Replay {
            log,
            glance_secs,
            warning_secs,
        } => commands::replay::run(config, log, glance_secs, warning_secs).await,
        Commands::Validate { log } => commands::validate::run(log),
        Commands::Info { log } => commands::info::run(log),
        Commands::Emit {
            target,
            away_secs,
            back_secs,
            rate_hz,
            cycles,
            json,
        } => {
            commands::emit::run(config, target, away_secs, back_secs, rate_hz, cycles, json)
                .await
        }
        Commands::InitConfig { force } => {
            let path = cli.config.unwrap_or_else(config_file_path);
            commands::init_config::run(path, force)
        }
    }
}

/// An explicit `--config` must load. The standard location falls back to
/// defaults, returning the reason so it can be logged once logging is up.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<(AppConfig, Option<String>)> {
    if let Some(path) = path {
        let config = AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?;
        return Ok((config, None));
    }

    let path = config_file_path();
    if !path.exists() {
        return Ok((AppConfig::default(), None));
    }
    match AppConfig::load_from(&path) {
        Ok(config) => Ok((config, None)),
        Err(e) => Ok((
            AppConfig::default(),
            Some(format!(
                "Failed to load config at {}: {e}; using defaults",
                path.display()
            )),
        )),
    }
}
