//! Shiftclock CLI - sign in and keep a session alive from the terminal

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::{Commands, Context};
use shiftclock_session::Language;
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "shiftclock")]
#[command(about = "Sign in to Shiftclock and manage the local session")]
#[command(version)]
struct Cli {
    /// Override the configured log level
    #[arg(short = 'l', long, global = true)]
    log_level: Option<LogLevel>,

    /// Configuration file (TOML or YAML)
    #[arg(short = 'c', long, global = true, env = "SHIFTCLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the session file
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of the authentication API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Use the built-in in-memory backend instead of the API; the session is
    /// not saved and ends when the command exits
    #[arg(long, global = true)]
    offline: bool,

    /// Language of user-facing messages, e.g. `en` or `es`
    #[arg(long, global = true, env = "SHIFTCLOCK_LANG", default_value = "en")]
    lang: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::load_settings(
        cli.config.as_deref(),
        config::Overrides {
            log_level: cli.log_level.map(|level| level.as_str().to_string()),
            data_dir: cli.data_dir,
            api_url: cli.api_url,
        },
    )?;
    shiftclock_core::logging::init_logging(&settings.logging)?;
    debug!(?settings, "configuration loaded");

    let context = Context {
        settings,
        offline: cli.offline,
        language: Language::from_tag(&cli.lang),
    };

    if let Err(e) = cli.command.execute(context).await {
        error!("Command failed: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}
