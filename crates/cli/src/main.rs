//! MindThread CLI — the main entry point.
//!
//! Commands:
//! - `agent`   — Interactive chat or single-message mode
//! - `config`  — Show, validate, or print the default configuration
//! - `status`  — Show the resolved configuration

use std::path::PathBuf;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mindthread",
    about = "MindThread — a conversational agent with long-term memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "MINDTHREAD_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long, conflicts_with = "audio")]
        message: Option<String>,

        /// Send an audio file (transcribed with the configured speech command)
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Also synthesize each reply to an audio file
        #[arg(long)]
        speak: bool,

        /// Continue a named session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the active configuration (secrets redacted)
    Show,
    /// Print a default config.toml
    Default,
    /// Validate the active configuration
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Agent {
            message,
            audio,
            speak,
            session,
        } => {
            commands::agent::run(commands::agent::AgentArgs {
                message,
                audio,
                speak,
                session,
            })
            .await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Default => commands::config_cmd::print_default().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
