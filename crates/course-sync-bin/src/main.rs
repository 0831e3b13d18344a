//! acourse-sync - exercise the course sync layer against a live deployment.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sync_config_and_utils::{init_logging, Config, Paths};

/// acourse sync command-line interface.
#[derive(Parser)]
#[command(name = "acourse-sync")]
#[command(about = "Fetch and live-follow acourse data through the sync layer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for config and logs. Defaults to ~/.acourse
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Bearer token of the signed-in user; signed out when absent
    #[arg(long, env = "ACOURSE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the public course list
    Courses,
    /// Fetch and print one course by id or url
    Course { id: String },
    /// Follow a course live until Ctrl-C, printing each merged snapshot
    WatchCourse { id: String },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    match cli.command {
        Commands::Courses => commands::courses(config, cli.token).await?,
        Commands::Course { id } => commands::course(config, cli.token, &id).await?,
        Commands::WatchCourse { id } => commands::watch_course(config, cli.token, &id).await?,
        Commands::Config => commands::print_config(&config, &paths)?,
    }

    Ok(())
}
