mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs::{create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "studyguard")]
#[command(about = "Activity classification and intervention engine", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine: observations as JSON lines on stdin, actions on stdout
    Run {
        /// Audit database path
        #[arg(long)]
        db: Option<PathBuf>,
        /// Write logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Replay a recorded observation stream and print the decisions
    Replay {
        /// JSON lines file, one observation per line
        file: PathBuf,
        /// Use content analysis when it is enabled in the config
        #[arg(long)]
        ai: bool,
        /// Print emitted actions as JSON lines
        #[arg(long)]
        json: bool,
        /// Keep the audit trail in this database instead of memory
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Classify a single URL
    Classify {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        text: Option<String>,
        /// Also run content analysis
        #[arg(long)]
        ai: bool,
    },
    /// Summarize the audit log
    Report {
        /// Time period: hour, today, week, or month
        #[arg(default_value = "today")]
        period: String,
        /// Audit database path
        #[arg(long)]
        db: Option<PathBuf>,
        /// Add a short written summary from the AI provider
        #[arg(long)]
        narrative: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration file
    Validate,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    let Some(path) = log_file else {
        env_logger::Builder::from_env(env)
            .format_timestamp_secs()
            .init();
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run { log_file, .. } => log_file.as_deref(),
        _ => None,
    };
    init_logging(log_file)?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run { db, .. } => commands::run::handle_run(config, db).await,
        Commands::Replay { file, ai, json, db } => {
            commands::replay::handle_replay(&file, config, ai, json, db).await
        }
        Commands::Classify {
            url,
            title,
            text,
            ai,
        } => commands::classify::handle_classify(&url, title, text, ai, config).await,
        Commands::Report {
            period,
            db,
            narrative,
        } => commands::report::handle_report(&period, db, narrative, config).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::handle_config_show(config),
            ConfigAction::Validate => commands::config::handle_config_validate(config),
            ConfigAction::Path => commands::config::handle_config_path(config),
            ConfigAction::Init { force } => commands::config::handle_config_init(config, force),
        },
    }
}
