use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use time::OffsetDateTime;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::backend;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::pantry::{Pantry, PantrySettings};

pub mod commands;

use self::commands::{AddArgs, ClearArgs, EditArgs, ListArgs, LoginArgs, RemoveArgs};

const LOG_FILE: &str = "pantry.log";

#[derive(Parser, Debug)]
#[command(
    name = "pantry",
    version,
    about = "Keyboard-first pantry tracker with expiry alerts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over PANTRY_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over PANTRY_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Sign in with an email address, creating the local account if needed
    Login(LoginArgs),
    /// End the current session
    Logout,
    /// Print the signed-in account
    Whoami,
    /// Add an item to your pantry
    Add(AddArgs),
    /// List your items with their expiry status
    List(ListArgs),
    /// Change an item's name, quantity or expiry date
    Edit(EditArgs),
    /// Delete one item
    Remove(RemoveArgs),
    /// Delete every item in your pantry
    Clear(ClearArgs),
}

enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();

    let command = cli.command.unwrap_or(Commands::Tui);
    let log_path = paths.log_dir.join(LOG_FILE);
    // the terminal belongs to the TUI while it runs
    let target = match command {
        Commands::Tui => LogTarget::File(&log_path),
        _ => LogTarget::Stderr,
    };
    init_tracing(&cli.log_level, target)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let config = Arc::new(loader.load_or_init()?);
    let backend = backend::open_local(&paths, &config.backend)?;
    let mut pantry = Pantry::new(backend, PantrySettings::from_config(&config));
    tracing::debug!(command = ?command, "pantry ready");

    match command {
        Commands::Tui => {
            let mut app = App::new(config, pantry);
            commands::run_tui(&mut app)
        }
        other => {
            let output = commands::execute(&mut pantry, other, OffsetDateTime::now_utc())?;
            print!("{output}");
            Ok(())
        }
    }
}

fn init_tracing(level: &str, target: LogTarget<'_>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match target {
            LogTarget::Stderr => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
            LogTarget::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_timer(UtcTime::rfc_3339())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
        }
        Ok(())
    })
    .map(|_| ())
}
