use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "schedua", version, about = "Calendar-driven value scheduler")]
struct Cli {
    /// Database file (defaults to ~/.schedua/schedua.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Series management
    Series {
        #[command(subcommand)]
        action: commands::series::SeriesAction,
    },
    /// Per-date exceptions (cancel / override)
    Exception {
        #[command(subcommand)]
        action: commands::exception::ExceptionAction,
    },
    /// Holiday calendars and entries
    Holiday {
        #[command(subcommand)]
        action: commands::holiday::HolidayAction,
    },
    /// Category management
    Category {
        #[command(subcommand)]
        action: commands::category::CategoryAction,
    },
    /// General settings
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Runtime override (forced value)
    Override {
        #[command(subcommand)]
        action: commands::overrides::OverrideAction,
    },
    /// Resolve occurrences for a window
    Resolve(commands::resolve::ResolveArgs),
    /// Current status and next event
    Status(commands::status::StatusArgs),
    /// Run the scheduler loop
    Run(commands::run::RunArgs),
}

fn init_logging() {
    let filter =
        std::env::var("SCHEDUA_LOG").unwrap_or_else(|_| "schedua=info,schedua_core=info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let db = cli.db;
    let result = match cli.command {
        Commands::Series { action } => commands::series::run(action, db),
        Commands::Exception { action } => commands::exception::run(action, db),
        Commands::Holiday { action } => commands::holiday::run(action, db),
        Commands::Category { action } => commands::category::run(action, db),
        Commands::Settings { action } => commands::settings::run(action, db),
        Commands::Override { action } => commands::overrides::run(action, db),
        Commands::Resolve(args) => commands::resolve::run(args, db),
        Commands::Status(args) => commands::status::run(args, db),
        Commands::Run(args) => commands::run::run(args, db),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
