use std::error::Error;
use std::path::PathBuf;

use chrono::Local;
use clap::Args;
use schedua_core::{CategoryResolver, LogSink, SchedulerLoop};

use super::open_db;

#[derive(Args)]
pub struct RunArgs {
    /// Evaluate a single tick and exit
    #[arg(long)]
    once: bool,
}

pub fn run(args: RunArgs, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    let categories = CategoryResolver::new();
    let mut scheduler = SchedulerLoop::new();

    // The wire client lives outside this process; values are handed to the
    // logging sink for every output type.
    let settings = db.settings()?;
    tracing::info!(output_type = %settings.output_type, "scheduler starting");
    let mut sink = LogSink;

    if args.once {
        let report = scheduler.tick(&db, &categories, &mut sink, Local::now().naive_local())?;
        println!("{report:?}");
        return Ok(());
    }

    scheduler.run(&db, &categories, &mut sink)?;
    Ok(())
}
