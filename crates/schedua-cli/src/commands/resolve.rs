use std::error::Error;
use std::path::PathBuf;

use chrono::{Duration, Local};
use clap::Args;
use schedua_core::{CategoryResolver, Resolver};

use super::{open_db, parse_datetime};

#[derive(Args)]
pub struct ResolveArgs {
    /// Window start, YYYY-MM-DD HH:MM (default: today 00:00)
    #[arg(long)]
    from: Option<String>,
    /// Window end, exclusive (default: from + 7 days)
    #[arg(long)]
    to: Option<String>,
    /// Clip cross-window occurrences to the window
    #[arg(long)]
    clip: bool,
    #[arg(long)]
    json: bool,
}

pub fn run(args: ResolveArgs, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    let now = Local::now().naive_local();

    let from = match args.from.as_deref() {
        Some(s) => parse_datetime(s)?,
        None => now.date().and_hms_opt(0, 0, 0).expect("midnight exists"),
    };
    let to = match args.to.as_deref() {
        Some(s) => parse_datetime(s)?,
        None => from + Duration::days(7),
    };

    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);
    let occurrences = if args.clip {
        resolver.resolve_clipped(from, to, now)?
    } else {
        resolver.resolve(from, to, now)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&occurrences)?);
    } else {
        for o in &occurrences {
            let mut flags = String::new();
            if o.is_holiday {
                flags.push('H');
            }
            if o.is_exception {
                flags.push('E');
            }
            if o.is_override {
                flags.push('O');
            }
            println!(
                "{} .. {}  [{:<9}] {:<24} value={} {}",
                o.start,
                o.end,
                o.source.as_str(),
                o.title,
                o.target_value,
                flags,
            );
        }
        eprintln!("{} occurrence(s)", occurrences.len());
    }
    Ok(())
}
