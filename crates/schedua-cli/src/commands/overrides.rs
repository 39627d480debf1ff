use std::error::Error;
use std::path::PathBuf;

use chrono::{Duration, Local};
use clap::Subcommand;

use super::{open_db, parse_datetime};

#[derive(Subcommand)]
pub enum OverrideAction {
    /// Force a value; without a bound it stays until cleared
    Set {
        value: String,
        /// Expiry instant, YYYY-MM-DD HH:MM
        #[arg(long, conflicts_with = "for_secs")]
        until: Option<String>,
        /// Expiry after this many seconds
        #[arg(long)]
        for_secs: Option<i64>,
    },
    /// Clear the override and return to schedule values
    Clear,
    /// Show the active override
    Show {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: OverrideAction, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    match action {
        OverrideAction::Set {
            value,
            until,
            for_secs,
        } => {
            let until = match (until, for_secs) {
                (Some(s), _) => Some(parse_datetime(&s)?),
                (None, Some(secs)) => Some(Local::now().naive_local() + Duration::seconds(secs)),
                (None, None) => None,
            };
            db.set_runtime_override(&value, until)?;
            match until {
                Some(until) => println!("override '{value}' active until {until}"),
                None => println!("override '{value}' active until cleared"),
            }
        }
        OverrideAction::Clear => {
            db.clear_runtime_override()?;
            println!("override cleared");
        }
        OverrideAction::Show { json } => {
            let now = Local::now().naive_local();
            match db.runtime_override(now)? {
                Some(current) if json => println!("{}", serde_json::to_string_pretty(&current)?),
                Some(current) => {
                    let until = current
                        .override_until
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| "cleared manually".to_string());
                    println!("value={} until={}", current.override_value, until);
                }
                None if json => println!("null"),
                None => println!("no active override"),
            }
        }
    }
    Ok(())
}
