use std::error::Error;
use std::path::PathBuf;

use clap::Subcommand;
use schedua_core::Exception;

use super::{open_db, parse_date, parse_datetime};

#[derive(Subcommand)]
pub enum ExceptionAction {
    /// Cancel every occurrence of a series on one date
    Cancel {
        series: i64,
        /// Occurrence date, YYYY-MM-DD
        date: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Override the occurrences of a series on one date
    Override {
        series: i64,
        /// Occurrence date, YYYY-MM-DD
        date: String,
        /// Replacement start time (must fall on the date)
        #[arg(long)]
        start: Option<String>,
        /// Replacement end time (must fall on the date)
        #[arg(long)]
        end: Option<String>,
        /// Replacement title
        #[arg(long)]
        name: Option<String>,
        /// Replacement target value
        #[arg(long)]
        value: Option<String>,
        /// Replacement category id
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        note: Option<String>,
    },
    /// List exceptions of a series
    List {
        series: i64,
        #[arg(long)]
        json: bool,
    },
    /// Delete an exception by id
    Remove { id: i64 },
}

pub fn run(action: ExceptionAction, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    match action {
        ExceptionAction::Cancel { series, date, note } => {
            let id = db.upsert_exception(&Exception {
                id: 0,
                schedule_id: series,
                occurrence_date: parse_date(&date)?,
                action: schedua_core::ExceptionAction::Cancel,
                override_start: None,
                override_end: None,
                override_task_name: None,
                override_target_value: None,
                override_category_id: None,
                note,
            })?;
            println!("exception {id} set (cancel {date})");
        }
        ExceptionAction::Override {
            series,
            date,
            start,
            end,
            name,
            value,
            category,
            note,
        } => {
            let id = db.upsert_exception(&Exception {
                id: 0,
                schedule_id: series,
                occurrence_date: parse_date(&date)?,
                action: schedua_core::ExceptionAction::Override,
                override_start: start.as_deref().map(parse_datetime).transpose()?,
                override_end: end.as_deref().map(parse_datetime).transpose()?,
                override_task_name: name,
                override_target_value: value,
                override_category_id: category,
                note,
            })?;
            println!("exception {id} set (override {date})");
        }
        ExceptionAction::List { series, json } => {
            let exceptions = db.list_exceptions_for_series(series)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&exceptions)?);
            } else {
                for e in exceptions {
                    println!(
                        "{:>4}  {} {:<9} value={} note={}",
                        e.id,
                        e.occurrence_date,
                        e.action.as_str(),
                        e.override_target_value.as_deref().unwrap_or("-"),
                        e.note.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        ExceptionAction::Remove { id } => {
            db.delete_exception(id)?;
            println!("exception {id} deleted");
        }
    }
    Ok(())
}
