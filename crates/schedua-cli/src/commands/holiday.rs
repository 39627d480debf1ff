use std::error::Error;
use std::path::PathBuf;

use chrono::NaiveTime;
use clap::Subcommand;
use schedua_core::HolidayEntry;

use super::{open_db, parse_date};

#[derive(Subcommand)]
pub enum HolidayAction {
    /// Create a holiday calendar
    CalendarAdd {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Make it the default calendar (the one the resolver reads)
        #[arg(long)]
        default: bool,
    },
    /// List calendars
    Calendars {
        #[arg(long)]
        json: bool,
    },
    /// Make a calendar the default
    SetDefault { id: i64 },
    /// Add a holiday entry; without --start/--end the entry is full-day
    Add {
        calendar: i64,
        /// Date, YYYY-MM-DD
        date: String,
        name: String,
        /// Window start, HH:MM
        #[arg(long)]
        start: Option<String>,
        /// Window end, HH:MM
        #[arg(long)]
        end: Option<String>,
        /// Category rewrite for occurrences that day
        #[arg(long)]
        category: Option<i64>,
        /// Target value rewrite for occurrences that day
        #[arg(long)]
        value: Option<String>,
    },
    /// List entries of a calendar
    List {
        calendar: i64,
        #[arg(long)]
        json: bool,
    },
    /// Delete a holiday entry
    Remove { id: i64 },
}

fn parse_time(s: &str) -> Result<NaiveTime, Box<dyn Error>> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| format!("invalid time '{s}' (expected HH:MM)").into())
}

pub fn run(action: HolidayAction, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    match action {
        HolidayAction::CalendarAdd {
            name,
            description,
            default,
        } => {
            let id = db.create_calendar(&name, description.as_deref(), default)?;
            println!("calendar {id} created");
        }
        HolidayAction::Calendars { json } => {
            let calendars = db.list_calendars()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&calendars)?);
            } else {
                for c in calendars {
                    let marker = if c.is_default { " (default)" } else { "" };
                    println!("{:>4}  {}{}", c.id, c.name, marker);
                }
            }
        }
        HolidayAction::SetDefault { id } => {
            db.set_default_calendar(id)?;
            println!("calendar {id} is now the default");
        }
        HolidayAction::Add {
            calendar,
            date,
            name,
            start,
            end,
            category,
            value,
        } => {
            let start_time = start.as_deref().map(parse_time).transpose()?;
            let end_time = end.as_deref().map(parse_time).transpose()?;
            let id = db.upsert_holiday_entry(&HolidayEntry {
                id: 0,
                calendar_id: calendar,
                date: parse_date(&date)?,
                name,
                is_full_day: start_time.is_none() && end_time.is_none(),
                start_time,
                end_time,
                override_category_id: category,
                override_target_value: value,
            })?;
            println!("holiday entry {id} created");
        }
        HolidayAction::List { calendar, json } => {
            let entries = db.list_entries_for_calendar(calendar)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for e in entries {
                    let window = if e.is_full_day {
                        "full day".to_string()
                    } else {
                        format!(
                            "{}-{}",
                            e.start_time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
                            e.end_time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
                        )
                    };
                    println!("{:>4}  {} {:<16} {}", e.id, e.date, e.name, window);
                }
            }
        }
        HolidayAction::Remove { id } => {
            db.delete_holiday_entry(id)?;
            println!("holiday entry {id} deleted");
        }
    }
    Ok(())
}
