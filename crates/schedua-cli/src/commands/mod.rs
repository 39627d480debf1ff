pub mod category;
pub mod exception;
pub mod holiday;
pub mod overrides;
pub mod resolve;
pub mod run;
pub mod series;
pub mod settings;
pub mod status;

use std::error::Error;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use schedua_core::Database;

pub(crate) fn open_db(path: Option<PathBuf>) -> Result<Database, Box<dyn Error>> {
    let db = match path {
        Some(path) => Database::open_at(path)?,
        None => Database::open()?,
    };
    Ok(db)
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` and the space-separated variant.
pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, Box<dyn Error>> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    Err(format!("invalid datetime '{s}' (expected YYYY-MM-DD HH:MM)").into())
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, Box<dyn Error>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{s}' (expected YYYY-MM-DD)").into())
}
