pub mod database;
pub mod migrations;

pub use database::{Database, Snapshot};

use std::path::PathBuf;

/// Returns `~/.schedua/`, creating it if it doesn't exist.
pub fn data_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".schedua");
    std::fs::create_dir_all(&dir).ok();
    dir
}
