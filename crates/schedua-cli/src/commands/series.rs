use std::error::Error;
use std::path::PathBuf;

use chrono::Local;
use clap::Subcommand;
use schedua_core::{DataType, Series, SinkSecurity};

use super::open_db;

#[derive(Subcommand)]
pub enum SeriesAction {
    /// Add a new series
    Add {
        /// Human-readable task name
        name: String,
        /// Wire endpoint, e.g. opc.tcp://host:4840
        #[arg(long)]
        endpoint: String,
        /// Target node id, e.g. ns=2;i=1001
        #[arg(long)]
        node: String,
        /// Value written when an occurrence is live
        #[arg(long)]
        value: String,
        /// Recurrence rule string
        #[arg(long)]
        rule: String,
        /// Value data type: auto | int | float | string | bool
        #[arg(long, default_value = "auto")]
        data_type: String,
        #[arg(long, default_value_t = 1)]
        category: i64,
        #[arg(long, default_value_t = 1)]
        priority: i64,
        /// Create the series disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List all series
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one series
    Show { id: i64 },
    /// Enable a series
    Enable { id: i64 },
    /// Disable a series
    Disable { id: i64 },
    /// Delete a series
    Remove { id: i64 },
    /// Upcoming trigger times of one series
    Next {
        id: i64,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

pub fn run(action: SeriesAction, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    match action {
        SeriesAction::Add {
            name,
            endpoint,
            node,
            value,
            rule,
            data_type,
            category,
            priority,
            disabled,
        } => {
            let data_type = DataType::parse(&data_type)
                .ok_or_else(|| format!("unknown data type '{data_type}'"))?;
            let id = db.create_series(&Series {
                id: 0,
                task_name: name,
                endpoint,
                node_id: node,
                target_value: value,
                data_type,
                rrule_str: rule,
                category_id: category,
                priority,
                enabled: !disabled,
                security: SinkSecurity::default(),
                last_execution_status: None,
            })?;
            println!("series {id} created");
        }
        SeriesAction::List { json } => {
            let series = db.list_series()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                for s in series {
                    let state = if s.enabled { "enabled" } else { "disabled" };
                    println!(
                        "{:>4}  {:<24} {:<10} value={} rule={}",
                        s.id, s.task_name, state, s.target_value, s.rrule_str
                    );
                }
            }
        }
        SeriesAction::Show { id } => {
            let series = db.series(id)?.ok_or_else(|| format!("series {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        SeriesAction::Enable { id } => {
            db.set_series_enabled(id, true)?;
            println!("series {id} enabled");
        }
        SeriesAction::Disable { id } => {
            db.set_series_enabled(id, false)?;
            println!("series {id} disabled");
        }
        SeriesAction::Remove { id } => {
            db.delete_series(id)?;
            println!("series {id} deleted");
        }
        SeriesAction::Next { id, count } => {
            let rule = db.series_rule(id)?;
            let mut after = Local::now().naive_local();
            for _ in 0..count {
                match rule.next_after(after) {
                    Some(start) => {
                        println!("{start}");
                        after = start;
                    }
                    None => break,
                }
            }
        }
    }
    Ok(())
}
