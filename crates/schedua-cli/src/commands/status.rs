use std::error::Error;
use std::path::PathBuf;

use chrono::Local;
use clap::Args;
use schedua_core::{CategoryResolver, RuntimeEvaluator};

use super::open_db;

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long)]
    json: bool,
}

pub fn run(args: StatusArgs, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    let now = Local::now().naive_local();
    let categories = CategoryResolver::new();
    let evaluator = RuntimeEvaluator::new(&db, &categories);

    let current = evaluator.current_status(now)?;
    let next = evaluator.next_event(now)?;

    if args.json {
        let combined = serde_json::json!({ "now": now.to_string(), "current": current, "next": next });
        println!("{}", serde_json::to_string_pretty(&combined)?);
        return Ok(());
    }

    match current {
        Some(status) => {
            println!("current value: {}", status.value);
            println!("subject:       {}", status.title);
            println!("type:          {}", status.source.as_str());
            match status.busy_until {
                Some(until) => println!("busy until:    {until}"),
                None => println!("busy until:    cleared manually"),
            }
            if let Some(value) = &status.override_value {
                let until = status
                    .override_until
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "permanent".to_string());
                println!("override:      {value} (until {until})");
            }
        }
        None => println!("idle (no live occurrence, no override)"),
    }

    match next {
        Some(event) => {
            println!("next event:    {} at {}", event.title, event.start);
            println!("next value:    {}", event.value);
        }
        None => println!("next event:    none within horizon"),
    }
    Ok(())
}
