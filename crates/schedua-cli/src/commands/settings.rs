use std::error::Error;
use std::path::PathBuf;

use clap::Subcommand;

use super::{open_db, parse_datetime};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show the current settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Update settings; only the given flags change
    Set {
        #[arg(long)]
        profile_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Enable or disable the whole scheduler ("true"/"false")
        #[arg(long)]
        enable_schedule: Option<bool>,
        /// Seconds between scheduler ticks
        #[arg(long)]
        scan_rate: Option<u32>,
        /// Seconds between UI polls
        #[arg(long)]
        refresh_rate: Option<u32>,
        /// Gate sink calls to [active-from, active-to]
        #[arg(long)]
        active_from: Option<String>,
        #[arg(long)]
        active_to: Option<String>,
        /// Drop the active-period gate
        #[arg(long)]
        no_active_period: bool,
        #[arg(long)]
        output_type: Option<String>,
        #[arg(long)]
        refresh_output: Option<bool>,
        #[arg(long)]
        generate_events: Option<bool>,
    },
}

pub fn run(action: SettingsAction, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    match action {
        SettingsAction::Show { json } => {
            let settings = db.settings()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("profile:         {}", settings.profile_name);
                println!("enable_schedule: {}", settings.enable_schedule);
                println!("scan_rate:       {}s", settings.scan_rate);
                println!("refresh_rate:    {}s", settings.refresh_rate);
                match (settings.use_active_period, settings.active_from, settings.active_to) {
                    (true, Some(from), Some(to)) => println!("active period:   {from} .. {to}"),
                    _ => println!("active period:   off"),
                }
                println!("output_type:     {}", settings.output_type);
            }
        }
        SettingsAction::Set {
            profile_name,
            description,
            enable_schedule,
            scan_rate,
            refresh_rate,
            active_from,
            active_to,
            no_active_period,
            output_type,
            refresh_output,
            generate_events,
        } => {
            let mut settings = db.settings()?;
            if let Some(v) = profile_name {
                settings.profile_name = v;
            }
            if let Some(v) = description {
                settings.description = Some(v);
            }
            if let Some(v) = enable_schedule {
                settings.enable_schedule = v;
            }
            if let Some(v) = scan_rate {
                settings.scan_rate = v;
            }
            if let Some(v) = refresh_rate {
                settings.refresh_rate = v;
            }
            if let Some(v) = active_from.as_deref() {
                settings.active_from = Some(parse_datetime(v)?);
                settings.use_active_period = true;
            }
            if let Some(v) = active_to.as_deref() {
                settings.active_to = Some(parse_datetime(v)?);
                settings.use_active_period = true;
            }
            if no_active_period {
                settings.use_active_period = false;
            }
            if let Some(v) = output_type {
                settings.output_type = v;
            }
            if let Some(v) = refresh_output {
                settings.refresh_output = v;
            }
            if let Some(v) = generate_events {
                settings.generate_events = v;
            }
            db.update_settings(&settings)?;
            println!("settings updated");
        }
    }
    Ok(())
}
