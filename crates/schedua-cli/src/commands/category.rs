use std::error::Error;
use std::path::PathBuf;

use clap::Subcommand;

use super::open_db;

#[derive(Subcommand)]
pub enum CategoryAction {
    /// List categories
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add a category
    Add {
        name: String,
        /// Background colour, #RRGGBB
        bg: String,
        /// Foreground colour, #RRGGBB
        fg: String,
        #[arg(long)]
        sort_order: Option<i64>,
    },
    /// Edit a category (system categories accept colour changes only)
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bg: Option<String>,
        #[arg(long)]
        fg: Option<String>,
    },
    /// Delete a category (refused while referenced or for system rows)
    Remove { id: i64 },
}

pub fn run(action: CategoryAction, db_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let db = open_db(db_path)?;
    match action {
        CategoryAction::List { json } => {
            let categories = db.list_categories()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else {
                for c in categories {
                    let marker = if c.is_system { " (system)" } else { "" };
                    println!(
                        "{:>4}  {:<16} bg={} fg={}{}",
                        c.id, c.name, c.bg_color, c.fg_color, marker
                    );
                }
            }
        }
        CategoryAction::Add {
            name,
            bg,
            fg,
            sort_order,
        } => {
            let id = db.create_category(&name, &bg, &fg, sort_order)?;
            println!("category {id} created");
        }
        CategoryAction::Edit { id, name, bg, fg } => {
            db.update_category(id, name.as_deref(), bg.as_deref(), fg.as_deref())?;
            println!("category {id} updated");
        }
        CategoryAction::Remove { id } => {
            db.delete_category(id)?;
            println!("category {id} deleted");
        }
    }
    Ok(())
}
