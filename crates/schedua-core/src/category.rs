//! Category colour resolution.
//!
//! Maps a category id to its `(bg_color, fg_color)` pair through a
//! process-local, read-mostly cache. Any category write must be followed by
//! [`CategoryResolver::invalidate`] (a full flush). A lookup miss falls
//! back to a deterministic colour derived from a hash of the occurrence
//! title, so rendering never fails on a dangling reference.

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::Database;

/// The eight system categories seeded on first initialisation
/// (`(name, bg, fg)`, ids 1..=8 in order).
pub const SYSTEM_CATEGORIES: [(&str, &str, &str); 8] = [
    ("Red", "#FF0000", "#FFFFFF"),
    ("Pink", "#FF69B4", "#FFFFFF"),
    ("Light Purple", "#DDA0DD", "#000000"),
    ("Green", "#00FF00", "#000000"),
    ("Blue", "#0000FF", "#FFFFFF"),
    ("Yellow", "#FFFF00", "#000000"),
    ("Orange", "#FFA500", "#000000"),
    ("Gray", "#808080", "#FFFFFF"),
];

/// Insert the system categories when the table is empty. Idempotent.
pub(crate) fn seed_system_categories(conn: &Connection) -> rusqlite::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }
    for (order, (name, bg, fg)) in SYSTEM_CATEGORIES.iter().enumerate() {
        conn.execute(
            "INSERT INTO categories (name, bg_color, fg_color, sort_order, is_system)
             VALUES (?1, ?2, ?3, ?4, 1)",
            rusqlite::params![name, bg, fg, order as i64 + 1],
        )?;
    }
    tracing::info!("seeded {} system categories", SYSTEM_CATEGORIES.len());
    Ok(())
}

/// Cached id -> colour pair lookups.
pub struct CategoryResolver {
    cache: Mutex<HashMap<i64, (String, String)>>,
}

impl CategoryResolver {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The colour pair for a category id, or `None` when the id is absent.
    ///
    /// # Errors
    /// Propagates repository read failures; cache hits never fail.
    pub fn resolve(&self, db: &Database, id: i64) -> Result<Option<(String, String)>> {
        if let Some(colors) = self.cache.lock().expect("category cache poisoned").get(&id) {
            return Ok(Some(colors.clone()));
        }
        match db.category(id)? {
            Some(category) => {
                let colors = (category.bg_color, category.fg_color);
                self.cache
                    .lock()
                    .expect("category cache poisoned")
                    .insert(id, colors.clone());
                Ok(Some(colors))
            }
            None => Ok(None),
        }
    }

    /// The colour pair for an occurrence, falling back to a colour hashed
    /// from the title when the category is missing or unreadable.
    pub fn colors_or_fallback(&self, db: &Database, id: i64, title: &str) -> (String, String) {
        match self.resolve(db, id) {
            Ok(Some(colors)) => colors,
            Ok(None) => fallback_colors(title),
            Err(e) => {
                tracing::warn!("category {id} lookup failed: {e}");
                fallback_colors(title)
            }
        }
    }

    /// Full cache flush. Call after any category write.
    pub fn invalidate(&self) {
        self.cache.lock().expect("category cache poisoned").clear();
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic colour pair for a title: FNV-1a picks the background, the
/// foreground is black or white by relative luminance.
pub fn fallback_colors(title: &str) -> (String, String) {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in title.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let rgb = (hash & 0xFFFFFF) as u32;
    let (r, g, b) = ((rgb >> 16) & 0xFF, (rgb >> 8) & 0xFF, rgb & 0xFF);
    let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    let fg = if luminance > 140.0 { "#000000" } else { "#FFFFFF" };
    (format!("#{rgb:06X}"), fg.to_string())
}
