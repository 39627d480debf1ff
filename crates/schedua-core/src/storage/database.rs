//! SQLite-backed repository for series, exceptions, holidays, categories
//! and the two single-row tables (general settings, runtime override).
//!
//! The repository owns every persisted record. Writes are transactional at
//! the single-row level; readers get consistent snapshots because all reads
//! of one call go through the same connection. The resolver takes its input
//! through [`Database::snapshot`], a single bulk read, so later merge
//! layers never observe a half-applied write.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, Row};

use crate::category;
use crate::error::{CoreError, DatabaseError, Result, ValidationError};
use crate::rrule::Rule;
use crate::schedule::{
    Category, DataType, Exception, ExceptionAction, GeneralSettings, HolidayCalendar,
    HolidayEntry, RuntimeOverride, Series, SinkSecurity,
};

use super::migrations;

const DB_FILE_NAME: &str = "schedua.db";

const DT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Consistent bulk read used by the resolver: everything one resolution
/// window needs, taken through a single connection at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: NaiveDateTime,
    /// Enabled series only; disabled series contribute nothing.
    pub series: Vec<Series>,
    pub exceptions: Vec<Exception>,
    /// Entries of the default holiday calendar inside the window.
    pub holidays: Vec<HolidayEntry>,
    pub runtime_override: Option<RuntimeOverride>,
}

/// SQLite repository.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.schedua/schedua.db`, running migrations and
    /// seeding the system categories on first use.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(super::data_dir().join(DB_FILE_NAME))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| {
            CoreError::Database(DatabaseError::OpenFailed {
                path: path.clone(),
                source,
            })
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Database(DatabaseError::from(e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations::migrate(&conn)
            .map_err(|e| CoreError::Database(DatabaseError::MigrationFailed(e.to_string())))?;
        category::seed_system_categories(&conn)?;
        Ok(Self { conn })
    }

    // === Series ===

    /// Insert a new series and return its id. `series.id` is ignored.
    pub fn create_series(&self, series: &Series) -> Result<i64> {
        self.validate_series(series)?;
        self.conn.execute(
            "INSERT INTO schedules (task_name, endpoint, node_id, target_value, data_type,
                                    rrule_str, category_id, priority, is_enabled,
                                    security_policy, security_mode, username, password,
                                    timeout_secs, write_timeout_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                series.task_name,
                series.endpoint,
                series.node_id,
                series.target_value,
                series.data_type.as_str(),
                series.rrule_str,
                series.category_id,
                series.priority,
                series.enabled,
                series.security.security_policy,
                series.security.security_mode,
                series.security.username,
                series.security.password,
                series.security.timeout_secs,
                series.security.write_timeout_secs,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update an existing series in place.
    pub fn update_series(&self, series: &Series) -> Result<()> {
        self.validate_series(series)?;
        let affected = self.conn.execute(
            "UPDATE schedules SET task_name = ?1, endpoint = ?2, node_id = ?3,
                    target_value = ?4, data_type = ?5, rrule_str = ?6, category_id = ?7,
                    priority = ?8, is_enabled = ?9, security_policy = ?10,
                    security_mode = ?11, username = ?12, password = ?13,
                    timeout_secs = ?14, write_timeout_secs = ?15,
                    updated_at = CURRENT_TIMESTAMP
             WHERE id = ?16",
            params![
                series.task_name,
                series.endpoint,
                series.node_id,
                series.target_value,
                series.data_type.as_str(),
                series.rrule_str,
                series.category_id,
                series.priority,
                series.enabled,
                series.security.security_policy,
                series.security.security_mode,
                series.security.username,
                series.security.password,
                series.security.timeout_secs,
                series.security.write_timeout_secs,
                series.id,
            ],
        )?;
        if affected == 0 {
            return Err(CoreError::NotFound {
                entity: "series",
                id: series.id,
            });
        }
        Ok(())
    }

    pub fn delete_series(&self, id: i64) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(CoreError::NotFound {
                entity: "series",
                id,
            });
        }
        Ok(())
    }

    pub fn series(&self, id: i64) -> Result<Option<Series>> {
        let result = self.conn.query_row(
            &format!("{SELECT_SERIES} WHERE id = ?1"),
            params![id],
            series_from_row,
        );
        optional(result)
    }

    pub fn list_series(&self) -> Result<Vec<Series>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_SERIES} ORDER BY id"))?;
        let rows = stmt.query_map([], series_from_row)?;
        collect(rows)
    }

    pub fn list_enabled_series(&self) -> Result<Vec<Series>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_SERIES} WHERE is_enabled = 1 ORDER BY id"))?;
        let rows = stmt.query_map([], series_from_row)?;
        collect(rows)
    }

    pub fn set_series_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE schedules SET is_enabled = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![enabled, id],
        )?;
        if affected == 0 {
            return Err(CoreError::NotFound {
                entity: "series",
                id,
            });
        }
        Ok(())
    }

    /// Record the outcome of the most recent sink write for a series.
    pub fn set_last_execution(&self, id: i64, status: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE schedules SET last_execution_status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        Ok(())
    }

    /// The parsed rule of a stored series.
    ///
    /// # Errors
    /// `NotFound` when the series is absent, `InvalidRule` when its stored
    /// rule no longer parses.
    pub fn series_rule(&self, id: i64) -> Result<Rule> {
        let series = self.series(id)?.ok_or(CoreError::NotFound {
            entity: "series",
            id,
        })?;
        Rule::parse(&series.rrule_str).map_err(|e| CoreError::InvalidRule {
            series_id: id,
            reason: e.to_string(),
        })
    }

    fn validate_series(&self, series: &Series) -> Result<()> {
        if series.task_name.trim().is_empty() {
            return Err(ValidationError::MissingField("task_name").into());
        }
        Rule::parse(&series.rrule_str).map_err(|e| ValidationError::InvalidValue {
            field: "rrule_str",
            message: e.to_string(),
        })?;
        if self.category(series.category_id)?.is_none() {
            return Err(CoreError::NotFound {
                entity: "category",
                id: series.category_id,
            });
        }
        Ok(())
    }

    // === Exceptions ===

    /// Insert or replace the exception for `(schedule_id, occurrence_date)`
    /// and return its id. At most one exception exists per pair.
    pub fn upsert_exception(&self, exception: &Exception) -> Result<i64> {
        self.validate_exception(exception)?;
        let id = self.conn.query_row(
            "INSERT INTO schedule_exceptions
                (schedule_id, occurrence_date, action, override_start, override_end,
                 override_task_name, override_target_value, override_category_id, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (schedule_id, occurrence_date) DO UPDATE SET
                 action = excluded.action,
                 override_start = excluded.override_start,
                 override_end = excluded.override_end,
                 override_task_name = excluded.override_task_name,
                 override_target_value = excluded.override_target_value,
                 override_category_id = excluded.override_category_id,
                 note = excluded.note
             RETURNING id",
            params![
                exception.schedule_id,
                fmt_date(exception.occurrence_date),
                exception.action.as_str(),
                exception.override_start.map(fmt_dt),
                exception.override_end.map(fmt_dt),
                exception.override_task_name,
                exception.override_target_value,
                exception.override_category_id,
                exception.note,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn delete_exception(&self, id: i64) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM schedule_exceptions WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(CoreError::NotFound {
                entity: "exception",
                id,
            });
        }
        Ok(())
    }

    pub fn list_exceptions_for_series(&self, schedule_id: i64) -> Result<Vec<Exception>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_EXCEPTION} WHERE schedule_id = ?1 ORDER BY occurrence_date"
        ))?;
        let rows = stmt.query_map(params![schedule_id], exception_from_row)?;
        collect(rows)
    }

    pub fn list_exceptions_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Exception>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_EXCEPTION} WHERE occurrence_date BETWEEN ?1 AND ?2
             ORDER BY occurrence_date, schedule_id"
        ))?;
        let rows = stmt.query_map(params![fmt_date(from), fmt_date(to)], exception_from_row)?;
        collect(rows)
    }

    fn validate_exception(&self, exception: &Exception) -> Result<()> {
        if self.series(exception.schedule_id)?.is_none() {
            return Err(CoreError::NotFound {
                entity: "series",
                id: exception.schedule_id,
            });
        }
        if exception.action == ExceptionAction::Override && !exception.has_override_payload() {
            return Err(ValidationError::InvalidValue {
                field: "action",
                message: "override requires at least one override field".to_string(),
            }
            .into());
        }
        if let (Some(start), Some(end)) = (exception.override_start, exception.override_end) {
            if end <= start {
                return Err(ValidationError::InvalidTimeRange { start, end }.into());
            }
        }
        for (field, value) in [
            ("override_start", exception.override_start),
            ("override_end", exception.override_end),
        ] {
            if let Some(dt) = value {
                if dt.date() != exception.occurrence_date {
                    return Err(ValidationError::InvalidValue {
                        field,
                        message: format!(
                            "must fall on the occurrence date {}",
                            exception.occurrence_date
                        ),
                    }
                    .into());
                }
            }
        }
        if let Some(category_id) = exception.override_category_id {
            if self.category(category_id)?.is_none() {
                return Err(CoreError::NotFound {
                    entity: "category",
                    id: category_id,
                });
            }
        }
        Ok(())
    }

    // === Holiday calendars and entries ===

    pub fn create_calendar(
        &self,
        name: &str,
        description: Option<&str>,
        is_default: bool,
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        self.conn.execute(
            "INSERT INTO holiday_calendars (name, description, is_default) VALUES (?1, ?2, 0)",
            params![name, description],
        )?;
        let id = self.conn.last_insert_rowid();
        if is_default {
            self.set_default_calendar(id)?;
        }
        Ok(id)
    }

    /// Make `id` the single default calendar.
    pub fn set_default_calendar(&self, id: i64) -> Result<()> {
        if self.calendar(id)?.is_none() {
            return Err(CoreError::NotFound {
                entity: "holiday calendar",
                id,
            });
        }
        self.conn.execute(
            "UPDATE holiday_calendars SET is_default = (id = ?1)",
            params![id],
        )?;
        Ok(())
    }

    pub fn calendar(&self, id: i64) -> Result<Option<HolidayCalendar>> {
        let result = self.conn.query_row(
            "SELECT id, name, description, is_default FROM holiday_calendars WHERE id = ?1",
            params![id],
            calendar_from_row,
        );
        optional(result)
    }

    pub fn list_calendars(&self) -> Result<Vec<HolidayCalendar>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, is_default FROM holiday_calendars ORDER BY id",
        )?;
        let rows = stmt.query_map([], calendar_from_row)?;
        collect(rows)
    }

    pub fn delete_calendar(&self, id: i64) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM holiday_calendars WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(CoreError::NotFound {
                entity: "holiday calendar",
                id,
            });
        }
        Ok(())
    }

    /// Insert or update a holiday entry; `entry.id == 0` inserts.
    pub fn upsert_holiday_entry(&self, entry: &HolidayEntry) -> Result<i64> {
        self.validate_holiday_entry(entry)?;
        if entry.id == 0 {
            self.conn.execute(
                "INSERT INTO holiday_entries
                    (calendar_id, holiday_date, name, is_full_day, start_time, end_time,
                     override_category_id, override_target_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.calendar_id,
                    fmt_date(entry.date),
                    entry.name,
                    entry.is_full_day,
                    entry.start_time.map(fmt_time),
                    entry.end_time.map(fmt_time),
                    entry.override_category_id,
                    entry.override_target_value,
                ],
            )?;
            Ok(self.conn.last_insert_rowid())
        } else {
            let affected = self.conn.execute(
                "UPDATE holiday_entries SET calendar_id = ?1, holiday_date = ?2, name = ?3,
                        is_full_day = ?4, start_time = ?5, end_time = ?6,
                        override_category_id = ?7, override_target_value = ?8
                 WHERE id = ?9",
                params![
                    entry.calendar_id,
                    fmt_date(entry.date),
                    entry.name,
                    entry.is_full_day,
                    entry.start_time.map(fmt_time),
                    entry.end_time.map(fmt_time),
                    entry.override_category_id,
                    entry.override_target_value,
                    entry.id,
                ],
            )?;
            if affected == 0 {
                return Err(CoreError::NotFound {
                    entity: "holiday entry",
                    id: entry.id,
                });
            }
            Ok(entry.id)
        }
    }

    pub fn delete_holiday_entry(&self, id: i64) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM holiday_entries WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(CoreError::NotFound {
                entity: "holiday entry",
                id,
            });
        }
        Ok(())
    }

    pub fn list_entries_for_calendar(&self, calendar_id: i64) -> Result<Vec<HolidayEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_HOLIDAY_ENTRY} WHERE calendar_id = ?1 ORDER BY holiday_date"
        ))?;
        let rows = stmt.query_map(params![calendar_id], holiday_entry_from_row)?;
        collect(rows)
    }

    /// Entries of the default calendar with dates in `[from, to]`.
    pub fn default_holiday_entries_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HolidayEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_HOLIDAY_ENTRY}
             JOIN holiday_calendars hc ON hc.id = holiday_entries.calendar_id
             WHERE hc.is_default = 1 AND holiday_date BETWEEN ?1 AND ?2
             ORDER BY holiday_date, holiday_entries.id"
        ))?;
        let rows = stmt.query_map(params![fmt_date(from), fmt_date(to)], holiday_entry_from_row)?;
        collect(rows)
    }

    fn validate_holiday_entry(&self, entry: &HolidayEntry) -> Result<()> {
        if self.calendar(entry.calendar_id)?.is_none() {
            return Err(CoreError::NotFound {
                entity: "holiday calendar",
                id: entry.calendar_id,
            });
        }
        if entry.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        if !entry.is_full_day {
            match (entry.start_time, entry.end_time) {
                (Some(start), Some(end)) if end > start => {}
                (Some(_), Some(_)) => {
                    return Err(ValidationError::InvalidValue {
                        field: "end_time",
                        message: "must be after start_time".to_string(),
                    }
                    .into())
                }
                _ => return Err(ValidationError::MissingField("start_time/end_time").into()),
            }
        }
        if let Some(category_id) = entry.override_category_id {
            if self.category(category_id)?.is_none() {
                return Err(CoreError::NotFound {
                    entity: "category",
                    id: category_id,
                });
            }
        }
        Ok(())
    }

    // === Categories ===

    pub fn category(&self, id: i64) -> Result<Option<Category>> {
        let result = self.conn.query_row(
            &format!("{SELECT_CATEGORY} WHERE id = ?1"),
            params![id],
            category_from_row,
        );
        optional(result)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_CATEGORY} ORDER BY sort_order, id"))?;
        let rows = stmt.query_map([], category_from_row)?;
        collect(rows)
    }

    /// Append a category; without an explicit `sort_order` it lands after
    /// the current maximum.
    pub fn create_category(
        &self,
        name: &str,
        bg_color: &str,
        fg_color: &str,
        sort_order: Option<i64>,
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        validate_color("bg_color", bg_color)?;
        validate_color("fg_color", fg_color)?;
        let sort_order = match sort_order {
            Some(v) => v,
            None => {
                let max: i64 = self.conn.query_row(
                    "SELECT COALESCE(MAX(sort_order), 0) FROM categories",
                    [],
                    |row| row.get(0),
                )?;
                max + 1
            }
        };
        self.conn.execute(
            "INSERT INTO categories (name, bg_color, fg_color, sort_order, is_system)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![name, bg_color, fg_color, sort_order],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update a category. System categories accept colour changes only.
    pub fn update_category(
        &self,
        id: i64,
        name: Option<&str>,
        bg_color: Option<&str>,
        fg_color: Option<&str>,
    ) -> Result<()> {
        let current = self.category(id)?.ok_or(CoreError::NotFound {
            entity: "category",
            id,
        })?;
        if let Some(new_name) = name {
            if current.is_system && new_name != current.name {
                return Err(CoreError::SystemImmutable {
                    entity: format!("category '{}'", current.name),
                });
            }
        }
        if let Some(bg) = bg_color {
            validate_color("bg_color", bg)?;
        }
        if let Some(fg) = fg_color {
            validate_color("fg_color", fg)?;
        }
        self.conn.execute(
            "UPDATE categories SET name = ?1, bg_color = ?2, fg_color = ?3 WHERE id = ?4",
            params![
                name.unwrap_or(&current.name),
                bg_color.unwrap_or(&current.bg_color),
                fg_color.unwrap_or(&current.fg_color),
                id,
            ],
        )?;
        Ok(())
    }

    /// Delete a category. Refused for system categories and for categories
    /// still referenced by a series, exception or holiday entry.
    pub fn delete_category(&self, id: i64) -> Result<()> {
        let current = self.category(id)?.ok_or(CoreError::NotFound {
            entity: "category",
            id,
        })?;
        if current.is_system {
            return Err(CoreError::SystemImmutable {
                entity: format!("category '{}'", current.name),
            });
        }
        let refs = self.category_refs(id)?;
        if refs > 0 {
            return Err(CoreError::InUse {
                entity: "category",
                id,
                refs,
            });
        }
        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn category_refs(&self, id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM schedules WHERE category_id = ?1)
                  + (SELECT COUNT(*) FROM schedule_exceptions WHERE override_category_id = ?1)
                  + (SELECT COUNT(*) FROM holiday_entries WHERE override_category_id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // === General settings ===

    /// Read the single settings row, inserting defaults on first access.
    pub fn settings(&self) -> Result<GeneralSettings> {
        let result = self.conn.query_row(
            "SELECT profile_name, description, enable_schedule, scan_rate, refresh_rate,
                    use_active_period, active_from, active_to, output_type,
                    refresh_output, generate_events
             FROM general_settings WHERE id = 1",
            [],
            settings_from_row,
        );
        match optional(result)? {
            Some(settings) => Ok(settings),
            None => {
                let defaults = GeneralSettings::default();
                self.update_settings(&defaults)?;
                Ok(defaults)
            }
        }
    }

    pub fn update_settings(&self, settings: &GeneralSettings) -> Result<()> {
        if settings.use_active_period {
            match (settings.active_from, settings.active_to) {
                (Some(from), Some(to)) if to > from => {}
                (Some(start), Some(end)) => {
                    return Err(ValidationError::InvalidTimeRange { start, end }.into())
                }
                _ => return Err(ValidationError::MissingField("active_from/active_to").into()),
            }
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO general_settings
                (id, profile_name, description, enable_schedule, scan_rate, refresh_rate,
                 use_active_period, active_from, active_to, output_type,
                 refresh_output, generate_events)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                settings.profile_name,
                settings.description,
                settings.enable_schedule,
                settings.scan_rate,
                settings.refresh_rate,
                settings.use_active_period,
                settings.active_from.map(|dt| fmt_dt(dt)),
                settings.active_to.map(|dt| fmt_dt(dt)),
                settings.output_type,
                settings.refresh_output,
                settings.generate_events,
            ],
        )?;
        Ok(())
    }

    // === Runtime override ===

    /// Replace the runtime override row. `until = None` means permanent
    /// until cleared.
    pub fn set_runtime_override(&self, value: &str, until: Option<NaiveDateTime>) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField("override_value").into());
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO runtime_override (id, override_value, override_until)
             VALUES (1, ?1, ?2)",
            params![value.trim(), until.map(fmt_dt)],
        )?;
        Ok(())
    }

    /// The active runtime override, if any. An expired row is treated as
    /// absent and cleared opportunistically.
    pub fn runtime_override(&self, now: NaiveDateTime) -> Result<Option<RuntimeOverride>> {
        let result = self.conn.query_row(
            "SELECT override_value, override_until FROM runtime_override WHERE id = 1",
            [],
            |row| {
                Ok(RuntimeOverride {
                    override_value: row.get(0)?,
                    override_until: parse_opt_dt(row.get::<_, Option<String>>(1)?)?,
                })
            },
        );
        match optional(result)? {
            Some(current) if current.is_active(now) => Ok(Some(current)),
            Some(_) => {
                tracing::debug!("runtime override expired, clearing");
                self.clear_runtime_override()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn clear_runtime_override(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM runtime_override WHERE id = 1", [])?;
        Ok(())
    }

    // === Resolver snapshot ===

    /// Bulk read for one resolution window. The exception and holiday
    /// ranges are widened by a day on the left so occurrences crossing
    /// midnight into the window keep their layers.
    pub fn snapshot(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Snapshot> {
        let date_from = (from - Duration::days(1)).date();
        let date_to = to.date();
        Ok(Snapshot {
            taken_at: now,
            series: self.list_enabled_series()?,
            exceptions: self.list_exceptions_in_range(date_from, date_to)?,
            holidays: self.default_holiday_entries_in_range(date_from, date_to)?,
            runtime_override: self.runtime_override(now)?,
        })
    }
}

// === SQL fragments and row mapping ===

const SELECT_SERIES: &str = "SELECT id, task_name, endpoint, node_id, target_value, data_type,
        rrule_str, category_id, priority, is_enabled, security_policy, security_mode,
        username, password, timeout_secs, write_timeout_secs, last_execution_status
 FROM schedules";

const SELECT_EXCEPTION: &str = "SELECT id, schedule_id, occurrence_date, action, override_start,
        override_end, override_task_name, override_target_value, override_category_id, note
 FROM schedule_exceptions";

const SELECT_HOLIDAY_ENTRY: &str = "SELECT holiday_entries.id, calendar_id, holiday_date,
        holiday_entries.name, is_full_day, start_time, end_time,
        override_category_id, override_target_value
 FROM holiday_entries";

const SELECT_CATEGORY: &str =
    "SELECT id, name, bg_color, fg_color, sort_order, is_system FROM categories";

fn series_from_row(row: &Row) -> rusqlite::Result<Series> {
    let data_type: String = row.get(5)?;
    Ok(Series {
        id: row.get(0)?,
        task_name: row.get(1)?,
        endpoint: row.get(2)?,
        node_id: row.get(3)?,
        target_value: row.get(4)?,
        data_type: DataType::parse(&data_type).unwrap_or_default(),
        rrule_str: row.get(6)?,
        category_id: row.get(7)?,
        priority: row.get(8)?,
        enabled: row.get(9)?,
        security: SinkSecurity {
            security_policy: row.get(10)?,
            security_mode: row.get(11)?,
            username: row.get(12)?,
            password: row.get(13)?,
            timeout_secs: row.get(14)?,
            write_timeout_secs: row.get(15)?,
        },
        last_execution_status: row.get(16)?,
    })
}

fn exception_from_row(row: &Row) -> rusqlite::Result<Exception> {
    let action: String = row.get(3)?;
    Ok(Exception {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        occurrence_date: parse_date(&row.get::<_, String>(2)?)?,
        action: ExceptionAction::parse(&action)
            .ok_or_else(|| column_error(format!("unknown exception action '{action}'")))?,
        override_start: parse_opt_dt(row.get::<_, Option<String>>(4)?)?,
        override_end: parse_opt_dt(row.get::<_, Option<String>>(5)?)?,
        override_task_name: row.get(6)?,
        override_target_value: row.get(7)?,
        override_category_id: row.get(8)?,
        note: row.get(9)?,
    })
}

fn calendar_from_row(row: &Row) -> rusqlite::Result<HolidayCalendar> {
    Ok(HolidayCalendar {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        is_default: row.get(3)?,
    })
}

fn holiday_entry_from_row(row: &Row) -> rusqlite::Result<HolidayEntry> {
    Ok(HolidayEntry {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        date: parse_date(&row.get::<_, String>(2)?)?,
        name: row.get(3)?,
        is_full_day: row.get(4)?,
        start_time: parse_opt_time(row.get::<_, Option<String>>(5)?)?,
        end_time: parse_opt_time(row.get::<_, Option<String>>(6)?)?,
        override_category_id: row.get(7)?,
        override_target_value: row.get(8)?,
    })
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        bg_color: row.get(2)?,
        fg_color: row.get(3)?,
        sort_order: row.get(4)?,
        is_system: row.get(5)?,
    })
}

fn settings_from_row(row: &Row) -> rusqlite::Result<GeneralSettings> {
    Ok(GeneralSettings {
        profile_name: row.get(0)?,
        description: row.get(1)?,
        enable_schedule: row.get(2)?,
        scan_rate: row.get(3)?,
        refresh_rate: row.get(4)?,
        use_active_period: row.get(5)?,
        active_from: parse_opt_dt(row.get::<_, Option<String>>(6)?)?,
        active_to: parse_opt_dt(row.get::<_, Option<String>>(7)?)?,
        output_type: row.get(8)?,
        refresh_output: row.get(9)?,
        generate_events: row.get(10)?,
    })
}

fn validate_color(field: &'static str, value: &str) -> Result<()> {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field,
            message: format!("'{value}' is not a #RRGGBB colour"),
        }
        .into())
    }
}

fn fmt_dt(dt: NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn parse_dt(s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FORMAT)
        .map_err(|e| column_error(format!("bad timestamp '{s}': {e}")))
}

fn parse_opt_dt(s: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    s.as_deref().map(parse_dt).transpose()
}

fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| column_error(format!("bad date '{s}': {e}")))
}

fn parse_opt_time(s: Option<String>) -> rusqlite::Result<Option<NaiveTime>> {
    s.as_deref()
        .map(|s| {
            NaiveTime::parse_from_str(s, TIME_FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .map_err(|e| column_error(format!("bad time '{s}': {e}")))
        })
        .transpose()
}

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_series(category_id: i64) -> Series {
        Series {
            id: 0,
            task_name: "Morning start".to_string(),
            endpoint: "opc.tcp://localhost:4840".to_string(),
            node_id: "ns=2;i=1001".to_string(),
            target_value: "1".to_string(),
            data_type: DataType::Auto,
            rrule_str: "FREQ=DAILY;BYHOUR=8;BYMINUTE=0;DTSTART:20260201T080000".to_string(),
            category_id,
            priority: 1,
            enabled: true,
            security: SinkSecurity::default(),
            last_execution_status: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn system_categories_are_seeded_once() {
        let db = Database::open_memory().unwrap();
        let categories = db.list_categories().unwrap();
        assert_eq!(categories.len(), 8);
        assert_eq!(categories[0].name, "Red");
        assert_eq!(categories[0].bg_color, "#FF0000");
        assert!(categories.iter().all(|c| c.is_system));
    }

    #[test]
    fn series_crud_round_trip() {
        let db = Database::open_memory().unwrap();
        let id = db.create_series(&test_series(1)).unwrap();

        let stored = db.series(id).unwrap().unwrap();
        assert_eq!(stored.task_name, "Morning start");
        assert_eq!(stored.category_id, 1);
        assert_eq!(stored.priority, 1);

        let mut updated = stored.clone();
        updated.priority = 5;
        updated.enabled = false;
        db.update_series(&updated).unwrap();
        assert!(db.list_enabled_series().unwrap().is_empty());

        db.set_series_enabled(id, true).unwrap();
        assert_eq!(db.list_enabled_series().unwrap().len(), 1);

        db.delete_series(id).unwrap();
        assert!(db.series(id).unwrap().is_none());
    }

    #[test]
    fn series_validation_rejects_bad_rows() {
        let db = Database::open_memory().unwrap();

        let mut no_name = test_series(1);
        no_name.task_name = "  ".to_string();
        assert!(matches!(
            db.create_series(&no_name),
            Err(CoreError::Validation(_))
        ));

        let mut bad_rule = test_series(1);
        bad_rule.rrule_str = "FREQ=HOURLY".to_string();
        assert!(matches!(
            db.create_series(&bad_rule),
            Err(CoreError::Validation(_))
        ));

        let orphan_category = test_series(99);
        assert!(matches!(
            db.create_series(&orphan_category),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn exception_upsert_is_unique_per_series_and_date() {
        let db = Database::open_memory().unwrap();
        let series_id = db.create_series(&test_series(1)).unwrap();

        let exception = Exception {
            id: 0,
            schedule_id: series_id,
            occurrence_date: date(2026, 2, 18),
            action: ExceptionAction::Cancel,
            override_start: None,
            override_end: None,
            override_task_name: None,
            override_target_value: None,
            override_category_id: None,
            note: Some("maintenance".to_string()),
        };
        let first = db.upsert_exception(&exception).unwrap();

        let replacement = Exception {
            action: ExceptionAction::Override,
            override_target_value: Some("0".to_string()),
            ..exception
        };
        let second = db.upsert_exception(&replacement).unwrap();
        assert_eq!(first, second);

        let stored = db.list_exceptions_for_series(series_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].action, ExceptionAction::Override);
        assert_eq!(stored[0].override_target_value.as_deref(), Some("0"));
    }

    #[test]
    fn exception_validation() {
        let db = Database::open_memory().unwrap();
        let series_id = db.create_series(&test_series(1)).unwrap();

        // Override without payload.
        let empty_override = Exception {
            id: 0,
            schedule_id: series_id,
            occurrence_date: date(2026, 2, 18),
            action: ExceptionAction::Override,
            override_start: None,
            override_end: None,
            override_task_name: None,
            override_target_value: None,
            override_category_id: None,
            note: None,
        };
        assert!(db.upsert_exception(&empty_override).is_err());

        // End before start.
        let inverted = Exception {
            override_start: Some(dt(2026, 2, 18, 10, 0)),
            override_end: Some(dt(2026, 2, 18, 9, 0)),
            ..empty_override.clone()
        };
        assert!(db.upsert_exception(&inverted).is_err());

        // Times off the occurrence date.
        let wrong_date = Exception {
            override_start: Some(dt(2026, 2, 19, 9, 0)),
            override_end: Some(dt(2026, 2, 19, 10, 0)),
            ..empty_override
        };
        assert!(db.upsert_exception(&wrong_date).is_err());
    }

    #[test]
    fn system_category_invariants() {
        let db = Database::open_memory().unwrap();

        assert!(matches!(
            db.delete_category(1),
            Err(CoreError::SystemImmutable { .. })
        ));
        assert!(matches!(
            db.update_category(1, Some("Crimson"), None, None),
            Err(CoreError::SystemImmutable { .. })
        ));

        // Colour edits are allowed even on system categories.
        db.update_category(1, None, Some("#AA0000"), None).unwrap();
        assert_eq!(db.category(1).unwrap().unwrap().bg_color, "#AA0000");
    }

    #[test]
    fn category_in_use_cannot_be_deleted() {
        let db = Database::open_memory().unwrap();
        let custom = db
            .create_category("Night shift", "#123456", "#FFFFFF", None)
            .unwrap();

        let mut series = test_series(custom);
        series.category_id = custom;
        db.create_series(&series).unwrap();

        assert!(matches!(
            db.delete_category(custom),
            Err(CoreError::InUse { refs: 1, .. })
        ));

        let series_stored = db.list_series().unwrap();
        db.delete_series(series_stored[0].id).unwrap();
        db.delete_category(custom).unwrap();
    }

    #[test]
    fn category_sort_order_appends() {
        let db = Database::open_memory().unwrap();
        let id = db
            .create_category("Custom", "#101010", "#FFFFFF", None)
            .unwrap();
        let category = db.category(id).unwrap().unwrap();
        assert_eq!(category.sort_order, 9); // after the eight system rows
    }

    #[test]
    fn settings_default_then_round_trip() {
        let db = Database::open_memory().unwrap();
        let defaults = db.settings().unwrap();
        assert_eq!(defaults.scan_rate, 30);
        assert!(defaults.enable_schedule);

        let mut updated = defaults;
        updated.scan_rate = 10;
        updated.use_active_period = true;
        updated.active_from = Some(dt(2026, 1, 1, 0, 0));
        updated.active_to = Some(dt(2026, 12, 31, 23, 59));
        db.update_settings(&updated).unwrap();
        assert_eq!(db.settings().unwrap(), updated);

        // Gate enabled with inverted bounds is refused.
        let mut inverted = updated.clone();
        inverted.active_to = Some(dt(2025, 1, 1, 0, 0));
        assert!(db.update_settings(&inverted).is_err());
    }

    #[test]
    fn runtime_override_lazy_expiry() {
        let db = Database::open_memory().unwrap();
        let now = dt(2026, 2, 16, 10, 0);

        db.set_runtime_override("0", Some(dt(2026, 2, 16, 10, 30)))
            .unwrap();
        assert!(db.runtime_override(now).unwrap().is_some());

        // Past the deadline the row reads as absent and is cleared.
        let later = dt(2026, 2, 16, 10, 31);
        assert!(db.runtime_override(later).unwrap().is_none());
        assert!(db.runtime_override(now).unwrap().is_none());
    }

    #[test]
    fn default_calendar_is_exclusive() {
        let db = Database::open_memory().unwrap();
        let first = db.create_calendar("Plant", None, true).unwrap();
        let second = db.create_calendar("Office", None, true).unwrap();

        let calendars = db.list_calendars().unwrap();
        let defaults: Vec<_> = calendars.iter().filter(|c| c.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second);

        db.set_default_calendar(first).unwrap();
        assert!(db.calendar(first).unwrap().unwrap().is_default);
        assert!(!db.calendar(second).unwrap().unwrap().is_default);
    }

    #[test]
    fn snapshot_only_sees_default_calendar_entries() {
        let db = Database::open_memory().unwrap();
        db.create_series(&test_series(1)).unwrap();
        let default_cal = db.create_calendar("Plant", None, true).unwrap();
        let other_cal = db.create_calendar("Office", None, false).unwrap();

        for (calendar_id, name) in [(default_cal, "Founding day"), (other_cal, "Team day")] {
            db.upsert_holiday_entry(&HolidayEntry {
                id: 0,
                calendar_id,
                date: date(2026, 2, 19),
                name: name.to_string(),
                is_full_day: true,
                start_time: None,
                end_time: None,
                override_category_id: None,
                override_target_value: None,
            })
            .unwrap();
        }

        let snap = db
            .snapshot(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 8, 0))
            .unwrap();
        assert_eq!(snap.holidays.len(), 1);
        assert_eq!(snap.holidays[0].name, "Founding day");
        assert_eq!(snap.series.len(), 1);
    }

    #[test]
    fn holiday_entry_window_validation() {
        let db = Database::open_memory().unwrap();
        let cal = db.create_calendar("Plant", None, true).unwrap();

        let bad = HolidayEntry {
            id: 0,
            calendar_id: cal,
            date: date(2026, 2, 19),
            name: "Half day".to_string(),
            is_full_day: false,
            start_time: Some(NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
            end_time: Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            override_category_id: None,
            override_target_value: None,
        };
        assert!(db.upsert_holiday_entry(&bad).is_err());
    }
}
