//! The occurrence resolution pipeline.
//!
//! For a half-open window `[from, to)` the resolver merges four layers into
//! one deterministic timeline:
//!
//! 1. base rule expansion per enabled series,
//! 2. holiday-day rewrites from the default holiday calendar,
//! 3. per-date exceptions (cancel / override),
//! 4. the process-wide runtime override for occurrences covering `now`.
//!
//! Value precedence is runtime override > exception > holiday > series;
//! colour precedence is exception > holiday > series. A `cancel` exception
//! is absolute for its date and is applied before the runtime override
//! layer, so an override never resurrects a cancelled occurrence.
//!
//! A series whose rule fails to parse is logged and skipped; one bad rule
//! never fails the window.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::category::CategoryResolver;
use crate::error::Result;
use crate::rrule::Rule;
use crate::schedule::{DataType, Exception, ExceptionAction, HolidayEntry};
use crate::storage::{Database, Snapshot};

/// Which layer last rewrote an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceSource {
    Weekly,
    Holiday,
    Exception,
    Override,
}

impl OccurrenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Holiday => "holiday",
            Self::Exception => "exception",
            Self::Override => "override",
        }
    }
}

/// One materialised occurrence after all override layers.
///
/// Ephemeral and immutable: produced, consumed, discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOccurrence {
    pub series_id: i64,
    pub source: OccurrenceSource,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub category_id: i64,
    pub bg_color: String,
    pub fg_color: String,
    pub target_value: String,
    pub data_type: DataType,
    pub priority: i64,
    pub is_exception: bool,
    pub is_holiday: bool,
    pub is_override: bool,
    /// Stable identity: `"{series_id}:{start_isoformat}"`. Survives window
    /// clipping.
    pub occurrence_key: String,
    /// Zero nominal duration: fire once, no retries.
    pub single_shot: bool,
}

impl ResolvedOccurrence {
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant < self.end
    }

    /// The fragment of this occurrence inside `[from, to)`, preserving the
    /// original `occurrence_key`. `None` when the occurrence lies outside.
    pub fn clip(&self, from: NaiveDateTime, to: NaiveDateTime) -> Option<Self> {
        let start = self.start.max(from);
        let end = self.end.min(to);
        if end <= start {
            return None;
        }
        Some(Self {
            start,
            end,
            ..self.clone()
        })
    }
}

/// Window queries over the repository, with colour lookups through the
/// category cache. The UI preview and the scheduler read the same output,
/// so the two views cannot diverge.
pub struct Resolver<'a> {
    db: &'a Database,
    categories: &'a CategoryResolver,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a Database, categories: &'a CategoryResolver) -> Self {
        Self { db, categories }
    }

    /// All occurrences intersecting `[from, to)`, unclipped, in
    /// `(start asc, priority desc, series_id asc)` order.
    pub fn resolve(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Vec<ResolvedOccurrence>> {
        let snapshot = self.db.snapshot(from, to, now)?;
        Ok(resolve_snapshot(&snapshot, from, to, &|id, title| {
            self.categories.colors_or_fallback(self.db, id, title)
        }))
    }

    /// Like [`Resolver::resolve`], but cross-window occurrences are clipped
    /// to the window (single-day calendar rendering).
    pub fn resolve_clipped(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Vec<ResolvedOccurrence>> {
        Ok(self
            .resolve(from, to, now)?
            .iter()
            .filter_map(|occ| occ.clip(from, to))
            .collect())
    }
}

/// Pure merge over an already-taken snapshot.
pub fn resolve_snapshot(
    snapshot: &Snapshot,
    from: NaiveDateTime,
    to: NaiveDateTime,
    colors: &dyn Fn(i64, &str) -> (String, String),
) -> Vec<ResolvedOccurrence> {
    let now = snapshot.taken_at;

    let mut exception_map: HashMap<(i64, NaiveDate), &Exception> = HashMap::new();
    for exception in &snapshot.exceptions {
        exception_map.insert((exception.schedule_id, exception.occurrence_date), exception);
    }

    let mut holiday_map: HashMap<NaiveDate, Vec<&HolidayEntry>> = HashMap::new();
    for entry in &snapshot.holidays {
        holiday_map.entry(entry.date).or_default().push(entry);
    }

    let active_override = snapshot
        .runtime_override
        .as_ref()
        .filter(|o| o.is_active(now));

    let mut out = Vec::new();
    for series in &snapshot.series {
        let rule = match Rule::parse(&series.rrule_str) {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(
                    series_id = series.id,
                    rule = %series.rrule_str,
                    "skipping series with invalid rule: {e}"
                );
                continue;
            }
        };

        // Expand from slightly before the window so occurrences crossing
        // midnight into it are not lost.
        let lead = Duration::minutes(i64::from(rule.duration_minutes.max(1)));
        for occurrence in rule.expand(from - lead, to) {
            if occurrence.end <= from {
                continue;
            }

            let occurrence_date = occurrence.start.date();
            let exception = exception_map.get(&(series.id, occurrence_date)).copied();
            if exception.is_some_and(|e| e.action == ExceptionAction::Cancel) {
                continue;
            }

            let mut source = OccurrenceSource::Weekly;
            let mut is_exception = false;
            let mut is_holiday = false;
            let mut is_override = false;
            let mut title = series.task_name.clone();
            let mut target_value = series.target_value.clone();
            let mut start = occurrence.start;
            let mut end = occurrence.end;
            let mut holiday_category = None;
            let mut exception_category = None;

            let holiday = holiday_map
                .get(&occurrence_date)
                .and_then(|entries| pick_holiday_entry(entries, occurrence.start, occurrence.end));
            if let Some(entry) = holiday {
                is_holiday = true;
                source = OccurrenceSource::Holiday;
                if let Some(value) = non_empty(entry.override_target_value.as_deref()) {
                    target_value = value.to_string();
                }
                holiday_category = entry.override_category_id;
            }

            if let Some(exception) = exception {
                is_exception = true;
                source = OccurrenceSource::Exception;
                if let Some(s) = exception.override_start {
                    start = s;
                }
                if let Some(e) = exception.override_end {
                    end = e;
                }
                if let Some(name) = non_empty(exception.override_task_name.as_deref()) {
                    title = name.to_string();
                }
                if let Some(value) = non_empty(exception.override_target_value.as_deref()) {
                    target_value = value.to_string();
                }
                exception_category = exception.override_category_id;
            }

            if end <= start {
                continue;
            }
            // An exception may have shifted the occurrence out of the window.
            if end <= from || start >= to {
                continue;
            }

            if let Some(forced) = active_override {
                if start <= now && now < end {
                    target_value = forced.override_value.clone();
                    source = OccurrenceSource::Override;
                    is_override = true;
                }
            }

            let category_id = exception_category
                .or(holiday_category)
                .unwrap_or(series.category_id);
            let (bg_color, fg_color) = colors(category_id, &title);

            out.push(ResolvedOccurrence {
                series_id: series.id,
                source,
                title,
                start,
                end,
                category_id,
                bg_color,
                fg_color,
                target_value,
                data_type: series.data_type,
                priority: series.priority,
                is_exception,
                is_holiday,
                is_override,
                occurrence_key: occurrence_key(series.id, start),
                single_shot: rule.is_single_shot(),
            });
        }
    }

    out.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.priority.cmp(&a.priority))
            .then(a.series_id.cmp(&b.series_id))
    });
    // A date-keyed exception applied to a sub-daily series can collapse
    // several same-day occurrences onto one start; keep a single fragment.
    out.dedup_by(|a, b| a.occurrence_key == b.occurrence_key);
    out
}

fn occurrence_key(series_id: i64, start: NaiveDateTime) -> String {
    format!("{}:{}", series_id, start.format("%Y-%m-%dT%H:%M:%S"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Choose the holiday entry governing an occurrence: entries carrying an
/// override win over plain markers; among equals the first overlapping
/// entry is used.
fn pick_holiday_entry<'e>(
    entries: &[&'e HolidayEntry],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Option<&'e HolidayEntry> {
    let matched: Vec<&HolidayEntry> = entries
        .iter()
        .copied()
        .filter(|entry| holiday_entry_overlaps(entry, start, end))
        .collect();
    matched
        .iter()
        .copied()
        .find(|entry| entry.has_override())
        .or_else(|| matched.first().copied())
}

fn holiday_entry_overlaps(entry: &HolidayEntry, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    if entry.is_full_day {
        return true;
    }
    let (Some(window_start), Some(window_end)) = (entry.start_time, entry.end_time) else {
        return false;
    };
    if window_end <= window_start {
        return false;
    }
    let holiday_start = start.date().and_time(window_start);
    let holiday_end = start.date().and_time(window_end);
    !(end <= holiday_start || start >= holiday_end)
}
