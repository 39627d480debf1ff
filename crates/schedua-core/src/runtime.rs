//! Runtime state queries: what is the effective output *right now*, and
//! what happens next.
//!
//! Both queries run over the same resolver output the calendar preview
//! uses, so the live view and the drawn view cannot diverge.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::category::CategoryResolver;
use crate::error::Result;
use crate::resolver::{OccurrenceSource, Resolver};
use crate::rrule::Rule;
use crate::schedule::DataType;
use crate::storage::Database;

/// How far back an occurrence may have started and still be live.
const LOOKBACK_DAYS: i64 = 7;

/// The effective output at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub value: String,
    pub title: String,
    pub source: OccurrenceSource,
    /// When the current state ends: occurrence end, capped by
    /// `override_until` while an override is active. `None` for a permanent
    /// override with no live occurrence.
    pub busy_until: Option<NaiveDateTime>,
    pub priority: i64,
    pub override_value: Option<String>,
    pub override_until: Option<NaiveDateTime>,
    /// Absent when only the runtime override is active.
    pub series_id: Option<i64>,
    pub occurrence_key: Option<String>,
    pub data_type: DataType,
    pub single_shot: bool,
}

/// The first upcoming occurrence inside the forward horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextEvent {
    pub start: NaiveDateTime,
    pub title: String,
    pub value: String,
}

/// Evaluates current/next state from resolver output plus the override row.
pub struct RuntimeEvaluator<'a> {
    db: &'a Database,
    categories: &'a CategoryResolver,
}

impl<'a> RuntimeEvaluator<'a> {
    pub fn new(db: &'a Database, categories: &'a CategoryResolver) -> Self {
        Self { db, categories }
    }

    /// The occurrence covering `now` (the latest-started one; ties broken by
    /// higher priority, then lower series id), or the active runtime
    /// override when no occurrence is live, or `None` when idle.
    pub fn current_status(&self, now: NaiveDateTime) -> Result<Option<CurrentStatus>> {
        let resolver = Resolver::new(self.db, self.categories);
        let window_start = now - Duration::days(LOOKBACK_DAYS);
        let occurrences = resolver.resolve(window_start, now + Duration::minutes(1), now)?;

        let live = occurrences
            .iter()
            .filter(|o| o.contains(now))
            .max_by(|a, b| {
                a.start
                    .cmp(&b.start)
                    .then(a.priority.cmp(&b.priority))
                    .then(b.series_id.cmp(&a.series_id))
            });

        let active_override = self.db.runtime_override(now)?;

        match (live, active_override) {
            (Some(occurrence), Some(forced)) => Ok(Some(CurrentStatus {
                value: forced.override_value.clone(),
                title: occurrence.title.clone(),
                source: OccurrenceSource::Override,
                busy_until: Some(match forced.override_until {
                    Some(until) => until.min(occurrence.end),
                    None => occurrence.end,
                }),
                priority: occurrence.priority,
                override_value: Some(forced.override_value),
                override_until: forced.override_until,
                series_id: Some(occurrence.series_id),
                occurrence_key: Some(occurrence.occurrence_key.clone()),
                data_type: occurrence.data_type,
                single_shot: occurrence.single_shot,
            })),
            (Some(occurrence), None) => Ok(Some(CurrentStatus {
                value: occurrence.target_value.clone(),
                title: occurrence.title.clone(),
                source: occurrence.source,
                busy_until: Some(occurrence.end),
                priority: occurrence.priority,
                override_value: None,
                override_until: None,
                series_id: Some(occurrence.series_id),
                occurrence_key: Some(occurrence.occurrence_key.clone()),
                data_type: occurrence.data_type,
                single_shot: occurrence.single_shot,
            })),
            (None, Some(forced)) => Ok(Some(CurrentStatus {
                value: forced.override_value.clone(),
                title: "Manual override".to_string(),
                source: OccurrenceSource::Override,
                busy_until: forced.override_until,
                priority: 0,
                override_value: Some(forced.override_value),
                override_until: forced.override_until,
                series_id: None,
                occurrence_key: None,
                data_type: DataType::Auto,
                single_shot: false,
            })),
            (None, None) => Ok(None),
        }
    }

    /// The first occurrence starting strictly after `now` inside the
    /// forward horizon.
    pub fn next_event(&self, now: NaiveDateTime) -> Result<Option<NextEvent>> {
        let resolver = Resolver::new(self.db, self.categories);
        let occurrences = resolver.resolve(now, now + self.horizon()?, now)?;
        Ok(occurrences
            .into_iter()
            .find(|o| o.start > now)
            .map(|o| NextEvent {
                start: o.start,
                title: o.title,
                value: o.target_value,
            }))
    }

    /// At least 7 days, stretched to the longest natural period among the
    /// enabled rules so sparse series stay visible.
    fn horizon(&self) -> Result<Duration> {
        let mut days = 7i64;
        for series in self.db.list_enabled_series()? {
            if let Ok(rule) = Rule::parse(&series.rrule_str) {
                days = days.max(rule.natural_period_days());
            }
        }
        Ok(Duration::days(days + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Series, SinkSecurity};
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn insert_series(db: &Database, rrule_str: &str, value: &str) -> i64 {
        db.create_series(&Series {
            id: 0,
            task_name: "Line output".to_string(),
            endpoint: "opc.tcp://localhost:4840".to_string(),
            node_id: "ns=2;i=1001".to_string(),
            target_value: value.to_string(),
            data_type: DataType::Auto,
            rrule_str: rrule_str.to_string(),
            category_id: 1,
            priority: 1,
            enabled: true,
            security: SinkSecurity::default(),
            last_execution_status: None,
        })
        .unwrap()
    }

    #[test]
    fn idle_when_nothing_is_live() {
        let db = Database::open_memory().unwrap();
        let categories = CategoryResolver::new();
        let evaluator = RuntimeEvaluator::new(&db, &categories);
        assert!(evaluator
            .current_status(dt(2026, 2, 16, 3, 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn live_occurrence_without_override() {
        let db = Database::open_memory().unwrap();
        insert_series(
            &db,
            "FREQ=DAILY;BYDAY=MO,TU,WE,TH,FR,SA,SU;BYHOUR=10;BYMINUTE=0;DTSTART:20260216T100000;DURATION=PT1H",
            "auto",
        );
        let categories = CategoryResolver::new();
        let evaluator = RuntimeEvaluator::new(&db, &categories);

        let status = evaluator
            .current_status(dt(2026, 2, 16, 10, 15))
            .unwrap()
            .unwrap();
        assert_eq!(status.value, "auto");
        assert_eq!(status.source, OccurrenceSource::Weekly);
        assert_eq!(status.busy_until, Some(dt(2026, 2, 16, 11, 0)));
        assert_eq!(status.series_id, Some(1));
    }

    #[test]
    fn override_without_live_occurrence() {
        let db = Database::open_memory().unwrap();
        db.set_runtime_override("75", None).unwrap();
        let categories = CategoryResolver::new();
        let evaluator = RuntimeEvaluator::new(&db, &categories);

        let status = evaluator
            .current_status(dt(2026, 2, 16, 3, 0))
            .unwrap()
            .unwrap();
        assert_eq!(status.value, "75");
        assert_eq!(status.source, OccurrenceSource::Override);
        assert_eq!(status.busy_until, None);
        assert!(status.series_id.is_none());
    }

    #[test]
    fn next_event_reports_first_upcoming_start() {
        let db = Database::open_memory().unwrap();
        insert_series(
            &db,
            "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR;BYHOUR=9;BYMINUTE=0;DTSTART:20260216T090000;DURATION=PT1H",
            "1",
        );
        let categories = CategoryResolver::new();
        let evaluator = RuntimeEvaluator::new(&db, &categories);

        let next = evaluator
            .next_event(dt(2026, 2, 20, 10, 0))
            .unwrap()
            .unwrap();
        // Friday after 09:00 -> Monday 09:00.
        assert_eq!(next.start, dt(2026, 2, 23, 9, 0));
        assert_eq!(next.value, "1");
    }
}
