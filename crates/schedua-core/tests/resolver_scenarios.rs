//! End-to-end resolver scenarios over an in-memory repository.

use chrono::{NaiveDate, NaiveDateTime};
use schedua_core::{
    CategoryResolver, Database, DataType, Exception, ExceptionAction, HolidayEntry,
    OccurrenceSource, Resolver, Rule, Series, SinkSecurity,
};

fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const WEEKDAYS_9: &str =
    "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR;BYHOUR=9;BYMINUTE=0;DTSTART:20260216T090000;DURATION=PT1H";

fn insert_series(db: &Database, rrule_str: &str, value: &str, category_id: i64) -> i64 {
    db.create_series(&Series {
        id: 0,
        task_name: "Weekday morning".to_string(),
        endpoint: "opc.tcp://localhost:4840".to_string(),
        node_id: "ns=2;i=1001".to_string(),
        target_value: value.to_string(),
        data_type: DataType::Auto,
        rrule_str: rrule_str.to_string(),
        category_id,
        priority: 1,
        enabled: true,
        security: SinkSecurity::default(),
        last_execution_status: None,
    })
    .unwrap()
}

fn cancel_exception(series_id: i64, day: NaiveDate) -> Exception {
    Exception {
        id: 0,
        schedule_id: series_id,
        occurrence_date: day,
        action: ExceptionAction::Cancel,
        override_start: None,
        override_end: None,
        override_task_name: None,
        override_target_value: None,
        override_category_id: None,
        note: None,
    }
}

fn full_day_holiday(calendar_id: i64, day: NaiveDate) -> HolidayEntry {
    HolidayEntry {
        id: 0,
        calendar_id,
        date: day,
        name: "Holiday".to_string(),
        is_full_day: true,
        start_time: None,
        end_time: None,
        override_category_id: None,
        override_target_value: None,
    }
}

/// Scenario 1: the plain weekday series produces five morning occurrences.
#[test]
fn weekday_morning_series() {
    let db = Database::open_memory().unwrap();
    insert_series(&db, WEEKDAYS_9, "auto", 1);
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();

    assert_eq!(out.len(), 5);
    for (i, occurrence) in out.iter().enumerate() {
        assert_eq!(occurrence.start, dt(2026, 2, 16 + i as u32, 9, 0));
        assert_eq!(occurrence.end, dt(2026, 2, 16 + i as u32, 10, 0));
        assert_eq!(occurrence.source, OccurrenceSource::Weekly);
        assert_eq!(occurrence.bg_color, "#FF0000"); // category 1 (Red)
    }
}

/// Scenario 2: a cancel exception removes exactly the Wednesday occurrence.
#[test]
fn single_day_cancel() {
    let db = Database::open_memory().unwrap();
    let series_id = insert_series(&db, WEEKDAYS_9, "auto", 1);
    db.upsert_exception(&cancel_exception(series_id, date(2026, 2, 18)))
        .unwrap();
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();

    assert_eq!(out.len(), 4);
    assert!(out.iter().all(|o| o.start.date() != date(2026, 2, 18)));
}

/// Cancellation is idempotent: re-resolving with the same exception in
/// place changes nothing.
#[test]
fn cancel_is_idempotent() {
    let db = Database::open_memory().unwrap();
    let series_id = insert_series(&db, WEEKDAYS_9, "auto", 1);
    db.upsert_exception(&cancel_exception(series_id, date(2026, 2, 18)))
        .unwrap();
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let first = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();
    let second = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();
    assert_eq!(first, second);
}

/// Scenario 3: a value override keeps the slot but rewrites value and
/// colours.
#[test]
fn value_override_on_exception() {
    let db = Database::open_memory().unwrap();
    let series_id = insert_series(&db, WEEKDAYS_9, "auto", 1);
    db.upsert_exception(&Exception {
        action: ExceptionAction::Override,
        override_target_value: Some("0".to_string()),
        override_category_id: Some(3),
        ..cancel_exception(series_id, date(2026, 2, 17))
    })
    .unwrap();
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();

    let tuesday = out
        .iter()
        .find(|o| o.start.date() == date(2026, 2, 17))
        .unwrap();
    assert_eq!(tuesday.start, dt(2026, 2, 17, 9, 0));
    assert_eq!(tuesday.end, dt(2026, 2, 17, 10, 0));
    assert_eq!(tuesday.target_value, "0");
    assert_eq!(tuesday.source, OccurrenceSource::Exception);
    assert!(tuesday.is_exception);
    // Category 3 is Light Purple.
    assert_eq!(tuesday.category_id, 3);
    assert_eq!(tuesday.bg_color, "#DDA0DD");
    assert_eq!(tuesday.fg_color, "#000000");

    // The other four days are untouched.
    assert_eq!(
        out.iter().filter(|o| o.target_value == "auto").count(),
        4
    );
}

/// Scenario 4: a full-day holiday rewrites value and category.
#[test]
fn holiday_full_day_rewrite() {
    let db = Database::open_memory().unwrap();
    insert_series(&db, WEEKDAYS_9, "auto", 1);
    let calendar_id = db.create_calendar("Plant", None, true).unwrap();
    db.upsert_holiday_entry(&HolidayEntry {
        override_category_id: Some(3),
        override_target_value: Some("manual".to_string()),
        ..full_day_holiday(calendar_id, date(2026, 2, 19))
    })
    .unwrap();
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();

    let thursday = out
        .iter()
        .find(|o| o.start.date() == date(2026, 2, 19))
        .unwrap();
    assert_eq!(thursday.target_value, "manual");
    assert_eq!(thursday.source, OccurrenceSource::Holiday);
    assert!(thursday.is_holiday);
    assert_eq!(thursday.category_id, 3);
    assert_eq!(thursday.bg_color, "#DDA0DD");
}

/// Precedence: where both an exception override and a holiday override
/// apply, the exception's fields win where present, the holiday's fill the
/// rest.
#[test]
fn exception_beats_holiday_where_present() {
    let db = Database::open_memory().unwrap();
    let series_id = insert_series(&db, WEEKDAYS_9, "auto", 1);
    let calendar_id = db.create_calendar("Plant", None, true).unwrap();
    db.upsert_holiday_entry(&HolidayEntry {
        override_category_id: Some(3),
        override_target_value: Some("manual".to_string()),
        ..full_day_holiday(calendar_id, date(2026, 2, 19))
    })
    .unwrap();
    // The exception rewrites only the value; category must fall through to
    // the holiday's.
    db.upsert_exception(&Exception {
        action: ExceptionAction::Override,
        override_target_value: Some("0".to_string()),
        ..cancel_exception(series_id, date(2026, 2, 19))
    })
    .unwrap();
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();
    let thursday = out
        .iter()
        .find(|o| o.start.date() == date(2026, 2, 19))
        .unwrap();
    assert_eq!(thursday.target_value, "0"); // exception value
    assert_eq!(thursday.category_id, 3); // holiday category
    assert!(thursday.is_exception && thursday.is_holiday);
    assert_eq!(thursday.source, OccurrenceSource::Exception);
}

/// With no exceptions, holidays or override, resolver output equals the
/// bare rule expansion.
#[test]
fn no_layers_equals_base_expansion() {
    let db = Database::open_memory().unwrap();
    let series_id = insert_series(&db, WEEKDAYS_9, "auto", 1);
    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);

    let from = dt(2026, 2, 16, 0, 0);
    let to = dt(2026, 3, 2, 0, 0);
    let resolved = resolver.resolve(from, to, from).unwrap();
    let expanded = Rule::parse(WEEKDAYS_9).unwrap().expand(from, to);

    assert_eq!(resolved.len(), expanded.len());
    for (occurrence, base) in resolved.iter().zip(&expanded) {
        assert_eq!(occurrence.start, base.start);
        assert_eq!(occurrence.end, base.end);
        assert_eq!(occurrence.series_id, series_id);
        assert_eq!(occurrence.source, OccurrenceSource::Weekly);
        assert!(!occurrence.is_exception && !occurrence.is_holiday && !occurrence.is_override);
    }
}

/// Quantified invariants over a fixture with every layer active: every
/// interval is non-empty and occurrence keys are unique in order.
#[test]
fn output_invariants_hold_with_all_layers() {
    let db = Database::open_memory().unwrap();
    let first = insert_series(&db, WEEKDAYS_9, "auto", 1);
    let second = insert_series(
        &db,
        "FREQ=DAILY;BYDAY=MO,TU,WE,TH,FR,SA,SU;BYHOUR=22;BYMINUTE=0;DTSTART:20260216T220000;DURATION=PT4H",
        "1",
        4,
    );
    let calendar_id = db.create_calendar("Plant", None, true).unwrap();
    db.upsert_holiday_entry(&HolidayEntry {
        override_target_value: Some("manual".to_string()),
        ..full_day_holiday(calendar_id, date(2026, 2, 19))
    })
    .unwrap();
    db.upsert_exception(&cancel_exception(first, date(2026, 2, 18)))
        .unwrap();
    db.upsert_exception(&Exception {
        action: ExceptionAction::Override,
        override_target_value: Some("0".to_string()),
        ..cancel_exception(second, date(2026, 2, 20))
    })
    .unwrap();
    db.set_runtime_override("50", Some(dt(2026, 2, 17, 9, 30)))
        .unwrap();

    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);
    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 17, 9, 15))
        .unwrap();

    assert!(!out.is_empty());
    for occurrence in &out {
        assert!(occurrence.end > occurrence.start, "empty interval");
    }
    let mut keys: Vec<_> = out.iter().map(|o| o.occurrence_key.clone()).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total, "duplicate occurrence keys");
    assert!(out.windows(2).all(|w| w[0].start <= w[1].start), "unsorted");

    // The runtime override marked exactly the occurrence covering `now`.
    let marked: Vec<_> = out.iter().filter(|o| o.is_override).collect();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].series_id, first);
    assert_eq!(marked[0].target_value, "50");
}

/// Disabled series contribute nothing, even with exceptions present.
#[test]
fn disabled_series_is_invisible() {
    let db = Database::open_memory().unwrap();
    let series_id = insert_series(&db, WEEKDAYS_9, "auto", 1);
    db.upsert_exception(&cancel_exception(series_id, date(2026, 2, 18)))
        .unwrap();
    db.set_series_enabled(series_id, false).unwrap();

    let categories = CategoryResolver::new();
    let resolver = Resolver::new(&db, &categories);
    let out = resolver
        .resolve(dt(2026, 2, 16, 0, 0), dt(2026, 2, 23, 0, 0), dt(2026, 2, 16, 0, 0))
        .unwrap();
    assert!(out.is_empty());
}
