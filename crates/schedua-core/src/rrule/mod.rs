//! Recurrence rule parsing and expansion.
//!
//! A rule is a single line of `;`-separated `KEY=VALUE` tokens in the
//! iCalendar style, with two local conventions: a `DTSTART:<timestamp>`
//! token without `=`, and a non-standard `DURATION=PT<H>H<M>M` token that
//! gives each occurrence its width. `DURATION=PT0M` marks a single-shot
//! occurrence (fail-fast, no retry); any positive duration marks it
//! retry-until-end.
//!
//! The engine is pure state: parse once, then ask for starts inside a
//! half-open window. No clocks are read after parse time, so expansion is
//! deterministic and testable.
//!
//! ```ignore
//! let rule = Rule::parse("FREQ=WEEKLY;BYDAY=MO,WE;BYHOUR=9;BYMINUTE=0;DTSTART:20260216T090000")?;
//! let occurrences = rule.expand(from, to);
//! ```

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::error::RuleError;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Hard cap on period iterations per expansion, against degenerate rules
/// whose filters never match (e.g. `BYMONTH=2;BYMONTHDAY=30`).
const MAX_PERIODS: usize = 200_000;

/// Repeat frequency of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    fn parse(s: &str) -> Result<Self, RuleError> {
        match s {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            _ => Err(RuleError::InvalidValue {
                key: "FREQ",
                value: s.to_string(),
            }),
        }
    }

    /// Length of one natural period in days, rounded up.
    fn period_days(&self) -> i64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Monthly => 31,
            Self::Yearly => 366,
        }
    }
}

/// A concrete start/end pair produced by expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// A parsed recurrence rule.
///
/// Defaults are resolved at parse time, so two rules compare equal exactly
/// when they expand identically, and serialisation round-trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub freq: Frequency,
    pub interval: u32,
    /// Weekday set. Always resolved for daily/weekly (default Mon–Fri);
    /// `None` for monthly/yearly selects the day-of-month path.
    pub by_day: Option<Vec<Weekday>>,
    pub by_month_day: Option<u32>,
    pub by_month: Option<u32>,
    /// Positional selector over the per-period candidate set
    /// (1 = first, -1 = last).
    pub by_set_pos: Option<i32>,
    pub by_hour: u32,
    pub by_minute: u32,
    /// Cap on total occurrences, counted from `dtstart`.
    pub count: Option<u32>,
    /// Inclusive upper bound.
    pub until: Option<NaiveDateTime>,
    pub dtstart: NaiveDateTime,
    pub duration_minutes: u32,
}

impl Rule {
    /// Parse a rule string, resolving defaults against the current wall
    /// clock.
    ///
    /// # Errors
    /// Returns [`RuleError`] on malformed tokens or out-of-range values.
    /// Unknown keys are silently ignored.
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        Self::parse_at(s, Local::now().naive_local())
    }

    /// Parse with an explicit reference instant for default resolution
    /// (`BYHOUR` defaults to the next full hour, `DTSTART` to the reference
    /// date at the default time).
    pub fn parse_at(s: &str, reference: NaiveDateTime) -> Result<Self, RuleError> {
        let s = s.trim();
        let s = s.strip_prefix("RRULE:").unwrap_or(s);

        let mut freq = None;
        let mut interval = 1u32;
        let mut by_day: Option<Vec<Weekday>> = None;
        let mut by_month_day = None;
        let mut by_month = None;
        let mut by_set_pos = None;
        let mut by_hour = None;
        let mut by_minute = None;
        let mut count = None;
        let mut until = None;
        let mut dtstart = None;
        let mut duration_minutes = None;

        for token in s.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            // DTSTART is the one token written with ':' instead of '='.
            if let Some(rest) = token.strip_prefix("DTSTART:") {
                dtstart = Some(parse_timestamp(rest)?);
                continue;
            }
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| RuleError::MalformedToken(token.to_string()))?;
            match key {
                "FREQ" => freq = Some(Frequency::parse(value)?),
                "INTERVAL" => {
                    interval = parse_int_in(value, "INTERVAL", 1, u32::MAX as i64)? as u32
                }
                "BYDAY" => {
                    let days = value
                        .split(',')
                        .map(parse_weekday)
                        .collect::<Result<Vec<_>, _>>()?;
                    by_day = Some(days);
                }
                "BYMONTHDAY" => {
                    by_month_day = Some(parse_int_in(value, "BYMONTHDAY", 1, 31)? as u32)
                }
                "BYMONTH" => by_month = Some(parse_int_in(value, "BYMONTH", 1, 12)? as u32),
                "BYSETPOS" => {
                    let pos = parse_int_in(value, "BYSETPOS", i32::MIN as i64, i32::MAX as i64)?;
                    if pos == 0 {
                        return Err(RuleError::InvalidValue {
                            key: "BYSETPOS",
                            value: value.to_string(),
                        });
                    }
                    by_set_pos = Some(pos as i32);
                }
                "BYHOUR" => by_hour = Some(parse_int_in(value, "BYHOUR", 0, 23)? as u32),
                "BYMINUTE" => by_minute = Some(parse_int_in(value, "BYMINUTE", 0, 59)? as u32),
                "COUNT" => count = Some(parse_int_in(value, "COUNT", 1, u32::MAX as i64)? as u32),
                "UNTIL" => until = Some(parse_timestamp(value)?),
                "DTSTART" => dtstart = Some(parse_timestamp(value)?),
                "DURATION" => duration_minutes = Some(parse_duration(value)?),
                _ => {} // unknown keys are ignored
            }
        }

        let freq = freq.unwrap_or(Frequency::Daily);
        let by_hour = by_hour.unwrap_or((reference.time().hour() + 1) % 24);
        let by_minute = by_minute.unwrap_or(0);

        let by_day = match freq {
            Frequency::Daily | Frequency::Weekly => Some(by_day.unwrap_or_else(|| {
                vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                ]
            })),
            Frequency::Monthly | Frequency::Yearly => by_day,
        };
        let by_month_day = match freq {
            Frequency::Monthly | Frequency::Yearly if by_day.is_none() => {
                Some(by_month_day.unwrap_or(1))
            }
            _ => by_month_day,
        };

        let default_time = NaiveTime::from_hms_opt(by_hour, by_minute, 0)
            .expect("validated hour/minute in range");
        let dtstart = dtstart.unwrap_or_else(|| reference.date().and_time(default_time));

        Ok(Self {
            freq,
            interval,
            by_day,
            by_month_day,
            by_month,
            by_set_pos,
            by_hour,
            by_minute,
            count,
            until,
            dtstart,
            duration_minutes: duration_minutes.unwrap_or(0),
        })
    }

    /// Serialise back to the rule string form. `parse(serialise(r)) == r`.
    pub fn serialise(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.freq.as_str())];
        if self.interval > 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if let Some(m) = self.by_month {
            parts.push(format!("BYMONTH={m}"));
        }
        if let Some(d) = self.by_month_day {
            parts.push(format!("BYMONTHDAY={d}"));
        }
        if let Some(days) = &self.by_day {
            let tokens: Vec<&str> = days.iter().map(|d| weekday_token(*d)).collect();
            parts.push(format!("BYDAY={}", tokens.join(",")));
        }
        if let Some(p) = self.by_set_pos {
            parts.push(format!("BYSETPOS={p}"));
        }
        parts.push(format!("BYHOUR={}", self.by_hour));
        parts.push(format!("BYMINUTE={}", self.by_minute));
        if let Some(c) = self.count {
            parts.push(format!("COUNT={c}"));
        }
        if let Some(u) = self.until {
            parts.push(format!("UNTIL={}", u.format(TIMESTAMP_FORMAT)));
        }
        parts.push(format!("DTSTART:{}", self.dtstart.format(TIMESTAMP_FORMAT)));
        parts.push(format!("DURATION={}", format_duration(self.duration_minutes)));
        parts.join(";")
    }

    /// Zero nominal duration: fire once per occurrence, no retries.
    pub fn is_single_shot(&self) -> bool {
        self.duration_minutes == 0
    }

    /// One natural period of this rule in days, including the interval
    /// stride. Used to size the forward horizon of next-event queries.
    pub fn natural_period_days(&self) -> i64 {
        self.freq.period_days() * self.interval.max(1) as i64
    }

    /// All occurrences with `start` inside `[from, to)`, strictly increasing.
    ///
    /// `end = start + duration`; a zero duration is lifted to one minute for
    /// drawing and scheduling purposes (the single-shot flag is carried by
    /// the rule, not the width).
    pub fn expand(&self, from: NaiveDateTime, to: NaiveDateTime) -> Vec<Occurrence> {
        let mut out = Vec::new();
        if to <= from {
            return out;
        }
        let width = Duration::minutes(self.duration_minutes.max(1) as i64);
        self.enumerate_starts(to, &mut |start| {
            if start >= from {
                out.push(Occurrence {
                    start,
                    end: start + width,
                });
            }
            true
        });
        out
    }

    /// The first start strictly after `after`, or `None` when the rule is
    /// exhausted (`COUNT`/`UNTIL` reached).
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let horizon = after + Duration::days(self.natural_period_days().max(7) * 2 + 7);
        let mut found = None;
        self.enumerate_starts(horizon, &mut |start| {
            if start > after {
                found = Some(start);
                false
            } else {
                true
            }
        });
        found
    }

    fn time_of_day(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.by_hour, self.by_minute, 0)
            .expect("validated hour/minute in range")
    }

    /// Walk occurrence starts in ascending order from `dtstart`, stopping at
    /// `stop_before`, `UNTIL`, an exhausted `COUNT`, or when `emit` returns
    /// false.
    fn enumerate_starts(
        &self,
        stop_before: NaiveDateTime,
        emit: &mut dyn FnMut(NaiveDateTime) -> bool,
    ) {
        let time = self.time_of_day();
        // Earliest instant past which no period can still contribute.
        let hard_stop = match self.until {
            Some(u) => stop_before.min(u + Duration::minutes(1)),
            None => stop_before,
        };
        let mut remaining = self.count;
        let stride = self.interval.max(1) as i64;

        let mut cursor = PeriodCursor::new(self.freq, self.dtstart.date());
        for _ in 0..MAX_PERIODS {
            let floor = cursor.floor();
            if floor.and_time(time) >= hard_stop {
                return;
            }

            let mut dates = self.period_candidates(&cursor);
            if let Some(pos) = self.by_set_pos {
                dates = select_set_pos(dates, pos);
            }

            for d in dates {
                let start = d.and_time(time);
                if start < self.dtstart {
                    continue;
                }
                if let Some(u) = self.until {
                    if start > u {
                        return;
                    }
                }
                if remaining == Some(0) {
                    return;
                }
                if start >= stop_before {
                    return;
                }
                if let Some(c) = remaining.as_mut() {
                    *c -= 1;
                }
                if !emit(start) {
                    return;
                }
            }

            cursor.advance(stride);
        }
    }

    /// Candidate dates of one period, ascending, with all filters applied
    /// but before `BYSETPOS` selection.
    fn period_candidates(&self, cursor: &PeriodCursor) -> Vec<NaiveDate> {
        match cursor {
            PeriodCursor::Day(d) => {
                if self.date_passes_filters(*d) {
                    vec![*d]
                } else {
                    Vec::new()
                }
            }
            PeriodCursor::Week(monday) => (0..7)
                .map(|i| *monday + Duration::days(i))
                .filter(|d| self.date_passes_filters(*d))
                .collect(),
            PeriodCursor::Month { year, month } => self.month_candidates(*year, *month),
            PeriodCursor::Year(year) => {
                let months: Vec<u32> = match self.by_month {
                    Some(m) => vec![m],
                    None => (1..=12).collect(),
                };
                months
                    .into_iter()
                    .flat_map(|m| self.month_candidates(*year, m))
                    .collect()
            }
        }
    }

    /// Dates of one month matching the rule's day selectors.
    fn month_candidates(&self, year: i32, month: u32) -> Vec<NaiveDate> {
        if let Some(m) = self.by_month {
            if m != month {
                return Vec::new();
            }
        }
        match &self.by_day {
            Some(days) => (1..=days_in_month(year, month))
                .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
                .filter(|d| days.contains(&d.weekday()))
                .filter(|d| self.by_month_day.map_or(true, |md| d.day() == md))
                .collect(),
            None => {
                let day = self.by_month_day.unwrap_or(1);
                NaiveDate::from_ymd_opt(year, month, day)
                    .into_iter()
                    .collect()
            }
        }
    }

    /// Filters shared by the daily and weekly paths.
    fn date_passes_filters(&self, d: NaiveDate) -> bool {
        if let Some(days) = &self.by_day {
            if !days.contains(&d.weekday()) {
                return false;
            }
        }
        if let Some(m) = self.by_month {
            if d.month() != m {
                return false;
            }
        }
        if let Some(md) = self.by_month_day {
            if d.day() != md {
                return false;
            }
        }
        true
    }
}

/// Iterator state over rule periods (day, week, month or year).
enum PeriodCursor {
    Day(NaiveDate),
    Week(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
}

impl PeriodCursor {
    fn new(freq: Frequency, dtstart_date: NaiveDate) -> Self {
        match freq {
            Frequency::Daily => Self::Day(dtstart_date),
            Frequency::Weekly => Self::Week(monday_of(dtstart_date)),
            Frequency::Monthly => Self::Month {
                year: dtstart_date.year(),
                month: dtstart_date.month(),
            },
            Frequency::Yearly => Self::Year(dtstart_date.year()),
        }
    }

    /// Earliest date the current period can contain.
    fn floor(&self) -> NaiveDate {
        match self {
            Self::Day(d) => *d,
            Self::Week(monday) => *monday,
            Self::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1)
                .expect("month cursor stays in range"),
            Self::Year(year) => {
                NaiveDate::from_ymd_opt(*year, 1, 1).expect("year cursor stays in range")
            }
        }
    }

    fn advance(&mut self, stride: i64) {
        match self {
            Self::Day(d) => *d += Duration::days(stride),
            Self::Week(monday) => *monday += Duration::days(7 * stride),
            Self::Month { year, month } => {
                let total = *year as i64 * 12 + (*month as i64 - 1) + stride;
                *year = total.div_euclid(12) as i32;
                *month = (total.rem_euclid(12) + 1) as u32;
            }
            Self::Year(year) => *year += stride as i32,
        }
    }
}

fn select_set_pos(dates: Vec<NaiveDate>, pos: i32) -> Vec<NaiveDate> {
    let len = dates.len() as i64;
    let idx = if pos > 0 {
        pos as i64 - 1
    } else {
        len + pos as i64
    };
    if (0..len).contains(&idx) {
        vec![dates[idx as usize]]
    } else {
        Vec::new()
    }
}

fn monday_of(d: NaiveDate) -> NaiveDate {
    d - Duration::days(d.weekday().num_days_from_monday() as i64)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let first_next = NaiveDate::from_ymd_opt(ny, nm, 1).expect("valid month");
    (first_next - first).num_days() as u32
}

fn parse_int_in(value: &str, key: &'static str, min: i64, max: i64) -> Result<i64, RuleError> {
    let n: i64 = value.parse().map_err(|_| RuleError::InvalidValue {
        key,
        value: value.to_string(),
    })?;
    if n < min || n > max {
        return Err(RuleError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(n)
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, RuleError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|_| RuleError::InvalidTimestamp(s.to_string()))
}

fn parse_weekday(token: &str) -> Result<Weekday, RuleError> {
    match token.trim() {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(RuleError::InvalidValue {
            key: "BYDAY",
            value: other.to_string(),
        }),
    }
}

fn weekday_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Parse `PT[<n>H][<n>M]` into total minutes. At least one component is
/// required; `PT0M` is the explicit instantaneous marker.
fn parse_duration(value: &str) -> Result<u32, RuleError> {
    let upper = value.trim().to_ascii_uppercase();
    let body = upper
        .strip_prefix("PT")
        .ok_or_else(|| RuleError::InvalidDuration(value.to_string()))?;
    if body.is_empty() {
        return Err(RuleError::InvalidDuration(value.to_string()));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut saw_component = false;
    for c in body.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == 'H' || c == 'M' {
            if digits.is_empty() {
                return Err(RuleError::InvalidDuration(value.to_string()));
            }
            let n: u64 = digits
                .parse()
                .map_err(|_| RuleError::InvalidDuration(value.to_string()))?;
            total += if c == 'H' { n * 60 } else { n };
            digits.clear();
            saw_component = true;
        } else {
            return Err(RuleError::InvalidDuration(value.to_string()));
        }
    }
    if !saw_component || !digits.is_empty() || total > u32::MAX as u64 {
        return Err(RuleError::InvalidDuration(value.to_string()));
    }
    Ok(total as u32)
}

fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("PT{m}M"),
        (h, 0) => format!("PT{h}H"),
        (h, m) => format!("PT{h}H{m}M"),
    }
}
