//! # schedua core library
//!
//! Core business logic for schedua, a calendar-driven value scheduler for
//! industrial endpoints: repeating *series* (defined by iCalendar-style
//! recurrence rules) are expanded into concrete occurrences, merged with
//! holiday rewrites, per-date exceptions and a process-wide runtime
//! override, and the effective value is pushed to a [`ValueSink`] by a
//! tick-based scheduler loop. The CLI binary is a thin layer over this
//! library.
//!
//! ## Architecture
//!
//! - **Recurrence engine** ([`rrule`]): rule string -> concrete
//!   occurrence intervals inside a window
//! - **Storage** ([`storage`]): SQLite repository with versioned
//!   migrations; the resolver reads through a single bulk snapshot
//! - **Resolver** ([`resolver`]): the four-layer merge into one
//!   deterministic timeline
//! - **Runtime** ([`runtime`]): current-status / next-event queries
//! - **Scheduler** ([`scheduler`]): wall-clock tick loop driving the sink
//!   with the retry policy
//! - **Categories** ([`category`]): cached id -> colour resolution
//!
//! ## Key components
//!
//! - [`Rule`]: parsed recurrence rule
//! - [`Resolver`]: window queries producing [`ResolvedOccurrence`] lists
//! - [`RuntimeEvaluator`]: live state computation
//! - [`SchedulerLoop`]: the cooperative scheduler
//! - [`Database`]: the repository

pub mod category;
pub mod error;
pub mod resolver;
pub mod rrule;
pub mod runtime;
pub mod schedule;
pub mod scheduler;
pub mod sink;
pub mod storage;

pub use category::{fallback_colors, CategoryResolver, SYSTEM_CATEGORIES};
pub use error::{CoreError, DatabaseError, Result, RuleError, SinkError, ValidationError};
pub use resolver::{resolve_snapshot, OccurrenceSource, ResolvedOccurrence, Resolver};
pub use rrule::{Frequency, Occurrence, Rule};
pub use runtime::{CurrentStatus, NextEvent, RuntimeEvaluator};
pub use schedule::{
    Category, DataType, Exception, ExceptionAction, GeneralSettings, HolidayCalendar,
    HolidayEntry, RuntimeOverride, Series, SinkSecurity, TargetValue,
};
pub use scheduler::{SchedulerLoop, TickReport};
pub use sink::{LogSink, ValueSink};
pub use storage::{Database, Snapshot};
