//! The scheduler loop.
//!
//! A wall-clock state machine in the same mould as a tick-driven timer
//! engine: it owns no thread, the caller invokes [`SchedulerLoop::tick`]
//! every `scan_rate` seconds (the blocking [`SchedulerLoop::run`] driver
//! does exactly that). Each tick asks the runtime evaluator for the
//! current status and, when the `(occurrence_key, value)` pair has changed
//! since the last successful write, drives the [`ValueSink`].
//!
//! Retry policy:
//! - single-shot occurrences (zero nominal duration): one attempt; on
//!   failure the series records `last_execution_status = "failed"` and the
//!   pair is abandoned;
//! - retry-until-end occurrences: transient failures retry every
//!   `write_timeout_secs` while the occurrence is live; fatal failures
//!   abandon the pair immediately;
//! - a pair is never written twice after a success.
//!
//! The enabled and active-period gates suppress sink calls but still
//! update internal state, so stale retry/failure markers never survive a
//! state shift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime};

use crate::category::CategoryResolver;
use crate::error::Result;
use crate::runtime::RuntimeEvaluator;
use crate::schedule::TargetValue;
use crate::sink::ValueSink;
use crate::storage::Database;

/// What one tick did. Returned for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// Shutdown was requested; nothing was evaluated.
    ShutDown,
    /// No occurrence live and no override active.
    Idle,
    /// `enable_schedule` is off; state updated, sink untouched.
    Disabled,
    /// Outside the configured active period; state updated, sink untouched.
    OutsideActivePeriod,
    /// Only the runtime override is active; there is no endpoint to drive.
    NoTarget,
    /// The current pair was already written successfully.
    AlreadyWritten,
    /// A retry is scheduled but its time has not come.
    WaitingRetry { next_attempt_at: NaiveDateTime },
    /// The pair failed earlier and retries are not allowed.
    FailedNoRetry,
    Wrote {
        occurrence_key: String,
        value: String,
    },
    WriteFailed {
        occurrence_key: String,
        value: String,
        fatal: bool,
        will_retry: bool,
    },
}

#[derive(Debug, Clone)]
struct RetryState {
    occurrence_key: String,
    value: String,
    next_attempt_at: NaiveDateTime,
}

/// Cooperative scheduler loop state.
pub struct SchedulerLoop {
    shutdown: Arc<AtomicBool>,
    /// Last `(occurrence_key, value)` written successfully.
    last_success: Option<(String, String)>,
    /// Pair abandoned after a single-shot or fatal failure.
    failed: Option<(String, String)>,
    retry: Option<RetryState>,
}

impl SchedulerLoop {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            last_success: None,
            failed: None,
            retry: None,
        }
    }

    /// Shared flag checked at every suspension point of [`Self::run`].
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Evaluate one tick at `now` and drive the sink if needed.
    ///
    /// # Errors
    /// Repository failures surface; sink failures are folded into the
    /// report per the retry policy.
    pub fn tick(
        &mut self,
        db: &Database,
        categories: &CategoryResolver,
        sink: &mut dyn ValueSink,
        now: NaiveDateTime,
    ) -> Result<TickReport> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Ok(TickReport::ShutDown);
        }

        let settings = db.settings()?;
        let evaluator = RuntimeEvaluator::new(db, categories);
        let status = evaluator.current_status(now)?;

        let desired: Option<(i64, String, String)> = status.as_ref().and_then(|s| {
            match (s.series_id, s.occurrence_key.clone()) {
                (Some(series_id), Some(key)) => Some((series_id, key, s.value.clone())),
                _ => None,
            }
        });
        self.reconcile(desired.as_ref().map(|(_, key, value)| (key.as_str(), value.as_str())));

        if !settings.enable_schedule {
            return Ok(TickReport::Disabled);
        }
        if !settings.in_active_period(now) {
            return Ok(TickReport::OutsideActivePeriod);
        }

        let Some(status) = status else {
            return Ok(TickReport::Idle);
        };
        let Some((series_id, key, value)) = desired else {
            return Ok(TickReport::NoTarget);
        };

        if self.last_success.as_ref() == Some(&(key.clone(), value.clone())) {
            return Ok(TickReport::AlreadyWritten);
        }
        if self.failed.as_ref() == Some(&(key.clone(), value.clone())) {
            return Ok(TickReport::FailedNoRetry);
        }
        if let Some(retry) = &self.retry {
            if now < retry.next_attempt_at {
                return Ok(TickReport::WaitingRetry {
                    next_attempt_at: retry.next_attempt_at,
                });
            }
        }

        let series = db.series(series_id)?.ok_or(crate::error::CoreError::NotFound {
            entity: "series",
            id: series_id,
        })?;

        let typed = match TargetValue::coerce(&value, status.data_type) {
            Ok(typed) => typed,
            Err(e) => {
                tracing::error!(series_id, value = %value, "value rejected before write: {e}");
                db.set_last_execution(series_id, "failed")?;
                self.failed = Some((key.clone(), value.clone()));
                self.retry = None;
                return Ok(TickReport::WriteFailed {
                    occurrence_key: key,
                    value,
                    fatal: true,
                    will_retry: false,
                });
            }
        };

        let timeout = std::time::Duration::from_secs(u64::from(series.security.timeout_secs));
        match sink.write(&series.endpoint, &series.node_id, &typed, timeout) {
            Ok(()) => {
                tracing::info!(series_id, occurrence_key = %key, value = %value, "sink write ok");
                db.set_last_execution(series_id, "ok")?;
                self.last_success = Some((key.clone(), value.clone()));
                self.failed = None;
                self.retry = None;
                Ok(TickReport::Wrote {
                    occurrence_key: key,
                    value,
                })
            }
            Err(e) => {
                let fatal = e.is_fatal();
                tracing::warn!(series_id, occurrence_key = %key, "sink write failed: {e}");
                db.set_last_execution(series_id, "failed")?;
                if fatal || status.single_shot {
                    self.failed = Some((key.clone(), value.clone()));
                    self.retry = None;
                    Ok(TickReport::WriteFailed {
                        occurrence_key: key,
                        value,
                        fatal,
                        will_retry: false,
                    })
                } else {
                    let next_attempt_at =
                        now + Duration::seconds(i64::from(series.security.write_timeout_secs));
                    self.retry = Some(RetryState {
                        occurrence_key: key.clone(),
                        value: value.clone(),
                        next_attempt_at,
                    });
                    Ok(TickReport::WriteFailed {
                        occurrence_key: key,
                        value,
                        fatal: false,
                        will_retry: true,
                    })
                }
            }
        }
    }

    /// Blocking driver: tick, then sleep `scan_rate` seconds in one-second
    /// slices so a shutdown request is honoured promptly.
    pub fn run(
        &mut self,
        db: &Database,
        categories: &CategoryResolver,
        sink: &mut dyn ValueSink,
    ) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            let now = Local::now().naive_local();
            match self.tick(db, categories, sink, now) {
                Ok(report) => tracing::debug!(?report, "tick"),
                Err(e) => tracing::error!("tick failed: {e}"),
            }

            let scan_rate = db.settings().map(|s| s.scan_rate).unwrap_or(30).max(1);
            for _ in 0..scan_rate {
                if self.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
        Ok(())
    }

    /// Drop retry/failure markers that no longer describe the current
    /// target, so a shifted override/exception state starts fresh.
    fn reconcile(&mut self, current: Option<(&str, &str)>) {
        if let Some(retry) = &self.retry {
            let stale = current
                .map_or(true, |(k, v)| retry.occurrence_key != k || retry.value != v);
            if stale {
                self.retry = None;
            }
        }
        if let Some((fk, fv)) = &self.failed {
            let stale = current.map_or(true, |(k, v)| fk != k || fv != v);
            if stale {
                self.failed = None;
            }
        }
    }
}

impl Default for SchedulerLoop {
    fn default() -> Self {
        Self::new()
    }
}
