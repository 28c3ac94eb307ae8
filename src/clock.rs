//! Dual-Mode Clock
//!
//! A single [`Clock`] abstraction over two time sources:
//!
//! - [`TestClock`]: deterministic virtual time, explicitly advanced.
//!   `advance_time` returns the fired handlers instead of calling them, so
//!   the caller drives dispatch and backtests stay reproducible.
//! - [`crate::live::LiveClock`]: wall-clock time with tokio-driven timer
//!   tasks.
//!
//! Both hold a set of named timers (recurring) and alerts (one-shot) plus
//! an optional default handler. All timestamps are Unix nanoseconds.

use chrono::{DateTime, Local, Utc};

use crate::error::ClockError;
use crate::events::{TimeEvent, TimeEventHandler, TimerCallback};
use crate::ident::UUID4;
use crate::time::{
    datetime_to_unix_nanos, nanos_to_micros, nanos_to_millis, nanos_to_secs,
    unix_nanos_to_datetime, unix_nanos_to_iso8601, UnixNanos,
};

/// Polymorphic clock interface shared by test and live implementations.
///
/// # Validation
///
/// All set operations validate before touching the timer set: names must be
/// non-empty and unique, intervals positive, stop times in the future and
/// reachable, and (unless `allow_past`) the first fire must not precede the
/// current time. A timer with no callback requires a registered default
/// handler.
pub trait Clock {
    /// Current time in Unix nanoseconds.
    fn timestamp_ns(&self) -> UnixNanos;

    /// Current time in whole microseconds.
    fn timestamp_us(&self) -> u64 {
        nanos_to_micros(self.timestamp_ns())
    }

    /// Current time in whole milliseconds.
    fn timestamp_ms(&self) -> u64 {
        nanos_to_millis(self.timestamp_ns())
    }

    /// Current time in fractional seconds.
    fn timestamp(&self) -> f64 {
        nanos_to_secs(self.timestamp_ns())
    }

    /// Current time as a UTC datetime.
    fn utc_now(&self) -> DateTime<Utc> {
        unix_nanos_to_datetime(self.timestamp_ns())
    }

    /// Current time in the host's local timezone.
    fn local_now(&self) -> DateTime<Local> {
        self.utc_now().with_timezone(&Local)
    }

    /// Register the fallback callback for timers set without their own.
    /// Last writer wins.
    fn register_default_handler(&mut self, callback: TimerCallback);

    /// Set a one-shot alert firing at `alert_time_ns`.
    ///
    /// With `override_existing`, an existing timer of the same name is
    /// cancelled first; otherwise a duplicate name fails. With `allow_past`
    /// an already-due alert fires at the current time instead of failing.
    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_time_ns: UnixNanos,
        callback: Option<TimerCallback>,
        allow_past: bool,
        override_existing: bool,
    ) -> Result<(), ClockError>;

    /// Set a recurring timer firing every `interval_ns` from
    /// `start_time_ns` (0 means now) until `stop_time_ns` (None means
    /// indefinite). With `fire_immediately` the first fire is at the start
    /// time itself rather than one interval after it.
    #[allow(clippy::too_many_arguments)]
    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_time_ns: UnixNanos,
        stop_time_ns: Option<UnixNanos>,
        callback: Option<TimerCallback>,
        allow_past: bool,
        fire_immediately: bool,
    ) -> Result<(), ClockError>;

    /// Next fire time for `name`, or 0 if no such timer.
    fn next_time_ns(&self, name: &str) -> UnixNanos;

    /// Cancel the named timer. Fails if the name is unknown.
    fn cancel_timer(&mut self, name: &str) -> Result<(), ClockError>;

    /// Cancel every timer.
    fn cancel_timers(&mut self);

    /// Names of active timers, sorted.
    fn timer_names(&self) -> Vec<String>;

    /// Count of active timers.
    fn timer_count(&self) -> usize;

    /// Datetime-flavored convenience over [`Clock::set_time_alert_ns`].
    fn set_time_alert(
        &mut self,
        name: &str,
        alert_time: DateTime<Utc>,
        callback: Option<TimerCallback>,
        allow_past: bool,
        override_existing: bool,
    ) -> Result<(), ClockError> {
        self.set_time_alert_ns(
            name,
            datetime_to_unix_nanos(&alert_time),
            callback,
            allow_past,
            override_existing,
        )
    }

    /// Duration-flavored convenience over [`Clock::set_timer_ns`].
    #[allow(clippy::too_many_arguments)]
    fn set_timer(
        &mut self,
        name: &str,
        interval: std::time::Duration,
        start_time: Option<DateTime<Utc>>,
        stop_time: Option<DateTime<Utc>>,
        callback: Option<TimerCallback>,
        allow_past: bool,
        fire_immediately: bool,
    ) -> Result<(), ClockError> {
        self.set_timer_ns(
            name,
            interval.as_nanos() as u64,
            start_time.map(|dt| datetime_to_unix_nanos(&dt)).unwrap_or(0),
            stop_time.map(|dt| datetime_to_unix_nanos(&dt)),
            callback,
            allow_past,
            fire_immediately,
        )
    }
}

// =============================================================================
// TIMER SCHEDULE
// =============================================================================

/// Validated schedule parameters shared by both clock implementations.
///
/// `interval_ns == 0` marks a one-shot alert; `first_ns` is the first fire
/// time after past-time policy has been applied.
#[derive(Debug, Clone)]
pub(crate) struct TimerSpec {
    pub name: String,
    pub interval_ns: u64,
    pub stop_ns: Option<UnixNanos>,
    pub first_ns: UnixNanos,
}

fn check_timer_name(name: &str) -> Result<(), ClockError> {
    if name.trim().is_empty() {
        return Err(ClockError::InvalidName);
    }
    Ok(())
}

fn past_time_error(name: &str, scheduled_ns: UnixNanos, now_ns: UnixNanos) -> ClockError {
    ClockError::PastTime {
        name: name.to_string(),
        scheduled: unix_nanos_to_iso8601(scheduled_ns, true),
        now: unix_nanos_to_iso8601(now_ns, true),
    }
}

/// Validate one-shot alert parameters against the current time.
pub(crate) fn alert_spec(
    name: &str,
    alert_time_ns: UnixNanos,
    now_ns: UnixNanos,
    allow_past: bool,
) -> Result<TimerSpec, ClockError> {
    check_timer_name(name)?;

    let first_ns = if alert_time_ns < now_ns {
        if !allow_past {
            return Err(past_time_error(name, alert_time_ns, now_ns));
        }
        now_ns
    } else {
        alert_time_ns
    };

    Ok(TimerSpec {
        name: name.to_string(),
        interval_ns: 0,
        stop_ns: Some(first_ns),
        first_ns,
    })
}

/// Validate recurring timer parameters against the current time.
pub(crate) fn timer_spec(
    name: &str,
    interval_ns: u64,
    start_time_ns: UnixNanos,
    stop_time_ns: Option<UnixNanos>,
    now_ns: UnixNanos,
    allow_past: bool,
    fire_immediately: bool,
) -> Result<TimerSpec, ClockError> {
    check_timer_name(name)?;

    if interval_ns == 0 {
        return Err(ClockError::InvalidInterval(name.to_string()));
    }

    let start_ns = if start_time_ns == 0 {
        now_ns
    } else {
        start_time_ns
    };

    if let Some(stop_ns) = stop_time_ns {
        if stop_ns <= now_ns {
            return Err(ClockError::InvalidStop {
                name: name.to_string(),
                reason: format!(
                    "stop time {} is not after current time {}",
                    unix_nanos_to_iso8601(stop_ns, true),
                    unix_nanos_to_iso8601(now_ns, true),
                ),
            });
        }
        if start_ns + interval_ns > stop_ns {
            return Err(ClockError::InvalidStop {
                name: name.to_string(),
                reason: format!(
                    "first interval at {} ns exceeds stop time {} ns",
                    start_ns + interval_ns,
                    stop_ns,
                ),
            });
        }
    }

    let first_ns = if fire_immediately {
        start_ns
    } else {
        start_ns + interval_ns
    };

    if !allow_past && first_ns < now_ns {
        return Err(past_time_error(name, first_ns, now_ns));
    }

    Ok(TimerSpec {
        name: name.to_string(),
        interval_ns,
        stop_ns: stop_time_ns,
        first_ns,
    })
}

/// A named timer schedule owned by a [`TestClock`].
///
/// Enumerates its fire times `first, first+interval, …` up to a horizon,
/// expiring at the stop boundary (the fire landing exactly on `stop_ns`
/// is delivered, then the timer expires).
#[derive(Debug, Clone)]
struct TestTimerEntry {
    name: String,
    interval_ns: u64,
    stop_ns: Option<UnixNanos>,
    next_ns: UnixNanos,
    expired: bool,
    callback: TimerCallback,
}

impl TestTimerEntry {
    fn new(spec: &TimerSpec, callback: TimerCallback) -> Self {
        Self {
            name: spec.name.clone(),
            interval_ns: spec.interval_ns,
            stop_ns: spec.stop_ns,
            next_ns: spec.first_ns,
            expired: false,
            callback,
        }
    }

    const fn is_alert(&self) -> bool {
        self.interval_ns == 0
    }

    /// Collect every fire time `<= to_ns`, advancing internal state.
    fn fires_until(&mut self, to_ns: UnixNanos) -> Vec<UnixNanos> {
        let mut fires = Vec::new();
        if self.expired {
            return fires;
        }

        if self.is_alert() {
            if self.next_ns <= to_ns {
                fires.push(self.next_ns);
                self.expired = true;
            }
            return fires;
        }

        while self.next_ns <= to_ns {
            if let Some(stop_ns) = self.stop_ns {
                if self.next_ns > stop_ns {
                    self.expired = true;
                    break;
                }
            }

            fires.push(self.next_ns);

            if self.stop_ns == Some(self.next_ns) {
                self.expired = true;
                break;
            }

            self.next_ns += self.interval_ns;
        }

        fires
    }
}

// =============================================================================
// TEST CLOCK
// =============================================================================

/// Deterministic virtual clock, explicitly advanced.
///
/// # Determinism Contract
///
/// - Starts at 0; never reads system time.
/// - `advance_time` only moves forward and returns the fired handlers
///   sorted by `ts_event` (ties preserve timer insertion order) without
///   invoking them, so the caller controls dispatch interleaving.
pub struct TestClock {
    current_ns: UnixNanos,
    timers: Vec<TestTimerEntry>,
    default_handler: Option<TimerCallback>,
}

impl TestClock {
    /// Create a new clock at time 0 with no timers.
    pub fn new() -> Self {
        Self {
            current_ns: 0,
            timers: Vec::new(),
            default_handler: None,
        }
    }

    /// Jump to `to_ns` without firing any timers.
    pub fn set_time(&mut self, to_ns: UnixNanos) {
        self.current_ns = to_ns;
    }

    /// Advance to `to_ns`, collecting every timer fire in the interval.
    ///
    /// Returns the fired handlers sorted by `ts_event` ascending (stable,
    /// so equal timestamps keep timer insertion order). One-shot alerts
    /// and stop-bounded timers are removed once exhausted. With `set_time`
    /// the clock's current time becomes `to_ns` after collection.
    pub fn advance_time(
        &mut self,
        to_ns: UnixNanos,
        set_time: bool,
    ) -> Result<Vec<TimeEventHandler>, ClockError> {
        if to_ns < self.current_ns {
            return Err(ClockError::TimeBackwards {
                current: self.current_ns,
                requested: to_ns,
            });
        }

        let mut handlers = Vec::new();
        for timer in &mut self.timers {
            for fire_ns in timer.fires_until(to_ns) {
                let event = TimeEvent::new(timer.name.clone(), UUID4::new(), fire_ns, fire_ns);
                handlers.push(TimeEventHandler::new(event, timer.callback.clone()));
            }
        }
        self.timers.retain(|t| !t.expired);

        // Stable: within a timer fires are already chronological, across
        // timers equal timestamps keep insertion order
        handlers.sort_by_key(|h| h.event.ts_event);

        if set_time {
            self.current_ns = to_ns;
        }

        Ok(handlers)
    }

    fn find_timer(&self, name: &str) -> Option<&TestTimerEntry> {
        self.timers.iter().find(|t| t.name == name)
    }

    fn resolve_callback(&self, callback: Option<TimerCallback>) -> Result<TimerCallback, ClockError> {
        callback
            .or_else(|| self.default_handler.clone())
            .ok_or(ClockError::NoHandler)
    }

    fn install(&mut self, spec: &TimerSpec, callback: TimerCallback) {
        tracing::debug!(name = %spec.name, next_ns = spec.first_ns, "timer set");
        self.timers.push(TestTimerEntry::new(spec, callback));
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn timestamp_ns(&self) -> UnixNanos {
        self.current_ns
    }

    fn register_default_handler(&mut self, callback: TimerCallback) {
        self.default_handler = Some(callback);
    }

    fn set_time_alert_ns(
        &mut self,
        name: &str,
        alert_time_ns: UnixNanos,
        callback: Option<TimerCallback>,
        allow_past: bool,
        override_existing: bool,
    ) -> Result<(), ClockError> {
        if self.find_timer(name).is_some() {
            if override_existing {
                self.cancel_timer(name)?;
            } else {
                return Err(ClockError::DuplicateTimer(name.to_string()));
            }
        }

        let spec = alert_spec(name, alert_time_ns, self.current_ns, allow_past)?;
        let callback = self.resolve_callback(callback)?;
        self.install(&spec, callback);
        Ok(())
    }

    fn set_timer_ns(
        &mut self,
        name: &str,
        interval_ns: u64,
        start_time_ns: UnixNanos,
        stop_time_ns: Option<UnixNanos>,
        callback: Option<TimerCallback>,
        allow_past: bool,
        fire_immediately: bool,
    ) -> Result<(), ClockError> {
        if self.find_timer(name).is_some() {
            return Err(ClockError::DuplicateTimer(name.to_string()));
        }

        let spec = timer_spec(
            name,
            interval_ns,
            start_time_ns,
            stop_time_ns,
            self.current_ns,
            allow_past,
            fire_immediately,
        )?;
        let callback = self.resolve_callback(callback)?;
        self.install(&spec, callback);
        Ok(())
    }

    fn next_time_ns(&self, name: &str) -> UnixNanos {
        self.find_timer(name).map_or(0, |t| t.next_ns)
    }

    fn cancel_timer(&mut self, name: &str) -> Result<(), ClockError> {
        let idx = self
            .timers
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ClockError::UnknownTimer(name.to_string()))?;
        self.timers.remove(idx);
        tracing::debug!(name, "timer cancelled");
        Ok(())
    }

    fn cancel_timers(&mut self) {
        self.timers.clear();
    }

    fn timer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timers.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    fn timer_count(&self) -> usize {
        self.timers.len()
    }
}
