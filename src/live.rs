//! Live Clock
//!
//! Wall-clock [`Clock`] implementation. Time readings come from a wall
//! anchor captured at construction plus monotonic elapsed time, so they
//! never go backwards even if the system clock steps. Each timer runs as a
//! tokio task that sleeps until its next fire time, invokes the bound (or
//! default) callback with a freshly minted [`TimeEvent`], and reschedules
//! until its stop time or cancellation. Dropping the clock aborts every
//! timer task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

use crate::clock::{alert_spec, timer_spec, Clock, TimerSpec};
use crate::error::ClockError;
use crate::events::{TimeEvent, TimerCallback};
use crate::ident::UUID4;
use crate::time::{unix_nanos_to_iso8601, UnixNanos};

/// Monotonic wall time source: Unix-epoch anchor plus `Instant` elapsed.
#[derive(Debug, Clone, Copy)]
struct MonotonicTime {
    anchor_unix_ns: u64,
    anchor_instant: Instant,
}

impl MonotonicTime {
    fn new() -> Self {
        let anchor_unix_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            anchor_unix_ns,
            anchor_instant: Instant::now(),
        }
    }

    #[inline]
    fn now_ns(&self) -> UnixNanos {
        self.anchor_unix_ns + self.anchor_instant.elapsed().as_nanos() as u64
    }
}

/// An active live timer: its task handle plus the shared next-fire slot.
struct LiveTimerEntry {
    name: String,
    next_ns: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl LiveTimerEntry {
    fn is_expired(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Wall-clock-driven [`Clock`] with asynchronous timer firing.
///
/// Timer tasks are spawned onto the ambient tokio runtime, so set
/// operations must run within one. Firing is best effort within the host
/// scheduler; `ts_event` carries the scheduled time and `ts_init` the
/// observed fire time.
pub struct LiveClock {
    time: MonotonicTime,
    timers: Vec<LiveTimerEntry>,
    default_handler: Option<TimerCallback>,
}

impl LiveClock {
    /// Create a new live clock with no timers.
    pub fn new() -> Self {
        Self {
            time: MonotonicTime::new(),
            timers: Vec::new(),
            default_handler: None,
        }
    }

    fn prune_expired(&mut self) {
        self.timers.retain(|t| !t.is_expired());
    }

    fn find_active(&self, name: &str) -> Option<&LiveTimerEntry> {
        self.timers.iter().find(|t| t.name == name && !t.is_expired())
    }

    fn resolve_callback(&self, callback: Option<TimerCallback>) -> Result<TimerCallback, ClockError> {
        callback
            .or_else(|| self.default_handler.clone())
            .ok_or(ClockError::NoHandler)
    }

    /// Install a validated schedule: bump a past-due first fire to now,
    /// then spawn the timer task.
    fn install(&mut self, mut spec: TimerSpec, callback: TimerCallback) {
        let now_ns = self.time.now_ns();
        if spec.first_ns < now_ns {
            tracing::warn!(
                name = %spec.name,
                scheduled = %unix_nanos_to_iso8601(spec.first_ns, true),
                "timer first fire was in the past, adjusted to current time",
            );
            spec.first_ns = now_ns;
        }

        let next_ns = Arc::new(AtomicU64::new(spec.first_ns));
        let handle = spawn_timer_task(self.time, spec.clone(), callback, next_ns.clone());

        tracing::debug!(name = %spec.name, next_ns = spec.first_ns, "timer set");
        self.timers.push(LiveTimerEntry {
            name: spec.name,
            next_ns,
            handle,
        });
    }
}

impl Default for LiveClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LiveClock {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

impl Clock for LiveClock {
    fn timestamp_ns(&self) -> UnixNanos {
        self.time.now_ns()
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
        self.prune_expired();

        if self.find_active(name).is_some() {
            if override_existing {
                self.cancel_timer(name)?;
            } else {
                return Err(ClockError::DuplicateTimer(name.to_string()));
            }
        }

        let spec = alert_spec(name, alert_time_ns, self.time.now_ns(), allow_past)?;
        let callback = self.resolve_callback(callback)?;
        self.install(spec, callback);
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
        self.prune_expired();

        if self.find_active(name).is_some() {
            return Err(ClockError::DuplicateTimer(name.to_string()));
        }

        let spec = timer_spec(
            name,
            interval_ns,
            start_time_ns,
            stop_time_ns,
            self.time.now_ns(),
            allow_past,
            fire_immediately,
        )?;
        let callback = self.resolve_callback(callback)?;
        self.install(spec, callback);
        Ok(())
    }

    fn next_time_ns(&self, name: &str) -> UnixNanos {
        self.find_active(name)
            .map_or(0, |t| t.next_ns.load(Ordering::SeqCst))
    }

    fn cancel_timer(&mut self, name: &str) -> Result<(), ClockError> {
        self.prune_expired();

        let idx = self
            .timers
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ClockError::UnknownTimer(name.to_string()))?;
        let entry = self.timers.remove(idx);
        entry.handle.abort();
        tracing::debug!(name, "timer cancelled");
        Ok(())
    }

    fn cancel_timers(&mut self) {
        for entry in self.timers.drain(..) {
            entry.handle.abort();
        }
    }

    fn timer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .timers
            .iter()
            .filter(|t| !t.is_expired())
            .map(|t| t.name.clone())
            .collect();
        names.sort();
        names
    }

    fn timer_count(&self) -> usize {
        self.timers.iter().filter(|t| !t.is_expired()).count()
    }
}

/// Run one timer schedule to completion: sleep to each fire time, invoke
/// the callback, reschedule until the stop boundary. One-shot alerts
/// (interval 0) fire once.
fn spawn_timer_task(
    time: MonotonicTime,
    spec: TimerSpec,
    callback: TimerCallback,
    next_shared: Arc<AtomicU64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval_ns = spec.interval_ns;
        let stop_ns = spec.stop_ns;

        loop {
            let next_ns = next_shared.load(Ordering::SeqCst);
            let now_ns = time.now_ns();
            if next_ns > now_ns {
                tokio::time::sleep(Duration::from_nanos(next_ns - now_ns)).await;
            }

            let fired_ns = time.now_ns();
            let event = TimeEvent::new(spec.name.clone(), UUID4::new(), next_ns, fired_ns);
            callback.call(event);

            if interval_ns == 0 {
                break;
            }

            let new_next_ns = next_ns + interval_ns;
            next_shared.store(new_next_ns, Ordering::SeqCst);

            if let Some(stop_ns) = stop_ns {
                if new_next_ns.max(fired_ns) >= stop_ns {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use super::*;

    fn counting_callback() -> (TimerCallback, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let count_in_cb = count.clone();
        let cb = TimerCallback::new(move |_| {
            count_in_cb.fetch_add(1, AtomicOrdering::SeqCst);
        });
        (cb, count)
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let clock = LiveClock::new();
        let mut last = clock.timestamp_ns();
        assert!(last > 0);
        for _ in 0..100 {
            let now = clock.timestamp_ns();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_timestamp_units_agree() {
        let clock = LiveClock::new();
        let ns = clock.timestamp_ns();
        let ms = clock.timestamp_ms();
        // Within a generous bound, the readings describe the same instant
        assert!(ms >= ns / 1_000_000);
        assert!(clock.timestamp() > 1.6e9);
    }

    #[tokio::test]
    async fn test_repeating_timer_fires() {
        let mut clock = LiveClock::new();
        let (cb, count) = counting_callback();

        clock
            .set_timer_ns("tick", 10_000_000, 0, None, Some(cb), true, false)
            .unwrap();
        assert_eq!(clock.timer_count(), 1);
        assert_eq!(clock.timer_names(), vec!["tick".to_string()]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(count.load(AtomicOrdering::SeqCst) >= 2);

        clock.cancel_timer("tick").unwrap();
        assert_eq!(clock.timer_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_timer_stops_firing() {
        let mut clock = LiveClock::new();
        let (cb, count) = counting_callback();

        clock
            .set_timer_ns("t", 10_000_000, 0, None, Some(cb), true, false)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        clock.cancel_timer("t").unwrap();

        let after_cancel = count.load(AtomicOrdering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_past_alert_fires_immediately_with_allow_past() {
        let mut clock = LiveClock::new();
        let (cb, count) = counting_callback();
        clock.register_default_handler(cb);

        let past = clock.timestamp_ns() - 1_000_000_000;
        clock
            .set_time_alert_ns("due", past, None, true, false)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
        // One-shot alerts disappear once fired
        assert_eq!(clock.timer_count(), 0);
    }

    #[tokio::test]
    async fn test_past_alert_rejected_without_allow_past() {
        let mut clock = LiveClock::new();
        clock.register_default_handler(TimerCallback::new(|_| {}));

        let past = clock.timestamp_ns() - 1_000_000_000;
        let result = clock.set_time_alert_ns("due", past, None, false, false);
        assert!(matches!(result, Err(ClockError::PastTime { .. })));
        assert_eq!(clock.timer_count(), 0);
    }

    #[tokio::test]
    async fn test_timer_with_stop_time_expires() {
        let mut clock = LiveClock::new();
        let (cb, count) = counting_callback();

        let now = clock.timestamp_ns();
        clock
            .set_timer_ns(
                "bounded",
                10_000_000,
                now,
                Some(now + 35_000_000),
                Some(cb),
                true,
                false,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        let fired = count.load(AtomicOrdering::SeqCst);
        assert!(fired >= 1);
        assert!(fired <= 3);
        assert_eq!(clock.timer_count(), 0);
    }

    #[tokio::test]
    async fn test_no_handler_rejected() {
        let mut clock = LiveClock::new();
        let now = clock.timestamp_ns();
        let result = clock.set_time_alert_ns("a", now + 1_000_000_000, None, false, false);
        assert_eq!(result, Err(ClockError::NoHandler));
    }
}
