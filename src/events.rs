//! Time Events
//!
//! A timer fire produces a [`TimeEvent`]; pairing it with its bound
//! callback yields a [`TimeEventHandler`], the unit of deterministic
//! dispatch returned by `TestClock::advance_time`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ident::UUID4;
use crate::time::UnixNanos;

/// Record of a single timer fire.
///
/// `ts_event` is the scheduled fire time; `ts_init` is when the event was
/// materialized (identical under a test clock, the observed wall time under
/// a live clock). Identity and equality are carried by `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEvent {
    /// The timer name that produced this event.
    pub name: String,
    /// Unique identifier for this fire.
    pub event_id: UUID4,
    /// Scheduled fire time (Unix nanoseconds).
    pub ts_event: UnixNanos,
    /// Creation time of this record (Unix nanoseconds).
    pub ts_init: UnixNanos,
}

impl TimeEvent {
    pub fn new(name: impl Into<String>, event_id: UUID4, ts_event: UnixNanos, ts_init: UnixNanos) -> Self {
        Self {
            name: name.into(),
            event_id,
            ts_event,
            ts_init,
        }
    }
}

impl PartialEq for TimeEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for TimeEvent {}

impl fmt::Display for TimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimeEvent(name={}, event_id={}, ts_event={}, ts_init={})",
            self.name, self.event_id, self.ts_event, self.ts_init
        )
    }
}

/// Shared callback invoked with each [`TimeEvent`] a timer produces.
///
/// `Arc`-backed so live timer tasks can fire it from the runtime; cloning
/// shares the same underlying closure.
#[derive(Clone)]
pub struct TimerCallback(Arc<dyn Fn(TimeEvent) + Send + Sync>);

impl TimerCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(TimeEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback for `event`.
    #[inline]
    pub fn call(&self, event: TimeEvent) {
        (self.0)(event);
    }
}

impl fmt::Debug for TimerCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimerCallback")
    }
}

impl<F> From<F> for TimerCallback
where
    F: Fn(TimeEvent) + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

/// A [`TimeEvent`] paired with the callback that will consume it.
///
/// Ordered by `ts_event` so batches can be merged chronologically.
#[derive(Debug, Clone)]
pub struct TimeEventHandler {
    /// The time event to deliver.
    pub event: TimeEvent,
    callback: TimerCallback,
}

impl TimeEventHandler {
    pub fn new(event: TimeEvent, callback: TimerCallback) -> Self {
        Self { event, callback }
    }

    /// Deliver the event to its callback, consuming the handler.
    pub fn handle(self) {
        let Self { event, callback } = self;
        callback.call(event);
    }
}

impl PartialEq for TimeEventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.event.ts_event == other.event.ts_event
    }
}

impl Eq for TimeEventHandler {}

impl PartialOrd for TimeEventHandler {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeEventHandler {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event.ts_event.cmp(&other.event.ts_event)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_time_event_equality_by_event_id() {
        let id = UUID4::new();
        let a = TimeEvent::new("alpha", id, 1, 1);
        let b = TimeEvent::new("beta", id, 2, 2);
        let c = TimeEvent::new("alpha", UUID4::new(), 1, 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_handler_ordering_by_ts_event() {
        let cb = TimerCallback::new(|_| {});
        let early = TimeEventHandler::new(TimeEvent::new("t", UUID4::new(), 100, 100), cb.clone());
        let late = TimeEventHandler::new(TimeEvent::new("t", UUID4::new(), 200, 200), cb);
        assert!(early < late);
        assert_eq!(
            early,
            TimeEventHandler::new(
                TimeEvent::new("other", UUID4::new(), 100, 100),
                TimerCallback::new(|_| {})
            )
        );
    }

    #[test]
    fn test_handle_invokes_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_cb = calls.clone();
        let cb = TimerCallback::new(move |_| {
            calls_in_cb.fetch_add(1, AtomicOrdering::SeqCst);
        });
        let handler = TimeEventHandler::new(TimeEvent::new("t", UUID4::new(), 1, 1), cb);
        handler.handle();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_serde_roundtrip_reads_timestamps_from_record() {
        let event = TimeEvent::new("session-open", UUID4::new(), 123, 456);
        let json = serde_json::to_string(&event).unwrap();
        let back: TimeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.ts_event, 123);
        assert_eq!(back.ts_init, 456);
        assert_eq!(back.name, "session-open");
    }
}
