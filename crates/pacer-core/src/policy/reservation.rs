//! Lock-free slot reservation over epoch-nanosecond pointers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Politeness state for one key.
///
/// - `next_allowed`: the next slot a fresh reservation may take
/// - `last_dispatch`: the latest instant a task on this key actually went out
///
/// Both start at `i64::MIN`, i.e. the first caller is always admitted at its own `now`.
/// Recording a dispatch raises `next_allowed` to at least `last_dispatch + interval`, so a
/// fresh slot never lands within `interval` of an earlier dispatch.
#[derive(Debug)]
pub(crate) struct ReservationSlot {
    next_allowed: AtomicI64,
    last_dispatch: AtomicI64,
}

impl ReservationSlot {
    pub(crate) fn new() -> Self {
        Self {
            next_allowed: AtomicI64::new(i64::MIN),
            last_dispatch: AtomicI64::new(i64::MIN),
        }
    }

    /// Reserve the earliest instant `>= now` and push the pointer `interval` past it.
    ///
    /// Concurrent callers retry on CAS failure, so two reservations on the same slot
    /// are always at least `interval` apart.
    pub(crate) fn reserve(&self, now: DateTime<Utc>, interval_nanos: i64) -> DateTime<Utc> {
        let now_nanos = to_nanos(now);
        let mut current = self.next_allowed.load(Ordering::Acquire);
        loop {
            let eligible = current.max(now_nanos);
            let next = eligible.saturating_add(interval_nanos);
            match self.next_allowed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return if eligible == now_nanos {
                        now
                    } else {
                        from_nanos(eligible)
                    };
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Earliest instant `>= now` that is `interval` past the last recorded dispatch.
    ///
    /// Reserves nothing. Used for tasks that already hold a slot.
    pub(crate) fn admission_at(&self, now: DateTime<Utc>, interval_nanos: i64) -> DateTime<Utc> {
        let ready = self
            .last_dispatch
            .load(Ordering::Acquire)
            .saturating_add(interval_nanos);
        if ready > to_nanos(now) {
            from_nanos(ready)
        } else {
            now
        }
    }

    pub(crate) fn record_dispatch(&self, at: DateTime<Utc>, interval_nanos: i64) {
        let at_nanos = to_nanos(at);
        self.last_dispatch.fetch_max(at_nanos, Ordering::AcqRel);
        self.next_allowed
            .fetch_max(at_nanos.saturating_add(interval_nanos), Ordering::AcqRel);
    }
}

pub(crate) fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

fn to_nanos(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_nanos_opt().unwrap_or(if instant.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
