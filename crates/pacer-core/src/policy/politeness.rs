//! Politeness policies: when may a task hit its host?
//!
//! Every variant answers `eligible_at(task, now)`, never earlier than `now`.
//! Calling it *reserves* the returned instant: the next caller for the same key
//! gets a later slot. Reservations are CAS loops on a per-key atomic (see
//! `reservation`), there is no lock around the decision.
//!
//! A task that already holds a slot is not reserved again once the slot is due.
//! It goes through `admission_at`, which only checks spacing against the dispatches
//! recorded with `record_dispatch`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::reservation::{ReservationSlot, duration_nanos};
use crate::domain::{CrawlTask, PacerError};

pub trait PolitenessPolicy: Send + Sync {
    fn eligible_at(&self, task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc>;

    /// Earliest instant `>= now` at which a task holding a due slot may go out.
    fn admission_at(&self, _task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        now
    }

    /// The task was handed out at `at`.
    fn record_dispatch(&self, _task: &CrawlTask, _at: DateTime<Utc>) {}
}

/// Always `now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPoliteness;

impl PolitenessPolicy for NoopPoliteness {
    fn eligible_at(&self, _task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        now
    }
}

/// At most one request per `min_delay` for each host.
pub struct PerHostMinDelay {
    interval_nanos: i64,
    slots: DashMap<String, Arc<ReservationSlot>>,
}

impl PerHostMinDelay {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            interval_nanos: duration_nanos(min_delay),
            slots: DashMap::new(),
        }
    }

    pub fn tracked_hosts(&self) -> usize {
        self.slots.len()
    }

    fn existing_slot(&self, host: &str) -> Option<Arc<ReservationSlot>> {
        self.slots.get(host).map(|slot| Arc::clone(slot.value()))
    }

    fn slot(&self, host: String) -> Arc<ReservationSlot> {
        // clone the Arc out so no shard guard is held while reserving
        if let Some(slot) = self.existing_slot(&host) {
            return slot;
        }
        Arc::clone(
            self.slots
                .entry(host)
                .or_insert_with(|| Arc::new(ReservationSlot::new()))
                .value(),
        )
    }
}

impl PolitenessPolicy for PerHostMinDelay {
    fn eligible_at(&self, task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        self.slot(task.host_key()).reserve(now, self.interval_nanos)
    }

    fn admission_at(&self, task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.existing_slot(&task.host_key()) {
            Some(slot) => slot.admission_at(now, self.interval_nanos),
            None => now,
        }
    }

    fn record_dispatch(&self, task: &CrawlTask, at: DateTime<Utc>) {
        self.slot(task.host_key()).record_dispatch(at, self.interval_nanos);
    }
}

/// At most `max_rps` requests per second across all hosts.
#[derive(Debug)]
pub struct GlobalRps {
    interval_nanos: i64,
    slot: ReservationSlot,
}

impl GlobalRps {
    pub fn new(max_rps: f64) -> Result<Self, PacerError> {
        if !max_rps.is_finite() || max_rps <= 0.0 {
            return Err(PacerError::Config(format!(
                "global max_rps must be a positive number, got {max_rps}"
            )));
        }
        Ok(Self {
            interval_nanos: (1e9 / max_rps).round() as i64,
            slot: ReservationSlot::new(),
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos.max(0) as u64)
    }
}

impl PolitenessPolicy for GlobalRps {
    fn eligible_at(&self, _task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        self.slot.reserve(now, self.interval_nanos)
    }

    fn admission_at(&self, _task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        self.slot.admission_at(now, self.interval_nanos)
    }

    fn record_dispatch(&self, _task: &CrawlTask, at: DateTime<Utc>) {
        self.slot.record_dispatch(at, self.interval_nanos);
    }
}

/// Conjunction of policies: the latest instant wins.
///
/// Every component is asked (and so reserves), even once one of them has
/// already pushed the answer into the future.
#[derive(Default)]
pub struct CompositePoliteness {
    policies: Vec<Arc<dyn PolitenessPolicy>>,
}

impl CompositePoliteness {
    pub fn new(policies: Vec<Arc<dyn PolitenessPolicy>>) -> Self {
        Self { policies }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl PolitenessPolicy for CompositePoliteness {
    fn eligible_at(&self, task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        self.policies
            .iter()
            .map(|policy| policy.eligible_at(task, now))
            .fold(now, |latest, at| latest.max(at))
    }

    fn admission_at(&self, task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
        self.policies
            .iter()
            .map(|policy| policy.admission_at(task, now))
            .fold(now, |latest, at| latest.max(at))
    }

    fn record_dispatch(&self, task: &CrawlTask, at: DateTime<Utc>) {
        for policy in &self.policies {
            policy.record_dispatch(task, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn task(url: &str) -> CrawlTask {
        CrawlTask::new(TaskId::generate(), Url::parse(url).unwrap(), t0())
    }

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    #[test]
    fn noop_is_always_now() {
        let policy = NoopPoliteness;
        let t = task("https://example.com/");
        assert_eq!(policy.eligible_at(&t, t0()), t0());
        assert_eq!(policy.eligible_at(&t, t0()), t0());
    }

    #[test]
    fn global_rps_spaces_calls_evenly() {
        let policy = GlobalRps::new(10.0).unwrap();
        let t = task("https://example.com/");

        let slots: Vec<_> = (0..5).map(|_| policy.eligible_at(&t, t0())).collect();

        assert_eq!(slots, (0..5).map(|i| t0() + ms(100 * i)).collect::<Vec<_>>());
        assert_eq!(policy.interval(), Duration::from_millis(100));
    }

    #[test]
    fn global_rps_applies_across_hosts() {
        let policy = GlobalRps::new(2.0).unwrap();

        assert_eq!(policy.eligible_at(&task("https://a.example/"), t0()), t0());
        assert_eq!(
            policy.eligible_at(&task("https://b.example/"), t0()),
            t0() + ms(500)
        );
    }

    #[test]
    fn global_rps_never_returns_earlier_than_now() {
        let policy = GlobalRps::new(10.0).unwrap();
        let t = task("https://example.com/");
        policy.eligible_at(&t, t0());

        let later = t0() + ms(5_000);
        assert_eq!(policy.eligible_at(&t, later), later);
    }

    #[test]
    fn global_rps_rejects_non_positive_rates() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(GlobalRps::new(bad), Err(PacerError::Config(_))));
        }
    }

    #[test]
    fn per_host_delay_is_per_host() {
        let policy = PerHostMinDelay::new(Duration::from_secs(1));
        let a = task("https://a.example/1");
        let b = task("https://b.example/1");

        assert_eq!(policy.eligible_at(&a, t0()), t0());
        assert_eq!(policy.eligible_at(&b, t0()), t0());
        assert_eq!(policy.eligible_at(&a, t0()), t0() + ms(1_000));
        assert_eq!(policy.eligible_at(&b, t0()), t0() + ms(1_000));
        assert_eq!(policy.eligible_at(&a, t0()), t0() + ms(2_000));
        assert_eq!(policy.tracked_hosts(), 2);
    }

    #[test]
    fn per_host_delay_keeps_min_spacing_under_contention() {
        let policy = Arc::new(PerHostMinDelay::new(Duration::from_millis(250)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || {
                    let t = task("https://busy.example/");
                    (0..50).map(|_| policy.eligible_at(&t, t0())).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut slots: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        slots.sort();

        for pair in slots.windows(2) {
            assert!(pair[1] - pair[0] >= ms(250));
        }
    }

    struct Counting {
        calls: AtomicUsize,
        delay: chrono::Duration,
    }

    impl PolitenessPolicy for Counting {
        fn eligible_at(&self, _task: &CrawlTask, now: DateTime<Utc>) -> DateTime<Utc> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            now + self.delay
        }
    }

    #[test]
    fn composite_takes_the_latest_and_asks_everyone() {
        let early = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            delay: ms(3_000),
        });
        let late = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            delay: ms(7_000),
        });
        let composite = CompositePoliteness::new(vec![
            late.clone() as Arc<dyn PolitenessPolicy>,
            early.clone() as Arc<dyn PolitenessPolicy>,
        ]);

        let at = composite.eligible_at(&task("https://example.com/"), t0());

        assert_eq!(at, t0() + ms(7_000));
        assert_eq!(early.calls.load(Ordering::SeqCst), 1);
        assert_eq!(late.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn held_task_waits_for_spacing_after_a_later_dispatch() {
        let policy = PerHostMinDelay::new(Duration::from_secs(1));
        let first = task("https://busy.example/1");
        let held = task("https://busy.example/2");
        let fresh = task("https://busy.example/3");

        assert_eq!(policy.eligible_at(&first, t0()), t0());
        policy.record_dispatch(&first, t0());
        assert_eq!(policy.eligible_at(&held, t0()), t0() + ms(1_000));

        let later = t0() + ms(2_000);
        assert_eq!(policy.eligible_at(&fresh, later), later);
        policy.record_dispatch(&fresh, later);

        assert_eq!(policy.admission_at(&held, later), t0() + ms(3_000));
        assert_eq!(policy.admission_at(&held, t0() + ms(3_000)), t0() + ms(3_000));
    }

    #[test]
    fn admission_on_an_untracked_host_is_now() {
        let policy = PerHostMinDelay::new(Duration::from_secs(1));
        assert_eq!(policy.admission_at(&task("https://new.example/"), t0()), t0());
        assert_eq!(policy.tracked_hosts(), 0);
    }

    #[test]
    fn global_admission_counts_every_host() {
        let policy = GlobalRps::new(10.0).unwrap();
        let a = task("https://a.example/");
        let b = task("https://b.example/");

        policy.record_dispatch(&a, t0() + ms(1_000));

        assert_eq!(policy.admission_at(&b, t0() + ms(1_000)), t0() + ms(1_100));
        assert_eq!(policy.admission_at(&b, t0() + ms(1_100)), t0() + ms(1_100));
    }

    #[test]
    fn composite_admission_is_the_latest_and_records_everywhere() {
        let per_host = Arc::new(PerHostMinDelay::new(Duration::from_secs(1)));
        let global = Arc::new(GlobalRps::new(10.0).unwrap());
        let composite = CompositePoliteness::new(vec![
            per_host.clone() as Arc<dyn PolitenessPolicy>,
            global.clone() as Arc<dyn PolitenessPolicy>,
        ]);
        let a = task("https://a.example/1");
        let b = task("https://b.example/1");
        let at = t0() + ms(1_000);

        composite.record_dispatch(&b, at);

        // other host: only the global spacing applies
        assert_eq!(composite.admission_at(&a, at), at + ms(100));
        // same host: the per-host delay dominates
        assert_eq!(composite.admission_at(&b, at), at + ms(1_000));
        assert_eq!(per_host.tracked_hosts(), 1);
        assert_eq!(global.admission_at(&a, at + ms(100)), at + ms(100));
    }

    #[test]
    fn empty_composite_is_now() {
        let composite = CompositePoliteness::default();
        assert!(composite.is_empty());
        assert_eq!(composite.eligible_at(&task("https://example.com/"), t0()), t0());
        assert_eq!(composite.admission_at(&task("https://example.com/"), t0()), t0());
    }
}
