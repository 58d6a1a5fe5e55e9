use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Hands scheduled iteration starts to a bounded set of VUs.
///
/// The pacer task calls [`ArrivalPacer::offer`] with starts that became due. A start is
/// accepted only if a VU can take it: `max_vus` bounds iterations in flight plus the
/// backlog of accepted-but-unclaimed starts. Everything else is dropped and counted.
#[derive(Debug)]
pub struct ArrivalPacer {
    scheduled_total: AtomicU64,
    claimed_total: AtomicU64,
    finished_total: AtomicU64,
    dropped_total: AtomicU64,

    active_vus: AtomicU64,
    pre_allocated_vus: u64,
    max_vus: u64,

    done: AtomicBool,
    notify: Notify,
}

impl ArrivalPacer {
    pub fn new(pre_allocated_vus: u64, max_vus: u64) -> Self {
        let max_vus = max_vus.max(1);
        let pre_allocated_vus = pre_allocated_vus.clamp(1, max_vus);
        Self {
            scheduled_total: AtomicU64::new(0),
            claimed_total: AtomicU64::new(0),
            finished_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            active_vus: AtomicU64::new(pre_allocated_vus),
            pre_allocated_vus,
            max_vus,
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Stops handing out starts; any backlog is discarded.
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn max_vus(&self) -> u64 {
        self.max_vus
    }

    fn backlog_and_in_flight(&self) -> (u64, u64) {
        let finished = self.finished_total.load(Ordering::Relaxed);
        let claimed = self.claimed_total.load(Ordering::Relaxed);
        let scheduled = self.scheduled_total.load(Ordering::Relaxed);
        (
            scheduled.saturating_sub(claimed),
            claimed.saturating_sub(finished),
        )
    }

    /// Offers `due` new starts. Returns how many were dropped.
    pub fn offer(&self, due: u64) -> u64 {
        let (backlog, in_flight) = self.backlog_and_in_flight();
        let capacity = self
            .max_vus
            .saturating_sub(in_flight)
            .saturating_sub(backlog);
        let accepted = due.min(capacity);
        let dropped = due - accepted;

        if accepted != 0 {
            self.scheduled_total.fetch_add(accepted, Ordering::Relaxed);
        }
        if dropped != 0 {
            self.dropped_total.fetch_add(dropped, Ordering::Relaxed);
        }

        self.update_active_vus();
        if accepted != 0 {
            self.notify.notify_waiters();
        }
        dropped
    }

    fn update_active_vus(&self) {
        let (backlog, in_flight) = self.backlog_and_in_flight();

        // Keep the pre-allocated pool, plus one spare above current demand.
        let demand = in_flight.saturating_add(backlog).saturating_add(1);
        let desired = self.pre_allocated_vus.max(demand).min(self.max_vus);

        let prev = self.active_vus.swap(desired, Ordering::Relaxed);
        if desired > prev {
            self.notify.notify_waiters();
        }
    }

    /// Waits until VU `vu_index` (1-based) is part of the active pool.
    /// Returns `false` once the pacer is done.
    pub async fn wait_until_active(&self, vu_index: u64) -> bool {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if self.is_done() {
                return false;
            }
            if vu_index <= self.active_vus() {
                return true;
            }
            notified.await;
        }
    }

    /// Claims one scheduled start, waiting for the next one if the backlog is empty.
    /// Returns `false` once the pacer is done.
    pub async fn claim_next(&self) -> bool {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if self.is_done() {
                return false;
            }

            let claimed = self.claimed_total.load(Ordering::Relaxed);
            let scheduled = self.scheduled_total.load(Ordering::Relaxed);
            if claimed < scheduled {
                if self
                    .claimed_total
                    .compare_exchange_weak(
                        claimed,
                        claimed.saturating_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return true;
                }
                continue;
            }

            notified.await;
        }
    }

    /// Marks a claimed iteration as finished.
    pub fn finish(&self) {
        self.finished_total.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn offer_bounds_backlog_plus_in_flight_by_max_vus() {
        let p = ArrivalPacer::new(1, 3);
        assert_eq!(p.offer(2), 0);
        assert_eq!(p.offer(2), 1);
        assert_eq!(p.dropped_total(), 1);
        assert_eq!(p.scheduled_total(), 3);
        assert_eq!(p.active_vus(), 3);
    }

    #[tokio::test]
    async fn claimed_iterations_hold_capacity_until_finished() {
        let p = ArrivalPacer::new(1, 2);
        assert_eq!(p.offer(2), 0);
        assert!(p.claim_next().await);
        assert!(p.claim_next().await);

        // Both VUs are busy.
        assert_eq!(p.offer(1), 1);

        p.finish();
        assert_eq!(p.offer(1), 0);
    }

    #[test]
    fn active_pool_shrinks_back_to_pre_allocated() {
        let p = ArrivalPacer::new(2, 10);
        assert_eq!(p.active_vus(), 2);
        p.offer(5);
        assert_eq!(p.active_vus(), 6);

        for _ in 0..5 {
            p.claimed_total.fetch_add(1, Ordering::Relaxed);
            p.finish();
        }
        p.offer(0);
        assert_eq!(p.active_vus(), 2);
    }

    #[tokio::test]
    async fn waiters_wake_on_done() {
        let p = Arc::new(ArrivalPacer::new(1, 4));

        let claimer = tokio::spawn({
            let p = p.clone();
            async move { p.claim_next().await }
        });
        let parked = tokio::spawn({
            let p = p.clone();
            async move { p.wait_until_active(4).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        p.mark_done();

        let claimed = tokio::time::timeout(Duration::from_secs(1), claimer)
            .await
            .unwrap_or_else(|e| panic!("claimer timed out: {e}"))
            .unwrap_or_else(|e| panic!("join: {e}"));
        let active = tokio::time::timeout(Duration::from_secs(1), parked)
            .await
            .unwrap_or_else(|e| panic!("parked timed out: {e}"))
            .unwrap_or_else(|e| panic!("join: {e}"));
        assert!(!claimed);
        assert!(!active);
    }

    #[tokio::test]
    async fn claim_wakes_on_offer() {
        let p = Arc::new(ArrivalPacer::new(1, 4));
        let claimer = tokio::spawn({
            let p = p.clone();
            async move { p.claim_next().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        p.offer(1);

        let claimed = tokio::time::timeout(Duration::from_secs(1), claimer)
            .await
            .unwrap_or_else(|e| panic!("claimer timed out: {e}"))
            .unwrap_or_else(|e| panic!("join: {e}"));
        assert!(claimed);
    }
}
