//! Minimum-interval guard for outbound vendor calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Spaces calls at least `min_interval` apart. Callers that arrive early wait;
/// there is no queue beyond tokio's fair mutex and no burst allowance.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call is allowed and record it. The lock is held across the
    /// sleep so concurrent callers are released one interval apart.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                debug!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "throttling vendor call");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate() {
        let throttle = Throttle::new(Duration::from_secs(1));
        let start = Instant::now();
        throttle.acquire().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_waits_for_interval() {
        let throttle = Throttle::new(Duration::from_secs(1));
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(Instant::now() - start >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_after_interval_elapsed() {
        let throttle = Throttle::new(Duration::from_millis(500));
        throttle.acquire().await;
        tokio::time::advance(Duration::from_millis(800)).await;
        let before = Instant::now();
        throttle.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(1)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let t = throttle.clone();
            handles.push(tokio::spawn(async move {
                t.acquire().await;
                Instant::now()
            }));
        }
        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();
        assert_eq!(times[0], start);
        assert!(times[1] - times[0] >= Duration::from_secs(1));
        assert!(times[2] - times[1] >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let throttle = Throttle::new(Duration::ZERO);
        for _ in 0..10 {
            throttle.acquire().await;
        }
        assert!(throttle.min_interval().is_zero());
    }
}
