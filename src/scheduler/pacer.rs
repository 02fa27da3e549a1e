use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct HostSlot {
    /// Earliest time the next request to the host may start
    next_start: Option<Instant>,
    /// Crawl-delay announced by the host's robots.txt
    crawl_delay: Option<Duration>,
}

/// Per-host politeness pacing
///
/// Every outbound request to a host claims a turn. A turn can only be claimed
/// once the previous one is at least the host's delay in the past, so
/// consecutive requests to one host are spaced no matter how many tasks race
/// for it. Turns are claimed at the moment a request starts, never ahead of
/// time.
#[derive(Debug)]
pub struct HostPacer {
    min_delay: Duration,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl HostPacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Records a robots.txt Crawl-delay; used when larger than the default
    pub fn set_crawl_delay(&self, host: &str, delay: Duration) {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.entry(host.to_string()).or_default().crawl_delay = Some(delay);
        }
    }

    /// Delay enforced between requests to `host`
    pub fn delay_for(&self, host: &str) -> Duration {
        let crawl_delay = self
            .hosts
            .lock()
            .ok()
            .and_then(|hosts| hosts.get(host).and_then(|slot| slot.crawl_delay));
        crawl_delay.map_or(self.min_delay, |d| d.max(self.min_delay))
    }

    /// Earliest instant a request to `host` may start
    pub fn next_turn(&self, host: &str) -> Instant {
        let now = Instant::now();
        self.hosts
            .lock()
            .ok()
            .and_then(|hosts| hosts.get(host).and_then(|slot| slot.next_start))
            .map_or(now, |next| next.max(now))
    }

    /// Claims the host's turn if it is due now
    pub fn try_claim(&self, host: &str) -> bool {
        let now = Instant::now();
        let Ok(mut hosts) = self.hosts.lock() else {
            return false;
        };
        let slot = hosts.entry(host.to_string()).or_default();
        if slot.next_start.is_some_and(|next| next > now) {
            return false;
        }

        let delay = slot
            .crawl_delay
            .map_or(self.min_delay, |d| d.max(self.min_delay));
        slot.next_start = Some(now + delay);
        true
    }

    /// Waits for and claims the host's turn
    ///
    /// Returns false when the turn would come after `deadline`.
    pub async fn wait_turn(&self, host: &str, deadline: Instant) -> bool {
        loop {
            let turn = self.next_turn(host);
            if turn > deadline {
                return false;
            }
            tokio::time::sleep_until(turn).await;
            if self.try_claim(host) {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test]
    async fn test_turns_spaced_per_host() {
        let pacer = HostPacer::new(Duration::from_millis(100));
        assert!(pacer.try_claim("a.test"));
        assert!(!pacer.try_claim("a.test"));
        assert!(pacer.try_claim("b.test"));

        let wait = pacer.next_turn("a.test") - Instant::now();
        assert!(wait > Duration::from_millis(50));
        assert!(wait <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_crawl_delay_only_raises_delay() {
        let pacer = HostPacer::new(Duration::from_millis(100));
        pacer.set_crawl_delay("slow.test", Duration::from_secs(2));
        pacer.set_crawl_delay("fast.test", Duration::from_millis(10));

        assert_eq!(pacer.delay_for("slow.test"), Duration::from_secs(2));
        assert_eq!(pacer.delay_for("fast.test"), Duration::from_millis(100));
        assert_eq!(pacer.delay_for("unknown.test"), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_turn_past_deadline_refused() {
        let pacer = HostPacer::new(Duration::from_secs(10));
        let deadline = Instant::now() + Duration::from_secs(1);
        assert!(pacer.wait_turn("a.test", deadline).await);
        assert!(!pacer.wait_turn("a.test", deadline).await);
    }

    #[tokio::test]
    async fn test_wait_turn_sleeps_until_due() {
        let pacer = HostPacer::new(Duration::from_millis(50));
        let started = Instant::now();
        assert!(pacer.wait_turn("a.test", far()).await);
        assert!(pacer.wait_turn("a.test", far()).await);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_racing_waiters_stay_spaced() {
        let pacer = std::sync::Arc::new(HostPacer::new(Duration::from_millis(40)));
        let started = Instant::now();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let pacer = pacer.clone();
                tokio::spawn(async move {
                    assert!(pacer.wait_turn("a.test", far()).await);
                    Instant::now()
                })
            })
            .collect();

        let mut starts = Vec::new();
        for waiter in waiters {
            starts.push(waiter.await.unwrap());
        }
        starts.sort();
        assert!(starts[2] - started >= Duration::from_millis(80));
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(35));
        }
    }
}
