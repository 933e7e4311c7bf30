//! Egress proxy rotation
//!
//! Proxies are chosen by fewest failures, then least recent use, skipping
//! any proxy that is cooling down. Every selection starts a short cooldown
//! so consecutive tasks spread across proxies; every failure starts an
//! exponential one.

use crate::config::Config;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Rotation state of one proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyState {
    pub id: String,
    pub fail_count: u32,
    pub last_used: Option<Instant>,
    pub cooldown_until: Option<Instant>,
}

impl ProxyState {
    fn new(id: String) -> Self {
        Self {
            id,
            fail_count: 0,
            last_used: None,
            cooldown_until: None,
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }
}

/// Chooses an egress proxy per attempt
pub struct ProxyRotator {
    proxies: Mutex<Vec<ProxyState>>,
    selection_cooldown: Duration,
    max_cooldown: Duration,
}

impl ProxyRotator {
    /// Creates a rotator
    ///
    /// # Arguments
    ///
    /// * `proxies` - Proxy URLs; may be empty for direct connections
    /// * `min_delay` - Politeness floor; a selected proxy rests for twice this
    /// * `max_cooldown` - Upper bound on the failure cooldown
    pub fn new(proxies: Vec<String>, min_delay: Duration, max_cooldown: Duration) -> Self {
        Self {
            proxies: Mutex::new(proxies.into_iter().map(ProxyState::new).collect()),
            selection_cooldown: min_delay * 2,
            max_cooldown,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.proxies.list.clone(),
            config.crawler.min_delay(),
            config.crawler.max_proxy_cooldown(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProxyState>> {
        self.proxies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn select_proxy(&self) -> Option<String> {
        self.select_proxy_at(Instant::now())
    }

    /// Selects the best eligible proxy as of `now`
    ///
    /// # Returns
    ///
    /// * `Some(id)` - The chosen proxy, now in its selection cooldown
    /// * `None` - No proxies configured, or all of them are cooling down
    pub fn select_proxy_at(&self, now: Instant) -> Option<String> {
        let mut proxies = self.lock();

        // `None` sorts before any instant, so never-used proxies win ties
        let chosen = proxies
            .iter_mut()
            .filter(|p| p.is_available(now))
            .min_by(|a, b| {
                a.fail_count
                    .cmp(&b.fail_count)
                    .then_with(|| a.last_used.cmp(&b.last_used))
            })?;

        chosen.last_used = Some(now);
        chosen.cooldown_until = Some(now + self.selection_cooldown);

        Some(chosen.id.clone())
    }

    pub fn report_failure(&self, proxy: &str) {
        self.report_failure_at(proxy, Instant::now());
    }

    /// Records a failed attempt through `proxy` as of `now`
    pub fn report_failure_at(&self, proxy: &str, now: Instant) {
        let mut proxies = self.lock();
        let Some(state) = proxies.iter_mut().find(|p| p.id == proxy) else {
            tracing::debug!("Ignoring failure report for unknown proxy {}", proxy);
            return;
        };

        state.fail_count = state.fail_count.saturating_add(1);
        let cooldown = self.failure_cooldown(state.fail_count);
        state.cooldown_until = Some(now + cooldown);

        tracing::debug!(
            "Proxy {} failed {} times, cooling down for {:?}",
            proxy,
            state.fail_count,
            cooldown
        );
    }

    /// `2^fail_count` seconds, capped
    fn failure_cooldown(&self, fail_count: u32) -> Duration {
        2u64.checked_pow(fail_count)
            .map(Duration::from_secs)
            .map_or(self.max_cooldown, |d| d.min(self.max_cooldown))
    }

    pub fn snapshot(&self) -> Vec<ProxyState> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotator(ids: &[&str]) -> ProxyRotator {
        ProxyRotator::new(
            ids.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(1),
            Duration::from_secs(300),
        )
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_no_proxies_means_direct() {
        let rotator = rotator(&[]);
        assert!(rotator.is_empty());
        assert_eq!(rotator.select_proxy(), None);
    }

    #[test]
    fn test_selection_prefers_least_recently_used() {
        let rotator = rotator(&["p1", "p2"]);
        let t0 = Instant::now();

        assert_eq!(rotator.select_proxy_at(t0).as_deref(), Some("p1"));
        // p1 rests for 2 * min_delay
        assert_eq!(rotator.select_proxy_at(t0 + secs(1)).as_deref(), Some("p2"));
        assert_eq!(rotator.select_proxy_at(t0 + secs(1)), None);
        assert_eq!(rotator.select_proxy_at(t0 + secs(3)).as_deref(), Some("p1"));
    }

    #[test]
    fn test_selection_prefers_fewer_failures() {
        let rotator = rotator(&["p1", "p2"]);
        let t0 = Instant::now();

        rotator.report_failure_at("p1", t0);
        // After p1's 2 s cooldown both are eligible; p2 has fewer failures
        assert_eq!(rotator.select_proxy_at(t0 + secs(5)).as_deref(), Some("p2"));
    }

    #[test]
    fn test_three_failures_cool_down_for_eight_seconds() {
        let rotator = rotator(&["p1", "p2"]);
        let t0 = Instant::now();

        assert_eq!(rotator.select_proxy_at(t0).as_deref(), Some("p1"));
        for _ in 0..3 {
            rotator.report_failure_at("p1", t0);
        }

        let p1 = rotator.snapshot().into_iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(p1.fail_count, 3);
        assert_eq!(p1.cooldown_until, Some(t0 + secs(8)));

        assert_eq!(rotator.select_proxy_at(t0 + secs(3)).as_deref(), Some("p2"));
        assert_eq!(rotator.select_proxy_at(t0 + secs(7)).as_deref(), Some("p2"));
        // p2 is resting until t0 + 9 s, p1's window has ended
        assert_eq!(rotator.select_proxy_at(t0 + secs(8)).as_deref(), Some("p1"));
    }

    #[test]
    fn test_failure_cooldown_is_capped() {
        let rotator = rotator(&["p1"]);
        let t0 = Instant::now();

        for _ in 0..40 {
            rotator.report_failure_at("p1", t0);
        }

        let p1 = &rotator.snapshot()[0];
        assert_eq!(p1.cooldown_until, Some(t0 + secs(300)));
    }

    #[test]
    fn test_unknown_proxy_failure_is_ignored() {
        let rotator = rotator(&["p1"]);
        rotator.report_failure("nope");
        assert_eq!(rotator.snapshot()[0].fail_count, 0);
    }
}
