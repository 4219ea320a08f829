//! Per-provider health tracking and failover gating (§4.C).

use std::collections::VecDeque;
use std::time::Duration;

/// How many consecutive failures put a provider below the exclusion threshold (§4.C: "excluded
/// once `failure_count > 3`").
const EXCLUSION_THRESHOLD: u32 = 3;

/// How many recent latency samples are kept for the rolling average.
const LATENCY_WINDOW: usize = 100;

/// Rolling health state for one provider. Not persisted — a process restart resets health to a
/// clean slate, which is the conservative choice: stale failure counts from before a restart
/// shouldn't keep excluding a provider that may have recovered.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: String,
    failure_count: u32,
    recent_latencies: VecDeque<Duration>,
}

impl ProviderHealth {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            failure_count: 0,
            recent_latencies: VecDeque::with_capacity(LATENCY_WINDOW),
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.failure_count = 0;
        if self.recent_latencies.len() == LATENCY_WINDOW {
            self.recent_latencies.pop_front();
        }
        self.recent_latencies.push_back(latency);
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    /// A provider is excluded from routing once it has more than [`EXCLUSION_THRESHOLD`]
    /// consecutive failures (§4.C).
    pub fn is_excluded(&self) -> bool {
        self.failure_count > EXCLUSION_THRESHOLD
    }

    pub fn average_latency(&self) -> Option<Duration> {
        if self.recent_latencies.is_empty() {
            return None;
        }
        let total: Duration = self.recent_latencies.iter().sum();
        Some(total / self.recent_latencies.len() as u32)
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_after_threshold_consecutive_failures() {
        let mut health = ProviderHealth::new("openai");
        for _ in 0..3 {
            health.record_failure();
        }
        assert!(!health.is_excluded());
        health.record_failure();
        assert!(health.is_excluded());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut health = ProviderHealth::new("openai");
        health.record_failure();
        health.record_failure();
        health.record_success(Duration::from_millis(200));
        assert_eq!(health.failure_count(), 0);
        assert!(!health.is_excluded());
    }

    #[test]
    fn latency_window_caps_at_capacity() {
        let mut health = ProviderHealth::new("openai");
        for i in 0..(LATENCY_WINDOW as u64 + 30) {
            health.record_success(Duration::from_millis(i));
        }
        assert_eq!(health.recent_latencies.len(), LATENCY_WINDOW);
    }
}
