//! Inbound request throttle.
//!
//! Suppresses an identical request from the same identity for a fixed
//! window. Independent of the record TTL used by the sync pipeline. Backed
//! by a [`moka`] cache, so expiry and the size bound are handled there.

use std::collections::HashSet;
use std::time::Duration;

use moka::sync::Cache;

use crate::models::{MessageTemplates, ThrottleConfig};

/// Time-bounded duplicate-suppression cache.
pub struct InboundThrottle {
    window: Duration,
    ignored: HashSet<i64>,
    seen: Cache<String, ()>,
}

impl InboundThrottle {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            ignored: HashSet::new(),
            seen: Cache::builder()
                .max_capacity(capacity.max(1) as u64)
                .time_to_live(window)
                .build(),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        let mut throttle = Self::new(Duration::from_secs(config.window_secs), config.max_entries);
        throttle.ignored = config.ignored_identities.iter().copied().collect();
        throttle
    }

    /// Cache key for one identity and message content.
    pub fn key(identity: i64, content: &str) -> String {
        format!("message:{identity}:{content}")
    }

    /// Whether an identity bypasses throttling.
    pub fn is_ignored(&self, identity: i64) -> bool {
        self.ignored.contains(&identity)
    }

    /// Returns `true` if the key was seen within the window. Otherwise
    /// records it and returns `false`.
    pub fn should_suppress(&self, key: &str) -> bool {
        !self.seen.entry_by_ref(key).or_insert(()).is_fresh()
    }

    /// Check an identity/content pair, honoring the ignore list.
    pub fn check(&self, identity: i64, content: &str) -> bool {
        !self.is_ignored(identity) && self.should_suppress(&Self::key(identity, content))
    }

    /// Text answered to a suppressed request.
    pub fn wait_notice(&self, templates: &MessageTemplates) -> String {
        templates
            .throttle_notice
            .replace("{seconds}", &self.window.as_secs().to_string())
    }

    #[cfg(test)]
    fn tracked(&self) -> u64 {
        self.seen.run_pending_tasks();
        self.seen.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_suppresses_then_releases() {
        let throttle = InboundThrottle::new(Duration::from_millis(100), 100);
        let key = InboundThrottle::key(42, "/schedule");

        assert!(!throttle.should_suppress(&key));
        assert!(throttle.should_suppress(&key));

        std::thread::sleep(Duration::from_millis(200));
        assert!(!throttle.should_suppress(&key));
        assert!(throttle.should_suppress(&key));
    }

    #[test]
    fn test_keys_are_independent() {
        let throttle = InboundThrottle::new(Duration::from_secs(5), 100);

        assert!(!throttle.should_suppress(&InboundThrottle::key(1, "a")));
        assert!(!throttle.should_suppress(&InboundThrottle::key(2, "a")));
        assert!(!throttle.should_suppress(&InboundThrottle::key(1, "b")));
        assert!(throttle.should_suppress(&InboundThrottle::key(1, "a")));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let throttle = InboundThrottle::new(Duration::from_secs(60), 2);

        for i in 0..50 {
            throttle.should_suppress(&InboundThrottle::key(i, "/schedule"));
        }

        assert!(throttle.tracked() <= 2);
    }

    #[test]
    fn test_ignored_identities_and_notice() {
        let config = ThrottleConfig {
            ignored_identities: vec![7],
            ..ThrottleConfig::default()
        };
        let throttle = InboundThrottle::from_config(&config);

        assert!(!throttle.check(7, "/schedule"));
        assert!(!throttle.check(7, "/schedule"));
        assert!(!throttle.check(8, "/schedule"));
        assert!(throttle.check(8, "/schedule"));
        assert_eq!(throttle.tracked(), 1);

        assert_eq!(
            throttle.wait_notice(&MessageTemplates::default()),
            "Please wait 5 seconds before sending the same message again."
        );
    }
}
