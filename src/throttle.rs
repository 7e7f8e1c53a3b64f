//! # Flood Control Module
//!
//! Per-user cooldown: the first event of a user passes and marks the user for
//! the cooldown window; anything else from that user inside the window is
//! rejected. Membership is a `moka` cache whose entries expire after the
//! cooldown.

use moka::future::Cache;
use std::time::Duration;

pub const MAX_TRACKED_USERS: u64 = 10_000;

#[derive(Clone)]
pub struct Throttle {
    recent: Cache<u64, ()>,
    cooldown: Duration,
}

impl Throttle {
    pub fn new(cooldown: Duration) -> Self {
        let recent = Cache::builder()
            .max_capacity(MAX_TRACKED_USERS)
            .time_to_live(cooldown)
            .build();
        Self { recent, cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns `true` if the event may proceed, recording the user if so
    pub async fn allow(&self, user_id: u64) -> bool {
        let entry = self.recent.entry(user_id).or_insert(()).await;
        entry.is_fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_event_within_cooldown_is_rejected() {
        let throttle = Throttle::new(Duration::from_millis(200));

        assert!(throttle.allow(42).await);
        assert!(!throttle.allow(42).await);
        // Other users are unaffected
        assert!(throttle.allow(7).await);
    }

    #[tokio::test]
    async fn test_event_after_cooldown_is_accepted() {
        let throttle = Throttle::new(Duration::from_millis(100));

        assert!(throttle.allow(42).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(throttle.allow(42).await);
        assert!(!throttle.allow(42).await);
    }
}
