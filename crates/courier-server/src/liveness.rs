//! Periodic demotion and eviction of sessions that stopped confirming liveness.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::router::{EvictReason, Router};

impl Router {
    /// One scan. Returns how many sessions were evicted.
    ///
    /// A session is evicted after two consecutive windows of `expiry` with no
    /// heartbeat. Store updates happen after the registry lock is released.
    pub async fn scan_liveness(&self, now: DateTime<Utc>, expiry: Duration) -> usize {
        let expired = self.sessions.scan(now, expiry).await;
        for session in &expired {
            self.finish_eviction(session, EvictReason::Expired).await;
        }
        if !expired.is_empty() {
            let remaining = self.sessions.len().await;
            debug!(evicted = expired.len(), remaining, "Liveness scan");
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{node, shared_store};

    #[tokio::test]
    async fn test_scan_runs_on_a_spawned_task() {
        let store = shared_store();
        let router = node("node-1", &store).await;
        let _alice = crate::tests::login(&router, "alice").await;

        let scanner = router.clone();
        let start = Utc::now();
        let expiry = Duration::seconds(60);
        let evicted = tokio::spawn(async move {
            scanner.scan_liveness(start + Duration::seconds(61), expiry).await;
            scanner.scan_liveness(start + Duration::seconds(122), expiry).await
        })
        .await
        .unwrap();
        assert_eq!(evicted, 1);
        assert!(router.sessions.is_empty().await);
    }
}
