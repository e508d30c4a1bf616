use std::sync::Arc;
use std::time::Duration;

use cordnode_shared::api::{AntiCheatStatus, rest::RestError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::remote::LedgerApi;

#[derive(Debug, Default)]
struct TrackerState {
    status: AntiCheatStatus,
    last_attempt: Option<Instant>,
}

/// Holds the last anti-cheat verdict and throttles how often it is refreshed.
#[derive(Clone)]
pub struct AntiCheatTracker {
    state: Arc<Mutex<TrackerState>>,
    min_gap: Duration,
}

impl AntiCheatTracker {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            min_gap,
        }
    }

    pub async fn status(&self) -> AntiCheatStatus {
        self.state.lock().await.status
    }

    pub async fn efficiency(&self) -> f64 {
        self.status().await.efficiency_multiplier
    }

    /// Asks the server for a fresh verdict unless one was requested within
    /// the minimum gap. Returns `None` when throttled. A failed request still
    /// counts as an attempt and keeps the previous verdict.
    pub async fn refresh(
        &self,
        api: &dyn LedgerApi,
        user_id: &str,
    ) -> Result<Option<AntiCheatStatus>, RestError> {
        {
            let mut s = self.state.lock().await;
            if let Some(last) = s.last_attempt
                && last.elapsed() < self.min_gap
            {
                debug!(since = ?last.elapsed(), "anti-cheat check throttled");
                return Ok(None);
            }
            s.last_attempt = Some(Instant::now());
        }
        let fresh = match api.anti_cheat(user_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error=%e, "anti-cheat check failed; keeping previous status");
                return Err(e);
            }
        };
        let mut s = self.state.lock().await;
        if fresh != s.status {
            info!(
                other_accounts = fresh.other_accounts,
                penalty_level = fresh.penalty_level,
                efficiency = fresh.efficiency_multiplier,
                "anti-cheat status changed"
            );
        }
        s.status = fresh;
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLedger;

    #[tokio::test(start_paused = true)]
    async fn refresh_is_rate_limited() {
        let api = FakeLedger::new(3.5);
        let user = api.user_id();
        api.set_anti_cheat(AntiCheatStatus::from_other_accounts(1, 0.25))
            .await;
        let tracker = AntiCheatTracker::new(Duration::from_secs(300));
        assert_eq!(tracker.efficiency().await, 1.0);

        let first = tracker.refresh(&api, &user).await.unwrap();
        assert_eq!(first.map(|s| s.penalty_level), Some(1));
        assert_eq!(tracker.efficiency().await, 0.75);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(tracker.refresh(&api, &user).await.unwrap(), None);
        assert_eq!(api.anti_cheat_calls().await, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(tracker.refresh(&api, &user).await.unwrap().is_some());
        assert_eq!(api.anti_cheat_calls().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_verdict() {
        let api = FakeLedger::new(1.0);
        let user = api.user_id();
        let tracker = AntiCheatTracker::new(Duration::from_secs(300));
        api.set_anti_cheat(AntiCheatStatus::from_other_accounts(2, 0.25))
            .await;
        tracker.refresh(&api, &user).await.unwrap();

        api.fail_anti_cheat(true).await;
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(tracker.refresh(&api, &user).await.is_err());
        assert_eq!(tracker.efficiency().await, 0.5);
        // the failed attempt still throttles the next one
        assert_eq!(tracker.refresh(&api, &user).await.unwrap(), None);
    }
}
