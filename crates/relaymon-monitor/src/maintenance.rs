use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relaymon_store::ConnectionStore;

use crate::limits::LimitCache;

/// Timer settings for the background jobs.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceSettings {
    /// How often the limit cache is reloaded wholesale.
    pub limit_refresh_interval: Duration,

    /// How often old connection records are swept.
    pub sweep_interval: Duration,

    /// Age beyond which connection records are deleted, open or not.
    pub retention_days: i64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            limit_refresh_interval: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            retention_days: 30,
        }
    }
}

/// Records connected before `now` minus the retention window are eligible
/// for deletion.
fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - TimeDelta::days(retention_days)
}

/// Periodically replace the limit cache with a fresh snapshot of active
/// users' caps. A failed load keeps the previous snapshot.
pub async fn run_limit_refresh<S>(
    store: Arc<S>,
    limits: LimitCache,
    interval: Duration,
    cancel: CancellationToken,
) where
    S: ConnectionStore,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match limits.refresh(store.as_ref()).await {
                    Ok(count) => debug!(users = count, "limit cache refreshed"),
                    Err(e) => warn!(error = %e, "limit refresh failed, keeping cached limits"),
                }
            }
        }
    }
}

/// Periodically delete connection records older than the retention
/// window. The sweep never touches the tracker's in-memory state; a close
/// arriving for a swept record becomes a no-op update.
pub async fn run_retention_sweep<S>(
    store: Arc<S>,
    settings: MaintenanceSettings,
    cancel: CancellationToken,
) where
    S: ConnectionStore,
{
    let mut ticker = tokio::time::interval_at(
        Instant::now() + settings.sweep_interval,
        settings.sweep_interval,
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let cutoff = retention_cutoff(Utc::now(), settings.retention_days);
                match store.delete_connections_before(cutoff).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "swept old connection records"),
                    Err(e) => warn!(error = %e, "retention sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockStore;
    use relaymon_types::{UserId, UserLimit};

    #[test]
    fn test_retention_cutoff_is_days_before_now() {
        let now = "2024-03-15T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let cutoff = retention_cutoff(now, 30);
        assert_eq!(cutoff, "2024-02-14T12:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_refresh_populates_cache_on_schedule() {
        let store = Arc::new(MockStore::default());
        store.limits.lock().push(UserLimit::new(UserId(5), 3));

        let limits = LimitCache::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_limit_refresh(
            store,
            limits.clone(),
            Duration::from_secs(300),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(limits.limit_for(UserId(5)), Some(3));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_uses_retention_window_cutoff() {
        let store = Arc::new(MockStore::default());
        let settings = MaintenanceSettings::default();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_retention_sweep(store.clone(), settings, cancel.clone()));

        tokio::time::sleep(settings.sweep_interval + Duration::from_secs(1)).await;
        let sweeps = store.sweeps.lock().clone();
        assert_eq!(sweeps.len(), 1);
        let expected = Utc::now() - TimeDelta::days(settings.retention_days);
        assert!((sweeps[0] - expected).num_seconds().abs() < 5);

        cancel.cancel();
        task.await.unwrap();
    }
}
