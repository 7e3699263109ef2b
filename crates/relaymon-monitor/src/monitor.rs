use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relaymon_logs::{SourceReader, SourceSettings, extract};
use relaymon_store::ConnectionStore;

use crate::limits::LimitCache;
use crate::maintenance::{MaintenanceSettings, run_limit_refresh, run_retention_sweep};
use crate::tracker::ConnectionTracker;

/// How long shutdown waits for each background task to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything the monitor needs besides the store connection.
#[derive(Clone, Debug, Default)]
pub struct MonitorSettings {
    pub source: SourceSettings,
    pub maintenance: MaintenanceSettings,
}

/// Run the monitor until the token is cancelled.
///
/// Wires the source reader through the extractor into the tracker, and
/// starts the maintenance timers. The initial limit load happens here;
/// its failure is tolerated, and the cache starts empty (fail-open) until
/// the first successful refresh.
pub async fn run<S>(settings: MonitorSettings, store: Arc<S>, cancel: CancellationToken)
where
    S: ConnectionStore + 'static,
{
    let limits = LimitCache::new();
    match limits.refresh(store.as_ref()).await {
        Ok(count) => info!(users = count, "loaded user limits"),
        Err(e) => warn!(error = %e, "initial limit load failed, limits unenforced until refresh"),
    }

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let reader = SourceReader::new(settings.source);
    let reader_task = tokio::spawn(reader.run(line_tx, cancel.clone()));

    let refresh_task = tokio::spawn(run_limit_refresh(
        store.clone(),
        limits.clone(),
        settings.maintenance.limit_refresh_interval,
        cancel.clone(),
    ));
    let sweep_task = tokio::spawn(run_retention_sweep(
        store.clone(),
        settings.maintenance,
        cancel.clone(),
    ));

    // The single event-processing path: lines arrive in source order and
    // are applied one at a time, so the tracker needs no locking.
    let mut tracker = ConnectionTracker::new(store, limits);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = line_rx.recv() => match line {
                Some(line) => {
                    if let Some(event) = extract(&line) {
                        tracker.handle_event(event).await;
                    }
                }
                // Every sender is gone; nothing more will arrive.
                None => break,
            }
        }
    }

    info!(open = tracker.tracked(), "monitor stopping");
    for task in [reader_task, refresh_task, sweep_task] {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("background task did not stop within grace period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockStore;
    use relaymon_types::{ConnectionId, UserId, UserLimit};

    async fn feed<S: ConnectionStore>(tracker: &mut ConnectionTracker<S>, lines: &[&str]) {
        for line in lines {
            if let Some(event) = extract(line) {
                tracker.handle_event(event).await;
            }
        }
    }

    #[tokio::test]
    async fn test_limit_one_admits_single_connection() {
        let store = Arc::new(MockStore::default());
        let limits = LimitCache::new();
        limits.replace([UserLimit::new(UserId(9), 1)]);
        let mut tracker = ConnectionTracker::new(store.clone(), limits);

        feed(
            &mut tracker,
            &[
                "2024-01-01 12:00:00 [INFO] New connection from 192.168.1.10:5001 for user_id: 9",
                "2024-01-01 12:00:01 [INFO] New connection from 192.168.1.11:5002 for user_id: 9",
            ],
        )
        .await;

        assert_eq!(store.creates.lock().len(), 1);
        assert_eq!(tracker.open_count(UserId(9)), 1);
    }

    #[tokio::test]
    async fn test_connection_lifecycle_from_raw_lines() {
        let store = Arc::new(MockStore::default());
        store
            .domains
            .lock()
            .insert("example.com".to_string(), UserId(3));
        let mut tracker = ConnectionTracker::new(store.clone(), LimitCache::new());

        feed(
            &mut tracker,
            &[
                "2024-01-01 12:00:00 [INFO] Client connected: 192.168.1.100:12345 (user: example.com)",
                "2024-01-01 12:01:00 [INFO] Bandwidth update for user_id: 3, sent: 100, received: 200",
                "2024-01-01 12:02:00 [INFO] noise that matches nothing",
                "2024-01-01 12:03:00 [INFO] Bandwidth update for user_id: 3, sent: 50, received: 10",
                "2024-01-01 12:05:00 [INFO] Client disconnected: 192.168.1.100:12345 (user: example.com)",
                "2024-01-01 12:05:01 [INFO] Client disconnected: 192.168.1.100:12345 (user: example.com)",
            ],
        )
        .await;

        assert_eq!(store.creates.lock().len(), 1);
        assert_eq!(
            store.bandwidth.lock().get(&ConnectionId(1)),
            Some(&(150, 210))
        );
        assert_eq!(store.closes.lock().len(), 1);
        assert_eq!(tracker.tracked(), 0);
    }
}
