//! Recording mock store shared by this crate's tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use relaymon_store::{ConnectionStore, StoreError, StoreResult};
use relaymon_types::{ConnectionId, UserId, UserLimit};

/// In-memory `ConnectionStore` that records every call and can be told to
/// fail specific operations. Connection ids are assigned sequentially
/// starting at 1.
#[derive(Default)]
pub(crate) struct MockStore {
    next_id: AtomicI64,
    pub(crate) limits: Mutex<Vec<UserLimit>>,
    pub(crate) domains: Mutex<HashMap<String, UserId>>,
    pub(crate) creates: Mutex<Vec<(UserId, IpAddr)>>,
    pub(crate) closes: Mutex<Vec<ConnectionId>>,
    pub(crate) bandwidth: Mutex<HashMap<ConnectionId, (i64, i64)>>,
    pub(crate) sweeps: Mutex<Vec<DateTime<Utc>>>,
    pub(crate) fail_creates: AtomicBool,
    pub(crate) fail_closes: AtomicBool,
    pub(crate) fail_limit_loads: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Internal("injected failure".to_string())
}

#[async_trait]
impl ConnectionStore for MockStore {
    async fn active_user_limits(&self) -> StoreResult<Vec<UserLimit>> {
        if self.fail_limit_loads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        Ok(self.limits.lock().clone())
    }

    async fn user_id_for_domain(&self, domain: &str) -> StoreResult<Option<UserId>> {
        Ok(self.domains.lock().get(domain).copied())
    }

    async fn create_connection(&self, user: UserId, peer_ip: IpAddr) -> StoreResult<ConnectionId> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.creates.lock().push((user, peer_ip));
        Ok(ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn mark_disconnected(&self, id: ConnectionId) -> StoreResult<()> {
        if self.fail_closes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.closes.lock().push(id);
        Ok(())
    }

    async fn add_bandwidth(&self, id: ConnectionId, sent: i64, received: i64) -> StoreResult<()> {
        let mut totals = self.bandwidth.lock();
        let entry = totals.entry(id).or_insert((0, 0));
        entry.0 += sent;
        entry.1 += received;
        Ok(())
    }

    async fn delete_connections_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.sweeps.lock().push(cutoff);
        Ok(0)
    }
}
