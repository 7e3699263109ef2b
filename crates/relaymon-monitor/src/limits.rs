use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use relaymon_store::{ConnectionStore, StoreResult};
use relaymon_types::{UserId, UserLimit};

/// Thread-safe snapshot of per-user connection caps.
///
/// Cloned handles share the same map: the refresh job writes, the tracker
/// reads. The snapshot is replaced wholesale; a user absent from it has no
/// enforced limit (fail-open).
#[derive(Clone, Default)]
pub struct LimitCache {
    limits: Arc<RwLock<HashMap<UserId, u32>>>,
}

impl LimitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforced cap for a user, if any.
    pub fn limit_for(&self, user: UserId) -> Option<u32> {
        self.limits.read().get(&user).copied()
    }

    /// Replace the whole snapshot.
    pub fn replace(&self, limits: impl IntoIterator<Item = UserLimit>) {
        let fresh: HashMap<_, _> = limits
            .into_iter()
            .map(|limit| (limit.user, limit.max_connections))
            .collect();
        *self.limits.write() = fresh;
    }

    /// Reload from the store. The snapshot is only replaced on success, so
    /// a failed load leaves the previous (stale but safe) limits intact.
    pub async fn refresh<S>(&self, store: &S) -> StoreResult<usize>
    where
        S: ConnectionStore + ?Sized,
    {
        let limits = store.active_user_limits().await?;
        let count = limits.len();
        self.replace(limits);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.limits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.read().is_empty()
    }
}
