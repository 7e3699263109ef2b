use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use relaymon_store::ConnectionStore;
use relaymon_types::{ConnectionId, LogEvent, PeerAddr, UserId};

use crate::limits::LimitCache;

/// Key of one tracked open connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ConnKey {
    user: UserId,
    peer: PeerAddr,
}

/// Single-writer view of the connections currently believed open.
///
/// Owned by the event-processing task. Every store write triggered by an
/// event is issued from here, in event order, so operations on the same
/// (user, peer) key reach the store in the order they were observed.
pub struct ConnectionTracker<S> {
    store: Arc<S>,
    limits: LimitCache,
    active: HashMap<ConnKey, ConnectionId>,
}

impl<S: ConnectionStore> ConnectionTracker<S> {
    pub fn new(store: Arc<S>, limits: LimitCache) -> Self {
        Self {
            store,
            limits,
            active: HashMap::new(),
        }
    }

    /// Number of connections currently believed open for a user.
    pub fn open_count(&self, user: UserId) -> usize {
        self.active.keys().filter(|key| key.user == user).count()
    }

    /// Total tracked connections across all users.
    pub fn tracked(&self) -> usize {
        self.active.len()
    }

    /// Apply one typed event to the in-memory view and the store.
    pub async fn handle_event(&mut self, event: LogEvent) {
        match event {
            LogEvent::Opened { user, peer } => self.on_opened(user, peer).await,
            LogEvent::Closed { user, peer } => self.on_closed(user, peer).await,
            LogEvent::Bandwidth {
                user,
                sent,
                received,
            } => self.on_bandwidth(user, sent, received).await,
            LogEvent::DomainOpened { domain, peer } => {
                if let Some(user) = self.resolve_domain(&domain).await {
                    self.on_opened(user, peer).await;
                }
            }
            LogEvent::DomainClosed { domain, peer } => {
                if let Some(user) = self.resolve_domain(&domain).await {
                    self.on_closed(user, peer).await;
                }
            }
        }
    }

    async fn on_opened(&mut self, user: UserId, peer: PeerAddr) {
        if let Some(limit) = self.limits.limit_for(user) {
            if self.open_count(user) >= limit as usize {
                // Expected steady-state behavior, not a fault.
                debug!(%user, %peer, limit, "connection limit reached, ignoring open");
                return;
            }
        }

        match self.store.create_connection(user, peer.ip).await {
            Ok(id) => {
                self.active.insert(ConnKey { user, peer }, id);
                debug!(%user, %peer, connection = %id, "connection recorded");
            }
            Err(e) => {
                // The connection goes unrecorded for its lifetime; no
                // tracking entry, no retry.
                warn!(%user, %peer, error = %e, "failed to record connection");
            }
        }
    }

    async fn on_closed(&mut self, user: UserId, peer: PeerAddr) {
        let key = ConnKey { user, peer };
        let Some(&id) = self.active.get(&key) else {
            // Duplicate close, out-of-order close, or an open we dropped.
            return;
        };

        match self.store.mark_disconnected(id).await {
            Ok(()) => {
                self.active.remove(&key);
                debug!(%user, %peer, connection = %id, "disconnection recorded");
            }
            Err(e) => {
                // Entry stays; a later duplicate close retries the update.
                warn!(%user, %peer, connection = %id, error = %e, "failed to record disconnection");
            }
        }
    }

    async fn on_bandwidth(&mut self, user: UserId, sent: i64, received: i64) {
        // Bandwidth lines carry no peer identity; charge the first open
        // entry found for the user.
        let Some(&id) = self
            .active
            .iter()
            .find(|(key, _)| key.user == user)
            .map(|(_, id)| id)
        else {
            return;
        };

        if let Err(e) = self.store.add_bandwidth(id, sent, received).await {
            warn!(%user, connection = %id, error = %e, "failed to record bandwidth");
        }
    }

    async fn resolve_domain(&self, domain: &str) -> Option<UserId> {
        match self.store.user_id_for_domain(domain).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                debug!(domain, "no user for domain, ignoring event");
                None
            }
            Err(e) => {
                warn!(domain, error = %e, "domain lookup failed, dropping event");
                None
            }
        }
    }
}
