//! Shared types for relaymon
//!
//! This crate contains data structures used across multiple relaymon crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Identifier of a proxy user account, as assigned by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a connection record, as assigned by the store on creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub i64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote endpoint of a proxied connection as it appears in the server logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A typed event extracted from one log line.
///
/// Connection events come in two keying flavors: by user id, or by the
/// user's domain name when the server only logged the domain. Bandwidth
/// events carry byte deltas, not totals, and never identify the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
    /// A client established a connection, identified by user id.
    Opened { user: UserId, peer: PeerAddr },
    /// A client established a connection, identified by domain.
    DomainOpened { domain: String, peer: PeerAddr },
    /// A client connection ended, identified by user id.
    Closed { user: UserId, peer: PeerAddr },
    /// A client connection ended, identified by domain.
    DomainClosed { domain: String, peer: PeerAddr },
    /// Bytes transferred since the last update for one of the user's
    /// open connections.
    Bandwidth {
        user: UserId,
        sent: i64,
        received: i64,
    },
}

/// An active user's concurrent-connection cap, as loaded from the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserLimit {
    pub user: UserId,
    pub max_connections: u32,
}

impl UserLimit {
    pub fn new(user: UserId, max_connections: u32) -> Self {
        Self {
            user,
            max_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_addr_display() {
        let peer = PeerAddr::new("192.168.1.100".parse().unwrap(), 12345);
        assert_eq!(peer.to_string(), "192.168.1.100:12345");
    }

    #[test]
    fn test_ids_display_as_plain_numbers() {
        assert_eq!(UserId(7).to_string(), "7");
        assert_eq!(ConnectionId(42).to_string(), "42");
    }

    #[test]
    fn test_peer_addr_is_hashable_key() {
        use std::collections::HashMap;

        let peer = PeerAddr::new("10.0.0.1".parse().unwrap(), 443);
        let mut map = HashMap::new();
        map.insert((UserId(1), peer), ConnectionId(9));
        assert_eq!(map.get(&(UserId(1), peer)), Some(&ConnectionId(9)));
    }
}
