use once_cell::sync::Lazy;
use regex::Regex;

use relaymon_types::{LogEvent, PeerAddr, UserId};

type Matcher = fn(&str) -> Option<LogEvent>;

/// Ordered list of line matchers. First match wins; new log formats are
/// supported by appending a matcher, not by editing existing ones.
const MATCHERS: &[Matcher] = &[
    open_by_user,
    open_by_domain,
    close_by_user,
    close_by_domain,
    bandwidth_by_user,
];

/// Try to recognize one raw log line as a typed event.
///
/// Returns `None` for blank lines, lines matching no known format, and
/// lines whose captured fields fail to parse (port outside `u16`, numeric
/// overflow, bad IP). Never returns an error to the caller.
pub fn extract(line: &str) -> Option<LogEvent> {
    if line.trim().is_empty() {
        return None;
    }
    MATCHERS.iter().find_map(|matcher| matcher(line))
}

// "2024-01-01 12:00:00 [INFO] New connection from 192.168.1.100:12345 for user_id: 1"
static OPEN_BY_USER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"New connection from ([\d.]+):(\d+) for user_id: (\d+)").expect("pattern compiles")
});

// "2024-01-01 12:00:00 [INFO] Client connected: 192.168.1.100:12345 (user: example.com)"
static OPEN_BY_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Client connected: ([\d.]+):(\d+) \(user: ([^)]+)\)").expect("pattern compiles")
});

// "2024-01-01 12:05:00 [INFO] Connection closed from 192.168.1.100:12345 for user_id: 1"
static CLOSE_BY_USER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Connection closed from ([\d.]+):(\d+) for user_id: (\d+)")
        .expect("pattern compiles")
});

// "2024-01-01 12:05:00 [INFO] Client disconnected: 192.168.1.100:12345 (user: example.com)"
static CLOSE_BY_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Client disconnected: ([\d.]+):(\d+) \(user: ([^)]+)\)").expect("pattern compiles")
});

// "2024-01-01 12:03:00 [INFO] Bandwidth update for user_id: 1, sent: 1024, received: 2048"
static BANDWIDTH_BY_USER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Bandwidth update for user_id: (\d+), sent: (\d+), received: (\d+)")
        .expect("pattern compiles")
});

fn open_by_user(line: &str) -> Option<LogEvent> {
    let caps = OPEN_BY_USER.captures(line)?;
    Some(LogEvent::Opened {
        user: user_id(&caps[3])?,
        peer: peer_addr(&caps[1], &caps[2])?,
    })
}

fn open_by_domain(line: &str) -> Option<LogEvent> {
    let caps = OPEN_BY_DOMAIN.captures(line)?;
    Some(LogEvent::DomainOpened {
        domain: caps[3].to_string(),
        peer: peer_addr(&caps[1], &caps[2])?,
    })
}

fn close_by_user(line: &str) -> Option<LogEvent> {
    let caps = CLOSE_BY_USER.captures(line)?;
    Some(LogEvent::Closed {
        user: user_id(&caps[3])?,
        peer: peer_addr(&caps[1], &caps[2])?,
    })
}

fn close_by_domain(line: &str) -> Option<LogEvent> {
    let caps = CLOSE_BY_DOMAIN.captures(line)?;
    Some(LogEvent::DomainClosed {
        domain: caps[3].to_string(),
        peer: peer_addr(&caps[1], &caps[2])?,
    })
}

fn bandwidth_by_user(line: &str) -> Option<LogEvent> {
    let caps = BANDWIDTH_BY_USER.captures(line)?;
    Some(LogEvent::Bandwidth {
        user: user_id(&caps[1])?,
        sent: caps[2].parse().ok()?,
        received: caps[3].parse().ok()?,
    })
}

fn peer_addr(ip: &str, port: &str) -> Option<PeerAddr> {
    Some(PeerAddr::new(ip.parse().ok()?, port.parse().ok()?))
}

fn user_id(raw: &str) -> Option<UserId> {
    raw.parse().ok().map(UserId)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(ip: &str, port: u16) -> PeerAddr {
        PeerAddr::new(ip.parse().unwrap(), port)
    }

    #[test]
    fn test_open_by_user_id() {
        let line = "2024-01-01 12:00:00 [INFO] New connection from 192.168.1.100:12345 for user_id: 1";
        assert_eq!(
            extract(line),
            Some(LogEvent::Opened {
                user: UserId(1),
                peer: peer("192.168.1.100", 12345),
            })
        );
    }

    #[test]
    fn test_open_by_domain() {
        let line =
            "2024-01-01 12:00:00 [INFO] Client connected: 192.168.1.100:12345 (user: example.com)";
        assert_eq!(
            extract(line),
            Some(LogEvent::DomainOpened {
                domain: "example.com".to_string(),
                peer: peer("192.168.1.100", 12345),
            })
        );
    }

    #[test]
    fn test_close_by_user_id() {
        let line =
            "2024-01-01 12:05:00 [INFO] Connection closed from 10.0.0.5:443 for user_id: 42";
        assert_eq!(
            extract(line),
            Some(LogEvent::Closed {
                user: UserId(42),
                peer: peer("10.0.0.5", 443),
            })
        );
    }

    #[test]
    fn test_close_by_domain() {
        let line =
            "2024-01-01 12:05:00 [INFO] Client disconnected: 10.0.0.5:443 (user: proxy.example.org)";
        assert_eq!(
            extract(line),
            Some(LogEvent::DomainClosed {
                domain: "proxy.example.org".to_string(),
                peer: peer("10.0.0.5", 443),
            })
        );
    }

    #[test]
    fn test_bandwidth_update() {
        let line =
            "2024-01-01 12:03:00 [INFO] Bandwidth update for user_id: 1, sent: 1024, received: 2048";
        assert_eq!(
            extract(line),
            Some(LogEvent::Bandwidth {
                user: UserId(1),
                sent: 1024,
                received: 2048,
            })
        );
    }

    #[test]
    fn test_unrecognized_line_yields_nothing() {
        assert_eq!(extract("2024-01-01 12:00:00 [INFO] Server started"), None);
        assert_eq!(extract("completely unrelated text"), None);
    }

    #[test]
    fn test_blank_lines_yield_nothing() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("   \t"), None);
    }

    #[test]
    fn test_port_out_of_range_is_swallowed() {
        let line = "New connection from 192.168.1.100:99999 for user_id: 1";
        assert_eq!(extract(line), None);
    }

    #[test]
    fn test_numeric_overflow_is_swallowed() {
        let line =
            "Bandwidth update for user_id: 1, sent: 99999999999999999999999999, received: 10";
        assert_eq!(extract(line), None);
    }

    #[test]
    fn test_malformed_ip_is_swallowed() {
        let line = "New connection from 999.1.2.3:80 for user_id: 1";
        assert_eq!(extract(line), None);
    }

    #[test]
    fn test_truncated_line_yields_nothing() {
        // The tail of a matching line, as it would appear if a read split
        // it, must not produce an event.
        assert_eq!(extract("nection from 192.168.1.100:12345 for us"), None);
    }
}
