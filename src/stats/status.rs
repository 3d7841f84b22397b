//! Status records served by the admin endpoint

use std::time::Duration;

use serde::Serialize;

/// Per-connection status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Request path the client subscribed with
    pub request_path: String,
    /// Subscribed namespace
    pub namespace: String,
    /// Connection time (seconds since the Unix epoch)
    pub created_at: u64,
    /// Client address
    pub client_ip: String,
    /// Client user agent
    pub user_agent: String,
    /// Messages written to the client
    pub msgs_sent: u64,
}

/// Hub-wide status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStatus {
    /// Hub start time (seconds since the Unix epoch)
    pub started_at: u64,
    /// Seconds since the hub started
    pub uptime_secs: u64,
    /// Broadcasts processed since startup
    pub msgs_broadcast: u64,
    /// Subscribers evicted for a full mailbox
    pub total_evicted: u64,
    /// Live subscribers
    pub subscriber_count: usize,
    /// One record per live subscriber
    pub connections: Vec<ConnectionStatus>,
}

impl HubStatus {
    /// Uptime as a duration
    pub fn uptime(&self) -> Duration {
        Duration::from_secs(self.uptime_secs)
    }

    /// Total messages written across live connections
    pub fn total_sent(&self) -> u64 {
        self.connections.iter().map(|c| c.msgs_sent).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HubStatus {
        HubStatus {
            started_at: 1_700_000_000,
            uptime_secs: 42,
            msgs_broadcast: 10,
            total_evicted: 1,
            subscriber_count: 2,
            connections: vec![
                ConnectionStatus {
                    request_path: "/subscribe/rooms/1".into(),
                    namespace: "/rooms/1".into(),
                    created_at: 1_700_000_010,
                    client_ip: "10.0.0.1".into(),
                    user_agent: "curl/8.0".into(),
                    msgs_sent: 3,
                },
                ConnectionStatus {
                    request_path: "/subscribe/rooms".into(),
                    namespace: "/rooms".into(),
                    created_at: 1_700_000_020,
                    client_ip: "10.0.0.2".into(),
                    user_agent: "Mozilla/5.0".into(),
                    msgs_sent: 4,
                },
            ],
        }
    }

    #[test]
    fn test_status_json_field_names() {
        let json = serde_json::to_value(sample()).unwrap();

        assert_eq!(json["uptime_secs"], 42);
        assert_eq!(json["msgs_broadcast"], 10);
        assert_eq!(json["subscriber_count"], 2);

        let conn = &json["connections"][0];
        assert_eq!(conn["request_path"], "/subscribe/rooms/1");
        assert_eq!(conn["namespace"], "/rooms/1");
        assert_eq!(conn["created_at"], 1_700_000_010u64);
        assert_eq!(conn["client_ip"], "10.0.0.1");
        assert_eq!(conn["user_agent"], "curl/8.0");
        assert_eq!(conn["msgs_sent"], 3);
    }

    #[test]
    fn test_aggregates() {
        let status = sample();

        assert_eq!(status.uptime(), Duration::from_secs(42));
        assert_eq!(status.total_sent(), 7);
    }
}
