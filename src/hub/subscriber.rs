//! Subscriber and mailbox types
//!
//! A [`Subscriber`] is the hub's view of one connected client. The matching
//! [`Mailbox`] is the receiving half of its bounded outbound queue and is
//! owned by whoever drains it to the wire.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::sync::mpsc::error::TryRecvError;

use crate::stats::ConnectionStatus;

use super::message::namespace_matches;

/// Hub-assigned subscriber identifier
pub type SubscriberId = u64;

/// Request metadata captured at registration, used for introspection only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Request path, e.g. `/subscribe/rooms/1`
    pub request_path: String,
    /// Client address, proxy headers taken into account
    pub client_ip: String,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl ClientInfo {
    /// Create client info
    pub fn new(
        request_path: impl Into<String>,
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            request_path: request_path.into(),
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// One connected client
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    namespace: String,
    info: ClientInfo,
    created_at: SystemTime,

    /// Messages written to the wire (not merely enqueued)
    sent: AtomicU64,

    /// Set by the hub before it closes the mailbox of a subscriber that fell
    /// behind
    evicted: AtomicBool,
    evicted_notify: Notify,
}

impl Subscriber {
    pub(super) fn new(id: SubscriberId, namespace: String, info: ClientInfo) -> Self {
        Self {
            id,
            namespace,
            info,
            created_at: SystemTime::now(),
            sent: AtomicU64::new(0),
            evicted: AtomicBool::new(false),
            evicted_notify: Notify::new(),
        }
    }

    /// Hub-assigned identifier
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Subscribed namespace prefix
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Request metadata
    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// When the subscriber was created
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Whether a message in `namespace` should be delivered here
    pub fn matches(&self, namespace: &str) -> bool {
        namespace_matches(&self.namespace, namespace)
    }

    /// Messages successfully written to the client
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Record one successful write; called by the drain loop only
    ///
    /// Over HTTP "sent" means accepted by the transport body, which the
    /// server then flushes to the socket on its own schedule.
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the hub evicted this subscriber for a full mailbox
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Resolves once the hub has evicted this subscriber; cancel safe
    pub async fn evicted(&self) {
        let notified = self.evicted_notify.notified();
        tokio::pin!(notified);

        // Register before checking the flag so a concurrent eviction is not missed
        notified.as_mut().enable();
        if self.is_evicted() {
            return;
        }
        notified.await;
    }

    pub(super) fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::Release);
        self.evicted_notify.notify_waiters();
    }

    /// Status record for the admin report
    pub fn status(&self) -> ConnectionStatus {
        let created_at = self
            .created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        ConnectionStatus {
            request_path: self.info.request_path.clone(),
            namespace: self.namespace.clone(),
            created_at,
            client_ip: self.info.client_ip.clone(),
            user_agent: self.info.user_agent.clone(),
            msgs_sent: self.sent_count(),
        }
    }
}

/// Receiving half of a subscriber's outbound queue
///
/// The only sender lives inside the hub's registry entry, so the mailbox is
/// closed exactly when the hub drops that entry.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Bytes>,
}

impl Mailbox {
    pub(super) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Wait for the next formatted message
    ///
    /// Returns `None` once the hub has closed the mailbox and every pending
    /// message has been taken.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a pending message without waiting
    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> {
        self.rx.try_recv()
    }

    /// Number of pending messages
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no messages are pending
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_status() {
        let sub = Subscriber::new(
            7,
            "/rooms/1".into(),
            ClientInfo::new("/subscribe/rooms/1", "10.0.0.1", "curl/8.0"),
        );
        sub.record_sent();
        sub.record_sent();

        let status = sub.status();
        assert_eq!(status.namespace, "/rooms/1");
        assert_eq!(status.request_path, "/subscribe/rooms/1");
        assert_eq!(status.client_ip, "10.0.0.1");
        assert_eq!(status.user_agent, "curl/8.0");
        assert_eq!(status.msgs_sent, 2);
        assert!(status.created_at > 0);
    }

    #[test]
    fn test_subscriber_matches() {
        let sub = Subscriber::new(1, "/rooms".into(), ClientInfo::default());

        assert!(sub.matches("/rooms/1"));
        assert!(sub.matches("/roomsXYZ"));
        assert!(!sub.matches("/lobby"));
    }

    #[test]
    fn test_eviction_flag() {
        let sub = Subscriber::new(1, "/".into(), ClientInfo::default());
        assert!(!sub.is_evicted());

        sub.mark_evicted();
        assert!(sub.is_evicted());
    }

    #[tokio::test]
    async fn test_evicted_wakes_waiter() {
        use std::sync::Arc;
        use std::time::Duration;

        let sub = Arc::new(Subscriber::new(1, "/".into(), ClientInfo::default()));
        let waiter = tokio::spawn({
            let sub = Arc::clone(&sub);
            async move { sub.evicted().await }
        });

        tokio::task::yield_now().await;
        sub.mark_evicted();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already evicted: resolves immediately
        tokio::time::timeout(Duration::from_millis(100), sub.evicted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mailbox_closes_when_sender_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let mut mailbox = Mailbox::new(rx);

        tx.try_send(Bytes::from_static(b"data:a\n\n")).unwrap();
        drop(tx);

        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.recv().await.unwrap(), Bytes::from_static(b"data:a\n\n"));
        assert!(mailbox.recv().await.is_none());
        assert!(matches!(mailbox.try_recv(), Err(TryRecvError::Disconnected)));
    }
}
