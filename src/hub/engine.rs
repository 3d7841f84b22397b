//! Hub control loop
//!
//! [`Hub`] is a cheap, cloneable handle. Every operation is sent as a request
//! to a single task that owns the subscriber set, which gives all requests a
//! total order: whatever is submitted first is applied first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::stats::HubStatus;

use super::config::HubConfig;
use super::message::SseMessage;
use super::subscriber::{ClientInfo, Mailbox, Subscriber, SubscriberId};

/// Requests processed by the control loop
enum Command {
    Register {
        subscriber: Arc<Subscriber>,
        tx: mpsc::Sender<Bytes>,
    },
    Unregister(SubscriberId),
    Broadcast(SseMessage),
    Snapshot(oneshot::Sender<HubStatus>),
}

/// Handle to the connection hub
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<Command>,
    config: HubConfig,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Start a hub with default configuration
    ///
    /// Must be called from within a Tokio runtime. The control loop runs until
    /// every `Hub` and [`Broadcaster`] handle has been dropped.
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Start a hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.command_capacity);
        tokio::spawn(HubLoop::new(rx).run());

        Self {
            tx,
            config,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a new subscriber for `namespace`
    ///
    /// Returns the subscriber and the mailbox to drain. The registration is
    /// queued before this returns, so any broadcast submitted afterwards sees
    /// the new subscriber.
    pub async fn register(
        &self,
        namespace: impl Into<String>,
        info: ClientInfo,
    ) -> Result<(Arc<Subscriber>, Mailbox)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber::new(id, namespace.into(), info));
        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);

        self.submit(Command::Register {
            subscriber: Arc::clone(&subscriber),
            tx,
        })
        .await?;

        Ok((subscriber, Mailbox::new(rx)))
    }

    /// Remove a subscriber and close its mailbox
    ///
    /// Unknown or already removed subscribers are ignored.
    pub async fn unregister(&self, subscriber: &Subscriber) -> Result<()> {
        self.submit(Command::Unregister(subscriber.id())).await
    }

    /// Fan a message out to every matching subscriber
    pub async fn broadcast(&self, message: SseMessage) -> Result<()> {
        self.submit(Command::Broadcast(message)).await
    }

    /// Take a point-in-time status report
    pub async fn snapshot(&self) -> Result<HubStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(Command::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| Error::HubClosed)
    }

    /// Send-only ingress handle for producers
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            tx: self.tx.clone(),
        }
    }

    async fn submit(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::HubClosed)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Send-only handle for publishing messages into the hub
///
/// Shares the hub's request queue, so broadcasts are ordered with respect to
/// registrations submitted by other tasks.
#[derive(Clone)]
pub struct Broadcaster {
    tx: mpsc::Sender<Command>,
}

impl Broadcaster {
    /// Queue a message for broadcast
    pub async fn send(&self, message: SseMessage) -> Result<()> {
        self.tx
            .send(Command::Broadcast(message))
            .await
            .map_err(|_| Error::HubClosed)
    }

    /// Queue a message from synchronous code
    ///
    /// Panics if called from within an async execution context, like
    /// `tokio::sync::mpsc::Sender::blocking_send`.
    pub fn blocking_send(&self, message: SseMessage) -> Result<()> {
        self.tx
            .blocking_send(Command::Broadcast(message))
            .map_err(|_| Error::HubClosed)
    }
}

/// Registry entry: the subscriber plus the only sender for its mailbox
struct Entry {
    subscriber: Arc<Subscriber>,
    tx: mpsc::Sender<Bytes>,
}

/// State owned by the control loop task
struct HubLoop {
    rx: mpsc::Receiver<Command>,
    subscribers: HashMap<SubscriberId, Entry>,
    total_delivered: u64,
    total_evicted: u64,
    started_at: SystemTime,
    started: Instant,
}

impl HubLoop {
    fn new(rx: mpsc::Receiver<Command>) -> Self {
        Self {
            rx,
            subscribers: HashMap::new(),
            total_delivered: 0,
            total_evicted: 0,
            started_at: SystemTime::now(),
            started: Instant::now(),
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }

        tracing::debug!(
            subscribers = self.subscribers.len(),
            "Hub stopped, closing remaining mailboxes"
        );
    }

    /// Apply one request. Never awaits, so a slow subscriber cannot stall it.
    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { subscriber, tx } => self.register(subscriber, tx),
            Command::Unregister(id) => self.unregister(id),
            Command::Broadcast(message) => self.broadcast(&message),
            Command::Snapshot(reply) => {
                // Requester may have given up; nothing to do then
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn register(&mut self, subscriber: Arc<Subscriber>, tx: mpsc::Sender<Bytes>) {
        tracing::debug!(
            subscriber_id = subscriber.id(),
            namespace = %subscriber.namespace(),
            "Subscriber registered"
        );

        self.subscribers
            .insert(subscriber.id(), Entry { subscriber, tx });
    }

    fn unregister(&mut self, id: SubscriberId) {
        // Dropping the entry drops the mailbox sender, which closes it
        match self.subscribers.remove(&id) {
            Some(entry) => {
                tracing::debug!(
                    subscriber_id = id,
                    namespace = %entry.subscriber.namespace(),
                    "Subscriber unregistered"
                );
            }
            None => {
                tracing::trace!(subscriber_id = id, "Unregister for unknown subscriber");
            }
        }
    }

    fn broadcast(&mut self, message: &SseMessage) {
        self.total_delivered += 1;

        let payload = message.sse_format();
        let mut full = Vec::new();
        let mut gone = Vec::new();

        for (id, entry) in &self.subscribers {
            if !entry.subscriber.matches(&message.namespace) {
                continue;
            }

            match entry.tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => full.push(*id),
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }

        for id in full {
            if let Some(entry) = self.subscribers.remove(&id) {
                // Flag first so the drain sees the reason once the mailbox closes
                entry.subscriber.mark_evicted();
                self.total_evicted += 1;

                tracing::warn!(
                    subscriber_id = id,
                    namespace = %entry.subscriber.namespace(),
                    client_ip = %entry.subscriber.info().client_ip,
                    "Mailbox full, evicting subscriber"
                );
            }
        }

        // Drain side dropped its mailbox without unregistering
        for id in gone {
            if self.subscribers.remove(&id).is_some() {
                tracing::debug!(subscriber_id = id, "Dropping subscriber with abandoned mailbox");
            }
        }
    }

    fn snapshot(&self) -> HubStatus {
        let started_at = self
            .started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        HubStatus {
            started_at,
            uptime_secs: self.started.elapsed().as_secs(),
            msgs_broadcast: self.total_delivered,
            total_evicted: self.total_evicted,
            subscriber_count: self.subscribers.len(),
            connections: self
                .subscribers
                .values()
                .map(|entry| entry.subscriber.status())
                .collect(),
        }
    }
}
