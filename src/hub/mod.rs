//! Connection hub for namespaced fan-out
//!
//! The hub owns the set of live subscribers and routes each broadcast message
//! to every subscriber whose namespace is a prefix of the message namespace.
//! All registry mutation and every broadcast decision runs on a single control
//! loop task, so no lock guards the subscriber set.
//!
//! # Architecture
//!
//! ```text
//!      [Front door]         [Front door]           [Producer]
//!      register()           unregister()           Broadcaster::send()
//!           │                    │                        │
//!           └────────────────────┼────────────────────────┘
//!                                ▼
//!                     mpsc::Sender<Command>  (FIFO, total order)
//!                                │
//!                                ▼
//!                     ┌─────────────────────────┐
//!                     │ HubLoop (one task)      │
//!                     │ subscribers: HashMap<   │
//!                     │   SubscriberId, {       │
//!                     │     Arc<Subscriber>,    │
//!                     │     mailbox tx          │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │ try_send (never blocks)
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!     [Mailbox]               [Mailbox]               [Mailbox]
//!     drain() ──► TCP         drain() ──► TCP         full → evicted
//! ```
//!
//! # Zero-Copy Fan-out
//!
//! A message is formatted once per broadcast into `bytes::Bytes`. Every
//! matching mailbox receives a reference-counted clone of the same buffer.
//!
//! # Backpressure
//!
//! Mailboxes are bounded. When a matching subscriber's mailbox is full the
//! subscriber is evicted on the spot: it is removed from the live set, flagged
//! as evicted and its mailbox is closed. The drain loop notices the closed
//! mailbox and writes a final `closing connection` event to the client.

pub mod config;
pub mod engine;
pub mod message;
pub mod subscriber;

pub use config::HubConfig;
pub use engine::{Broadcaster, Hub};
pub use message::{namespace_matches, SseMessage};
pub use subscriber::{ClientInfo, Mailbox, Subscriber, SubscriberId};
