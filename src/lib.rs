//! Namespaced Server-Sent Events fan-out
//!
//! `sse-hub` streams server-originated events to many long-lived HTTP
//! clients. Each client subscribes to a namespace prefix; each message is
//! delivered only to the clients whose namespace is a prefix of the message
//! namespace.
//!
//! - [`hub`]: the connection hub (subscriber registry, broadcast, eviction)
//! - [`server`]: the HTTP front door (auth, subscribe endpoint, admin report)
//! - [`auth`]: token validation against a credential store
//! - [`stats`]: status records for the admin endpoint
//!
//! # Example
//!
//! ```no_run
//! use sse_hub::auth::RedisCredentialStore;
//! use sse_hub::{ServerConfig, SseMessage, SseServer};
//!
//! # async fn example() -> sse_hub::error::Result<()> {
//! let server = SseServer::new(ServerConfig::default(), RedisCredentialStore::from_env());
//! let broadcaster = server.broadcaster();
//!
//! tokio::spawn(async move {
//!     let _ = broadcaster
//!         .send(SseMessage::new("/rooms/1/chat", r#"{"text":"hi"}"#))
//!         .await;
//! });
//!
//! server.run().await
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod hub;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use hub::{Broadcaster, Hub, HubConfig, SseMessage};
pub use server::{ServerConfig, SseServer};
