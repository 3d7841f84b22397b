//! HTTP front door
//!
//! Authenticates subscribe requests, registers subscribers with the hub and
//! runs one drain task per connection.

pub mod config;
pub mod drain;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use drain::{drain, CloseSignal, DrainOutcome, EventWriter};
pub use listener::SseServer;
