//! Server configuration

use std::net::SocketAddr;

use crate::auth::DEFAULT_KEY_PREFIX;
use crate::hub::HubConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent subscribers (0 = unlimited)
    pub max_connections: usize,

    /// Path prefix of the subscribe endpoint; the rest of the path is the
    /// namespace
    pub subscribe_prefix: String,

    /// Request header carrying the auth token
    pub auth_header: String,

    /// Credential store key prefix prepended to the token
    pub auth_key_prefix: String,

    /// Value of the `Server` response header
    pub server_name: String,

    /// Chunks buffered between a subscriber's drain task and the HTTP body
    pub write_buffer: usize,

    /// Hub settings
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            subscribe_prefix: "/subscribe".to_string(),
            auth_header: "X-Authorization".to_string(),
            auth_key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            server_name: "sse-hub".to_string(),
            write_buffer: 1,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum concurrent subscribers
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the subscribe path prefix (trailing slashes are dropped)
    pub fn subscribe_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.subscribe_prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    /// Set the auth token header name
    pub fn auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }

    /// Set the credential store key prefix
    pub fn auth_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.auth_key_prefix = prefix.into();
        self
    }

    /// Set the `Server` header value
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Set the per-subscriber mailbox capacity
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.hub = self.hub.mailbox_capacity(capacity);
        self
    }

    /// Set hub settings
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.subscribe_prefix, "/subscribe");
        assert_eq!(config.auth_header, "X-Authorization");
        assert_eq!(config.auth_key_prefix, "laravel:api_keys:");
        assert_eq!(config.hub.mailbox_capacity, 256);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_subscribe_prefix_trailing_slash() {
        let config = ServerConfig::default().subscribe_prefix("/events/");

        assert_eq!(config.subscribe_prefix, "/events");
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .auth_header("Authorization")
            .auth_key_prefix("keys:")
            .server_name("edge-1")
            .mailbox_capacity(16);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.auth_header, "Authorization");
        assert_eq!(config.auth_key_prefix, "keys:");
        assert_eq!(config.server_name, "edge-1");
        assert_eq!(config.hub.mailbox_capacity, 16);
    }
}
