//! Credential store configuration

use std::time::Duration;

/// Environment variable holding the store address
pub const ENV_REDIS_HOST: &str = "REDIS_HOST";

/// Environment variable holding the store password
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";

/// Default store address
pub const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

/// Redis connection pool configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` of the server
    pub addr: String,

    /// Password sent with `AUTH` after connecting (None = no AUTH)
    pub password: Option<String>,

    /// Idle connections kept for reuse
    pub max_idle: usize,

    /// Connections open at once; further lookups wait for one to free up
    pub max_active: usize,

    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Duration,

    /// Time allowed for the TCP connect
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_REDIS_ADDR.to_string(),
            password: None,
            max_idle: 2,
            max_active: 5,
            idle_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Read `REDIS_HOST` and `REDIS_PASSWORD`, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    ///
    /// Unset and empty variables both fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            addr: non_empty(ENV_REDIS_HOST).unwrap_or_else(|| DEFAULT_REDIS_ADDR.to_string()),
            password: non_empty(ENV_REDIS_PASSWORD),
            ..Default::default()
        }
    }

    /// Set the server address
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the idle connection limit
    pub fn max_idle(mut self, max: usize) -> Self {
        self.max_idle = max;
        self
    }

    /// Set the open connection limit (minimum 1)
    pub fn max_active(mut self, max: usize) -> Self {
        self.max_active = max.max(1);
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
