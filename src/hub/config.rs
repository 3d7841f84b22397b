//! Hub configuration

/// Default mailbox capacity per subscriber
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default capacity of the hub's request queue
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Number of formatted messages a subscriber may have pending before it
    /// is evicted
    pub mailbox_capacity: usize,

    /// Number of queued register/unregister/broadcast/snapshot requests
    /// before callers wait
    pub command_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

impl HubConfig {
    /// Set the per-subscriber mailbox capacity (minimum 1)
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set the request queue capacity (minimum 1)
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}
