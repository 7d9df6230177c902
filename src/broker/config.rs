//! Broker configuration

/// Default per-subscriber inbox capacity
pub const DEFAULT_INBOX_CAPACITY: usize = 5;

/// Default control-queue capacity
pub const DEFAULT_CONTROL_CAPACITY: usize = 16;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bounded capacity of each subscriber inbox. Items published while
    /// an inbox is full are dropped for that subscriber only.
    pub inbox_capacity: usize,

    /// Bounded capacity of the control queue feeding the broker loop.
    /// Publishers block only while this queue is saturated.
    pub control_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            control_capacity: DEFAULT_CONTROL_CAPACITY,
        }
    }
}

impl BrokerConfig {
    /// Set the per-subscriber inbox capacity (minimum 1)
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }

    /// Set the control-queue capacity (minimum 1)
    pub fn control_capacity(mut self, capacity: usize) -> Self {
        self.control_capacity = capacity.max(1);
        self
    }
}
