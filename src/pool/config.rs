//! Pool configuration.

use std::time::Duration;

use crate::core::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_DIAL_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::rpc::RpcConfig;

/// Session pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of cached sessions. The least recently used one is
    /// closed when a new session would exceed it.
    pub cache_capacity: usize,

    /// Timeout for opening the raw connection.
    pub dial_timeout: Duration,

    /// Timeout for the key exchange, in both roles.
    pub handshake_timeout: Duration,

    /// Deadline applied by [`SessionPool::request`](super::SessionPool::request).
    /// `None` waits forever.
    pub request_timeout: Option<Duration>,

    /// Queue sizes for each session's multiplexer.
    pub rpc: RpcConfig,

    /// Largest inbound ciphertext frame accepted.
    pub max_frame_size: usize,

    /// Reject a dialled peer whose key differs from the dialled address.
    pub verify_remote_key: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            rpc: RpcConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            verify_remote_key: true,
        }
    }
}

impl PoolConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }
}

/// Builder for [`PoolConfig`].
#[derive(Debug)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the cache capacity (minimum 1).
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity.max(1);
        self
    }

    /// Set the dial timeout.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config.dial_timeout = timeout;
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the default request deadline.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the writer queue capacity.
    pub fn write_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.rpc.write_queue_capacity = capacity;
        self
    }

    /// Set the inbound queue capacity.
    pub fn inbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.rpc.inbound_queue_capacity = capacity;
        self
    }

    /// Set the maximum inbound frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Enable or disable pinned-key verification on dial.
    pub fn verify_remote_key(mut self, enabled: bool) -> Self {
        self.config.verify_remote_key = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.dial_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.rpc.write_queue_capacity, 16);
        assert!(config.verify_remote_key);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PoolConfig::builder()
            .cache_capacity(0)
            .request_timeout(None)
            .inbound_queue_capacity(4)
            .max_frame_size(1024)
            .verify_remote_key(false)
            .build();

        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.rpc.inbound_queue_capacity, 4);
        assert_eq!(config.max_frame_size, 1024);
        assert!(!config.verify_remote_key);
    }
}
