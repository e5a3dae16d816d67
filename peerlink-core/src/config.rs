//! Centralized configuration for Peerlink.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Peerlink components.
///
/// Groups related settings into logical sections. Supports environment
/// variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct PeerlinkConfig {
    pub connection: ConnectionConfig,
    pub transport: TransportConfig,
}

/// Connection actor behavior.
///
/// Controls the reconnection loop, request deadlines, and the channel
/// capacities backing each actor.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay between connect attempts while disconnected
    pub reconnect_interval: Duration,
    /// Request timeout used when the caller does not supply one
    pub default_request_timeout: Duration,
    /// Capacity of the actor command channel
    pub command_buffer: usize,
    /// Capacity of the per-link inbound event channel
    pub event_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(500),
            default_request_timeout: Duration::from_secs(10),
            command_buffer: 100,
            event_buffer: 64,
        }
    }
}

/// Transport-level settings for the TCP implementation.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Dial timeout for a single connect attempt
    pub connect_timeout: Duration,
    /// Maximum frame size accepted in either direction
    pub max_frame_size: usize,
    /// Outbound frame queue depth per link
    pub outbound_queue: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_frame_size: 4 * 1024 * 1024, // 4 MiB
            outbound_queue: 256,
        }
    }
}

impl PeerlinkConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime tuning via environment variables while keeping
    /// sensible defaults for everything else.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("PEERLINK_RECONNECT_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.connection.reconnect_interval = Duration::from_millis(millis);
            }
        }

        if let Ok(timeout) = std::env::var("PEERLINK_REQUEST_TIMEOUT_MS") {
            if let Ok(millis) = timeout.parse::<u64>() {
                config.connection.default_request_timeout = Duration::from_millis(millis);
            }
        }

        if let Ok(max_frame) = std::env::var("PEERLINK_MAX_FRAME_SIZE") {
            if let Ok(size) = max_frame.parse::<usize>() {
                config.transport.max_frame_size = size;
            }
        }

        config
    }

    /// Creates a configuration optimized for tests: short intervals so
    /// reconnect and timeout paths resolve quickly.
    pub fn for_testing() -> Self {
        Self {
            connection: ConnectionConfig {
                reconnect_interval: Duration::from_millis(25),
                default_request_timeout: Duration::from_millis(200),
                command_buffer: 16,
                event_buffer: 16,
            },
            transport: TransportConfig {
                connect_timeout: Duration::from_millis(250),
                max_frame_size: 64 * 1024,
                outbound_queue: 16,
            },
        }
    }
}
