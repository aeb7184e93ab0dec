//! Configuration for broadcast intake

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Broadcast configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Maximum number of sessions served at once
    pub max_concurrent_sessions: usize,
    /// Capacity of the in-memory connection queues built by `ChannelConnector`
    pub stream_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 1024,
            stream_buffer: 64,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_concurrent_sessions cannot be 0")]
    ZeroSessions,

    #[error("stream_buffer cannot be 0")]
    ZeroStreamBuffer,
}

impl BroadcastConfig {
    /// Overlay environment variables on the defaults.
    ///
    /// - `ORDERER_BROADCAST_MAX_SESSIONS`
    /// - `ORDERER_BROADCAST_STREAM_BUFFER`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_sessions: env::var("ORDERER_BROADCAST_MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrent_sessions),
            stream_buffer: env::var("ORDERER_BROADCAST_STREAM_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stream_buffer),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::ZeroSessions);
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::ZeroStreamBuffer);
        }
        Ok(())
    }
}
