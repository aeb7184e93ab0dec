//! Channel registry
//!
//! A [`ChannelSupportRegistrar`] over an in-process map from channel id to
//! support bundle.
//!
//! Routing rules:
//! - `CONFIG_UPDATE` headers take the config update path
//! - `CONFIG` and `ORDERER_TRANSACTION` headers are orderer-produced and
//!   cannot be broadcast directly
//! - every other header type takes the normal path

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::envelope::{Envelope, HeaderType};
use crate::domain::errors::ProcessorError;
use crate::domain::message::MessageKind;
use crate::ports::outbound::{ChannelSupport, ChannelSupportRegistrar, Resolution, ResolveError};

/// Registry of the channels this orderer serves.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn ChannelSupport>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `channel_id` with `support`, replacing any previous bundle.
    pub async fn register(&self, channel_id: impl Into<String>, support: Arc<dyn ChannelSupport>) {
        let channel_id = channel_id.into();
        info!(channel = %channel_id, "Registering channel support");
        self.channels.write().await.insert(channel_id, support);
    }

    /// Stop serving `channel_id`. Returns whether it was registered.
    pub async fn deregister(&self, channel_id: &str) -> bool {
        let removed = self.channels.write().await.remove(channel_id).is_some();
        if removed {
            info!(channel = %channel_id, "Deregistered channel support");
        }
        removed
    }

    /// Registered channel ids, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ChannelSupportRegistrar for ChannelRegistry {
    async fn broadcast_channel_support(&self, env: &Envelope) -> Result<Resolution, ResolveError> {
        let header = env.channel_header().map_err(|e| {
            ResolveError::new(None, ProcessorError::MalformedEnvelope(e.to_string()))
        })?;

        let kind = match header.header_type {
            HeaderType::ConfigUpdate => MessageKind::ConfigUpdate,
            HeaderType::Config | HeaderType::OrdererTransaction => {
                let cause = ProcessorError::UnsupportedHeaderType(header.header_type.to_string());
                return Err(ResolveError::new(Some(header), cause));
            }
            _ => MessageKind::Normal,
        };

        let support = self.channels.read().await.get(&header.channel_id).cloned();
        let support = match support {
            Some(support) => support,
            None => {
                let cause = anyhow::Error::new(ProcessorError::ChannelDoesNotExist)
                    .context(format!("channel {} is not served here", header.channel_id));
                return Err(ResolveError::new(Some(header), cause));
            }
        };

        debug!(
            channel = %header.channel_id,
            header_type = %header.header_type,
            "Resolved channel support"
        );

        Ok(Resolution {
            header,
            kind,
            support,
        })
    }
}
