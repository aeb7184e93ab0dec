//! Outbound Ports (Driven Ports / SPI)
//!
//! The session handler reaches every collaborator through these traits:
//! the channel registrar, the per-channel support bundle and the client
//! transport.

use std::fmt;
use std::sync::Arc;

use crate::domain::envelope::{ChannelHeader, Envelope};
use crate::domain::errors::TransportError;
use crate::domain::message::MessageKind;
use crate::domain::response::BroadcastResponse;
use async_trait::async_trait;

/// Local validation and rewriting of messages for one channel.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Validate a normal message.
    ///
    /// Returns the configuration sequence the message was validated against.
    async fn process_normal_msg(&self, env: &Envelope) -> anyhow::Result<u64>;

    /// Validate a configuration update and produce the configuration
    /// envelope that should be ordered in its place, together with the
    /// configuration sequence it was validated against.
    async fn process_config_update_msg(&self, env: &Envelope) -> anyhow::Result<(Envelope, u64)>;
}

/// Hands messages to consensus for one channel.
#[async_trait]
pub trait Consenter: Send + Sync {
    /// Submit a normal message for ordering.
    async fn order(&self, env: Envelope, config_seq: u64) -> anyhow::Result<()>;

    /// Submit a configuration envelope for ordering.
    async fn configure(&self, config: Envelope, config_seq: u64) -> anyhow::Result<()>;

    /// Block until consensus accepts new messages.
    ///
    /// Consenters that drain in-flight work or reconfigure can hold intake
    /// here, and return an error when they cannot accept messages at all.
    /// The default is the always-ready policy.
    async fn wait_ready(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Backing resources for broadcast on one channel.
pub trait ChannelSupport: Processor + Consenter {}

impl<T: Processor + Consenter> ChannelSupport for T {}

/// Successful routing of an envelope.
#[derive(Clone)]
pub struct Resolution {
    pub header: ChannelHeader,
    pub kind: MessageKind,
    pub support: Arc<dyn ChannelSupport>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("header", &self.header)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Routing failure.
///
/// `header` is kept when it could be parsed so diagnostics can name the
/// channel.
#[derive(Debug)]
pub struct ResolveError {
    pub header: Option<ChannelHeader>,
    pub cause: anyhow::Error,
}

impl ResolveError {
    pub fn new(header: Option<ChannelHeader>, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            header,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.cause)
    }
}

/// Looks up the support bundle for an envelope.
#[async_trait]
pub trait ChannelSupportRegistrar: Send + Sync {
    /// Return the channel header, the message kind and the channel's support
    /// bundle, or an error if the message cannot be processed directly.
    async fn broadcast_channel_support(&self, env: &Envelope) -> Result<Resolution, ResolveError>;
}

/// One client's bidirectional broadcast stream.
#[async_trait]
pub trait BroadcastStream: Send + Sync {
    /// Next envelope, or `None` once the client has closed its side.
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError>;

    async fn send(&mut self, response: BroadcastResponse) -> Result<(), TransportError>;

    /// Remote address for diagnostics.
    fn remote_addr(&self) -> String;

    /// Resolves once the connection is torn down.
    async fn cancelled(&self);
}
