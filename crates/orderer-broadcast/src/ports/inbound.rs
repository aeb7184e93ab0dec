//! Inbound Ports (Driving Ports / API)

use crate::domain::message::SessionEnd;
use crate::domain::errors::BroadcastError;
use crate::ports::outbound::BroadcastStream;
use async_trait::async_trait;

/// Serves broadcast connections.
#[async_trait]
pub trait BroadcastHandler: Send + Sync {
    /// Service one client connection until it closes or fails.
    ///
    /// Every received envelope is answered with exactly one response before
    /// the next one is read. A rejection is answered and then ends the
    /// session with `Ok`; only transport failures and cancellation surface
    /// as errors.
    async fn handle(&self, stream: &mut dyn BroadcastStream) -> Result<SessionEnd, BroadcastError>;
}
