//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-process implementations of the outbound ports: a channel-backed
//! transport, a channel registry, and a readiness gate consenters can
//! delegate to.

mod channel_stream;
mod readiness;
mod registry;

pub use channel_stream::{channel_stream, ChannelConnector, ChannelStream, ClientHandle};
pub use readiness::{ReadinessError, ReadinessGate, ReadinessState};
pub use registry::ChannelRegistry;
