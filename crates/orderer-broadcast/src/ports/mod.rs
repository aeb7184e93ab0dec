//! Ports module for broadcast intake
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::BroadcastHandler;
pub use outbound::{
    BroadcastStream, ChannelSupport, ChannelSupportRegistrar, Consenter, Processor, Resolution,
    ResolveError,
};
