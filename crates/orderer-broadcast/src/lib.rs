//! # Orderer Broadcast Intake
//!
//! Per-connection handler that accepts client-submitted envelopes, routes
//! each to its channel, and answers every envelope with exactly one status
//! response, in order.
//!
//! ## Architecture
//!
//! - **Domain**: Envelopes, channel headers, statuses, error classification
//! - **Ports**: Inbound (BroadcastHandler) and Outbound (ChannelSupportRegistrar,
//!   Processor, Consenter, BroadcastStream)
//! - **Application**: Session loop and the server hosting sessions
//! - **Adapters**: In-memory stream, channel registry, readiness gate
//!
//! ## Status mapping
//!
//! | Failure                          | Status                |
//! |----------------------------------|-----------------------|
//! | channel does not exist           | `NOT_FOUND`           |
//! | permission denied                | `FORBIDDEN`           |
//! | any other resolve/process error  | `BAD_REQUEST`         |
//! | consenter not ready / submission | `SERVICE_UNAVAILABLE` |

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
mod shutdown;

pub use adapters::{
    channel_stream, ChannelConnector, ChannelRegistry, ChannelStream, ClientHandle, ReadinessGate,
};
pub use application::{BroadcastServer, BroadcastService, ServeReport};
pub use config::{BroadcastConfig, ConfigError};
pub use domain::envelope::*;
pub use domain::errors::{
    classify_error, BroadcastError, EnvelopeError, ProcessorError, TransportError,
};
pub use domain::message::*;
pub use domain::response::*;
pub use ports::inbound::BroadcastHandler;
pub use ports::outbound::{
    BroadcastStream, ChannelSupport, ChannelSupportRegistrar, Consenter, Processor, Resolution,
    ResolveError,
};
