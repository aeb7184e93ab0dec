//! Error types for broadcast intake
//!
//! Collaborator failures travel as [`anyhow::Error`] so that processors and
//! consenters can add context freely; [`classify_error`] looks through that
//! context to the root cause when choosing a wire status.

use thiserror::Error;

use super::response::Status;

/// Rejections raised by message processing that the classifier recognises.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// The envelope names a channel this orderer does not serve
    #[error("channel does not exist")]
    ChannelDoesNotExist,

    /// The submitter is not authorized to write to the channel
    #[error("permission denied")]
    PermissionDenied,

    /// The header type cannot be submitted by clients
    #[error("message of type {0} cannot be broadcast directly")]
    UnsupportedHeaderType(String),

    /// The envelope payload could not be decoded
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Any other validation failure
    #[error("{0}")]
    Rejected(String),
}

/// Envelope encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// Failures of the client connection itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is gone
    #[error("connection closed")]
    Closed,

    #[error("i/o error: {0}")]
    Io(String),

    #[error("stream reset: {0}")]
    Reset(String),
}

/// Errors that end a broadcast session abnormally.
///
/// Rejections are not errors at this level: they are answered on the wire
/// and the session ends successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("error reading from client: {0}")]
    Recv(#[source] TransportError),

    #[error("error sending to client: {0}")]
    Send(#[source] TransportError),

    /// The connection was torn down while a step was blocked
    #[error("session cancelled by connection teardown")]
    Cancelled,
}

/// Map a processing failure to its wire status.
///
/// Only [`ProcessorError::ChannelDoesNotExist`] and
/// [`ProcessorError::PermissionDenied`] get a distinguished status; every
/// other cause is a `BAD_REQUEST`.
pub fn classify_error(err: &anyhow::Error) -> Status {
    match err.root_cause().downcast_ref::<ProcessorError>() {
        Some(ProcessorError::ChannelDoesNotExist) => Status::NotFound,
        Some(ProcessorError::PermissionDenied) => Status::Forbidden,
        _ => Status::BadRequest,
    }
}
