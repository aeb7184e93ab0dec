//! Envelope and channel header types.
//!
//! An [`Envelope`] is what a client submits: an opaque payload plus a
//! signature over it. The payload decodes into a [`Payload`] whose
//! [`ChannelHeader`] names the target channel and the message type.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::EnvelopeError;

/// Signed message submitted by a client for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Encoded [`Payload`]
    pub payload: Vec<u8>,
    /// Signature over `payload` by the submitting identity
    pub signature: Vec<u8>,
}

impl Envelope {
    pub fn new(payload: Vec<u8>, signature: Vec<u8>) -> Self {
        Self { payload, signature }
    }

    /// Encode `payload` and wrap it with the given signature.
    pub fn from_payload(payload: &Payload, signature: Vec<u8>) -> Result<Self, EnvelopeError> {
        let bytes =
            bincode::serialize(payload).map_err(|e| EnvelopeError::Encode(e.to_string()))?;
        Ok(Self::new(bytes, signature))
    }

    /// Decode the payload.
    pub fn payload(&self) -> Result<Payload, EnvelopeError> {
        bincode::deserialize(&self.payload).map_err(|e| EnvelopeError::Decode(e.to_string()))
    }

    /// Decode the payload and return only its channel header.
    pub fn channel_header(&self) -> Result<ChannelHeader, EnvelopeError> {
        self.payload().map(|p| p.channel_header)
    }
}

/// Decoded envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub channel_header: ChannelHeader,
    pub data: Vec<u8>,
}

/// Message type carried in the channel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderType {
    /// Opaque application message
    Message,
    /// Full channel configuration (produced by the orderer, never broadcast)
    Config,
    /// Request to change a channel's configuration
    ConfigUpdate,
    /// Endorsed application transaction
    EndorserTransaction,
    /// Orderer-internal transaction wrapping a config
    OrdererTransaction,
    DeliverSeekInfo,
    ChaincodePackage,
}

impl HeaderType {
    /// Upper-snake wire name.
    pub fn name(&self) -> &'static str {
        match self {
            HeaderType::Message => "MESSAGE",
            HeaderType::Config => "CONFIG",
            HeaderType::ConfigUpdate => "CONFIG_UPDATE",
            HeaderType::EndorserTransaction => "ENDORSER_TRANSACTION",
            HeaderType::OrdererTransaction => "ORDERER_TRANSACTION",
            HeaderType::DeliverSeekInfo => "DELIVER_SEEK_INFO",
            HeaderType::ChaincodePackage => "CHAINCODE_PACKAGE",
        }
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata parsed out of an envelope's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHeader {
    pub header_type: HeaderType,
    pub channel_id: String,
    pub tx_id: String,
    /// Channel configuration sequence the client built the message against
    pub config_sequence: u64,
    /// Unix timestamp (seconds) set by the client
    pub timestamp: u64,
}

impl ChannelHeader {
    pub fn new(
        header_type: HeaderType,
        channel_id: impl Into<String>,
        tx_id: impl Into<String>,
    ) -> Self {
        Self {
            header_type,
            channel_id: channel_id.into(),
            tx_id: tx_id.into(),
            config_sequence: 0,
            timestamp: 0,
        }
    }
}
