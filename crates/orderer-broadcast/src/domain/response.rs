//! Wire-level response vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response status sent back for every received envelope.
///
/// Numeric codes follow the HTTP convention used by the ordering service's
/// wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success,
    BadRequest,
    Forbidden,
    NotFound,
    ServiceUnavailable,
}

impl Status {
    /// Numeric wire code.
    pub fn code(&self) -> u16 {
        match self {
            Status::Success => 200,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::ServiceUnavailable => 503,
        }
    }

    /// Upper-snake wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::BadRequest => "BAD_REQUEST",
            Status::Forbidden => "FORBIDDEN",
            Status::NotFound => "NOT_FOUND",
            Status::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Acknowledgement or rejection of one envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: Status,
    /// Human-readable detail; empty on success
    pub info: String,
}

impl BroadcastResponse {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            info: String::new(),
        }
    }

    pub fn rejected(status: Status, info: impl Into<String>) -> Self {
        Self {
            status,
            info: info.into(),
        }
    }
}
