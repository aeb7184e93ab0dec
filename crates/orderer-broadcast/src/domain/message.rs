//! Per-message classification and processing results.

use super::envelope::Envelope;
use super::response::Status;

/// How the resolver classified an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Application transaction, ordered as-is
    Normal,
    /// Channel configuration update, rewritten before ordering
    ConfigUpdate,
}

impl MessageKind {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Normal => "normal",
            MessageKind::ConfigUpdate => "config_update",
        }
    }
}

/// Output of local processing, ready for consensus submission.
///
/// Each branch carries only the data its submission call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// The submitted envelope is ordered against `config_seq`
    Normal { config_seq: u64 },
    /// The rewritten configuration envelope is submitted against `config_seq`
    ConfigUpdate { config: Envelope, config_seq: u64 },
}

impl Processed {
    pub fn config_seq(&self) -> u64 {
        match self {
            Processed::Normal { config_seq } | Processed::ConfigUpdate { config_seq, .. } => {
                *config_seq
            }
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Processed::Normal { .. } => MessageKind::Normal,
            Processed::ConfigUpdate { .. } => MessageKind::ConfigUpdate,
        }
    }
}

/// How a session that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed its side of the stream
    Hangup,
    /// A rejection was delivered and the session was closed
    Rejected { status: Status },
}

impl SessionEnd {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SessionEnd::Hangup => "hangup",
            SessionEnd::Rejected { .. } => "rejected",
        }
    }
}
