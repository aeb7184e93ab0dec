//! Readiness gate for consenter implementations.
//!
//! A consenter that needs to hold broadcast intake (while draining in-flight
//! messages or applying a reconfiguration) keeps a [`ReadinessGate`] and
//! delegates [`Consenter::wait_ready`](crate::ports::outbound::Consenter::wait_ready)
//! to it.
//!
//! ```text
//!        pause()            resume()
//! [Open] ───────→ [Paused] ─────────→ [Open]
//!    │                │
//!    └──── fail() ────┴──→ [Failed]   (wait_ready errors until resume())
//! ```

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Gate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    Open,
    Paused(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("{0}")]
    Failed(String),

    #[error("readiness gate closed")]
    Closed,
}

/// Shared backpressure gate.
pub struct ReadinessGate {
    state: watch::Sender<ReadinessState>,
}

impl ReadinessGate {
    /// A gate that starts open.
    pub fn open() -> Self {
        let (state, _) = watch::channel(ReadinessState::Open);
        Self { state }
    }

    /// Hold callers of [`wait_ready`](Self::wait_ready) until resumed.
    pub fn pause(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(reason = %reason, "Pausing broadcast intake");
        self.state.send_replace(ReadinessState::Paused(reason));
    }

    /// Release every waiting caller.
    pub fn resume(&self) {
        info!("Resuming broadcast intake");
        self.state.send_replace(ReadinessState::Open);
    }

    /// Fail current and future callers until resumed.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Broadcast intake failed");
        self.state.send_replace(ReadinessState::Failed(reason));
    }

    pub fn state(&self) -> ReadinessState {
        self.state.borrow().clone()
    }

    /// Return once the gate is open, or fail if it is failed.
    pub async fn wait_ready(&self) -> Result<(), ReadinessError> {
        let mut rx = self.state.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                ReadinessState::Open => return Ok(()),
                ReadinessState::Failed(reason) => return Err(ReadinessError::Failed(reason)),
                ReadinessState::Paused(reason) => {
                    debug!(reason = %reason, "Waiting for broadcast intake to resume");
                }
            }
            rx.changed().await.map_err(|_| ReadinessError::Closed)?;
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::open()
    }
}
