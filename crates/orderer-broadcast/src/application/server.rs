//! Broadcast Server
//!
//! Hosts the session handler: one tokio task per accepted connection, a
//! bound on concurrent sessions, and a stop on shutdown that cancels every
//! live session.

use std::sync::Arc;

use orderer_telemetry::metrics::{self, ActiveSessionGuard};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::config::{BroadcastConfig, ConfigError};
use crate::domain::errors::BroadcastError;
use crate::domain::message::SessionEnd;
use crate::ports::inbound::BroadcastHandler;
use crate::ports::outbound::BroadcastStream;
use crate::shutdown::signalled as shutdown_signalled;

/// Tally of the sessions a server run handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeReport {
    pub accepted: usize,
    pub hangups: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl ServeReport {
    fn record(&mut self, joined: Result<Result<SessionEnd, BroadcastError>, JoinError>) {
        match joined {
            Ok(Ok(SessionEnd::Hangup)) => self.hangups += 1,
            Ok(Ok(SessionEnd::Rejected { .. })) => self.rejected += 1,
            Ok(Err(BroadcastError::Cancelled)) => self.cancelled += 1,
            Ok(Err(_)) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "Broadcast session task failed");
                self.failed += 1;
            }
        }
    }
}

/// Accepts broadcast connections and serves each on its own task.
pub struct BroadcastServer {
    handler: Arc<dyn BroadcastHandler>,
    config: BroadcastConfig,
}

impl BroadcastServer {
    pub fn new(
        handler: Arc<dyn BroadcastHandler>,
        config: BroadcastConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { handler, config })
    }

    /// Serve connections from `incoming` until it closes or `shutdown`
    /// turns true, then wait for the sessions still running.
    ///
    /// Shutdown also cancels live sessions at whatever step they are blocked
    /// in; they end with [`BroadcastError::Cancelled`] and no response.
    ///
    /// While `max_concurrent_sessions` sessions are live, no further
    /// connection is taken from `incoming`.
    pub async fn serve(
        &self,
        mut incoming: mpsc::Receiver<Box<dyn BroadcastStream>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ServeReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sessions));
        let mut sessions: JoinSet<Result<SessionEnd, BroadcastError>> = JoinSet::new();
        let mut report = ServeReport::default();

        info!(
            max_sessions = self.config.max_concurrent_sessions,
            "Broadcast server accepting connections"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => {
                    info!("Shutdown requested, no longer accepting broadcast connections");
                    break;
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    report.record(joined);
                }
                next = incoming.recv(), if semaphore.available_permits() > 0 => {
                    let Some(stream) = next else {
                        info!("Connection source closed");
                        break;
                    };
                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(e) => {
                            error!(error = %e, "Session limiter unavailable");
                            break;
                        }
                    };
                    report.accepted += 1;
                    sessions.spawn(run_session(
                        self.handler.clone(),
                        stream,
                        shutdown.clone(),
                        permit,
                    ));
                }
            }
        }

        while let Some(joined) = sessions.join_next().await {
            report.record(joined);
        }

        info!(
            accepted = report.accepted,
            hangups = report.hangups,
            rejected = report.rejected,
            cancelled = report.cancelled,
            failed = report.failed,
            "Broadcast server stopped"
        );

        report
    }
}

async fn run_session(
    handler: Arc<dyn BroadcastHandler>,
    mut stream: Box<dyn BroadcastStream>,
    mut shutdown: watch::Receiver<bool>,
    _permit: tokio::sync::OwnedSemaphorePermit,
) -> Result<SessionEnd, BroadcastError> {
    let _active = ActiveSessionGuard::new();
    let addr = stream.remote_addr();

    // Dropping the handler future abandons the blocked step.
    let result = tokio::select! {
        biased;
        _ = shutdown_signalled(&mut shutdown) => Err(BroadcastError::Cancelled),
        result = handler.handle(stream.as_mut()) => result,
    };

    let outcome = match &result {
        Ok(end) => {
            info!(addr = %addr, outcome = end.label(), "Broadcast session finished");
            end.label()
        }
        Err(BroadcastError::Cancelled) => {
            info!(addr = %addr, "Broadcast session cancelled");
            "cancelled"
        }
        Err(e) => {
            warn!(addr = %addr, error = %e, "Broadcast session ended with transport error");
            "transport_error"
        }
    };
    metrics::record_session(outcome);

    result
}
