//! Broadcast Service
//!
//! Serves one client connection at a time per call:
//! 1. Receive an envelope
//! 2. Resolve its channel and message kind
//! 3. Wait for the consenter to accept messages
//! 4. Process locally (normal or config update)
//! 5. Submit to consensus
//! 6. Acknowledge, then loop
//!
//! Any failing step answers the envelope with a rejection and ends the
//! session.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use orderer_telemetry::metrics;
use tracing::{debug, warn};

use crate::domain::envelope::{ChannelHeader, Envelope};
use crate::domain::errors::{classify_error, BroadcastError};
use crate::domain::message::{MessageKind, Processed, SessionEnd};
use crate::domain::response::{BroadcastResponse, Status};
use crate::ports::inbound::BroadcastHandler;
use crate::ports::outbound::{BroadcastStream, ChannelSupport, ChannelSupportRegistrar};

/// Channel name logged when the header of a rejected message could not be parsed.
pub const MALFORMED_HEADER_CHANNEL: &str = "<malformed_header>";

/// Metrics label for messages rejected before classification.
const UNKNOWN_KIND: &str = "unknown";

/// An envelope that made it into consensus.
struct Accepted {
    header: ChannelHeader,
    kind: MessageKind,
}

/// Why an envelope did not make it into consensus.
enum Halt {
    /// Answer with this response, then end the session
    Reject {
        kind: &'static str,
        response: BroadcastResponse,
    },
    /// The connection went away under a blocked step
    Cancelled,
}

impl Halt {
    fn reject(kind: &'static str, status: Status, err: &anyhow::Error) -> Self {
        Halt::Reject {
            kind,
            response: BroadcastResponse::rejected(status, format!("{err:#}")),
        }
    }
}

/// Broadcast session handler.
pub struct BroadcastService {
    registrar: Arc<dyn ChannelSupportRegistrar>,
}

impl BroadcastService {
    pub fn new(registrar: Arc<dyn ChannelSupportRegistrar>) -> Self {
        Self { registrar }
    }

    /// Run `fut` unless the connection is torn down first.
    async fn guarded<T>(
        stream: &dyn BroadcastStream,
        fut: impl Future<Output = T> + Send,
    ) -> Result<T, Halt> {
        tokio::select! {
            biased;
            _ = stream.cancelled() => Err(Halt::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Drive one envelope through resolution, the readiness gate, local
    /// processing and consensus submission.
    async fn process_message(
        &self,
        env: Envelope,
        stream: &dyn BroadcastStream,
        addr: &str,
    ) -> Result<Accepted, Halt> {
        let resolution =
            match Self::guarded(stream, self.registrar.broadcast_channel_support(&env)).await? {
                Ok(resolution) => resolution,
                Err(e) => {
                    let channel_id = e
                        .header
                        .as_ref()
                        .map(|h| h.channel_id.as_str())
                        .unwrap_or(MALFORMED_HEADER_CHANNEL);
                    warn!(
                        channel = %channel_id,
                        addr = %addr,
                        error = %e,
                        "Could not get message processor for serving broadcast"
                    );
                    return Err(Halt::reject(
                        UNKNOWN_KIND,
                        classify_error(&e.cause),
                        &e.cause,
                    ));
                }
            };

        let header = resolution.header;
        let kind = resolution.kind;
        let support = resolution.support;
        let channel = header.channel_id.as_str();

        if let Err(e) = Self::guarded(stream, support.wait_ready()).await? {
            warn!(
                channel = %channel,
                addr = %addr,
                error = %format!("{e:#}"),
                "Rejecting broadcast of message with SERVICE_UNAVAILABLE: rejected by Consenter"
            );
            return Err(Halt::reject(kind.label(), Status::ServiceUnavailable, &e));
        }

        let processed = match kind {
            MessageKind::Normal => {
                debug!(
                    channel = %channel,
                    addr = %addr,
                    tx_id = %header.tx_id,
                    header_type = %header.header_type,
                    "Broadcast is processing normal message"
                );
                Self::guarded(stream, support.process_normal_msg(&env))
                    .await?
                    .map(|config_seq| Processed::Normal { config_seq })
            }
            MessageKind::ConfigUpdate => {
                debug!(
                    channel = %channel,
                    addr = %addr,
                    "Broadcast is processing config update message"
                );
                Self::guarded(stream, support.process_config_update_msg(&env))
                    .await?
                    .map(|(config, config_seq)| Processed::ConfigUpdate { config, config_seq })
            }
        };

        let processed = match processed {
            Ok(processed) => processed,
            Err(e) => {
                warn!(
                    channel = %channel,
                    addr = %addr,
                    kind = kind.label(),
                    error = %format!("{e:#}"),
                    "Rejecting broadcast of message because of error"
                );
                return Err(Halt::reject(kind.label(), classify_error(&e), &e));
            }
        };

        self.submit(support.as_ref(), env, processed, stream, channel, addr)
            .await?;

        debug!(
            channel = %channel,
            addr = %addr,
            header_type = %header.header_type,
            "Broadcast has successfully enqueued message"
        );

        Ok(Accepted { header, kind })
    }

    /// Hand a processed message to the matching consensus operation.
    async fn submit(
        &self,
        support: &dyn ChannelSupport,
        env: Envelope,
        processed: Processed,
        stream: &dyn BroadcastStream,
        channel: &str,
        addr: &str,
    ) -> Result<(), Halt> {
        let kind = processed.kind();
        debug!(
            channel = %channel,
            addr = %addr,
            kind = kind.label(),
            config_seq = processed.config_seq(),
            "Submitting message to consensus"
        );
        let started = Instant::now();

        let (result, operation) = match processed {
            Processed::Normal { config_seq } => (
                Self::guarded(stream, support.order(env, config_seq)).await?,
                "Order",
            ),
            Processed::ConfigUpdate { config, config_seq } => (
                Self::guarded(stream, support.configure(config, config_seq)).await?,
                "Configure",
            ),
        };

        metrics::observe_submit(kind.label(), started.elapsed().as_secs_f64());

        result.map_err(|e| {
            warn!(
                channel = %channel,
                addr = %addr,
                operation,
                error = %format!("{e:#}"),
                "Rejecting broadcast of message with SERVICE_UNAVAILABLE: rejected by consensus"
            );
            Halt::reject(kind.label(), Status::ServiceUnavailable, &e)
        })
    }
}

#[async_trait]
impl BroadcastHandler for BroadcastService {
    async fn handle(&self, stream: &mut dyn BroadcastStream) -> Result<SessionEnd, BroadcastError> {
        let addr = stream.remote_addr();
        debug!(addr = %addr, "Starting new broadcast loop");

        loop {
            let env = match stream.recv().await {
                Ok(Some(env)) => env,
                Ok(None) => {
                    debug!(addr = %addr, "Received EOF, hangup");
                    return Ok(SessionEnd::Hangup);
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Error reading from client");
                    return Err(BroadcastError::Recv(e));
                }
            };

            match self.process_message(env, &*stream, &addr).await {
                Ok(accepted) => {
                    if let Err(e) = stream.send(BroadcastResponse::success()).await {
                        warn!(
                            channel = %accepted.header.channel_id,
                            addr = %addr,
                            error = %e,
                            "Error sending to client"
                        );
                        return Err(BroadcastError::Send(e));
                    }
                    metrics::record_message(accepted.kind.label(), Status::Success.name());
                }
                Err(Halt::Reject { kind, response }) => {
                    let status = response.status;
                    if let Err(e) = stream.send(response).await {
                        warn!(addr = %addr, error = %e, "Error sending rejection to client");
                        return Err(BroadcastError::Send(e));
                    }
                    metrics::record_message(kind, status.name());
                    return Ok(SessionEnd::Rejected { status });
                }
                Err(Halt::Cancelled) => {
                    debug!(addr = %addr, "Connection torn down while processing, abandoning message");
                    return Err(BroadcastError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::HeaderType;
    use crate::domain::errors::{ProcessorError, TransportError};
    use crate::ports::outbound::mocks::{
        MockRegistrar, MockSupport, ResolveFailure, ScriptedStream, SupportCall,
    };

    fn service_for(support: Arc<MockSupport>, kind: MessageKind) -> BroadcastService {
        BroadcastService::new(Arc::new(MockRegistrar::new(support, kind)))
    }

    #[tokio::test]
    async fn test_normal_message_is_acknowledged() {
        let support = Arc::new(MockSupport {
            config_seq: 5,
            ..Default::default()
        });
        let service = service_for(support.clone(), MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(1);

        let end = service.handle(&mut stream).await.unwrap();

        assert_eq!(end, SessionEnd::Hangup);
        assert_eq!(stream.sent, vec![BroadcastResponse::success()]);
        assert_eq!(
            support.calls(),
            vec![
                SupportCall::WaitReady,
                SupportCall::ProcessNormal,
                SupportCall::Order { config_seq: 5 },
            ]
        );
    }

    #[tokio::test]
    async fn test_one_response_per_envelope_in_order() {
        let support = Arc::new(MockSupport::default());
        let service = service_for(support.clone(), MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(3);

        service.handle(&mut stream).await.unwrap();

        assert_eq!(stream.sent.len(), 3);
        assert!(stream.sent.iter().all(|r| r.status == Status::Success));
        // three envelopes plus the final close
        assert_eq!(stream.recv_calls, 4);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let registrar = MockRegistrar::failing(ResolveFailure {
            header: Some(ChannelHeader::new(HeaderType::Message, "nochannel", "tx-1")),
            cause: ProcessorError::ChannelDoesNotExist,
            context: Some("routing to channel nochannel".into()),
        });
        let service = BroadcastService::new(Arc::new(registrar));
        let mut stream = ScriptedStream::with_envelopes(2);

        let end = service.handle(&mut stream).await.unwrap();

        assert_eq!(
            end,
            SessionEnd::Rejected {
                status: Status::NotFound
            }
        );
        assert_eq!(stream.sent.len(), 1);
        assert_eq!(stream.sent[0].status, Status::NotFound);
        assert_eq!(
            stream.sent[0].info,
            "routing to channel nochannel: channel does not exist"
        );
        // the second envelope is never read
        assert_eq!(stream.recv_calls, 1);
    }

    #[tokio::test]
    async fn test_malformed_header_is_bad_request() {
        let registrar = MockRegistrar::failing(ResolveFailure {
            header: None,
            cause: ProcessorError::MalformedEnvelope("truncated".into()),
            context: None,
        });
        let service = BroadcastService::new(Arc::new(registrar));
        let mut stream = ScriptedStream::with_envelopes(1);

        service.handle(&mut stream).await.unwrap();

        assert_eq!(stream.sent[0].status, Status::BadRequest);
        assert_eq!(stream.sent[0].info, "malformed envelope: truncated");
    }

    #[tokio::test]
    async fn test_readiness_failure_skips_processing() {
        let support = Arc::new(MockSupport {
            ready_error: Some("paused for reconfig".into()),
            ..Default::default()
        });
        let service = service_for(support.clone(), MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(1);

        let end = service.handle(&mut stream).await.unwrap();

        assert_eq!(
            end,
            SessionEnd::Rejected {
                status: Status::ServiceUnavailable
            }
        );
        assert_eq!(
            stream.sent,
            vec![BroadcastResponse::rejected(
                Status::ServiceUnavailable,
                "paused for reconfig"
            )]
        );
        assert_eq!(support.calls(), vec![SupportCall::WaitReady]);
    }

    #[tokio::test]
    async fn test_processing_failure_skips_submission() {
        let support = Arc::new(MockSupport {
            process_error: Some(ProcessorError::PermissionDenied),
            ..Default::default()
        });
        let service = service_for(support.clone(), MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(1);

        service.handle(&mut stream).await.unwrap();

        assert_eq!(stream.sent[0].status, Status::Forbidden);
        assert_eq!(stream.sent[0].info, "permission denied");
        assert_eq!(
            support.calls(),
            vec![SupportCall::WaitReady, SupportCall::ProcessNormal]
        );
    }

    #[tokio::test]
    async fn test_config_update_submits_rewritten_envelope() {
        let rewritten = Envelope::new(b"rewritten".to_vec(), vec![]);
        let support = Arc::new(MockSupport {
            config_seq: 7,
            rewritten: Some(rewritten.clone()),
            ..Default::default()
        });
        let service = service_for(support.clone(), MessageKind::ConfigUpdate);
        let mut stream = ScriptedStream::with_envelopes(1);

        service.handle(&mut stream).await.unwrap();

        assert_eq!(stream.sent, vec![BroadcastResponse::success()]);
        assert_eq!(
            support.calls(),
            vec![
                SupportCall::WaitReady,
                SupportCall::ProcessConfigUpdate,
                SupportCall::Configure {
                    config: rewritten,
                    config_seq: 7
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_configure_failure_is_service_unavailable() {
        let support = Arc::new(MockSupport {
            config_seq: 7,
            submit_error: Some("chain busy".into()),
            ..Default::default()
        });
        let service = service_for(support.clone(), MessageKind::ConfigUpdate);
        let mut stream = ScriptedStream::with_envelopes(1);

        let end = service.handle(&mut stream).await.unwrap();

        assert_eq!(
            end,
            SessionEnd::Rejected {
                status: Status::ServiceUnavailable
            }
        );
        assert_eq!(
            stream.sent,
            vec![BroadcastResponse::rejected(
                Status::ServiceUnavailable,
                "chain busy"
            )]
        );
        assert!(!support
            .calls()
            .iter()
            .any(|c| matches!(c, SupportCall::Order { .. })));
    }

    #[tokio::test]
    async fn test_order_failure_is_service_unavailable() {
        let support = Arc::new(MockSupport {
            submit_error: Some("queue full".into()),
            ..Default::default()
        });
        let service = service_for(support.clone(), MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(1);

        service.handle(&mut stream).await.unwrap();

        assert_eq!(stream.sent[0].status, Status::ServiceUnavailable);
        assert!(!support
            .calls()
            .iter()
            .any(|c| matches!(c, SupportCall::Configure { .. })));
    }

    #[tokio::test]
    async fn test_immediate_eof_sends_nothing() {
        let support = Arc::new(MockSupport::default());
        let service = service_for(support.clone(), MessageKind::Normal);
        let mut stream = ScriptedStream::default();

        let end = service.handle(&mut stream).await.unwrap();

        assert_eq!(end, SessionEnd::Hangup);
        assert!(stream.sent.is_empty());
        assert!(support.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recv_error_mid_loop_is_returned() {
        let support = Arc::new(MockSupport::default());
        let service = service_for(support, MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(1);
        stream
            .inbound
            .push_back(Err(TransportError::Reset("peer reset".into())));
        stream
            .inbound
            .push_back(Ok(Envelope::new(vec![9], vec![])));

        let err = service.handle(&mut stream).await.unwrap_err();

        assert_eq!(
            err,
            BroadcastError::Recv(TransportError::Reset("peer reset".into()))
        );
        // only the envelope before the failure was answered
        assert_eq!(stream.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_returned() {
        let support = Arc::new(MockSupport::default());
        let service = service_for(support, MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(2);
        stream.send_error = Some(TransportError::Closed);

        let err = service.handle(&mut stream).await.unwrap_err();

        assert_eq!(err, BroadcastError::Send(TransportError::Closed));
        assert_eq!(stream.recv_calls, 1);
    }

    #[tokio::test]
    async fn test_failed_rejection_send_is_returned() {
        let support = Arc::new(MockSupport {
            ready_error: Some("halted".into()),
            ..Default::default()
        });
        let service = service_for(support, MessageKind::Normal);
        let mut stream = ScriptedStream::with_envelopes(1);
        stream.send_error = Some(TransportError::Io("broken pipe".into()));

        let err = service.handle(&mut stream).await.unwrap_err();

        assert_eq!(
            err,
            BroadcastError::Send(TransportError::Io("broken pipe".into()))
        );
    }

    #[tokio::test]
    async fn test_unsent_rejection_is_not_counted() {
        // the unknown/FORBIDDEN label pair is produced by no other test here
        let answered = || {
            metrics::BROADCAST_MESSAGES
                .with_label_values(&[UNKNOWN_KIND, Status::Forbidden.name()])
                .get()
        };
        let registrar = MockRegistrar::failing(ResolveFailure {
            header: None,
            cause: ProcessorError::PermissionDenied,
            context: None,
        });
        let service = BroadcastService::new(Arc::new(registrar));
        let mut stream = ScriptedStream::with_envelopes(1);
        stream.send_error = Some(TransportError::Closed);
        let before = answered();

        let err = service.handle(&mut stream).await.unwrap_err();

        assert_eq!(err, BroadcastError::Send(TransportError::Closed));
        assert_eq!(answered(), before);
    }
}
