//! In-memory broadcast transport over tokio channels.
//!
//! [`channel_stream`] returns the server side ([`ChannelStream`]) and the
//! client side ([`ClientHandle`]) of one connection. Dropping the client
//! handle tears the connection down, which cancels whatever step the
//! session is blocked in.
//!
//! [`ChannelConnector`] dials such connections into a
//! [`BroadcastServer`](crate::application::BroadcastServer)'s incoming queue.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::config::BroadcastConfig;
use crate::domain::envelope::Envelope;
use crate::domain::errors::TransportError;
use crate::domain::response::BroadcastResponse;
use crate::ports::outbound::BroadcastStream;
use crate::shutdown::signalled;

type Inbound = Result<Envelope, TransportError>;

/// Create a connected stream pair with `buffer` slots in each direction.
pub fn channel_stream(addr: impl Into<String>, buffer: usize) -> (ChannelStream, ClientHandle) {
    let (request_tx, request_rx) = mpsc::channel(buffer);
    let (response_tx, response_rx) = mpsc::channel(buffer);

    let stream = ChannelStream {
        addr: addr.into(),
        inbound: request_rx,
        outbound: response_tx,
        shutdown: None,
    };
    let client = ClientHandle {
        requests: Some(request_tx),
        responses: response_rx,
    };
    (stream, client)
}

/// Dials in-memory connections for a server.
///
/// Every queue it creates, including the server's incoming queue, holds
/// `stream_buffer` items.
#[derive(Clone)]
pub struct ChannelConnector {
    incoming: mpsc::Sender<Box<dyn BroadcastStream>>,
    buffer: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ChannelConnector {
    /// Returns the connector and the queue to hand to `BroadcastServer::serve`.
    pub fn new(config: &BroadcastConfig) -> (Self, mpsc::Receiver<Box<dyn BroadcastStream>>) {
        let (incoming, accepted) = mpsc::channel(config.stream_buffer);
        let connector = Self {
            incoming,
            buffer: config.stream_buffer,
            shutdown: None,
        };
        (connector, accepted)
    }

    /// Build every connection [`with_shutdown`](ChannelStream::with_shutdown).
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Open a connection from `addr`. Fails once the server stopped accepting.
    pub async fn connect(&self, addr: impl Into<String>) -> Result<ClientHandle, TransportError> {
        let (mut stream, client) = channel_stream(addr, self.buffer);
        if let Some(shutdown) = &self.shutdown {
            stream = stream.with_shutdown(shutdown.clone());
        }
        self.incoming
            .send(Box::new(stream))
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(client)
    }
}

/// Server side of an in-memory connection.
pub struct ChannelStream {
    addr: String,
    inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::Sender<BroadcastResponse>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ChannelStream {
    /// Also tear the connection down when `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }
}

async fn host_shutdown(shutdown: &Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => signalled(&mut rx.clone()).await,
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl BroadcastStream for ChannelStream {
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        let next = tokio::select! {
            biased;
            _ = host_shutdown(&self.shutdown) => {
                return Err(TransportError::Reset("server shutting down".into()));
            }
            next = self.inbound.recv() => next,
        };

        match next {
            Some(Ok(env)) => Ok(Some(env)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send(&mut self, response: BroadcastResponse) -> Result<(), TransportError> {
        self.outbound
            .send(response)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn remote_addr(&self) -> String {
        self.addr.clone()
    }

    async fn cancelled(&self) {
        tokio::select! {
            _ = self.outbound.closed() => {}
            _ = host_shutdown(&self.shutdown) => {}
        }
    }
}

/// Client side of an in-memory connection.
pub struct ClientHandle {
    requests: Option<mpsc::Sender<Inbound>>,
    responses: mpsc::Receiver<BroadcastResponse>,
}

impl ClientHandle {
    /// Submit an envelope.
    pub async fn send(&self, env: Envelope) -> Result<(), TransportError> {
        self.push(Ok(env)).await
    }

    /// Make the server's next receive fail with `err`.
    pub async fn inject_error(&self, err: TransportError) -> Result<(), TransportError> {
        self.push(Err(err)).await
    }

    /// Close the sending side. The server sees a clean end of stream once
    /// it has drained what was already sent.
    pub fn close_send(&mut self) {
        self.requests = None;
    }

    /// Next response, or `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<BroadcastResponse> {
        self.responses.recv().await
    }

    async fn push(&self, item: Inbound) -> Result<(), TransportError> {
        let requests = self.requests.as_ref().ok_or(TransportError::Closed)?;
        requests.send(item).await.map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_envelopes_and_responses_flow() {
        let (mut stream, mut client) = channel_stream("10.0.0.1:7050", 4);

        client.send(Envelope::new(vec![1], vec![])).await.unwrap();
        let env = stream.recv().await.unwrap().unwrap();
        assert_eq!(env.payload, vec![1]);

        stream.send(BroadcastResponse::success()).await.unwrap();
        assert_eq!(client.recv().await, Some(BroadcastResponse::success()));
        assert_eq!(stream.remote_addr(), "10.0.0.1:7050");
    }

    #[tokio::test]
    async fn test_close_send_is_clean_eof() {
        let (mut stream, mut client) = channel_stream("client", 4);
        client.close_send();

        assert_eq!(stream.recv().await, Ok(None));
        assert_eq!(
            client.send(Envelope::new(vec![], vec![])).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_injected_error_surfaces_on_recv() {
        let (mut stream, client) = channel_stream("client", 4);
        client
            .inject_error(TransportError::Io("bad frame".into()))
            .await
            .unwrap();

        assert_eq!(
            stream.recv().await,
            Err(TransportError::Io("bad frame".into()))
        );
    }

    #[tokio::test]
    async fn test_dropping_client_cancels_and_closes() {
        let (mut stream, client) = channel_stream("client", 4);
        drop(client);

        tokio::time::timeout(Duration::from_secs(1), stream.cancelled())
            .await
            .unwrap();
        assert_eq!(
            stream.send(BroadcastResponse::success()).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_host_shutdown_interrupts_recv() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stream, _client) = channel_stream("client", 4);
        let mut stream = stream.with_shutdown(shutdown_rx);

        let pending = tokio::spawn(async move { stream.recv().await });
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(TransportError::Reset(_))));
    }

    #[tokio::test]
    async fn test_host_shutdown_resolves_cancelled() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stream, _client) = channel_stream("client", 4);
        let stream = stream.with_shutdown(shutdown_rx);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), stream.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connector_queues_server_side() {
        let config = BroadcastConfig {
            stream_buffer: 2,
            ..Default::default()
        };
        let (connector, mut accepted) = ChannelConnector::new(&config);

        let mut client = connector.connect("10.0.0.7:7050").await.unwrap();
        let mut stream = accepted.recv().await.unwrap();
        assert_eq!(stream.remote_addr(), "10.0.0.7:7050");

        client.send(Envelope::new(vec![4], vec![])).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().unwrap().payload, vec![4]);
        stream.send(BroadcastResponse::success()).await.unwrap();
        assert_eq!(client.recv().await, Some(BroadcastResponse::success()));

        drop(accepted);
        assert!(matches!(
            connector.connect("10.0.0.8:7050").await,
            Err(TransportError::Closed)
        ));
    }
}
