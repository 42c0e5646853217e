//! Shared helpers for session integration tests.

#![allow(dead_code)]

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use cortex_acp::{
    AcpSession, ChannelTransport, InboundSink, Message, Role, SessionBuilder, Transport,
    TransportError, TransportFlavor,
};
use cortex_acp_types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, methods};
use serde_json::json;
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Raw peer
// =============================================================================

/// A hand-driven peer: tests decide exactly what goes on the wire.
pub struct RawPeer {
    transport: ChannelTransport,
    inbound: mpsc::UnboundedReceiver<Message>,
}

impl RawPeer {
    pub async fn start(transport: ChannelTransport) -> Self {
        let (sink, inbound) = mpsc::unbounded_channel();
        transport.subscribe(sink).expect("subscribe");
        transport.start().await.expect("start");
        Self { transport, inbound }
    }

    pub async fn send(&self, message: impl Into<Message>) {
        self.transport.send(message.into()).await.expect("raw send");
    }

    pub async fn recv(&mut self) -> Message {
        tokio::time::timeout(TEST_TIMEOUT, self.inbound.recv())
            .await
            .expect("timed out waiting for message")
            .expect("peer inbound closed")
    }

    pub async fn recv_request(&mut self) -> JsonRpcRequest {
        match self.recv().await {
            Message::Request(request) => request,
            other => panic!("expected request, got {other:?}"),
        }
    }

    pub async fn recv_response(&mut self) -> JsonRpcResponse {
        match self.recv().await {
            Message::Response(response) => response,
            other => panic!("expected response, got {other:?}"),
        }
    }

    /// Nothing arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(message) = tokio::time::timeout(window, self.inbound.recv()).await {
            panic!("unexpected message: {message:?}");
        }
    }
}

/// A session of `role` built by `configure`, wired to a [`RawPeer`].
pub async fn session_with_raw_peer(
    role: Role,
    configure: impl FnOnce(SessionBuilder) -> SessionBuilder,
) -> (AcpSession, RawPeer) {
    let (local, remote) = ChannelTransport::pair();
    let session = configure(AcpSession::builder(role))
        .connect(local)
        .await
        .expect("connect");
    (session, RawPeer::start(remote).await)
}

/// A connected client/agent pair.
pub async fn connected_pair(
    agent: impl FnOnce(SessionBuilder) -> SessionBuilder,
    client: impl FnOnce(SessionBuilder) -> SessionBuilder,
) -> (AcpSession, AcpSession) {
    let (client_end, agent_end) = ChannelTransport::pair();
    let agent = agent(AcpSession::builder(Role::Agent))
        .connect(agent_end)
        .await
        .expect("connect agent");
    let client = client(AcpSession::builder(Role::Client))
        .connect(client_end)
        .await
        .expect("connect client");
    (agent, client)
}

// =============================================================================
// Message builders
// =============================================================================

pub fn prompt_request(id: i64, session_id: &str) -> JsonRpcRequest {
    JsonRpcRequest::new(id, methods::SESSION_PROMPT).with_params(json!({
        "sessionId": session_id,
        "prompt": [{"type": "text", "text": "hello"}],
    }))
}

pub fn cancel_notification(session_id: &str) -> JsonRpcNotification {
    JsonRpcNotification::new(methods::SESSION_CANCEL).with_params(json!({ "sessionId": session_id }))
}

/// Poll `condition` until it holds, failing the test after [`TEST_TIMEOUT`].
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Failing transport
// =============================================================================

/// Accepts a subscriber, then fails every send.
pub struct FailingTransport {
    sink: parking_lot::Mutex<Option<InboundSink>>,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self {
            sink: parking_lot::Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for FailingTransport {
    fn flavor(&self) -> TransportFlavor {
        TransportFlavor::Initiator
    }

    fn subscribe(&self, sink: InboundSink) -> Result<(), TransportError> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, _message: Message) -> Result<(), TransportError> {
        Err(TransportError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "pipe closed",
        )))
    }

    fn close(&self) {
        self.sink.lock().take();
    }

    async fn close_gracefully(&self) -> Result<(), TransportError> {
        self.close();
        Ok(())
    }
}
