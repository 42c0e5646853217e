//! Transport port consumed by the session engine.
//!
//! A transport moves already-classified [`Message`]s. Inbound messages are
//! pushed into the [`InboundSink`] registered with [`Transport::subscribe`];
//! dropping that sink tells the session the inbound side has ended.

mod channel;
mod stream;

use async_trait::async_trait;
use cortex_acp_types::{Message, PROTOCOL_VERSION};
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use channel::ChannelTransport;
pub use stream::StreamTransport;

/// Where inbound messages are delivered.
pub type InboundSink = mpsc::UnboundedSender<Message>;

/// Which side of the connection a transport represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFlavor {
    /// The side that opened the connection (typically the editor).
    Initiator,
    /// The side that was launched or connected to (typically the agent).
    Acceptor,
}

/// Send one message / receive a stream of messages.
#[async_trait]
pub trait Transport: Send + Sync {
    fn flavor(&self) -> TransportFlavor;

    /// Register the inbound sink. Must be called before [`Transport::start`].
    fn subscribe(&self, sink: InboundSink) -> Result<(), TransportError>;

    /// Begin delivering inbound messages.
    async fn start(&self) -> Result<(), TransportError>;

    /// Hand one message to the peer.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Close immediately without waiting for in-flight writes.
    fn close(&self);

    /// Flush pending writes and close, waiting for completion.
    async fn close_gracefully(&self) -> Result<(), TransportError>;

    /// ACP protocol versions this transport can carry.
    fn supported_protocol_versions(&self) -> Vec<u16> {
        vec![PROTOCOL_VERSION]
    }
}
