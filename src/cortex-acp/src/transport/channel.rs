//! In-process transport over unbounded channels.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cortex_acp_types::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{InboundSink, Transport, TransportFlavor};
use crate::error::TransportError;

/// One end of an in-process connection. Create both ends with
/// [`ChannelTransport::pair`].
#[derive(Debug)]
pub struct ChannelTransport {
    flavor: TransportFlavor,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    sink: Mutex<Option<InboundSink>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl ChannelTransport {
    /// Connected `(initiator, acceptor)` ends.
    pub fn pair() -> (Self, Self) {
        let (to_acceptor, from_initiator) = mpsc::unbounded_channel();
        let (to_initiator, from_acceptor) = mpsc::unbounded_channel();
        (
            Self::new(TransportFlavor::Initiator, to_acceptor, from_acceptor),
            Self::new(TransportFlavor::Acceptor, to_initiator, from_initiator),
        )
    }

    fn new(
        flavor: TransportFlavor,
        outgoing: mpsc::UnboundedSender<Message>,
        incoming: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            flavor,
            outgoing: Mutex::new(Some(outgoing)),
            incoming: Mutex::new(Some(incoming)),
            sink: Mutex::new(None),
            pump: Mutex::new(None),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    fn shut(&self) -> Option<JoinHandle<()>> {
        // Dropping the sender lets the peer drain what was sent, then see EOF.
        self.outgoing.lock().take();
        self.shutdown.cancel();
        self.pump.lock().take()
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn flavor(&self) -> TransportFlavor {
        self.flavor
    }

    fn subscribe(&self, sink: InboundSink) -> Result<(), TransportError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn start(&self) -> Result<(), TransportError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }
        let sink = self.sink.lock().take().ok_or(TransportError::NoSubscriber)?;
        self.started.store(true, Ordering::SeqCst);
        let mut incoming = self.incoming.lock().take().ok_or(TransportError::Closed)?;

        let shutdown = self.shutdown.clone();
        let flavor = self.flavor;
        let pump = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    message = incoming.recv() => message,
                };
                let Some(message) = message else {
                    break;
                };
                if sink.send(message).is_err() {
                    break;
                }
            }
            debug!(?flavor, "Channel transport inbound ended");
        });
        *self.pump.lock() = Some(pump);
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        let outgoing = self.outgoing.lock();
        let tx = outgoing.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.shut();
    }

    async fn close_gracefully(&self) -> Result<(), TransportError> {
        if let Some(pump) = self.shut() {
            let _ = pump.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_acp_types::JsonRpcNotification;

    fn note(method: &str) -> Message {
        JsonRpcNotification::new(method).into()
    }

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (a, b) = ChannelTransport::pair();
        assert_eq!(a.flavor(), TransportFlavor::Initiator);
        assert_eq!(b.flavor(), TransportFlavor::Acceptor);

        let (a_sink, mut a_rx) = mpsc::unbounded_channel();
        let (b_sink, mut b_rx) = mpsc::unbounded_channel();
        a.subscribe(a_sink).expect("subscribe");
        b.subscribe(b_sink).expect("subscribe");
        a.start().await.expect("start");
        b.start().await.expect("start");

        a.send(note("ping")).await.expect("send");
        b.send(note("pong")).await.expect("send");

        assert_eq!(b_rx.recv().await, Some(note("ping")));
        assert_eq!(a_rx.recv().await, Some(note("pong")));
    }

    #[tokio::test]
    async fn test_send_before_start() {
        let (a, _b) = ChannelTransport::pair();
        assert!(matches!(
            a.send(note("x")).await,
            Err(TransportError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_start_requires_subscriber() {
        let (a, _b) = ChannelTransport::pair();
        assert!(matches!(a.start().await, Err(TransportError::NoSubscriber)));
    }

    #[tokio::test]
    async fn test_close_ends_peer_inbound() {
        let (a, b) = ChannelTransport::pair();
        let (a_sink, _a_rx) = mpsc::unbounded_channel();
        let (b_sink, mut b_rx) = mpsc::unbounded_channel();
        a.subscribe(a_sink).expect("subscribe");
        b.subscribe(b_sink).expect("subscribe");
        a.start().await.expect("start");
        b.start().await.expect("start");

        a.send(note("last")).await.expect("send");
        a.close_gracefully().await.expect("close");

        assert_eq!(b_rx.recv().await, Some(note("last")));
        assert_eq!(b_rx.recv().await, None);
        assert!(matches!(a.send(note("x")).await, Err(TransportError::Closed)));
    }
}
