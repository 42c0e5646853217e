//! Newline-delimited JSON over a byte stream pair.
//!
//! This is how editors talk to agents they launch: one JSON-RPC message per
//! line on stdin/stdout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use cortex_acp_types::{JsonRpcError, JsonRpcResponse, Message, codec};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{InboundSink, Transport, TransportFlavor};
use crate::config::DEFAULT_MAX_LINE_LENGTH;
use crate::error::TransportError;

const READ_CHUNK: usize = 8 * 1024;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
type SharedWriter = Arc<tokio::sync::Mutex<Option<BoxWriter>>>;

/// Line-delimited JSON transport over any `AsyncRead`/`AsyncWrite` pair.
pub struct StreamTransport {
    flavor: TransportFlavor,
    reader: Mutex<Option<BoxReader>>,
    writer: SharedWriter,
    sink: Mutex<Option<InboundSink>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
    max_line_length: usize,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("flavor", &self.flavor)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("max_line_length", &self.max_line_length)
            .finish_non_exhaustive()
    }
}

impl StreamTransport {
    pub fn new<R, W>(flavor: TransportFlavor, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            flavor,
            reader: Mutex::new(Some(Box::new(reader))),
            writer: Arc::new(tokio::sync::Mutex::new(Some(Box::new(writer)))),
            sink: Mutex::new(None),
            reader_task: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Agent side of an editor-launched process: read stdin, write stdout.
    pub fn stdio() -> Self {
        Self::new(
            TransportFlavor::Acceptor,
            tokio::io::stdin(),
            tokio::io::stdout(),
        )
    }

    /// Reject inbound lines longer than `max_line_length` bytes.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }
}

#[async_trait]
impl Transport for StreamTransport {
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
        let reader = self.reader.lock().take().ok_or(TransportError::Closed)?;
        self.started.store(true, Ordering::SeqCst);

        let task = tokio::spawn(read_loop(
            reader,
            sink,
            Arc::clone(&self.writer),
            self.shutdown.clone(),
            self.max_line_length,
        ));
        *self.reader_task.lock() = Some(task);
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let line = codec::encode(&message)?;
        trace!(kind = %message.kind(), "Writing message");
        write_line(&self.writer, line).await
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        // Mid-write the writer stays with the writing task; it is released
        // when the transport is dropped.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    async fn close_gracefully(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        let writer = self.writer.lock().await.take();
        self.shutdown.cancel();

        let task = self.reader_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        if let Some(mut writer) = writer {
            writer.flush().await?;
            writer.shutdown().await?;
        }
        Ok(())
    }
}

async fn write_line(writer: &SharedWriter, mut line: String) -> Result<(), TransportError> {
    line.push('\n');
    let mut guard = writer.lock().await;
    let writer = guard.as_mut().ok_or(TransportError::Closed)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn reply_with_error(writer: &SharedWriter, error: JsonRpcError) {
    let response: Message = JsonRpcResponse::error(None, error).into();
    let result = match codec::encode(&response) {
        Ok(line) => write_line(writer, line).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to report undecodable inbound line");
    }
}

/// An over-long line is answered with a parse error and discarded; reading
/// carries on with the next line.
async fn read_loop(
    mut reader: BoxReader,
    sink: InboundSink,
    writer: SharedWriter,
    shutdown: CancellationToken,
    max_line_length: usize,
) {
    let mut lines = LinesCodec::new_with_max_length(max_line_length);
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut eof = false;

    loop {
        let frame = if eof {
            lines.decode_eof(&mut buffer)
        } else {
            lines.decode(&mut buffer)
        };

        let line = match frame {
            Ok(Some(line)) => line,
            Ok(None) if eof => {
                debug!("Inbound stream reached EOF");
                break;
            }
            Ok(None) => {
                let read = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    read = reader.read_buf(&mut buffer) => read,
                };
                match read {
                    Ok(0) => eof = true,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Inbound read failed");
                        break;
                    }
                }
                continue;
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(max_line_length, "Inbound line exceeds maximum length");
                reply_with_error(
                    &writer,
                    JsonRpcError::parse_error(format!(
                        "Message exceeds maximum line length of {max_line_length} bytes"
                    )),
                )
                .await;
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                warn!(error = %e, "Inbound read failed");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match codec::decode(trimmed) {
            Ok(message) => {
                trace!(kind = %message.kind(), "Read message");
                if sink.send(message).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to decode inbound message");
                reply_with_error(&writer, e.to_rpc_error()).await;
            }
        }
    }
}
