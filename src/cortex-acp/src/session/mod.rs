//! ACP session engine.
//!
//! An [`AcpSession`] turns a [`Transport`] into a request/response capable
//! peer connection: outbound calls are correlated through the pending table,
//! inbound messages are dispatched to registered handlers, and in the agent
//! role only one `session/prompt` turn may run at a time.

mod dispatch;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use cortex_acp_types::{JsonRpcNotification, JsonRpcRequest, Message, RequestId, Role};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::correlation::CorrelationIdGenerator;
use crate::error::{HandlerError, SessionError, TransportError};
use crate::pending::PendingRequests;
use crate::registry::{HandlerContext, HandlerRegistry};
use crate::transport::Transport;
use crate::turn::{ActivePrompt, TurnGuard};

/// Configures handlers and settings, then connects a session to a transport.
///
/// Handlers are fixed once [`SessionBuilder::connect`] returns.
pub struct SessionBuilder {
    role: Role,
    config: SessionConfig,
    handlers: HandlerRegistry,
}

impl SessionBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Timeout applied to every outbound request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_request_timeout(timeout);
        self
    }

    /// Register a handler for inbound requests to `method`.
    pub fn on_request<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handlers.insert_request(method, handler);
        self
    }

    /// Register a handler for inbound notifications to `method`.
    pub fn on_notification<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers.insert_notification(method, handler);
        self
    }

    /// Subscribe to and start `transport`, returning the live session.
    pub async fn connect<T>(self, transport: T) -> Result<AcpSession, TransportError>
    where
        T: Transport + 'static,
    {
        self.connect_shared(Arc::new(transport)).await
    }

    /// Like [`SessionBuilder::connect`], for a transport the caller keeps a
    /// handle to.
    pub async fn connect_shared(
        self,
        transport: Arc<dyn Transport>,
    ) -> Result<AcpSession, TransportError> {
        let (sink, inbound) = mpsc::unbounded_channel();
        transport.subscribe(sink)?;

        let inner = Arc::new(SessionInner {
            role: self.role,
            config: self.config,
            transport,
            handlers: self.handlers,
            pending: PendingRequests::new(),
            ids: CorrelationIdGenerator::new(),
            turn: TurnGuard::new(),
            closed: AtomicBool::new(false),
            inbound_open: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            done: CancellationToken::new(),
        });

        tokio::spawn(inbound_loop(Arc::downgrade(&inner), inbound));

        if let Err(e) = inner.transport.start().await {
            inner.teardown();
            return Err(e);
        }

        info!(
            role = %inner.role,
            prefix = inner.ids.prefix(),
            handlers = inner.handlers.len(),
            flavor = ?inner.transport.flavor(),
            "ACP session started"
        );
        Ok(AcpSession { inner })
    }
}

struct SessionInner {
    role: Role,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    handlers: HandlerRegistry,
    pending: PendingRequests,
    ids: CorrelationIdGenerator,
    turn: TurnGuard,
    closed: AtomicBool,
    inbound_open: AtomicBool,
    /// Cancelled on close; parent of every handler's token.
    shutdown: CancellationToken,
    /// Cancelled on close or when the inbound side ends.
    done: CancellationToken,
}

impl SessionInner {
    /// Shared cleanup for both close paths. Returns `false` if the session
    /// was already closed.
    fn teardown(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.turn.force_clear();
        let failed = self.pending.fail_all(|| SessionError::Terminated);
        self.shutdown.cancel();
        self.done.cancel();
        debug!(role = %self.role, failed, "Session state torn down");
        true
    }

    fn on_inbound_closed(&self) {
        self.inbound_open.store(false, Ordering::SeqCst);
        if !self.closed.load(Ordering::SeqCst) {
            let failed = self
                .pending
                .fail_all(|| SessionError::Transport(TransportError::Closed));
            info!(role = %self.role, failed, "Inbound stream ended");
        }
        self.done.cancel();
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.teardown() {
            self.transport.close();
        }
    }
}

/// A live ACP connection. Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct AcpSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for AcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpSession")
            .field("role", &self.inner.role)
            .field("prefix", &self.inner.ids.prefix())
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AcpSession {
    /// Start configuring a session that plays `role`.
    pub fn builder(role: Role) -> SessionBuilder {
        SessionBuilder {
            role,
            config: SessionConfig::default(),
            handlers: HandlerRegistry::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Random prefix of this session's outbound request ids.
    pub fn correlation_prefix(&self) -> &str {
        self.inner.ids.prefix()
    }

    /// Outbound requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether a response is still expected for `id`.
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.inner.pending.contains(id)
    }

    /// The prompt turn currently holding the single-turn guard.
    pub fn active_prompt(&self) -> Option<Arc<ActivePrompt>> {
        self.inner.turn.active()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Protocol versions the underlying transport can carry.
    pub fn supported_protocol_versions(&self) -> Vec<u16> {
        self.inner.transport.supported_protocol_versions()
    }

    /// Resolves once the session is closed or the peer has gone away.
    pub async fn closed(&self) {
        self.inner.done.cancelled().await;
    }

    /// Call `method` on the peer and decode its result as `R`.
    ///
    /// Use `R = ()` for methods whose result is void (`null`).
    pub async fn send_request<P, R>(&self, method: &str, params: P) -> Result<R, SessionError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(|source| SessionError::InvalidParams {
            method: method.to_string(),
            source,
        })?;
        let result = self.send_request_value(method, params).await?;
        serde_json::from_value(result).map_err(|source| SessionError::InvalidResult {
            method: method.to_string(),
            source,
        })
    }

    /// Call `method` on the peer with raw JSON params. `Value::Null` params
    /// are omitted from the request.
    pub async fn send_request_value(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Terminated);
        }
        if !inner.inbound_open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed.into());
        }

        let id = inner.ids.next_id();
        let rx = inner.pending.register(id.clone(), method);

        // A close racing with the registration may have drained the table
        // before the entry landed.
        if inner.closed.load(Ordering::SeqCst) {
            inner.pending.remove(&id);
            return Err(SessionError::Terminated);
        }
        if !inner.inbound_open.load(Ordering::SeqCst) {
            inner.pending.remove(&id);
            return Err(TransportError::Closed.into());
        }

        let mut request = JsonRpcRequest::new(id.clone(), method);
        if !params.is_null() {
            request = request.with_params(params);
        }

        debug!(role = %inner.role, method, %id, "Sending request");
        if let Err(e) = inner.transport.send(Message::Request(request)).await {
            inner.pending.remove(&id);
            warn!(method, %id, error = %e, "Failed to send request");
            return Err(e.into());
        }

        let timeout = inner.config.request_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SessionError::Terminated),
            Err(_) => {
                if inner.pending.remove(&id).is_some() {
                    warn!(method, %id, ?timeout, "Request timed out");
                }
                Err(SessionError::Timeout {
                    method: method.to_string(),
                    id,
                    timeout,
                })
            }
        }
    }

    /// Send a notification. No response is expected; send failures are
    /// returned to the caller and not retried.
    pub async fn send_notification<P>(&self, method: &str, params: P) -> Result<(), SessionError>
    where
        P: Serialize,
    {
        if self.is_closed() {
            return Err(SessionError::Terminated);
        }
        let params = serde_json::to_value(params).map_err(|source| SessionError::InvalidParams {
            method: method.to_string(),
            source,
        })?;

        let mut notification = JsonRpcNotification::new(method);
        if !params.is_null() {
            notification = notification.with_params(params);
        }

        debug!(role = %self.inner.role, method, "Sending notification");
        self.inner
            .transport
            .send(Message::Notification(notification))
            .await?;
        Ok(())
    }

    /// Fail every outstanding call, clear the turn guard, then close the
    /// transport and wait for it (bounded by the shutdown timeout).
    ///
    /// Closing an already closed session is a no-op.
    pub async fn close_gracefully(&self) -> Result<(), SessionError> {
        if !self.inner.teardown() {
            return Ok(());
        }

        let timeout = self.inner.config.shutdown_timeout();
        let result =
            tokio::time::timeout(timeout, self.inner.transport.close_gracefully()).await;
        match result {
            Ok(Ok(())) => {
                info!(role = %self.inner.role, "ACP session closed");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Transport failed to close gracefully");
                self.inner.transport.close();
                Err(e.into())
            }
            Err(_) => {
                warn!(?timeout, "Transport did not close in time, closing immediately");
                self.inner.transport.close();
                Ok(())
            }
        }
    }

    /// Same cleanup as [`AcpSession::close_gracefully`] without waiting for
    /// the transport.
    pub fn close(&self) {
        if self.inner.teardown() {
            self.inner.transport.close();
            info!(role = %self.inner.role, "ACP session closed");
        }
    }
}

async fn inbound_loop(session: Weak<SessionInner>, mut inbound: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = inbound.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };
        dispatch::dispatch(AcpSession { inner }, message);
    }
    if let Some(inner) = session.upgrade() {
        inner.on_inbound_closed();
    }
}
