//! Method handler registry.
//!
//! Populated once through [`crate::SessionBuilder`] and read-only afterwards,
//! so dispatch looks handlers up without any synchronization.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use cortex_acp_types::RequestId;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::HandlerError;
use crate::session::AcpSession;

/// Handler for an inbound request. The returned value becomes the response
/// `result`.
pub type RequestHandler =
    Arc<dyn Fn(Value, HandlerContext) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Handler for an inbound notification. Failures are logged and dropped.
pub type NotificationHandler =
    Arc<dyn Fn(Value, HandlerContext) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// A registered handler.
#[derive(Clone)]
pub enum Handler {
    Request(RequestHandler),
    Notification(NotificationHandler),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(_) => f.write_str("Handler::Request"),
            Self::Notification(_) => f.write_str("Handler::Notification"),
        }
    }
}

/// Immutable `method -> handler` map.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request handler. A later registration for the same method
    /// replaces the earlier one.
    pub fn insert_request<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |params, cx| handler(params, cx).boxed());
        self.handlers.insert(method.into(), Handler::Request(handler));
    }

    /// Register a notification handler.
    pub fn insert_notification<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: NotificationHandler = Arc::new(move |params, cx| handler(params, cx).boxed());
        self.handlers
            .insert(method.into(), Handler::Notification(handler));
    }

    /// Request handler for `method`, if one is registered.
    pub fn request(&self, method: &str) -> Option<&RequestHandler> {
        match self.handlers.get(method)? {
            Handler::Request(h) => Some(h),
            Handler::Notification(_) => None,
        }
    }

    /// Notification handler for `method`, if one is registered.
    pub fn notification(&self, method: &str) -> Option<&NotificationHandler> {
        match self.handlers.get(method)? {
            Handler::Notification(h) => Some(h),
            Handler::Request(_) => None,
        }
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// What a handler gets besides its params.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    session: AcpSession,
    request_id: Option<RequestId>,
    method: String,
    cancel: CancellationToken,
}

impl HandlerContext {
    pub(crate) fn new(
        session: AcpSession,
        request_id: Option<RequestId>,
        method: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            request_id,
            method: method.into(),
            cancel,
        }
    }

    /// The session the message arrived on. Handlers use it to call back into
    /// the peer, e.g. to stream `session/update` during a prompt turn.
    pub fn session(&self) -> &AcpSession {
        &self.session
    }

    /// Id of the inbound request; `None` for notifications.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Cooperative cancellation signal. Fires on a matching `session/cancel`
    /// (prompt turns only) or when the session closes.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the handler has been asked to stop.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}
