//! Error types for the ACP session engine.

use std::time::Duration;

use cortex_acp_types::{CodecError, JsonRpcError, RequestId};
use thiserror::Error;

/// Failures of the underlying transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was closed, locally or by the peer.
    #[error("Transport is closed")]
    Closed,

    /// `send` was called before `start`.
    #[error("Transport not started")]
    NotStarted,

    /// `start` was called twice.
    #[error("Transport already started")]
    AlreadyStarted,

    /// No inbound sink was subscribed before `start`.
    #[error("No inbound subscriber registered")]
    NoSubscriber,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors returned to callers of [`crate::AcpSession`].
///
/// A failed `send_request` yields exactly one of `Protocol`, `Transport`,
/// `Timeout` or `Terminated`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer answered with a JSON-RPC error.
    #[error("Peer returned error {0}")]
    Protocol(JsonRpcError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No response arrived within the session's request timeout.
    #[error("Request '{method}' (id={id}) timed out after {timeout:?}")]
    Timeout {
        method: String,
        id: RequestId,
        timeout: Duration,
    },

    /// The session was closed while the call was outstanding, or before it
    /// was issued.
    #[error("Session terminated")]
    Terminated,

    /// Outbound params could not be serialized.
    #[error("Failed to serialize params for '{method}': {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The result did not match the caller's expected result type.
    #[error("Unexpected result for '{method}': {source}")]
    InvalidResult {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SessionError {
    /// The peer's error, when the peer answered with one.
    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }

    /// `true` for [`SessionError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// `true` for [`SessionError::Terminated`].
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Failure returned by a request or notification handler.
///
/// `Rpc` is sent to the peer verbatim; anything else becomes an
/// internal error (-32603) carrying the failure's message.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Rpc(#[from] JsonRpcError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Shortcut for an internal failure with a plain message.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal(anyhow::anyhow!("{message}"))
    }

    /// The JSON-RPC error to put on the wire.
    pub fn into_rpc_error(self) -> JsonRpcError {
        match self {
            Self::Rpc(e) => e,
            Self::Internal(e) => JsonRpcError::internal_error(format!("{e:#}")),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Rpc(JsonRpcError::invalid_params(e.to_string()))
    }
}

impl From<SessionError> for HandlerError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Protocol(rpc) => Self::Rpc(rpc),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}
