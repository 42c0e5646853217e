//! JSON codec for [`Message`].
//!
//! One message encodes to one line of compact JSON (serde_json escapes any
//! newline inside strings), which is what the line-delimited transports
//! expect.

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;
use crate::message::Message;

/// Errors produced while decoding or encoding a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input is not valid JSON, or a message failed to serialize.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level JSON value is not an object.
    #[error("Message is not a JSON object")]
    NotAnObject,

    /// `id` is neither a string nor an integer.
    #[error("Invalid request id: {0}")]
    InvalidId(String),

    /// `method` is not a string.
    #[error("Method must be a string")]
    InvalidMethod,

    /// The `error` member is not a valid error object.
    #[error("Invalid error object: {0}")]
    InvalidError(String),

    /// A response carries both `result` and `error`.
    #[error("Response carries both result and error")]
    AmbiguousResponse,

    /// None of `method`, `result`, `error` present.
    #[error("Unrecognized message shape")]
    UnrecognizedShape,
}

impl CodecError {
    /// JSON-RPC error to answer the peer with.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::Json(e) => JsonRpcError::parse_error(e.to_string()),
            other => JsonRpcError::invalid_request(other.to_string()),
        }
    }
}

/// Encode a message as a single line of JSON (without the trailing newline).
pub fn encode(message: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode and classify a message from JSON text.
pub fn decode(text: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    Message::from_value(value)
}
