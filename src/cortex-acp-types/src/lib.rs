//! Cortex ACP Types - Agent Client Protocol envelope definitions.
//!
//! This crate provides the wire-level vocabulary shared by both ACP peers:
//! the JSON-RPC 2.0 envelope, the classified [`Message`] union, the method
//! name catalog, and a JSON codec. Domain payloads (content blocks, tool
//! calls, plans, ...) are carried as opaque [`serde_json::Value`]s.
//!
//! # Example
//! ```rust
//! use cortex_acp_types::{Message, codec, methods};
//!
//! let message = codec::decode(r#"{"jsonrpc":"2.0","id":"a1-1","method":"session/prompt","params":{}}"#)
//!     .expect("valid request");
//! assert!(matches!(message, Message::Request(ref r) if r.method == methods::SESSION_PROMPT));
//! ```

// ============================================================================
// Module declarations
// ============================================================================

mod jsonrpc;
mod message;
mod role;

/// JSON encoding and decoding of classified messages.
pub mod codec;

/// ACP method name constants.
pub mod methods;

// ============================================================================
// Protocol Version
// ============================================================================

/// ACP protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::CodecError;
pub use jsonrpc::{
    ErrorCode, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
pub use message::{Message, MessageKind};
pub use role::Role;
