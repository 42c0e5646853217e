//! ACP (Agent Client Protocol) session engine for Cortex.
//!
//! Turns a transport into a typed, concurrent peer connection:
//! - Request/response correlation with per-request timeouts
//! - Concurrent dispatch of inbound requests and notifications
//! - Single active prompt turn per session in the agent role
//! - Graceful and immediate shutdown that never leaves a caller hanging
//!
//! # Example
//! ```rust,no_run
//! use cortex_acp::{AcpSession, ChannelTransport, Role};
//! use serde_json::{Value, json};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let (client_end, agent_end) = ChannelTransport::pair();
//!
//! let _agent = AcpSession::builder(Role::Agent)
//!     .on_request("echo", |params, _cx| async move { Ok(params) })
//!     .connect(agent_end)
//!     .await?;
//! let client = AcpSession::builder(Role::Client).connect(client_end).await?;
//!
//! let reply: Value = client.send_request("echo", json!({"x": 1})).await?;
//! assert_eq!(reply, json!({"x": 1}));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlation;
pub mod echo;
pub mod error;
pub mod logging;
pub mod pending;
pub mod registry;
pub mod session;
pub mod transport;
pub mod turn;

pub use config::{ConfigError, SessionConfig};
pub use correlation::CorrelationIdGenerator;
pub use echo::{EchoAgent, StopReason};
pub use error::{HandlerError, SessionError, TransportError};
pub use pending::PendingRequests;
pub use registry::{
    Handler, HandlerContext, HandlerRegistry, NotificationHandler, RequestHandler,
};
pub use session::{AcpSession, SessionBuilder};
pub use transport::{ChannelTransport, InboundSink, StreamTransport, Transport, TransportFlavor};
pub use turn::{ActivePrompt, TurnGuard, TurnPermit};

pub use cortex_acp_types::{
    ErrorCode, JsonRpcError, Message, PROTOCOL_VERSION, RequestId, Role, methods,
};
