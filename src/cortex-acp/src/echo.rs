//! Minimal echo agent.
//!
//! Serves just enough of the agent side of ACP to drive an editor end to end:
//! every text block of a prompt is streamed back as an agent message chunk.

use std::sync::Arc;
use std::time::Duration;

use cortex_acp_types::{JsonRpcError, PROTOCOL_VERSION, methods};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::HandlerError;
use crate::registry::HandlerContext;
use crate::session::SessionBuilder;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionParams {
    #[serde(default)]
    cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptParams {
    session_id: String,
    #[serde(default)]
    prompt: Vec<Value>,
}

/// Why a prompt turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    Cancelled,
}

/// Agent that echoes prompts back through `session/update`.
///
/// One agent serves one connection. Sessions created with `session/new` are
/// kept until the agent is dropped, since ACP has no request that ends a
/// session; register a fresh agent per connection.
#[derive(Debug, Default)]
pub struct EchoAgent {
    /// Grows with every `session/new` on this connection.
    sessions: DashSet<String>,
    chunk_delay: Duration,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between streamed chunks, which leaves room to cancel a turn.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Install the agent's handlers on `builder`.
    pub fn register(self, builder: SessionBuilder) -> SessionBuilder {
        let agent = Arc::new(self);

        let initialize = Arc::clone(&agent);
        let new_session = Arc::clone(&agent);
        let prompt = Arc::clone(&agent);

        builder
            .on_request(methods::INITIALIZE, move |params, _cx| {
                let agent = Arc::clone(&initialize);
                async move { agent.initialize(params) }
            })
            .on_request(methods::SESSION_NEW, move |params, _cx| {
                let agent = Arc::clone(&new_session);
                async move { agent.new_session(params) }
            })
            .on_request(methods::SESSION_PROMPT, move |params, cx| {
                let agent = Arc::clone(&prompt);
                async move { agent.prompt(params, cx).await }
            })
            .on_notification(methods::SESSION_CANCEL, |params, _cx| async move {
                debug!(
                    session_id = ?methods::session_id_param(Some(&params)),
                    "Cancel requested"
                );
                Ok(())
            })
    }

    fn initialize(&self, params: Value) -> Result<Value, HandlerError> {
        let params: InitializeParams = serde_json::from_value(params)?;
        let protocol_version = params.protocol_version.min(PROTOCOL_VERSION);
        info!(requested = params.protocol_version, protocol_version, "Initialize");

        Ok(json!({
            "protocolVersion": protocol_version,
            "agentCapabilities": {
                "loadSession": false,
                "promptCapabilities": {
                    "image": false,
                    "audio": false,
                    "embeddedContext": false,
                },
            },
            "authMethods": [],
        }))
    }

    fn new_session(&self, params: Value) -> Result<Value, HandlerError> {
        let params: NewSessionParams = if params.is_null() {
            NewSessionParams::default()
        } else {
            serde_json::from_value(params)?
        };
        let session_id = format!("sess_{}", uuid::Uuid::new_v4().simple());
        info!(session_id = %session_id, cwd = ?params.cwd, "New session");
        self.sessions.insert(session_id.clone());
        Ok(json!({ "sessionId": session_id }))
    }

    async fn prompt(&self, params: Value, cx: HandlerContext) -> Result<Value, HandlerError> {
        let params: PromptParams = serde_json::from_value(params)?;
        if !self.sessions.contains(&params.session_id) {
            return Err(
                JsonRpcError::invalid_params(format!("Unknown session: {}", params.session_id))
                    .into(),
            );
        }

        let reason = self.stream_back(&params, &cx).await?;
        debug!(session_id = %params.session_id, ?reason, "Prompt turn finished");
        Ok(json!({ "stopReason": reason }))
    }

    async fn stream_back(
        &self,
        params: &PromptParams,
        cx: &HandlerContext,
    ) -> Result<StopReason, HandlerError> {
        for block in &params.prompt {
            let Some(text) = text_of(block) else {
                continue;
            };

            if !self.chunk_delay.is_zero() {
                tokio::select! {
                    _ = cx.cancelled() => return Ok(StopReason::Cancelled),
                    _ = tokio::time::sleep(self.chunk_delay) => {}
                }
            }
            if cx.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            cx.session()
                .send_notification(
                    methods::SESSION_UPDATE,
                    json!({
                        "sessionId": params.session_id,
                        "update": {
                            "sessionUpdate": "agent_message_chunk",
                            "content": { "type": "text", "text": text },
                        },
                    }),
                )
                .await?;
        }

        if cx.is_cancelled() {
            Ok(StopReason::Cancelled)
        } else {
            Ok(StopReason::EndTurn)
        }
    }
}

fn text_of(block: &Value) -> Option<&str> {
    if block.get("type")?.as_str()? != "text" {
        return None;
    }
    block.get("text")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_of() {
        assert_eq!(text_of(&json!({"type": "text", "text": "hi"})), Some("hi"));
        assert_eq!(text_of(&json!({"type": "image", "data": "..."})), None);
        assert_eq!(text_of(&json!({"text": "untyped"})), None);
    }

    #[test]
    fn test_initialize_negotiates_down() {
        let agent = EchoAgent::new();
        let result = agent
            .initialize(json!({"protocolVersion": 7, "clientCapabilities": {}}))
            .expect("initialize");
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(result["authMethods"], json!([]));
    }

    #[test]
    fn test_initialize_rejects_bad_params() {
        let agent = EchoAgent::new();
        let err = agent.initialize(json!({"protocolVersion": "one"})).unwrap_err();
        assert_eq!(
            err.into_rpc_error().code,
            cortex_acp_types::ErrorCode::INVALID_PARAMS
        );
    }

    #[test]
    fn test_new_session_ids_are_unique() {
        let agent = EchoAgent::new();
        let a = agent.new_session(json!({"cwd": "/tmp", "mcpServers": []})).expect("new");
        let b = agent.new_session(Value::Null).expect("new");
        assert_ne!(a["sessionId"], b["sessionId"]);
        assert_eq!(agent.sessions.len(), 2);
    }

    #[test]
    fn test_sessions_are_scoped_to_one_agent() {
        let first = EchoAgent::new();
        let id = first.new_session(Value::Null).expect("new")["sessionId"]
            .as_str()
            .expect("sessionId")
            .to_string();
        assert!(first.sessions.contains(&id));

        let second = EchoAgent::new();
        assert!(second.sessions.is_empty());
        assert!(!second.sessions.contains(&id));
    }

    #[test]
    fn test_stop_reason_wire_names() {
        assert_eq!(serde_json::to_value(StopReason::EndTurn).expect("ser"), json!("end_turn"));
        assert_eq!(serde_json::to_value(StopReason::Cancelled).expect("ser"), json!("cancelled"));
    }
}
