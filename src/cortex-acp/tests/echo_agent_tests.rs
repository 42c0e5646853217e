//! End-to-end tests for the echo agent.

mod common;

use std::time::Duration;

use cortex_acp::{
    AcpSession, EchoAgent, ErrorCode, PROTOCOL_VERSION, Role, SessionBuilder, StreamTransport,
    TransportFlavor,
};
use cortex_acp_types::methods;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use common::{TEST_TIMEOUT, connected_pair, wait_until};

/// Client builder that forwards every `session/update` to the returned channel.
fn collecting_updates(builder: SessionBuilder) -> (SessionBuilder, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let builder = builder.on_notification(methods::SESSION_UPDATE, move |params, _cx| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(params);
            Ok(())
        }
    });
    (builder, rx)
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(TEST_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for update")
        .expect("update channel closed")
}

async fn new_session(client: &AcpSession) -> String {
    let result = client
        .send_request_value(methods::SESSION_NEW, json!({"cwd": "/work", "mcpServers": []}))
        .await
        .expect("session/new");
    result["sessionId"]
        .as_str()
        .expect("sessionId")
        .to_string()
}

fn text_prompt(session_id: &str, texts: &[&str]) -> Value {
    let blocks: Vec<Value> = texts
        .iter()
        .map(|text| json!({"type": "text", "text": text}))
        .collect();
    json!({"sessionId": session_id, "prompt": blocks})
}

#[tokio::test]
async fn test_initialize_negotiates_protocol_version() {
    let (_agent, client) = connected_pair(|b| EchoAgent::new().register(b), |b| b).await;

    let result = client
        .send_request_value(
            methods::INITIALIZE,
            json!({"protocolVersion": 3, "clientCapabilities": {"fs": {"readTextFile": false}}}),
        )
        .await
        .expect("initialize");

    assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
    assert_eq!(result["authMethods"], json!([]));
    assert_eq!(result["agentCapabilities"]["loadSession"], json!(false));
}

#[tokio::test]
async fn test_prompt_streams_chunks_then_ends_turn() {
    let mut updates = None;
    let (_agent, client) = connected_pair(
        |b| EchoAgent::new().register(b),
        |b| {
            let (b, rx) = collecting_updates(b);
            updates = Some(rx);
            b
        },
    )
    .await;
    let mut updates = updates.expect("update receiver");

    let session_id = new_session(&client).await;
    let mut prompt = text_prompt(&session_id, &["hello", "world"]);
    prompt["prompt"]
        .as_array_mut()
        .expect("blocks")
        .insert(1, json!({"type": "image", "data": "", "mimeType": "image/png"}));

    let result = client
        .send_request_value(methods::SESSION_PROMPT, prompt)
        .await
        .expect("prompt");
    assert_eq!(result, json!({"stopReason": "end_turn"}));

    for expected in ["hello", "world"] {
        let update = next_update(&mut updates).await;
        assert_eq!(update["sessionId"], json!(session_id));
        assert_eq!(update["update"]["sessionUpdate"], json!("agent_message_chunk"));
        assert_eq!(update["update"]["content"]["text"], json!(expected));
    }
}

#[tokio::test]
async fn test_prompt_for_unknown_session_is_invalid_params() {
    let (_agent, client) = connected_pair(|b| EchoAgent::new().register(b), |b| b).await;

    let err = client
        .send_request_value(methods::SESSION_PROMPT, text_prompt("sess_missing", &["hi"]))
        .await
        .unwrap_err();

    let rpc = err.rpc_error().expect("protocol error");
    assert_eq!(rpc.code, ErrorCode::INVALID_PARAMS);
    assert!(rpc.message.contains("sess_missing"));
}

#[tokio::test]
async fn test_cancel_ends_turn_early() {
    let (agent, client) = connected_pair(
        |b| {
            EchoAgent::new()
                .with_chunk_delay(Duration::from_secs(2))
                .register(b)
        },
        |b| b,
    )
    .await;

    let session_id = new_session(&client).await;
    let prompt = {
        let client = client.clone();
        let params = text_prompt(&session_id, &["one", "two", "three"]);
        tokio::spawn(async move {
            client
                .send_request_value(methods::SESSION_PROMPT, params)
                .await
        })
    };

    wait_until(|| agent.active_prompt().is_some()).await;
    client
        .send_notification(methods::SESSION_CANCEL, json!({"sessionId": session_id}))
        .await
        .expect("cancel");

    let result = tokio::time::timeout(TEST_TIMEOUT, prompt)
        .await
        .expect("prompt did not finish")
        .expect("join")
        .expect("prompt");
    assert_eq!(result, json!({"stopReason": "cancelled"}));
    assert!(agent.active_prompt().is_none());
}

#[tokio::test]
async fn test_echo_over_byte_streams() {
    let (agent_io, client_io) = tokio::io::duplex(16 * 1024);
    let (agent_read, agent_write) = tokio::io::split(agent_io);
    let (client_read, client_write) = tokio::io::split(client_io);

    let agent = EchoAgent::new()
        .register(AcpSession::builder(Role::Agent))
        .connect(StreamTransport::new(
            TransportFlavor::Acceptor,
            agent_read,
            agent_write,
        ))
        .await
        .expect("connect agent");

    let (builder, mut updates) = collecting_updates(AcpSession::builder(Role::Client));
    let client = builder
        .connect(StreamTransport::new(
            TransportFlavor::Initiator,
            client_read,
            client_write,
        ))
        .await
        .expect("connect client");

    client
        .send_request_value(methods::INITIALIZE, json!({"protocolVersion": 1}))
        .await
        .expect("initialize");
    let session_id = new_session(&client).await;
    let result = client
        .send_request_value(methods::SESSION_PROMPT, text_prompt(&session_id, &["over the wire"]))
        .await
        .expect("prompt");
    assert_eq!(result["stopReason"], json!("end_turn"));

    let update = next_update(&mut updates).await;
    assert_eq!(update["update"]["content"]["text"], json!("over the wire"));

    client.close_gracefully().await.expect("close client");
    tokio::time::timeout(TEST_TIMEOUT, agent.closed())
        .await
        .expect("agent did not observe disconnect");
}
