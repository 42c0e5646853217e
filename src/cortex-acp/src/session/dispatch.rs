//! Inbound message dispatch.
//!
//! Responses complete pending calls inline. Requests and notifications are
//! gated inline (turn guard, cancel) and then run on their own task, so a slow
//! or failing handler never holds up other messages.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use cortex_acp_types::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message, RequestId, Role,
    methods,
};
use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::AcpSession;
use crate::error::SessionError;
use crate::registry::HandlerContext;

pub(super) fn dispatch(session: AcpSession, message: Message) {
    match message {
        Message::Response(response) => dispatch_response(&session, response),
        Message::Request(request) => dispatch_request(session, request),
        Message::Notification(notification) => dispatch_notification(session, notification),
    }
}

fn dispatch_response(session: &AcpSession, response: JsonRpcResponse) {
    let Some(id) = response.id.clone() else {
        warn!(
            role = %session.role(),
            error = ?response.error,
            "Dropping response without id, probable bug in the sending peer"
        );
        return;
    };

    let outcome = response.into_result().map_err(SessionError::Protocol);
    if session.inner.pending.complete(&id, outcome) {
        debug!(%id, "Completed pending request");
    } else {
        warn!(%id, "Dropping response for unknown or expired request id");
    }
}

fn dispatch_request(session: AcpSession, request: JsonRpcRequest) {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;
    let inner = &session.inner;

    let Some(handler) = inner.handlers.request(&method).cloned() else {
        if is_misdirected(inner.role, &method) {
            warn!(role = %inner.role, method = %method, %id, "Peer called a method its own role serves");
        } else {
            debug!(role = %inner.role, method = %method, %id, "No handler registered");
        }
        let error = method_not_found(inner.role, &method);
        tokio::spawn(respond(session, id, method, Err(error)));
        return;
    };

    let params = params.unwrap_or(Value::Null);
    let cancel = inner.shutdown.child_token();

    let permit = if inner.role == Role::Agent && method == methods::SESSION_PROMPT {
        let session_id = methods::session_id_param(Some(&params))
            .unwrap_or_default()
            .to_string();
        match inner.turn.try_acquire(session_id.clone(), id.clone(), cancel.clone()) {
            Some(permit) => Some(permit),
            None => {
                warn!(session_id = %session_id, %id, "Rejecting prompt, a turn is already active");
                let error = JsonRpcError::turn_already_active(&session_id);
                tokio::spawn(respond(session, id, method, Err(error)));
                return;
            }
        }
    } else {
        None
    };

    let cx = HandlerContext::new(session.clone(), Some(id.clone()), method.clone(), cancel);
    tokio::spawn(async move {
        debug!(method = %method, %id, "Invoking request handler");
        let outcome = AssertUnwindSafe(async move { handler(params, cx).await })
            .catch_unwind()
            .await;
        drop(permit);

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(method = %method, %id, error = %e, "Request handler failed");
                Err(e.into_rpc_error())
            }
            Err(panic) => {
                error!(method = %method, %id, "Request handler panicked");
                Err(JsonRpcError::internal_error(panic_message(panic.as_ref())))
            }
        };
        respond(session, id, method, result).await;
    });
}

fn dispatch_notification(session: AcpSession, notification: JsonRpcNotification) {
    let JsonRpcNotification { method, params, .. } = notification;
    let inner = &session.inner;

    if inner.role == Role::Agent && method == methods::SESSION_CANCEL {
        if let Some(session_id) = methods::session_id_param(params.as_ref()) {
            if let Some(prompt) = inner.turn.cancel(session_id) {
                info!(session_id, id = %prompt.request_id, "Prompt turn cancelled by peer");
            }
        }
    }

    let Some(handler) = inner.handlers.notification(&method).cloned() else {
        debug!(role = %inner.role, method = %method, "Dropping notification without handler");
        return;
    };

    let params = params.unwrap_or(Value::Null);
    let cx = HandlerContext::new(session.clone(), None, method.clone(), inner.shutdown.child_token());
    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(async move { handler(params, cx).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(method = %method, error = %e, "Notification handler failed"),
            Err(panic) => error!(
                method = %method,
                panic = %panic_message(panic.as_ref()),
                "Notification handler panicked"
            ),
        }
    });
}

async fn respond(
    session: AcpSession,
    id: RequestId,
    method: String,
    result: Result<Value, JsonRpcError>,
) {
    let response = match result {
        Ok(value) => JsonRpcResponse::success(id.clone(), value),
        Err(error) => JsonRpcResponse::error(Some(id.clone()), error),
    };
    if let Err(e) = session.inner.transport.send(Message::Response(response)).await {
        warn!(method = %method, %id, error = %e, "Failed to send response");
    }
}

/// Method-not-found error, enriched with the capability a well-known
/// optional method depends on.
fn method_not_found(role: Role, method: &str) -> JsonRpcError {
    let error = JsonRpcError::method_not_found(method);
    match methods::capability_hint(role, method) {
        Some(capability) => error.with_data(json!({
            "reason": "capability not negotiated",
            "capability": capability,
        })),
        None => error,
    }
}

/// A catalog method that the peer's role serves, sent to us anyway.
fn is_misdirected(role: Role, method: &str) -> bool {
    methods::served_by(method) == Some(role.peer())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Handler panicked".to_string()
    }
}
