//! Classified ACP messages.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::codec::CodecError;
use crate::jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};

/// A single message exchanged between two ACP peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Expects exactly one [`Message::Response`] with the same id.
    Request(JsonRpcRequest),
    /// Fire-and-forget.
    Notification(JsonRpcNotification),
    /// Answer to a request, success or error.
    Response(JsonRpcResponse),
}

/// Shape of a [`Message`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Notification => write!(f, "notification"),
            Self::Response => write!(f, "response"),
        }
    }
}

impl Message {
    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request(_) => MessageKind::Request,
            Self::Notification(_) => MessageKind::Notification,
            Self::Response(_) => MessageKind::Response,
        }
    }

    /// Method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// Correlation id, for requests and responses that carry one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Notification(_) => None,
            Self::Response(r) => r.id.as_ref(),
        }
    }

    /// Classify a decoded JSON value.
    ///
    /// - `method` + non-null `id` is a request
    /// - `method` without `id` (or `"id": null`) is a notification
    /// - `result` xor `error` is a response; `"result": null` is a valid
    ///   void success
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let Value::Object(mut obj) = value else {
            return Err(CodecError::NotAnObject);
        };

        let jsonrpc = match obj.remove("jsonrpc") {
            Some(Value::String(version)) => version,
            _ => JSONRPC_VERSION.to_string(),
        };
        let id = take_id(&mut obj)?;
        let params = obj.remove("params");

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(CodecError::InvalidMethod);
            };
            return Ok(match id {
                Some(id) => Self::Request(JsonRpcRequest {
                    jsonrpc,
                    id,
                    method,
                    params,
                }),
                None => Self::Notification(JsonRpcNotification {
                    jsonrpc,
                    method,
                    params,
                }),
            });
        }

        let result = obj.remove("result");
        let error = obj.remove("error").filter(|e| !e.is_null());

        match (result, error) {
            (Some(result), Some(_)) if !result.is_null() => Err(CodecError::AmbiguousResponse),
            (_, Some(error)) => {
                let error: JsonRpcError = serde_json::from_value(error)
                    .map_err(|e| CodecError::InvalidError(e.to_string()))?;
                Ok(Self::Response(JsonRpcResponse {
                    jsonrpc,
                    id,
                    result: None,
                    error: Some(error),
                }))
            }
            (Some(result), None) => Ok(Self::Response(JsonRpcResponse {
                jsonrpc,
                id,
                result: Some(result),
                error: None,
            })),
            (None, None) => Err(CodecError::UnrecognizedShape),
        }
    }
}

fn take_id(obj: &mut Map<String, Value>) -> Result<Option<RequestId>, CodecError> {
    match obj.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => {
            let shown = raw.to_string();
            serde_json::from_value(raw)
                .map(Some)
                .map_err(|_| CodecError::InvalidId(shown))
        }
    }
}

impl From<JsonRpcRequest> for Message {
    fn from(request: JsonRpcRequest) -> Self {
        Self::Request(request)
    }
}

impl From<JsonRpcNotification> for Message {
    fn from(notification: JsonRpcNotification) -> Self {
        Self::Notification(notification)
    }
}

impl From<JsonRpcResponse> for Message {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(r) => r.serialize(serializer),
            Self::Notification(n) => n.serialize(serializer),
            Self::Response(r) => r.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_classify_request() {
        let msg = Message::from_value(json!({
            "jsonrpc": "2.0",
            "id": "ab12cd34-1",
            "method": "session/prompt",
            "params": {"sessionId": "s"}
        }))
        .expect("request");

        assert_eq!(msg.kind(), MessageKind::Request);
        assert_eq!(msg.method(), Some("session/prompt"));
        assert_eq!(msg.id(), Some(&RequestId::from("ab12cd34-1")));
    }

    #[test]
    fn test_classify_numeric_id_request() {
        let msg = Message::from_value(json!({"jsonrpc": "2.0", "id": 9, "method": "initialize"}))
            .expect("request");
        assert_eq!(msg.id(), Some(&RequestId::Number(9)));
    }

    #[test]
    fn test_classify_notification() {
        let msg = Message::from_value(json!({"jsonrpc": "2.0", "method": "session/cancel"}))
            .expect("notification");
        assert_eq!(msg.kind(), MessageKind::Notification);
        assert!(msg.id().is_none());

        let with_null_id =
            Message::from_value(json!({"jsonrpc": "2.0", "id": null, "method": "session/update"}))
                .expect("notification");
        assert_eq!(with_null_id.kind(), MessageKind::Notification);
    }

    #[test]
    fn test_classify_void_success_response() {
        let msg = Message::from_value(json!({"jsonrpc": "2.0", "id": "x-1", "result": null}))
            .expect("response");
        let Message::Response(response) = msg else {
            panic!("expected response");
        };
        assert_eq!(response.result, Some(Value::Null));
        assert!(response.is_success());
    }

    #[test]
    fn test_classify_error_response() {
        let msg = Message::from_value(json!({
            "jsonrpc": "2.0",
            "id": "x-2",
            "error": {"code": -32601, "message": "Method not found: foo"}
        }))
        .expect("response");
        let Message::Response(response) = msg else {
            panic!("expected response");
        };
        let error = response.error.expect("error");
        assert_eq!(error.code, -32601);
    }

    #[test]
    fn test_response_without_id_is_still_classified() {
        let msg = Message::from_value(json!({"jsonrpc": "2.0", "result": {"ok": true}}))
            .expect("response");
        assert_eq!(msg.kind(), MessageKind::Response);
        assert!(msg.id().is_none());
    }

    #[test]
    fn test_reject_ambiguous_response() {
        let err = Message::from_value(json!({
            "id": 1,
            "result": {"a": 1},
            "error": {"code": 1, "message": "x"}
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousResponse));
    }

    #[test]
    fn test_reject_unrecognized_shapes() {
        assert!(matches!(
            Message::from_value(json!({"id": 1})),
            Err(CodecError::UnrecognizedShape)
        ));
        assert!(matches!(
            Message::from_value(json!([1, 2])),
            Err(CodecError::NotAnObject)
        ));
        assert!(matches!(
            Message::from_value(json!({"id": 1, "method": 5})),
            Err(CodecError::InvalidMethod)
        ));
        assert!(matches!(
            Message::from_value(json!({"id": {"nested": true}, "method": "x"})),
            Err(CodecError::InvalidId(_))
        ));
    }

    #[test]
    fn test_serialize_is_untagged() {
        let msg: Message = JsonRpcNotification::new("session/update")
            .with_params(json!({"sessionId": "s"}))
            .into();
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "session/update", "params": {"sessionId": "s"}})
        );
    }
}
