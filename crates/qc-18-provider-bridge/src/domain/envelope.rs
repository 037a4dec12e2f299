//! RPC envelopes exchanged with a page.
//!
//! Inbound: `{id, method, params}`. Outbound: `{id, result}` or
//! `{id, error: {code, message}}`. The `jsonrpc` member is tolerated on input
//! and always emitted on output.

use crate::domain::error::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Longest string identifier accepted from a page.
pub const MAX_REQUEST_ID_LEN: usize = 256;

/// Caller-chosen request identifier.
///
/// Opaque: only compared for equality on the connection that issued it.
/// Never interpreted as a counter and never compared across connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID (must fit in i64)
    Number(i64),
    /// String ID
    String(String),
}

impl RequestId {
    /// Extract a usable identifier from a raw `id` member.
    ///
    /// Rejects null (notifications are not supported), empty or overlong
    /// strings, and numbers that are not integers.
    fn from_value(value: &Value) -> Result<Self, &'static str> {
        match value {
            Value::String(s) if s.is_empty() => Err("request id cannot be an empty string"),
            Value::String(s) if s.len() > MAX_REQUEST_ID_LEN => {
                Err("request id string too long (max 256 chars)")
            }
            Value::String(s) => Ok(RequestId::String(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(RequestId::Number)
                .ok_or("request id must be an integer"),
            Value::Null => Err("request id is required"),
            _ => Err("request id must be a string or integer"),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "\"{}\"", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A validated inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: RequestId,
    pub method: String,
    /// Always an array or object; a missing member becomes `[]`.
    pub params: Value,
}

/// A request that failed validation, with whatever identifier could be salvaged.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRequest {
    pub id: Option<RequestId>,
    pub error: ApiError,
}

impl MalformedRequest {
    fn new(id: Option<RequestId>, error: ApiError) -> Self {
        Self { id, error }
    }

    /// The local answer for this request.
    pub fn into_response(self) -> RpcResponse {
        RpcResponse::failure(self.id, self.error)
    }
}

impl RpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Parse and validate one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, MalformedRequest> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| MalformedRequest::new(None, ApiError::from(e)))?;
        Self::from_value(value)
    }

    /// Identifier of a frame that will not be routed, if it carries a usable one.
    pub fn peek_id(text: &str) -> Option<RequestId> {
        let value: Value = serde_json::from_str(text).ok()?;
        RequestId::from_value(value.get("id")?).ok()
    }

    /// Validate an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, MalformedRequest> {
        let Value::Object(mut object) = value else {
            return Err(MalformedRequest::new(
                None,
                ApiError::invalid_request("expected a JSON object"),
            ));
        };

        let id = RequestId::from_value(object.get("id").unwrap_or(&Value::Null))
            .map_err(|reason| MalformedRequest::new(None, ApiError::invalid_request(reason)))?;

        let method = match object.get("method") {
            Some(Value::String(m)) if !m.is_empty() => m.clone(),
            Some(Value::String(_)) => {
                return Err(MalformedRequest::new(
                    Some(id),
                    ApiError::invalid_request("method cannot be empty"),
                ))
            }
            Some(_) => {
                return Err(MalformedRequest::new(
                    Some(id),
                    ApiError::invalid_request("method must be a string"),
                ))
            }
            None => {
                return Err(MalformedRequest::new(
                    Some(id),
                    ApiError::invalid_request("method is required"),
                ))
            }
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(p @ (Value::Array(_) | Value::Object(_))) => p,
            Some(_) => {
                return Err(MalformedRequest::new(
                    Some(id),
                    ApiError::invalid_params("expected an array or object"),
                ))
            }
        };

        Ok(Self { id, method, params })
    }
}

/// Result or error member of a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(ApiError),
}

/// One outbound response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    /// `None` only when the inbound frame carried no usable identifier.
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl RpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn failure(id: Option<RequestId>, error: ApiError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn from_result(id: RequestId, result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(Some(id), error),
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match &self.payload {
            ResponsePayload::Error(e) => Some(e),
            ResponsePayload::Result(_) => None,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(v) => Some(v),
            ResponsePayload::Error(_) => None,
        }
    }
}
