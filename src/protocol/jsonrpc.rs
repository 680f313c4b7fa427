//! JSON-RPC 2.0 Envelope - Requests, Responses and Error Codes
//!
//! The wire contract of the A2A endpoint. Requests are validated from a
//! raw `serde_json::Value` so a malformed envelope can still be answered
//! with the request id when one is present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const NOT_AUTHENTICATED: i64 = -32000;
    pub const AGENT_NOT_FOUND: i64 = -32001;
    pub const MARKET_NOT_FOUND: i64 = -32002;
    pub const FORBIDDEN: i64 = -32003;
    pub const PAYMENT_FAILED: i64 = -32004;
    pub const RATE_LIMITED: i64 = -32005;
    pub const INSUFFICIENT_FUNDS: i64 = -32006;
    pub const NOT_FOUND: i64 = -32007;
    pub const TRADE_REJECTED: i64 = -32008;

    /// Symbolic name of a code, used as a metrics label.
    pub fn name(code: i64) -> &'static str {
        match code {
            PARSE_ERROR => "PARSE_ERROR",
            INVALID_REQUEST => "INVALID_REQUEST",
            METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
            INVALID_PARAMS => "INVALID_PARAMS",
            INTERNAL_ERROR => "INTERNAL_ERROR",
            NOT_AUTHENTICATED => "NOT_AUTHENTICATED",
            AGENT_NOT_FOUND => "AGENT_NOT_FOUND",
            MARKET_NOT_FOUND => "MARKET_NOT_FOUND",
            FORBIDDEN => "FORBIDDEN",
            PAYMENT_FAILED => "PAYMENT_FAILED",
            RATE_LIMITED => "RATE_LIMITED",
            INSUFFICIENT_FUNDS => "INSUFFICIENT_FUNDS",
            NOT_FOUND => "NOT_FOUND",
            TRADE_REJECTED => "TRADE_REJECTED",
            _ => "UNKNOWN",
        }
    }
}

/// A validated JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Validate a raw envelope.
    ///
    /// On failure returns the error together with whatever id could be
    /// recovered, so the response can still be correlated.
    pub fn from_value(raw: Value) -> Result<Self, (Value, RpcError)> {
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        let Value::Object(obj) = raw else {
            return Err((id, RpcError::invalid_request("request must be a JSON object")));
        };
        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err((id, RpcError::invalid_request("jsonrpc must be \"2.0\"")));
        }
        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            return Err((id, RpcError::invalid_request("method must be a string")));
        };
        if !matches!(id, Value::Null | Value::String(_) | Value::Number(_)) {
            return Err((Value::Null, RpcError::invalid_request("id must be a string or number")));
        }
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if !matches!(params, Value::Null | Value::Object(_)) {
            return Err((id, RpcError::invalid_request("params must be an object")));
        }
        Ok(Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        })
    }
}

/// Error object carried in a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, format!("Parse error: {}", detail.into()))
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, format!("Invalid request: {}", detail.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn internal() -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal error")
    }
}

/// A JSON-RPC response: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_envelope() {
        let req = JsonRpcRequest::from_value(json!({
            "jsonrpc": "2.0",
            "method": "a2a.getBalance",
            "id": 7
        }))
        .unwrap();
        assert_eq!(req.method, "a2a.getBalance");
        assert_eq!(req.params, Value::Null);
        assert_eq!(req.id, json!(7));
    }

    #[test]
    fn test_malformed_envelopes_keep_id() {
        let (id, err) = JsonRpcRequest::from_value(json!({"jsonrpc": "1.0", "method": "x", "id": "a"})).unwrap_err();
        assert_eq!(id, json!("a"));
        assert_eq!(err.code, codes::INVALID_REQUEST);

        let (_, err) = JsonRpcRequest::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap_err();
        assert_eq!(err.code, codes::INVALID_REQUEST);

        let (_, err) = JsonRpcRequest::from_value(json!({"jsonrpc": "2.0", "method": "m", "params": [1]})).unwrap_err();
        assert_eq!(err.code, codes::INVALID_REQUEST);

        let (_, err) = JsonRpcRequest::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err.code, codes::INVALID_REQUEST);
    }

    #[test]
    fn test_response_serializes_one_branch() {
        let ok = serde_json::to_value(JsonRpcResponse::success(json!(1), json!({"balance": "10"}))).unwrap();
        assert!(ok.get("error").is_none());
        let err = serde_json::to_value(JsonRpcResponse::failure(json!(1), RpcError::internal())).unwrap();
        assert!(err.get("result").is_none());
        assert_eq!(err["error"]["code"], json!(codes::INTERNAL_ERROR));
        assert_eq!(err["error"]["message"], json!("Internal error"));
    }

    #[test]
    fn test_code_names() {
        assert_eq!(codes::name(codes::RATE_LIMITED), "RATE_LIMITED");
        assert_eq!(codes::name(1), "UNKNOWN");
    }
}
