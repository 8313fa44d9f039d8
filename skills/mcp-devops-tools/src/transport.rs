//! Transport Module
//!
//! Provides communication protocols for MCP

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }
}

/// Elicitation request for interactive prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitationRequest {
    pub prompt: String,
    pub options: Vec<String>,
}

/// Structured content for rich responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredContent {
    pub format: String,
    pub data: Value,
}

/// Resource link for referencing external resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLink {
    pub name: String,
    pub uri: String,
    pub description: Option<String>,
}
