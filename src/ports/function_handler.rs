use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error type for handler invocations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    /// No handler is registered under the requested name
    #[error("Handler not found: {0}")]
    NotFound(String),

    /// The handler ran and failed
    #[error("Handler '{handler}' failed: {message}")]
    Failed { handler: String, message: String },

    /// The handler answered with something that is not a proxy response
    #[error("Malformed handler response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Result type alias for handler invocations
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Context the gateway attaches to every proxied request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: String,
    pub stage: String,
    pub http_method: String,
    pub resource_path: String,
    pub request_time_epoch: i64,
    /// Output of the authorizer, present when one allowed the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer: Option<AuthorizerContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerContext {
    pub principal_id: String,
}

/// Proxy-integration event delivered to a handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    /// Route template, e.g. `/api/v1/items/{id}`
    pub resource: String,
    pub path: String,
    pub http_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query_string_parameters: HashMap<String, String>,
    #[serde(default)]
    pub path_parameters: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    pub request_context: RequestContext,
}

/// What a handler answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl ProxyResponse {
    /// JSON response with the given status.
    pub fn json(status_code: u16, body: &Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }
}

/// FunctionHandler defines the port (interface) to the compute function
/// behind an integration.
#[async_trait]
pub trait FunctionHandler: Send + Sync + 'static {
    /// Invoke the function with a proxy event
    async fn invoke(&self, event: ProxyEvent) -> HandlerResult<ProxyResponse>;
}
