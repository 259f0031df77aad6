//! Request-time authorization decision point.
//!
//! `AuthorizationPolicy` turns the credential carried in the identity header
//! into an Allow/Deny policy document for `execute-api:Invoke`. It holds no
//! mutable state: identical input always yields an identical decision, which
//! is what lets the calling layer cache results for the authorizer TTL.
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{core::cors::AUTH_TOKEN_HEADER, ports::credential_verifier::CredentialVerifier};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const INVOKE_ACTION: &str = "execute-api:Invoke";
pub const DEFAULT_PRINCIPAL: &str = "user";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("Allow"),
            Effect::Deny => f.write_str("Deny"),
        }
    }
}

/// How the resource of a decision is derived from the requested method ARN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScopeMode {
    /// The decision covers exactly the requested method ARN.
    #[default]
    ExactMethod,
    /// The decision covers every method of one stage: `{base}/{stage}/*`.
    StageWildcard { stage: String },
}

impl ScopeMode {
    pub fn derive(&self, method_arn: &str) -> String {
        match self {
            ScopeMode::ExactMethod => method_arn.to_string(),
            ScopeMode::StageWildcard { stage } => {
                let base = method_arn.split('/').next().unwrap_or(method_arn);
                format!("{base}/{stage}/*")
            }
        }
    }
}

/// The verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub principal_id: String,
    pub effect: Effect,
    pub resource_scope: String,
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// Whether this decision grants `method_arn`. A trailing `*` in the scope
    /// matches any suffix.
    pub fn permits(&self, method_arn: &str) -> bool {
        if !self.is_allowed() {
            return false;
        }
        match self.resource_scope.strip_suffix('*') {
            Some(prefix) => method_arn.starts_with(prefix),
            None => self.resource_scope == method_arn,
        }
    }

    pub fn to_response(&self) -> AuthorizerResponse {
        AuthorizerResponse {
            principal_id: self.principal_id.clone(),
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![PolicyStatement {
                    action: INVOKE_ACTION.to_string(),
                    effect: self.effect,
                    resource: self.resource_scope.clone(),
                }],
            },
        }
    }
}

/// Authorizer result as returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub action: String,
    pub effect: Effect,
    pub resource: String,
}

/// Request authorizer event. Only the fields the decision needs are typed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerEvent {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub method_arn: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
}

impl AuthorizerEvent {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthorizerError {
    #[error("Malformed authorizer event: {0}")]
    MalformedEvent(#[from] serde_json::Error),
}

/// The decision point.
#[derive(Clone)]
pub struct AuthorizationPolicy {
    verifier: Arc<dyn CredentialVerifier>,
    scope: ScopeMode,
    principal_id: String,
    identity_header: String,
}

impl AuthorizationPolicy {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, scope: ScopeMode) -> Self {
        Self {
            verifier,
            scope,
            principal_id: DEFAULT_PRINCIPAL.to_string(),
            identity_header: AUTH_TOKEN_HEADER.to_string(),
        }
    }

    pub fn with_identity_header(mut self, header: impl Into<String>) -> Self {
        self.identity_header = header.into();
        self
    }

    pub fn identity_header(&self) -> &str {
        &self.identity_header
    }

    /// Decide for a credential. A missing credential never matches.
    pub fn decide(&self, credential: Option<&str>, resource_arn: &str) -> PolicyDecision {
        let effect = match credential {
            Some(token) if self.verifier.verify(token) => Effect::Allow,
            _ => Effect::Deny,
        };
        PolicyDecision {
            principal_id: self.principal_id.clone(),
            effect,
            resource_scope: self.scope.derive(resource_arn),
        }
    }

    /// Entry point for a raw authorizer event.
    pub fn handle_event(&self, raw: &Value) -> Result<AuthorizerResponse, AuthorizerError> {
        let span = tracing::info_span!("authorize", method_arn = tracing::field::Empty);
        let _guard = span.enter();

        tracing::info!(event = %raw, "Authorizer event received");
        let event: AuthorizerEvent = serde_json::from_value(raw.clone())?;
        span.record("method_arn", event.method_arn.as_str());
        if let Some(event_type) = &event.event_type {
            tracing::debug!(%event_type, "Authorizer event type");
        }

        let decision = self.decide(event.header(&self.identity_header), &event.method_arn);
        tracing::debug!(effect = %decision.effect, scope = %decision.resource_scope, "Authorizer decision");
        Ok(decision.to_response())
    }
}

impl fmt::Debug for AuthorizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationPolicy")
            .field("scope", &self.scope)
            .field("principal_id", &self.principal_id)
            .field("identity_header", &self.identity_header)
            .finish_non_exhaustive()
    }
}
