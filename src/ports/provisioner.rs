use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{
    cors::CorsPolicy, integrator::IntegrationRecord, validator::RequestValidatorSpec,
};

/// Error type for provisioning operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProvisionError {
    /// A method was added before its path resource existed
    #[error("No resource provisioned for path: {0}")]
    MissingResource(String),

    /// A method references a model that was never registered
    #[error("Model '{0}' is not registered")]
    UnknownModel(String),

    /// The same (path, verb) was provisioned twice with different wiring
    #[error("Method {verb} {path} is already provisioned with different wiring")]
    MethodMismatch { path: String, verb: String },

    /// Error reported by the provisioning backend
    #[error("Provisioning backend error: {0}")]
    Backend(String),
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// What happens to a resource when the gateway is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
}

/// Permission for the gateway to invoke a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvokeGrant {
    pub handler: String,
    pub principal: String,
    pub action: String,
    pub source_arn: String,
}

/// A named JSON schema model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub content_type: String,
    pub schema: Value,
}

/// Access log destination for the deployment stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogGroupSpec {
    pub name: String,
    pub retention_days: u32,
    pub removal_policy: RemovalPolicy,
}

/// Usage plan with its API keys (key names only, never key material).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePlanSpec {
    pub name: String,
    pub stage: String,
    pub api_key_name: String,
    pub removal_policy: RemovalPolicy,
}

/// Outcome of a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub destroyed: Vec<String>,
    pub retained: Vec<String>,
}

/// Provisioner defines the port (interface) to the cloud provisioning layer.
///
/// Every registration is idempotent: repeating it with the same input returns
/// `Ok(false)` and changes nothing. `Ok(true)` means something new was
/// provisioned.
pub trait Provisioner: Send + Sync {
    /// Resolve or create the resource for `path`
    fn ensure_resource(&self, path: &str) -> ProvisionResult<bool>;

    /// Attach a CORS preflight responder to the resource at `path`
    fn add_cors_preflight(&self, path: &str, policy: &CorsPolicy) -> ProvisionResult<bool>;

    /// Grant a handler invoke permission
    fn grant_invoke(&self, grant: &InvokeGrant) -> ProvisionResult<bool>;

    /// Register a schema model on the gateway
    fn register_model(&self, model: &ModelSpec) -> ProvisionResult<bool>;

    /// Register a shared request validator
    fn register_request_validator(&self, spec: &RequestValidatorSpec) -> ProvisionResult<bool>;

    /// Register the stage access log group
    fn register_log_group(&self, spec: &LogGroupSpec) -> ProvisionResult<bool>;

    /// Register the usage plan and its API key
    fn register_usage_plan(&self, spec: &UsagePlanSpec) -> ProvisionResult<bool>;

    /// Apply one integration record
    fn add_method(&self, record: &IntegrationRecord) -> ProvisionResult<bool>;

    /// Remove everything provisioned, honouring each resource's removal policy
    fn teardown(&self) -> ProvisionResult<TeardownReport>;
}
