//! Configuration data structures for pg-gateway.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! serde-friendly and include defaults so that a minimal config only lists the
//! integrations and the API identity.
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    core::{
        authorizer::{DEFAULT_CACHE_TTL, ScopeMode},
        cors::{AUTH_TOKEN_HEADER, CorsPolicy},
        integrator::AuthorizerBinding,
        route_table::{HttpVerb, RouteTable},
    },
    ports::provisioner::RemovalPolicy,
};

/// Identity of the REST API and its deployment stage.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub name: String,
    pub description: Option<String>,
    pub stage: String,
    pub region: String,
    pub account_id: String,
    pub api_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            name: "pg_api".to_string(),
            description: Some("Payment Gateway API".to_string()),
            stage: "prod".to_string(),
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
            api_id: "local".to_string(),
        }
    }
}

impl ApiConfig {
    /// `arn:aws:execute-api:{region}:{account}:{api_id}`
    pub fn execution_arn(&self) -> String {
        format!(
            "arn:aws:execute-api:{}:{}:{}",
            self.region, self.account_id, self.api_id
        )
    }

    /// ARN of one method on the configured stage.
    pub fn method_arn(&self, verb: HttpVerb, path: &str) -> String {
        format!("{}/{}/{}{}", self.execution_arn(), self.stage, verb, path)
    }
}

/// Request authorizer settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AuthorizerConfig {
    pub enabled: bool,
    pub name: String,
    /// Header carrying the credential
    pub identity_header: String,
    /// Parsed by humantime, e.g. "300s", "5m"
    pub cache_ttl: String,
    pub scope: ScopeMode,
    /// Credentials accepted by the digest verifier
    pub tokens: Vec<String>,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "PGApiAuthorizer".to_string(),
            identity_header: AUTH_TOKEN_HEADER.to_string(),
            cache_ttl: humantime::format_duration(DEFAULT_CACHE_TTL).to_string(),
            scope: ScopeMode::default(),
            tokens: Vec::new(),
        }
    }
}

impl AuthorizerConfig {
    pub fn cache_ttl(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.cache_ttl)
    }

    /// The binding handed to the integrator, `None` when disabled.
    pub fn binding(&self) -> Result<Option<AuthorizerBinding>, humantime::DurationError> {
        if !self.enabled {
            return Ok(None);
        }
        Ok(Some(AuthorizerBinding {
            name: self.name.clone(),
            identity_header: self.identity_header.clone(),
            cache_ttl: self.cache_ttl()?,
        }))
    }
}

/// Stage access log settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AccessLogConfig {
    pub retention_days: u32,
    pub removal_policy: RemovalPolicy,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            retention_days: 14,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

/// Usage plan and the API keys accepted on key-protected methods.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct UsagePlanConfig {
    pub api_keys: Vec<String>,
    pub removal_policy: RemovalPolicy,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Local emulator settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocalServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LocalServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cors: CorsPolicy,
    #[serde(default)]
    pub authorizer: AuthorizerConfig,
    #[serde(default)]
    pub access_logs: AccessLogConfig,
    #[serde(default)]
    pub usage_plan: UsagePlanConfig,
    /// Handler name -> the route table it serves
    #[serde(default)]
    pub integrations: BTreeMap<String, RouteTable>,
    #[serde(default)]
    pub server: LocalServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Total number of (path, verb) pairs across all integrations.
    pub fn method_count(&self) -> usize {
        self.integrations.values().map(RouteTable::method_count).sum()
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    api: Option<ApiConfig>,
    cors: Option<CorsPolicy>,
    authorizer: Option<AuthorizerConfig>,
    usage_plan: UsagePlanConfig,
    integrations: BTreeMap<String, RouteTable>,
    server: Option<LocalServerConfig>,
}

impl GatewayConfigBuilder {
    pub fn api(mut self, api: ApiConfig) -> Self {
        self.api = Some(api);
        self
    }

    pub fn cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn authorizer(mut self, authorizer: AuthorizerConfig) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Accept `key` on key-protected methods
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.usage_plan.api_keys.push(key.into());
        self
    }

    /// Serve `table` with the handler called `handler`
    pub fn integration(mut self, handler: impl Into<String>, table: RouteTable) -> Self {
        self.integrations.insert(handler.into(), table);
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        let server = self.server.get_or_insert_with(LocalServerConfig::default);
        server.listen_addr = addr.into();
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.integrations.is_empty() {
            return Err("At least one integration must be configured".to_string());
        }

        Ok(GatewayConfig {
            api: self.api.unwrap_or_default(),
            cors: self.cors.unwrap_or_default(),
            authorizer: self.authorizer.unwrap_or_default(),
            access_logs: AccessLogConfig::default(),
            usage_plan: self.usage_plan,
            integrations: self.integrations,
            server: self.server.unwrap_or_default(),
            logging: LoggingConfig::default(),
        })
    }
}
