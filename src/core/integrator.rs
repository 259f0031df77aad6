//! Route-table to gateway wiring.
//!
//! `GatewayIntegrator` owns the effective API surface of one gateway. Each
//! [`bind`](GatewayIntegrator::bind) call plans every (path, verb) of the
//! incoming table first, and only when the whole plan is valid applies it
//! through the [`Provisioner`] port. A rejected table leaves both the
//! provisioner and the integrator untouched.
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::{
    config::{
        models::GatewayConfig,
        validation::{ValidationError, ValidationResult},
    },
    core::{
        cors::{CORS_RESPONSE_HEADERS, CorsPolicy},
        model_namer::{
            BAD_REQUEST_ERROR_LIST_MODEL, ERROR_MODEL, ModelOwner, ModelRegistry, ModelRole,
            model_name, response_model_name,
        },
        route_table::{HttpVerb, MethodDescriptor, RouteTable},
        validator::{self, ValidatorKind},
    },
    ports::provisioner::{
        InvokeGrant, LogGroupSpec, ModelSpec, ProvisionError, Provisioner, TeardownReport,
        UsagePlanSpec,
    },
    tracing_setup,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const GATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";
pub const INVOKE_FUNCTION_ACTION: &str = "lambda:InvokeFunction";
/// Name the provider uses for its built-in empty model.
pub const EMPTY_MODEL: &str = "Empty";

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Configuration(#[from] ValidationError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Reference to the compute handler serving a route table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRef {
    pub name: String,
}

impl HandlerRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A request authorizer attached to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerBinding {
    pub name: String,
    pub identity_header: String,
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Model bound to a method response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ResponseModel {
    Empty,
    Named(String),
}

impl ResponseModel {
    pub fn name(&self) -> &str {
        match self {
            ResponseModel::Empty => EMPTY_MODEL,
            ResponseModel::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodResponse {
    pub status_code: u16,
    pub model: ResponseModel,
    pub response_headers: Vec<String>,
}

/// Resolved wiring for one (path, verb).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    pub path: String,
    pub verb: HttpVerb,
    pub handler: String,
    pub validator_kind: ValidatorKind,
    pub request_validator: Option<String>,
    pub model_id: Option<String>,
    pub response_model_id: Option<String>,
    pub cors_policy: CorsPolicy,
    pub api_key_required: bool,
    pub authorizer_attached: bool,
    pub authorizer: Option<String>,
    pub method_responses: Vec<MethodResponse>,
}

impl IntegrationRecord {
    pub fn response(&self, status_code: u16) -> Option<&MethodResponse> {
        self.method_responses
            .iter()
            .find(|r| r.status_code == status_code)
    }
}

struct BindPlan {
    records: Vec<IntegrationRecord>,
    models: ModelRegistry,
    new_models: Vec<ModelSpec>,
}

/// Binds route tables onto one gateway.
pub struct GatewayIntegrator {
    api_name: String,
    stage: String,
    execution_arn: String,
    cors: CorsPolicy,
    provisioner: Arc<dyn Provisioner>,
    authorizer: Option<AuthorizerBinding>,
    surface: RouteTable,
    models: ModelRegistry,
    records: BTreeMap<(String, HttpVerb), IntegrationRecord>,
}

impl GatewayIntegrator {
    /// Create the integrator and provision the gateway-wide pieces: access
    /// logs, usage plan, shared request validators and shared error models.
    pub fn new(config: &GatewayConfig, provisioner: Arc<dyn Provisioner>) -> Result<Self, BindError> {
        let mut integrator = Self {
            api_name: config.api.name.clone(),
            stage: config.api.stage.clone(),
            execution_arn: config.api.execution_arn(),
            cors: config.cors.clone(),
            provisioner,
            authorizer: None,
            surface: RouteTable::new(),
            models: ModelRegistry::new(),
            records: BTreeMap::new(),
        };
        integrator.provision_gateway(config)?;
        Ok(integrator)
    }

    fn provision_gateway(&mut self, config: &GatewayConfig) -> Result<(), BindError> {
        let name = &self.api_name;

        self.provisioner.register_log_group(&LogGroupSpec {
            name: format!("/aws/apigateway/{name}-ApiGatewayAccessLogs"),
            retention_days: config.access_logs.retention_days,
            removal_policy: config.access_logs.removal_policy,
        })?;
        self.provisioner.register_usage_plan(&UsagePlanSpec {
            name: format!("{name}-usage-plan"),
            stage: self.stage.clone(),
            api_key_name: format!("{name}-api-key"),
            removal_policy: config.usage_plan.removal_policy,
        })?;

        for kind in [ValidatorKind::Body, ValidatorKind::Params] {
            if let Some(spec) = kind.spec(name) {
                self.provisioner.register_request_validator(&spec)?;
            }
        }

        for model in shared_error_models() {
            self.models.register(&model.name, ModelOwner::Shared)?;
            self.provisioner.register_model(&model)?;
        }

        tracing::info!(api = %name, stage = %self.stage, "Gateway base resources provisioned");
        Ok(())
    }

    /// Attach the request authorizer used by routes that require one.
    pub fn attach_authorizer(&mut self, binding: AuthorizerBinding) {
        tracing::info!(
            authorizer = %binding.name,
            header = %binding.identity_header,
            ttl_secs = binding.cache_ttl.as_secs(),
            "Authorizer attached"
        );
        self.authorizer = Some(binding);
    }

    pub fn authorizer(&self) -> Option<&AuthorizerBinding> {
        self.authorizer.as_ref()
    }

    pub fn execution_arn(&self) -> &str {
        &self.execution_arn
    }

    /// ARN of one method on the deployment stage.
    pub fn method_arn(&self, verb: HttpVerb, path: &str) -> String {
        format!("{}/{}/{}{}", self.execution_arn, self.stage, verb, path)
    }

    /// Union of every table bound so far.
    pub fn surface(&self) -> &RouteTable {
        &self.surface
    }

    pub fn records(&self) -> impl Iterator<Item = &IntegrationRecord> {
        self.records.values()
    }

    pub fn record(&self, path: &str, verb: HttpVerb) -> Option<&IntegrationRecord> {
        self.records.get(&(path.to_string(), verb))
    }

    /// Bind `table` to `handler`, returning one record per (path, verb).
    pub fn bind(
        &mut self,
        table: &RouteTable,
        handler: &HandlerRef,
    ) -> Result<Vec<IntegrationRecord>, BindError> {
        let span = tracing_setup::create_bind_span(&handler.name, table.len());
        let _guard = span.enter();

        let plan = self.plan(table, handler)?;
        self.apply(&plan, handler)?;

        self.surface.union(table)?;
        self.models = plan.models;
        for record in &plan.records {
            self.records
                .insert((record.path.clone(), record.verb), record.clone());
        }

        tracing::info!(
            handler = %handler.name,
            methods = plan.records.len(),
            surface_paths = self.surface.len(),
            "Route table bound"
        );
        Ok(plan.records)
    }

    fn plan(&self, table: &RouteTable, handler: &HandlerRef) -> Result<BindPlan, BindError> {
        let mut errors = Vec::new();

        if let Err(mut table_errors) = table.validate() {
            errors.append(&mut table_errors);
        }
        errors.extend(self.surface.union_conflicts(table));

        let mut models = self.models.clone();
        let mut new_models = Vec::new();
        let mut records = Vec::with_capacity(table.method_count());

        for (path, methods) in table.iter() {
            for descriptor in methods {
                if let Some(existing) = self.record(path, descriptor.verb) {
                    if existing.handler != handler.name {
                        errors.push(ValidationError::RouteConflict {
                            message: format!(
                                "{} {path} is already bound to handler '{}'",
                                descriptor.verb, existing.handler
                            ),
                        });
                        continue;
                    }
                }
                match self.plan_method(path, descriptor, handler, &mut models, &mut new_models) {
                    Ok(record) => match self.record(path, descriptor.verb) {
                        Some(existing) if *existing != record => {
                            errors.push(ValidationError::RouteConflict {
                                message: format!(
                                    "{} {path} is already bound with different wiring",
                                    descriptor.verb
                                ),
                            });
                        }
                        _ => records.push(record),
                    },
                    Err(e) => errors.push(e),
                }
            }
        }

        if !errors.is_empty() {
            return Err(ValidationError::aggregate(errors).into());
        }

        Ok(BindPlan {
            records,
            models,
            new_models,
        })
    }

    fn plan_method(
        &self,
        path: &str,
        descriptor: &MethodDescriptor,
        handler: &HandlerRef,
        models: &mut ModelRegistry,
        new_models: &mut Vec<ModelSpec>,
    ) -> ValidationResult<IntegrationRecord> {
        let verb = descriptor.verb;
        let validator_kind = validator::select(descriptor);

        let model_id = match &descriptor.request_schema {
            Some(schema) => {
                let name = model_name(path, verb);
                let owner = ModelOwner::Method {
                    path: path.to_string(),
                    verb,
                    role: ModelRole::Request,
                };
                if models.register(&name, owner)? {
                    new_models.push(json_model(&name, schema.clone()));
                }
                Some(name)
            }
            None => None,
        };

        let response_model_id = match &descriptor.response_schema {
            Some(schema) => {
                let name = response_model_name(path, verb);
                let owner = ModelOwner::Method {
                    path: path.to_string(),
                    verb,
                    role: ModelRole::Response,
                };
                if models.register(&name, owner)? {
                    new_models.push(json_model(&name, schema.clone()));
                }
                Some(name)
            }
            None => None,
        };

        let authorizer = match (&self.authorizer, descriptor.authorizer_required) {
            (Some(binding), true) => Some(binding.name.clone()),
            (None, true) => {
                tracing::warn!(
                    path,
                    verb = %verb,
                    "Route requires an authorizer but none is attached; method is unauthenticated"
                );
                None
            }
            _ => None,
        };

        Ok(IntegrationRecord {
            path: path.to_string(),
            verb,
            handler: handler.name.clone(),
            validator_kind,
            request_validator: validator_kind.spec(&self.api_name).map(|s| s.name),
            model_id,
            response_model_id: response_model_id.clone(),
            cors_policy: self.cors.clone(),
            api_key_required: descriptor.api_key_required,
            authorizer_attached: authorizer.is_some(),
            authorizer,
            method_responses: method_responses(response_model_id),
        })
    }

    fn apply(&self, plan: &BindPlan, handler: &HandlerRef) -> Result<(), BindError> {
        for model in &plan.new_models {
            self.provisioner.register_model(model)?;
        }

        let grant = InvokeGrant {
            handler: handler.name.clone(),
            principal: GATEWAY_PRINCIPAL.to_string(),
            action: INVOKE_FUNCTION_ACTION.to_string(),
            source_arn: format!("{}/*/*/*", self.execution_arn),
        };

        let mut resolved = BTreeSet::new();
        for record in &plan.records {
            if resolved.insert(record.path.as_str()) {
                if self.provisioner.ensure_resource(&record.path)? {
                    tracing::debug!(path = %record.path, "Resource created");
                }
                if self
                    .provisioner
                    .add_cors_preflight(&record.path, &self.cors)?
                {
                    tracing::debug!(path = %record.path, "CORS preflight attached");
                }
            }
            if self.provisioner.grant_invoke(&grant)? {
                tracing::debug!(handler = %grant.handler, source = %grant.source_arn, "Invoke permission granted");
            }
            self.provisioner.add_method(record)?;
        }
        Ok(())
    }

    /// Explicit end of life: removes everything the provisioner created,
    /// keeping resources whose removal policy is `retain`.
    pub fn teardown(self) -> Result<TeardownReport, BindError> {
        let report = self.provisioner.teardown()?;
        tracing::info!(
            destroyed = report.destroyed.len(),
            retained = report.retained.len(),
            "Gateway torn down"
        );
        Ok(report)
    }
}

fn json_model(name: &str, schema: serde_json::Value) -> ModelSpec {
    ModelSpec {
        name: name.to_string(),
        content_type: JSON_CONTENT_TYPE.to_string(),
        schema,
    }
}

fn method_responses(response_model_id: Option<String>) -> Vec<MethodResponse> {
    let headers: Vec<String> = CORS_RESPONSE_HEADERS
        .iter()
        .map(|h| format!("method.response.header.{h}"))
        .collect();
    let ok_model = response_model_id
        .map(ResponseModel::Named)
        .unwrap_or(ResponseModel::Empty);

    [
        (200, ok_model),
        (
            400,
            ResponseModel::Named(BAD_REQUEST_ERROR_LIST_MODEL.to_string()),
        ),
        (403, ResponseModel::Named(ERROR_MODEL.to_string())),
        (409, ResponseModel::Named(ERROR_MODEL.to_string())),
    ]
    .into_iter()
    .map(|(status_code, model)| MethodResponse {
        status_code,
        model,
        response_headers: headers.clone(),
    })
    .collect()
}

/// Error body models shared by every method of the gateway.
pub fn shared_error_models() -> [ModelSpec; 2] {
    let error = json!({
        "type": "object",
        "properties": {
            "code": { "type": "string" },
            "message": { "type": "string" }
        }
    });
    [
        json_model(
            BAD_REQUEST_ERROR_LIST_MODEL,
            json!({
                "type": "object",
                "properties": {
                    "errors": { "type": "array", "items": error.clone() }
                }
            }),
        ),
        json_model(ERROR_MODEL, error),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapters::PlanProvisioner;

    fn integrator() -> (GatewayIntegrator, Arc<PlanProvisioner>) {
        let provisioner = Arc::new(PlanProvisioner::new());
        let integrator = GatewayIntegrator::new(&GatewayConfig::default(), provisioner.clone())
            .expect("base provisioning");
        (integrator, provisioner)
    }

    fn operations_table() -> RouteTable {
        RouteTable::new()
            .route(
                "/api/v1/operations/products",
                vec![MethodDescriptor::new(HttpVerb::Get).with_authorizer()],
            )
            .route(
                "/api/v1/operations/purchase",
                vec![
                    MethodDescriptor::new(HttpVerb::Get).with_authorizer(),
                    MethodDescriptor::new(HttpVerb::Post)
                        .with_authorizer()
                        .with_request_schema(json!({"type": "object"})),
                    MethodDescriptor::new(HttpVerb::Patch).with_authorizer(),
                ],
            )
    }

    #[test]
    fn base_provisioning_registers_shared_models_once() {
        let (_, provisioner) = integrator();
        let plan = provisioner.snapshot().unwrap();
        assert!(plan.models.contains_key(BAD_REQUEST_ERROR_LIST_MODEL));
        assert!(plan.models.contains_key(ERROR_MODEL));
        assert_eq!(plan.request_validators.len(), 2);
        assert_eq!(plan.log_groups.len(), 1);
    }

    #[test]
    fn authorizer_is_only_wired_when_attached() {
        let (mut unauthenticated, _) = integrator();
        let records = unauthenticated
            .bind(&operations_table(), &HandlerRef::new("operations"))
            .unwrap();
        assert!(records.iter().all(|r| !r.authorizer_attached));

        let (mut gated, _) = integrator();
        gated.attach_authorizer(AuthorizerBinding {
            name: "PGApiAuthorizer".to_string(),
            identity_header: "x-pg-token".to_string(),
            cache_ttl: Duration::from_secs(300),
        });
        let records = gated
            .bind(&operations_table(), &HandlerRef::new("operations"))
            .unwrap();
        assert!(records.iter().all(|r| r.authorizer_attached));
        assert_eq!(records[0].authorizer.as_deref(), Some("PGApiAuthorizer"));
    }

    #[test]
    fn request_models_are_named_and_validated() {
        let (mut integrator, provisioner) = integrator();
        integrator
            .bind(&operations_table(), &HandlerRef::new("operations"))
            .unwrap();

        let post = integrator
            .record("/api/v1/operations/purchase", HttpVerb::Post)
            .unwrap();
        assert_eq!(post.validator_kind, ValidatorKind::Body);
        assert_eq!(post.model_id.as_deref(), Some("ApiV1OperationsPurchasePost"));
        assert_eq!(
            post.request_validator.as_deref(),
            Some("pg_api-request-validator-body")
        );

        let get = integrator
            .record("/api/v1/operations/purchase", HttpVerb::Get)
            .unwrap();
        assert_eq!(get.validator_kind, ValidatorKind::None);
        assert!(get.model_id.is_none());
        assert_eq!(get.response(200).unwrap().model, ResponseModel::Empty);

        let plan = provisioner.snapshot().unwrap();
        assert!(plan.models.contains_key("ApiV1OperationsPurchasePost"));
    }

    #[test]
    fn method_arns_follow_stage_and_verb() {
        let (integrator, _) = integrator();
        assert_eq!(
            integrator.method_arn(HttpVerb::Get, "/api/v1/operations/products"),
            format!(
                "{}/prod/GET/api/v1/operations/products",
                integrator.execution_arn()
            )
        );
    }

    #[test]
    fn rejected_tables_leave_no_trace() {
        let (mut integrator, provisioner) = integrator();
        integrator
            .bind(&operations_table(), &HandlerRef::new("operations"))
            .unwrap();
        let before = provisioner.snapshot().unwrap();

        let conflicting = RouteTable::new()
            .route("/api/v1/new", vec![MethodDescriptor::new(HttpVerb::Get)])
            .route(
                "/api/v1/operations/products",
                vec![MethodDescriptor::new(HttpVerb::Get).with_api_key()],
            );
        let err = integrator
            .bind(&conflicting, &HandlerRef::new("operations"))
            .unwrap_err();
        assert!(matches!(err, BindError::Configuration(_)));
        assert_eq!(provisioner.snapshot().unwrap(), before);
        assert!(integrator.surface().methods("/api/v1/new").is_none());
    }

    #[test]
    fn same_route_on_another_handler_is_a_conflict() {
        let (mut integrator, _) = integrator();
        integrator
            .bind(&operations_table(), &HandlerRef::new("operations"))
            .unwrap();
        let err = integrator
            .bind(&operations_table(), &HandlerRef::new("cloudflare"))
            .unwrap_err();
        assert!(matches!(
            err,
            BindError::Configuration(ValidationError::ValidationFailed { .. })
        ));
    }
}
