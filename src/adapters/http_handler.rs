//! Local gateway emulator.
//!
//! Serves the integration records of a bound [`GatewayIntegrator`] over HTTP,
//! enforcing at request time what the wiring declares: CORS preflights, API
//! keys, the request authorizer and request schema validation, before the
//! proxy event reaches the function handler.
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use axum::{
    Json, Router,
    body::to_bytes,
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
};
use serde_json::{Value, json};
use thiserror::Error;
use tower::ServiceBuilder;

use crate::{
    adapters::{
        decision_cache::DecisionCache,
        digest_store::{ApiKeyStore, DigestTokenVerifier},
        function_handler::HandlerRegistry,
        middleware::{RequestId, request_id_middleware, request_timing_middleware},
    },
    config::models::{ApiConfig, GatewayConfig},
    core::{
        authorizer::{AuthorizationPolicy, PolicyDecision},
        cors::{API_KEY_HEADER, CorsPolicy},
        integrator::{GatewayIntegrator, IntegrationRecord},
        route_table::HttpVerb,
        validator::ValidatorKind,
    },
    ports::function_handler::{AuthorizerContext, ProxyEvent, ProxyResponse, RequestContext},
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EmulatorError {
    /// Two bound paths cannot be told apart by the path router
    #[error("Cannot route path '{path}': {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// A request schema failed to compile
    #[error("Invalid request schema for {verb} {path}: {message}")]
    Schema {
        path: String,
        verb: HttpVerb,
        message: String,
    },

    #[error("Invalid emulator configuration: {0}")]
    InvalidConfig(String),
}

/// Everything the emulator needs besides the bound records.
pub struct EmulatorOptions {
    pub api: ApiConfig,
    pub api_keys: ApiKeyStore,
    pub policy: Option<AuthorizationPolicy>,
    pub cache_ttl: Duration,
    pub handlers: HandlerRegistry,
    pub max_body_bytes: usize,
}

impl EmulatorOptions {
    /// Digest verifier over `authorizer.tokens`, API keys from the usage
    /// plan and a greeting handler per integration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, EmulatorError> {
        let policy = config.authorizer.enabled.then(|| {
            AuthorizationPolicy::new(
                Arc::new(DigestTokenVerifier::new(&config.authorizer.tokens)),
                config.authorizer.scope.clone(),
            )
            .with_identity_header(config.authorizer.identity_header.clone())
        });
        let cache_ttl = config.authorizer.cache_ttl().map_err(|e| {
            EmulatorError::InvalidConfig(format!(
                "authorizer.cache_ttl '{}': {e}",
                config.authorizer.cache_ttl
            ))
        })?;

        Ok(Self {
            api: config.api.clone(),
            api_keys: ApiKeyStore::new(&config.usage_plan.api_keys),
            policy,
            cache_ttl,
            handlers: HandlerRegistry::with_greeters(config.integrations.keys().cloned()),
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

struct BoundMethod {
    record: IntegrationRecord,
    request_validator: Option<jsonschema::Validator>,
}

struct EmulatorState {
    paths: matchit::Router<String>,
    methods: HashMap<(String, HttpVerb), BoundMethod>,
    cors: HashMap<String, CorsPolicy>,
    api: ApiConfig,
    api_keys: ApiKeyStore,
    policy: Option<AuthorizationPolicy>,
    cache: DecisionCache,
    handlers: HandlerRegistry,
    max_body_bytes: usize,
}

/// Cheap to clone; all clones share the same routes and decision cache.
#[derive(Clone)]
pub struct LocalGateway {
    state: Arc<EmulatorState>,
}

impl LocalGateway {
    pub fn new(integrator: &GatewayIntegrator, options: EmulatorOptions) -> Result<Self, EmulatorError> {
        let mut paths = matchit::Router::new();
        let mut routed = HashSet::new();
        let mut methods = HashMap::new();
        let mut cors = HashMap::new();

        for record in integrator.records() {
            if routed.insert(record.path.clone()) {
                paths
                    .insert(record.path.clone(), record.path.clone())
                    .map_err(|source| EmulatorError::Route {
                        path: record.path.clone(),
                        source,
                    })?;
                cors.insert(record.path.clone(), record.cors_policy.clone());
            }

            let schema = integrator
                .surface()
                .descriptor(&record.path, record.verb)
                .and_then(|d| d.request_schema.as_ref());
            let request_validator = match (record.validator_kind, schema) {
                (ValidatorKind::None, _) | (_, None) => None,
                (_, Some(schema)) => Some(jsonschema::validator_for(schema).map_err(|e| {
                    EmulatorError::Schema {
                        path: record.path.clone(),
                        verb: record.verb,
                        message: e.to_string(),
                    }
                })?),
            };

            methods.insert(
                (record.path.clone(), record.verb),
                BoundMethod {
                    record: record.clone(),
                    request_validator,
                },
            );
        }

        tracing::info!(
            paths = routed.len(),
            methods = methods.len(),
            authorizer = options.policy.is_some(),
            "Local gateway routes compiled"
        );

        Ok(Self {
            state: Arc::new(EmulatorState {
                paths,
                methods,
                cors,
                api: options.api,
                api_keys: options.api_keys,
                policy: options.policy,
                cache: DecisionCache::new(options.cache_ttl),
                handlers: options.handlers,
                max_body_bytes: options.max_body_bytes,
            }),
        })
    }

    /// The axum application serving every bound path.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn(request_id_middleware))
                    .layer(middleware::from_fn(request_timing_middleware)),
            )
            .with_state(self.clone())
    }

    /// Number of cached authorizer decisions.
    pub fn cached_decisions(&self) -> usize {
        self.state.cache.len()
    }

    /// Handle on the shared authorizer decision cache.
    pub fn decision_cache(&self) -> DecisionCache {
        self.state.cache.clone()
    }
}

async fn dispatch(State(gateway): State<LocalGateway>, req: Request) -> Response {
    gateway.state.handle(req).await
}

impl EmulatorState {
    async fn handle(&self, req: Request) -> Response {
        let path = req.uri().path().to_string();
        let (template, path_params) = match self.paths.at(&path) {
            Ok(matched) => (
                matched.value.clone(),
                matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<HashMap<_, _>>(),
            ),
            Err(_) => {
                tracing::debug!(%path, "No bound resource");
                return missing_authentication_token();
            }
        };

        let origin = header_str(req.headers(), header::ORIGIN.as_str()).map(str::to_string);
        let policy = self.cors.get(&template);

        if req.method() == Method::OPTIONS {
            let mut response = StatusCode::NO_CONTENT.into_response();
            if let Some(policy) = policy {
                set_headers(&mut response, policy.preflight_headers(origin.as_deref()));
            }
            return response;
        }

        let mut response = self.invoke_method(req, &path, &template, path_params).await;
        if let Some(policy) = policy {
            set_headers(&mut response, policy.response_headers(origin.as_deref()));
        }
        response
    }

    async fn invoke_method(
        &self,
        req: Request,
        path: &str,
        template: &str,
        path_params: HashMap<String, String>,
    ) -> Response {
        let Ok(verb) = req.method().as_str().parse::<HttpVerb>() else {
            return missing_authentication_token();
        };
        let Some(bound) = self.methods.get(&(template.to_string(), verb)) else {
            return missing_authentication_token();
        };
        let record = &bound.record;

        if record.api_key_required {
            let key = header_str(req.headers(), API_KEY_HEADER);
            if !key.is_some_and(|k| self.api_keys.is_valid(k)) {
                tracing::info!(%verb, path, "Rejected: missing or invalid API key");
                return error_response(StatusCode::FORBIDDEN, "Forbidden", "Forbidden");
            }
        }

        let method_arn = self.api.method_arn(verb, path);
        let mut principal = None;
        if record.authorizer_attached {
            match self.authorize(req.headers(), &method_arn).await {
                Some(decision) if decision.permits(&method_arn) => {
                    principal = Some(decision.principal_id);
                }
                _ => {
                    tracing::info!(%method_arn, "Rejected by authorizer");
                    return error_response(
                        StatusCode::FORBIDDEN,
                        "AccessDenied",
                        "User is not authorized to access this resource",
                    );
                }
            }
        }

        let (parts, body) = req.into_parts();
        let bytes = match to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read request body");
                return error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "RequestTooLarge",
                    "Request body is too large",
                );
            }
        };
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        if let Some(validator) = &bound.request_validator {
            let errors = match record.validator_kind {
                ValidatorKind::Body => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(instance) => schema_errors(validator, &instance, "InvalidRequestBody"),
                    Err(e) => vec![json!({
                        "code": "InvalidRequestBody",
                        "message": format!("Request body is not valid JSON: {e}"),
                    })],
                },
                ValidatorKind::Params => schema_errors(
                    validator,
                    &params_instance(&query, &path_params),
                    "InvalidRequestParameters",
                ),
                ValidatorKind::None => Vec::new(),
            };
            if !errors.is_empty() {
                tracing::info!(%verb, path, errors = errors.len(), "Request failed validation");
                return (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response();
            }
        }

        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let event = ProxyEvent {
            resource: template.to_string(),
            path: path.to_string(),
            http_method: verb.to_string(),
            headers: parts
                .headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
                .collect(),
            query_string_parameters: query,
            path_parameters: path_params,
            body: (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned()),
            request_context: RequestContext {
                request_id,
                stage: self.api.stage.clone(),
                http_method: verb.to_string(),
                resource_path: template.to_string(),
                request_time_epoch: chrono::Utc::now().timestamp_millis(),
                authorizer: principal.map(|principal_id| AuthorizerContext { principal_id }),
            },
        };

        let handler = match self.handlers.get(&record.handler) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::error!(error = %e, "Integration has no handler");
                return error_response(StatusCode::BAD_GATEWAY, "BadGateway", &e.to_string());
            }
        };
        match handler.invoke(event).await {
            Ok(proxy) => proxy_response(proxy),
            Err(e) => {
                tracing::error!(handler = %record.handler, error = %e, "Handler invocation failed");
                error_response(StatusCode::BAD_GATEWAY, "BadGateway", "Internal server error")
            }
        }
    }

    /// Decision for the request, cached by (credential, method ARN). A
    /// missing credential is denied without touching the cache.
    async fn authorize(&self, headers: &HeaderMap, method_arn: &str) -> Option<PolicyDecision> {
        let policy = self.policy.as_ref()?;
        let Some(credential) = header_str(headers, policy.identity_header()) else {
            return Some(policy.decide(None, method_arn));
        };

        if let Some(decision) = self.cache.get(credential, method_arn).await {
            tracing::debug!(effect = %decision.effect, "Authorizer cache hit");
            return Some(decision);
        }
        let decision = policy.decide(Some(credential), method_arn);
        self.cache
            .insert(credential, method_arn, decision.clone())
            .await;
        Some(decision)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn set_headers(response: &mut Response, headers: Vec<(&'static str, String)>) {
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
}

fn schema_errors(validator: &jsonschema::Validator, instance: &Value, code: &str) -> Vec<Value> {
    validator
        .iter_errors(instance)
        .map(|e| json!({ "code": code, "message": e.to_string() }))
        .collect()
}

/// Query and path parameters as one JSON object of strings.
fn params_instance(query: &HashMap<String, String>, path_params: &HashMap<String, String>) -> Value {
    let object = query
        .iter()
        .chain(path_params.iter())
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(object)
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

fn missing_authentication_token() -> Response {
    error_response(
        StatusCode::FORBIDDEN,
        "MissingAuthenticationToken",
        "Missing Authentication Token",
    )
}

fn proxy_response(proxy: ProxyResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(proxy.status_code) else {
        tracing::error!(status = proxy.status_code, "Handler returned an invalid status code");
        return error_response(StatusCode::BAD_GATEWAY, "BadGateway", "Internal server error");
    };
    let mut response = (status, proxy.body).into_response();
    for (name, value) in &proxy.headers {
        match (
            header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid handler response header"),
        }
    }
    response
}
