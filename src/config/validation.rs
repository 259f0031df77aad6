#![allow(clippy::collapsible_if)]

use std::{collections::BTreeMap, net::SocketAddr, time::Duration};

use regex::Regex;

use crate::{
    config::models::{AuthorizerConfig, GatewayConfig},
    core::{
        cors::{API_KEY_HEADER, CorsPolicy},
        model_namer::{
            BAD_REQUEST_ERROR_LIST_MODEL, ERROR_MODEL, ModelOwner, ModelRegistry, ModelRole,
            model_name, response_model_name,
        },
        route_table::{HttpVerb, RouteTable},
    },
};

/// Longest authorizer result cache the provider accepts.
pub const MAX_AUTHORIZER_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration errors. All of them are fatal at wiring time.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Unknown HTTP verb '{verb}' (expected GET, POST, PUT, PATCH or DELETE)")]
    UnknownVerb { verb: String },

    #[error("Duplicate verb {verb} on path '{path}'")]
    DuplicateVerb { path: String, verb: HttpVerb },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Model name '{name}' is claimed by {existing} and {requested}")]
    ModelNameCollision {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Invalid JSON schema at {field}: {message}")]
    InvalidSchema { field: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ValidationError {
    /// Collapse several errors into one; a single error is returned as is.
    pub fn aggregate(mut errors: Vec<ValidationError>) -> ValidationError {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        ValidationError::ValidationFailed {
            message: format_multiple_errors(&errors),
        }
    }
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(mut api_errors) = Self::validate_api(config) {
            errors.append(&mut api_errors);
        }

        if let Err(e) = Self::validate_listen_address(&config.server.listen_addr) {
            errors.push(e);
        }

        if config.integrations.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "integrations".to_string(),
            });
        }

        for (handler, table) in &config.integrations {
            if handler.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: "integrations".to_string(),
                    message: "Handler names cannot be empty".to_string(),
                });
            }
            if table.is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("integrations.{handler}"),
                    message: "An integration must declare at least one route".to_string(),
                });
            }
            if let Err(mut table_errors) = table.validate() {
                errors.append(&mut table_errors);
            }
            if let Err(mut schema_errors) = Self::validate_schemas(handler, table) {
                errors.append(&mut schema_errors);
            }
        }

        if let Err(mut conflicts) = Self::check_route_conflicts(&config.integrations) {
            errors.append(&mut conflicts);
        }

        if let Err(mut collisions) = Self::check_model_names(&config.integrations) {
            errors.append(&mut collisions);
        }

        if let Err(mut authorizer_errors) =
            Self::validate_authorizer(&config.authorizer, &config.cors, &config.api.stage)
        {
            errors.append(&mut authorizer_errors);
        }

        let needs_api_key = config
            .integrations
            .values()
            .flat_map(|table| table.iter().flat_map(|(_, methods)| methods.iter()))
            .any(|m| m.api_key_required);
        if needs_api_key && !config.cors.allows_header(API_KEY_HEADER) {
            errors.push(ValidationError::InvalidField {
                field: "cors.allow_headers".to_string(),
                message: format!(
                    "Routes require an API key but '{API_KEY_HEADER}' is not an allowed header"
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: format_multiple_errors(&errors),
            })
        }
    }

    fn validate_api(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
        let api = &config.api;
        let mut errors = Vec::new();

        let name_regex = Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("invalid api name regex");
        if !name_regex.is_match(&api.name) {
            errors.push(ValidationError::InvalidField {
                field: "api.name".to_string(),
                message: format!("Invalid API name '{}'", api.name),
            });
        }

        let stage_regex = Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("invalid stage regex");
        if !stage_regex.is_match(&api.stage) {
            errors.push(ValidationError::InvalidField {
                field: "api.stage".to_string(),
                message: "Stage names may only contain alphanumerics, '-' and '_'".to_string(),
            });
        }

        let account_regex = Regex::new(r"^\d{12}$").expect("invalid account regex");
        if !account_regex.is_match(&api.account_id) {
            errors.push(ValidationError::InvalidField {
                field: "api.account_id".to_string(),
                message: "Account id must be 12 digits".to_string(),
            });
        }

        let region_regex = Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d$").expect("invalid region regex");
        if !region_regex.is_match(&api.region) {
            errors.push(ValidationError::InvalidField {
                field: "api.region".to_string(),
                message: format!("Invalid region '{}'", api.region),
            });
        }

        if api.api_id.trim().is_empty() || api.api_id.contains('/') {
            errors.push(ValidationError::InvalidField {
                field: "api.api_id".to_string(),
                message: "API id cannot be empty or contain '/'".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_authorizer(
        config: &AuthorizerConfig,
        cors: &CorsPolicy,
        api_stage: &str,
    ) -> Result<(), Vec<ValidationError>> {
        if !config.enabled {
            return Ok(());
        }

        let mut errors = Vec::new();

        if config.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "authorizer.name".to_string(),
            });
        }

        if config.identity_header.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "authorizer.identity_header".to_string(),
            });
        } else if !cors.allows_header(&config.identity_header) {
            errors.push(ValidationError::InvalidField {
                field: "cors.allow_headers".to_string(),
                message: format!(
                    "Identity header '{}' must be an allowed CORS header",
                    config.identity_header
                ),
            });
        }

        match config.cache_ttl() {
            Ok(ttl) if ttl > MAX_AUTHORIZER_CACHE_TTL => {
                errors.push(ValidationError::InvalidField {
                    field: "authorizer.cache_ttl".to_string(),
                    message: format!(
                        "Cache TTL cannot exceed {}",
                        humantime::format_duration(MAX_AUTHORIZER_CACHE_TTL)
                    ),
                });
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "authorizer.cache_ttl".to_string(),
                message: format!("Invalid duration '{}': {e}", config.cache_ttl),
            }),
        }

        if let crate::core::authorizer::ScopeMode::StageWildcard { stage } = &config.scope {
            if stage.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "authorizer.scope.stage".to_string(),
                });
            } else if stage != api_stage {
                errors.push(ValidationError::InvalidField {
                    field: "authorizer.scope.stage".to_string(),
                    message: format!("Wildcard stage '{stage}' must match api.stage '{api_stage}'"),
                });
            }
        }

        if config.tokens.iter().any(|t| t.is_empty()) {
            errors.push(ValidationError::InvalidField {
                field: "authorizer.tokens".to_string(),
                message: "Tokens cannot be empty strings".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Every request/response schema must compile.
    fn validate_schemas(handler: &str, table: &RouteTable) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (path, methods) in table.iter() {
            for method in methods {
                let schemas = [
                    ("request_schema", &method.request_schema),
                    ("response_schema", &method.response_schema),
                ];
                for (field, schema) in schemas {
                    if let Some(schema) = schema {
                        if let Err(e) = jsonschema::validator_for(schema) {
                            errors.push(ValidationError::InvalidSchema {
                                field: format!(
                                    "integrations.{handler}.'{path}'.{}.{field}",
                                    method.verb
                                ),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// A (path, verb) may only be served by one handler.
    fn check_route_conflicts(
        integrations: &BTreeMap<String, RouteTable>,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut owners: BTreeMap<(&str, HttpVerb), &str> = BTreeMap::new();

        for (handler, table) in integrations {
            for (path, methods) in table.iter() {
                for method in methods {
                    if let Some(other) = owners.insert((path, method.verb), handler) {
                        errors.push(ValidationError::RouteConflict {
                            message: format!(
                                "{} {path} is bound by both '{other}' and '{handler}'",
                                method.verb
                            ),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Simulate model registration for the whole configuration so truncation
    /// collisions surface before anything is provisioned.
    fn check_model_names(
        integrations: &BTreeMap<String, RouteTable>,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut registry = ModelRegistry::new();
        for shared in [BAD_REQUEST_ERROR_LIST_MODEL, ERROR_MODEL] {
            let _ = registry.register(shared, ModelOwner::Shared);
        }

        for table in integrations.values() {
            for (path, methods) in table.iter() {
                for method in methods {
                    let mut claims = Vec::new();
                    if method.request_schema.is_some() {
                        claims.push((model_name(path, method.verb), ModelRole::Request));
                    }
                    if method.response_schema.is_some() {
                        claims.push((response_model_name(path, method.verb), ModelRole::Response));
                    }
                    for (name, role) in claims {
                        let owner = ModelOwner::Method {
                            path: path.to_string(),
                            verb: method.verb,
                            role,
                        };
                        if let Err(e) = registry.register(&name, owner) {
                            errors.push(e);
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Format multiple validation errors into a single message
fn format_multiple_errors(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return "No errors".to_string();
    }

    if errors.len() == 1 {
        return errors[0].to_string();
    }

    let mut message = format!("Found {} validation errors:\n", errors.len());
    for (i, error) in errors.iter().enumerate() {
        message.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    message
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::models::ApiConfig,
        core::{authorizer::ScopeMode, route_table::MethodDescriptor},
    };

    fn minimal_valid_config() -> GatewayConfig {
        GatewayConfig::builder()
            .api(ApiConfig {
                account_id: "123456789012".to_string(),
                api_id: "abc123".to_string(),
                ..ApiConfig::default()
            })
            .integration(
                "operations",
                RouteTable::new().route(
                    "/api/v1/operations/products",
                    vec![MethodDescriptor::new(HttpVerb::Get).with_authorizer()],
                ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert_eq!(GatewayConfigValidator::validate(&minimal_valid_config()), Ok(()));
    }

    #[test]
    fn validate_rejects_route_bound_by_two_handlers() {
        let mut config = minimal_valid_config();
        config.integrations.insert(
            "shadow".to_string(),
            RouteTable::new().route(
                "/api/v1/operations/products",
                vec![MethodDescriptor::new(HttpVerb::Get)],
            ),
        );

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("bound by both"));
    }

    #[test]
    fn validate_rejects_duplicate_verbs() {
        let mut config = minimal_valid_config();
        config.integrations.insert(
            "cloudflare".to_string(),
            RouteTable::new().route(
                "/api/v1/cloudflare",
                vec![
                    MethodDescriptor::new(HttpVerb::Post),
                    MethodDescriptor::new(HttpVerb::Post).with_api_key(),
                ],
            ),
        );

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Duplicate verb POST"));
    }

    #[test]
    fn validate_rejects_uncompilable_schemas() {
        let mut config = minimal_valid_config();
        config.integrations.insert(
            "cloudflare".to_string(),
            RouteTable::new().route(
                "/api/v1/cloudflare",
                vec![MethodDescriptor::new(HttpVerb::Post)
                    .with_request_schema(json!({ "type": "not-a-type" }))],
            ),
        );

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON schema"));
    }

    #[test]
    fn validate_rejects_model_name_collisions() {
        let tail = "/abcdefghijklmnopqrstuvwxyz/abcdefghijklmnopqrstuvwxyz";
        let mut config = minimal_valid_config();
        config.integrations.insert(
            "payments".to_string(),
            RouteTable::new()
                .route(
                    format!("/alpha{tail}"),
                    vec![MethodDescriptor::new(HttpVerb::Post)
                        .with_request_schema(json!({ "type": "object" }))],
                )
                .route(
                    format!("/bravo{tail}"),
                    vec![MethodDescriptor::new(HttpVerb::Post)
                        .with_request_schema(json!({ "type": "object" }))],
                ),
        );

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Model name"));
    }

    #[test]
    fn validate_rejects_identity_header_missing_from_cors() {
        let mut config = minimal_valid_config();
        config.cors.allow_headers.retain(|h| h != "x-pg-token");
        assert!(GatewayConfigValidator::validate(&config).is_err());

        config.authorizer.enabled = false;
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_excessive_cache_ttl() {
        let mut config = minimal_valid_config();
        config.authorizer.cache_ttl = "2h".to_string();
        assert!(GatewayConfigValidator::validate(&config).is_err());

        config.authorizer.cache_ttl = "soon".to_string();
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_empty_wildcard_stage() {
        let mut config = minimal_valid_config();
        config.authorizer.scope = ScopeMode::StageWildcard {
            stage: String::new(),
        };
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_wildcard_stage_other_than_api_stage() {
        let mut config = minimal_valid_config();
        config.authorizer.scope = ScopeMode::StageWildcard {
            stage: "dev".to_string(),
        };
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("must match api.stage 'prod'"));

        config.authorizer.scope = ScopeMode::StageWildcard {
            stage: "prod".to_string(),
        };
        assert_eq!(GatewayConfigValidator::validate(&config), Ok(()));
    }

    #[test]
    fn aggregate_keeps_single_errors_intact() {
        let single = ValidationError::UnknownVerb {
            verb: "TRACE".to_string(),
        };
        assert_eq!(ValidationError::aggregate(vec![single.clone()]), single);

        let many = ValidationError::aggregate(vec![single.clone(), single]);
        assert!(matches!(many, ValidationError::ValidationFailed { .. }));
    }
}
