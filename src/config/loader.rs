use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix of environment overrides, e.g. `PG_GATEWAY__API__STAGE=dev`.
pub const ENV_PREFIX: &str = "PG_GATEWAY";
pub const ENV_SEPARATOR: &str = "__";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(gateway_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::core::route_table::HttpVerb;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
api:
  name: "pg_api"
  stage: "prod"
  account_id: "123456789012"
  api_id: "abc123"
authorizer:
  cache_ttl: "300s"
  tokens: ["local-token"]
integrations:
  operations:
    "/api/v1/operations/products":
      - verb: GET
        authorizer_required: true
    "/api/v1/operations/purchase":
      - verb: POST
        authorizer_required: true
        request_schema:
          type: object
          required: ["product_id"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.api.account_id, "123456789012");
        assert_eq!(config.method_count(), 2);
        assert_eq!(config.authorizer.tokens, vec!["local-token".to_string()]);

        let table = &config.integrations["operations"];
        let post = table
            .descriptor("/api/v1/operations/purchase", HttpVerb::Post)
            .unwrap();
        assert!(post.authorizer_required);
        assert!(post.request_schema.is_some());
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "api": { "stage": "dev" },
  "usage_plan": { "api_keys": ["local-key"] },
  "integrations": {
    "cloudflare": {
      "/api/v1/cloudflare": [
        { "verb": "post", "api_key_required": true }
      ]
    }
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.api.stage, "dev");
        assert_eq!(config.usage_plan.api_keys.len(), 1);
        let post = config.integrations["cloudflare"]
            .descriptor("/api/v1/cloudflare", HttpVerb::Post)
            .unwrap();
        assert!(post.api_key_required);
        assert!(!post.authorizer_required);
    }

    #[test]
    fn test_unknown_verb_is_rejected() {
        let yaml_content = r#"
integrations:
  operations:
    "/api/v1/operations/products":
      - verb: TRACE
"#;
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        assert!(load_config_sync(temp_file.path().to_str().unwrap()).is_err());
    }
}
