use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use pg_gateway::{
    adapters::{DigestTokenVerifier, EmulatorOptions, LocalGateway, PlanProvisioner},
    config::{GatewayConfig, GatewayConfigValidator, loader::load_config},
    core::{AuthorizationPolicy, GatewayIntegrator, HandlerRef},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "pg-gateway.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "pg-gateway.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "pg-gateway.yaml")]
        config: String,
    },
    /// Bind every integration and print the resulting wiring as JSON
    Plan {
        #[clap(short, long, default_value = "pg-gateway.yaml")]
        config: String,
    },
    /// Run the authorizer once and print the policy document
    Authorize {
        #[clap(short, long, default_value = "pg-gateway.yaml")]
        config: String,
        /// Credential to check
        #[clap(long, requires = "method_arn", conflicts_with = "event")]
        token: Option<String>,
        /// Method ARN the credential is presented for
        #[clap(long)]
        method_arn: Option<String>,
        /// JSON file holding a raw authorizer event
        #[clap(long)]
        event: Option<String>,
    },
    /// Start the local gateway emulator (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "pg-gateway.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Plan { config }) => plan_command(&config).await,
        Some(Commands::Authorize {
            config,
            token,
            method_arn,
            event,
        }) => authorize_command(&config, token, method_arn, event).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

/// Load, validate and bind every integration through an in-memory provisioner.
fn build_integrator(config: &GatewayConfig) -> Result<(GatewayIntegrator, Arc<PlanProvisioner>)> {
    GatewayConfigValidator::validate(config).context("Configuration is invalid")?;

    let provisioner = Arc::new(PlanProvisioner::new());
    let mut integrator = GatewayIntegrator::new(config, provisioner.clone())
        .context("Failed to provision gateway base resources")?;

    if let Some(binding) = config
        .authorizer
        .binding()
        .map_err(|e| eyre!("Invalid authorizer.cache_ttl: {e}"))?
    {
        integrator.attach_authorizer(binding);
    }

    for (handler, table) in &config.integrations {
        integrator
            .bind(table, &HandlerRef::new(handler.as_str()))
            .with_context(|| format!("Failed to bind integration '{handler}'"))?;
    }

    Ok((integrator, provisioner))
}

async fn serve_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing_with_config(&config.logging)?;
    tracing::info!("Loaded configuration from {config_path}");

    let (integrator, _) = build_integrator(&config)?;
    let options = EmulatorOptions::from_config(&config)?;
    let gateway = LocalGateway::new(&integrator, options).context("Failed to build local gateway")?;

    for record in integrator.records() {
        tracing::info!(
            verb = %record.verb,
            path = %record.path,
            handler = %record.handler,
            validator = ?record.validator_kind,
            api_key = record.api_key_required,
            authorizer = record.authorizer_attached,
            "Route bound"
        );
    }

    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    tokio::spawn(
        gateway
            .decision_cache()
            .run_purge_loop(graceful_shutdown.subscribe()),
    );

    tracing::info!(
        api = %config.api.name,
        stage = %config.api.stage,
        "pg-gateway local emulator listening on {}",
        addr
    );
    println!("pg-gateway listening on {addr} (stage: {})", config.api.stage);

    let shutdown = graceful_shutdown.clone();
    axum::serve(listener, gateway.router())
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!(?reason, "Stopping local emulator");
        })
        .await
        .context("Server error")?;

    let report = integrator.teardown().context("Teardown failed")?;
    for resource in &report.retained {
        tracing::info!(%resource, "Retained");
    }
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Print the integration records and the provisioning plan as JSON.
async fn plan_command(config_path: &str) -> Result<()> {
    tracing_setup::init_console_tracing()?;

    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let (integrator, provisioner) = build_integrator(&config)?;

    let records: Vec<_> = integrator.records().collect();
    let plan = provisioner.snapshot()?;
    let output = serde_json::json!({
        "api": config.api.name,
        "stage": config.api.stage,
        "execution_arn": integrator.execution_arn(),
        "records": records,
        "provisioning": plan,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn authorize_command(
    config_path: &str,
    token: Option<String>,
    method_arn: Option<String>,
    event: Option<String>,
) -> Result<()> {
    tracing_setup::init_console_tracing()?;

    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let authorizer = &config.authorizer;
    let policy = AuthorizationPolicy::new(
        Arc::new(DigestTokenVerifier::new(&authorizer.tokens)),
        authorizer.scope.clone(),
    )
    .with_identity_header(authorizer.identity_header.clone());

    let response = match (event, token, method_arn) {
        (Some(event_path), _, _) => {
            let raw = tokio::fs::read_to_string(&event_path)
                .await
                .with_context(|| format!("Failed to read event file {event_path}"))?;
            let event: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("Event file {event_path} is not valid JSON"))?;
            policy.handle_event(&event)?
        }
        (None, Some(token), Some(method_arn)) => {
            policy.decide(Some(&token), &method_arn).to_response()
        }
        _ => return Err(eyre!("Provide either --event <file> or --token with --method-arn")),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • API: {} (stage {})", config.api.name, config.api.stage);
            println!("   • Execution ARN: {}", config.api.execution_arn());
            println!("   • Integrations: {}", config.integrations.len());
            println!("   • Methods: {}", config.method_count());
            println!(
                "   • Authorizer: {}",
                if config.authorizer.enabled {
                    config.authorizer.name.as_str()
                } else {
                    "disabled"
                }
            );
            println!("   • API keys: {}", config.usage_plan.api_keys.len());
            println!("   • Listen Address: {}", config.server.listen_addr);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Paths must start with '/' and use '{{param}}' for parameters");
            println!("   • Verbs must be one of GET, POST, PUT, PATCH, DELETE");
            println!("   • Add 'x-pg-token' and 'x-api-key' to cors.allow_headers");
            println!("   • Use humantime durations for authorizer.cache_ttl (e.g. '5m')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# pg-gateway configuration

api:
  name: pg_api
  description: Payment Gateway API
  stage: prod
  region: us-east-1
  account_id: "000000000000"
  api_id: local

authorizer:
  enabled: true
  name: PGApiAuthorizer
  identity_header: x-pg-token
  cache_ttl: 5m
  scope:
    mode: exact_method
  # Tokens accepted by the local authorizer
  tokens:
    - change-me

access_logs:
  retention_days: 14
  removal_policy: destroy

usage_plan:
  api_keys: []
  removal_policy: destroy

integrations:
  operations:
    "/api/v1/operations/products":
      - verb: GET
        authorizer_required: true
    "/api/v1/operations/purchase":
      - verb: GET
        authorizer_required: true
      - verb: POST
        authorizer_required: true
      - verb: PATCH
        authorizer_required: true
  cloudflare:
    "/api/v1/cloudflare":
      - verb: POST
        api_key_required: false

server:
  listen_addr: "127.0.0.1:3000"

logging:
  level: info
  json: true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'pg-gateway serve --config {config_path}' to start the local gateway");
    Ok(())
}
