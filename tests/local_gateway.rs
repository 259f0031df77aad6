// End-to-end requests through the local gateway emulator
#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use pg_gateway::{
        adapters::{EmulatorOptions, LocalGateway, PlanProvisioner},
        config::{AuthorizerConfig, GatewayConfig},
        core::{GatewayIntegrator, HandlerRef, HttpVerb, MethodDescriptor, RouteTable},
        utils::{GracefulShutdown, ShutdownReason},
        ports::{
            FunctionHandler, HandlerError, ProxyEvent, ProxyResponse,
            function_handler::HandlerResult,
        },
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const TOKEN: &str = "s3cr3t";
    const API_KEY: &str = "local-key";

    struct FailingHandler;

    #[async_trait]
    impl FunctionHandler for FailingHandler {
        async fn invoke(&self, _event: ProxyEvent) -> HandlerResult<ProxyResponse> {
            Err(HandlerError::Failed {
                handler: "payments".to_string(),
                message: "upstream timeout".to_string(),
            })
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::builder()
            .authorizer(AuthorizerConfig {
                tokens: vec![TOKEN.to_string()],
                ..AuthorizerConfig::default()
            })
            .api_key(API_KEY)
            .integration(
                "operations",
                RouteTable::new().route(
                    "/api/v1/operations/products",
                    vec![MethodDescriptor::new(HttpVerb::Get).with_authorizer()],
                ),
            )
            .integration(
                "cloudflare",
                RouteTable::new().route(
                    "/api/v1/cloudflare",
                    vec![MethodDescriptor::new(HttpVerb::Post)
                        .with_api_key()
                        .with_request_schema(json!({
                            "type": "object",
                            "properties": { "event": { "type": "string" } },
                            "required": ["event"]
                        }))],
                ),
            )
            .integration(
                "payments",
                RouteTable::new().route(
                    "/api/v1/payments",
                    vec![MethodDescriptor::new(HttpVerb::Post)],
                ),
            )
            .build()
            .unwrap()
    }

    fn gateway() -> LocalGateway {
        gateway_with(config())
    }

    fn gateway_with(config: GatewayConfig) -> LocalGateway {
        let mut integrator =
            GatewayIntegrator::new(&config, Arc::new(PlanProvisioner::new())).unwrap();
        integrator.attach_authorizer(config.authorizer.binding().unwrap().unwrap());
        for (handler, table) in &config.integrations {
            integrator
                .bind(table, &HandlerRef::new(handler.as_str()))
                .unwrap();
        }

        let mut options = EmulatorOptions::from_config(&config).unwrap();
        options
            .handlers
            .register("payments", Arc::new(FailingHandler));
        LocalGateway::new(&integrator, options).unwrap()
    }

    async fn send(gateway: &LocalGateway, request: Request<Body>) -> Response {
        gateway.router().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_products(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/v1/operations/products");
        if let Some(token) = token {
            builder = builder.header("x-pg-token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_cloudflare(api_key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/cloudflare")
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_answers_with_cors_headers() {
        let gateway = gateway();
        let response = send(
            &gateway,
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/cloudflare")
                .header("origin", "https://shop.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "https://shop.example"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");
        let methods = headers["access-control-allow-methods"].to_str().unwrap();
        assert!(methods.contains("POST"));
        let allowed = headers["access-control-allow-headers"].to_str().unwrap();
        assert!(allowed.contains("x-pg-token"));
        assert!(headers.contains_key("x-amzn-requestid"));
    }

    #[tokio::test]
    async fn test_authorizer_guards_protected_routes() {
        let gateway = gateway();

        // Test 1: no credential is denied and not cached
        let response = send(&gateway, get_products(None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "AccessDenied");
        assert_eq!(gateway.cached_decisions(), 0);

        // Test 2: wrong credential is denied
        let response = send(&gateway, get_products(Some("nope"))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Test 3: valid credential reaches the handler
        let response = send(&gateway, get_products(Some(TOKEN))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
        assert_eq!(json_body(response).await["message"], "Hello from Lambda!");

        // Test 4: repeated request is served from the decision cache
        let response = send(&gateway, get_products(Some(TOKEN))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gateway.cached_decisions(), 2);
    }

    #[tokio::test]
    async fn test_api_key_and_body_validation() {
        let gateway = gateway();

        let response = send(&gateway, post_cloudflare(None, r#"{"event":"purge"}"#)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "Forbidden");

        let response = send(
            &gateway,
            post_cloudflare(Some("wrong-key"), r#"{"event":"purge"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&gateway, post_cloudflare(Some(API_KEY), "{}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["code"], "InvalidRequestBody");

        let response = send(&gateway, post_cloudflare(Some(API_KEY), "not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &gateway,
            post_cloudflare(Some(API_KEY), r#"{"event":"purge"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unbound_paths_and_verbs() {
        let gateway = gateway();

        let response = send(
            &gateway,
            Request::builder()
                .uri("/api/v1/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "MissingAuthenticationToken");

        let response = send(
            &gateway,
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/v1/cloudflare")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "MissingAuthenticationToken");
    }

    #[tokio::test]
    async fn test_handler_failure_is_a_bad_gateway() {
        let gateway = gateway();
        let response = send(
            &gateway,
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/payments")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["code"], "BadGateway");
    }

    #[tokio::test]
    async fn test_expired_decisions_are_purged() {
        let mut config = config();
        config.authorizer.cache_ttl = "50ms".to_string();
        let gateway = gateway_with(config);

        let shutdown = GracefulShutdown::new();
        let sweeper = tokio::spawn(
            gateway
                .decision_cache()
                .run_purge_loop(shutdown.subscribe()),
        );

        // Test 1: every unknown credential leaves a cached deny behind
        for i in 0..100 {
            let response = send(&gateway, get_products(Some(&format!("junk-{i}")))).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        assert!(gateway.cached_decisions() > 0);

        // Test 2: once the TTL has passed the cache is emptied without new traffic
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(gateway.cached_decisions(), 0);

        shutdown.trigger_shutdown(ShutdownReason::Requested);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }
}
