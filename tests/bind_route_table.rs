// Binding route tables onto one gateway through the in-memory provisioner
#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pg_gateway::{
        adapters::PlanProvisioner,
        config::{GatewayConfig, ValidationError},
        core::{
            BindError, GatewayIntegrator, HandlerRef, HttpVerb, MethodDescriptor, RouteTable,
            ValidatorKind, integrator::ResponseModel,
        },
        ports::provisioner::RemovalPolicy,
    };
    use serde_json::json;

    fn two_by_three() -> RouteTable {
        let methods = || {
            vec![
                MethodDescriptor::new(HttpVerb::Get),
                MethodDescriptor::new(HttpVerb::Post)
                    .with_request_schema(json!({ "type": "object" })),
                MethodDescriptor::new(HttpVerb::Patch).with_api_key(),
            ]
        };
        RouteTable::new()
            .route("/api/v1/payments", methods())
            .route("/api/v1/refunds", methods())
    }

    fn integrator() -> (GatewayIntegrator, Arc<PlanProvisioner>) {
        let provisioner = Arc::new(PlanProvisioner::new());
        let integrator =
            GatewayIntegrator::new(&GatewayConfig::default(), provisioner.clone()).unwrap();
        (integrator, provisioner)
    }

    #[test]
    fn two_paths_with_three_methods_yield_six_records() {
        let (mut integrator, provisioner) = integrator();
        let records = integrator
            .bind(&two_by_three(), &HandlerRef::new("payments"))
            .unwrap();

        assert_eq!(records.len(), 6);
        for record in &records {
            let statuses: Vec<u16> = record
                .method_responses
                .iter()
                .map(|r| r.status_code)
                .collect();
            assert_eq!(statuses, vec![200, 400, 403, 409]);
            assert_eq!(record.response(400).unwrap().model.name(), "BadRequestErrorListDTO");
            assert_eq!(record.response(403).unwrap().model.name(), "ErrorDTO");
            assert_eq!(record.response(409).unwrap().model.name(), "ErrorDTO");
            assert_eq!(record.response(200).unwrap().model, ResponseModel::Empty);
            assert!(record.response(200).unwrap().response_headers.contains(
                &"method.response.header.Access-Control-Allow-Origin".to_string()
            ));
        }

        let post = integrator
            .record("/api/v1/refunds", HttpVerb::Post)
            .unwrap();
        assert_eq!(post.validator_kind, ValidatorKind::Body);
        assert_eq!(post.model_id.as_deref(), Some("ApiV1RefundsPost"));
        assert!(integrator
            .record("/api/v1/refunds", HttpVerb::Patch)
            .unwrap()
            .api_key_required);

        let plan = provisioner.snapshot().unwrap();
        assert_eq!(plan.resources.len(), 2);
        assert_eq!(plan.preflights.len(), 2);
        assert_eq!(plan.methods.len(), 6);
        assert_eq!(plan.grants.len(), 1);
        assert!(plan.method("PATCH", "/api/v1/payments").is_some());
    }

    #[test]
    fn binding_the_same_table_twice_changes_nothing() {
        let (mut integrator, provisioner) = integrator();
        let handler = HandlerRef::new("payments");

        integrator.bind(&two_by_three(), &handler).unwrap();
        let first = provisioner.snapshot().unwrap();

        let again = integrator.bind(&two_by_three(), &handler).unwrap();
        assert_eq!(again.len(), 6);

        let second = provisioner.snapshot().unwrap();
        assert_eq!(first, second);
        assert_eq!(second.grants.len(), 1);
        assert_eq!(second.preflights.len(), 2);
        assert_eq!(integrator.records().count(), 6);
    }

    #[test]
    fn new_verbs_and_paths_extend_the_surface() {
        let (mut integrator, _) = integrator();
        let handler = HandlerRef::new("payments");
        integrator.bind(&two_by_three(), &handler).unwrap();

        let extension = RouteTable::new()
            .route(
                "/api/v1/payments",
                vec![MethodDescriptor::new(HttpVerb::Delete)],
            )
            .route(
                "/api/v1/disputes",
                vec![MethodDescriptor::new(HttpVerb::Get)],
            );
        integrator.bind(&extension, &handler).unwrap();

        assert_eq!(integrator.surface().len(), 3);
        assert_eq!(integrator.surface().method_count(), 8);
        assert_eq!(
            integrator.surface().methods("/api/v1/payments").unwrap().len(),
            4
        );
    }

    #[test]
    fn redefining_a_bound_method_is_rejected() {
        let (mut integrator, provisioner) = integrator();
        let handler = HandlerRef::new("payments");
        integrator.bind(&two_by_three(), &handler).unwrap();
        let before = provisioner.snapshot().unwrap();

        let redefined = RouteTable::new().route(
            "/api/v1/payments",
            vec![MethodDescriptor::new(HttpVerb::Get).with_api_key()],
        );
        let err = integrator.bind(&redefined, &handler).unwrap_err();
        assert!(matches!(
            err,
            BindError::Configuration(ValidationError::RouteConflict { .. })
                | BindError::Configuration(ValidationError::ValidationFailed { .. })
        ));
        assert_eq!(provisioner.snapshot().unwrap(), before);
    }

    #[test]
    fn duplicate_verbs_are_rejected_before_provisioning() {
        let (mut integrator, provisioner) = integrator();
        let before = provisioner.snapshot().unwrap();

        let table = RouteTable::new().route(
            "/api/v1/payments",
            vec![
                MethodDescriptor::new(HttpVerb::Post),
                MethodDescriptor::new(HttpVerb::Post),
            ],
        );
        let err = integrator
            .bind(&table, &HandlerRef::new("payments"))
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate verb POST"));
        assert_eq!(provisioner.snapshot().unwrap(), before);
        assert!(integrator.surface().is_empty());
    }

    #[test]
    fn teardown_keeps_retained_resources() {
        let mut config = GatewayConfig::default();
        config.access_logs.removal_policy = RemovalPolicy::Retain;
        let provisioner = Arc::new(PlanProvisioner::new());
        let mut integrator = GatewayIntegrator::new(&config, provisioner.clone()).unwrap();
        integrator
            .bind(&two_by_three(), &HandlerRef::new("payments"))
            .unwrap();

        let report = integrator.teardown().unwrap();
        assert_eq!(
            report.retained,
            vec!["log group /aws/apigateway/pg_api-ApiGatewayAccessLogs".to_string()]
        );
        assert!(report
            .destroyed
            .contains(&"usage plan pg_api-usage-plan".to_string()));

        let plan = provisioner.snapshot().unwrap();
        assert!(plan.methods.is_empty());
        assert_eq!(plan.log_groups.len(), 1);
    }

    #[test]
    fn separator_only_differences_collide_on_model_names() {
        let (mut integrator, provisioner) = integrator();
        let before = provisioner.snapshot().unwrap();
        let schema = json!({ "type": "object" });

        let table = RouteTable::new()
            .route(
                "/a-b",
                vec![MethodDescriptor::new(HttpVerb::Get).with_request_schema(schema.clone())],
            )
            .route(
                "/ab",
                vec![MethodDescriptor::new(HttpVerb::Get).with_request_schema(schema)],
            );
        let err = integrator
            .bind(&table, &HandlerRef::new("payments"))
            .unwrap_err();

        match err {
            BindError::Configuration(ValidationError::ModelNameCollision { name, .. }) => {
                assert_eq!(name, "AbGet");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provisioner.snapshot().unwrap(), before);
        assert!(integrator.surface().is_empty());
    }
}
