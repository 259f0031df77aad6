pub mod authorizer;
pub mod cors;
pub mod integrator;
pub mod model_namer;
pub mod route_table;
pub mod validator;

pub use authorizer::{AuthorizationPolicy, Effect, PolicyDecision, ScopeMode};
pub use cors::CorsPolicy;
pub use integrator::{BindError, GatewayIntegrator, HandlerRef, IntegrationRecord};
pub use route_table::{HttpVerb, MethodDescriptor, RouteTable};
pub use validator::ValidatorKind;
