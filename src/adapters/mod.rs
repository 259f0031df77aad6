pub mod decision_cache;
pub mod digest_store;
pub mod function_handler;
pub mod http_handler;
pub mod middleware;
pub mod plan_provisioner;

/// Re-export commonly used types from adapters
pub use decision_cache::DecisionCache;
pub use digest_store::{ApiKeyStore, DigestTokenVerifier};
pub use function_handler::{GreetingHandler, HandlerRegistry};
pub use http_handler::{EmulatorError, EmulatorOptions, LocalGateway};
pub use plan_provisioner::{PlanProvisioner, ProvisionPlan};
