pub mod credential_verifier;
pub mod function_handler;
pub mod provisioner;

pub use credential_verifier::CredentialVerifier;
pub use function_handler::{FunctionHandler, HandlerError, ProxyEvent, ProxyResponse};
pub use provisioner::{ProvisionError, Provisioner, RemovalPolicy};
