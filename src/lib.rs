//! pg-gateway - route binding and request authorization for a serverless payment gateway API.
//!
//! The crate turns declarative route tables into a fully wired REST surface: per
//! (path, verb) it selects a request validator, names and registers schema models,
//! attaches the request authorizer and the CORS preflight, and grants the handler
//! invoke permission. It also ships the authorization decision point used at
//! request time and a local emulator that enforces the resulting wiring over HTTP.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use pg_gateway::{
//!     adapters::PlanProvisioner,
//!     config::GatewayConfig,
//!     core::{GatewayIntegrator, HandlerRef, HttpVerb, MethodDescriptor, RouteTable},
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let table = RouteTable::new().route(
//!     "/api/v1/operations/products",
//!     vec![MethodDescriptor::new(HttpVerb::Get).with_authorizer()],
//! );
//! let config = GatewayConfig::builder()
//!     .integration("operations", table.clone())
//!     .build()
//!     .map_err(|e| eyre::eyre!(e))?;
//!
//! let mut integrator = GatewayIntegrator::new(&config, Arc::new(PlanProvisioner::new()))?;
//! let records = integrator.bind(&table, &HandlerRef::new("operations"))?;
//! assert_eq!(records.len(), 1);
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the wiring and decision logic inside `core`:
//! - `core`: route tables, validator selection, model naming, CORS, the integrator and the
//!   authorization policy. Everything here is synchronous.
//! - `ports`: `Provisioner`, `CredentialVerifier` and `FunctionHandler`.
//! - `adapters`: the in-memory `PlanProvisioner`, SHA-256 credential stores, the authorizer
//!   decision cache and the axum-based `LocalGateway`.
//!
//! # Error Handling
//! Wiring errors are typed (`ValidationError`, `ProvisionError`, `BindError`) and are
//! collected before anything is provisioned. Application code uses `eyre::Result<T>` with
//! `WrapErr` context.
//!
//! # Concurrency & Data Structures
//! Authorizer decisions are cached in a `scc::HashMap` shared by every request handled by
//! the local emulator.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{LocalGateway, PlanProvisioner},
    config::{GatewayConfig, GatewayConfigValidator},
    core::{AuthorizationPolicy, GatewayIntegrator, HandlerRef, RouteTable},
    utils::GracefulShutdown,
};
