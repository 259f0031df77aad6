//! Request validator selection.
use serde::{Deserialize, Serialize};

use crate::core::route_table::{HttpVerb, MethodDescriptor};

/// Which part of an inbound request is schema-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidatorKind {
    None,
    Body,
    Params,
}

/// Gateway-level request validator, registered once and shared by every
/// method of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestValidatorSpec {
    pub name: String,
    pub validate_request_body: bool,
    pub validate_request_parameters: bool,
}

impl ValidatorKind {
    /// The shared validator backing this kind, `None` for [`ValidatorKind::None`].
    pub fn spec(&self, api_name: &str) -> Option<RequestValidatorSpec> {
        match self {
            ValidatorKind::None => None,
            ValidatorKind::Body => Some(RequestValidatorSpec {
                name: format!("{api_name}-request-validator-body"),
                validate_request_body: true,
                validate_request_parameters: false,
            }),
            ValidatorKind::Params => Some(RequestValidatorSpec {
                name: format!("{api_name}-request-validator-params"),
                validate_request_body: false,
                validate_request_parameters: true,
            }),
        }
    }
}

/// GET carries no body, so a schema on GET describes its parameters.
pub fn select(descriptor: &MethodDescriptor) -> ValidatorKind {
    match (&descriptor.request_schema, descriptor.verb) {
        (None, _) => ValidatorKind::None,
        (Some(_), HttpVerb::Get) => ValidatorKind::Params,
        (Some(_), _) => ValidatorKind::Body,
    }
}
