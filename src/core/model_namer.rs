//! Stable identifiers for generated request/response schema models.
//!
//! Names are derived from the path and verb, then right-aligned to
//! [`MAX_MODEL_NAME_LEN`] characters. Truncation can make two routes collide;
//! [`ModelRegistry`] turns that into a configuration error instead of letting
//! one model silently replace another.
use std::{collections::HashMap, fmt};

use serde::Serialize;

use crate::{
    config::validation::{ValidationError, ValidationResult},
    core::route_table::HttpVerb,
};

pub const MAX_MODEL_NAME_LEN: usize = 50;

/// Shared 400 body: `{ errors: [ { code, message } ] }`.
pub const BAD_REQUEST_ERROR_LIST_MODEL: &str = "BadRequestErrorListDTO";
/// Shared 403/409 body: `{ code, message }`.
pub const ERROR_MODEL: &str = "ErrorDTO";

/// Name of the request model for `verb` on `path`.
pub fn model_name(path: &str, verb: HttpVerb) -> String {
    keep_suffix(format!("{}{}", path_identifier(path), verb.title_case()))
}

/// Name of the 200 response model for `verb` on `path`.
pub fn response_model_name(path: &str, verb: HttpVerb) -> String {
    keep_suffix(format!(
        "{}{}Response",
        path_identifier(path),
        verb.title_case()
    ))
}

fn path_identifier(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(title_case)
        .collect()
}

fn title_case(segment: &str) -> String {
    let mut chars = segment.chars().filter(char::is_ascii_alphanumeric);
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.collect::<String>(),
        None => String::new(),
    }
}

fn keep_suffix(name: String) -> String {
    let len = name.chars().count();
    if len <= MAX_MODEL_NAME_LEN {
        name
    } else {
        name.chars().skip(len - MAX_MODEL_NAME_LEN).collect()
    }
}

/// Whether a model describes a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Request,
    Response,
}

/// Who a registered model name belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOwner {
    Method {
        path: String,
        verb: HttpVerb,
        role: ModelRole,
    },
    /// Gateway-wide error models.
    Shared,
}

impl fmt::Display for ModelOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelOwner::Method { path, verb, role } => write!(f, "{role:?} model of {verb} {path}"),
            ModelOwner::Shared => f.write_str("shared error model"),
        }
    }
}

/// Tracks every model name registered on a gateway.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    owners: HashMap<String, ModelOwner>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `owner`. Returns `Ok(true)` when newly registered and
    /// `Ok(false)` when the same owner already holds it.
    pub fn register(&mut self, name: &str, owner: ModelOwner) -> ValidationResult<bool> {
        match self.owners.get(name) {
            Some(existing) if *existing == owner => Ok(false),
            Some(existing) => Err(ValidationError::ModelNameCollision {
                name: name.to_string(),
                existing: existing.to_string(),
                requested: owner.to_string(),
            }),
            None => {
                self.owners.insert(name.to_string(), owner);
                Ok(true)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
