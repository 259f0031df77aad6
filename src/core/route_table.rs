//! Declarative route table: path -> method descriptors.
//!
//! A `RouteTable` is build-time configuration owned by whoever assembles it. The
//! integrator only reads tables; its own effective surface grows exclusively
//! through [`RouteTable::union`], which refuses to overwrite an existing
//! (path, verb) with a different definition.
use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::validation::{ValidationError, ValidationResult};

/// HTTP verbs a route may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    pub const ALL: [HttpVerb; 5] = [
        HttpVerb::Get,
        HttpVerb::Post,
        HttpVerb::Put,
        HttpVerb::Patch,
        HttpVerb::Delete,
    ];

    /// Upper-case wire form (`GET`, `POST`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Delete => "DELETE",
        }
    }

    /// Title-cased form used in generated model identifiers.
    pub fn title_case(&self) -> &'static str {
        match self {
            HttpVerb::Get => "Get",
            HttpVerb::Post => "Post",
            HttpVerb::Put => "Put",
            HttpVerb::Patch => "Patch",
            HttpVerb::Delete => "Delete",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpVerb {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpVerb::Get),
            "POST" => Ok(HttpVerb::Post),
            "PUT" => Ok(HttpVerb::Put),
            "PATCH" => Ok(HttpVerb::Patch),
            "DELETE" => Ok(HttpVerb::Delete),
            _ => Err(ValidationError::UnknownVerb {
                verb: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for HttpVerb {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpVerb> for String {
    fn from(verb: HttpVerb) -> Self {
        verb.as_str().to_string()
    }
}

/// One method bound on a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub verb: HttpVerb,
    #[serde(default)]
    pub api_key_required: bool,
    #[serde(default)]
    pub authorizer_required: bool,
    #[serde(default)]
    pub request_schema: Option<Value>,
    #[serde(default)]
    pub response_schema: Option<Value>,
}

impl MethodDescriptor {
    /// A descriptor with every flag off and no schemas.
    pub fn new(verb: HttpVerb) -> Self {
        Self {
            verb,
            api_key_required: false,
            authorizer_required: false,
            request_schema: None,
            response_schema: None,
        }
    }

    pub fn with_api_key(mut self) -> Self {
        self.api_key_required = true;
        self
    }

    pub fn with_authorizer(mut self) -> Self {
        self.authorizer_required = true;
        self
    }

    pub fn with_request_schema(mut self, schema: Value) -> Self {
        self.request_schema = Some(schema);
        self
    }

    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Mapping from path to the methods bound on it.
///
/// Paths are kept sorted so every traversal (and therefore every derived
/// integration plan) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    routes: BTreeMap<String, Vec<MethodDescriptor>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Invariants are checked later by [`validate`](Self::validate).
    pub fn route(mut self, path: impl Into<String>, methods: Vec<MethodDescriptor>) -> Self {
        self.routes.entry(path.into()).or_default().extend(methods);
        self
    }

    /// Insert a path, rejecting duplicates of the path or of a verb on it.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        methods: Vec<MethodDescriptor>,
    ) -> ValidationResult<()> {
        let path = path.into();
        if self.routes.contains_key(&path) {
            return Err(ValidationError::RouteConflict {
                message: format!("Path '{path}' is already defined in this route table"),
            });
        }
        Self::check_unique_verbs(&path, &methods)?;
        self.routes.insert(path, methods);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Total number of (path, verb) pairs.
    pub fn method_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MethodDescriptor])> {
        self.routes
            .iter()
            .map(|(path, methods)| (path.as_str(), methods.as_slice()))
    }

    pub fn methods(&self, path: &str) -> Option<&[MethodDescriptor]> {
        self.routes.get(path).map(Vec::as_slice)
    }

    pub fn descriptor(&self, path: &str, verb: HttpVerb) -> Option<&MethodDescriptor> {
        self.methods(path)?.iter().find(|m| m.verb == verb)
    }

    /// Check path syntax and the one-descriptor-per-verb invariant.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (path, methods) in &self.routes {
            if let Err(e) = validate_path(path) {
                errors.push(e);
            }
            if methods.is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{path}'"),
                    message: "A path must declare at least one method".to_string(),
                });
            }
            if let Err(e) = Self::check_unique_verbs(path, methods) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Every conflict `other` would raise if unioned into `self`.
    ///
    /// A (path, verb) already present with an identical descriptor is not a
    /// conflict; it is simply already bound.
    pub fn union_conflicts(&self, other: &RouteTable) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (path, methods) in other.iter() {
            for method in methods {
                if let Some(existing) = self.descriptor(path, method.verb) {
                    if existing != method {
                        errors.push(ValidationError::RouteConflict {
                            message: format!(
                                "{} {path} is already bound with a different definition",
                                method.verb
                            ),
                        });
                    }
                }
            }
        }
        errors
    }

    /// Fail-fast, non-destructive union. Either every entry of `other` is
    /// merged or nothing is.
    pub fn union(&mut self, other: &RouteTable) -> ValidationResult<()> {
        let conflicts = self.union_conflicts(other);
        if let Some(first) = conflicts.into_iter().next() {
            return Err(first);
        }

        for (path, methods) in other.iter() {
            let entry = self.routes.entry(path.to_string()).or_default();
            for method in methods {
                if !entry.iter().any(|m| m.verb == method.verb) {
                    entry.push(method.clone());
                }
            }
        }
        Ok(())
    }

    fn check_unique_verbs(path: &str, methods: &[MethodDescriptor]) -> ValidationResult<()> {
        for (i, method) in methods.iter().enumerate() {
            if methods[..i].iter().any(|m| m.verb == method.verb) {
                return Err(ValidationError::DuplicateVerb {
                    path: path.to_string(),
                    verb: method.verb,
                });
            }
        }
        Ok(())
    }
}

/// Paths start with `/`, have no empty or dot segments, no trailing `/`
/// (except the root itself), and keep parameter segments in `{name}` form.
pub fn validate_path(path: &str) -> ValidationResult<()> {
    if !path.starts_with('/') {
        return Err(ValidationError::InvalidField {
            field: format!("route path: {path}"),
            message: "Route paths must start with '/'".to_string(),
        });
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(ValidationError::InvalidField {
            field: format!("route path: {path}"),
            message: "Route paths cannot end with '/'".to_string(),
        });
    }

    for segment in path.split('/').skip(1) {
        if segment.is_empty() {
            return Err(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: "Route paths cannot contain empty segments".to_string(),
            });
        }
        if segment == "." || segment == ".." {
            return Err(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: format!("Route paths cannot contain '{segment}' segments"),
            });
        }
        let is_param = segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2;
        let body = if is_param {
            &segment[1..segment.len() - 1]
        } else {
            segment
        };
        if !body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ValidationError::InvalidField {
                field: format!("route path: {path}"),
                message: format!("Invalid path segment '{segment}'"),
            });
        }
    }
    Ok(())
}
