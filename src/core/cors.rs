//! Cross-origin policy attached to every bound path.
use serde::{Deserialize, Serialize};

/// Header carrying the authorizer credential.
pub const AUTH_TOKEN_HEADER: &str = "x-pg-token";
/// Provider-standard API key header.
pub const API_KEY_HEADER: &str = "x-api-key";

pub const ALL_ORIGINS: &str = "*";
pub const ALL_METHODS: [&str; 7] = ["OPTIONS", "GET", "PUT", "POST", "DELETE", "PATCH", "HEAD"];
pub const DEFAULT_ALLOW_HEADERS: [&str; 7] = [
    "Content-Type",
    "Authorization",
    "X-Amz-Date",
    "X-Amz-Security-Token",
    "X-Amz-User-Agent",
    "X-Api-Key",
    AUTH_TOKEN_HEADER,
];

/// Method response headers declared on every status binding so the CORS
/// values survive the integration response.
pub const CORS_RESPONSE_HEADERS: [&str; 3] = [
    "Access-Control-Allow-Headers",
    "Access-Control-Allow-Methods",
    "Access-Control-Allow-Origin",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_origins: vec![ALL_ORIGINS.to_string()],
            allow_methods: ALL_METHODS.iter().map(|m| m.to_string()).collect(),
            allow_headers: DEFAULT_ALLOW_HEADERS.iter().map(|h| h.to_string()).collect(),
            allow_credentials: true,
        }
    }
}

impl CorsPolicy {
    pub fn allows_all_origins(&self) -> bool {
        self.allow_origins.iter().any(|o| o == ALL_ORIGINS)
    }

    pub fn allows_header(&self, name: &str) -> bool {
        self.allow_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name))
    }

    /// Value for `Access-Control-Allow-Origin` given the caller's `Origin`.
    ///
    /// Browsers refuse `*` on credentialed requests, so with credentials
    /// enabled the request origin is echoed back.
    pub fn allow_origin_for(&self, request_origin: Option<&str>) -> Option<String> {
        match request_origin {
            Some(origin) if self.allows_all_origins() && self.allow_credentials => {
                Some(origin.to_string())
            }
            Some(origin) if self.allow_origins.iter().any(|o| o == origin) => {
                Some(origin.to_string())
            }
            _ if self.allows_all_origins() => Some(ALL_ORIGINS.to_string()),
            _ => None,
        }
    }

    /// Headers answered on an `OPTIONS` preflight.
    pub fn preflight_headers(&self, request_origin: Option<&str>) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (
                "access-control-allow-headers",
                self.allow_headers.join(","),
            ),
            (
                "access-control-allow-methods",
                self.allow_methods.join(","),
            ),
        ];
        headers.extend(self.response_headers(request_origin));
        headers
    }

    /// CORS headers carried by every non-preflight response.
    pub fn response_headers(&self, request_origin: Option<&str>) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(origin) = self.allow_origin_for(request_origin) {
            let echoed = origin != ALL_ORIGINS;
            headers.push(("access-control-allow-origin", origin));
            if echoed {
                headers.push(("vary", "Origin".to_string()));
            }
        }
        if self.allow_credentials {
            headers.push(("access-control-allow-credentials", "true".to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_covers_custom_headers() {
        let policy = CorsPolicy::default();
        assert!(policy.allows_all_origins());
        assert!(policy.allows_header("X-PG-TOKEN"));
        assert!(policy.allows_header(API_KEY_HEADER));
        assert!(policy.allow_credentials);
        assert_eq!(policy.allow_methods.len(), ALL_METHODS.len());
    }

    #[test]
    fn credentialed_wildcard_echoes_origin() {
        let policy = CorsPolicy::default();
        assert_eq!(
            policy.allow_origin_for(Some("https://pg.example.com")).as_deref(),
            Some("https://pg.example.com")
        );
        assert_eq!(policy.allow_origin_for(None).as_deref(), Some("*"));
    }

    #[test]
    fn restricted_origins_are_enforced() {
        let policy = CorsPolicy {
            allow_origins: vec!["https://pg.example.com".to_string()],
            ..CorsPolicy::default()
        };
        assert!(policy.allow_origin_for(Some("https://evil.example")).is_none());
        let headers = policy.preflight_headers(Some("https://pg.example.com"));
        assert!(headers
            .iter()
            .any(|(k, v)| *k == "access-control-allow-origin" && v == "https://pg.example.com"));
        assert!(headers.iter().any(|(k, _)| *k == "vary"));
    }
}
