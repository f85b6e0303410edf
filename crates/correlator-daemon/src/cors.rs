//! CORS configuration: origin list or wildcard, allowed methods/headers,
//! and max-age.

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS settings resolved into a [`CorsLayer`] at router-build time.
#[derive(Debug, Clone)]
pub struct CorsSettings {
    /// Allowed origins. `["*"]` means any origin.
    pub allowed_origins: Vec<String>,
    /// Allowed request methods.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
    /// `Access-Control-Max-Age`, in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec![
                "content-type".to_string(),
                "x-api-key".to_string(),
                "authorization".to_string(),
                "x-correlation-id".to_string(),
            ],
            max_age_secs: 3600,
        }
    }
}

impl CorsSettings {
    /// Builds the `tower_http` layer. A literal `"*"` entry in
    /// `allowed_origins` becomes `AllowOrigin::any()`; otherwise the list is
    /// checked for membership against the request's `Origin` header.
    pub fn to_layer(&self) -> CorsLayer {
        let origin = if self.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            let values: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            AllowOrigin::list(values)
        };

        let methods: Vec<Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(std::time::Duration::from_secs(self.max_age_secs))
    }
}
