//! CORS for browser clients of the file API and of local preview URLs.

use axum::http::{
    HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

const METHODS: [Method; 4] = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

/// Build the CORS layer. No configured origins (or none that parse) means
/// any origin is allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin `{}`", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods(METHODS)
        .expose_headers([CONTENT_DISPOSITION]);

    if parsed.is_empty() {
        layer.allow_origin(Any).allow_headers(Any)
    } else {
        layer
            .allow_origin(AllowOrigin::list(parsed))
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
    }
}
