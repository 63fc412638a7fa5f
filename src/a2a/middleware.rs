//! HTTP middleware for the A2A server: CORS, bearer authentication, and
//! request logging.
//!
//! Layer order (outermost first): CORS, then auth, then logging. A request
//! from a disallowed origin is rejected before credentials are even looked
//! at, and every response that reaches the logging layer gets `X-Request-ID`
//! and `X-Response-Time` headers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::{OriginRule, ServerConfig};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type, Accept, X-Request-ID";

/// Paths reachable without credentials: discovery, health, and the favicon
/// noise browsers generate.
fn is_public_path(path: &str) -> bool {
    path == "/health" || path == "/favicon.ico" || path.starts_with("/.well-known/")
}

fn origin_allowed(allowed: &[OriginRule], origin: &str) -> bool {
    allowed.iter().any(|rule| rule.matches(origin))
}

fn allow_origin_value(allowed: &[OriginRule], origin: &str) -> HeaderValue {
    if allowed.iter().any(|rule| matches!(rule, OriginRule::Any)) {
        HeaderValue::from_static("*")
    } else {
        HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*"))
    }
}

fn apply_cors_headers(response: &mut Response, allowed: &[OriginRule], origin: &str) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        allow_origin_value(allowed, origin),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

/// CORS middleware.
///
/// Requests without an `Origin` header pass through untouched. A request
/// from a disallowed origin is rejected with 403 — including preflights, so
/// browser callers see the rejection instead of an opaque network error.
/// Allowed preflights are answered here with 200 and never reach the
/// handlers.
pub async fn cors(
    State(config): State<Arc<ServerConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(origin) = origin else {
        return next.run(request).await;
    };

    if !origin_allowed(&config.allowed_origins, &origin) {
        warn!(%origin, "request from disallowed origin rejected");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Origin not allowed", "code": "origin_forbidden" })),
        )
            .into_response();
    }

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        apply_cors_headers(&mut response, &config.allowed_origins, &origin);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(&mut response, &config.allowed_origins, &origin);
    response
}

/// Bearer authentication middleware.
///
/// Disabled entirely when no token rule is configured. Public paths
/// (discovery, health) stay reachable either way. The presented token is
/// checked against the configured [`crate::config::TokenRule`]; failures
/// answer 401 with a `WWW-Authenticate: Bearer` challenge and a JSON body.
/// Expected token values are never echoed or logged.
pub async fn auth(
    State(config): State<Arc<ServerConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(rule) = config.auth_token.as_ref() else {
        return next.run(request).await;
    };

    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if rule.accepts(token) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "rejected request with invalid bearer token");
            unauthorized("Invalid bearer token")
        }
        None => {
            warn!(path = %request.uri().path(), "rejected request without bearer token");
            unauthorized("Missing bearer token")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message, "code": "unauthorized" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

/// Request logging middleware.
///
/// Propagates an inbound `X-Request-ID` or generates one, logs a record on
/// the way in and another with status/duration on the way out, and stamps
/// `X-Request-ID` and `X-Response-Time` onto the response. Nothing in here
/// can fail the request: header values that won't encode are simply
/// dropped.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    info!(request_id = %request_id, %method, %path, "request received");
    let started = Instant::now();

    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        error!(request_id = %request_id, %method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        info!(request_id = %request_id, %method, %path, status = status.as_u16(), elapsed_ms, "request completed");
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        headers.insert("x-response-time", value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_paths_cover_discovery_and_health() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/.well-known/agent.json"));
        assert!(is_public_path("/favicon.ico"));
        assert!(!is_public_path("/invoke"));
        assert!(!is_public_path("/agents/billing"));
    }

    #[test]
    fn wildcard_allows_any_origin() {
        let allowed = vec![OriginRule::Any];
        assert!(origin_allowed(&allowed, "https://anywhere.example"));
        assert_eq!(
            allow_origin_value(&allowed, "https://anywhere.example"),
            HeaderValue::from_static("*")
        );
    }

    #[test]
    fn explicit_allowlist_echoes_the_origin() {
        let allowed = vec![OriginRule::Exact("https://app.example.com".to_string())];
        assert!(origin_allowed(&allowed, "https://app.example.com"));
        assert!(!origin_allowed(&allowed, "https://evil.example.com"));
        assert_eq!(
            allow_origin_value(&allowed, "https://app.example.com"),
            HeaderValue::from_static("https://app.example.com")
        );
    }

    #[tokio::test]
    async fn server_errors_still_get_tracing_headers() {
        use axum::body::Body;
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/explode",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .layer(axum::middleware::from_fn(request_logging));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/explode")
                    .header("x-request-id", "trace-the-failure")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("trace-the-failure")
        );
        let timing = response
            .headers()
            .get("x-response-time")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(timing.ends_with("ms"));
    }

    #[test]
    fn pattern_and_predicate_rules_gate_origins() {
        let allowed = vec![
            OriginRule::pattern(r"^https://[a-z]+\.example\.com$").unwrap(),
            OriginRule::Predicate(std::sync::Arc::new(|origin: &str| {
                origin.ends_with(".internal")
            })),
        ];
        assert!(origin_allowed(&allowed, "https://app.example.com"));
        assert!(origin_allowed(&allowed, "https://tools.internal"));
        assert!(!origin_allowed(&allowed, "https://example.org"));
        // No wildcard rule, so the matched origin is echoed back.
        assert_eq!(
            allow_origin_value(&allowed, "https://app.example.com"),
            HeaderValue::from_static("https://app.example.com")
        );
    }
}
