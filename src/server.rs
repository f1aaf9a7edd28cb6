use crate::assets;
use crate::chat::{self, ChatProxy, DegradedResponse, UpstreamError, UpstreamReply};
use crate::company;
use crate::config::AppConfig;
use crate::cors;
use crate::fallback::{self, FallbackRequest};
use crate::identity;
use crate::observability;
use crate::ratelimit::{RateLimitDecision, RateLimiter};
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request, Response, StatusCode};
use axum::middleware::{self, Next};
use axum::routing::{get, post};
use axum::{Router, response::IntoResponse};
use futures_util::FutureExt;
use http::header::{ACCESS_CONTROL_REQUEST_HEADERS, CONTENT_TYPE, ORIGIN, RETRY_AFTER};
use http::HeaderValue;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub chat_proxy: Arc<ChatProxy>,
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'static str,
    timestamp: String,
    service: &'a str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<bool>,
}

pub fn build_app(config: Arc<AppConfig>) -> Result<Router, String> {
    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    build_app_with_limiter(config, rate_limiter)
}

pub fn build_app_with_limiter(
    config: Arc<AppConfig>,
    rate_limiter: Arc<RateLimiter>,
) -> Result<Router, String> {
    let chat_proxy = Arc::new(ChatProxy::from_config(&config.upstream)?);
    if chat_proxy.has_api_key() {
        info!("upstream API key found");
    } else {
        warn!(
            env = %config.upstream.api_key_env,
            "upstream API key not found, chat runs in fallback mode only"
        );
    }
    let state = AppState {
        config,
        rate_limiter,
        chat_proxy,
    };

    Ok(Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/company", get(company_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/fallback", post(fallback_handler))
        .method_not_allowed_fallback(not_found_handler)
        .fallback(static_or_not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cors_middleware,
        ))
        .layer(middleware::from_fn(request_context_middleware))
        .with_state(state))
}

pub async fn run_server(config: Arc<AppConfig>) -> Result<(), String> {
    let listen_addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|err| format!("invalid listen address `{}`: {err}", config.listen))?;
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|err| format!("failed to bind `{listen_addr}`: {err}"))?;

    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let sweeper = rate_limiter.spawn_sweeper(Duration::from_millis(
        config.rate_limit.sweep_interval_ms,
    ));
    let app = build_app_with_limiter(Arc::clone(&config), rate_limiter)?;

    info!(
        listen = %listen_addr,
        upstream = %config.upstream.chat_url(),
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        "chat gateway listening"
    );
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|err| format!("server error: {err}"));

    sweeper.abort();
    result
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "healthy",
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            service: &state.config.service_name,
        },
    )
}

async fn company_handler() -> Response<Body> {
    json_response(StatusCode::OK, &company::company_data())
}

async fn fallback_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let body = to_bytes(request.into_body(), state.config.max_body_bytes)
        .await
        .unwrap_or_default();
    let payload: FallbackRequest = serde_json::from_slice(&body).unwrap_or_default();
    let message = payload.message.unwrap_or_default();

    json_response(StatusCode::OK, &fallback::canned_response(&message))
}

async fn chat_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = identity::client_identity(
        request.headers(),
        peer,
        state.config.rate_limit.trust_forwarded_headers,
    );

    if let RateLimitDecision::Rejected { retry_after_secs } = state.rate_limiter.check(&client) {
        warn!(request_id = %request_id, client = %client, retry_after_secs, "chat: rate limit exceeded");
        return rate_limited_response(retry_after_secs);
    }

    absorb_faults(&request_id, handle_chat(&state, &request_id, request)).await
}

async fn handle_chat(state: &AppState, request_id: &str, request: Request<Body>) -> Response<Body> {
    let body = match to_bytes(request.into_body(), state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "chat: unreadable request body");
            return invalid_request_response();
        }
    };

    let chat_request = match chat::parse_chat_request(&body) {
        Ok(chat_request) => chat_request,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "chat: invalid request format");
            return invalid_request_response();
        }
    };

    debug!(
        request_id = %request_id,
        model = %chat_request.model,
        messages = chat_request.messages.len(),
        max_tokens = chat_request.max_tokens,
        "chat: forwarding to upstream"
    );

    let started = Instant::now();
    match state.chat_proxy.forward(&chat_request).await {
        Ok(reply) => {
            info!(
                request_id = %request_id,
                status = reply.status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "chat: upstream success"
            );
            upstream_reply_response(reply)
        }
        Err(err) => {
            log_upstream_error(request_id, &err, started.elapsed());
            degraded_response(&err.degraded())
        }
    }
}

async fn absorb_faults<F>(request_id: &str, pipeline: F) -> Response<Body>
where
    F: Future<Output = Response<Body>>,
{
    match AssertUnwindSafe(pipeline).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(
                request_id = %request_id,
                panic = %panic_message(panic.as_ref()),
                "chat: internal fault"
            );
            degraded_response(&DegradedResponse::internal_fault())
        }
    }
}

fn log_upstream_error(request_id: &str, err: &UpstreamError, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match err {
        UpstreamError::MissingApiKey => {
            error!(request_id = %request_id, kind = err.kind(), "chat: upstream API key not configured");
        }
        UpstreamError::Status { status, body } => {
            error!(
                request_id = %request_id,
                kind = err.kind(),
                status = status.as_u16(),
                body = %body,
                elapsed_ms,
                "chat: upstream error response"
            );
        }
        _ => {
            error!(request_id = %request_id, kind = err.kind(), error = %err, elapsed_ms, "chat: upstream failure");
        }
    }
}

async fn not_found_handler() -> Response<Body> {
    not_found_response()
}

async fn static_or_not_found_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response<Body> {
    let Some(static_dir) = &state.config.static_dir else {
        return not_found_response();
    };
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return not_found_response();
    }

    match assets::load_asset(Path::new(static_dir), request.uri().path()).await {
        Some(asset) => {
            let mut response = Response::new(Body::from(asset.bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(asset.content_type));
            response
        }
        None => not_found_response(),
    }
}

async fn cors_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let cors_config = &state.config.cors;
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok());
    let allow_origin = cors::allowed_origin(cors_config, origin);

    if request.method() == Method::OPTIONS {
        let requested_headers = request
            .headers()
            .get(ACCESS_CONTROL_REQUEST_HEADERS)
            .and_then(|value| value.to_str().ok());
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        cors::apply_cors_headers(
            response.headers_mut(),
            cors_config,
            allow_origin.as_deref(),
            requested_headers,
            true,
        );
        return response;
    }

    let mut response = next.run(request).await;
    cors::apply_cors_headers(
        response.headers_mut(),
        cors_config,
        allow_origin.as_deref(),
        None,
        false,
    );
    response
}

async fn request_context_middleware(mut request: Request<Body>, next: Next) -> Response<Body> {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = observability::extract_or_generate_request_id(request.headers());
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    observability::insert_request_id_header(response.headers_mut(), &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down gracefully"),
        _ = terminate => info!("SIGTERM received, shutting down gracefully"),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, Body::from(bytes)),
        Err(err) => {
            error!(error = %err, "failed to serialize response body");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Body::from(r#"{"error":"Internal server error"}"#),
            )
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn upstream_reply_response(reply: UpstreamReply) -> Response<Body> {
    let mut response = Response::new(Body::from(reply.body));
    if reply.status != StatusCode::OK {
        debug!(upstream_status = %reply.status, "relaying upstream success as 200");
    }
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn degraded_response(degraded: &DegradedResponse) -> Response<Body> {
    json_response(StatusCode::OK, degraded)
}

fn invalid_request_response() -> Response<Body> {
    json_response(
        StatusCode::BAD_REQUEST,
        &ErrorBody {
            error: "Invalid request format",
            message: None,
            fallback: Some(true),
        },
    )
}

fn rate_limited_response(retry_after_secs: u64) -> Response<Body> {
    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &ErrorBody {
            error: "Too many requests",
            message: Some("Rate limit exceeded. Please try again later."),
            fallback: Some(true),
        },
    );
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

fn not_found_response() -> Response<Body> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorBody {
            error: "Endpoint not found",
            message: Some("The requested endpoint does not exist"),
            fallback: None,
        },
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::{absorb_faults, build_app};
    use crate::chat::DegradedResponse;
    use crate::config::AppConfig;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, Response, StatusCode};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_returns_service_status() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["service"], "PT. Teknologi Maju Indonesia API Proxy");
        assert!(value["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));
    }

    #[tokio::test]
    async fn company_returns_profile_and_jobs() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .uri("/api/company")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(value["profile"]["name"], "PT. Teknologi Maju Indonesia");
        assert_eq!(value["jobs"].as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        assert_eq!(
            &body[..],
            br#"{"error":"Endpoint not found","message":"The requested endpoint does not exist"}"#
        );
    }

    #[tokio::test]
    async fn wrong_method_on_known_path_returns_404() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/chat")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preflight_succeeds_on_any_path() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        for uri in ["/api/chat", "/api/fallback", "/nowhere"] {
            let request = Request::builder()
                .method(Method::OPTIONS)
                .uri(uri)
                .header("origin", "http://localhost:5500")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .expect("request should build");

            let response = app
                .clone()
                .oneshot(request)
                .await
                .expect("request should succeed");
            assert_eq!(response.status(), StatusCode::NO_CONTENT, "{uri}");
            assert_eq!(
                response
                    .headers()
                    .get("access-control-allow-origin")
                    .and_then(|value| value.to_str().ok()),
                Some("*")
            );
        }
    }

    #[tokio::test]
    async fn fallback_tolerates_missing_body() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/fallback")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(value["fallback"], true);
        assert!(
            value["choices"][0]["message"]["content"]
                .as_str()
                .is_some_and(|content| content.contains("hr@teknologimaju.co.id"))
        );
    }

    #[tokio::test]
    async fn chat_without_api_key_degrades_softly() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"messages":[{"role":"user","content":"halo"}]}"#,
            ))
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let degraded: DegradedResponse =
            serde_json::from_slice(&body).expect("body should be degraded json");
        assert_eq!(degraded.error, "API configuration error");
        assert!(degraded.fallback);
        assert!(!degraded.message.is_empty());
    }

    #[tokio::test]
    async fn panicking_pipeline_is_absorbed() {
        let response = absorb_faults("req-1", exploding_pipeline()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let degraded: DegradedResponse =
            serde_json::from_slice(&body).expect("body should be degraded json");
        assert_eq!(degraded, DegradedResponse::internal_fault());
    }

    async fn exploding_pipeline() -> Response<Body> {
        panic!("boom")
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig {
            listen: "127.0.0.1:3000".to_string(),
            ..AppConfig::default()
        };
        config.upstream.base_url = "http://127.0.0.1:9".to_string();
        config.upstream.api_key = None;
        config
    }
}
