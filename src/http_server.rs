//! HTTP API Server for scorewatch
//!
//! 検知・アラート設定・統計のエンドポイントを提供する。
//! すべてのリクエストはアドミッション制御を通過してからハンドラに渡される。

use crate::alerts::{AlertConfig, AlertRecord};
use crate::analytics::DetectionRequest;
use crate::error::{Error, ValidationError};
use crate::security::Admission;
use crate::service::{DetectionResponse, ServiceState, StatsSnapshot};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// API キーヘッダー
const API_KEY_HEADER: &str = "x-api-key";

/// 履歴取得のデフォルト件数
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// すべてのレスポンスに付与するヘッダー
const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("content-security-policy", "default-src 'self'"),
];

/// ハンドラのエラーレスポンス
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ValidationError::InvalidBody(rejection.body_text()).into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::Validation(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": e.to_string() })),
            )
                .into_response(),
            Error::RateLimited { retry_after_secs } => too_many_requests(retry_after_secs),
            other => {
                error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// 429 レスポンス（Retry-After は切り上げ秒、最低1）
fn too_many_requests(retry_after_secs: f64) -> Response {
    let retry_after = retry_after_secs.ceil().max(1.0) as u64;
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        "Too many requests. Please slow down.",
    )
        .into_response()
}

/// ルーターを構築
pub fn create_router(state: Arc<ServiceState>) -> Router {
    let protected = Router::new()
        .route(
            "/alerts/config/{customer_id}",
            get(get_alert_config).post(set_alert_config),
        )
        .route("/alerts/history", get(alert_history))
        .route("/metrics/summary", get(metrics_summary))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let cors = cors_layer(&state.config().server.allowed_origins);

    Router::new()
        .route("/health", get(health))
        .route("/detect", post(detect))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), admission))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// サーバーを起動（Ctrl+C で終了）
pub async fn serve(state: Arc<ServiceState>, addr: &str) -> anyhow::Result<()> {
    let app = create_router(state);

    info!("Starting HTTP API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// クライアント識別子（X-Forwarded-For の先頭、なければ接続元IP）
fn client_id(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(first) = forwarded {
        return first.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// アドミッション制御ミドルウェア
async fn admission(
    State(state): State<Arc<ServiceState>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request);
    let route = request.uri().path().to_string();

    match state.admission().admit(&client, &route).await {
        Admission::Allowed { .. } => next.run(request).await,
        Admission::Denied { retry_after_secs } => {
            state.stats().record_throttled();
            too_many_requests(retry_after_secs)
        }
    }
}

/// API キー検証ミドルウェア（キー未設定なら素通し）
async fn require_api_key(
    State(state): State<Arc<ServiceState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config().server.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(expected) {
        warn!(path = %request.uri().path(), "Invalid API key attempt");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "detail": "Invalid API key" })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct DetectParams {
    customer_id: Option<String>,
}

async fn detect(
    State(state): State<Arc<ServiceState>>,
    Query(params): Query<DetectParams>,
    body: Result<Json<DetectionRequest>, JsonRejection>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let Json(request) = body?;
    let response = state
        .detect(&request, params.customer_id.as_deref())
        .await?;
    Ok(Json(response))
}

async fn get_alert_config(
    State(state): State<Arc<ServiceState>>,
    Path(customer_id): Path<String>,
) -> Json<AlertConfig> {
    Json(state.alerts().get_config(&customer_id).await)
}

async fn set_alert_config(
    State(state): State<Arc<ServiceState>>,
    Path(customer_id): Path<String>,
    body: Result<Json<AlertConfig>, JsonRejection>,
) -> Result<Json<AlertConfig>, ApiError> {
    let Json(config) = body?;
    let saved = state.alerts().set_config(&customer_id, config).await?;
    Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    customer_id: Option<String>,
    limit: Option<usize>,
}

async fn alert_history(
    State(state): State<Arc<ServiceState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<AlertRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(
        state
            .alerts()
            .history(params.customer_id.as_deref(), limit)
            .await,
    )
}

async fn metrics_summary(State(state): State<Arc<ServiceState>>) -> Json<StatsSnapshot> {
    Json(state.stats_snapshot().await)
}
