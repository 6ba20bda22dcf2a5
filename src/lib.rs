//! Sales Forecast API Library
//!
//! HTTP service that fits an additive time-series model to historical sales
//! and returns fitted values, a monthly forecast, the trend component and
//! accuracy metrics.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod accuracy;
pub mod config;
pub mod errors;
pub mod forecasting;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod models;
pub mod numeric;
pub mod openapi;
pub mod services;
pub mod tracing;

use anyhow::bail;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};

use crate::config::AppConfig;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Builds the CORS layer from config.
///
/// Explicit origins win. Without them the layer is permissive when the
/// environment or the `cors_allow_any_origin` flag allows it, and an error
/// otherwise.
pub fn cors_layer(cfg: &AppConfig) -> anyhow::Result<CorsLayer> {
    let configured: Option<Vec<HeaderValue>> = cfg
        .cors_origins()
        .map(|origins| {
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    } else if cfg.should_allow_permissive_cors() {
        Ok(CorsLayer::permissive())
    } else {
        bail!("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true")
    }
}

async fn metrics_text() -> Response {
    match metrics::metrics_handler().await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("metrics error"),
        )
            .into_response(),
    }
}

async fn metrics_json() -> Response {
    match metrics::metrics_json_handler().await {
        Ok(json) => (StatusCode::OK, Json(json)).into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "metrics error"})),
        )
            .into_response(),
    }
}

/// Full application router: API, metrics, Swagger UI and middleware.
pub fn app_router(cfg: AppConfig) -> anyhow::Result<Router> {
    let cors = cors_layer(&cfg)?;
    let body_limit = DefaultBodyLimit::max(cfg.max_body_size);
    let state = AppState::new(cfg);

    let app = Router::<AppState>::new()
        .nest("/api", handlers::api_routes())
        .route("/metrics", get(metrics_text))
        .route("/metrics/json", get(metrics_json))
        .merge(openapi::swagger_ui())
        .layer(body_limit)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state);

    Ok(app)
}
