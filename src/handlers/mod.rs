pub mod forecast;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Routes under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/forecast/prophet", post(forecast::forecast_prophet))
        .route("/health", get(health::health_check))
}
