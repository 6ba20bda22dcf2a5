use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    response::Json,
};

use crate::{
    errors::{ApiError, ErrorResponse},
    models::{ForecastRequestBody, ForecastResponse},
    services::ForecastingService,
    AppState,
};

/// Fit the model on the submitted history and forecast the following months.
///
/// The body is taken as raw bytes so malformed JSON, and bodies that cannot be
/// read at all, surface as a 500 with a traceback rather than a plain-text
/// rejection.
#[utoipa::path(
    post,
    path = "/api/forecast/prophet",
    request_body = ForecastRequestBody,
    responses(
        (status = 200, description = "Forecast produced", body = ForecastResponse),
        (status = 400, description = "No sales data provided", body = ErrorResponse),
        (status = 500, description = "Parsing, fitting or evaluation failed", body = ErrorResponse)
    ),
    tag = "Forecast"
)]
pub async fn forecast_prophet(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let service = ForecastingService::from_config(&state.config);
    let body = body.map_err(|rejection| service.unreadable_body(rejection))?;
    let response = service.forecast_from_body(body).await?;
    Ok(Json(response))
}
