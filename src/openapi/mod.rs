use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales Forecast API",
        version = "1.0.0",
        description = r#"
# Sales Forecast API

Fits an additive time-series model (piecewise-linear trend plus yearly
seasonality) to historical sales and returns:

- in-sample fitted values for every submitted row
- a monthly forecast with uncertainty bounds
- the trend component for history and forecast
- regression accuracy metrics of the in-sample fit

## Error Handling

Missing sales data is a `400` with an `error` field only. Every other failure
is a `500` with `error` and `traceback`:

```json
{
  "error": "parsing forecast request: Unknown datetime string format, unable to parse: 2024-13-45",
  "traceback": "parsing forecast request\n\nCaused by:\n    ..."
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "Forecast", description = "Sales forecasting endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::forecast::forecast_prophet,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::models::SalesObservation,
            crate::models::ForecastRequestBody,
            crate::models::ForecastResponse,
            crate::models::FittedPoint,
            crate::models::ForecastPoint,
            crate::models::TrendPoint,
            crate::models::DataInfo,
            crate::models::HealthResponse,
            crate::accuracy::MetricsReport,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
