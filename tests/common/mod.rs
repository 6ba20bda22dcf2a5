#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Months, NaiveDate};
use sales_forecast_api::{app_router, config::AppConfig, forecasting::ModelConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper harness driving the full router in-process.
pub struct TestApp {
    router: Router,
}

/// Status plus decoded JSON body (Null when the body is not JSON).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    /// App with default settings and a fixed model seed.
    pub fn new() -> Self {
        Self::with_config(Self::test_config())
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        Self {
            router: app_router(cfg).expect("failed to build router"),
        }
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            model: ModelConfig {
                uncertainty_samples: 200,
                ..ModelConfig::default().with_seed(17)
            },
            ..AppConfig::default()
        }
    }

    /// Send a request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Body>) -> TestResponse {
        self.request_with_headers(method, uri, &[], body).await
    }

    /// Send a request carrying extra headers.
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Body>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                body
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post_json(&self, uri: &str, json: &Value) -> TestResponse {
        let bytes = serde_json::to_vec(json).expect("failed to serialize json request body");
        self.request(Method::POST, uri, Some(Body::from(bytes)))
            .await
    }

    pub async fn post_raw(&self, uri: &str, raw: &'static str) -> TestResponse {
        self.request(Method::POST, uri, Some(Body::from(raw))).await
    }

    pub async fn post_bytes(&self, uri: &str, bytes: Vec<u8>) -> TestResponse {
        self.request(Method::POST, uri, Some(Body::from(bytes))).await
    }

    pub async fn forecast(&self, payload: &Value) -> TestResponse {
        self.post_json("/api/forecast/prophet", payload).await
    }
}

/// `{date, sales}` rows on consecutive month starts from `start`.
pub fn monthly_sales(start: NaiveDate, values: &[f64]) -> Value {
    let rows: Vec<Value> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let date = start + Months::new(i as u32);
            json!({"date": date.format("%Y-%m-%d").to_string(), "sales": v})
        })
        .collect();
    Value::Array(rows)
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}
