pub mod forecasting;

pub use forecasting::ForecastingService;
