pub mod data;
pub mod metrics;
pub mod monitor;

pub use data::data_handler;
pub use metrics::metrics_handler;
pub use monitor::{refresh_handler, start_handler, status_handler, stop_handler};

use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use hackwatch_domain::services::RateSignal;
use hackwatch_domain::storage::StorageError;
use hackwatch_monitor::MonitorError;
use serde::Serialize;
use thiserror::Error;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("too many requests")]
    RateLimited,
    #[error("a monitor cycle is already running")]
    CycleInFlight,
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("monitor failure: {0}")]
    Monitor(MonitorError),
}

// Busy and storage failures keep their own status codes.
impl From<MonitorError> for ApiError {
    fn from(value: MonitorError) -> Self {
        match value {
            MonitorError::CycleInFlight => ApiError::CycleInFlight,
            MonitorError::Persistence(err) => ApiError::Storage(err),
            other => ApiError::Monitor(other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::CycleInFlight => StatusCode::CONFLICT,
            ApiError::Storage(_) | ApiError::Monitor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Counts the request against the caller's window, keyed by peer IP.
pub(crate) fn enforce_rate_limit(state: &AppState, req: &HttpRequest) -> Result<(), ApiError> {
    let peer = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    match state.rate_limiter().record(peer) {
        RateSignal::Allowed => Ok(()),
        RateSignal::Limited { .. } => Err(ApiError::RateLimited),
    }
}
