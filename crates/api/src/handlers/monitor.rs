use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

use crate::state::AppState;

use super::{enforce_rate_limit, ApiError};

#[derive(Debug, Clone, Copy, AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum Endpoint {
    Start,
    Stop,
    Refresh,
    Status,
}

// Endpoint label is owned because metrics labels need `'static` or `String`.
fn record(endpoint: Endpoint, status: &'static str) {
    let endpoint = endpoint.as_ref().to_owned();
    counter!("api_requests_total", "endpoint" => endpoint, "status" => status).increment(1);
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StartRequest {
    pub interval_minutes: Option<u64>,
}

pub async fn start_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Option<web::Json<StartRequest>>,
) -> Result<HttpResponse, ApiError> {
    enforce_rate_limit(&state, &req)?;
    let request = payload.map(web::Json::into_inner).unwrap_or_default();
    // Zero would spin the scheduler; reject it rather than clamp.
    let interval = match request.interval_minutes {
        Some(0) => {
            record(Endpoint::Start, "invalid");
            return Err(ApiError::InvalidRequest(
                "interval_minutes must be positive".into(),
            ));
        }
        Some(minutes) => Some(Duration::from_secs(minutes.saturating_mul(60))),
        None => None,
    };

    let outcome = state.monitor().start(interval).await;
    record(Endpoint::Start, "ok");
    Ok(HttpResponse::Ok().json(outcome))
}

/// Stops the schedule and any manual cycle; waits for the current address.
pub async fn stop_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    enforce_rate_limit(&state, &req)?;
    let outcome = state.monitor().stop().await;
    record(Endpoint::Stop, "ok");
    Ok(HttpResponse::Ok().json(outcome))
}

/// Runs one cycle immediately and returns its report.
pub async fn refresh_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    enforce_rate_limit(&state, &req)?;
    match state.monitor().trigger_now().await {
        Ok(report) => {
            record(Endpoint::Refresh, "ok");
            Ok(HttpResponse::Ok().json(report))
        }
        Err(err) => {
            record(Endpoint::Refresh, "error");
            Err(err.into())
        }
    }
}

pub async fn status_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    enforce_rate_limit(&state, &req)?;
    // The last cycle comes from the store, so a read failure surfaces as 500.
    let status = match state.monitor().status().await {
        Ok(status) => status,
        Err(err) => {
            record(Endpoint::Status, "error");
            return Err(err.into());
        }
    };
    record(Endpoint::Status, "ok");
    Ok(HttpResponse::Ok().json(status))
}
