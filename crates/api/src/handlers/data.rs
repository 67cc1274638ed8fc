use actix_web::{web, HttpRequest, HttpResponse};
use hackwatch_domain::model::{TransferRecord, WatchedAddress};
use hackwatch_domain::storage::{TransferStore, WatchlistStore};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::{enforce_rate_limit, ApiError};

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, Serialize)]
pub struct DataQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DataResponse {
    pub addresses: Vec<WatchedAddress>,
    pub transactions: Vec<TransferRecord>,
}

/// Every watched address plus the latest transfers by descending block height.
pub async fn data_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<DataQuery>,
) -> Result<HttpResponse, ApiError> {
    enforce_rate_limit(&state, &req)?;
    // Oversized limits are clamped, zero is a client error.
    let limit = match query.limit {
        None => DEFAULT_LIMIT,
        Some(0) => return Err(ApiError::InvalidRequest("limit must be positive".into())),
        Some(limit) => limit.min(MAX_LIMIT),
    };

    let addresses = state.storage().list_watched_addresses().await?;
    let transactions = state.storage().recent_transfers(limit).await?;
    counter!("api_requests_total", "endpoint" => "data", "status" => "ok").increment(1);
    Ok(HttpResponse::Ok().json(DataResponse {
        addresses,
        transactions,
    }))
}
