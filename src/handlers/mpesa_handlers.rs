// handlers/mpesa_handlers.rs
use std::collections::HashMap;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    response::Json,
};
use chrono::Duration;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::dtos::{ApiResponse, PagedResponse};
use crate::errors::{AppError, Result};
use crate::models::mpesa::{C2bCallback, CallbackAck, StkCallbackEnvelope, StkPushRequest, StkPushResponse};
use crate::models::PaymentView;
use crate::state::AppState;

const DEFAULT_STALE_MINUTES: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub minutes: Option<i64>,
}

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Json(request): Json<StkPushRequest>,
) -> Result<Json<ApiResponse<StkPushResponse>>> {
    info!("Received STK push request for phone: {}", request.phone_number);
    let response = state.payments.initiate_push(request).await?;
    Ok(Json(ApiResponse::success(response, "STK Push initiated successfully")))
}

pub async fn stk_callback(
    State(state): State<AppState>,
    Json(envelope): Json<StkCallbackEnvelope>,
) -> Result<Json<CallbackAck>> {
    let callback = envelope.into_callback();
    info!("Received STK callback for request ID: {}", callback.merchant_request_id);
    state.payments.process_push_callback(callback).await?;
    Ok(Json(CallbackAck::accepted()))
}

pub async fn c2b_callback(
    State(state): State<AppState>,
    Json(callback): Json<C2bCallback>,
) -> Result<Json<CallbackAck>> {
    info!("Received C2B callback for transaction: {}", callback.trans_id);
    state.payments.process_direct_callback(callback).await?;
    Ok(Json(CallbackAck::accepted()))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<ApiResponse<PaymentView>>> {
    let payment_id = Uuid::parse_str(payment_id.trim())
        .map_err(|_| AppError::ValidationError(format!("Invalid payment id: {}", payment_id)))?;
    let view = state.payments.get_by_id(payment_id).await?;
    Ok(Json(ApiResponse::success(view, "Payment retrieved successfully")))
}

pub async fn get_payment_by_transaction_id(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<ApiResponse<PaymentView>>> {
    let view = state.payments.get_by_external_id(&transaction_id).await?;
    Ok(Json(ApiResponse::success(view, "Payment retrieved successfully")))
}

pub async fn get_payments_by_phone(
    State(state): State<AppState>,
    Path(phone_number): Path<String>,
) -> Result<Json<ApiResponse<Vec<PaymentView>>>> {
    let views = state.payments.list_by_phone(&phone_number).await?;
    Ok(Json(ApiResponse::success(views, "Payments retrieved successfully")))
}

pub async fn search_payments(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<PagedResponse<PaymentView>>>> {
    let page = state.payments.search(&params).await?;
    let paged = PagedResponse::from_page(page, uri.path());
    Ok(Json(ApiResponse::success(paged, "Payments retrieved successfully")))
}

pub async fn validate_payment_status(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<ApiResponse<PaymentView>>> {
    info!("Validating payment status for transaction: {}", transaction_id);
    let view = state.payments.validate_status(&transaction_id).await?;
    Ok(Json(ApiResponse::success(view, "Payment status validated successfully")))
}

pub async fn stale_pending_payments(
    State(state): State<AppState>,
    Query(query): Query<StaleQuery>,
) -> Result<Json<ApiResponse<Vec<PaymentView>>>> {
    let minutes = query.minutes.unwrap_or(DEFAULT_STALE_MINUTES);
    if minutes < 0 {
        return Err(AppError::ValidationError("minutes cannot be negative".into()));
    }
    let older_than = Duration::try_minutes(minutes)
        .ok_or_else(|| AppError::ValidationError(format!("minutes is out of range: {}", minutes)))?;
    let views = state.payments.list_stale_pending(older_than).await?;
    Ok(Json(ApiResponse::success(views, "Stale pending payments retrieved successfully")))
}
