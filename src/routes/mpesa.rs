use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::mpesa_handlers;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/stk/push", post(mpesa_handlers::initiate_stk_push))
        .route("/stk/callback", post(mpesa_handlers::stk_callback))
        .route("/c2b/callback", post(mpesa_handlers::c2b_callback))
        .route("/search", get(mpesa_handlers::search_payments))
        .route("/stale", get(mpesa_handlers::stale_pending_payments))
        .route("/transaction/:transaction_id", get(mpesa_handlers::get_payment_by_transaction_id))
        .route("/phone/:phone_number", get(mpesa_handlers::get_payments_by_phone))
        .route("/validate/:transaction_id", get(mpesa_handlers::validate_payment_status))
        .route("/:payment_id", get(mpesa_handlers::get_payment))
}
