// services/mpesa_service.rs
//! Transaction Engine: STK push initiation and callback reconciliation.
use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::config_service::CredentialRegistry;
use super::daraja_client::DarajaClient;
use super::token_broker::TokenBroker;
use crate::clock::Clock;
use crate::database::PaymentStore;
use crate::errors::{AppError, Result};
use crate::filter::{build_predicate, FilterValue, Operand, Operator, Page, Pageable, Predicate};
use crate::models::mpesa::{
    C2bCallback, StkCallback, StkPushPayload, StkPushRequest, StkPushResponse, DEFAULT_TRANSACTION_DESC,
    STK_TRANSACTION_TYPE,
};
use crate::models::payment::{payment_schema, EAT_OFFSET_SECS};
use crate::models::{PaymentTransaction, PaymentView, TransactionStatus};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// `base64(shortcode + passkey + timestamp)`, as the gateway expects.
pub fn generate_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    base64.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// Gateway timestamps are wall-clock Nairobi time.
pub fn generate_timestamp(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(EAT_OFFSET_SECS) {
        Some(eat) => now.with_timezone(&eat).format(TIMESTAMP_FORMAT).to_string(),
        None => now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

pub struct MpesaPaymentService {
    registry: Arc<CredentialRegistry>,
    broker: Arc<TokenBroker>,
    client: Arc<dyn DarajaClient>,
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
}

impl MpesaPaymentService {
    pub fn new(
        registry: Arc<CredentialRegistry>,
        broker: Arc<TokenBroker>,
        client: Arc<dyn DarajaClient>,
        store: Arc<dyn PaymentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        MpesaPaymentService {
            registry,
            broker,
            client,
            store,
            clock,
        }
    }

    pub async fn initiate_push(&self, request: StkPushRequest) -> Result<StkPushResponse> {
        let request = request.normalized();
        request.validate()?;
        info!(
            "Initiating STK push of {} for {} on {}/{}",
            request.amount, request.phone_number, request.short_code, request.environment
        );

        let config = self
            .registry
            .get_active_config(&request.short_code, request.environment)
            .await?;
        let credentials = self
            .registry
            .decrypt_credentials(&config)
            .map_err(|e| e.wrap("Decrypting credentials for STK push"))?;

        let passkey = credentials
            .passkey
            .as_ref()
            .map(|p| p.reveal().clone())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::incomplete(format!("Shortcode {} has no passkey", config.shortcode)))?;
        let callback_url = config
            .stk_callback_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::incomplete(format!("Shortcode {} has no STK callback URL", config.shortcode)))?;

        let raw_request = serde_json::to_value(&request).map_err(|e| AppError::Serialization(e.to_string()))?;
        let pending = self
            .store
            .insert(PaymentTransaction::pending_push(&request, raw_request, self.clock.now()))
            .await
            .map_err(|e| e.wrap("Recording pending payment"))?;

        let token = match self.broker.get_token(&credentials).await {
            Ok(token) => token,
            Err(e) => {
                self.record_initiation_failure(&pending, &e.to_string()).await;
                return Err(e);
            }
        };

        let timestamp = generate_timestamp(self.clock.now());
        let payload = StkPushPayload {
            business_short_code: config.shortcode.clone(),
            password: generate_password(&config.shortcode, &passkey, &timestamp),
            timestamp,
            transaction_type: STK_TRANSACTION_TYPE.to_string(),
            amount: request.amount.normalize().to_string(),
            party_a: request.phone_number.clone(),
            party_b: config.shortcode.clone(),
            phone_number: request.phone_number.clone(),
            callback_url,
            account_reference: request.account_reference.clone(),
            transaction_desc: request
                .transaction_desc
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TRANSACTION_DESC.to_string()),
        };

        let response = match self.client.stk_push(config.environment, &token, &payload).await {
            Ok(response) => response,
            Err(e) => {
                error!("STK push for payment {} failed: {}", pending.id, e);
                self.record_initiation_failure(&pending, &e.to_string()).await;
                return Err(AppError::PaymentInitiationFailed(e.to_string()));
            }
        };

        if !response.accepted() {
            warn!(
                "STK push for payment {} answered {}: {}",
                pending.id, response.response_code, response.response_description
            );
        }

        let raw_response = serde_json::to_value(&response).map_err(|e| AppError::Serialization(e.to_string()))?;
        self.store
            .update(pending.with_push_response(&response, raw_response, self.clock.now()))
            .await
            .map_err(|e| e.wrap("Recording STK push response"))?;

        info!(
            "STK push accepted for payment {} (merchant request {})",
            pending.id, response.merchant_request_id
        );
        Ok(response)
    }

    async fn record_initiation_failure(&self, pending: &PaymentTransaction, message: &str) {
        let failed = pending.with_initiation_failure(message, self.clock.now());
        if let Err(e) = self.store.update(failed).await {
            error!("Could not record initiation failure on payment {}: {}", pending.id, e);
        }
    }

    pub async fn process_push_callback(&self, callback: StkCallback) -> Result<PaymentView> {
        info!(
            "Processing STK callback for merchant request {} (result {})",
            callback.merchant_request_id, callback.result_code
        );

        let existing = self
            .store
            .find_by_merchant_request_id(&callback.merchant_request_id)
            .await
            .map_err(|e| e.wrap("Loading payment for STK callback"))?
            .ok_or_else(|| {
                AppError::PaymentNotFound(format!("No payment for merchant request {}", callback.merchant_request_id))
            })?;

        if existing.transaction_status.is_terminal() {
            info!(
                "Payment {} is already {}, ignoring repeated STK callback",
                existing.id, existing.transaction_status
            );
            return Ok(PaymentView::from(&existing));
        }

        let raw_callback = serde_json::to_value(&callback).map_err(|e| AppError::Serialization(e.to_string()))?;
        let next = existing.finalized_by_push_callback(&callback, raw_callback, self.clock.now());
        self.finalize(next).await
    }

    pub async fn process_direct_callback(&self, callback: C2bCallback) -> Result<PaymentView> {
        let trans_id = callback.trans_id.trim().to_string();
        if trans_id.is_empty() {
            return Err(AppError::ValidationError("TransID is required".into()));
        }
        info!("Processing C2B callback for transaction {}", trans_id);

        let now = self.clock.now();
        let seed = PaymentTransaction::direct_notify_seed(&trans_id, callback.business_short_code.trim(), now);
        let (existing, created) = self
            .store
            .find_or_create_by_external_id(seed)
            .await
            .map_err(|e| e.wrap("Loading payment for C2B callback"))?;

        if !created && existing.transaction_status.is_terminal() {
            info!(
                "Payment {} for {} is already {}, ignoring repeated C2B callback",
                existing.id, trans_id, existing.transaction_status
            );
            return Ok(PaymentView::from(&existing));
        }

        let raw_callback = serde_json::to_value(&callback).map_err(|e| AppError::Serialization(e.to_string()))?;
        let next = existing.completed_by_direct_callback(&callback, raw_callback, now);
        self.finalize(next).await
    }

    /// Writes a terminal snapshot; a lost race hands back whatever the winner stored.
    async fn finalize(&self, next: PaymentTransaction) -> Result<PaymentView> {
        let id = next.id;
        let status = next.transaction_status;
        let written = self
            .store
            .finalize_pending(next)
            .await
            .map_err(|e| e.wrap("Finalizing payment"))?;

        let stored = self
            .store
            .find_by_id(id)
            .await
            .map_err(|e| e.wrap("Reloading finalized payment"))?
            .ok_or_else(|| AppError::PaymentNotFound(id.to_string()))?;

        if written {
            info!("Payment {} is now {}", id, status);
        } else {
            warn!(
                "Payment {} was finalized concurrently as {}",
                id, stored.transaction_status
            );
        }
        Ok(PaymentView::from(&stored))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<PaymentView> {
        self.store
            .find_by_id(id)
            .await?
            .map(|p| PaymentView::from(&p))
            .ok_or_else(|| AppError::PaymentNotFound(id.to_string()))
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<PaymentView> {
        self.store
            .find_by_external_id(external_id)
            .await?
            .map(|p| PaymentView::from(&p))
            .ok_or_else(|| AppError::PaymentNotFound(external_id.to_string()))
    }

    /// Newest first. Local phone formats are normalized before matching.
    pub async fn list_by_phone(&self, phone: &str) -> Result<Vec<PaymentView>> {
        let phone = crate::models::mpesa::format_phone_number(phone);
        let predicate = Predicate::condition("phone_number", Operator::Eq, Operand::Single(FilterValue::Text(phone)));
        let rows = self.store.find_matching(&predicate).await?;
        Ok(rows.iter().map(PaymentView::from).collect())
    }

    /// `params` carries `field[_op]=value` filters plus `page`, `size` and `sort`.
    pub async fn search(&self, params: &HashMap<String, String>) -> Result<Page<PaymentView>> {
        let schema = payment_schema();
        let predicate = build_predicate(schema, params)?;
        let pageable = Pageable::from_params(schema, params)?;
        let page = self.store.search(predicate.as_ref(), &pageable).await?;
        Ok(page.map(|p| PaymentView::from(&p)))
    }

    /// Local status only; the gateway is not re-queried.
    pub async fn validate_status(&self, external_id: &str) -> Result<PaymentView> {
        let view = self.get_by_external_id(external_id).await?;
        info!(
            "Payment {} status is {}",
            external_id, view.transaction_status
        );
        Ok(view)
    }

    /// PENDING rows created more than `older_than` ago, newest first.
    pub async fn list_stale_pending(&self, older_than: Duration) -> Result<Vec<PaymentView>> {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(older_than)
            .ok_or_else(|| AppError::ValidationError("Stale window reaches past the earliest date".into()))?;
        let predicate = Predicate::and(vec![
            Predicate::condition(
                "transaction_status",
                Operator::Eq,
                Operand::Single(FilterValue::Text(TransactionStatus::Pending.as_str().to_string())),
            ),
            Predicate::condition("created_at", Operator::Lt, Operand::Single(FilterValue::Timestamp(cutoff))),
        ]);
        let rows = self.store.find_matching(&predicate).await?;
        Ok(rows.iter().map(PaymentView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn password_is_base64_of_concatenation() {
        let password = generate_password("174379", "passkey", "20240101120000");
        let decoded = base64.decode(password).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "174379passkey20240101120000");
    }

    #[test]
    fn timestamp_is_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 21, 30, 15).unwrap();
        assert_eq!(generate_timestamp(now), "20240306003015");
    }
}
