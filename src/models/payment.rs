// models/payment.rs
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::audit::AuditMetadata;
use super::mpesa::{decimal_from_value, C2bCallback, StkCallback, StkPushRequest, StkPushResponse};
use crate::filter::{EntitySchema, FieldDescriptor, FieldType, FilterValue, Filterable};

pub const GATEWAY_CURRENCY: &str = "KES";

/// Daraja stamps C2B `TransTime` in East Africa Time.
pub(crate) const EAT_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Initiated locally through STK push.
    StkPush,
    /// Direct notification against a pay-bill number.
    PayBill,
    /// Direct notification against a till number.
    BuyGoods,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StkPush => "STK_PUSH",
            TransactionType::PayBill => "PAY_BILL",
            TransactionType::BuyGoods => "BUY_GOODS",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "STK_PUSH" => Some(TransactionType::StkPush),
            "PAY_BILL" => Some(TransactionType::PayBill),
            "BUY_GOODS" => Some(TransactionType::BuyGoods),
            _ => None,
        }
    }

    /// Maps the C2B `TransactionType` text onto a subtype. Unrecognised
    /// channels are treated as pay-bill.
    pub fn from_channel(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "buygoods" | "buygoodsonline" | "customerbuygoodsonline" | "till" => TransactionType::BuyGoods,
            "paybill" | "paybillonline" | "customerpaybillonline" => TransactionType::PayBill,
            _ => TransactionType::PayBill,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub external_transaction_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub phone_number: Option<String>,
    pub payer_identifier: Option<String>,
    pub payee_identifier: Option<String>,
    pub amount: Decimal,
    pub charges_amount: Decimal,
    pub currency: String,
    pub account_reference: Option<String>,
    pub transaction_desc: Option<String>,
    pub transaction_type: TransactionType,
    pub transaction_status: TransactionStatus,
    pub business_short_code: Option<String>,
    pub bill_ref_number: Option<String>,
    pub invoice_number: Option<String>,
    pub org_account_balance: Option<Decimal>,
    pub third_party_trans_id: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub raw_request: Option<Value>,
    pub raw_response: Option<Value>,
    pub raw_callback: Option<Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub audit: AuditMetadata,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn zero() -> Decimal {
    Decimal::new(0, 2)
}

/// Parses a money field from a callback; bad input becomes 0.00.
pub fn parse_amount_or_zero(raw: &str, field: &str, trans_id: &str) -> Decimal {
    match raw.trim().parse::<Decimal>() {
        Ok(amount) => amount,
        Err(_) => {
            warn!(
                "Unparsable {} '{}' on transaction {}, recording 0.00",
                field, raw, trans_id
            );
            zero()
        }
    }
}

/// Parses `yyyyMMddHHmmss` in East Africa Time; falls back to `now`.
pub fn parse_trans_time(raw: &str, trans_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S")
        .ok()
        .and_then(|naive| {
            FixedOffset::east_opt(EAT_OFFSET_SECS)
                .and_then(|eat| eat.from_local_datetime(&naive).single())
        })
        .map(|local| local.with_timezone(&Utc));

    parsed.unwrap_or_else(|| {
        warn!(
            "Missing or unparsable TransTime '{}' on transaction {}, using current time",
            raw, trans_id
        );
        now
    })
}

impl PaymentTransaction {
    fn blank(transaction_type: TransactionType, now: DateTime<Utc>) -> Self {
        PaymentTransaction {
            id: Uuid::new_v4(),
            external_transaction_id: None,
            merchant_request_id: None,
            checkout_request_id: None,
            phone_number: None,
            payer_identifier: None,
            payee_identifier: None,
            amount: zero(),
            charges_amount: zero(),
            currency: GATEWAY_CURRENCY.to_string(),
            account_reference: None,
            transaction_desc: None,
            transaction_type,
            transaction_status: TransactionStatus::Pending,
            business_short_code: None,
            bill_ref_number: None,
            invoice_number: None,
            org_account_balance: None,
            third_party_trans_id: None,
            first_name: None,
            middle_name: None,
            last_name: None,
            transaction_time: None,
            raw_request: None,
            raw_response: None,
            raw_callback: None,
            error_message: None,
            retry_count: 0,
            completed_at: None,
            audit: AuditMetadata::new(now),
        }
    }

    /// PENDING record written before the STK push call goes out.
    pub fn pending_push(request: &StkPushRequest, raw_request: Value, now: DateTime<Utc>) -> Self {
        PaymentTransaction {
            phone_number: Some(request.phone_number.clone()),
            payer_identifier: Some(request.phone_number.clone()),
            payee_identifier: Some(request.short_code.clone()),
            business_short_code: Some(request.short_code.clone()),
            amount: request.amount,
            account_reference: Some(request.account_reference.clone()),
            transaction_desc: request.transaction_desc.clone(),
            raw_request: Some(raw_request),
            ..Self::blank(TransactionType::StkPush, now)
        }
    }

    /// Seed for a C2B confirmation that has no local record yet.
    pub fn direct_notify_seed(trans_id: &str, business_short_code: &str, now: DateTime<Utc>) -> Self {
        PaymentTransaction {
            external_transaction_id: Some(trans_id.to_string()),
            payee_identifier: non_empty(business_short_code),
            business_short_code: non_empty(business_short_code),
            ..Self::blank(TransactionType::PayBill, now)
        }
    }

    pub fn with_push_response(&self, response: &StkPushResponse, raw_response: Value, now: DateTime<Utc>) -> Self {
        PaymentTransaction {
            merchant_request_id: Some(response.merchant_request_id.clone()),
            checkout_request_id: Some(response.checkout_request_id.clone()),
            raw_response: Some(raw_response),
            audit: self.audit.touched(now),
            ..self.clone()
        }
    }

    pub fn with_initiation_failure(&self, message: &str, now: DateTime<Utc>) -> Self {
        PaymentTransaction {
            error_message: Some(message.to_string()),
            retry_count: self.retry_count + 1,
            audit: self.audit.touched(now),
            ..self.clone()
        }
    }

    /// Terminal snapshot produced by an STK callback.
    pub fn finalized_by_push_callback(&self, callback: &StkCallback, raw_callback: Value, now: DateTime<Utc>) -> Self {
        let metadata = callback.metadata();
        let mut next = self.clone();

        if callback.succeeded() {
            next.transaction_status = TransactionStatus::Completed;
            next.error_message = None;
        } else {
            next.transaction_status = TransactionStatus::Failed;
            next.error_message = non_empty(&callback.result_desc);
        }

        if let Some(phone) = metadata.get("PhoneNumber") {
            let phone = super::mpesa::lenient::value_to_string(phone.clone());
            next.phone_number = non_empty(&phone);
            next.payer_identifier = non_empty(&phone);
        }
        if let Some(receipt) = metadata.get("MpesaReceiptNumber") {
            next.external_transaction_id = non_empty(&super::mpesa::lenient::value_to_string(receipt.clone()));
        }
        if let Some(raw_amount) = metadata.get("Amount") {
            match decimal_from_value(raw_amount) {
                Some(amount) => next.amount = amount,
                None => warn!(
                    "Unparsable Amount {} in callback {}, keeping {}",
                    raw_amount, callback.merchant_request_id, self.amount
                ),
            }
        }

        next.raw_callback = Some(raw_callback);
        next.completed_at = Some(now);
        next.audit = self.audit.touched(now);
        next
    }

    /// Terminal snapshot produced by a C2B confirmation; always COMPLETED.
    pub fn completed_by_direct_callback(&self, callback: &C2bCallback, raw_callback: Value, now: DateTime<Utc>) -> Self {
        let trans_id = callback.trans_id.as_str();
        let business_short_code = non_empty(&callback.business_short_code).or_else(|| self.business_short_code.clone());

        PaymentTransaction {
            external_transaction_id: Some(trans_id.to_string()),
            transaction_type: TransactionType::from_channel(&callback.transaction_type),
            transaction_status: TransactionStatus::Completed,
            phone_number: non_empty(&callback.msisdn),
            payer_identifier: non_empty(&callback.msisdn),
            payee_identifier: business_short_code.clone(),
            business_short_code,
            currency: GATEWAY_CURRENCY.to_string(),
            amount: parse_amount_or_zero(&callback.trans_amount, "TransAmount", trans_id),
            org_account_balance: Some(parse_amount_or_zero(
                &callback.org_account_balance,
                "OrgAccountBalance",
                trans_id,
            )),
            transaction_time: Some(parse_trans_time(&callback.trans_time, trans_id, now)),
            account_reference: non_empty(&callback.bill_ref_number),
            bill_ref_number: non_empty(&callback.bill_ref_number),
            invoice_number: non_empty(&callback.invoice_number),
            third_party_trans_id: non_empty(&callback.third_party_trans_id),
            first_name: non_empty(&callback.first_name),
            middle_name: non_empty(&callback.middle_name),
            last_name: non_empty(&callback.last_name),
            raw_callback: Some(raw_callback),
            error_message: None,
            completed_at: Some(now),
            audit: self.audit.touched(now),
            ..self.clone()
        }
    }
}

/// Read model returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentView {
    pub uuid: Uuid,
    pub transaction_id: Option<String>,
    pub phone_number: Option<String>,
    pub amount: Decimal,
    pub charges_amount: Decimal,
    pub currency: String,
    pub account_reference: Option<String>,
    pub transaction_desc: Option<String>,
    pub transaction_type: TransactionType,
    pub transaction_status: TransactionStatus,
    pub payer_identifier: Option<String>,
    pub payee_identifier: Option<String>,
    pub created_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
}

impl From<&PaymentTransaction> for PaymentView {
    fn from(payment: &PaymentTransaction) -> Self {
        PaymentView {
            uuid: payment.id,
            transaction_id: payment.external_transaction_id.clone(),
            phone_number: payment.phone_number.clone(),
            amount: payment.amount,
            charges_amount: payment.charges_amount,
            currency: payment.currency.clone(),
            account_reference: payment.account_reference.clone(),
            transaction_desc: payment.transaction_desc.clone(),
            transaction_type: payment.transaction_type,
            transaction_status: payment.transaction_status,
            payer_identifier: payment.payer_identifier.clone(),
            payee_identifier: payment.payee_identifier.clone(),
            created_date: payment.audit.created_at,
            completed_date: payment.completed_at,
        }
    }
}

pub fn payment_schema() -> &'static EntitySchema {
    static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        EntitySchema::new(
            "payment",
            vec![
                FieldDescriptor::new("uuid", "uuid", FieldType::Uuid),
                FieldDescriptor::new("externalTransactionId", "external_transaction_id", FieldType::String),
                FieldDescriptor::new("merchantRequestId", "merchant_request_id", FieldType::String),
                FieldDescriptor::new("checkoutRequestId", "checkout_request_id", FieldType::String),
                FieldDescriptor::new("phoneNumber", "phone_number", FieldType::String),
                FieldDescriptor::new("payerIdentifier", "payer_identifier", FieldType::String),
                FieldDescriptor::new("payeeIdentifier", "payee_identifier", FieldType::String),
                FieldDescriptor::new("amount", "amount", FieldType::Decimal),
                FieldDescriptor::new("chargesAmount", "charges_amount", FieldType::Decimal),
                FieldDescriptor::new("currency", "currency", FieldType::String),
                FieldDescriptor::new("accountReference", "account_reference", FieldType::String),
                FieldDescriptor::new("transactionDesc", "transaction_desc", FieldType::String),
                FieldDescriptor::new("transactionType", "transaction_type", FieldType::String),
                FieldDescriptor::new("transactionStatus", "transaction_status", FieldType::String),
                FieldDescriptor::new("businessShortCode", "business_short_code", FieldType::String),
                FieldDescriptor::new("billRefNumber", "bill_ref_number", FieldType::String),
                FieldDescriptor::new("invoiceNumber", "invoice_number", FieldType::String),
                FieldDescriptor::new("orgAccountBalance", "org_account_balance", FieldType::Decimal),
                FieldDescriptor::new("thirdPartyTransId", "third_party_trans_id", FieldType::String),
                FieldDescriptor::new("firstName", "first_name", FieldType::String),
                FieldDescriptor::new("middleName", "middle_name", FieldType::String),
                FieldDescriptor::new("lastName", "last_name", FieldType::String),
                FieldDescriptor::new("transactionTime", "transaction_time", FieldType::Timestamp),
                FieldDescriptor::new("retryCount", "retry_count", FieldType::Integer),
                FieldDescriptor::new("createdAt", "created_at", FieldType::Timestamp),
                FieldDescriptor::new("updatedAt", "updated_at", FieldType::Timestamp),
                FieldDescriptor::new("completedAt", "completed_at", FieldType::Timestamp),
            ],
        )
    })
}

impl Filterable for PaymentTransaction {
    fn field_value(&self, column: &str) -> Option<Option<FilterValue>> {
        let text = |v: &Option<String>| v.clone().map(FilterValue::Text);
        let value = match column {
            "uuid" => Some(FilterValue::Uuid(self.id)),
            "external_transaction_id" => text(&self.external_transaction_id),
            "merchant_request_id" => text(&self.merchant_request_id),
            "checkout_request_id" => text(&self.checkout_request_id),
            "phone_number" => text(&self.phone_number),
            "payer_identifier" => text(&self.payer_identifier),
            "payee_identifier" => text(&self.payee_identifier),
            "amount" => Some(FilterValue::Decimal(self.amount)),
            "charges_amount" => Some(FilterValue::Decimal(self.charges_amount)),
            "currency" => Some(FilterValue::Text(self.currency.clone())),
            "account_reference" => text(&self.account_reference),
            "transaction_desc" => text(&self.transaction_desc),
            "transaction_type" => Some(FilterValue::Text(self.transaction_type.as_str().to_string())),
            "transaction_status" => Some(FilterValue::Text(self.transaction_status.as_str().to_string())),
            "business_short_code" => text(&self.business_short_code),
            "bill_ref_number" => text(&self.bill_ref_number),
            "invoice_number" => text(&self.invoice_number),
            "org_account_balance" => self.org_account_balance.map(FilterValue::Decimal),
            "third_party_trans_id" => text(&self.third_party_trans_id),
            "first_name" => text(&self.first_name),
            "middle_name" => text(&self.middle_name),
            "last_name" => text(&self.last_name),
            "transaction_time" => self.transaction_time.map(FilterValue::Timestamp),
            "retry_count" => Some(FilterValue::Integer(i64::from(self.retry_count))),
            "created_at" => Some(FilterValue::Timestamp(self.audit.created_at)),
            "updated_at" => Some(FilterValue::Timestamp(self.audit.updated_at)),
            "completed_at" => self.completed_at.map(FilterValue::Timestamp),
            _ => return None,
        };
        Some(value)
    }
}
