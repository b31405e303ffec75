// models/mpesa.rs
//! Request and response bodies exchanged with Daraja, plus the STK push
//! request accepted from merchants. Gateway field casing is fixed upstream.
use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use super::shortcode_config::Environment;

pub const STK_TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
pub const SUCCESS_RESULT_CODE: &str = "0";
pub const DEFAULT_TRANSACTION_DESC: &str = "Payment";

// Lenient scalar handling: Daraja mixes strings and numbers across products.
pub(crate) mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn value_to_string(value: Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.map(value_to_string).unwrap_or_default())
    }

    pub fn seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = value_to_string(Value::deserialize(deserializer)?);
        raw.trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("expires_in is not a number of seconds: '{}'", raw)))
    }
}

// ===== Merchant-facing request =====

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StkPushRequest {
    #[validate(custom(function = "validate_msisdn"))]
    pub phone_number: String,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    #[serde(rename = "account_number")]
    #[validate(length(min = 1, max = 20, message = "Account reference must be 1 to 20 characters"))]
    pub account_reference: String,
    #[validate(length(max = 100, message = "Transaction description cannot exceed 100 characters"))]
    pub transaction_desc: Option<String>,
    #[validate(custom(function = "validate_shortcode"))]
    pub short_code: String,
    pub environment: Environment,
}

impl StkPushRequest {
    /// Rewrites local phone formats (07XXXXXXXX, 7XXXXXXXX) to 254XXXXXXXXX.
    pub fn normalized(mut self) -> Self {
        self.phone_number = format_phone_number(&self.phone_number);
        self.short_code = self.short_code.trim().to_string();
        self
    }
}

pub fn format_phone_number(phone: &str) -> String {
    let phone = phone.trim().trim_start_matches('+');
    if phone.starts_with("254") && phone.len() == 12 {
        return phone.to_string();
    }
    if phone.starts_with("07") && phone.len() == 10 {
        return format!("254{}", &phone[1..]);
    }
    if phone.starts_with('7') && phone.len() == 9 {
        return format!("254{}", phone);
    }
    phone.to_string()
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn validate_msisdn(phone: &str) -> Result<(), ValidationError> {
    if phone.len() == 12 && phone.starts_with("254") && all_digits(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("msisdn")
            .with_message("Phone number must be in format 254XXXXXXXXX where X is a digit".into()))
    }
}

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("amount").with_message("Amount must be greater than 0".into()))
    }
}

fn validate_shortcode(shortcode: &str) -> Result<(), ValidationError> {
    if (5..=7).contains(&shortcode.len()) && all_digits(shortcode) {
        Ok(())
    } else {
        Err(ValidationError::new("shortcode").with_message("Shortcode must be 5-7 digits".into()))
    }
}

// ===== Outbound: OAuth =====

#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    #[serde(deserialize_with = "lenient::seconds")]
    pub expires_in: i64,
}

// ===== Outbound: STK push =====

#[derive(Debug, Clone, Serialize)]
pub struct StkPushPayload {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode", deserialize_with = "lenient::string")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl StkPushResponse {
    pub fn accepted(&self) -> bool {
        self.response_code == SUCCESS_RESULT_CODE
    }
}

// ===== Inbound: STK callback =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode", deserialize_with = "lenient::string")]
    pub result_code: String,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default, skip_serializing_if = "Option::is_none")]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn succeeded(&self) -> bool {
        self.result_code.trim() == SUCCESS_RESULT_CODE
    }

    /// Flattens the metadata item list into name -> value.
    pub fn metadata(&self) -> HashMap<String, Value> {
        self.callback_metadata
            .as_ref()
            .map(|m| {
                m.items
                    .iter()
                    .filter_map(|item| item.value.clone().map(|v| (item.name.clone(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

/// Daraja posts `{"Body":{"stkCallback":{..}}}`; relays often strip the envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StkCallbackEnvelope {
    Wrapped {
        #[serde(rename = "Body")]
        body: StkCallbackBody,
    },
    Bare(StkCallback),
}

impl StkCallbackEnvelope {
    pub fn into_callback(self) -> StkCallback {
        match self {
            StkCallbackEnvelope::Wrapped { body } => body.stk_callback,
            StkCallbackEnvelope::Bare(callback) => callback,
        }
    }
}

// ===== Inbound: C2B confirmation =====

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct C2bCallback {
    #[serde(rename = "TransactionType", default, deserialize_with = "lenient::string")]
    pub transaction_type: String,
    #[serde(rename = "TransID", deserialize_with = "lenient::string")]
    pub trans_id: String,
    #[serde(rename = "TransTime", default, deserialize_with = "lenient::string")]
    pub trans_time: String,
    #[serde(rename = "TransAmount", default, deserialize_with = "lenient::string")]
    pub trans_amount: String,
    #[serde(rename = "BusinessShortCode", default, deserialize_with = "lenient::string")]
    pub business_short_code: String,
    #[serde(rename = "BillRefNumber", default, deserialize_with = "lenient::string")]
    pub bill_ref_number: String,
    #[serde(rename = "InvoiceNumber", default, deserialize_with = "lenient::string")]
    pub invoice_number: String,
    #[serde(rename = "OrgAccountBalance", default, deserialize_with = "lenient::string")]
    pub org_account_balance: String,
    #[serde(rename = "ThirdPartyTransID", default, deserialize_with = "lenient::string")]
    pub third_party_trans_id: String,
    #[serde(rename = "MSISDN", default, deserialize_with = "lenient::string")]
    pub msisdn: String,
    #[serde(rename = "FirstName", default, deserialize_with = "lenient::string")]
    pub first_name: String,
    #[serde(rename = "MiddleName", default, deserialize_with = "lenient::string")]
    pub middle_name: String,
    #[serde(rename = "LastName", default, deserialize_with = "lenient::string")]
    pub last_name: String,
}

// ===== Outbound: C2B URL registration =====

#[derive(Debug, Clone, Serialize)]
pub struct UrlRegistrationRequest {
    #[serde(rename = "ShortCode")]
    pub short_code: String,
    #[serde(rename = "ResponseType")]
    pub response_type: String,
    #[serde(rename = "ConfirmationURL")]
    pub confirmation_url: String,
    #[serde(rename = "ValidationURL")]
    pub validation_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlRegistrationResponse {
    #[serde(rename = "OriginatorConversationID", default)]
    pub originator_conversation_id: String,
    #[serde(rename = "ResponseCode", default, deserialize_with = "lenient::string")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
}

/// Body returned to Daraja after a callback has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        CallbackAck {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

/// Reads a decimal out of a metadata value that may be a number or a string.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&raw).ok())
}
