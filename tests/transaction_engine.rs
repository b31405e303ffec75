mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{Harness, PASSKEY, SHORTCODE};
use daraja_gateway::database::PaymentStore;
use daraja_gateway::errors::AppError;
use daraja_gateway::models::mpesa::{C2bCallback, StkCallback, StkCallbackEnvelope, StkPushRequest};
use daraja_gateway::models::{Environment, TransactionStatus, TransactionType};

fn push_request() -> StkPushRequest {
    StkPushRequest {
        phone_number: "254712345678".into(),
        amount: dec!(100.00),
        account_reference: "INV-001".into(),
        transaction_desc: None,
        short_code: SHORTCODE.into(),
        environment: Environment::Sandbox,
    }
}

fn push_callback(merchant_request_id: &str, result_code: i64) -> StkCallback {
    let result_desc = if result_code == 0 {
        "The service request is processed successfully."
    } else {
        "The balance is insufficient for the transaction."
    };
    let envelope: StkCallbackEnvelope = serde_json::from_value(json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": merchant_request_id,
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": result_code,
                "ResultDesc": result_desc,
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 100 },
                        { "Name": "MpesaReceiptNumber", "Value": "ABC123XYZ" },
                        { "Name": "TransactionDate", "Value": 20240601120000u64 },
                        { "Name": "PhoneNumber", "Value": 254712345678u64 }
                    ]
                }
            }
        }
    }))
    .unwrap();
    envelope.into_callback()
}

fn c2b_callback(trans_id: &str, amount: &str) -> C2bCallback {
    serde_json::from_value(json!({
        "TransactionType": "Pay Bill",
        "TransID": trans_id,
        "TransTime": "20240601153000",
        "TransAmount": amount,
        "BusinessShortCode": "600638",
        "BillRefNumber": "ACC-9",
        "InvoiceNumber": "",
        "OrgAccountBalance": "49197.00",
        "ThirdPartyTransID": "",
        "MSISDN": "254708374149",
        "FirstName": "John",
        "MiddleName": "",
        "LastName": "Doe"
    }))
    .unwrap()
}

#[tokio::test]
async fn push_then_successful_callback_completes_the_payment() {
    let harness = Harness::new().with_sandbox_config().await;

    let response = harness.payments.initiate_push(push_request()).await.unwrap();
    assert_eq!(response.merchant_request_id, "MR-1");

    let pending = harness
        .payment_store
        .find_by_merchant_request_id("MR-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.transaction_status, TransactionStatus::Pending);
    assert_eq!(pending.transaction_type, TransactionType::StkPush);
    assert_eq!(pending.amount, dec!(100.00));
    assert!(pending.raw_request.is_some());
    assert!(pending.raw_response.is_some());

    harness.clock.advance(Duration::seconds(40));
    let view = harness
        .payments
        .process_push_callback(push_callback("MR-1", 0))
        .await
        .unwrap();

    assert_eq!(view.uuid, pending.id);
    assert_eq!(view.transaction_status, TransactionStatus::Completed);
    assert_eq!(view.transaction_id.as_deref(), Some("ABC123XYZ"));
    assert_eq!(view.phone_number.as_deref(), Some("254712345678"));
    assert_eq!(view.amount, dec!(100));
    assert_eq!(view.completed_date, Some(harness.clock_now()));

    let by_receipt = harness.payments.get_by_external_id("ABC123XYZ").await.unwrap();
    assert_eq!(by_receipt.uuid, pending.id);
}

#[tokio::test]
async fn push_payload_carries_password_and_callback_url() {
    let harness = Harness::new().with_sandbox_config().await;
    harness.payments.initiate_push(push_request()).await.unwrap();

    let payload = harness.client.last_push().unwrap();
    assert_eq!(payload.business_short_code, SHORTCODE);
    assert_eq!(payload.transaction_type, "CustomerPayBillOnline");
    assert_eq!(payload.amount, "100");
    assert_eq!(payload.party_a, "254712345678");
    assert_eq!(payload.party_b, SHORTCODE);
    assert_eq!(payload.phone_number, "254712345678");
    assert_eq!(payload.callback_url, "https://merchant.example/stk/callback");
    assert_eq!(payload.transaction_desc, "Payment");
    // 09:00 UTC is 12:00 in Nairobi.
    assert_eq!(payload.timestamp, "20240601120000");

    let decoded = String::from_utf8(base64.decode(&payload.password).unwrap()).unwrap();
    assert_eq!(decoded, format!("{}{}{}", SHORTCODE, PASSKEY, payload.timestamp));
}

#[tokio::test]
async fn local_phone_formats_are_normalized() {
    let harness = Harness::new().with_sandbox_config().await;
    let mut request = push_request();
    request.phone_number = "0712345678".into();

    harness.payments.initiate_push(request).await.unwrap();
    assert_eq!(harness.client.last_push().unwrap().party_a, "254712345678");
}

#[tokio::test]
async fn invalid_push_requests_never_reach_the_gateway() {
    let harness = Harness::new().with_sandbox_config().await;

    let mut bad_amount = push_request();
    bad_amount.amount = dec!(0);
    let err = harness.payments.initiate_push(bad_amount).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let mut bad_phone = push_request();
    bad_phone.phone_number = "12345".into();
    let err = harness.payments.initiate_push(bad_phone).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    assert_eq!(harness.client.push_calls.load(Ordering::SeqCst), 0);
    assert!(harness.payment_store.is_empty().await);
}

#[tokio::test]
async fn push_for_unknown_shortcode_fails_without_a_record() {
    let harness = Harness::new();
    let err = harness.payments.initiate_push(push_request()).await.unwrap_err();
    assert!(matches!(err, AppError::ConfigurationNotFound(_)));
    assert!(harness.payment_store.is_empty().await);
}

#[tokio::test]
async fn failed_push_leaves_a_pending_row_with_bookkeeping() {
    let harness = Harness::new().with_sandbox_config().await;
    harness.client.fail_push.store(true, Ordering::SeqCst);

    let err = harness.payments.initiate_push(push_request()).await.unwrap_err();
    assert!(matches!(err, AppError::PaymentInitiationFailed(_)));

    let stale = harness.payments.list_stale_pending(Duration::zero()).await;
    assert!(stale.unwrap().is_empty());

    harness.clock.advance(Duration::minutes(31));
    let stale = harness.payments.list_stale_pending(Duration::minutes(30)).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].transaction_status, TransactionStatus::Pending);

    let row = harness.payment_store.find_by_id(stale[0].uuid).await.unwrap().unwrap();
    assert_eq!(row.retry_count, 1);
    assert!(row.error_message.unwrap().contains("500"));
}

#[tokio::test]
async fn token_failure_is_reported_as_authentication_failure() {
    let harness = Harness::new().with_sandbox_config().await;
    harness.client.fail_token.store(true, Ordering::SeqCst);

    let err = harness.payments.initiate_push(push_request()).await.unwrap_err();
    assert!(matches!(err, AppError::AuthenticationFailed(_)));
    assert_eq!(harness.client.push_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.payment_store.len().await, 1);
}

#[tokio::test]
async fn failed_result_code_marks_the_payment_failed() {
    let harness = Harness::new().with_sandbox_config().await;
    harness.payments.initiate_push(push_request()).await.unwrap();

    let view = harness
        .payments
        .process_push_callback(push_callback("MR-1", 1))
        .await
        .unwrap();
    assert_eq!(view.transaction_status, TransactionStatus::Failed);
}

#[tokio::test]
async fn repeated_push_callback_does_not_flip_a_terminal_payment() {
    let harness = Harness::new().with_sandbox_config().await;
    harness.payments.initiate_push(push_request()).await.unwrap();

    let first = harness
        .payments
        .process_push_callback(push_callback("MR-1", 0))
        .await
        .unwrap();
    let replay = harness
        .payments
        .process_push_callback(push_callback("MR-1", 1))
        .await
        .unwrap();

    assert_eq!(first.transaction_status, TransactionStatus::Completed);
    assert_eq!(replay.transaction_status, TransactionStatus::Completed);
    assert_eq!(replay.uuid, first.uuid);
}

#[tokio::test]
async fn push_callback_for_unknown_request_is_not_found() {
    let harness = Harness::new();
    let err = harness
        .payments
        .process_push_callback(push_callback("MR-404", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentNotFound(_)));
}

#[tokio::test]
async fn direct_callback_creates_one_completed_record() {
    let harness = Harness::new();

    let view = harness
        .payments
        .process_direct_callback(c2b_callback("RKTQDM7W6S", "150.50"))
        .await
        .unwrap();
    assert_eq!(view.transaction_status, TransactionStatus::Completed);
    assert_eq!(view.transaction_type, TransactionType::PayBill);
    assert_eq!(view.transaction_id.as_deref(), Some("RKTQDM7W6S"));
    assert_eq!(view.amount, dec!(150.50));
    assert_eq!(view.currency, "KES");
    assert_eq!(view.payer_identifier.as_deref(), Some("254708374149"));
    assert_eq!(view.payee_identifier.as_deref(), Some("600638"));

    let row = harness.payment_store.find_by_id(view.uuid).await.unwrap().unwrap();
    assert_eq!(row.org_account_balance, Some(dec!(49197.00)));
    assert_eq!(row.first_name.as_deref(), Some("John"));
    assert_eq!(row.middle_name, None);
    // 15:30 in Nairobi.
    assert_eq!(row.transaction_time, Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()));

    let replay = harness
        .payments
        .process_direct_callback(c2b_callback("RKTQDM7W6S", "150.50"))
        .await
        .unwrap();
    assert_eq!(replay.uuid, view.uuid);
    assert_eq!(harness.payment_store.len().await, 1);
}

#[tokio::test]
async fn concurrent_direct_callbacks_create_a_single_record() {
    let harness = Harness::new();
    let payments = harness.payments.clone();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let payments = payments.clone();
            tokio::spawn(async move {
                payments
                    .process_direct_callback(c2b_callback("RKTQDM7W6S", "10"))
                    .await
            })
        })
        .collect();

    for task in tasks {
        let view = task.await.unwrap().unwrap();
        assert_eq!(view.transaction_status, TransactionStatus::Completed);
    }
    assert_eq!(harness.payment_store.len().await, 1);
}

#[tokio::test]
async fn blank_amount_and_time_fall_back_to_safe_defaults() {
    let harness = Harness::new();
    let mut callback = c2b_callback("RKTQDM7W6T", "");
    callback.trans_time = "not-a-time".into();
    callback.org_account_balance = "n/a".into();

    let view = harness.payments.process_direct_callback(callback).await.unwrap();
    assert_eq!(view.amount, dec!(0.00));
    assert_eq!(view.amount.to_string(), "0.00");

    let row = harness.payment_store.find_by_id(view.uuid).await.unwrap().unwrap();
    assert_eq!(row.org_account_balance, Some(dec!(0.00)));
    assert_eq!(row.transaction_time, Some(harness.clock_now()));
}

#[tokio::test]
async fn unrecognized_channel_defaults_to_pay_bill() {
    let harness = Harness::new();
    let mut callback = c2b_callback("RKTQDM7W6U", "5");
    callback.transaction_type = "  buy   goods ".into();
    let view = harness.payments.process_direct_callback(callback).await.unwrap();
    assert_eq!(view.transaction_type, TransactionType::BuyGoods);

    let mut callback = c2b_callback("RKTQDM7W6V", "5");
    callback.transaction_type = "Something New".into();
    let view = harness.payments.process_direct_callback(callback).await.unwrap();
    assert_eq!(view.transaction_type, TransactionType::PayBill);
}

#[tokio::test]
async fn lookups_fail_with_payment_not_found() {
    let harness = Harness::new();
    assert!(matches!(
        harness.payments.get_by_id(uuid::Uuid::new_v4()).await,
        Err(AppError::PaymentNotFound(_))
    ));
    assert!(matches!(
        harness.payments.get_by_external_id("NOPE").await,
        Err(AppError::PaymentNotFound(_))
    ));
    assert!(matches!(
        harness.payments.validate_status("NOPE").await,
        Err(AppError::PaymentNotFound(_))
    ));
}

#[tokio::test]
async fn validate_status_reports_the_stored_state() {
    let harness = Harness::new();
    harness
        .payments
        .process_direct_callback(c2b_callback("RKTQDM7W6S", "20"))
        .await
        .unwrap();

    let view = harness.payments.validate_status("RKTQDM7W6S").await.unwrap();
    assert_eq!(view.transaction_status, TransactionStatus::Completed);
    assert_eq!(harness.client.token_calls(), 0);
}

#[tokio::test]
async fn list_by_phone_is_newest_first() {
    let harness = Harness::new().with_sandbox_config().await;
    harness.payments.initiate_push(push_request()).await.unwrap();
    harness.clock.advance(Duration::minutes(1));
    harness.payments.initiate_push(push_request()).await.unwrap();

    let views = harness.payments.list_by_phone("0712345678").await.unwrap();
    assert_eq!(views.len(), 2);
    assert!(views[0].created_date > views[1].created_date);
}

#[tokio::test]
async fn search_applies_filters_and_pagination() {
    let harness = Harness::new();
    for (trans_id, amount) in [("T1", "5"), ("T2", "15"), ("T3", "25"), ("T4", "35")] {
        harness
            .payments
            .process_direct_callback(c2b_callback(trans_id, amount))
            .await
            .unwrap();
        harness.clock.advance(Duration::seconds(1));
    }

    let params: HashMap<String, String> = [
        ("amount_between", "10,30"),
        ("transactionStatus", "COMPLETED"),
        ("sort", "amount,desc"),
        ("page", "0"),
        ("size", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let page = harness.payments.search(&params).await.unwrap();
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].transaction_id.as_deref(), Some("T3"));
    assert!(page.has_next());
}

#[tokio::test]
async fn malformed_range_is_rejected_before_querying() {
    let harness = Harness::new();
    let params: HashMap<String, String> = [("amount_between".to_string(), "10,5,3".to_string())].into();

    let err = harness.payments.search(&params).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidFilterRange(_)));
}

#[tokio::test]
async fn unparsable_filter_value_names_the_field() {
    let harness = Harness::new();
    let params: HashMap<String, String> = [("amount_gt".to_string(), "lots".to_string())].into();

    match harness.payments.search(&params).await {
        Err(AppError::InvalidFilterValue { field, field_type, .. }) => {
            assert_eq!(field, "amount");
            assert_eq!(field_type, "decimal");
        }
        other => panic!("expected InvalidFilterValue, got {:?}", other.map(|p| p.total_elements)),
    }
}
