#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use daraja_gateway::clock::{Clock, ManualClock};
use daraja_gateway::database::{InMemoryConfigStore, InMemoryPaymentStore};
use daraja_gateway::errors::{AppError, Result};
use daraja_gateway::models::credentials::MpesaCredentials;
use daraja_gateway::models::mpesa::{
    AccessTokenResponse, StkPushPayload, StkPushResponse, UrlRegistrationRequest, UrlRegistrationResponse,
};
use daraja_gateway::models::{CreateConfigRequest, Environment, ShortcodeType};
use daraja_gateway::services::{
    CredentialRegistry, DarajaClient, MpesaPaymentService, TextEncryptor, TokenBroker, UrlRegistrationEvent,
    UrlRegistrationNotifier,
};

pub const SHORTCODE: &str = "174379";
pub const PASSKEY: &str = "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919";

/// Scripted gateway that counts every call it receives.
pub struct FakeDarajaClient {
    pub token_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub expires_in: i64,
    pub fail_token: AtomicBool,
    pub fail_push: AtomicBool,
    pub pushes: Mutex<Vec<StkPushPayload>>,
    pub registrations: Mutex<Vec<UrlRegistrationRequest>>,
}

impl FakeDarajaClient {
    pub fn new(expires_in: i64) -> Self {
        FakeDarajaClient {
            token_calls: AtomicUsize::new(0),
            push_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            expires_in,
            fail_token: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
            pushes: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn last_push(&self) -> Option<StkPushPayload> {
        self.pushes.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DarajaClient for FakeDarajaClient {
    async fn fetch_token(&self, _credentials: &MpesaCredentials) -> Result<AccessTokenResponse> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_token.load(Ordering::SeqCst) {
            return Err(AppError::external_api("Token request failed with status 401 Unauthorized"));
        }
        Ok(AccessTokenResponse {
            access_token: format!("token-{}", n),
            expires_in: self.expires_in,
        })
    }

    async fn stk_push(&self, _environment: Environment, _token: &str, payload: &StkPushPayload) -> Result<StkPushResponse> {
        let n = self.push_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pushes.lock().unwrap().push(payload.clone());
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(AppError::external_api("STK push failed with status 500 Internal Server Error"));
        }
        Ok(StkPushResponse {
            merchant_request_id: format!("MR-{}", n),
            checkout_request_id: format!("ws_CO_{}", n),
            response_code: "0".into(),
            response_description: "Success. Request accepted for processing".into(),
            customer_message: "Success. Request accepted for processing".into(),
        })
    }

    async fn register_urls(
        &self,
        _environment: Environment,
        _token: &str,
        request: &UrlRegistrationRequest,
    ) -> Result<UrlRegistrationResponse> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.registrations.lock().unwrap().push(request.clone());
        Ok(UrlRegistrationResponse {
            originator_conversation_id: "OC-1".into(),
            response_code: "0".into(),
            response_description: "Success".into(),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<UrlRegistrationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<UrlRegistrationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl UrlRegistrationNotifier for RecordingNotifier {
    fn notify(&self, event: UrlRegistrationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub client: Arc<FakeDarajaClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub config_store: InMemoryConfigStore,
    pub payment_store: InMemoryPaymentStore,
    pub registry: Arc<CredentialRegistry>,
    pub broker: Arc<TokenBroker>,
    pub payments: Arc<MpesaPaymentService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_token_ttl(3599)
    }

    pub fn with_token_ttl(expires_in: i64) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
        let client = Arc::new(FakeDarajaClient::new(expires_in));
        let notifier = Arc::new(RecordingNotifier::default());
        let config_store = InMemoryConfigStore::new();
        let payment_store = InMemoryPaymentStore::new();

        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let dyn_client: Arc<dyn DarajaClient> = client.clone();

        let registry = Arc::new(CredentialRegistry::new(
            Arc::new(config_store.clone()),
            TextEncryptor::new("test-secret", "test-salt").unwrap(),
            notifier.clone(),
            dyn_clock.clone(),
        ));
        let broker = Arc::new(TokenBroker::new(dyn_client.clone(), dyn_clock.clone(), 16));
        let payments = Arc::new(MpesaPaymentService::new(
            registry.clone(),
            broker.clone(),
            dyn_client,
            Arc::new(payment_store.clone()),
            dyn_clock,
        ));

        Harness {
            clock,
            client,
            notifier,
            config_store,
            payment_store,
            registry,
            broker,
            payments,
        }
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }

    /// Creates the standard sandbox collection config for `SHORTCODE`.
    pub async fn with_sandbox_config(self) -> Self {
        self.registry.create_config(collection_request(SHORTCODE)).await.unwrap();
        self
    }
}

pub fn collection_request(shortcode: &str) -> CreateConfigRequest {
    CreateConfigRequest {
        shortcode: shortcode.to_string(),
        environment: Environment::Sandbox,
        shortcode_type: ShortcodeType::Collection,
        consumer_key: "consumer-key".into(),
        consumer_secret: "consumer-secret".into(),
        passkey: Some(PASSKEY.into()),
        security_credential: None,
        initiator_name: None,
        collection_callback_url: Some("https://merchant.example/c2b/confirmation".into()),
        collection_validation_url: Some("https://merchant.example/c2b/validation".into()),
        collection_timeout_url: Some("https://merchant.example/c2b/timeout".into()),
        collection_result_url: Some("https://merchant.example/c2b/result".into()),
        disbursement_result_url: None,
        disbursement_timeout_url: None,
        disbursement_queue_url: None,
        stk_callback_url: Some("https://merchant.example/stk/callback".into()),
        active: None,
        description: Some("Test till".into()),
    }
}

pub fn credentials(shortcode: &str) -> MpesaCredentials {
    MpesaCredentials {
        shortcode: shortcode.to_string(),
        environment: Environment::Sandbox,
        consumer_key: "consumer-key".into(),
        consumer_secret: "consumer-secret".into(),
        passkey: Some(PASSKEY.into()),
        security_credential: None,
    }
}
