mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use common::{collection_request, FakeDarajaClient, SHORTCODE};
use daraja_gateway::clock::{Clock, ManualClock};
use daraja_gateway::database::InMemoryConfigStore;
use daraja_gateway::errors::AppError;
use daraja_gateway::models::{Environment, ShortcodeConfig};
use daraja_gateway::services::{
    ChannelNotifier, CredentialRegistry, DarajaClient, TextEncryptor, TokenBroker, UrlRegistrationEvent,
    UrlRegistrationNotifier, UrlRegistrationWorker,
};

struct Wiring {
    client: Arc<FakeDarajaClient>,
    registry: Arc<CredentialRegistry>,
    worker: UrlRegistrationWorker,
    receiver: tokio::sync::mpsc::UnboundedReceiver<UrlRegistrationEvent>,
}

fn wiring() -> Wiring {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let client = Arc::new(FakeDarajaClient::new(3599));
    let dyn_client: Arc<dyn DarajaClient> = client.clone();
    let (notifier, receiver) = ChannelNotifier::channel();

    let registry = Arc::new(CredentialRegistry::new(
        Arc::new(InMemoryConfigStore::new()),
        TextEncryptor::new("worker-secret", "worker-salt").unwrap(),
        Arc::new(notifier),
        clock.clone(),
    ));
    let broker = Arc::new(TokenBroker::new(dyn_client.clone(), clock, 8));
    let worker = UrlRegistrationWorker::new(registry.clone(), broker, dyn_client);

    Wiring {
        client,
        registry,
        worker,
        receiver,
    }
}

#[tokio::test]
async fn created_config_registers_its_confirmation_urls() {
    let mut wiring = wiring();
    let saved: ShortcodeConfig = wiring
        .registry
        .create_config(collection_request(SHORTCODE))
        .await
        .unwrap();

    let event = wiring.receiver.recv().await.unwrap();
    assert_eq!(event.config_id, saved.id);

    let response = wiring.worker.register(&event).await.unwrap();
    assert_eq!(response.response_code, "0");

    let sent = wiring.client.registrations.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].short_code, SHORTCODE);
    assert_eq!(sent[0].response_type, "Completed");
    assert_eq!(sent[0].confirmation_url, "https://merchant.example/c2b/confirmation");
    assert_eq!(sent[0].validation_url, "https://merchant.example/c2b/validation");
    assert_eq!(wiring.client.token_calls(), 1);
}

#[tokio::test]
async fn worker_drains_until_senders_are_gone() {
    let wiring = wiring();
    let saved = wiring
        .registry
        .create_config(collection_request(SHORTCODE))
        .await
        .unwrap();

    let (notifier, receiver) = ChannelNotifier::channel();
    let event = UrlRegistrationEvent {
        config_id: saved.id,
        shortcode: saved.shortcode.clone(),
        environment: saved.environment,
    };
    notifier.notify(event.clone());
    notifier.notify(event);
    drop(notifier);

    wiring.worker.run(receiver).await;
    assert_eq!(wiring.client.register_calls.load(Ordering::SeqCst), 2);
    // The second registration reused the cached token.
    assert_eq!(wiring.client.token_calls(), 1);
}

#[tokio::test]
async fn registration_for_a_missing_config_fails_quietly() {
    let wiring = wiring();
    let event = UrlRegistrationEvent {
        config_id: uuid::Uuid::new_v4(),
        shortcode: "999999".into(),
        environment: Environment::Production,
    };

    let err = wiring.worker.register(&event).await.unwrap_err();
    assert!(matches!(err, AppError::ConfigurationNotFound(_)));
    assert_eq!(wiring.client.register_calls.load(Ordering::SeqCst), 0);
}
