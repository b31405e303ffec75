use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use daraja_gateway::clock::{Clock, SystemClock};
use daraja_gateway::config::AppConfig;
use daraja_gateway::database::connection::get_db_client;
use daraja_gateway::database::indexes::ensure_indexes;
use daraja_gateway::database::{MongoConfigStore, MongoPaymentStore};
use daraja_gateway::routes::{build_router, API_PREFIX};
use daraja_gateway::services::{
    ChannelNotifier, CredentialRegistry, DarajaClient, HttpDarajaClient, MpesaPaymentService, TextEncryptor,
    TokenBroker, UrlRegistrationWorker,
};
use daraja_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let db = get_db_client(&config).await.context("Failed to connect to MongoDB")?;
    ensure_indexes(&db).await.context("Failed to create indexes")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client: Arc<dyn DarajaClient> = Arc::new(HttpDarajaClient::new(&config)?);
    let encryptor = TextEncryptor::new(&config.encryption_secret_key, &config.encryption_salt)?;
    let (notifier, registrations) = ChannelNotifier::channel();

    let registry = Arc::new(CredentialRegistry::new(
        Arc::new(MongoConfigStore::new(&db)),
        encryptor,
        Arc::new(notifier),
        clock.clone(),
    ));
    let broker = Arc::new(TokenBroker::new(client.clone(), clock.clone(), config.token_cache_capacity));
    let payments = Arc::new(MpesaPaymentService::new(
        registry.clone(),
        broker.clone(),
        client.clone(),
        Arc::new(MongoPaymentStore::new(&db)),
        clock,
    ));

    let worker = UrlRegistrationWorker::new(registry.clone(), broker.clone(), client);
    tokio::spawn(worker.run(registrations));

    let state = AppState::new(payments, registry, broker).with_db(db);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daraja gateway listening on {}{}", addr, API_PREFIX);
    axum::serve(listener, app).await?;
    Ok(())
}
