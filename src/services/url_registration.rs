// services/url_registration.rs
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config_service::CredentialRegistry;
use super::daraja_client::DarajaClient;
use super::token_broker::TokenBroker;
use crate::errors::{AppError, Result};
use crate::models::mpesa::{UrlRegistrationRequest, UrlRegistrationResponse};
use crate::models::Environment;

pub const RESPONSE_TYPE_COMPLETED: &str = "Completed";

/// Raised after a collection-capable config is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRegistrationEvent {
    pub config_id: Uuid,
    pub shortcode: String,
    pub environment: Environment,
}

/// Outbound port for "register my C2B callback URLs" requests.
pub trait UrlRegistrationNotifier: Send + Sync {
    fn notify(&self, event: UrlRegistrationEvent);
}

/// Hands events to a background worker over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<UrlRegistrationEvent>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UrlRegistrationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelNotifier { sender }, receiver)
    }
}

impl UrlRegistrationNotifier for ChannelNotifier {
    fn notify(&self, event: UrlRegistrationEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("URL registration worker is gone, dropping event for {}", e.0.shortcode);
        }
    }
}

pub struct UrlRegistrationWorker {
    registry: Arc<CredentialRegistry>,
    broker: Arc<TokenBroker>,
    client: Arc<dyn DarajaClient>,
}

impl UrlRegistrationWorker {
    pub fn new(registry: Arc<CredentialRegistry>, broker: Arc<TokenBroker>, client: Arc<dyn DarajaClient>) -> Self {
        UrlRegistrationWorker {
            registry,
            broker,
            client,
        }
    }

    /// Drains the channel until every sender is dropped. Failures are logged only.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<UrlRegistrationEvent>) {
        info!("URL registration worker started");
        while let Some(event) = receiver.recv().await {
            match self.register(&event).await {
                Ok(response) => info!(
                    "Registered C2B URLs for {}/{}: {} {}",
                    event.shortcode, event.environment, response.response_code, response.response_description
                ),
                Err(e) => error!(
                    "Failed to register C2B URLs for {}/{}: {}",
                    event.shortcode, event.environment, e
                ),
            }
        }
        info!("URL registration worker stopped");
    }

    pub async fn register(&self, event: &UrlRegistrationEvent) -> Result<UrlRegistrationResponse> {
        let config = self
            .registry
            .get_active_config(&event.shortcode, event.environment)
            .await?;

        let (Some(confirmation_url), Some(validation_url)) = (
            config.collection_callback_url.clone(),
            config.collection_validation_url.clone(),
        ) else {
            return Err(AppError::incomplete(format!(
                "Shortcode {} has no collection callback/validation URLs",
                config.shortcode
            )));
        };

        let credentials = self.registry.decrypt_credentials(&config)?;
        let token = self.broker.get_token(&credentials).await?;

        let request = UrlRegistrationRequest {
            short_code: config.shortcode.clone(),
            response_type: RESPONSE_TYPE_COMPLETED.to_string(),
            confirmation_url,
            validation_url,
        };

        self.client
            .register_urls(config.environment, &token, &request)
            .await
            .map_err(|e| e.wrap("Registering C2B URLs"))
    }
}
