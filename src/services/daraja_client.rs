// services/daraja_client.rs
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use tracing::{error, info};

use crate::config::{AppConfig, GatewayUrls};
use crate::errors::{AppError, Result};
use crate::models::credentials::MpesaCredentials;
use crate::models::mpesa::{
    AccessTokenResponse, StkPushPayload, StkPushResponse, UrlRegistrationRequest, UrlRegistrationResponse,
};
use crate::models::Environment;

/// Outbound calls to the Daraja REST API.
#[async_trait]
pub trait DarajaClient: Send + Sync {
    async fn fetch_token(&self, credentials: &MpesaCredentials) -> Result<AccessTokenResponse>;

    async fn stk_push(&self, environment: Environment, token: &str, payload: &StkPushPayload) -> Result<StkPushResponse>;

    async fn register_urls(
        &self,
        environment: Environment,
        token: &str,
        request: &UrlRegistrationRequest,
    ) -> Result<UrlRegistrationResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpDarajaClient {
    client: Client,
    sandbox: GatewayUrls,
    production: GatewayUrls,
}

impl HttpDarajaClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpDarajaClient {
            client,
            sandbox: config.sandbox_urls.clone(),
            production: config.production_urls.clone(),
        })
    }

    fn urls(&self, environment: Environment) -> &GatewayUrls {
        match environment {
            Environment::Sandbox => &self.sandbox,
            Environment::Production => &self.production,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response, call: &str) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("{} failed: {} - {}", call, status, body);
            return Err(AppError::external_api(format!("{} failed with status {}", call, status)));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl DarajaClient for HttpDarajaClient {
    async fn fetch_token(&self, credentials: &MpesaCredentials) -> Result<AccessTokenResponse> {
        info!("Requesting new access token for {}", credentials.identity());
        let auth_string = format!(
            "{}:{}",
            credentials.consumer_key.reveal(),
            credentials.consumer_secret.reveal()
        );
        let encoded_auth = base64.encode(auth_string);

        let response = self
            .client
            .get(&self.urls(credentials.environment).auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await?;

        Self::read_json(response, "Token request").await
    }

    async fn stk_push(&self, environment: Environment, token: &str, payload: &StkPushPayload) -> Result<StkPushResponse> {
        let response = self
            .client
            .post(&self.urls(environment).stk_push_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await?;

        Self::read_json(response, "STK push").await
    }

    async fn register_urls(
        &self,
        environment: Environment,
        token: &str,
        request: &UrlRegistrationRequest,
    ) -> Result<UrlRegistrationResponse> {
        let response = self
            .client
            .post(&self.urls(environment).register_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        Self::read_json(response, "C2B URL registration").await
    }
}
