// services/config_service.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use super::encryption::TextEncryptor;
use super::url_registration::{UrlRegistrationEvent, UrlRegistrationNotifier};
use crate::clock::Clock;
use crate::database::ConfigStore;
use crate::errors::{AppError, Result};
use crate::filter::{Page, Pageable};
use crate::models::credentials::{CredentialIdentity, MpesaCredentials, Secret};
use crate::models::shortcode_config::{EncryptedSecretPatch, EncryptedSecrets};
use crate::models::{ConfigPatch, CreateConfigRequest, Environment, ShortcodeConfig};

/// Owns per-(shortcode, environment) gateway configuration.
pub struct CredentialRegistry {
    store: Arc<dyn ConfigStore>,
    encryptor: TextEncryptor,
    notifier: Arc<dyn UrlRegistrationNotifier>,
    clock: Arc<dyn Clock>,
    active_cache: RwLock<HashMap<CredentialIdentity, ShortcodeConfig>>,
    /// Bumped on every write; a read only fills the cache if no write ran meanwhile.
    cache_generation: AtomicU64,
}

impl CredentialRegistry {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        encryptor: TextEncryptor,
        notifier: Arc<dyn UrlRegistrationNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CredentialRegistry {
            store,
            encryptor,
            notifier,
            clock,
            active_cache: RwLock::new(HashMap::new()),
            cache_generation: AtomicU64::new(0),
        }
    }

    pub async fn get_active_config(&self, shortcode: &str, environment: Environment) -> Result<ShortcodeConfig> {
        let identity = CredentialIdentity {
            shortcode: shortcode.to_string(),
            environment,
        };
        if let Some(config) = self.active_cache.read().await.get(&identity) {
            debug!("Config cache hit for {}", identity);
            return Ok(config.clone());
        }

        let generation = self.cache_generation.load(Ordering::SeqCst);
        let config = self
            .store
            .find_active(shortcode, environment)
            .await?
            .ok_or_else(|| {
                AppError::ConfigurationNotFound(format!(
                    "No active configuration for shortcode {} in {}",
                    shortcode, environment
                ))
            })?;

        let mut cache = self.active_cache.write().await;
        if self.cache_generation.load(Ordering::SeqCst) == generation {
            cache.insert(identity, config.clone());
        } else {
            debug!("Config for {} changed while loading, not caching", identity);
        }
        Ok(config)
    }

    pub async fn get_config(&self, id: Uuid) -> Result<ShortcodeConfig> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ConfigurationNotFound(id.to_string()))
    }

    pub async fn list_active_configs(&self, pageable: &Pageable) -> Result<Page<ShortcodeConfig>> {
        self.store.list_active(pageable).await
    }

    pub async fn create_config(&self, request: CreateConfigRequest) -> Result<ShortcodeConfig> {
        request.validate()?;
        let shortcode = request.shortcode.trim().to_string();
        info!("Creating M-Pesa config for shortcode {} in {}", shortcode, request.environment);

        if self
            .store
            .find_by_identity(&shortcode, request.environment)
            .await?
            .is_some()
        {
            return Err(AppError::ConfigurationAlreadyExists {
                shortcode,
                environment: request.environment.to_string(),
            });
        }

        let secrets = EncryptedSecrets {
            consumer_key: self.encryptor.encrypt(&request.consumer_key)?,
            consumer_secret: self.encryptor.encrypt(&request.consumer_secret)?,
            passkey: self.encryptor.encrypt_opt(request.passkey.as_deref())?,
            security_credential: self.encryptor.encrypt_opt(request.security_credential.as_deref())?,
        };
        let config = ShortcodeConfig::new(request, secrets, self.clock.now());
        config.ensure_complete()?;

        let saved = self.store.insert(config).await?;
        self.invalidate_cache().await;

        if saved.active && saved.shortcode_type.collects() {
            self.notifier.notify(UrlRegistrationEvent {
                config_id: saved.id,
                shortcode: saved.shortcode.clone(),
                environment: saved.environment,
            });
        }

        info!("Created M-Pesa config {} for shortcode {}", saved.id, saved.shortcode);
        Ok(saved)
    }

    pub async fn update_config(&self, id: Uuid, patch: ConfigPatch) -> Result<ShortcodeConfig> {
        patch.validate()?;
        let existing = self.get_config(id).await?;

        let secrets = EncryptedSecretPatch {
            consumer_key: self.encryptor.encrypt_opt(patch.consumer_key.as_deref())?,
            consumer_secret: self.encryptor.encrypt_opt(patch.consumer_secret.as_deref())?,
            passkey: self.encryptor.encrypt_opt(patch.passkey.as_deref())?,
            security_credential: self.encryptor.encrypt_opt(patch.security_credential.as_deref())?,
        };
        let merged = existing.apply_patch(patch, secrets, self.clock.now());
        merged.ensure_complete()?;

        let saved = self.store.update(merged).await?;
        self.invalidate_cache().await;
        info!("Updated M-Pesa config {}", id);
        Ok(saved)
    }

    /// Idempotent: an already inactive config is returned as is.
    pub async fn deactivate_config(&self, id: Uuid) -> Result<ShortcodeConfig> {
        let existing = self.get_config(id).await?;
        if !existing.active {
            debug!("Config {} is already inactive", id);
            self.invalidate_cache().await;
            return Ok(existing);
        }

        let saved = self.store.update(existing.deactivated(self.clock.now())).await?;
        self.invalidate_cache().await;
        info!("Deactivated M-Pesa config {}", id);
        Ok(saved)
    }

    pub fn decrypt_credentials(&self, config: &ShortcodeConfig) -> Result<MpesaCredentials> {
        let decrypt = |value: &str| self.encryptor.decrypt(value).map(Secret::new);
        let decrypt_opt = |value: &Option<String>| value.as_deref().map(decrypt).transpose();

        Ok(MpesaCredentials {
            shortcode: config.shortcode.clone(),
            environment: config.environment,
            consumer_key: decrypt(&config.consumer_key)?,
            consumer_secret: decrypt(&config.consumer_secret)?,
            passkey: decrypt_opt(&config.passkey)?,
            security_credential: decrypt_opt(&config.security_credential)?,
        })
    }

    async fn invalidate_cache(&self) {
        let mut cache = self.active_cache.write().await;
        self.cache_generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }
}
