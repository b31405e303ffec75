// models/shortcode_config.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::audit::AuditMetadata;
use super::credentials::CredentialIdentity;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    #[serde(alias = "sandbox")]
    Sandbox,
    #[serde(alias = "production")]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "SANDBOX",
            Environment::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SANDBOX" => Ok(Environment::Sandbox),
            "PRODUCTION" => Ok(Environment::Production),
            other => Err(AppError::ValidationError(format!(
                "Unknown environment '{}', expected SANDBOX or PRODUCTION",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShortcodeType {
    Collection,
    Disbursement,
    Both,
}

impl ShortcodeType {
    pub fn collects(&self) -> bool {
        matches!(self, ShortcodeType::Collection | ShortcodeType::Both)
    }

    pub fn disburses(&self) -> bool {
        matches!(self, ShortcodeType::Disbursement | ShortcodeType::Both)
    }
}

/// Stored gateway configuration for one (shortcode, environment).
/// The four secret fields hold ciphertext only.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortcodeConfig {
    pub id: Uuid,
    pub shortcode: String,
    pub environment: Environment,
    pub shortcode_type: ShortcodeType,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub passkey: Option<String>,
    pub security_credential: Option<String>,
    pub initiator_name: Option<String>,
    pub collection_callback_url: Option<String>,
    pub collection_validation_url: Option<String>,
    pub collection_timeout_url: Option<String>,
    pub collection_result_url: Option<String>,
    pub disbursement_result_url: Option<String>,
    pub disbursement_timeout_url: Option<String>,
    pub disbursement_queue_url: Option<String>,
    pub stk_callback_url: Option<String>,
    pub active: bool,
    pub description: Option<String>,
    pub audit: AuditMetadata,
}

/// Ciphertexts produced for a create request.
#[derive(Debug, Clone, Default)]
pub struct EncryptedSecrets {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub passkey: Option<String>,
    pub security_credential: Option<String>,
}

/// Ciphertexts for the secrets a patch actually carries.
#[derive(Debug, Clone, Default)]
pub struct EncryptedSecretPatch {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub passkey: Option<String>,
    pub security_credential: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

impl ShortcodeConfig {
    pub fn new(request: CreateConfigRequest, secrets: EncryptedSecrets, now: DateTime<Utc>) -> Self {
        ShortcodeConfig {
            id: Uuid::new_v4(),
            shortcode: request.shortcode.trim().to_string(),
            environment: request.environment,
            shortcode_type: request.shortcode_type,
            consumer_key: secrets.consumer_key,
            consumer_secret: secrets.consumer_secret,
            passkey: secrets.passkey,
            security_credential: secrets.security_credential,
            initiator_name: request.initiator_name,
            collection_callback_url: request.collection_callback_url,
            collection_validation_url: request.collection_validation_url,
            collection_timeout_url: request.collection_timeout_url,
            collection_result_url: request.collection_result_url,
            disbursement_result_url: request.disbursement_result_url,
            disbursement_timeout_url: request.disbursement_timeout_url,
            disbursement_queue_url: request.disbursement_queue_url,
            stk_callback_url: request.stk_callback_url,
            active: request.active.unwrap_or(true),
            description: request.description,
            audit: AuditMetadata::new(now),
        }
    }

    pub fn identity(&self) -> CredentialIdentity {
        CredentialIdentity {
            shortcode: self.shortcode.clone(),
            environment: self.environment,
        }
    }

    /// Returns a new snapshot with every field the patch carries applied.
    /// Secrets come in already encrypted; absent ones keep their stored ciphertext.
    pub fn apply_patch(
        &self,
        patch: ConfigPatch,
        secrets: EncryptedSecretPatch,
        now: DateTime<Utc>,
    ) -> Self {
        let current = self.clone();
        ShortcodeConfig {
            shortcode_type: patch.shortcode_type.unwrap_or(current.shortcode_type),
            consumer_key: secrets.consumer_key.unwrap_or(current.consumer_key),
            consumer_secret: secrets.consumer_secret.unwrap_or(current.consumer_secret),
            passkey: secrets.passkey.or(current.passkey),
            security_credential: secrets.security_credential.or(current.security_credential),
            initiator_name: patch.initiator_name.or(current.initiator_name),
            collection_callback_url: patch.collection_callback_url.or(current.collection_callback_url),
            collection_validation_url: patch
                .collection_validation_url
                .or(current.collection_validation_url),
            collection_timeout_url: patch.collection_timeout_url.or(current.collection_timeout_url),
            collection_result_url: patch.collection_result_url.or(current.collection_result_url),
            disbursement_result_url: patch.disbursement_result_url.or(current.disbursement_result_url),
            disbursement_timeout_url: patch
                .disbursement_timeout_url
                .or(current.disbursement_timeout_url),
            disbursement_queue_url: patch.disbursement_queue_url.or(current.disbursement_queue_url),
            stk_callback_url: patch.stk_callback_url.or(current.stk_callback_url),
            active: patch.active.unwrap_or(current.active),
            description: patch.description.or(current.description),
            audit: current.audit.touched(now),
            ..current
        }
    }

    pub fn deactivated(&self, now: DateTime<Utc>) -> Self {
        ShortcodeConfig {
            active: false,
            audit: self.audit.touched(now),
            ..self.clone()
        }
    }

    /// Enforces the per-type URL and credential requirements.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.shortcode_type.collects()
            && !(present(&self.collection_callback_url)
                && present(&self.collection_validation_url)
                && present(&self.collection_timeout_url)
                && present(&self.collection_result_url))
        {
            return Err(AppError::incomplete(
                "Collection URLs are required for COLLECTION or BOTH shortcode types",
            ));
        }

        if self.shortcode_type.disburses() {
            if !(present(&self.disbursement_result_url) && present(&self.disbursement_timeout_url)) {
                return Err(AppError::incomplete(
                    "Disbursement URLs are required for DISBURSEMENT or BOTH shortcode types",
                ));
            }
            if !(present(&self.initiator_name) && present(&self.security_credential)) {
                return Err(AppError::incomplete(
                    "Initiator name and security credential are required for DISBURSEMENT or BOTH shortcode types",
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConfigRequest {
    #[validate(length(min = 1, max = 10, message = "Shortcode must be 1 to 10 characters"))]
    pub shortcode: String,
    pub environment: Environment,
    pub shortcode_type: ShortcodeType,
    #[validate(length(min = 1, message = "Consumer key is required"))]
    pub consumer_key: String,
    #[validate(length(min = 1, message = "Consumer secret is required"))]
    pub consumer_secret: String,
    pub passkey: Option<String>,
    pub security_credential: Option<String>,
    pub initiator_name: Option<String>,
    pub collection_callback_url: Option<String>,
    pub collection_validation_url: Option<String>,
    pub collection_timeout_url: Option<String>,
    pub collection_result_url: Option<String>,
    pub disbursement_result_url: Option<String>,
    pub disbursement_timeout_url: Option<String>,
    pub disbursement_queue_url: Option<String>,
    pub stk_callback_url: Option<String>,
    pub active: Option<bool>,
    pub description: Option<String>,
}

/// Partial update. `None` leaves the stored value untouched; a supplied secret must not be empty.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub shortcode_type: Option<ShortcodeType>,
    #[validate(length(min = 1, message = "Consumer key cannot be empty"))]
    pub consumer_key: Option<String>,
    #[validate(length(min = 1, message = "Consumer secret cannot be empty"))]
    pub consumer_secret: Option<String>,
    #[validate(length(min = 1, message = "Passkey cannot be empty"))]
    pub passkey: Option<String>,
    #[validate(length(min = 1, message = "Security credential cannot be empty"))]
    pub security_credential: Option<String>,
    pub initiator_name: Option<String>,
    pub collection_callback_url: Option<String>,
    pub collection_validation_url: Option<String>,
    pub collection_timeout_url: Option<String>,
    pub collection_result_url: Option<String>,
    pub disbursement_result_url: Option<String>,
    pub disbursement_timeout_url: Option<String>,
    pub disbursement_queue_url: Option<String>,
    pub stk_callback_url: Option<String>,
    pub active: Option<bool>,
    pub description: Option<String>,
}

/// Public view of a config. Secrets are reported only as set/unset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub uuid: Uuid,
    pub shortcode: String,
    pub environment: Environment,
    pub shortcode_type: ShortcodeType,
    pub initiator_name: Option<String>,
    pub collection_callback_url: Option<String>,
    pub collection_validation_url: Option<String>,
    pub collection_timeout_url: Option<String>,
    pub collection_result_url: Option<String>,
    pub disbursement_result_url: Option<String>,
    pub disbursement_timeout_url: Option<String>,
    pub disbursement_queue_url: Option<String>,
    pub stk_callback_url: Option<String>,
    pub passkey_set: bool,
    pub security_credential_set: bool,
    pub active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ShortcodeConfig> for ConfigResponse {
    fn from(config: &ShortcodeConfig) -> Self {
        ConfigResponse {
            uuid: config.id,
            shortcode: config.shortcode.clone(),
            environment: config.environment,
            shortcode_type: config.shortcode_type,
            initiator_name: config.initiator_name.clone(),
            collection_callback_url: config.collection_callback_url.clone(),
            collection_validation_url: config.collection_validation_url.clone(),
            collection_timeout_url: config.collection_timeout_url.clone(),
            collection_result_url: config.collection_result_url.clone(),
            disbursement_result_url: config.disbursement_result_url.clone(),
            disbursement_timeout_url: config.disbursement_timeout_url.clone(),
            disbursement_queue_url: config.disbursement_queue_url.clone(),
            stk_callback_url: config.stk_callback_url.clone(),
            passkey_set: config.passkey.is_some(),
            security_credential_set: config.security_credential.is_some(),
            active: config.active,
            description: config.description.clone(),
            created_at: config.audit.created_at,
            updated_at: config.audit.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(shortcode_type: ShortcodeType) -> CreateConfigRequest {
        CreateConfigRequest {
            shortcode: "174379".into(),
            environment: Environment::Sandbox,
            shortcode_type,
            consumer_key: "key".into(),
            consumer_secret: "secret".into(),
            passkey: Some("passkey".into()),
            security_credential: None,
            initiator_name: None,
            collection_callback_url: Some("https://merchant.test/c2b/confirm".into()),
            collection_validation_url: Some("https://merchant.test/c2b/validate".into()),
            collection_timeout_url: Some("https://merchant.test/c2b/timeout".into()),
            collection_result_url: Some("https://merchant.test/c2b/result".into()),
            disbursement_result_url: None,
            disbursement_timeout_url: None,
            disbursement_queue_url: None,
            stk_callback_url: Some("https://merchant.test/stk".into()),
            active: None,
            description: None,
        }
    }

    fn secrets() -> EncryptedSecrets {
        EncryptedSecrets {
            consumer_key: "enc-key".into(),
            consumer_secret: "enc-secret".into(),
            passkey: Some("enc-passkey".into()),
            security_credential: None,
        }
    }

    #[test]
    fn complete_collection_config_passes() {
        let config = ShortcodeConfig::new(request(ShortcodeType::Collection), secrets(), Utc::now());
        assert!(config.active);
        assert!(config.ensure_complete().is_ok());
    }

    #[test]
    fn collection_config_needs_all_four_urls() {
        let mut req = request(ShortcodeType::Collection);
        req.collection_validation_url = None;
        let config = ShortcodeConfig::new(req, secrets(), Utc::now());
        assert!(matches!(
            config.ensure_complete(),
            Err(AppError::ConfigurationIncomplete(_))
        ));
    }

    #[test]
    fn disbursement_needs_initiator_and_credential() {
        let mut req = request(ShortcodeType::Both);
        req.disbursement_result_url = Some("https://merchant.test/b2c/result".into());
        req.disbursement_timeout_url = Some("https://merchant.test/b2c/timeout".into());
        let config = ShortcodeConfig::new(req, secrets(), Utc::now());

        match config.ensure_complete() {
            Err(AppError::ConfigurationIncomplete(msg)) => assert!(msg.contains("Initiator name")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn patch_keeps_untouched_fields() {
        let config = ShortcodeConfig::new(request(ShortcodeType::Collection), secrets(), Utc::now());
        let patch = ConfigPatch {
            description: Some("till 2".into()),
            ..Default::default()
        };
        let updated = config.apply_patch(
            patch,
            EncryptedSecretPatch {
                passkey: Some("enc-passkey-2".into()),
                ..Default::default()
            },
            Utc::now(),
        );

        assert_eq!(updated.id, config.id);
        assert_eq!(updated.consumer_key, "enc-key");
        assert_eq!(updated.passkey.as_deref(), Some("enc-passkey-2"));
        assert_eq!(updated.description.as_deref(), Some("till 2"));
        assert_eq!(updated.collection_callback_url, config.collection_callback_url);
        assert_eq!(updated.audit.created_at, config.audit.created_at);
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("sandbox".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert_eq!(" PRODUCTION ".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }
}
