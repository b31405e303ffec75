// services/token_broker.rs
//! Per-credential cache of Daraja OAuth tokens.
//!
//! Entries expire three minutes before the gateway says they do and are
//! dropped lazily on read. The map is bounded: when full, expired entries
//! go first, then the one closest to expiry. Two callers missing at once
//! may both fetch; the later write wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::daraja_client::DarajaClient;
use crate::clock::Clock;
use crate::errors::{AppError, Result};
use crate::models::credentials::{CredentialIdentity, MpesaCredentials, Secret};

pub const SAFETY_MARGIN_SECS: i64 = 180;

#[derive(Debug, Clone)]
struct CachedToken {
    token: Secret<String>,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub struct TokenBroker {
    client: Arc<dyn DarajaClient>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    cache: RwLock<HashMap<CredentialIdentity, CachedToken>>,
}

impl TokenBroker {
    pub fn new(client: Arc<dyn DarajaClient>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        TokenBroker {
            client,
            clock,
            capacity: capacity.max(1),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_token(&self, credentials: &MpesaCredentials) -> Result<String> {
        let identity = credentials.identity();
        let now = self.clock.now();
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&identity).filter(|c| c.usable_at(now)) {
                debug!("Using cached access token for {}", identity);
                return Ok(cached.token.reveal().clone());
            }
        }

        // Drop a stale entry so it is never handed out again.
        {
            let mut cache = self.cache.write().await;
            if cache.get(&identity).map_or(false, |c| !c.usable_at(now)) {
                cache.remove(&identity);
            }
        }

        self.fetch_and_store(credentials, identity).await
    }

    pub async fn force_refresh(&self, credentials: &MpesaCredentials) -> Result<String> {
        let identity = credentials.identity();
        self.cache.write().await.remove(&identity);
        info!("Forcing token refresh for {}", identity);
        self.fetch_and_store(credentials, identity).await
    }

    pub async fn clear_all(&self) {
        let mut cache = self.cache.write().await;
        let dropped = cache.len();
        cache.clear();
        info!("Cleared {} cached access token(s)", dropped);
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn fetch_and_store(&self, credentials: &MpesaCredentials, identity: CredentialIdentity) -> Result<String> {
        // No lock is held across the network call.
        let response = self.client.fetch_token(credentials).await.map_err(|e| {
            error!("Failed to get access token for {}: {}", identity, e);
            AppError::AuthenticationFailed(format!("{}: {}", identity, e))
        })?;

        let issued_at = self.clock.now();
        let expires_at = Duration::try_seconds(response.expires_in.saturating_sub(SAFETY_MARGIN_SECS))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                error!("Token for {} has an unusable lifetime of {}s", identity, response.expires_in);
                AppError::AuthenticationFailed(format!(
                    "{}: token lifetime {}s is out of range",
                    identity, response.expires_in
                ))
            })?;
        if expires_at <= issued_at {
            warn!(
                "Token for {} expires in {}s, inside the safety margin; it will not be reused",
                identity, response.expires_in
            );
        }

        let entry = CachedToken {
            token: Secret::new(response.access_token.clone()),
            expires_at,
        };

        let mut cache = self.cache.write().await;
        if !cache.contains_key(&identity) && cache.len() >= self.capacity {
            cache.retain(|_, cached| cached.usable_at(issued_at));
            if cache.len() >= self.capacity {
                let soonest = cache
                    .iter()
                    .min_by_key(|(_, cached)| cached.expires_at)
                    .map(|(key, _)| key.clone());
                if let Some(key) = soonest {
                    debug!("Token cache full, evicting {}", key);
                    cache.remove(&key);
                }
            }
        }
        cache.insert(identity.clone(), entry);

        info!("Access token obtained for {}", identity);
        Ok(response.access_token)
    }
}
