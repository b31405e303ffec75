// config.rs
use std::env;

use crate::errors::{AppError, Result};
use crate::models::shortcode_config::Environment;

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

/// Gateway endpoints for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUrls {
    pub auth_url: String,
    pub stk_push_url: String,
    pub register_url: String,
}

impl GatewayUrls {
    fn from_base(base_url: &str) -> Self {
        GatewayUrls {
            auth_url: format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url),
            stk_push_url: format!("{}/mpesa/stkpush/v1/processrequest", base_url),
            register_url: format!("{}/mpesa/c2b/v1/registerurl", base_url),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub encryption_secret_key: String,
    pub encryption_salt: String,
    pub http_timeout_secs: u64,
    pub token_cache_capacity: usize,
    pub sandbox_urls: GatewayUrls,
    pub production_urls: GatewayUrls,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::configuration(format!("PORT must be a number, got '{}'", raw)))?,
            None => 8080,
        };

        let http_timeout_secs = lookup("MPESA_HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let token_cache_capacity = lookup("MPESA_TOKEN_CACHE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .filter(|c: &usize| *c > 0)
            .unwrap_or(1024);

        let urls = |prefix: &str, base: &str| {
            let defaults = GatewayUrls::from_base(base);
            GatewayUrls {
                auth_url: lookup(&format!("MPESA_{}_AUTH_URL", prefix)).unwrap_or(defaults.auth_url),
                stk_push_url: lookup(&format!("MPESA_{}_STK_PUSH_URL", prefix))
                    .unwrap_or(defaults.stk_push_url),
                register_url: lookup(&format!("MPESA_{}_REGISTER_URL", prefix))
                    .unwrap_or(defaults.register_url),
            }
        };

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| "daraja".to_string()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            encryption_secret_key: required("ENCRYPTION_SECRET_KEY")?,
            encryption_salt: required("ENCRYPTION_SALT")?,
            http_timeout_secs,
            token_cache_capacity,
            sandbox_urls: urls("SANDBOX", SANDBOX_BASE_URL),
            production_urls: urls("PRODUCTION", PRODUCTION_BASE_URL),
        })
    }

    pub fn gateway_urls(&self, environment: Environment) -> &GatewayUrls {
        match environment {
            Environment::Sandbox => &self.sandbox_urls,
            Environment::Production => &self.production_urls,
        }
    }
}
