//! Control-plane credentials
//!
//! Credentials are never stored in the config file. They come from the
//! process environment, optionally seeded from a `.env` file.

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

pub const ENV_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
pub const ENV_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";
pub const ENV_ZONE_ID: &str = "CLOUDFLARE_ZONE_ID";

/// Bearer token plus the account and zone the tunnel and DNS record live in
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_token: SecretString,
    pub account_id: String,
    pub zone_id: String,
}

impl ApiCredentials {
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Self {
        Self {
            api_token: SecretString::from(api_token.into()),
            account_id: account_id.into(),
            zone_id: zone_id.into(),
        }
    }

    /// Load from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve each variable through `lookup`; empty values count as missing
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingField(key.to_string()))
        };

        Ok(Self::new(
            require(ENV_API_TOKEN)?,
            require(ENV_ACCOUNT_ID)?,
            require(ENV_ZONE_ID)?,
        ))
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.api_token.expose_secret())
    }
}
