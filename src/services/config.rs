// src/services/config.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use reqwest::Client;

use crate::services::alpaca::{self, AlpacaClient};
use crate::services::polygon::{self, PolygonClient};
use crate::services::provider::ProviderClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Polygon,
    Alpaca,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "polygon" | "massive" => Ok(ProviderKind::Polygon),
            "alpaca" => Ok(ProviderKind::Alpaca),
            other => bail!("unknown PROVIDER '{}', expected 'polygon' or 'alpaca'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProviderCredentials {
    Polygon { api_key: String },
    Alpaca { key_id: String, secret_key: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub credentials: ProviderCredentials,
    pub polygon_base_url: String,
    pub alpaca_data_url: String,
    pub cache_dir: PathBuf,
    pub request_timeout: Duration,
    pub port: u16,
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 3030;

impl AppConfig {
    /// Reads the process environment (call `dotenv().ok()` first).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match var("PROVIDER") {
            Some(raw) => ProviderKind::parse(&raw)?,
            None => ProviderKind::Polygon,
        };

        let credentials = match provider {
            ProviderKind::Polygon => ProviderCredentials::Polygon {
                api_key: var("POLYGON_API_KEY")
                    .ok_or_else(|| anyhow!("POLYGON_API_KEY must be set for the polygon provider"))?,
            },
            ProviderKind::Alpaca => ProviderCredentials::Alpaca {
                key_id: var("ALPACA_API_KEY_ID")
                    .ok_or_else(|| anyhow!("ALPACA_API_KEY_ID must be set for the alpaca provider"))?,
                secret_key: var("ALPACA_API_SECRET_KEY")
                    .ok_or_else(|| anyhow!("ALPACA_API_SECRET_KEY must be set for the alpaca provider"))?,
            },
        };

        let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .with_context(|| format!("REQUEST_TIMEOUT_SECS must be a number, got '{}'", raw))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a number, got '{}'", raw))?,
            None => {
                warn!("$PORT not set, defaulting to {}", DEFAULT_PORT);
                DEFAULT_PORT
            }
        };

        Ok(AppConfig {
            provider,
            credentials,
            polygon_base_url: var("POLYGON_BASE_URL").unwrap_or_else(|| polygon::DEFAULT_BASE_URL.to_string()),
            alpaca_data_url: var("ALPACA_DATA_URL").unwrap_or_else(|| alpaca::DEFAULT_DATA_URL.to_string()),
            cache_dir: PathBuf::from(var("CACHE_DIR").unwrap_or_else(|| "cache".to_string())),
            request_timeout,
            port,
        })
    }

    /// Build the one provider client the rest of the engine talks to.
    pub fn build_provider(&self) -> Result<Box<dyn ProviderClient>> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("stoptions/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("creating HTTP client")?;

        info!(
            "Using {:?} provider with a {}s request timeout",
            self.provider,
            self.request_timeout.as_secs()
        );
        Ok(match &self.credentials {
            ProviderCredentials::Polygon { api_key } => {
                Box::new(PolygonClient::new(client, self.polygon_base_url.clone(), api_key.clone()))
            }
            ProviderCredentials::Alpaca { key_id, secret_key } => Box::new(AlpacaClient::new(
                client,
                self.alpaca_data_url.clone(),
                key_id.clone(),
                secret_key.clone(),
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn polygon_is_the_default_provider() {
        let cfg = config(&[("POLYGON_API_KEY", "abc")]).unwrap();
        assert_eq!(cfg.provider, ProviderKind::Polygon);
        assert_eq!(cfg.port, 3030);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.cache_dir, PathBuf::from("cache"));
        assert_eq!(cfg.build_provider().unwrap().name(), "polygon");
    }

    #[test]
    fn alpaca_needs_both_keys() {
        assert!(config(&[("PROVIDER", "alpaca"), ("ALPACA_API_KEY_ID", "id")]).is_err());
        let cfg = config(&[
            ("PROVIDER", "Alpaca"),
            ("ALPACA_API_KEY_ID", "id"),
            ("ALPACA_API_SECRET_KEY", "secret"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("CACHE_DIR", "/var/tmp/stoptions"),
        ])
        .unwrap();
        assert_eq!(cfg.provider, ProviderKind::Alpaca);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.build_provider().unwrap().name(), "alpaca");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("PROVIDER", "yahoo"), ("POLYGON_API_KEY", "abc")]).is_err());
        assert!(config(&[("POLYGON_API_KEY", "abc"), ("PORT", "http")]).is_err());
    }
}
