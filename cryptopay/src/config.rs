use std::env;

use log::*;
use pronto_common::Secret;

const MAINNET_API_URL: &str = "https://pay.crypt.bot/api";
const TESTNET_API_URL: &str = "https://testnet-pay.crypt.bot/api";

#[derive(Clone, Debug, Default)]
pub struct CryptoPayConfig {
    /// Base URL of the provider API.
    pub api_url: String,
    /// The application token issued by the provider. An empty token means payments are not
    /// configured and invoice creation is refused.
    pub api_token: Secret<String>,
}

impl CryptoPayConfig {
    pub fn new(api_url: &str, api_token: Secret<String>) -> Self {
        Self { api_url: api_url.to_string(), api_token }
    }

    pub fn from_env_or_default() -> Self {
        let api_token = env::var("PRONTO_CRYPTO_PAY_TOKEN").ok().unwrap_or_else(|| {
            warn!("🪛️ PRONTO_CRYPTO_PAY_TOKEN is not set. Invoice creation will be unavailable.");
            String::default()
        });
        let api_url = env::var("PRONTO_CRYPTO_PAY_URL").ok().unwrap_or_else(|| {
            let network = env::var("PRONTO_CRYPTO_PAY_NETWORK").unwrap_or_else(|_| "test".to_string());
            match network.as_str() {
                "main" => MAINNET_API_URL.to_string(),
                _ => TESTNET_API_URL.to_string(),
            }
        });
        Self { api_url, api_token: Secret::new(api_token) }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_token.reveal().is_empty()
    }
}
