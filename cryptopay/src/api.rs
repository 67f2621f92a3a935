use std::time::Duration;

use hmac::{Hmac, Mac};
use log::*;
use pronto_common::Rubles;
use reqwest::Client;
use sha2::Sha256;

use crate::{
    config::CryptoPayConfig,
    data_objects::{ApiResponse, NewInvoiceParams, RemoteInvoice},
    error::CryptoPayError,
};

type HmacSha256 = Hmac<Sha256>;

/// Fixed domain string for deriving the webhook signing key from the provider token. Keeps the
/// raw token itself out of the signature scheme.
const WEBHOOK_KEY_DOMAIN: &[u8] = b"WebhookData";

/// Outbound calls never hang a request handler for longer than this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct CryptoPayApi {
    config: CryptoPayConfig,
    client: Client,
}

impl CryptoPayApi {
    pub fn new(config: CryptoPayConfig) -> Result<Self, CryptoPayError> {
        let client =
            Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| CryptoPayError::ClientError(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Mints a fiat RUB invoice at the provider. One outbound network call; the caller persists
    /// the result.
    pub async fn create_invoice(
        &self,
        amount: Rubles,
        description: &str,
        expires_in: u32,
    ) -> Result<RemoteInvoice, CryptoPayError> {
        if !self.config.is_configured() {
            return Err(CryptoPayError::NotConfigured);
        }
        let params = NewInvoiceParams::fiat_rub(amount.value(), description, expires_in);
        let url = format!("{}/createInvoice", self.config.api_url);
        trace!("🌐️ POST {url} for {amount}");
        let response = self
            .client
            .post(&url)
            .header("Crypto-Pay-API-Token", self.config.api_token.reveal().as_str())
            .json(&params)
            .send()
            .await?
            .json::<ApiResponse<RemoteInvoice>>()
            .await?;
        if !response.ok {
            let error = response.error.map(|e| e.to_string()).unwrap_or_else(|| "no error detail".to_string());
            warn!("🌐️ createInvoice refused: {error}");
            return Err(CryptoPayError::ApiError(error));
        }
        let invoice =
            response.result.ok_or_else(|| CryptoPayError::InvalidResponse("ok response without result".to_string()))?;
        debug!("🌐️ Created invoice {} at the provider", invoice.invoice_id);
        Ok(invoice)
    }

    /// Signs a raw payload the way the provider signs webhook bodies. Used by tests and by
    /// [`Self::verify_webhook_signature`].
    pub fn sign_payload(&self, body: &[u8]) -> Option<String> {
        if !self.config.is_configured() {
            return None;
        }
        let Ok(mut key_mac) = HmacSha256::new_from_slice(WEBHOOK_KEY_DOMAIN) else {
            return None;
        };
        key_mac.update(self.config.api_token.reveal().as_bytes());
        let key = key_mac.finalize().into_bytes();
        let Ok(mut mac) = HmacSha256::new_from_slice(&key) else {
            return None;
        };
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks the signature header of an inbound webhook against the raw body. Returns `false`
    /// (never errors) on any malformed input, including an unconfigured provider.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        match self.sign_payload(body) {
            Some(expected) => expected.eq_ignore_ascii_case(signature.trim()),
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use pronto_common::Secret;

    use super::*;

    fn api_with_token(token: &str) -> CryptoPayApi {
        let config = CryptoPayConfig::new("https://testnet-pay.crypt.bot/api", Secret::new(token.to_string()));
        CryptoPayApi::new(config).unwrap()
    }

    #[test]
    fn signature_round_trip() {
        let api = api_with_token("12345:AbCdEf");
        let body = br#"{"update_type":"invoice_paid","payload":{"invoice_id":42}}"#;
        let signature = api.sign_payload(body).unwrap();
        assert!(api.verify_webhook_signature(body, &signature));
        assert!(api.verify_webhook_signature(body, &signature.to_uppercase()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let api = api_with_token("12345:AbCdEf");
        let signature = api.sign_payload(b"original").unwrap();
        assert!(!api.verify_webhook_signature(b"tampered", &signature));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let api = api_with_token("12345:AbCdEf");
        assert!(!api.verify_webhook_signature(b"body", "not-hex-at-all"));
        assert!(!api.verify_webhook_signature(b"body", ""));
    }

    #[test]
    fn unconfigured_provider_never_verifies() {
        let api = api_with_token("");
        assert!(!api.verify_webhook_signature(b"body", "deadbeef"));
        assert!(api.sign_payload(b"body").is_none());
    }

    #[test]
    fn different_tokens_sign_differently() {
        let a = api_with_token("token-a").sign_payload(b"body").unwrap();
        let b = api_with_token("token-b").sign_payload(b"body").unwrap();
        assert_ne!(a, b);
    }
}
