//! Identity handling.
//!
//! The identity-proofing handshake itself is external: clients arrive with a [`LoginToken`]
//! whose HMAC signature proves it was produced by the identity provider sharing
//! `PRONTO_IDENTITY_SECRET` with us. `/auth` swaps a valid login token for a short-lived HS256
//! JWT; every other authenticated endpoint extracts [`AuthenticatedUser`] from that bearer
//! token. [`MaybeAuthenticated`] is the lenient variant for endpoints that merely personalise
//! their output.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{config::AuthConfig, errors::AuthError};

type HmacSha256 = Hmac<Sha256>;

/// Fixed domain string for deriving the login-signature key from the identity secret.
const LOGIN_KEY_DOMAIN: &[u8] = b"WebAppData";

//--------------------------------------      LoginToken      --------------------------------------------------------
/// The credential produced by the external identity handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginToken {
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    /// Unix timestamp at which the identity provider produced this token.
    pub issued_at: i64,
    /// Hex HMAC-SHA256 over `"{user_id}:{username}:{issued_at}"`.
    pub signature: String,
}

/// Computes the expected signature for a login token. Exposed so tests (and tooling) can mint
/// valid handshakes against a known secret.
pub fn login_token_signature(identity_secret: &str, user_id: i64, username: Option<&str>, issued_at: i64) -> String {
    let mut key_mac = HmacSha256::new_from_slice(LOGIN_KEY_DOMAIN).expect("HMAC accepts any key length");
    key_mac.update(identity_secret.as_bytes());
    let key = key_mac.finalize().into_bytes();
    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts any key length");
    let message = format!("{user_id}:{}:{issued_at}", username.unwrap_or(""));
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

//--------------------------------------      JwtClaims       --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The authenticated user id.
    pub sub: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

//--------------------------------------     TokenIssuer      --------------------------------------------------------
/// Verifies login tokens and issues/validates access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    identity_secret: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self {
            identity_secret: config.identity_secret.reveal().clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_lifetime: Duration::minutes(config.token_lifetime_minutes),
        }
    }

    /// Checks the handshake signature on a login token.
    pub fn verify_login_token(&self, token: &LoginToken) -> Result<(), AuthError> {
        let expected =
            login_token_signature(&self.identity_secret, token.user_id, token.username.as_deref(), token.issued_at);
        if expected.eq_ignore_ascii_case(token.signature.trim()) {
            Ok(())
        } else {
            debug!("🔐️ Login token for user #{} failed signature verification", token.user_id);
            Err(AuthError::InvalidLoginSignature)
        }
    }

    /// Issues an access token for the authenticated identity.
    pub fn issue_token(&self, user_id: i64, username: Option<String>) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            username,
            iat: now.timestamp(),
            exp: (now + self.token_lifetime).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::ValidationError(e.to_string()))
    }

    pub fn decode_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(data.claims)
    }
}

//--------------------------------------  AuthenticatedUser   --------------------------------------------------------
/// Extractor for endpoints that require a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: Option<String>,
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AuthError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| AuthError::ValidationError("Token issuer is not configured".to_string()))?;
    let header = req.headers().get(header::AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::PoorlyFormattedToken("Expected a Bearer token".to_string()))?;
    let claims = issuer.decode_token(token)?;
    trace!("🔐️ Authenticated request for user #{}", claims.sub);
    Ok(AuthenticatedUser { id: claims.sub, username: claims.username })
}

impl FromRequest for AuthenticatedUser {
    type Error = crate::errors::ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).map_err(Into::into))
    }
}

//--------------------------------------  MaybeAuthenticated  --------------------------------------------------------
/// Lenient extractor: yields `None` instead of failing when the credential is missing or
/// invalid. Used by browse endpoints that only personalise contact visibility.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<AuthenticatedUser>);

impl MaybeAuthenticated {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl FromRequest for MaybeAuthenticated {
    type Error = crate::errors::ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(MaybeAuthenticated(authenticate(req).ok())))
    }
}

#[cfg(test)]
mod test {
    use pronto_common::Secret;

    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            identity_secret: Secret::new("identity-secret-for-tests".to_string()),
            jwt_secret: Secret::new("0123456789abcdef0123456789abcdef".to_string()),
            token_lifetime_minutes: 60,
        }
    }

    #[test]
    fn issued_tokens_decode_back() {
        let issuer = TokenIssuer::new(&test_config());
        let token = issuer.issue_token(42, Some("alice".to_string())).unwrap();
        let claims = issuer.decode_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let issuer = TokenIssuer::new(&test_config());
        let mut token = issuer.issue_token(42, None).unwrap();
        token.replace_range(token.len() - 4.., "AAAA");
        assert!(issuer.decode_token(&token).is_err());
    }

    #[test]
    fn login_signature_round_trip() {
        let issuer = TokenIssuer::new(&test_config());
        let issued_at = Utc::now().timestamp();
        let signature = login_token_signature("identity-secret-for-tests", 7, Some("bob"), issued_at);
        let token = LoginToken { user_id: 7, username: Some("bob".to_string()), issued_at, signature };
        assert!(issuer.verify_login_token(&token).is_ok());
    }

    #[test]
    fn login_signature_binds_all_fields() {
        let issuer = TokenIssuer::new(&test_config());
        let issued_at = Utc::now().timestamp();
        let signature = login_token_signature("identity-secret-for-tests", 7, Some("bob"), issued_at);
        // Same signature presented for a different user must fail.
        let token = LoginToken { user_id: 8, username: Some("bob".to_string()), issued_at, signature };
        assert!(issuer.verify_login_token(&token).is_err());
    }
}
