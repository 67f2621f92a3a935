use std::env;

use cryptopay::CryptoPayConfig;
use log::*;
use pronto_common::{parse_boolean_flag, Rubles, Secret};
use pronto_engine::MarketConfig;
use rand::{distributions::Alphanumeric, Rng};

use crate::errors::ServerError;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8340;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 43_200; // 30 days

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// Business parameters handed to the engine at construction.
    pub market: MarketConfig,
    /// External payment provider credentials.
    pub cryptopay: CryptoPayConfig,
    /// Outbound notification channel credentials.
    pub notifier: NotifierConfig,
    /// How often the expiry sweeper runs.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            market: MarketConfig::default(),
            cryptopay: CryptoPayConfig::default(),
            notifier: NotifierConfig::default(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PRONTO_HOST").ok().unwrap_or_else(|| DEFAULT_HOST.into());
        let port = env::var("PRONTO_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for PRONTO_PORT. {e} Using the default, {DEFAULT_PORT}, instead.");
                    DEFAULT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PORT);
        let database_url = env::var("PRONTO_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PRONTO_DATABASE_URL is not set. Please set it to the URL for the Pronto database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to \
                 the default configuration."
            );
            AuthConfig::default()
        });
        let sweep_interval_secs = parse_env_i64("PRONTO_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS as i64)
            .max(1) as u64;
        Self {
            host,
            port,
            database_url,
            auth,
            market: market_config_from_env(),
            cryptopay: CryptoPayConfig::from_env_or_default(),
            notifier: NotifierConfig::from_env_or_default(),
            sweep_interval_secs,
        }
    }
}

fn parse_env_i64(var: &str, default: i64) -> i64 {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<i64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}: {e}. Using the default ({default})."))
                .ok()
        })
        .unwrap_or(default)
}

fn market_config_from_env() -> MarketConfig {
    let defaults = MarketConfig::default();
    MarketConfig {
        order_lifetime_minutes: parse_env_i64("PRONTO_ORDER_LIFETIME_MINUTES", defaults.order_lifetime_minutes),
        no_response_close_minutes: parse_env_i64(
            "PRONTO_NO_RESPONSE_CLOSE_MINUTES",
            defaults.no_response_close_minutes,
        ),
        max_executors_per_order: parse_env_i64(
            "PRONTO_MAX_EXECUTORS_PER_ORDER",
            defaults.max_executors_per_order as i64,
        )
        .max(1) as usize,
        order_take_cost: Rubles::from(parse_env_i64("PRONTO_ORDER_TAKE_COST", defaults.order_take_cost.value())),
        invoice_expiry_seconds: parse_env_i64("PRONTO_INVOICE_EXPIRY_SECONDS", defaults.invoice_expiry_seconds as i64)
            .max(60) as u32,
    }
}

//-------------------------------------------------  AuthConfig  ------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared secret of the identity handshake: login tokens must carry an HMAC computed from
    /// this value.
    pub identity_secret: Secret<String>,
    /// Secret used to sign and verify the HS256 access tokens issued by `/auth`.
    pub jwt_secret: Secret<String>,
    /// How long an issued access token stays valid.
    pub token_lifetime_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The identity and JWT secrets have not been set. I'm using random values for this session. DO \
             NOT operate in production like this: every restart invalidates all issued tokens. Set \
             PRONTO_IDENTITY_SECRET and PRONTO_JWT_SECRET instead. 🚨️🚨️🚨️"
        );
        Self {
            identity_secret: Secret::new(random_secret()),
            jwt_secret: Secret::new(random_secret()),
            token_lifetime_minutes: DEFAULT_TOKEN_LIFETIME_MINUTES,
        }
    }
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let identity_secret = env::var("PRONTO_IDENTITY_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [PRONTO_IDENTITY_SECRET]")))?;
        let jwt_secret = env::var("PRONTO_JWT_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [PRONTO_JWT_SECRET]")))?;
        if jwt_secret.len() < 32 {
            return Err(ServerError::ConfigurationError(
                "PRONTO_JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }
        let token_lifetime_minutes = parse_env_i64("PRONTO_TOKEN_LIFETIME_MINUTES", DEFAULT_TOKEN_LIFETIME_MINUTES);
        Ok(Self {
            identity_secret: Secret::new(identity_secret),
            jwt_secret: Secret::new(jwt_secret),
            token_lifetime_minutes,
        })
    }
}

fn random_secret() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect()
}

//-----------------------------------------------  NotifierConfig  ----------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct NotifierConfig {
    /// Master switch for outbound notifications.
    pub enabled: bool,
    /// Bot token for the notification channel. Empty disables notifications entirely.
    pub bot_token: Secret<String>,
    /// Base URL of the notification API.
    pub api_url: String,
}

impl NotifierConfig {
    pub fn from_env_or_default() -> Self {
        let enabled = parse_boolean_flag(env::var("PRONTO_NOTIFICATIONS_ENABLED").ok(), true);
        let bot_token = env::var("PRONTO_BOT_TOKEN").ok().unwrap_or_else(|| {
            info!("🪛️ PRONTO_BOT_TOKEN is not set. New-order notifications are disabled.");
            String::default()
        });
        let api_url =
            env::var("PRONTO_NOTIFY_API_URL").ok().unwrap_or_else(|| "https://api.telegram.org".to_string());
        Self { enabled, bot_token: Secret::new(bot_token), api_url }
    }

    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.reveal().is_empty()
    }
}
