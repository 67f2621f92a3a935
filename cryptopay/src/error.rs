use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoPayError {
    #[error("Payment provider is not configured")]
    NotConfigured,
    #[error("Could not build the HTTP client. {0}")]
    ClientError(String),
    #[error("Request to payment provider failed. {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Payment provider returned an error. {0}")]
    ApiError(String),
    #[error("Unexpected response from payment provider. {0}")]
    InvalidResponse(String),
}
