use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use cryptopay::CryptoPayError;
use pronto_engine::traits::{AccountApiError, OrderFlowError, PaymentsApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Authentication error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("{0}")]
    OrderFlowError(#[from] OrderFlowError),
    #[error("Payment provider unavailable. {0}")]
    GatewayUnavailable(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::OrderFlowError(e) => match e {
                OrderFlowError::OrderNotFound => StatusCode::NOT_FOUND,
                OrderFlowError::Forbidden(_) => StatusCode::FORBIDDEN,
                OrderFlowError::Gone(_) => StatusCode::GONE,
                OrderFlowError::Conflict(_) => StatusCode::CONFLICT,
                OrderFlowError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                OrderFlowError::Invalid(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::UserNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderFlowError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No bearer token was provided.")]
    MissingToken,
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Access token signature is invalid or expired. {0}")]
    ValidationError(String),
    #[error("Login token signature is invalid.")]
    InvalidLoginSignature,
}

impl From<AccountApiError> for ServerError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::UserNotFound(id) => Self::NoRecordFound(format!("User {id}")),
            AccountApiError::DatabaseError(msg) => Self::BackendError(msg),
        }
    }
}

impl From<PaymentsApiError> for ServerError {
    fn from(e: PaymentsApiError) -> Self {
        match e {
            PaymentsApiError::InvalidAmount(_) => Self::InvalidRequest(e.to_string()),
            PaymentsApiError::UserNotFound(id) => Self::NoRecordFound(format!("User {id}")),
            PaymentsApiError::DatabaseError(msg) => Self::BackendError(msg),
        }
    }
}

impl From<CryptoPayError> for ServerError {
    fn from(e: CryptoPayError) -> Self {
        match e {
            CryptoPayError::NotConfigured => Self::GatewayUnavailable("Payment service not configured".to_string()),
            e => Self::GatewayUnavailable(e.to_string()),
        }
    }
}
