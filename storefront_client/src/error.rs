use checkout_engine::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorefrontApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl From<StorefrontApiError> for GatewayError {
    fn from(e: StorefrontApiError) -> Self {
        match e {
            StorefrontApiError::QueryError { status, message } => GatewayError::Response { status, message },
            other => GatewayError::Request(other.to_string()),
        }
    }
}
