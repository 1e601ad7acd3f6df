// Error types for the Truss dispatch core

use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Registration invariant violations, fatal at mount time
    #[error("Not found descriptor for {0}")]
    MissingDescriptor(String),

    #[error("Not found handler for {0}")]
    MissingHandler(String),

    // Response-action misconfiguration, raised before the user method runs
    #[error("Response action not supported: {0}")]
    ResponseActionNotSupported(String),

    #[error("Argument mismatch at position {position}: expected {expected}")]
    ArgumentMismatch {
        position: usize,
        expected: &'static str,
    },

    #[error("Headers already sent")]
    HeadersAlreadySent,

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// An error carrying an explicit status code.
    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        let status = match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) | Error::Validation(_) | Error::Deserialization(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Http(code, _) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.as_u16()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Registration invariant violations abort startup.
    pub fn is_registration_error(&self) -> bool {
        matches!(self, Error::MissingDescriptor(_) | Error::MissingHandler(_))
    }
}
