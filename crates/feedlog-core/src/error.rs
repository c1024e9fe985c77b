use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the storage layer.
///
/// Cloneable so a single failed fetch can be handed to every caller
/// waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Provider error: {0}")]
    ProviderSpecific(String),

    #[error("Data format error: {0}")]
    DataFormatError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Google-style structured error body: `{"error": {"code", "message", "status"}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl StoreError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Classify a non-success response.
    ///
    /// A structured error body wins over the bare status code, except for
    /// 401 which always maps to `HttpError(401)` so the auth layer can
    /// recognise it.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return StoreError::HttpError(401);
        }
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) if !envelope.error.message.is_empty() => {
                let message = match envelope.error.status {
                    Some(code) => format!("{} ({})", envelope.error.message, code),
                    None => envelope.error.message,
                };
                StoreError::ProviderSpecific(Self::truncate_body(&message))
            }
            _ => StoreError::HttpError(status),
        }
    }

    /// Whether this failure means the credential itself was rejected,
    /// as opposed to a transient transport problem.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            StoreError::NotSignedIn
                | StoreError::AuthenticationFailed(_)
                | StoreError::HttpError(401)
        )
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::DataFormatError(err.to_string())
        } else if let Some(status) = err.status() {
            StoreError::HttpError(status.as_u16())
        } else {
            StoreError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::DataFormatError(err.to_string())
    }
}
