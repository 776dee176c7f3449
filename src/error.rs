//! Crate-wide error type. All fallible SDK calls return [`Result`].

use crate::auth::MfaChallenge;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested PAS instance is neither a known region nor an
    /// https endpoint.
    #[error("invalid PAS instance: {0}")]
    InvalidInstance(String),

    /// Login could not complete; credentials or instance are wrong,
    /// or the backend is unreachable.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The account has multi-factor authentication enabled. Complete
    /// the login with the challenge carried here and a code from the
    /// authenticator app.
    #[error("multi-factor authentication required for user {}", .0.username)]
    MfaRequired(MfaChallenge),

    /// The backend answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// A response arrived but did not carry the fields the SDK needs.
    #[error("unexpected server response: {0}")]
    UnexpectedResponse(String),

    /// A caller-supplied argument failed validation before any request
    /// was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Upload to or download from cloud object storage failed.
    #[error("object storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    pub(crate) fn server(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        Error::Server {
            status: status.as_u16(),
            body: body.into(),
        }
    }
}
