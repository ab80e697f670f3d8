//! Error taxonomy for the chat pipeline.
//!
//! Every failure carries a `user_message()` which is what the front-end shows;
//! the `Display` text is the detailed form meant for logs.

use thiserror::Error;

use crate::types::MessageId;

pub const GENERIC_API_ERROR: &str = "API error. Please try again.";
pub const GENERIC_UNEXPECTED_ERROR: &str = "An unexpected error occurred.";

const MAX_USER_ERROR_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum InterpretationError {
    #[error("completion service failed: {0:#}")]
    Upstream(anyhow::Error),
    #[error("structured query did not match the expected schema: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog response did not match the expected schema: {0}")]
    Schema(String),
    #[error("catalog request failed: {0}")]
    Network(String),
    #[error("invalid catalog URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
#[error("summary stream failed: {0}")]
pub struct StreamError(pub String);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Interpretation(#[from] InterpretationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("message {0} is still loading results")]
    Busy(MessageId),
    #[error("request was cancelled")]
    Cancelled,
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Interpretation(_) => GENERIC_API_ERROR.to_string(),
            ChatError::Catalog(CatalogError::Status { body, .. }) => {
                let body = body.trim();
                if body.is_empty() {
                    GENERIC_API_ERROR.to_string()
                } else {
                    body.chars().take(MAX_USER_ERROR_CHARS).collect()
                }
            }
            ChatError::Catalog(CatalogError::Network(detail)) => detail.clone(),
            ChatError::Catalog(CatalogError::Schema(_) | CatalogError::InvalidUrl { .. }) => {
                GENERIC_API_ERROR.to_string()
            }
            ChatError::Stream(_) => GENERIC_UNEXPECTED_ERROR.to_string(),
            ChatError::Busy(_) => "Results for this message are still loading.".to_string(),
            ChatError::Cancelled => String::new(),
        }
    }
}
