#![forbid(unsafe_code)]

// Error taxonomy shared by the provisioner, sessions and binaries

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Custom error type for ground-station link operations
#[derive(Error, Debug)]
pub enum LinkError {
    /// Bad or missing configuration. Raised before any network activity.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A fixture could not be created or deleted on the control plane.
    #[error("Provisioning failed for {name}: {detail}")]
    Provisioning {
        name: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl LinkError {
    pub(crate) fn provisioning(name: &str, status: Option<u16>, detail: impl Into<String>) -> Self {
        LinkError::Provisioning {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }

    /// HTTP status carried by a provisioning failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            LinkError::Provisioning { status, .. } => *status,
            LinkError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for link operations
pub type LinkResult<T> = Result<T, LinkError>;
