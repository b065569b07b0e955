//! # Errors
//!
//! Error taxonomy produced by the secret gateway and the restore procedure.
//!
//! `NotFound` and `Conflict` are kept apart from generic API failures so that
//! outer layers can map them to 404 and 409 responses respectively.

use axum::http::StatusCode;
use thiserror::Error;

/// Classified failure of a secret gateway operation
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The addressed secret does not exist
    #[error("Secret with name {name} not found")]
    NotFound { name: String },

    /// A secret with the same name already exists (create only)
    #[error("Secret with name {name} already exists")]
    Conflict { name: String },

    /// Any other remote failure; `message` carries the response diagnostic
    #[error("Invalid k8s cluster parameters or API error. {message}")]
    Api { status: Option<u16>, message: String },

    /// The patch document could not be encoded; no request was sent
    #[error("Unable to serialize secret patch request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is not valid UTF-8
    #[error("Secret {name} holds a non UTF-8 value for key {key}")]
    InvalidData { name: String, key: String },

    /// The in-flight async patch was cancelled through its handle
    #[error("Secret patch request was cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Classify a Kubernetes client error raised while operating on `name`
    pub fn from_kube(name: &str, error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound {
                name: name.to_string(),
            },
            kube::Error::Api(response) if response.code == 409 => Self::Conflict {
                name: name.to_string(),
            },
            kube::Error::Api(response) => Self::Api {
                status: Some(response.code),
                message: response.message,
            },
            kube::Error::SerdeError(e) => Self::Serialization(e),
            other => Self::Api {
                status: None,
                message: other.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Errors that retrying with the same inputs can never repair
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::InvalidData { .. })
    }

    /// Outward status code for this failure
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Api { .. }
            | Self::Serialization(_)
            | Self::InvalidData { .. }
            | Self::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure of a single restore attempt
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("secured variables store: {0}")]
    Gateway(#[from] GatewayError),

    #[error("common variables store: {0:#}")]
    CommonVariables(anyhow::Error),
}

impl RestoreError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_permanent(),
            Self::CommonVariables(_) => false,
        }
    }
}
