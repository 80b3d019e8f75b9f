use thiserror::Error;

use crate::credentials::CREDENTIAL_SOURCES;

pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate prompts. Please try again.";

/// Classified failure of one gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(
        "API key not configured. Set one of {sources} environment variables.",
        sources = CREDENTIAL_SOURCES.join(", ")
    )]
    MissingCredential,
    #[error("{message}")]
    InvalidCredential { source_name: String, message: String },
    #[error("AI API returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Failed to generate prompts. Please try again.")]
    Transport {
        #[source]
        source: anyhow::Error,
    },
}

impl GatewayError {
    /// Remediation for a credential the direct vendor API cannot use.
    pub fn invalid_credential(source_name: &str) -> Self {
        let message = format!(
            "The API key from {source_name} was rejected by the direct vendor API. \
             Use a vendor key (it usually starts with \"AIza\"), remove surrounding quotes or a \"Bearer \" prefix, \
             or point AI_GATEWAY_BASE_URL at an OpenAI-compatible gateway if this is a gateway or OpenAI-style key."
        );
        Self::InvalidCredential {
            source_name: source_name.to_string(),
            message,
        }
    }

    pub fn transport(source: impl Into<anyhow::Error>) -> Self {
        Self::Transport {
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingCredential => 500,
            Self::InvalidCredential { .. } => 400,
            Self::Upstream { status, .. } => {
                if (400..=599).contains(status) {
                    *status
                } else {
                    500
                }
            }
            Self::Transport { .. } => 500,
        }
    }
}

/// Failure of a whole generation call, as surfaced to callers.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl GenerateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Gateway(err) => err.status_code(),
        }
    }

    /// Single human-readable message for the `{ error }` envelope.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
