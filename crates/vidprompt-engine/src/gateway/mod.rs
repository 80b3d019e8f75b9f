mod direct;
mod openai_compat;

use std::sync::Arc;

use tracing::{info, warn};
use vidprompt_contracts::payload::GatewayRequest;

use crate::config::{GatewayConfig, ProtocolFamily};
use crate::credentials::ResolvedCredential;
use crate::error::GatewayError;
use crate::transport::HttpTransport;

pub use direct::DirectGateway;
pub use openai_compat::OpenAiCompatibleGateway;

/// Returned in place of an error when the gateway answers without any text.
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response generated.";

pub(crate) const GENERATION_TEMPERATURE: f64 = 0.7;
pub(crate) const GENERATION_TOP_P: f64 = 0.95;
pub(crate) const GENERATION_TOP_K: u32 = 40;
pub(crate) const GENERATION_MAX_TOKENS: u32 = 8192;

/// One configured backend. Both variants share `send`.
pub enum GatewayClient {
    Direct(DirectGateway),
    OpenAiCompatible(OpenAiCompatibleGateway),
}

impl GatewayClient {
    pub fn from_config(config: &GatewayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        match config.protocol {
            ProtocolFamily::Direct => Self::Direct(DirectGateway::new(
                &config.api_base,
                &config.model,
                config.credential.clone(),
                transport,
            )),
            ProtocolFamily::OpenAiCompatible => {
                Self::OpenAiCompatible(OpenAiCompatibleGateway::new(
                    &config.api_base,
                    &config.model,
                    config.credential.clone(),
                    transport,
                ))
            }
        }
    }

    pub fn protocol(&self) -> ProtocolFamily {
        match self {
            Self::Direct(_) => ProtocolFamily::Direct,
            Self::OpenAiCompatible(_) => ProtocolFamily::OpenAiCompatible,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Direct(gateway) => gateway.model(),
            Self::OpenAiCompatible(gateway) => gateway.model(),
        }
    }

    fn credential(&self) -> Option<&ResolvedCredential> {
        match self {
            Self::Direct(gateway) => gateway.credential(),
            Self::OpenAiCompatible(gateway) => gateway.credential(),
        }
    }

    /// Sends `request` and returns the generated text.
    ///
    /// Credential problems are reported before anything leaves the process: a missing
    /// credential, or an OpenAI-style `sk-` secret aimed at the direct vendor API.
    pub async fn send(&self, request: &GatewayRequest) -> Result<String, GatewayError> {
        let Some(credential) = self.credential() else {
            warn!(protocol = %self.protocol(), "no gateway credential configured");
            return Err(GatewayError::MissingCredential);
        };
        if self.protocol() == ProtocolFamily::Direct && credential.looks_like_openai_secret() {
            warn!(
                source = %credential.source,
                "OpenAI-style credential configured for the direct vendor API"
            );
            return Err(GatewayError::invalid_credential(&credential.source));
        }

        info!(
            protocol = %self.protocol(),
            model = %self.model(),
            blocks = request.contents.len(),
            images = request.image_count(),
            duration = %request.duration,
            fingerprint = %request.fingerprint(),
            "sending gateway request"
        );
        let text = match self {
            Self::Direct(gateway) => gateway.send(request, credential).await?,
            Self::OpenAiCompatible(gateway) => gateway.send(request, credential).await?,
        };
        info!(chars = text.chars().count(), "gateway returned text");
        Ok(text)
    }
}

/// Missing or blank text collapses to the placeholder.
pub(crate) fn text_or_placeholder(text: Option<String>) -> String {
    text.filter(|value| !value.is_empty())
        .unwrap_or_else(|| NO_RESPONSE_PLACEHOLDER.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vidprompt_contracts::payload::build_gateway_request;
    use vidprompt_contracts::prompts::{DurationMode, PromptInput};

    use super::{GatewayClient, NO_RESPONSE_PLACEHOLDER};
    use crate::config::{GatewayConfig, ProtocolFamily};
    use crate::credentials::ResolvedCredential;
    use crate::error::GatewayError;
    use crate::transport::testing::RecordingTransport;

    fn config(protocol: ProtocolFamily, credential: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            model: "gemini-2.5-pro".to_string(),
            api_base: match protocol {
                ProtocolFamily::Direct => "https://generativelanguage.googleapis.com/v1beta",
                ProtocolFamily::OpenAiCompatible => "https://gateway.example.test/v1",
            }
            .to_string(),
            protocol,
            credential: credential.map(|value| ResolvedCredential {
                source: "GEMINI_API_KEY".to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn sample_request() -> vidprompt_contracts::payload::GatewayRequest {
        build_gateway_request(
            &[PromptInput::new(0, "a cat on a windowsill")],
            DurationMode::Ten,
            "header",
        )
    }

    #[tokio::test]
    async fn openai_secret_under_direct_never_reaches_network() {
        let transport = Arc::new(RecordingTransport::default());
        let client = GatewayClient::from_config(
            &config(ProtocolFamily::Direct, Some("sk-abc")),
            transport.clone(),
        );

        let err = client.send(&sample_request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::InvalidCredential { .. }));
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn openai_secret_is_fine_for_compatible_gateways() {
        let transport = Arc::new(RecordingTransport::replying(
            200,
            &json!({"choices": [{"message": {"content": "--- Prompt 1 ---\nok"}}]}).to_string(),
        ));
        let client = GatewayClient::from_config(
            &config(ProtocolFamily::OpenAiCompatible, Some("sk-abc")),
            transport.clone(),
        );

        let text = client.send(&sample_request()).await.unwrap();

        assert_eq!(text, "--- Prompt 1 ---\nok");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            GatewayClient::from_config(&config(ProtocolFamily::Direct, None), transport.clone());

        let err = client.send(&sample_request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::MissingCredential));
        assert_eq!(err.status_code(), 500);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_reply_becomes_placeholder() {
        let transport = Arc::new(RecordingTransport::replying(200, r#"{"candidates": []}"#));
        let client = GatewayClient::from_config(
            &config(ProtocolFamily::Direct, Some("AIza-key")),
            transport,
        );

        let text = client.send(&sample_request()).await.unwrap();

        assert_eq!(text, NO_RESPONSE_PLACEHOLDER);
    }

    #[tokio::test]
    async fn transport_failure_maps_to_generic_message() {
        let transport = Arc::new(RecordingTransport::failing("connection refused"));
        let client = GatewayClient::from_config(
            &config(ProtocolFamily::Direct, Some("AIza-key")),
            transport,
        );

        let err = client.send(&sample_request()).await.unwrap_err();

        assert!(matches!(err, GatewayError::Transport { .. }));
        assert_eq!(err.status_code(), 500);
        assert_eq!(
            err.to_string(),
            "Failed to generate prompts. Please try again."
        );
    }

    #[test]
    fn protocol_follows_config() {
        let transport = Arc::new(RecordingTransport::default());
        let direct = GatewayClient::from_config(
            &config(ProtocolFamily::Direct, Some("AIza")),
            transport.clone(),
        );
        let compat = GatewayClient::from_config(
            &config(ProtocolFamily::OpenAiCompatible, Some("AIza")),
            transport,
        );
        assert_eq!(direct.protocol(), ProtocolFamily::Direct);
        assert_eq!(compat.protocol(), ProtocolFamily::OpenAiCompatible);
        assert_eq!(direct.model(), "gemini-2.5-pro");
    }
}
