use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use vidprompt_contracts::payload::{ContentBlock, GatewayRequest};

use super::{
    text_or_placeholder, GENERATION_MAX_TOKENS, GENERATION_TEMPERATURE, GENERATION_TOP_K,
    GENERATION_TOP_P,
};
use crate::credentials::ResolvedCredential;
use crate::error::GatewayError;
use crate::transport::{truncate_text, HttpTransport, TransportRequest};

const INVALID_KEY_REASON: &str = "API_KEY_INVALID";
const INVALID_KEY_MESSAGE: &str = "API key not valid";

/// Vendor `generateContent` endpoint, authenticated with a `key` query parameter.
pub struct DirectGateway {
    api_base: String,
    model: String,
    credential: Option<ResolvedCredential>,
    transport: Arc<dyn HttpTransport>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

impl DirectGateway {
    pub fn new(
        api_base: &str,
        model: &str,
        credential: Option<ResolvedCredential>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
            credential,
            transport,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn credential(&self) -> Option<&ResolvedCredential> {
        self.credential.as_ref()
    }

    pub fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub(crate) async fn send(
        &self,
        request: &GatewayRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, GatewayError> {
        let response = self
            .transport
            .post_json(TransportRequest {
                url: self.endpoint(),
                query: vec![("key".to_string(), credential.value.clone())],
                bearer: None,
                body: build_body(request),
            })
            .await
            .map_err(GatewayError::transport)?;

        if !response.is_success() {
            warn!(
                status = response.status,
                body = %truncate_text(&response.body, 512),
                "direct vendor API rejected request"
            );
            if is_invalid_key(&response.body) {
                return Err(GatewayError::invalid_credential(&credential.source));
            }
            return Err(GatewayError::Upstream {
                status: response.status,
                body: response.body,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response.body)
            .map_err(|err| GatewayError::transport(anyhow::Error::new(err)))?;
        Ok(text_or_placeholder(first_text(parsed)))
    }
}

fn build_body(request: &GatewayRequest) -> Value {
    let parts: Vec<Value> = request
        .contents
        .iter()
        .map(|block| match block {
            ContentBlock::Image(image) => json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }),
            ContentBlock::Text { text } => json!({ "text": text }),
        })
        .collect();
    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "generationConfig": {
            "temperature": GENERATION_TEMPERATURE,
            "topP": GENERATION_TOP_P,
            "topK": GENERATION_TOP_K,
            "maxOutputTokens": GENERATION_MAX_TOKENS,
        },
    })
}

fn first_text(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

fn is_invalid_key(body: &str) -> bool {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return false;
    };
    let Some(error) = envelope.error else {
        return false;
    };
    let by_reason = error
        .details
        .iter()
        .any(|detail| detail.reason.as_deref() == Some(INVALID_KEY_REASON));
    let by_message = error
        .message
        .as_deref()
        .map(|message| message.contains(INVALID_KEY_MESSAGE))
        .unwrap_or(false);
    by_reason || by_message
}
