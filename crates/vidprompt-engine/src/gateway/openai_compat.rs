use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use vidprompt_contracts::payload::{ContentBlock, GatewayRequest};

use super::{text_or_placeholder, GENERATION_MAX_TOKENS, GENERATION_TEMPERATURE, GENERATION_TOP_P};
use crate::credentials::ResolvedCredential;
use crate::error::GatewayError;
use crate::transport::{truncate_text, HttpTransport, TransportRequest};

/// `chat/completions` gateway with bearer authentication.
pub struct OpenAiCompatibleGateway {
    api_base: String,
    model: String,
    credential: Option<ResolvedCredential>,
    transport: Arc<dyn HttpTransport>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiCompatibleGateway {
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
        format!("{}/chat/completions", self.api_base)
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
                query: Vec::new(),
                bearer: Some(credential.value.clone()),
                body: build_body(&self.model, request),
            })
            .await
            .map_err(GatewayError::transport)?;

        if !response.is_success() {
            warn!(
                status = response.status,
                body = %truncate_text(&response.body, 512),
                "compatible gateway rejected request"
            );
            return Err(GatewayError::Upstream {
                status: response.status,
                body: response.body,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&response.body)
            .map_err(|err| GatewayError::transport(anyhow::Error::new(err)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content);
        Ok(text_or_placeholder(content))
    }
}

fn build_body(model: &str, request: &GatewayRequest) -> Value {
    let parts: Vec<Value> = request
        .contents
        .iter()
        .map(|block| match block {
            ContentBlock::Image(image) => json!({
                "type": "image_url",
                "image_url": { "url": image.to_data_url() },
            }),
            ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
        })
        .collect();
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system_instruction },
            { "role": "user", "content": parts },
        ],
        "temperature": GENERATION_TEMPERATURE,
        "top_p": GENERATION_TOP_P,
        "max_tokens": GENERATION_MAX_TOKENS,
    })
}
