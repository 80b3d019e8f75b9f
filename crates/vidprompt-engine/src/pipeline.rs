use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use vidprompt_contracts::history::{HistoryEntry, HistoryPrompt};
use vidprompt_contracts::payload::build_gateway_request;
use vidprompt_contracts::prompts::{DurationMode, GenerateBody, PromptInput, MAX_PROMPTS};
use vidprompt_contracts::sections::{split_sections, Section};

use crate::config::AppConfig;
use crate::error::GenerateError;
use crate::gateway::GatewayClient;
use crate::recorder::HistoryRecorder;
use crate::transport::HttpTransport;

/// Text returned by one successful gateway call, with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub inputs: Vec<PromptInput>,
    pub duration: DurationMode,
}

impl Generation {
    pub fn sections(&self) -> Vec<Section> {
        split_sections(&self.text)
    }

    pub fn image_count(&self) -> usize {
        self.inputs
            .iter()
            .filter(|input| input.image().is_some())
            .count()
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry::new(
            self.image_count(),
            self.inputs.iter().map(HistoryPrompt::from).collect(),
            self.sections(),
        )
    }
}

pub struct PromptEngine {
    gateway: GatewayClient,
    recorder: HistoryRecorder,
    system_instruction: String,
}

impl PromptEngine {
    pub fn new(
        gateway: GatewayClient,
        recorder: HistoryRecorder,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            recorder,
            system_instruction: system_instruction.into(),
        }
    }

    pub fn from_config(config: &AppConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::new(
            GatewayClient::from_config(&config.gateway, transport),
            HistoryRecorder::from_path(config.history_path.clone()),
            config.system_instruction.clone(),
        )
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    pub fn recorder(&self) -> &HistoryRecorder {
        &self.recorder
    }

    /// Validates `body`, sends the active inputs and returns the raw reply.
    pub async fn generate(&self, body: GenerateBody) -> Result<Generation, GenerateError> {
        let duration = body.duration();
        let inputs = select_active_inputs(body)?;
        let request = build_gateway_request(&inputs, duration, &self.system_instruction);
        info!(
            inputs = inputs.len(),
            duration = %duration,
            expected_outputs = request.expected_outputs,
            "generating prompts"
        );
        let text = self.gateway.send(&request).await?;
        Ok(Generation {
            text,
            inputs,
            duration,
        })
    }

    /// Starts persisting `generation` on the blocking pool. Callers may drop the handle.
    pub fn record_in_background(&self, generation: &Generation) -> JoinHandle<()> {
        let recorder = self.recorder.clone();
        let entry = generation.history_entry();
        tokio::task::spawn_blocking(move || recorder.record(&entry))
    }

    /// Newest history entries; empty on any failure.
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let recorder = self.recorder.clone();
        match tokio::task::spawn_blocking(move || recorder.recent(limit)).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "history read task failed");
                Vec::new()
            }
        }
    }
}

/// Applies the prompt-count policy: the active set is the shorter of `promptCount`
/// and the submitted list, and its indices must run 0..n without gaps.
pub fn select_active_inputs(body: GenerateBody) -> Result<Vec<PromptInput>, GenerateError> {
    let prompts = body.prompts.unwrap_or_default();
    if prompts.is_empty() {
        return Err(GenerateError::invalid("No prompts provided"));
    }
    let requested = body.prompt_count.unwrap_or(prompts.len());
    if requested == 0 || requested > MAX_PROMPTS {
        return Err(GenerateError::invalid(format!(
            "promptCount must be between 1 and {MAX_PROMPTS}"
        )));
    }
    let active = requested.min(prompts.len());
    let inputs: Vec<PromptInput> = prompts.into_iter().take(active).collect();

    let mut indices: Vec<usize> = inputs.iter().map(|input| input.index).collect();
    indices.sort_unstable();
    if indices.iter().enumerate().any(|(position, index)| position != *index) {
        return Err(GenerateError::invalid(
            "Prompt indices must be unique and numbered from 0",
        ));
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use vidprompt_contracts::prompts::{DurationMode, EncodedImage, GenerateBody, PromptInput};

    use super::{select_active_inputs, PromptEngine};
    use crate::config::{GatewayConfig, ProtocolFamily};
    use crate::credentials::ResolvedCredential;
    use crate::gateway::GatewayClient;
    use crate::recorder::HistoryRecorder;
    use crate::transport::testing::RecordingTransport;

    const REPLY: &str = "Intro\n--- Prompt 1 ---\n**The Master Prompt**: \"A slow dolly-in.\"\n**Why it works**: pacing\n--- Prompt 2 ---\nSecond";

    fn direct_config() -> GatewayConfig {
        GatewayConfig {
            model: "gemini-2.5-pro".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            protocol: ProtocolFamily::Direct,
            credential: Some(ResolvedCredential {
                source: "GEMINI_API_KEY".to_string(),
                value: "AIza-key".to_string(),
            }),
        }
    }

    fn reply_body(text: &str) -> String {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
    }

    fn engine(transport: Arc<RecordingTransport>, recorder: HistoryRecorder) -> PromptEngine {
        PromptEngine::new(
            GatewayClient::from_config(&direct_config(), transport),
            recorder,
            "header",
        )
    }

    fn body(descriptions: &[&str], count: Option<usize>) -> GenerateBody {
        GenerateBody {
            prompts: Some(
                descriptions
                    .iter()
                    .enumerate()
                    .map(|(index, description)| PromptInput::new(index, *description))
                    .collect(),
            ),
            prompt_count: count,
            video_duration: None,
        }
    }

    fn trailing_text(transport: &RecordingTransport) -> String {
        let sent = transport.requests();
        let parts = sent[0].body["contents"][0]["parts"].as_array().unwrap().clone();
        parts.last().unwrap()["text"].as_str().unwrap().to_string()
    }

    #[test]
    fn missing_or_empty_prompts_are_rejected() {
        for body in [GenerateBody::default(), body(&[], None)] {
            let err = select_active_inputs(body).unwrap_err();
            assert_eq!(err.status_code(), 400);
            assert_eq!(err.user_message(), "No prompts provided");
        }
    }

    #[test]
    fn prompt_count_out_of_range_is_rejected() {
        assert!(select_active_inputs(body(&["a"], Some(0))).is_err());
        assert!(select_active_inputs(body(&["a"], Some(6))).is_err());
        let six = body(&["a", "b", "c", "d", "e", "f"], None);
        assert_eq!(select_active_inputs(six).unwrap_err().status_code(), 400);
    }

    #[test]
    fn gaps_and_duplicates_are_rejected() {
        let gap = GenerateBody {
            prompts: Some(vec![PromptInput::new(0, "a"), PromptInput::new(2, "c")]),
            ..GenerateBody::default()
        };
        assert!(select_active_inputs(gap).is_err());
        let duplicate = GenerateBody {
            prompts: Some(vec![PromptInput::new(0, "a"), PromptInput::new(0, "b")]),
            ..GenerateBody::default()
        };
        assert!(select_active_inputs(duplicate).is_err());
        let shuffled = GenerateBody {
            prompts: Some(vec![PromptInput::new(1, "b"), PromptInput::new(0, "a")]),
            ..GenerateBody::default()
        };
        assert_eq!(select_active_inputs(shuffled).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn prompt_count_above_list_length_uses_the_list() {
        let transport = Arc::new(RecordingTransport::replying(200, &reply_body(REPLY)));
        let engine = engine(transport.clone(), HistoryRecorder::disabled());

        let generation = engine.generate(body(&["a", "b"], Some(4))).await.unwrap();

        assert_eq!(generation.inputs.len(), 2);
        assert!(trailing_text(&transport).starts_with("Generate 2 optimized"));
    }

    #[tokio::test]
    async fn prompt_count_below_list_length_truncates() {
        let transport = Arc::new(RecordingTransport::replying(200, &reply_body(REPLY)));
        let engine = engine(transport.clone(), HistoryRecorder::disabled());

        let generation = engine
            .generate(body(&["a", "b", "c"], Some(1)))
            .await
            .unwrap();

        assert_eq!(generation.inputs.len(), 1);
        assert!(trailing_text(&transport).starts_with("Generate 1 optimized"));
    }

    #[tokio::test]
    async fn invalid_body_never_calls_the_gateway() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(transport.clone(), HistoryRecorder::disabled());

        let err = engine.generate(GenerateBody::default()).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn generation_is_recorded_with_sections() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transport = Arc::new(RecordingTransport::replying(200, &reply_body(REPLY)));
        let engine = engine(
            transport,
            HistoryRecorder::new(temp.path().join("history.jsonl")),
        );
        let image = EncodedImage::from_bytes("image/jpeg", b"jpeg");
        let request = GenerateBody {
            prompts: Some(vec![
                PromptInput::new(0, "lighthouse").with_image(&image),
                PromptInput::new(1, "waves"),
            ]),
            prompt_count: Some(2),
            video_duration: Some(DurationMode::Fifteen),
        };

        let generation = engine.generate(request).await?;
        engine.record_in_background(&generation).await?;
        let history = engine.history(20).await;

        assert_eq!(history.len(), 1);
        let entry = &history[0];
        assert_eq!(entry.image_count, 1);
        assert_eq!(entry.prompts.len(), 2);
        assert_eq!(entry.prompts[1].description, "waves");
        assert_eq!(entry.results.len(), 2);
        assert_eq!(entry.results[0].title, "Prompt 1");
        assert_eq!(
            entry.results[0].highlight.as_deref(),
            Some("A slow dolly-in.")
        );
        Ok(())
    }

    #[tokio::test]
    async fn history_failure_does_not_affect_the_reply() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let transport = Arc::new(RecordingTransport::replying(200, &reply_body("plain text")));
        let engine = engine(transport, HistoryRecorder::new(temp.path()));

        let generation = engine.generate(body(&["a"], None)).await?;
        engine.record_in_background(&generation).await?;

        assert_eq!(generation.text, "plain text");
        assert!(engine.history(20).await.is_empty());
        Ok(())
    }
}
