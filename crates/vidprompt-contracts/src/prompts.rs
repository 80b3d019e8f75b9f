use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound on how many image/description pairs one request may carry.
pub const MAX_PROMPTS: usize = 5;

/// One image/description pair as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInput {
    #[serde(alias = "imageIndex")]
    pub index: usize,
    #[serde(default)]
    pub description: String,
    /// `data:image/<subtype>;base64,<payload>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

impl PromptInput {
    pub fn new(index: usize, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            image_data: None,
        }
    }

    pub fn with_image(mut self, image: &EncodedImage) -> Self {
        self.image_data = Some(image.to_data_url());
        self
    }

    /// Parsed image payload. Data that is not an image data URL yields `None`.
    pub fn image(&self) -> Option<EncodedImage> {
        self.image_data.as_deref().and_then(EncodedImage::from_data_url)
    }

    pub fn has_content(&self) -> bool {
        !self.description.trim().is_empty() || self.image().is_some()
    }
}

/// Inline image: mime type plus standard base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    pub fn from_data_url(raw: &str) -> Option<Self> {
        let captures = data_url_pattern().captures(raw.trim())?;
        Some(Self {
            mime_type: captures.get(1)?.as_str().to_string(),
            data: captures.get(2)?.as_str().to_string(),
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }
}

fn data_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^data:(image/\w+);base64,(.+)$").expect("data url pattern compiles")
    })
}

/// Target clip length. 30 seconds splits every prompt into an A and a B part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DurationMode {
    #[default]
    Ten,
    Fifteen,
    Thirty,
}

impl DurationMode {
    pub fn seconds(self) -> u32 {
        match self {
            Self::Ten => 10,
            Self::Fifteen => 15,
            Self::Thirty => 30,
        }
    }

    pub fn is_paired(self) -> bool {
        matches!(self, Self::Thirty)
    }

    /// Number of labeled sections the gateway is asked to return for `inputs` prompts.
    pub fn expected_sections(self, inputs: usize) -> usize {
        if self.is_paired() {
            inputs * 2
        } else {
            inputs
        }
    }
}

impl TryFrom<u32> for DurationMode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Self::Ten),
            15 => Ok(Self::Fifteen),
            30 => Ok(Self::Thirty),
            other => Err(format!(
                "unsupported video duration {other}; expected 10, 15 or 30"
            )),
        }
    }
}

impl From<DurationMode> for u32 {
    fn from(value: DurationMode) -> Self {
        value.seconds()
    }
}

impl fmt::Display for DurationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.seconds())
    }
}

/// Body accepted by the generation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub prompts: Option<Vec<PromptInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<DurationMode>,
}

impl GenerateBody {
    pub fn duration(&self) -> DurationMode {
        self.video_duration.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DurationMode, EncodedImage, GenerateBody, PromptInput};

    #[test]
    fn data_url_parses_mime_and_payload() {
        let image = EncodedImage::from_data_url("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, "AAAA");
        assert_eq!(image.to_data_url(), "data:image/jpeg;base64,AAAA");
        assert_eq!(image.decode().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn non_image_data_url_is_ignored() {
        assert!(EncodedImage::from_data_url("data:text/plain;base64,AAAA").is_none());
        assert!(EncodedImage::from_data_url("not a data url").is_none());
        let input = PromptInput {
            index: 0,
            description: String::new(),
            image_data: Some("https://example.com/cat.png".to_string()),
        };
        assert!(input.image().is_none());
        assert!(!input.has_content());
    }

    #[test]
    fn prompt_input_accepts_legacy_image_index_field() -> anyhow::Result<()> {
        let input: PromptInput = serde_json::from_value(json!({
            "imageIndex": 2,
            "description": "waves",
            "imageData": null,
        }))?;
        assert_eq!(input.index, 2);
        assert_eq!(input.description, "waves");
        assert!(input.image_data.is_none());
        Ok(())
    }

    #[test]
    fn duration_mode_round_trips_as_bare_integer() -> anyhow::Result<()> {
        let body: GenerateBody = serde_json::from_value(json!({
            "prompts": [{"index": 0, "description": "a"}],
            "promptCount": 1,
            "videoDuration": 30,
        }))?;
        assert_eq!(body.duration(), DurationMode::Thirty);
        assert_eq!(serde_json::to_value(DurationMode::Fifteen)?, json!(15));
        Ok(())
    }

    #[test]
    fn unsupported_duration_is_rejected() {
        let parsed = serde_json::from_value::<GenerateBody>(json!({
            "prompts": [],
            "videoDuration": 20,
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_duration_defaults_to_ten_seconds() {
        assert_eq!(GenerateBody::default().duration(), DurationMode::Ten);
        assert_eq!(DurationMode::Thirty.expected_sections(3), 6);
        assert_eq!(DurationMode::Fifteen.expected_sections(3), 3);
    }
}
