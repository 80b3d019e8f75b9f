use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::prompts::{DurationMode, EncodedImage, PromptInput};

/// One element of the user turn, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Image(EncodedImage),
    Text { text: String },
}

impl ContentBlock {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { text: value.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text.as_str()),
            Self::Image(_) => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

/// Provider-neutral generation request. The last block is always the trailing instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub system_instruction: String,
    pub contents: Vec<ContentBlock>,
    pub expected_outputs: usize,
    pub duration: DurationMode,
}

impl GatewayRequest {
    pub fn trailing_instruction(&self) -> Option<&str> {
        self.contents.last().and_then(ContentBlock::as_text)
    }

    pub fn image_count(&self) -> usize {
        self.contents.iter().filter(|block| block.is_image()).count()
    }

    /// Hex SHA-256 of the request JSON; logged instead of the payload itself.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

pub fn description_label(input: &PromptInput) -> String {
    format!(
        "[Image {} Description]: {}",
        input.index + 1,
        input.description
    )
}

pub fn trailing_instruction(count: usize, duration: DurationMode) -> String {
    let head = format!(
        "Generate {count} optimized Img2Vid prompt(s), one for each image/description pair above. Label each output clearly."
    );
    let pacing = match duration {
        DurationMode::Ten => {
            "Each prompt targets a single 10-second clip. Label each output as --- Prompt N --- where N is the image number.".to_string()
        }
        DurationMode::Fifteen => {
            "Each prompt targets a single 15-second clip; use longer, slower pacing with room for one additional beat. Label each output as --- Prompt N --- where N is the image number.".to_string()
        }
        DurationMode::Thirty => format!(
            "Each prompt targets a 30-second sequence delivered as two consecutive 15-second parts: part A covers 0-15s and part B continues seamlessly from 15-30s. Produce {} labeled outputs in total, labeled --- Prompt NA --- and --- Prompt NB --- where N is the image number.",
            duration.expected_sections(count)
        ),
    };
    format!("{head}\n\n{pacing}")
}

/// Builds the request for `inputs`, visited in index order.
pub fn build_gateway_request(
    inputs: &[PromptInput],
    duration: DurationMode,
    system_instruction: &str,
) -> GatewayRequest {
    let mut ordered: Vec<&PromptInput> = inputs.iter().collect();
    ordered.sort_by_key(|input| input.index);

    let mut contents = Vec::with_capacity(ordered.len() * 2 + 1);
    for input in &ordered {
        if let Some(image) = input.image() {
            contents.push(ContentBlock::Image(image));
        }
        contents.push(ContentBlock::text(description_label(input)));
    }
    contents.push(ContentBlock::text(trailing_instruction(
        ordered.len(),
        duration,
    )));

    GatewayRequest {
        system_instruction: system_instruction.to_string(),
        contents,
        expected_outputs: duration.expected_sections(ordered.len()),
        duration,
    }
}
