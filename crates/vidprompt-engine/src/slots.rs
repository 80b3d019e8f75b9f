use thiserror::Error;
use tracing::debug;
use vidprompt_contracts::prompts::{DurationMode, GenerateBody, PromptInput, MAX_PROMPTS};

use crate::normalizer::{normalize_image, NormalizeError, NormalizedImage};

/// Largest serialized generation body a client will send.
pub const MAX_REQUEST_BYTES: usize = 3_670_016;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("Slot {index} does not exist; there are {max} slots.", max = MAX_PROMPTS)]
    OutOfRange { index: usize },
    #[error("Prompt count must be between 1 and {max}.", max = MAX_PROMPTS)]
    InvalidCount { count: usize },
    #[error("Please add at least one image or description.")]
    NothingToSend,
    #[error("Your upload is still too large to send. Use fewer images or smaller files.")]
    TooLarge { bytes: usize },
    #[error(transparent)]
    Image(#[from] NormalizeError),
    #[error("failed to serialize request body")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    pub image: Option<NormalizedImage>,
    pub description: String,
}

impl Slot {
    fn has_content(&self) -> bool {
        self.image.is_some() || !self.description.trim().is_empty()
    }
}

/// The fixed set of prompt slots a client fills before generating.
///
/// Slots own their normalized image buffers; replacing, removing or clearing an image
/// drops the previous buffer.
#[derive(Debug, Clone, Default)]
pub struct SlotBoard {
    slots: [Slot; MAX_PROMPTS],
}

impl SlotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot, SlotError> {
        self.slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index })
    }

    /// Normalizes `bytes` into slot `index`. On failure the slot keeps its previous image.
    pub fn set_image(
        &mut self,
        index: usize,
        bytes: &[u8],
        declared_mime: Option<&str>,
    ) -> Result<&NormalizedImage, SlotError> {
        self.slot_mut(index)?;
        let normalized = normalize_image(bytes, declared_mime)?;
        debug!(
            index,
            width = normalized.width,
            height = normalized.height,
            quality = normalized.quality,
            bytes = normalized.byte_len,
            "slot image normalized"
        );
        let slot = self.slot_mut(index)?;
        Ok(&*slot.image.insert(normalized))
    }

    /// Drops the slot image; the description stays.
    pub fn remove_image(&mut self, index: usize) -> Result<Option<NormalizedImage>, SlotError> {
        Ok(self.slot_mut(index)?.image.take())
    }

    pub fn set_description(
        &mut self,
        index: usize,
        description: impl Into<String>,
    ) -> Result<(), SlotError> {
        self.slot_mut(index)?.description = description.into();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }

    /// The first `count` slots as prompt inputs, indexed by position.
    pub fn prompt_inputs(&self, count: usize) -> Vec<PromptInput> {
        self.slots
            .iter()
            .take(count)
            .enumerate()
            .map(|(index, slot)| {
                let input = PromptInput::new(index, slot.description.clone());
                match slot.image.as_ref() {
                    Some(normalized) => input.with_image(&normalized.image),
                    None => input,
                }
            })
            .collect()
    }

    pub fn has_content(&self, count: usize) -> bool {
        self.slots.iter().take(count).any(Slot::has_content)
    }

    pub fn image_count(&self, count: usize) -> usize {
        self.slots
            .iter()
            .take(count)
            .filter(|slot| slot.image.is_some())
            .count()
    }

    /// Assembles the generation body for the first `count` slots, refusing empty or
    /// oversized submissions before anything is sent.
    pub fn build_body(
        &self,
        count: usize,
        duration: DurationMode,
    ) -> Result<GenerateBody, SlotError> {
        if count == 0 || count > MAX_PROMPTS {
            return Err(SlotError::InvalidCount { count });
        }
        if !self.has_content(count) {
            return Err(SlotError::NothingToSend);
        }
        let body = GenerateBody {
            prompts: Some(self.prompt_inputs(count)),
            prompt_count: Some(count),
            video_duration: Some(duration),
        };
        let bytes = serde_json::to_vec(&body)?.len();
        if bytes > MAX_REQUEST_BYTES {
            return Err(SlotError::TooLarge { bytes });
        }
        Ok(body)
    }
}
