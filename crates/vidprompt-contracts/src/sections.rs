use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const FALLBACK_SECTION_TITLE: &str = "Generated Prompt";

/// One labeled unit of a generated reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

impl Section {
    fn new(title: String, content: String) -> Self {
        let highlight = extract_highlight(&content);
        Self {
            title,
            content,
            highlight,
        }
    }
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)---\s*Prompt\s*([A-Za-z0-9]+)\s*---").expect("label pattern compiles")
    })
}

fn highlight_heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\*\*(?:the\s+)?master\s+prompt:?\*\*[:\s]*")
            .expect("highlight pattern compiles")
    })
}

/// Splits a reply on `--- Prompt X ---` labels. Text before the first label is dropped;
/// a reply without labels becomes a single section.
pub fn split_sections(text: &str) -> Vec<Section> {
    let labels: Vec<(usize, usize, String)> = label_pattern()
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let identifier = captures.get(1)?.as_str().to_string();
            Some((whole.start(), whole.end(), identifier))
        })
        .collect();

    if labels.is_empty() {
        return vec![Section::new(
            FALLBACK_SECTION_TITLE.to_string(),
            text.trim().to_string(),
        )];
    }

    labels
        .iter()
        .enumerate()
        .map(|(position, (_, body_start, identifier))| {
            let body_end = labels
                .get(position + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(text.len());
            Section::new(
                format!("Prompt {identifier}"),
                text[*body_start..body_end].trim().to_string(),
            )
        })
        .collect()
}

/// Pulls the body of a bold "Master Prompt" heading out of a section.
/// A heading with nothing under it yields no highlight.
pub fn extract_highlight(content: &str) -> Option<String> {
    let heading = highlight_heading_pattern().find(content)?;
    let body_start = heading.end();
    // The separator run may already hold the newline that opens the next heading.
    let separator_start = content[..body_start]
        .trim_end_matches(|ch: char| ch == ':' || ch.is_whitespace())
        .len();
    let stop = content[separator_start..]
        .find("\n**")
        .map(|offset| separator_start + offset)
        .unwrap_or(content.len());
    let body = if stop > body_start {
        &content[body_start..stop]
    } else {
        ""
    };
    let cleaned = body.trim().trim_matches(|ch| ch == '"' || ch == '\n');
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.to_string())
}
