use std::fmt;

/// Environment variables consulted for the gateway credential, in priority order.
pub const CREDENTIAL_SOURCES: &[&str] = &[
    "AI_GATEWAY_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "OPENAI_API_KEY",
];

const OPENAI_SECRET_PREFIX: &str = "sk-";

/// A normalized credential together with the source it was read from.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub source: String,
    pub value: String,
}

impl ResolvedCredential {
    pub fn looks_like_openai_secret(&self) -> bool {
        self.value.starts_with(OPENAI_SECRET_PREFIX)
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("source", &self.source)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Takes the first source whose normalized value is non-empty.
pub fn resolve_credential<F>(sources: &[&str], lookup: F) -> Option<ResolvedCredential>
where
    F: Fn(&str) -> Option<String>,
{
    sources.iter().find_map(|source| {
        let raw = lookup(source)?;
        let value = normalize_credential(&raw);
        if value.is_empty() {
            return None;
        }
        Some(ResolvedCredential {
            source: (*source).to_string(),
            value,
        })
    })
}

/// Trims, removes one layer of matching quotes, then a leading `Bearer ` scheme.
pub fn normalize_credential(raw: &str) -> String {
    let mut value = raw.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            value = value[1..value.len() - 1].trim();
            break;
        }
    }
    if let Some(scheme) = value.get(..7) {
        if scheme.eq_ignore_ascii_case("bearer ") {
            value = value[7..].trim();
        }
    }
    value.to_string()
}
