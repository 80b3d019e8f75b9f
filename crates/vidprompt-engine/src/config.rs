use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::credentials::{resolve_credential, ResolvedCredential, CREDENTIAL_SOURCES};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DIRECT_VENDOR_HOST: &str = "generativelanguage.googleapis.com";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = include_str!("../resources/system_instruction.txt");

/// Wire format spoken to the configured gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    Direct,
    OpenAiCompatible,
}

impl ProtocolFamily {
    /// Direct when the endpoint host is the vendor host, OpenAI-compatible otherwise.
    pub fn infer(api_base: &str) -> Self {
        let is_vendor = reqwest::Url::parse(api_base.trim())
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .map(|host| host == DIRECT_VENDOR_HOST)
            .unwrap_or(false);
        if is_vendor {
            Self::Direct
        } else {
            Self::OpenAiCompatible
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "direct" | "gemini" | "google" => Some(Self::Direct),
            "openai" | "openai-compatible" | "openai_compatible" | "compat" => {
                Some(Self::OpenAiCompatible)
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable gateway settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub model: String,
    pub api_base: String,
    pub protocol: ProtocolFamily,
    pub credential: Option<ResolvedCredential>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let model = lookup("AI_GATEWAY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base = lookup("AI_GATEWAY_BASE_URL")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let protocol = match lookup("AI_GATEWAY_PROTOCOL") {
            Some(raw) => ProtocolFamily::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognized AI_GATEWAY_PROTOCOL; inferring from endpoint");
                ProtocolFamily::infer(&api_base)
            }),
            None => ProtocolFamily::infer(&api_base),
        };
        let credential = resolve_credential(CREDENTIAL_SOURCES, &lookup);
        Self {
            model,
            api_base,
            protocol,
            credential,
        }
    }
}

/// Process-wide settings for the server and the CLI subcommands.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub history_path: Option<PathBuf>,
    pub listen: String,
    pub system_instruction: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let system_instruction = match lookup("VIDPROMPT_SYSTEM_PROMPT_PATH") {
            Some(path) => fs::read_to_string(&path)
                .with_context(|| format!("failed reading system prompt {path}"))?,
            None => DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        };
        Ok(Self {
            gateway: GatewayConfig::from_lookup(&lookup),
            history_path: lookup("VIDPROMPT_HISTORY_PATH").map(PathBuf::from),
            listen: lookup("VIDPROMPT_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            system_instruction,
        })
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
