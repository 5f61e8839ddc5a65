/// LLM capability used by downstream consumers of ingested posts.
///
/// Callers depend on `LlmProvider` only. The concrete backend (Bedrock or
/// Gemini) is chosen once at startup from `LLM_PROVIDER`.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod bedrock;
pub mod gemini;

pub use bedrock::BedrockProvider;
pub use gemini::GeminiProvider;

pub const DEFAULT_BEDROCK_MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("LLM configuration error: {0}")]
    Config(String),
}

/// Sampling limits for a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConstraints {
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: Option<String>,
}

impl Default for GenerationConstraints {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.7,
            system: None,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short identifier reported alongside generated content.
    fn name(&self) -> &'static str;

    /// Returns the generated text for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        constraints: &GenerationConstraints,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    Bedrock,
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Bedrock => "bedrock",
            ProviderKind::Gemini => "gemini",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bedrock" => Ok(ProviderKind::Bedrock),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(LlmError::Config(format!(
                "LLM_PROVIDER must be 'bedrock' or 'gemini', got '{other}'"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub bedrock_model_id: String,
    pub aws_region: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_base: String,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("bedrock_model_id", &self.bedrock_model_id)
            .field("aws_region", &self.aws_region)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_model", &self.gemini_model)
            .field("gemini_api_base", &self.gemini_api_base)
            .finish()
    }
}

/// Builds the configured provider.
pub async fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider {
        ProviderKind::Bedrock => Ok(Arc::new(
            BedrockProvider::from_region(&config.aws_region, config.bedrock_model_id.clone())
                .await,
        )),
        ProviderKind::Gemini => {
            let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                LlmError::Config("GEMINI_API_KEY is required when LLM_PROVIDER=gemini".to_string())
            })?;
            Ok(Arc::new(GeminiProvider::new(
                config.gemini_api_base.clone(),
                config.gemini_model.clone(),
                api_key,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: ProviderKind) -> LlmConfig {
        LlmConfig {
            provider,
            bedrock_model_id: DEFAULT_BEDROCK_MODEL.to_string(),
            aws_region: "us-east-1".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
        }
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(" bedrock ".parse::<ProviderKind>().unwrap(), ProviderKind::Bedrock);
        assert!("openai".parse::<ProviderKind>().is_err());
    }

    #[tokio::test]
    async fn test_gemini_requires_api_key() {
        let err = build_provider(&config(ProviderKind::Gemini))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[tokio::test]
    async fn test_gemini_provider_selected() {
        let mut cfg = config(ProviderKind::Gemini);
        cfg.gemini_api_key = Some("key".to_string());
        let provider = build_provider(&cfg).await.unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut cfg = config(ProviderKind::Gemini);
        cfg.gemini_api_key = Some("super-secret".to_string());
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
