use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::{
    LlmConfig, ProviderKind, DEFAULT_BEDROCK_MODEL, DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL,
};
use crate::posts::filter::FilterConfig;
use crate::posts::scoring::ScoringPolicy;
use crate::reddit::{RedditConfig, TokenSource};

const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => bail!("LOG_FORMAT must be 'pretty' or 'json', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub port: u16,
    pub rust_log: String,
    pub log_format: LogFormat,
    pub reddit: RedditConfig,
    pub scoring: ScoringPolicy,
    pub filter: FilterConfig,
    pub llm: LlmConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let token_source = match env.get("REDDIT_ACCESS_TOKEN") {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::ClientCredentials {
                client_id: env.require("REDDIT_CLIENT_ID")?,
                client_secret: env.require("REDDIT_CLIENT_SECRET")?,
            },
        };

        let reddit = RedditConfig {
            api_base: env.get_or("REDDIT_API_BASE", DEFAULT_API_BASE),
            auth_url: env.get_or("REDDIT_AUTH_URL", DEFAULT_AUTH_URL),
            user_agent: env.require("REDDIT_USER_AGENT")?,
            token_source,
            rate_limit_per_minute: env.parse_or("REDDIT_RATE_LIMIT_PER_MINUTE", 60)?,
            max_throttle_wait: Duration::from_secs(
                env.parse_or("REDDIT_MAX_THROTTLE_WAIT_SECS", 30)?,
            ),
            comment_limit: env.parse_or("REDDIT_COMMENT_LIMIT", 10)?,
            request_timeout: REQUEST_TIMEOUT,
        };
        if reddit.rate_limit_per_minute == 0 {
            bail!("REDDIT_RATE_LIMIT_PER_MINUTE must be greater than zero");
        }

        let defaults = ScoringPolicy::default();
        let scoring = ScoringPolicy {
            half_life_hours: env.parse_or("SCORE_HALF_LIFE_HOURS", defaults.half_life_hours)?,
            comment_weight: env.parse_or("SCORE_COMMENT_WEIGHT", defaults.comment_weight)?,
        };
        scoring
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid scoring policy")?;

        let defaults = FilterConfig::default();
        let filter = FilterConfig {
            keywords: env
                .get("FILTER_KEYWORDS")
                .map(|raw| {
                    raw.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            nsfw_tags: defaults.nsfw_tags,
            max_title_length: env
                .parse_or("FILTER_MAX_TITLE_LENGTH", defaults.max_title_length)?,
            min_score: env.parse_or("FILTER_MIN_SCORE", defaults.min_score)?,
            min_comments: env.parse_or("FILTER_MIN_COMMENTS", defaults.min_comments)?,
        };

        let provider = match env.get("LLM_PROVIDER") {
            Some(raw) => raw.parse::<ProviderKind>()?,
            None => ProviderKind::default(),
        };
        let llm = LlmConfig {
            provider,
            bedrock_model_id: env.get_or("BEDROCK_MODEL_ID", DEFAULT_BEDROCK_MODEL),
            aws_region: env.get_or("AWS_REGION", "us-east-1"),
            gemini_api_key: env.get("GEMINI_API_KEY"),
            gemini_model: env.get_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            gemini_api_base: env.get_or("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE),
        };
        if provider == ProviderKind::Gemini && llm.gemini_api_key.is_none() {
            bail!("Required environment variable 'GEMINI_API_KEY' is not set (LLM_PROVIDER=gemini)");
        }

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            redis_url: env.get("REDIS_URL"),
            cache_ttl: Duration::from_secs(env.parse_or("CACHE_TTL_SECS", 300)?),
            port: env
                .parse_or("PORT", 8080u16)
                .context("PORT must be a valid port number")?,
            rust_log: env.get_or("RUST_LOG", "info"),
            log_format: match env.get("LOG_FORMAT") {
                Some(raw) => raw.parse()?,
                None => LogFormat::Pretty,
            },
            reddit,
            scoring,
            filter,
            llm,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/ingest"),
        ("REDDIT_USER_AGENT", "ingest/0.1 by tester"),
        ("REDDIT_CLIENT_ID", "id"),
        ("REDDIT_CLIENT_SECRET", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(BASE).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.reddit.rate_limit_per_minute, 60);
        assert_eq!(config.reddit.max_throttle_wait, Duration::from_secs(30));
        assert_eq!(config.reddit.api_base, DEFAULT_API_BASE);
        assert_eq!(config.scoring, ScoringPolicy::default());
        assert_eq!(config.llm.provider, ProviderKind::Bedrock);
        assert!(matches!(
            config.reddit.token_source,
            TokenSource::ClientCredentials { .. }
        ));
    }

    #[test]
    fn test_missing_database_url_names_variable() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "DATABASE_URL")
            .collect();
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"), "{err}");
    }

    #[test]
    fn test_static_token_replaces_client_credentials() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/ingest"),
            ("REDDIT_USER_AGENT", "ingest/0.1"),
            ("REDDIT_ACCESS_TOKEN", "abc"),
        ])
        .unwrap();
        assert!(matches!(config.reddit.token_source, TokenSource::Static(_)));
    }

    #[test]
    fn test_filter_keywords_are_split() {
        let mut vars = BASE.to_vec();
        vars.push(("FILTER_KEYWORDS", "rust, tokio ,,async"));
        let config = load(&vars).unwrap();
        assert_eq!(config.filter.keywords, vec!["rust", "tokio", "async"]);
    }

    #[test]
    fn test_gemini_requires_key() {
        let mut vars = BASE.to_vec();
        vars.push(("LLM_PROVIDER", "gemini"));
        assert!(load(&vars).is_err());
        vars.push(("GEMINI_API_KEY", "k"));
        assert_eq!(load(&vars).unwrap().llm.provider, ProviderKind::Gemini);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("SCORE_HALF_LIFE_HOURS", "-3"));
        assert!(load(&vars).is_err());

        let mut vars = BASE.to_vec();
        vars.push(("PORT", "not-a-port"));
        assert!(load(&vars).is_err());
    }
}
