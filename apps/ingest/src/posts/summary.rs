use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::llm_client::{GenerationConstraints, LlmError, LlmProvider};
use crate::posts::prompts::{build_summary_prompt, SUMMARY_SYSTEM};
use crate::posts::query::{QueryError, QueryService};

const SUMMARY_MAX_TOKENS: u32 = 300;
const SUMMARY_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostSummary {
    pub post_id: i64,
    pub summary: String,
    pub provider: String,
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("post {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Summarizes stored posts with whichever LLM provider is configured.
#[derive(Clone)]
pub struct Summarizer {
    queries: QueryService,
    llm: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(queries: QueryService, llm: Arc<dyn LlmProvider>) -> Self {
        Self { queries, llm }
    }

    pub async fn summarize(&self, post_id: i64) -> Result<PostSummary, SummaryError> {
        let post = self
            .queries
            .by_id(post_id)
            .await?
            .ok_or(SummaryError::NotFound(post_id))?;

        let constraints = GenerationConstraints {
            max_tokens: SUMMARY_MAX_TOKENS,
            temperature: SUMMARY_TEMPERATURE,
            system: Some(SUMMARY_SYSTEM.to_string()),
        };
        let summary = self
            .llm
            .generate(&build_summary_prompt(&post), &constraints)
            .await?;

        info!(
            "Summarized post {} with {} ({} chars)",
            post_id,
            self.llm.name(),
            summary.len()
        );
        Ok(PostSummary {
            post_id,
            summary,
            provider: self.llm.name().to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::posts::models::tests::sample_post;
    use crate::posts::store::memory::MemoryPostStore;
    use crate::posts::store::PostStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the last call and answers with a fixed reply.
    #[derive(Default)]
    pub(crate) struct StubLlm {
        pub(crate) last: Mutex<Option<(String, GenerationConstraints)>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn generate(
            &self,
            prompt: &str,
            constraints: &GenerationConstraints,
        ) -> Result<String, LlmError> {
            *self.last.lock().unwrap() = Some((prompt.to_string(), constraints.clone()));
            if self.fail {
                return Err(LlmError::EmptyContent);
            }
            Ok("A concise summary.".to_string())
        }
    }

    #[tokio::test]
    async fn test_summarize_uses_post_and_constraints() {
        let store = Arc::new(MemoryPostStore::new());
        store
            .insert_if_absent(&sample_post("https://example.com/a"))
            .await
            .unwrap();
        let llm = Arc::new(StubLlm::default());
        let summarizer = Summarizer::new(QueryService::new(store), llm.clone());

        let summary = summarizer.summarize(1).await.unwrap();
        assert_eq!(
            summary,
            PostSummary {
                post_id: 1,
                summary: "A concise summary.".to_string(),
                provider: "stub".to_string(),
            }
        );

        let (prompt, constraints) = llm.last.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Rust 2.0 announced"));
        assert_eq!(constraints.max_tokens, 300);
        assert_eq!(constraints.temperature, 0.7);
    }

    #[tokio::test]
    async fn test_missing_post() {
        let store = Arc::new(MemoryPostStore::new());
        let summarizer = Summarizer::new(QueryService::new(store), Arc::new(StubLlm::default()));
        assert!(matches!(
            summarizer.summarize(42).await,
            Err(SummaryError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let store = Arc::new(MemoryPostStore::new());
        store
            .insert_if_absent(&sample_post("https://example.com/a"))
            .await
            .unwrap();
        let llm = Arc::new(StubLlm {
            fail: true,
            ..StubLlm::default()
        });
        let summarizer = Summarizer::new(QueryService::new(store), llm);
        assert!(matches!(
            summarizer.summarize(1).await,
            Err(SummaryError::Llm(_))
        ));
    }
}
