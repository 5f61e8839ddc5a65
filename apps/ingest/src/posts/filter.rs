use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::posts::models::NewPost;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Title must contain one of these (case-insensitive). Empty accepts every title.
    pub keywords: Vec<String>,
    pub nsfw_tags: Vec<String>,
    pub max_title_length: usize,
    pub min_score: i64,
    pub min_comments: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            nsfw_tags: vec!["nsfw".to_string(), "nsfl".to_string(), "18+".to_string()],
            max_title_length: 500,
            min_score: 0,
            min_comments: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    TitleTooLong,
    Nsfw,
    BelowMinScore,
    TooFewComments,
    NoKeywordMatch,
}

/// Quality gate applied to canonical posts before they are written.
#[derive(Debug, Clone)]
pub struct PostFilter {
    config: FilterConfig,
    keywords: Vec<String>,
    nsfw_tags: Vec<String>,
}

impl PostFilter {
    pub fn new(config: FilterConfig) -> Self {
        let keywords = config.keywords.iter().map(|k| k.to_lowercase()).collect();
        let nsfw_tags = config.nsfw_tags.iter().map(|t| t.to_lowercase()).collect();
        Self {
            config,
            keywords,
            nsfw_tags,
        }
    }

    /// Returns the first rule the post fails, or `None` if it passes.
    pub fn check(&self, post: &NewPost) -> Option<FilterReason> {
        let title = post.title.to_lowercase();

        let reason = if post.title.chars().count() > self.config.max_title_length {
            Some(FilterReason::TitleTooLong)
        } else if post.over_18 || self.nsfw_tags.iter().any(|t| title.contains(t.as_str())) {
            Some(FilterReason::Nsfw)
        } else if post.score < self.config.min_score {
            Some(FilterReason::BelowMinScore)
        } else if post.comments < self.config.min_comments {
            Some(FilterReason::TooFewComments)
        } else if !self.keywords.is_empty()
            && !self.keywords.iter().any(|k| title.contains(k.as_str()))
        {
            Some(FilterReason::NoKeywordMatch)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!("Post {} filtered out: {:?}", post.url, reason);
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::models::tests::sample_post;

    #[test]
    fn test_default_filter_accepts_ordinary_post() {
        let filter = PostFilter::new(FilterConfig::default());
        assert_eq!(filter.check(&sample_post("https://example.com/a")), None);
    }

    #[test]
    fn test_nsfw_title_tag() {
        let filter = PostFilter::new(FilterConfig::default());
        let mut post = sample_post("https://example.com/a");
        post.title = "Something [NSFW]".to_string();
        assert_eq!(filter.check(&post), Some(FilterReason::Nsfw));
    }

    #[test]
    fn test_over_18_flag() {
        let filter = PostFilter::new(FilterConfig::default());
        let mut post = sample_post("https://example.com/a");
        post.over_18 = true;
        assert_eq!(filter.check(&post), Some(FilterReason::Nsfw));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let filter = PostFilter::new(FilterConfig {
            keywords: vec!["Rust".to_string(), "compiler".to_string()],
            ..FilterConfig::default()
        });
        let mut post = sample_post("https://example.com/a");
        post.title = "Why RUST is great".to_string();
        assert_eq!(filter.check(&post), None);
        post.title = "Cooking with cast iron".to_string();
        assert_eq!(filter.check(&post), Some(FilterReason::NoKeywordMatch));
    }

    #[test]
    fn test_thresholds() {
        let filter = PostFilter::new(FilterConfig {
            min_score: 50,
            min_comments: 30,
            ..FilterConfig::default()
        });
        let mut post = sample_post("https://example.com/a");
        post.score = 49;
        assert_eq!(filter.check(&post), Some(FilterReason::BelowMinScore));
        post.score = 50;
        assert_eq!(filter.check(&post), Some(FilterReason::TooFewComments));
        post.comments = 30;
        assert_eq!(filter.check(&post), None);
    }

    #[test]
    fn test_title_length() {
        let filter = PostFilter::new(FilterConfig {
            max_title_length: 10,
            ..FilterConfig::default()
        });
        let mut post = sample_post("https://example.com/a");
        post.title = "x".repeat(11);
        assert_eq!(filter.check(&post), Some(FilterReason::TitleTooLong));
    }
}
