use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Parameters of the ranking curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Hours after which a post ranks like one with half the engagement.
    pub half_life_hours: f64,
    /// Weight of one comment relative to one upvote.
    pub comment_weight: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            half_life_hours: 24.0,
            comment_weight: 0.5,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.half_life_hours.is_finite() && self.half_life_hours > 0.0) {
            return Err(format!(
                "half_life_hours must be positive, got {}",
                self.half_life_hours
            ));
        }
        if !(self.comment_weight.is_finite() && self.comment_weight >= 0.0) {
            return Err(format!(
                "comment_weight must be non-negative, got {}",
                self.comment_weight
            ));
        }
        Ok(())
    }
}

/// Engagement decayed by age, in log2 space.
///
/// `log2(1 + score + w·comments) - age / half_life` is the log of
/// engagement halved once per half-life. Working in log space keeps the
/// value strictly decreasing in age without underflowing to zero for old
/// posts. Negative inputs are treated as zero.
pub fn compute_normalized_score(
    score: i64,
    comments: i64,
    age: Duration,
    policy: &ScoringPolicy,
) -> f64 {
    let engagement =
        1.0 + score.max(0) as f64 + policy.comment_weight * comments.max(0) as f64;
    let age_hours = age.num_milliseconds().max(0) as f64 / 3_600_000.0;
    engagement.log2() - age_hours / policy.half_life_hours
}
