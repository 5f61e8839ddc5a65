//! Prometheus counters for Reddit listing requests, rendered in the text
//! exposition format by `GET /metrics`.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Duration;

use crate::reddit::ListingMode;

/// Upper bounds (seconds) of the duration histogram.
const BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Default, Clone)]
struct Series {
    requests: u64,
    // Non-cumulative: index i counts observations in (BUCKETS[i-1], BUCKETS[i]].
    buckets: [u64; BUCKETS.len()],
    sum_secs: f64,
}

#[derive(Debug, Default)]
pub struct RedditMetrics {
    series: Mutex<BTreeMap<(String, &'static str), Series>>,
}

impl RedditMetrics {
    /// Counts one listing request and its duration, whatever its outcome.
    pub fn record(&self, subreddit: &str, mode: ListingMode, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let mut series = match self.series.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = series
            .entry((subreddit.to_ascii_lowercase(), mode.as_str()))
            .or_default();
        entry.requests += 1;
        entry.sum_secs += secs;
        if let Some(idx) = BUCKETS.iter().position(|le| secs <= *le) {
            entry.buckets[idx] += 1;
        }
    }

    pub fn requests(&self, subreddit: &str, mode: ListingMode) -> u64 {
        self.snapshot()
            .get(&(subreddit.to_ascii_lowercase(), mode.as_str()))
            .map_or(0, |s| s.requests)
    }

    fn snapshot(&self) -> BTreeMap<(String, &'static str), Series> {
        match self.series.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn render(&self) -> String {
        let series = self.snapshot();
        let mut out = String::new();

        out.push_str("# HELP reddit_requests_total Total number of requests to Reddit API\n");
        out.push_str("# TYPE reddit_requests_total counter\n");
        for ((subreddit, mode), s) in &series {
            let _ = writeln!(
                out,
                "reddit_requests_total{{{}}} {}",
                labels(subreddit, mode),
                s.requests
            );
        }

        out.push_str("# HELP reddit_request_duration_seconds Duration of Reddit API requests\n");
        out.push_str("# TYPE reddit_request_duration_seconds histogram\n");
        for ((subreddit, mode), s) in &series {
            let labels = labels(subreddit, mode);
            let mut cumulative = 0;
            for (le, count) in BUCKETS.iter().zip(s.buckets.iter()) {
                cumulative += count;
                let _ = writeln!(
                    out,
                    "reddit_request_duration_seconds_bucket{{{labels},le=\"{le}\"}} {cumulative}"
                );
            }
            let _ = writeln!(
                out,
                "reddit_request_duration_seconds_bucket{{{labels},le=\"+Inf\"}} {}",
                s.requests
            );
            let _ = writeln!(
                out,
                "reddit_request_duration_seconds_sum{{{labels}}} {}",
                s.sum_secs
            );
            let _ = writeln!(
                out,
                "reddit_request_duration_seconds_count{{{labels}}} {}",
                s.requests
            );
        }
        out
    }
}

fn labels(subreddit: &str, mode: &str) -> String {
    format!(
        "subreddit=\"{}\",mode=\"{}\"",
        escape(subreddit),
        escape(mode)
    )
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
