// Prompts for post summarization.

use crate::posts::models::{Post, TopComment};

pub const SUMMARY_SYSTEM: &str = "You summarize Reddit discussions for a technical newsletter. \
    Write plain prose without markdown headings or bullet lists. \
    Do not invent details that are not in the post or its comments.";

/// Top comments included in a summary prompt.
pub const MAX_PROMPT_COMMENTS: usize = 5;
const MAX_BODY_CHARS: usize = 4000;
const MAX_COMMENT_CHARS: usize = 500;

pub fn build_summary_prompt(post: &Post) -> String {
    let mut prompt = format!(
        "Summarize the following post from r/{} in two or three sentences. \
         Capture the main point and, if comments are included, the general reaction.\n\n\
         Title: {}\n",
        post.subreddit, post.title
    );

    if let Some(body) = post.post_text.as_deref().filter(|b| !b.trim().is_empty()) {
        prompt.push_str("\nPost text:\n");
        prompt.push_str(&truncate_chars(body.trim(), MAX_BODY_CHARS));
        prompt.push('\n');
    }

    let comments = comments_text(post);
    if !comments.is_empty() {
        prompt.push_str("\nTop comments:\n");
        prompt.push_str(&comments);
    }

    prompt
}

fn comments_text(post: &Post) -> String {
    let Some(value) = post.top_comments.as_ref() else {
        return String::new();
    };
    let comments: Vec<TopComment> = match serde_json::from_value(value.clone()) {
        Ok(c) => c,
        Err(_) => return String::new(),
    };

    comments
        .iter()
        .filter(|c| !c.body.trim().is_empty())
        .take(MAX_PROMPT_COMMENTS)
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. ({} points) {}\n",
                i + 1,
                c.score,
                truncate_chars(c.body.trim(), MAX_COMMENT_CHARS)
            )
        })
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
