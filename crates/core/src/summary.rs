//! Deterministic conversation digest.
//!
//! Not a second model call: the digest only has to keep the anchor facts
//! alive once the window selector starts dropping old turns.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::conversation::{Role, Turn};

/// Summaries fire every time the transcript length hits a multiple of this.
pub const SUMMARIZATION_INTERVAL: usize = 20;

const INITIAL_REQUEST_EXCERPT_CHARS: usize = 100;

pub fn needs_summarization(turns: &[Turn]) -> bool {
    let length = turns.len();
    length >= SUMMARIZATION_INTERVAL && length % SUMMARIZATION_INTERVAL == 0
}

pub fn summarize(turns: &[Turn]) -> String {
    let mut parts = Vec::with_capacity(3);

    let first_user_turn = turns.iter().find(|turn| turn.role == Role::User);
    if let Some(turn) = first_user_turn {
        parts.push(format!("Initial request: {}", excerpt(&turn.plain_text())));
    }

    parts.push(format!("Total exchanges: {}", turns.len() / 2));

    let has_contact_info = turns
        .iter()
        .filter(|turn| turn.role == Role::User)
        .any(|turn| mentions_contact_info(&turn.plain_text()));
    parts.push(
        if has_contact_info {
            "Contact information collected"
        } else {
            "Contact information not yet collected"
        }
        .to_string(),
    );

    parts.join(". ")
}

fn excerpt(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(INITIAL_REQUEST_EXCERPT_CHARS) {
        Some((byte_index, _)) => format!("{}...", trimmed[..byte_index].trim_end()),
        None => trimmed.to_string(),
    }
}

fn mentions_contact_info(content: &str) -> bool {
    if content.to_lowercase().contains("email") {
        return true;
    }
    match email_pattern() {
        Some(pattern) => pattern.is_match(content),
        None => content.contains('@'),
    }
}

pub(crate) fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").ok())
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::{needs_summarization, summarize};
    use crate::domain::conversation::Turn;

    fn alternating(count: usize) -> Vec<Turn> {
        (0..count)
            .map(|index| {
                if index % 2 == 0 {
                    Turn::user(format!("Message {index}"))
                } else {
                    Turn::assistant(format!("Message {index}"))
                }
            })
            .collect()
    }

    #[test]
    fn fires_only_on_multiples_of_twenty() {
        for length in 0..20 {
            assert!(!needs_summarization(&alternating(length)), "length {length}");
        }
        assert!(needs_summarization(&alternating(20)));
        assert!(!needs_summarization(&alternating(21)));
        assert!(!needs_summarization(&alternating(39)));
        assert!(needs_summarization(&alternating(40)));
    }

    #[test]
    fn digest_reports_anchor_facts() {
        let turns = vec![
            Turn::user("Hello, I need help with automation"),
            Turn::assistant("Happy to help!"),
            Turn::user("My email is test@company.io"),
        ];
        let summary = summarize(&turns);

        assert!(summary.contains("Initial request: Hello, I need help with automation"));
        assert!(summary.contains("Total exchanges: 1"));
        assert!(summary.contains("Contact information collected"));
    }

    #[test]
    fn assistant_mentions_of_email_do_not_count() {
        let turns = vec![
            Turn::user("We run a bakery"),
            Turn::assistant("What's your email address?"),
        ];
        assert!(summarize(&turns).contains("Contact information not yet collected"));
    }

    #[test]
    fn long_initial_request_is_clipped() {
        let turns = vec![Turn::user("x".repeat(250))];
        let summary = summarize(&turns);
        assert!(summary.contains(&format!("Initial request: {}...", "x".repeat(100))));
        assert!(!summary.contains(&"x".repeat(101)));
    }

    #[test]
    fn empty_transcript_still_summarizes() {
        assert_eq!(
            summarize(&[]),
            "Total exchanges: 0. Contact information not yet collected"
        );
    }
}
