//! Token accounting for the language-model payload.
//!
//! Estimates are allowed to be wrong; they are never allowed to fail. Any
//! tokenizer error degrades to a `ceil(chars / 4)` character heuristic.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::conversation::{Role, Turn};

/// Per-message formatting cost (role marker, separators).
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

pub const CHARS_PER_TOKEN: usize = 4;

const DEFAULT_MAX_INPUT_BYTES: usize = 256 * 1024;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("input of {len} bytes exceeds the tokenizer limit of {limit} bytes")]
    InputTooLarge { len: usize, limit: usize },
    #[error("tokenizer unavailable: {0}")]
    Unavailable(String),
}

pub trait Tokenizer: Send + Sync {
    fn encode_len(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// Approximates BPE tokenization: every alphanumeric run costs one token per
/// four characters (minimum one), every other non-space character costs one.
#[derive(Clone, Debug)]
pub struct WordPieceTokenizer {
    max_input_bytes: usize,
}

impl WordPieceTokenizer {
    pub fn new(max_input_bytes: usize) -> Self {
        Self { max_input_bytes }
    }
}

impl Default for WordPieceTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_BYTES)
    }
}

impl Tokenizer for WordPieceTokenizer {
    fn encode_len(&self, text: &str) -> Result<usize, TokenizerError> {
        if text.len() > self.max_input_bytes {
            return Err(TokenizerError::InputTooLarge {
                len: text.len(),
                limit: self.max_input_bytes,
            });
        }

        let mut tokens = 0usize;
        let mut run = 0usize;
        for character in text.chars() {
            if character.is_alphanumeric() {
                run += 1;
                continue;
            }
            tokens = tokens.saturating_add(run.div_ceil(CHARS_PER_TOKEN));
            run = 0;
            if !character.is_whitespace() {
                tokens = tokens.saturating_add(1);
            }
        }

        Ok(tokens.saturating_add(run.div_ceil(CHARS_PER_TOKEN)))
    }
}

pub fn fallback_estimate(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Named sub-budgets for one model request.
///
/// `system_prompt + context_summary + conversation_history <= total` is a soft
/// target: breaking it is logged, never rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub system_prompt: usize,
    pub context_summary: usize,
    pub conversation_history: usize,
    pub total: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self { system_prompt: 1500, context_summary: 600, conversation_history: 3000, total: 5100 }
    }
}

impl TokenBudget {
    pub fn sub_budget_sum(&self) -> usize {
        self.system_prompt
            .saturating_add(self.context_summary)
            .saturating_add(self.conversation_history)
    }

    pub fn is_consistent(&self) -> bool {
        self.sub_budget_sum() <= self.total
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    pub total_messages: usize,
    pub total_tokens: usize,
    pub average_tokens_per_message: usize,
    pub user_tokens: usize,
    pub assistant_tokens: usize,
}

#[derive(Clone)]
pub struct TokenAccountant {
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for TokenAccountant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAccountant").finish_non_exhaustive()
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::with_tokenizer(Arc::new(WordPieceTokenizer::default()))
    }
}

impl TokenAccountant {
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        match self.tokenizer.encode_len(text) {
            Ok(tokens) => tokens,
            Err(error) => {
                debug!(
                    event_name = "pipeline.tokens.fallback",
                    error = %error,
                    "tokenizer failed, using character heuristic"
                );
                fallback_estimate(text)
            }
        }
    }

    pub fn estimate_content_tokens(&self, content: &str) -> usize {
        self.estimate_tokens(content).saturating_add(MESSAGE_OVERHEAD_TOKENS)
    }

    pub fn estimate_message_tokens(&self, turn: &Turn) -> usize {
        self.estimate_content_tokens(&turn.content)
    }

    /// Longest suffix of `turns` whose cumulative cost stays within `max_tokens`.
    ///
    /// Walks backwards from the newest turn and stops at the first one that
    /// would overflow, so the result never has gaps.
    pub fn select_window<'a>(&self, turns: &'a [Turn], max_tokens: i64) -> &'a [Turn] {
        let Ok(limit) = usize::try_from(max_tokens) else {
            return &turns[turns.len()..];
        };

        let mut used = 0usize;
        let mut start = turns.len();
        for (index, turn) in turns.iter().enumerate().rev() {
            let cost = self.estimate_message_tokens(turn);
            match used.checked_add(cost) {
                Some(next) if next <= limit => {
                    used = next;
                    start = index;
                }
                _ => break,
            }
        }

        &turns[start..]
    }

    pub fn window_cost(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|turn| self.estimate_message_tokens(turn)).fold(0, usize::saturating_add)
    }

    pub fn stats(&self, turns: &[Turn]) -> TokenStats {
        let mut stats = TokenStats { total_messages: turns.len(), ..TokenStats::default() };

        for turn in turns {
            let cost = self.estimate_message_tokens(turn);
            match turn.role {
                Role::User => stats.user_tokens = stats.user_tokens.saturating_add(cost),
                Role::Assistant => {
                    stats.assistant_tokens = stats.assistant_tokens.saturating_add(cost)
                }
                Role::System => {}
            }
        }

        stats.total_tokens = stats.user_tokens.saturating_add(stats.assistant_tokens);
        if stats.total_messages > 0 {
            let average = stats.total_tokens as f64 / stats.total_messages as f64;
            stats.average_tokens_per_message = average.round() as usize;
        }
        stats
    }
}

/// Caps inbound user text at `max_chars` characters.
pub fn limit_message_length(message: &str, max_chars: usize) -> &str {
    match message.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &message[..byte_index],
        None => message,
    }
}
