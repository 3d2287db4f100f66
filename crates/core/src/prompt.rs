use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::conversation::{ChatMessage, Role, Turn};
use crate::tokens::{TokenAccountant, TokenBudget};

pub const SUMMARY_PREFIX: &str = "Previous conversation context: ";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub system_tokens: usize,
    pub summary_tokens: usize,
    pub history_tokens: usize,
    pub total_tokens: usize,
    pub budget_limit: usize,
}

impl TokenUsage {
    pub fn is_over_budget(&self) -> bool {
        self.total_tokens > self.budget_limit
    }
}

/// Arguments for one `complete(system_prompt, messages)` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreparedPrompt {
    pub system_prompt: String,
    /// Optional summary message followed by the selected history window.
    pub messages: Vec<ChatMessage>,
    pub usage: TokenUsage,
    pub summary_included: bool,
    pub history_turns: usize,
    pub turns_dropped: usize,
}

#[derive(Clone, Debug, Default)]
pub struct PromptAssembler {
    accountant: TokenAccountant,
    budget: TokenBudget,
}

impl PromptAssembler {
    pub fn new(accountant: TokenAccountant, budget: TokenBudget) -> Self {
        Self { accountant, budget }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    pub fn accountant(&self) -> &TokenAccountant {
        &self.accountant
    }

    /// Builds the bounded payload. Budget overruns are logged; the payload is
    /// still produced.
    pub fn assemble(
        &self,
        system_prompt: &str,
        history: &[Turn],
        summary: Option<&str>,
    ) -> PreparedPrompt {
        let raw_system_tokens = self.accountant.estimate_tokens(system_prompt);
        if raw_system_tokens > self.budget.system_prompt {
            warn!(
                event_name = "pipeline.budget.system_prompt_overrun",
                system_tokens = raw_system_tokens,
                budget = self.budget.system_prompt,
                "system prompt exceeds its token budget"
            );
        }
        let system_tokens = self.accountant.estimate_content_tokens(system_prompt);

        let mut messages = Vec::new();
        let mut summary_tokens = 0;
        let mut summary_included = false;
        if let Some(summary) = summary.filter(|summary| !summary.trim().is_empty()) {
            let raw_summary_tokens = self.accountant.estimate_tokens(summary);
            if raw_summary_tokens <= self.budget.context_summary {
                let content = format!("{SUMMARY_PREFIX}{summary}");
                summary_tokens = self.accountant.estimate_content_tokens(&content);
                messages.push(ChatMessage::new(Role::System, content));
                summary_included = true;
            } else {
                debug!(
                    event_name = "pipeline.budget.summary_skipped",
                    summary_tokens = raw_summary_tokens,
                    budget = self.budget.context_summary,
                    "conversation summary does not fit its budget, omitting it"
                );
            }
        }

        let history_budget = i64::try_from(self.budget.conversation_history).unwrap_or(i64::MAX);
        let window = self.accountant.select_window(history, history_budget);
        let history_tokens = self.accountant.window_cost(window);
        messages.extend(window.iter().map(Turn::as_message));

        let usage = TokenUsage {
            system_tokens,
            summary_tokens,
            history_tokens,
            total_tokens: system_tokens + summary_tokens + history_tokens,
            budget_limit: self.budget.total,
        };

        if usage.is_over_budget() {
            warn!(
                event_name = "pipeline.budget.total_overrun",
                total_tokens = usage.total_tokens,
                budget = usage.budget_limit,
                "assembled prompt exceeds total token budget"
            );
        } else {
            debug!(
                event_name = "pipeline.budget.usage",
                total_tokens = usage.total_tokens,
                budget = usage.budget_limit,
                "assembled prompt within budget"
            );
        }

        PreparedPrompt {
            system_prompt: system_prompt.to_string(),
            messages,
            usage,
            summary_included,
            history_turns: window.len(),
            turns_dropped: history.len() - window.len(),
        }
    }
}
