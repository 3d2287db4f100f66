use anyhow::{Context, Result};
use async_trait::async_trait;
use telos_core::domain::conversation::{ChatMessage, Turn};
use telos_core::domain::lead::ExtractedLeadFields;

use crate::prompts::HALLUCINATION_PREVENTION_PROMPT;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Pulls structured lead data out of a transcript. Output is unverified.
#[async_trait]
pub trait LeadExtractor: Send + Sync {
    async fn extract(&self, turns: &[Turn]) -> Result<ExtractedLeadFields>;
}

pub const EXTRACTION_INSTRUCTIONS: &str = r#"Extract lead information from this conversation. Return JSON with:
{
  "name": "string or null",
  "email": "string or null",
  "company": "string or null",
  "role": "string or null",
  "industry": "string or null",
  "problem_text": "string or null",
  "automation_area": "string or null",
  "tools_used": ["array of tool names"],
  "budget_range": "string or null",
  "timeline": "string or null",
  "urgency": "string or null",
  "interest_level": "number 1-10 or null"
}
Only include fields mentioned in the conversation. Use null for unknown values."#;

/// Extraction through a second completion call that is asked for JSON.
pub struct CompletionExtractor<C> {
    client: C,
}

impl<C: LlmClient> CompletionExtractor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn system_prompt() -> String {
        format!("{EXTRACTION_INSTRUCTIONS}\n\n{HALLUCINATION_PREVENTION_PROMPT}")
    }
}

#[async_trait]
impl<C: LlmClient> LeadExtractor for CompletionExtractor<C> {
    async fn extract(&self, turns: &[Turn]) -> Result<ExtractedLeadFields> {
        let messages: Vec<ChatMessage> = turns.iter().map(Turn::as_message).collect();
        let raw = self.client.complete(&Self::system_prompt(), &messages).await?;
        parse_extraction(&raw)
    }
}

/// Accepts a bare JSON object or one wrapped in a markdown code fence.
pub fn parse_extraction(raw: &str) -> Result<ExtractedLeadFields> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).context("extraction response was not a lead JSON object")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use telos_core::domain::conversation::{ChatMessage, Turn};

    use super::{parse_extraction, CompletionExtractor, LeadExtractor, LlmClient};

    struct CannedClient {
        reply: String,
        seen_system_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, system_prompt: &str, _messages: &[ChatMessage]) -> Result<String> {
            if let Ok(mut seen) = self.seen_system_prompt.lock() {
                *seen = Some(system_prompt.to_string());
            }
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn parses_fenced_json() {
        let fields = parse_extraction("```json\n{\"name\": \"Ada\", \"email\": null}\n```")
            .expect("fenced payload should parse");
        assert_eq!(fields.name.as_deref(), Some("Ada"));
        assert!(fields.email.is_none());
    }

    #[test]
    fn keeps_extraction_when_interest_level_is_quoted() {
        let fields = parse_extraction(r#"{"company": "Lumen Logistics", "interest_level": "7"}"#)
            .expect("quoted score should not sink the extraction");
        assert_eq!(fields.company.as_deref(), Some("Lumen Logistics"));
        assert_eq!(fields.interest_level, Some(7));

        let fields = parse_extraction(r#"{"interest_level": 7.5}"#).expect("fractional score");
        assert_eq!(fields.interest_level, Some(8));
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_extraction("I could not find any details.").is_err());
    }

    #[tokio::test]
    async fn completion_extractor_sends_guarded_prompt() {
        let client = CannedClient {
            reply: r#"{"company": "Lumen Logistics", "interest_level": 7}"#.to_string(),
            seen_system_prompt: Mutex::new(None),
        };
        let extractor = CompletionExtractor::new(client);
        let fields = extractor
            .extract(&[Turn::user("We are Lumen Logistics")])
            .await
            .expect("extraction should succeed");

        assert_eq!(fields.company.as_deref(), Some("Lumen Logistics"));
        assert_eq!(fields.interest_level, Some(7));
        let prompt = extractor.client.seen_system_prompt.lock().expect("lock").clone();
        assert!(prompt.is_some_and(|prompt| prompt.contains("DO NOT HALLUCINATE")));
    }
}
