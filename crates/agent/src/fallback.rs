//! Scripted replies used when the model call fails.
//!
//! The script walks the visitor through the same questions the prompt asks for,
//! keyed by how many turns precede the new message. Each step records the
//! answer to the previous question.

use telos_core::domain::conversation::{Role, Turn};
use telos_core::domain::lead::{ExtractedLeadFields, LeadStatus};
use telos_core::sanitize::sanitize_input;

pub const GENERIC_FALLBACK_REPLY: &str =
    "Thanks for the information! Could you tell me more about your automation needs?";

const OPPORTUNITIES_REPLY: &str = "Perfect! Based on our conversation, I've identified several \
automation opportunities for your business:\n\n\
1. Process automation for repetitive tasks\n\
2. Data integration between your current tools\n\
3. AI-powered insights and reporting\n\n\
Typical results for businesses like yours:\n\
- 15-25 hours saved per week\n\
- 40-60% reduction in manual errors\n\
- ROI within 3-6 months\n\n\
Our team will reach out within 24 hours with a personalized automation roadmap. \
Can I get your email?";

const OPPORTUNITY_INTEREST_LEVEL: i64 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackReply {
    pub reply: String,
    pub fields: ExtractedLeadFields,
    pub status: Option<LeadStatus>,
}

impl FallbackReply {
    fn plain(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), fields: ExtractedLeadFields::default(), status: None }
    }

    fn with_fields(reply: impl Into<String>, fields: ExtractedLeadFields) -> Self {
        Self { reply: reply.into(), fields, status: None }
    }
}

/// `message_count` is the number of turns before `message`, which is the
/// visitor's text as typed. Recorded fields keep it verbatim; replies that
/// echo it escape it again.
pub fn fallback_reply(message_count: usize, message: &str, history: &[Turn]) -> FallbackReply {
    let answer = message.trim();
    let text = || Some(answer.to_string());
    let echoed = sanitize_input(answer);

    match message_count {
        0 => FallbackReply::with_fields(
            format!("Nice to meet you, {echoed}! What company do you work for?"),
            ExtractedLeadFields { name: text(), ..ExtractedLeadFields::default() },
        ),
        2 => FallbackReply::with_fields(
            format!("Great! What's your role at {echoed}?"),
            ExtractedLeadFields { company: text(), ..ExtractedLeadFields::default() },
        ),
        4 => FallbackReply::with_fields(
            "Interesting! What's the biggest challenge you're facing that automation could help solve?",
            ExtractedLeadFields { role: text(), ..ExtractedLeadFields::default() },
        ),
        6 => FallbackReply::with_fields(
            "I understand. That's a common challenge. What tools or systems are you currently using?",
            ExtractedLeadFields { problem_text: text(), ..ExtractedLeadFields::default() },
        ),
        8 => FallbackReply::with_fields(
            "Thanks for sharing! On a scale of 1-10, how urgent is it to solve this problem?",
            ExtractedLeadFields {
                tools_used: Some(split_tools(answer)),
                ..ExtractedLeadFields::default()
            },
        ),
        10 => FallbackReply::with_fields(
            "Got it. Based on what you've told me, I can see several automation opportunities. \
             What's your budget range for automation solutions? \
             (e.g., <$5k, $5k-$20k, $20k-$50k, >$50k)",
            ExtractedLeadFields { urgency: text(), ..ExtractedLeadFields::default() },
        ),
        12 => FallbackReply::with_fields(
            OPPORTUNITIES_REPLY,
            ExtractedLeadFields {
                budget_range: text(),
                interest_level: Some(OPPORTUNITY_INTEREST_LEVEL),
                ..ExtractedLeadFields::default()
            },
        ),
        14 => {
            let name = history
                .iter()
                .find(|turn| turn.role == Role::User)
                .map(|turn| sanitize_input(turn.plain_text().trim()))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "there".to_string());
            FallbackReply {
                reply: format!(
                    "Excellent! Thanks {name}! I've sent your information to our team. \
                     You'll receive:\n\n\
                     1. A detailed automation analysis within 24 hours\n\
                     2. Custom recommendations for your workflow\n\
                     3. Estimated ROI projections\n\n\
                     We're excited to help you automate and scale! Talk soon!"
                ),
                fields: ExtractedLeadFields { email: text(), ..ExtractedLeadFields::default() },
                status: Some(LeadStatus::Qualified),
            }
        }
        _ => FallbackReply::plain(GENERIC_FALLBACK_REPLY),
    }
}

fn split_tools(answer: &str) -> Vec<String> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|tool| !tool.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use telos_core::domain::conversation::Turn;
    use telos_core::domain::lead::LeadStatus;

    use super::{fallback_reply, GENERIC_FALLBACK_REPLY};

    #[test]
    fn opening_message_is_taken_as_name() {
        let fallback = fallback_reply(0, "Priya", &[]);
        assert_eq!(fallback.reply, "Nice to meet you, Priya! What company do you work for?");
        assert_eq!(fallback.fields.name.as_deref(), Some("Priya"));
        assert!(fallback.status.is_none());
    }

    #[test]
    fn recorded_answer_is_verbatim_but_echo_is_escaped() {
        let fallback = fallback_reply(2, "Smith & Sons", &[]);
        assert_eq!(fallback.fields.company.as_deref(), Some("Smith & Sons"));
        assert_eq!(fallback.reply, "Great! What's your role at Smith &amp; Sons?");
    }

    #[test]
    fn tools_answer_is_split_on_commas() {
        let fallback = fallback_reply(8, "HubSpot, Google Sheets , ,Zapier", &[]);
        assert_eq!(
            fallback.fields.tools_used,
            Some(vec!["HubSpot".to_string(), "Google Sheets".to_string(), "Zapier".to_string()])
        );
    }

    #[test]
    fn budget_step_records_interest() {
        let fallback = fallback_reply(12, "$5k-$20k", &[]);
        assert_eq!(fallback.fields.budget_range.as_deref(), Some("$5k-$20k"));
        assert_eq!(fallback.fields.interest_level, Some(8));
        assert!(fallback.reply.ends_with("Can I get your email?"));
    }

    #[test]
    fn closing_step_thanks_first_speaker_and_qualifies() {
        let history = vec![Turn::user("Priya"), Turn::assistant("Nice to meet you")];
        let fallback = fallback_reply(14, "priya@lumenlogistics.io", &history);

        assert!(fallback.reply.starts_with("Excellent! Thanks Priya!"));
        assert_eq!(fallback.fields.email.as_deref(), Some("priya@lumenlogistics.io"));
        assert_eq!(fallback.status, Some(LeadStatus::Qualified));
    }

    #[test]
    fn closing_step_without_history_uses_generic_greeting() {
        assert!(fallback_reply(14, "a@b.io", &[]).reply.starts_with("Excellent! Thanks there!"));
    }

    #[test]
    fn off_script_counts_ask_for_more_detail() {
        for count in [1, 3, 15, 40] {
            let fallback = fallback_reply(count, "anything", &[]);
            assert_eq!(fallback.reply, GENERIC_FALLBACK_REPLY);
            assert!(fallback.fields.is_empty());
        }
    }
}
