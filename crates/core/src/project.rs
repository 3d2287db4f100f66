//! Quote-readiness of the collected project description.
//!
//! Field presence is not enough to quote: "AI stuff" is present but useless.
//! Budget and timeline only ever produce suggestions, never block.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::domain::lead::{ExtractedLeadFields, LeadField};

pub const MIN_PROBLEM_TEXT_CHARS: usize = 20;
pub const MIN_PROBLEM_TEXT_WORDS: usize = 3;
pub const MIN_AUTOMATION_AREA_CHARS: usize = 10;
pub const MIN_AUTOMATION_AREA_WORDS: usize = 2;

/// Budget value the chat UI records when the visitor has none in mind.
pub const NO_BUDGET_SENTINEL: &str = "No budget yet";
/// Timeline value the chat UI records when the visitor has no deadline.
pub const FLEXIBLE_TIMELINE_SENTINEL: &str = "Flexible";

const VAGUE_MIN_CHARS: usize = 15;
const VAGUE_PHRASE_MAX_CHARS: usize = 30;

const VAGUE_PHRASES: &[&str] = &[
    "automation",
    "ai stuff",
    "help me",
    "not sure",
    "i don't know",
    "something",
    "anything",
    "whatever",
    "just automate",
    "make it better",
    "improve",
    "optimize",
    "fix",
    "build something",
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProjectScore {
    pub is_valid: bool,
    pub missing_fields: Vec<LeadField>,
    pub low_quality_fields: Vec<LeadField>,
    /// One follow-up prompt per deficient field, usable verbatim as the next turn.
    pub suggestions: Vec<String>,
}

pub fn score_project(fields: &ExtractedLeadFields) -> ProjectScore {
    let mut score = ProjectScore::default();

    match non_blank(fields.problem_text.as_deref()) {
        None => {
            score.missing_fields.push(LeadField::ProblemText);
            score
                .suggestions
                .push("What specific challenge or problem are you trying to solve?".to_string());
        }
        Some(problem) if problem.chars().count() < MIN_PROBLEM_TEXT_CHARS => {
            score.low_quality_fields.push(LeadField::ProblemText);
            score.suggestions.push(
                "Can you tell me more about the problem? What's the context? Why is it important?"
                    .to_string(),
            );
        }
        Some(_) => {}
    }

    match non_blank(fields.automation_area.as_deref()) {
        None => {
            score.missing_fields.push(LeadField::AutomationArea);
            score.suggestions.push(
                "What type of solution are you looking for? (e.g., payment automation, chatbot, CRM integration)"
                    .to_string(),
            );
        }
        Some(area) if area.chars().count() < MIN_AUTOMATION_AREA_CHARS => {
            score.low_quality_fields.push(LeadField::AutomationArea);
            score.suggestions.push(
                "What kind of automation exactly? Give me more details about what it should do."
                    .to_string(),
            );
        }
        Some(_) => {}
    }

    if !has_budget(fields) {
        score.suggestions.push(
            "Do you have a ballpark budget in mind? Even a rough range helps me tailor the proposal."
                .to_string(),
        );
    }

    if !has_timeline(fields) {
        score
            .suggestions
            .push("When do you need this live? (e.g., 1 month, 3 months, urgent)".to_string());
    }

    score.is_valid = score.missing_fields.is_empty() && score.low_quality_fields.is_empty();
    score
}

/// Coarse 0-100 ranking score: 60 points for the critical fields, 40 for the soft ones.
pub fn score_completeness(fields: &ExtractedLeadFields) -> u8 {
    let mut score = 0u8;

    if has_enough_detail(
        fields.problem_text.as_deref(),
        MIN_PROBLEM_TEXT_CHARS,
        MIN_PROBLEM_TEXT_WORDS,
    ) {
        score += 30;
    }
    if has_enough_detail(
        fields.automation_area.as_deref(),
        MIN_AUTOMATION_AREA_CHARS,
        MIN_AUTOMATION_AREA_WORDS,
    ) {
        score += 30;
    }
    if has_budget(fields) {
        score += 15;
    }
    if has_timeline(fields) {
        score += 15;
    }
    if fields.tools_used.as_ref().is_some_and(|tools| !tools.is_empty()) {
        score += 10;
    }

    score
}

pub fn has_enough_detail(text: Option<&str>, min_chars: usize, min_words: usize) -> bool {
    let Some(cleaned) = non_blank(text) else {
        return false;
    };
    cleaned.chars().count() >= min_chars && cleaned.split_whitespace().count() >= min_words
}

pub fn is_vague_response(text: Option<&str>) -> bool {
    let Some(text) = text else {
        return true;
    };

    let cleaned = text.trim().to_lowercase();
    let length = cleaned.chars().count();
    if length < VAGUE_MIN_CHARS {
        return true;
    }

    VAGUE_PHRASES.iter().any(|phrase| {
        cleaned == *phrase || (cleaned.contains(phrase) && length < VAGUE_PHRASE_MAX_CHARS)
    })
}

pub fn follow_up_question<R: Rng + ?Sized>(field: LeadField, rng: &mut R) -> &'static str {
    let pool: &[&'static str] = match field {
        LeadField::ProblemText => &[
            "I'm intrigued! But I need more context. What's the full picture? What happens now that you want to change?",
            "Tell me more about this challenge. What's painful about the current way you're doing it?",
            "Let's dig deeper. What problem keeps you up at night? What would success look like?",
        ],
        LeadField::AutomationArea => &[
            "What kind of automation are we talking about? Payment flows? Customer service? Data entry? Give me specifics.",
            "I need to know what type of system you're envisioning. Is it a chatbot? A workflow automation? An AI agent?",
            "What exactly should this thing DO? Walk me through the ideal scenario.",
        ],
        LeadField::BudgetRange => &[
            "Do you have a rough budget in mind? Even a ballpark helps me design the right solution.",
            "What's your investment range? $5k? $20k? $50k+? Just so I know what scale we're playing at.",
        ],
        LeadField::Timeline => &[
            "When do you need this live? Next month? 3 months? Yesterday? (That last one's tricky, but I can try.)",
            "What's your timeline looking like? Rush job or methodical rollout?",
        ],
        _ => &["Tell me more about that."],
    };

    pool.choose(rng).copied().unwrap_or("Tell me more about that.")
}

fn has_budget(fields: &ExtractedLeadFields) -> bool {
    non_blank(fields.budget_range.as_deref()).is_some_and(|budget| budget != NO_BUDGET_SENTINEL)
}

fn has_timeline(fields: &ExtractedLeadFields) -> bool {
    non_blank(fields.timeline.as_deref())
        .is_some_and(|timeline| timeline != FLEXIBLE_TIMELINE_SENTINEL)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
