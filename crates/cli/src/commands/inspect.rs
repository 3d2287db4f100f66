//! Offline analysis of a saved transcript.
//!
//! Runs every pure stage of the per-turn pipeline (window selection,
//! summarization, guardrails, grounding, project scoring) against a file on
//! disk so operators can see why a conversation behaved the way it did.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use telos_agent::extraction::{
    verify_data_collection, CollectionReport, ExtractionValidator, ValidationVerdict,
    CONTACT_FIELDS,
};
use telos_agent::guardrails::{GuardrailVerdict, ResponseGuardrail};
use telos_agent::prompts::{prompt_source_from_config, PromptSource, DEFAULT_SYSTEM_PROMPT};
use telos_core::config::{AppConfig, LoadOptions};
use telos_core::domain::conversation::{Role, Turn};
use telos_core::domain::lead::{ExtractedLeadFields, LeadField};
use telos_core::email::{email_error_message, suggest_email_correction, validate_and_clean_email};
use telos_core::project::{
    follow_up_question, is_vague_response, score_completeness, score_project, ProjectScore,
};
use telos_core::prompt::{PromptAssembler, TokenUsage};
use telos_core::summary::{needs_summarization, summarize, SUMMARIZATION_INTERVAL};
use telos_core::tokens::{TokenAccountant, TokenStats};

use super::{block_on, CommandResult, EXIT_CONFIG_INVALID, EXIT_INPUT_INVALID};

const COMMAND: &str = "inspect";
/// Pins redirect selection so repeated runs print the same report.
const REDIRECT_SEED: u64 = 7;

/// Transcripts are stored either as a bare turn array or wrapped in `{ "turns": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Turns(Vec<Turn>),
    Wrapped { turns: Vec<Turn> },
}

impl TranscriptFile {
    fn into_turns(self) -> Vec<Turn> {
        match self {
            Self::Turns(turns) | Self::Wrapped { turns } => turns,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub turns: usize,
    pub stats: TokenStats,
    pub window: WindowReport,
    pub summary: SummaryReport,
    pub last_reply: Option<GuardrailVerdict>,
    pub collection: CollectionReport,
    pub extraction: Option<ExtractionReport>,
}

#[derive(Debug, Serialize)]
pub struct WindowReport {
    pub history_turns: usize,
    pub turns_dropped: usize,
    pub summary_included: bool,
    pub usage: TokenUsage,
}

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub due_now: bool,
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractionReport {
    pub validation: ValidationVerdict,
    pub grounded: ExtractedLeadFields,
    pub email: Option<EmailReport>,
    pub project: ProjectScore,
    pub problem_is_vague: bool,
    pub follow_ups: Vec<FollowUp>,
    pub completeness: u8,
}

#[derive(Debug, Serialize)]
pub struct EmailReport {
    pub cleaned: Option<String>,
    /// Hint the visitor would be shown for a rejected address.
    pub hint: Option<&'static str>,
    /// Likely intended address when the domain is a common typo.
    pub suggestion: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FollowUp {
    pub field: LeadField,
    pub question: &'static str,
}

pub fn run(transcript: &Path, extracted: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_INVALID,
            )
        }
    };

    let turns = match read_json::<TranscriptFile>(transcript) {
        Ok(file) => file.into_turns(),
        Err(message) => {
            return CommandResult::failure(COMMAND, "input", message, EXIT_INPUT_INVALID)
        }
    };
    let fields = match extracted.map(read_json::<ExtractedLeadFields>).transpose() {
        Ok(fields) => fields,
        Err(message) => {
            return CommandResult::failure(COMMAND, "input", message, EXIT_INPUT_INVALID)
        }
    };

    let system_prompt = resolve_prompt(&config);
    let report = inspect(&config, &system_prompt, &turns, fields.as_ref());
    CommandResult::report(COMMAND, &report, 0)
}

/// Pure core of the command, kept separate so it can be driven without files.
pub fn inspect(
    config: &AppConfig,
    system_prompt: &str,
    turns: &[Turn],
    extracted: Option<&ExtractedLeadFields>,
) -> InspectReport {
    let accountant = TokenAccountant::default();
    let assembler = PromptAssembler::new(accountant.clone(), config.budget);

    let summary_text = (turns.len() >= SUMMARIZATION_INTERVAL).then(|| summarize(turns));
    let prepared = assembler.assemble(system_prompt, turns, summary_text.as_deref());

    let guardrail = ResponseGuardrail::from(&config.guardrail);
    let mut rng = StdRng::seed_from_u64(REDIRECT_SEED);
    let last_reply = turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Assistant)
        .map(|turn| guardrail.validate_with_rng(&turn.content, &mut rng));

    let extraction = extracted.map(|fields| {
        let validation = ExtractionValidator::new().validate(fields, turns);
        let grounded = validation.grounded(fields);
        let project = score_project(&grounded);
        let follow_ups = project
            .missing_fields
            .iter()
            .chain(&project.low_quality_fields)
            .map(|&field| FollowUp { field, question: follow_up_question(field, &mut rng) })
            .collect();
        ExtractionReport {
            email: fields.email.as_deref().map(email_report),
            problem_is_vague: is_vague_response(grounded.problem_text.as_deref()),
            follow_ups,
            project,
            completeness: score_completeness(&grounded),
            grounded,
            validation,
        }
    });

    InspectReport {
        turns: turns.len(),
        stats: accountant.stats(turns),
        window: WindowReport {
            history_turns: prepared.history_turns,
            turns_dropped: prepared.turns_dropped,
            summary_included: prepared.summary_included,
            usage: prepared.usage,
        },
        summary: SummaryReport { due_now: needs_summarization(turns), text: summary_text },
        last_reply,
        collection: verify_data_collection(turns, &CONTACT_FIELDS),
        extraction,
    }
}

fn email_report(raw: &str) -> EmailReport {
    let cleaned = validate_and_clean_email(raw);
    let suggestion = suggest_email_correction(raw);
    EmailReport {
        hint: cleaned.is_none().then(|| email_error_message(raw)),
        suggestion: (suggestion != raw.trim().to_lowercase()).then_some(suggestion),
        cleaned,
    }
}

fn resolve_prompt(config: &AppConfig) -> String {
    let source = prompt_source_from_config(&config.chat);
    let loaded = block_on(async move { source.load().await })
        .and_then(|result| result.map_err(|error| error.to_string()));
    loaded.unwrap_or_else(|error| {
        tracing::warn!(
            event_name = "cli.inspect.prompt_fallback",
            error = %error,
            "configured prompt unusable, using the built-in prompt instead"
        );
        DEFAULT_SYSTEM_PROMPT.to_string()
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read `{}`: {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("could not parse `{}`: {error}", path.display()))
}
