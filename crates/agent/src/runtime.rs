use std::sync::Arc;

use serde::Serialize;
use telos_core::config::AppConfig;
use telos_core::domain::conversation::{Conversation, ConversationId, Turn};
use telos_core::domain::lead::{ExtractedLeadFields, Lead, LeadField, LeadId, LeadStatus};
use telos_core::email::validate_and_clean_email;
use telos_core::errors::{ApplicationError, DomainError, InterfaceError};
use telos_core::project::score_project;
use telos_core::prompt::{PromptAssembler, TokenUsage};
use telos_core::sanitize::{restore_input, sanitize_input};
use telos_core::summary::{needs_summarization, summarize};
use telos_core::tokens::{limit_message_length, TokenAccountant};
use telos_db::{ConversationRepository, LeadRepository, RepositoryError};
use tracing::{debug, info, warn};

use crate::automation::{AutomationEnvelope, AutomationQueue};
use crate::extraction::{
    verify_data_collection, ExtractionValidator, ValidationVerdict, CONTACT_FIELDS,
};
use crate::fallback::fallback_reply;
use crate::guardrails::{GuardrailVerdict, ResponseGuardrail};
use crate::llm::{LeadExtractor, LlmClient};
use crate::prompts::{PromptSource, DEFAULT_SYSTEM_PROMPT};

pub const CHAT_LEAD_SOURCE: &str = "chat";

const EARLY_EXTRACTION: std::ops::RangeInclusive<usize> = 1..=5;
const REGULAR_EXTRACTION_START: usize = 10;
const REGULAR_EXTRACTION_INTERVAL: usize = 3;
const DELIVERY_KEYWORDS: &[&str] = &["send", "email", "inbox", "proposal"];

/// Everything the runtime talks to that is not pure computation.
#[derive(Clone)]
pub struct ChatCollaborators {
    pub llm: Arc<dyn LlmClient>,
    pub extractor: Arc<dyn LeadExtractor>,
    pub prompts: Arc<dyn PromptSource>,
    pub leads: Arc<dyn LeadRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub automation: Option<AutomationQueue>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub lead_id: LeadId,
    pub conversation_id: ConversationId,
    pub summary_generated: bool,
    pub used_fallback: bool,
    /// Absent when the scripted fallback produced the reply.
    pub guardrail: Option<GuardrailVerdict>,
    /// Present on turns where extraction ran; every extraction is checked.
    pub validation: Option<ValidationVerdict>,
    pub usage: TokenUsage,
    pub qualified: bool,
    pub automation_submitted: bool,
}

pub struct ChatRuntime {
    collaborators: ChatCollaborators,
    assembler: PromptAssembler,
    guardrail: ResponseGuardrail,
    validator: ExtractionValidator,
    max_message_chars: usize,
}

impl ChatRuntime {
    pub fn new(collaborators: ChatCollaborators, config: &AppConfig) -> Self {
        Self {
            collaborators,
            assembler: PromptAssembler::new(TokenAccountant::default(), config.budget),
            guardrail: ResponseGuardrail::from(&config.guardrail),
            validator: ExtractionValidator::new(),
            max_message_chars: config.chat.max_message_chars,
        }
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_guardrail(mut self, guardrail: ResponseGuardrail) -> Self {
        self.guardrail = guardrail;
        self
    }

    /// [`handle_turn`](Self::handle_turn) for callers outside the pipeline:
    /// failures are logged and reduced to an [`InterfaceError`] carrying the
    /// conversation id as correlation id.
    pub async fn respond(
        &self,
        conversation_id: Option<ConversationId>,
        message: &str,
    ) -> Result<TurnOutcome, InterfaceError> {
        let correlation_id = conversation_id
            .as_ref()
            .map_or_else(|| "new-conversation".to_string(), ToString::to_string);

        self.handle_turn(conversation_id, message).await.map_err(|error| {
            warn!(
                event_name = "pipeline.turn.failed",
                correlation_id = %correlation_id,
                error = %error,
                "chat turn aborted"
            );
            error.into_interface(correlation_id)
        })
    }

    /// Runs one visitor message through the full cycle and persists the result.
    ///
    /// A conversation id the store has never seen starts a new conversation
    /// under that id.
    pub async fn handle_turn(
        &self,
        conversation_id: Option<ConversationId>,
        message: &str,
    ) -> Result<TurnOutcome, ApplicationError> {
        let mut conversation = self.load_conversation(conversation_id).await?;
        let correlation_id = conversation.id.to_string();
        let mut lead = self.load_lead(&mut conversation).await?;
        let was_automation_ready = lead.is_automation_ready();

        let message_count = conversation.turns.len();
        let message = sanitize_input(limit_message_length(message, self.max_message_chars));
        if message.trim().is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }
        conversation.push(Turn::user(message.clone()));

        let mut summary_generated = false;
        if needs_summarization(&conversation.turns) {
            conversation.summary = Some(summarize(&conversation.turns));
            summary_generated = true;
            info!(
                event_name = "pipeline.summary.generated",
                correlation_id = %correlation_id,
                turns = conversation.turns.len(),
                "conversation summary regenerated"
            );
        }

        let system_prompt = match self.collaborators.prompts.load().await {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(
                    event_name = "pipeline.prompt.unavailable",
                    correlation_id = %correlation_id,
                    error = %error,
                    "prompt source failed, using built-in prompt"
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        };
        let prepared = self.assembler.assemble(
            &system_prompt,
            &conversation.turns,
            conversation.summary.as_deref(),
        );

        let mut update = ExtractedLeadFields::default();
        let mut guardrail = None;
        let mut validation = None;
        let mut scripted_status = None;
        let used_fallback;

        let reply = match self
            .collaborators
            .llm
            .complete(&prepared.system_prompt, &prepared.messages)
            .await
        {
            Ok(raw) => {
                used_fallback = false;
                let verdict = self.guardrail.validate(&raw);
                let reply = self.apply_guardrail(&raw, &verdict, &correlation_id);
                guardrail = Some(verdict);

                if should_extract(message_count) {
                    if let Some((fields, verdict)) =
                        self.extract(&conversation.turns, &correlation_id).await
                    {
                        update = fields;
                        validation = Some(verdict);
                    }
                }
                reply
            }
            Err(error) => {
                used_fallback = true;
                warn!(
                    event_name = "pipeline.llm.fallback",
                    correlation_id = %correlation_id,
                    message_count,
                    error = %error,
                    "model call failed, using scripted reply"
                );
                let fallback = fallback_reply(
                    message_count,
                    &restore_input(&message),
                    &conversation.turns[..message_count],
                );
                update = fallback.fields;
                scripted_status = fallback.status;
                fallback.reply
            }
        };

        clean_email(&mut update);
        lead.fields.merge(update);
        lead.updated_at = chrono::Utc::now();

        let qualified = is_lead_qualified(&lead.fields, &reply);
        if qualified {
            info!(
                event_name = "pipeline.lead.qualified",
                correlation_id = %correlation_id,
                lead_id = %lead.id,
                "lead is ready for a proposal"
            );
        }
        if let Some(status) = scripted_status.or(qualified.then_some(LeadStatus::Qualified)) {
            promote(&mut lead, status, &correlation_id)?;
        }

        conversation.push(Turn::assistant(reply.clone()));

        self.collaborators.leads.save(lead.clone()).await.map_err(persistence)?;
        self.collaborators.conversations.save(conversation.clone()).await.map_err(persistence)?;

        let automation_submitted =
            !was_automation_ready && lead.is_automation_ready() && self.submit_automation(&lead);

        Ok(TurnOutcome {
            reply,
            lead_id: lead.id,
            conversation_id: conversation.id,
            summary_generated,
            used_fallback,
            guardrail,
            validation,
            usage: prepared.usage,
            qualified,
            automation_submitted,
        })
    }

    async fn load_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<Conversation, ApplicationError> {
        let Some(id) = conversation_id else {
            return Ok(Conversation::new());
        };
        let existing =
            self.collaborators.conversations.find_by_id(&id).await.map_err(persistence)?;
        Ok(existing.unwrap_or_else(|| Conversation { id, ..Conversation::new() }))
    }

    async fn load_lead(&self, conversation: &mut Conversation) -> Result<Lead, ApplicationError> {
        if let Some(lead_id) = &conversation.lead_id {
            if let Some(lead) =
                self.collaborators.leads.find_by_id(lead_id).await.map_err(persistence)?
            {
                return Ok(lead);
            }
            warn!(
                event_name = "pipeline.lead.missing",
                correlation_id = %conversation.id,
                lead_id = %lead_id,
                "conversation points at a lead that no longer exists, starting a new one"
            );
        }

        let lead = Lead::new(CHAT_LEAD_SOURCE);
        conversation.lead_id = Some(lead.id.clone());
        Ok(lead)
    }

    fn apply_guardrail(&self, raw: &str, verdict: &GuardrailVerdict, correlation_id: &str) -> String {
        if verdict.is_valid {
            debug!(
                event_name = "pipeline.guardrail.passed",
                correlation_id = %correlation_id,
                word_count = verdict.word_count,
                "reply passed guardrails"
            );
            return raw.to_string();
        }

        if let (true, Some(redirect)) = (verdict.is_off_topic, verdict.redirect_message.as_ref()) {
            debug!(
                event_name = "pipeline.guardrail.off_topic",
                correlation_id = %correlation_id,
                "reply drifted off topic, redirecting"
            );
            return redirect.clone();
        }

        if verdict.is_over_length() {
            debug!(
                event_name = "pipeline.guardrail.truncated",
                correlation_id = %correlation_id,
                word_count = verdict.word_count,
                max_words = verdict.max_words,
                "reply over word limit, truncating"
            );
            return self.guardrail.truncate(raw);
        }

        raw.to_string()
    }

    /// Extraction failures are not fatal to the turn: the lead just gains nothing.
    async fn extract(
        &self,
        turns: &[Turn],
        correlation_id: &str,
    ) -> Option<(ExtractedLeadFields, ValidationVerdict)> {
        let extracted = match self.collaborators.extractor.extract(turns).await {
            Ok(fields) => fields,
            Err(error) => {
                warn!(
                    event_name = "pipeline.extraction.failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "lead extraction failed"
                );
                return None;
            }
        };
        debug!(
            event_name = "pipeline.extraction.completed",
            correlation_id = %correlation_id,
            field_count = extracted.present_fields().len(),
            "lead fields extracted"
        );

        let verdict = self.validator.validate(&extracted, turns);
        let grounded = if verdict.is_hallucinated {
            warn!(
                event_name = "pipeline.extraction.hallucinated",
                correlation_id = %correlation_id,
                suspicious = ?verdict.suspicious_fields,
                confidence = verdict.confidence,
                "extraction contained ungrounded fields, dropping them"
            );
            verdict.grounded(&extracted)
        } else {
            extracted
        };

        let collection = verify_data_collection(turns, &CONTACT_FIELDS);
        debug!(
            event_name = "pipeline.extraction.collection",
            correlation_id = %correlation_id,
            collected = ?collection.collected,
            missing = ?collection.missing,
            "contact detail collection checked"
        );

        Some((grounded, verdict))
    }

    fn submit_automation(&self, lead: &Lead) -> bool {
        let Some(queue) = &self.collaborators.automation else {
            return false;
        };
        match queue.submit(AutomationEnvelope::lead_created(lead)) {
            Ok(()) => {
                info!(
                    event_name = "automation.lead.queued",
                    lead_id = %lead.id,
                    "qualified lead queued for automation"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "automation.lead.not_queued",
                    lead_id = %lead.id,
                    error = %error,
                    "qualified lead could not be queued for automation"
                );
                false
            }
        }
    }
}

/// Extraction runs on the first five messages, then every third message after the tenth.
pub fn should_extract(message_count: usize) -> bool {
    EARLY_EXTRACTION.contains(&message_count)
        || (message_count > REGULAR_EXTRACTION_START
            && message_count % REGULAR_EXTRACTION_INTERVAL == 0)
}

/// Ready for a proposal: contact details, a project worth quoting, and a reply
/// that promises delivery.
pub fn is_lead_qualified(fields: &ExtractedLeadFields, reply: &str) -> bool {
    if !fields.has_contact_details() {
        return false;
    }
    let project = score_project(fields);
    if !project.is_valid {
        if fields.is_present(LeadField::ProblemText) {
            debug!(
                event_name = "pipeline.lead.project_incomplete",
                missing = ?project.missing_fields,
                low_quality = ?project.low_quality_fields,
                "project description lacks detail"
            );
        }
        return false;
    }
    let reply = reply.to_lowercase();
    DELIVERY_KEYWORDS.iter().any(|keyword| reply.contains(keyword))
}

fn clean_email(fields: &mut ExtractedLeadFields) {
    if let Some(email) = fields.email.take() {
        fields.email = validate_and_clean_email(&email);
        if fields.email.is_none() {
            debug!(event_name = "pipeline.extraction.email_rejected", "invalid email dropped");
        }
    }
}

fn promote(lead: &mut Lead, status: LeadStatus, correlation_id: &str) -> Result<(), ApplicationError> {
    if lead.status == status {
        return Ok(());
    }
    if !lead.can_transition_to(status) {
        debug!(
            event_name = "pipeline.lead.transition_skipped",
            correlation_id = %correlation_id,
            from = ?lead.status,
            to = ?status,
            "lead already past this status"
        );
        return Ok(());
    }
    lead.transition_to(status).map_err(ApplicationError::from)
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
