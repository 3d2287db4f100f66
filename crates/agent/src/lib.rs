//! Conversation side of the lead-qualification pipeline.
//!
//! The model writes replies and proposes lead data; everything it produces
//! passes through a guardrail or a grounding check before it is kept.
//! `runtime::ChatRuntime` wires the pieces into one per-turn cycle.

pub mod automation;
pub mod extraction;
pub mod fallback;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod runtime;

pub use automation::{AutomationEnvelope, AutomationError, AutomationQueue, AutomationSink};
pub use extraction::{ExtractionValidator, ValidationVerdict};
pub use guardrails::{GuardrailVerdict, ResponseGuardrail};
pub use llm::{LeadExtractor, LlmClient};
pub use prompts::PromptSource;
pub use runtime::{ChatCollaborators, ChatRuntime, TurnOutcome};
