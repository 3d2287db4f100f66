pub mod config;
pub mod domain;
pub mod email;
pub mod errors;
pub mod project;
pub mod prompt;
pub mod sanitize;
pub mod summary;
pub mod tokens;

pub use domain::conversation::{ChatMessage, Conversation, ConversationId, Role, Turn};
pub use domain::lead::{ExtractedLeadFields, Lead, LeadField, LeadId, LeadStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use project::{score_completeness, score_project, ProjectScore};
pub use prompt::{PreparedPrompt, PromptAssembler, TokenUsage};
pub use summary::{needs_summarization, summarize};
pub use tokens::{TokenAccountant, TokenBudget, TokenStats, Tokenizer, TokenizerError};
