use async_trait::async_trait;
use thiserror::Error;

use telos_core::domain::conversation::{Conversation, ConversationId};
use telos_core::domain::lead::{Lead, LeadId};

pub mod memory;

pub use memory::{InMemoryConversationRepository, InMemoryLeadRepository};

/// Backends report every storage failure as unavailability; the chat turn
/// that hit it is aborted and can be retried.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Receives leads after validation; suspicious fields are already nulled.
#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    async fn save(&self, lead: Lead) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<Conversation>, RepositoryError>;
    async fn save(&self, conversation: Conversation) -> Result<(), RepositoryError>;
}
