pub mod repositories;

pub use repositories::{
    ConversationRepository, InMemoryConversationRepository, InMemoryLeadRepository,
    LeadRepository, RepositoryError,
};
