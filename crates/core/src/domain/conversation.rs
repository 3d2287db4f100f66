use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lead::LeadId;
use crate::sanitize::restore_input;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation. Order within a transcript is significant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), timestamp: Utc::now() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Content with input escaping undone. Visitor turns are stored escaped;
    /// anything that reads them as language goes through here.
    pub fn plain_text(&self) -> Cow<'_, str> {
        match self.role {
            Role::User => Cow::Owned(restore_input(&self.content)),
            Role::System | Role::Assistant => Cow::Borrowed(&self.content),
        }
    }

    pub fn as_message(&self) -> ChatMessage {
        ChatMessage { role: self.role, content: self.plain_text().into_owned() }
    }
}

/// The `{role, content}` shape handed to the language model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub lead_id: Option<LeadId>,
    pub turns: Vec<Turn>,
    /// Digest of older turns, regenerated each time the summarization threshold is crossed.
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            lead_id: None,
            turns: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.updated_at = turn.timestamp.max(self.updated_at);
        self.turns.push(turn);
    }

    /// Number of turns that precede the newest user message.
    pub fn history_len(&self) -> usize {
        self.turns.len().saturating_sub(1)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, Role, Turn};

    #[test]
    fn turns_deserialize_without_timestamp() {
        let turn: Turn = serde_json::from_str(r#"{"role":"user","content":"hi"}"#)
            .expect("turn without timestamp should parse");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "hi");
    }

    #[test]
    fn push_preserves_order_and_touches_updated_at() {
        let mut conversation = Conversation::new();
        let created = conversation.updated_at;
        conversation.push(Turn::user("first"));
        conversation.push(Turn::assistant("second"));

        let contents: Vec<_> = conversation.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(conversation.updated_at >= created);
        assert_eq!(conversation.history_len(), 1);
    }

    #[test]
    fn model_sees_visitor_text_unescaped() {
        let visitor = Turn::user("Smith &amp; Sons, O&#x27;Brien");
        assert_eq!(visitor.plain_text(), "Smith & Sons, O'Brien");
        assert_eq!(visitor.as_message().content, "Smith & Sons, O'Brien");

        let reply = Turn::assistant("Fish &amp; chips");
        assert_eq!(reply.as_message().content, "Fish &amp; chips");
    }
}
