use crate::MediaRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The person using the client
    User,

    /// The assistant driving the workflow
    Assistant,

    /// System notices
    System,
}

impl ChatRole {
    /// Stable string form used in dedup keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// Which persisted history a conversation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationScope {
    /// Shared garden-level history
    Garden,

    /// History for one service
    Service,
}

impl ConversationScope {
    /// Stable string form used in conversation ids
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationScope::Garden => "garden",
            ConversationScope::Service => "service",
        }
    }
}

/// Value object: Conversation ID
///
/// Never stored; always recomputed from its inputs via [`ConversationId::derive`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Deterministically derive a conversation id from its scope inputs
    pub fn derive(scope: ConversationScope, scope_id: &str, view_mode: &str) -> Self {
        ConversationId(format!("{}:{}:{}", scope.as_str(), scope_id, view_mode))
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat message, optimistic or server-confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned or locally generated identifier; optimistic
    /// messages send their local id so later echoes can be matched
    pub id: Option<String>,

    /// Conversation this message belongs to
    pub conversation_id: ConversationId,

    /// Author role
    pub role: ChatRole,

    /// Message body
    pub content: String,

    /// When the message was written
    pub timestamp: DateTime<Utc>,

    /// Author identifier
    pub author: String,

    /// Optional attached media
    pub media: Option<MediaRef>,
}

impl ChatMessage {
    /// Key under which this message is deduplicated
    ///
    /// The id when present, else a composite of role, conversation,
    /// normalized content, and the timestamp rounded to the second.
    pub fn dedup_key(&self) -> String {
        if let Some(id) = &self.id {
            return format!("id:{}", id);
        }
        format!(
            "{}|{}|{}|{}",
            self.role.as_str(),
            self.conversation_id.0,
            normalize_content(&self.content),
            self.timestamp.timestamp()
        )
    }
}

/// Normalize message content for dedup comparison: trim and collapse
/// internal whitespace runs, preserving case.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}
