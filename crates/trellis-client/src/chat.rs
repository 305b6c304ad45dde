//! Chat history reconciliation
//!
//! Merges optimistic local writes with server-confirmed messages for each
//! conversation. Optimistic entries are visible immediately and carry a
//! locally generated id that the server echoes back, so later deliveries
//! collapse onto the same entry. A clear records a timestamp and drops any
//! append or merge arriving inside the cooldown window, defeating races
//! where an in-flight response would resurrect just-deleted history.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use trellis_core::{ChatMessage, ConversationId};

struct PendingAppend {
    message: ChatMessage,
    needs_retry: bool,
}

#[derive(Default)]
struct ConversationHistory {
    /// Rendered messages, ordered by timestamp, truncated to the render limit
    messages: Vec<ChatMessage>,

    /// Optimistic entries not yet confirmed by the server, keyed by local id
    unconfirmed: HashMap<String, PendingAppend>,

    /// When the conversation was last cleared
    cleared_at: Option<DateTime<Utc>>,
}

/// Merges optimistic and server-confirmed messages per conversation
///
/// The authoritative full history remains with the external persistence
/// collaborator; this reconciler owns only the rendered window.
pub struct ChatHistoryReconciler {
    conversations: HashMap<ConversationId, ConversationHistory>,
    cooldown: chrono::Duration,
    render_limit: usize,
}

impl ChatHistoryReconciler {
    /// Create a reconciler with the given post-clear cooldown and render limit
    pub fn new(cooldown: std::time::Duration, render_limit: usize) -> Self {
        let cooldown =
            chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::seconds(1));
        Self {
            conversations: HashMap::new(),
            cooldown,
            render_limit,
        }
    }

    /// Append a message optimistically, before server confirmation
    ///
    /// The stored message is assigned a locally generated id when it has
    /// none; the caller sends that id to the server so later echoes match.
    /// Returns `None` when the append falls inside a post-clear cooldown
    /// or duplicates an already-stored message.
    pub fn append_optimistic(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        self.append_optimistic_at(message, Utc::now())
    }

    fn append_optimistic_at(
        &mut self,
        mut message: ChatMessage,
        now: DateTime<Utc>,
    ) -> Option<ChatMessage> {
        let conversation = message.conversation_id.clone();
        let cooldown = self.cooldown;
        let limit = self.render_limit;
        let history = self.conversations.entry(conversation.clone()).or_default();

        if within_cooldown(history, cooldown, now) {
            debug!(
                conversation = %conversation,
                "Append dropped inside post-clear cooldown"
            );
            return None;
        }

        if message.id.is_none() {
            message.id = Some(Uuid::new_v4().to_string());
        }

        let key = message.dedup_key();
        if history.messages.iter().any(|existing| existing.dedup_key() == key) {
            debug!(conversation = %conversation, "Duplicate optimistic append ignored");
            return None;
        }

        let local_id = message.id.clone().unwrap_or_default();
        history.messages.push(message.clone());
        history.unconfirmed.insert(
            local_id,
            PendingAppend {
                message: message.clone(),
                needs_retry: false,
            },
        );
        truncate_rendered(history, limit);
        Some(message)
    }

    /// Merge a batch of server-confirmed messages into a conversation
    ///
    /// Entries sharing a dedup key collapse to one, the server copy
    /// winning; still-unconfirmed optimistic entries are kept. The result
    /// is ordered by timestamp and truncated to the render limit.
    pub fn merge_server_batch(&mut self, conversation: &ConversationId, batch: Vec<ChatMessage>) {
        self.merge_server_batch_at(conversation, batch, Utc::now());
    }

    fn merge_server_batch_at(
        &mut self,
        conversation: &ConversationId,
        batch: Vec<ChatMessage>,
        now: DateTime<Utc>,
    ) {
        let cooldown = self.cooldown;
        let limit = self.render_limit;
        let history = self.conversations.entry(conversation.clone()).or_default();

        if within_cooldown(history, cooldown, now) {
            debug!(
                conversation = %conversation,
                dropped = batch.len(),
                "Server batch dropped inside post-clear cooldown"
            );
            return;
        }

        for message in batch {
            let key = message.dedup_key();

            // The server's copy of an optimistic entry confirms it.
            history
                .unconfirmed
                .retain(|_, pending| pending.message.dedup_key() != key);

            if let Some(existing) = history
                .messages
                .iter_mut()
                .find(|existing| existing.dedup_key() == key)
            {
                *existing = message;
            } else {
                history.messages.push(message);
            }
        }

        history
            .messages
            .sort_by_key(|message| message.timestamp);
        truncate_rendered(history, limit);
    }

    /// Empty a conversation immediately and start the cooldown window
    pub fn clear(&mut self, conversation: &ConversationId) {
        self.clear_at(conversation, Utc::now());
    }

    fn clear_at(&mut self, conversation: &ConversationId, now: DateTime<Utc>) {
        debug!(conversation = %conversation, "Conversation history cleared");
        let history = self.conversations.entry(conversation.clone()).or_default();
        history.messages.clear();
        history.unconfirmed.clear();
        history.cleared_at = Some(now);
    }

    /// Empty a conversation's rendered list without starting a cooldown
    ///
    /// Used when the active conversation switches: the list must blank
    /// immediately, but the fresh fetch that follows must still apply.
    pub fn reset(&mut self, conversation: &ConversationId) {
        let history = self.conversations.entry(conversation.clone()).or_default();
        history.messages.clear();
        history.unconfirmed.clear();
    }

    /// The rendered messages of a conversation
    pub fn messages(&self, conversation: &ConversationId) -> &[ChatMessage] {
        self.conversations
            .get(conversation)
            .map(|history| history.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Confirm that a server append for a local id succeeded
    pub fn confirm_append(&mut self, conversation: &ConversationId, local_id: &str) {
        if let Some(history) = self.conversations.get_mut(conversation) {
            history.unconfirmed.remove(local_id);
        }
    }

    /// Flag a failed server append for silent retry
    ///
    /// The optimistic entry stays visible; nothing is retracted.
    pub fn mark_append_failed(&mut self, conversation: &ConversationId, local_id: &str) {
        if let Some(history) = self.conversations.get_mut(conversation) {
            if let Some(pending) = history.unconfirmed.get_mut(local_id) {
                warn!(
                    conversation = %conversation,
                    local_id,
                    "Server append failed; entry flagged for retry"
                );
                pending.needs_retry = true;
            }
        }
    }

    /// Take the entries flagged for retry, marking them in flight again
    pub fn take_retryable(&mut self, conversation: &ConversationId) -> Vec<ChatMessage> {
        let Some(history) = self.conversations.get_mut(conversation) else {
            return Vec::new();
        };
        history
            .unconfirmed
            .values_mut()
            .filter(|pending| pending.needs_retry)
            .map(|pending| {
                pending.needs_retry = false;
                pending.message.clone()
            })
            .collect()
    }

    /// Number of optimistic entries not yet confirmed by the server
    pub fn unconfirmed_count(&self, conversation: &ConversationId) -> usize {
        self.conversations
            .get(conversation)
            .map(|history| history.unconfirmed.len())
            .unwrap_or(0)
    }
}

fn within_cooldown(
    history: &ConversationHistory,
    cooldown: chrono::Duration,
    now: DateTime<Utc>,
) -> bool {
    history
        .cleared_at
        .is_some_and(|cleared_at| now.signed_duration_since(cleared_at) < cooldown)
}

fn truncate_rendered(history: &mut ConversationHistory, limit: usize) {
    if history.messages.len() > limit {
        let excess = history.messages.len() - limit;
        history.messages.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trellis_core::{ChatRole, ConversationScope};

    fn conversation() -> ConversationId {
        ConversationId::derive(ConversationScope::Garden, "g1", "chat")
    }

    fn message(id: Option<&str>, content: &str, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: id.map(str::to_string),
            conversation_id: conversation(),
            role: ChatRole::User,
            content: content.to_string(),
            timestamp: at,
            author: "user@trellis.local".to_string(),
            media: None,
        }
    }

    fn reconciler() -> ChatHistoryReconciler {
        ChatHistoryReconciler::new(Duration::from_millis(1000), 50)
    }

    #[test]
    fn test_optimistic_append_is_visible_and_gets_local_id() {
        let mut chat = reconciler();
        let conv = conversation();

        let stored = chat
            .append_optimistic(message(None, "hi", Utc::now()))
            .unwrap();

        assert!(stored.id.is_some());
        assert_eq!(chat.messages(&conv).len(), 1);
        assert_eq!(chat.unconfirmed_count(&conv), 1);
    }

    #[test]
    fn test_server_echo_collapses_with_optimistic_entry() {
        let mut chat = reconciler();
        let conv = conversation();
        let now = Utc::now();

        let stored = chat.append_optimistic(message(Some("c1"), "hi", now)).unwrap();
        assert_eq!(stored.id.as_deref(), Some("c1"));

        chat.merge_server_batch(&conv, vec![message(Some("c1"), "hi", now)]);

        let rendered = chat.messages(&conv);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].content, "hi");
        // The echo confirmed the optimistic entry
        assert_eq!(chat.unconfirmed_count(&conv), 0);
    }

    #[test]
    fn test_two_messages_sharing_id_store_once() {
        let mut chat = reconciler();
        let conv = conversation();
        let now = Utc::now();

        chat.merge_server_batch(
            &conv,
            vec![
                message(Some("m1"), "hello", now),
                message(Some("m1"), "hello", now),
            ],
        );

        assert_eq!(chat.messages(&conv).len(), 1);
    }

    #[test]
    fn test_merge_keeps_unconfirmed_optimistic_entries() {
        let mut chat = reconciler();
        let conv = conversation();
        let now = Utc::now();

        chat.append_optimistic(message(None, "pending send", now));
        chat.merge_server_batch(&conv, vec![message(Some("s1"), "from server", now)]);

        let rendered = chat.messages(&conv);
        assert_eq!(rendered.len(), 2);
        assert_eq!(chat.unconfirmed_count(&conv), 1);
    }

    #[test]
    fn test_merge_orders_by_timestamp_and_truncates() {
        let mut chat = ChatHistoryReconciler::new(Duration::from_millis(1000), 2);
        let conv = conversation();
        let base = Utc::now();

        chat.merge_server_batch(
            &conv,
            vec![
                message(Some("m3"), "third", base + chrono::Duration::seconds(3)),
                message(Some("m1"), "first", base + chrono::Duration::seconds(1)),
                message(Some("m2"), "second", base + chrono::Duration::seconds(2)),
            ],
        );

        let rendered = chat.messages(&conv);
        // Only the most recent two remain, in timestamp order
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].content, "second");
        assert_eq!(rendered[1].content, "third");
    }

    #[test]
    fn test_clear_cooldown_drops_racing_writes() {
        let mut chat = reconciler();
        let conv = conversation();
        let t0 = Utc::now();

        chat.append_optimistic_at(message(Some("m1"), "old", t0), t0);
        chat.clear_at(&conv, t0);
        assert!(chat.messages(&conv).is_empty());

        // In-flight append lands 300ms after the clear: dropped
        let dropped = chat.append_optimistic_at(
            message(None, "race", t0 + chrono::Duration::milliseconds(300)),
            t0 + chrono::Duration::milliseconds(300),
        );
        assert!(dropped.is_none());

        // An in-flight server batch inside the window is dropped too
        chat.merge_server_batch_at(
            &conv,
            vec![message(Some("m1"), "old", t0)],
            t0 + chrono::Duration::milliseconds(900),
        );
        assert!(chat.messages(&conv).is_empty());

        // After the cooldown, writes apply again
        let applied = chat.append_optimistic_at(
            message(None, "fresh", t0 + chrono::Duration::milliseconds(1500)),
            t0 + chrono::Duration::milliseconds(1500),
        );
        assert!(applied.is_some());
        assert_eq!(chat.messages(&conv).len(), 1);
    }

    #[test]
    fn test_failed_append_stays_visible_and_retries_once() {
        let mut chat = reconciler();
        let conv = conversation();

        let stored = chat
            .append_optimistic(message(None, "hi", Utc::now()))
            .unwrap();
        let local_id = stored.id.clone().unwrap();

        chat.mark_append_failed(&conv, &local_id);

        // Still rendered
        assert_eq!(chat.messages(&conv).len(), 1);

        let retry = chat.take_retryable(&conv);
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].id.as_deref(), Some(local_id.as_str()));

        // Taking again yields nothing until another failure is flagged
        assert!(chat.take_retryable(&conv).is_empty());
    }

    #[test]
    fn test_confirm_append_clears_unconfirmed() {
        let mut chat = reconciler();
        let conv = conversation();

        let stored = chat
            .append_optimistic(message(None, "hi", Utc::now()))
            .unwrap();
        chat.confirm_append(&conv, stored.id.as_deref().unwrap());

        assert_eq!(chat.unconfirmed_count(&conv), 0);
        assert_eq!(chat.messages(&conv).len(), 1);
    }

    #[test]
    fn test_reset_blanks_list_without_cooldown() {
        let mut chat = reconciler();
        let conv = conversation();
        let now = Utc::now();

        chat.append_optimistic(message(None, "old", now));
        chat.reset(&conv);
        assert!(chat.messages(&conv).is_empty());

        // No cooldown: a merge right after the reset applies
        chat.merge_server_batch(&conv, vec![message(Some("s1"), "fresh", now)]);
        assert_eq!(chat.messages(&conv).len(), 1);
    }

    #[test]
    fn test_conversations_are_isolated() {
        let mut chat = reconciler();
        let other = ConversationId::derive(ConversationScope::Service, "svc-1", "chat");
        let now = Utc::now();

        chat.append_optimistic(message(None, "garden talk", now));
        let mut for_other = message(None, "service talk", now);
        for_other.conversation_id = other.clone();
        chat.append_optimistic(for_other);

        assert_eq!(chat.messages(&conversation()).len(), 1);
        assert_eq!(chat.messages(&other).len(), 1);
    }
}
