use crate::models::chat::{ format_user_key, now_millis, ChatMessage, Role };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    AwaitingReply,
}

/// The in-memory chat log of one user, as shown to them. Holds local-only
/// records (welcome text, the pending placeholder) alongside the persisted
/// ones.
#[derive(Debug, Clone)]
pub struct Conversation {
    user_key: String,
    messages: Vec<ChatMessage>,
    state: ChatState,
    last_timestamp: i64,
}

impl Conversation {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_key: format_user_key(user_id),
            messages: Vec::new(),
            state: ChatState::Idle,
            last_timestamp: 0,
        }
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    /// Wall-clock millis, never earlier than the previous record.
    fn next_timestamp(&mut self) -> i64 {
        let ts = now_millis().max(self.last_timestamp);
        self.last_timestamp = ts;
        ts
    }

    pub fn push(&mut self, role: Role, text: &str) -> ChatMessage {
        let timestamp = self.next_timestamp();
        let message = ChatMessage::new(&self.user_key, role, text, timestamp);
        self.messages.push(message.clone());
        message
    }

    /// Shows `placeholder` as a pending assistant record.
    pub fn begin_reply(&mut self, placeholder: &str) {
        self.push(Role::Assistant, placeholder);
        self.state = ChatState::AwaitingReply;
    }

    /// Swaps the pending placeholder for `reply` and returns the record that
    /// replaced it.
    pub fn finish_reply(&mut self, reply: &str) -> ChatMessage {
        if self.state == ChatState::AwaitingReply {
            if let Some(pos) = self.messages.iter().rposition(|m| m.role == Role::Assistant) {
                self.messages.remove(pos);
            }
        }
        self.state = ChatState::Idle;
        self.push(Role::Assistant, reply)
    }

    /// Drops the local log and shows only `welcome`.
    pub fn reset(&mut self, welcome: &str) {
        self.messages.clear();
        self.state = ChatState::Idle;
        self.push(Role::Assistant, welcome);
    }

    /// Replaces the local log with `history` (already ordered).
    pub fn replace_history(&mut self, history: Vec<ChatMessage>) {
        if let Some(last) = history.last() {
            self.last_timestamp = self.last_timestamp.max(last.timestamp);
        }
        self.messages = history;
        self.state = ChatState::Idle;
    }
}
