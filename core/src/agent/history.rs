use crate::traits::{ChatMessage, Role};

/// Ordered conversation state.
///
/// Holds at most one system message, always first. Apart from `clear` and
/// system-prompt replacement, messages are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: &str) -> Self {
        let mut conversation = Self::new();
        conversation.set_system_prompt(prompt);
        conversation
    }

    /// Replaces the system message. An empty prompt removes it.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        if self.has_system_prompt() {
            self.messages.remove(0);
        }
        if !prompt.is_empty() {
            self.messages.insert(0, ChatMessage::system(prompt));
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    fn has_system_prompt(&self) -> bool {
        self.system_prompt().is_some()
    }

    /// Appends background context as a user message.
    pub fn add_context(&mut self, context: &str) {
        if !context.is_empty() {
            self.messages.push(ChatMessage::user(context));
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        debug_assert!(message.role != Role::System, "system prompt goes through set_system_prompt");
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for message in messages {
            self.push(message);
        }
    }

    /// Drops everything except the system prompt.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
