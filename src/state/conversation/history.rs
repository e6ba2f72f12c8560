use crate::types::{ChatMessage, Role};

/// Position of a message in the active list, captured when a turn starts.
/// Valid for as long as the list is only appended to, which holds while a
/// stream is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSlot(usize);

impl MessageSlot {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Message list of the active conversation plus the streaming flag.
#[derive(Debug, Default)]
pub struct ConversationStore {
    active_conversation_id: Option<i64>,
    messages: Vec<ChatMessage>,
    streaming: bool,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_conversation_id(&self) -> Option<i64> {
        self.active_conversation_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Makes `conversation_id` active and drops the previous list right away,
    /// so nothing from the old conversation is visible while the new one loads.
    pub fn switch_to(&mut self, conversation_id: i64) {
        self.active_conversation_id = Some(conversation_id);
        self.messages.clear();
    }

    pub fn replace_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    pub fn append(&mut self, message: ChatMessage) -> MessageSlot {
        self.messages.push(message);
        MessageSlot(self.messages.len() - 1)
    }

    /// Appends to the slotted message. Only assistant messages grow; anything
    /// else is left untouched and `false` is returned.
    pub fn append_to(&mut self, slot: MessageSlot, text: &str) -> bool {
        match self.messages.get_mut(slot.0) {
            Some(message) if message.role == Role::Assistant => {
                message.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    pub fn set_content(&mut self, slot: MessageSlot, text: &str) -> bool {
        match self.messages.get_mut(slot.0) {
            Some(message) => {
                message.content = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn message(&self, slot: MessageSlot) -> Option<&ChatMessage> {
        self.messages.get(slot.0)
    }

    pub fn find(&self, message_id: i64) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|message| message.id == Some(message_id))
    }
}
