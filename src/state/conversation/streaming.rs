use super::state::{ActiveTurn, ChatSession, SessionEvent, StreamOutcome, TurnHandle};
use crate::types::{ChatMessage, ChatRequest, RegenerateRequest, Role, StreamRequest};

pub const STREAM_FAILURE_MARKER: &str = "(error) Failed to stream response from backend.";

impl ChatSession {
    /// Starts a user turn: appends the user message and an empty assistant
    /// placeholder, then hands back what the stream task needs. `None` means
    /// the send was refused and nothing changed.
    pub fn begin_turn(&mut self, text: &str) -> Option<TurnHandle> {
        let content = text.trim();
        if content.is_empty() || self.is_streaming() {
            return None;
        }
        let conversation_id = self.active_conversation_id()?;

        self.store
            .append(ChatMessage::optimistic(Role::User, content));
        let request = StreamRequest::Chat(ChatRequest {
            content: content.to_string(),
            conversation_id,
        });
        Some(self.open_placeholder(request, None))
    }

    /// Streams a replacement for a saved assistant message.
    pub fn begin_regenerate(&mut self, target_message_id: i64) -> Option<TurnHandle> {
        if self.is_streaming() {
            return None;
        }
        let conversation_id = self.active_conversation_id()?;
        match self.store.find(target_message_id) {
            Some(message) if message.role == Role::Assistant => {}
            _ => return None,
        }

        let request = StreamRequest::Regenerate(RegenerateRequest {
            conversation_id,
            target_message_id,
        });
        Some(self.open_placeholder(request, Some(target_message_id)))
    }

    fn open_placeholder(
        &mut self,
        request: StreamRequest,
        corrects_message_id: Option<i64>,
    ) -> TurnHandle {
        let placeholder = ChatMessage {
            corrects_message_id,
            ..ChatMessage::optimistic(Role::Assistant, "")
        };
        let slot = self.store.append(placeholder);
        let turn_id = self.allocate_turn_id();
        self.store.set_streaming(true);
        self.active_turn = Some(ActiveTurn { turn_id, slot });
        self.last_error = None;
        TurnHandle { turn_id, request }
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Token { turn_id, text } => {
                if text.is_empty() {
                    return;
                }
                if let Some(turn) = self.active_turn.filter(|turn| turn.turn_id == turn_id) {
                    self.store.append_to(turn.slot, &text);
                }
            }
            SessionEvent::ProposalReceived {
                conversation_id,
                proposal,
            } => {
                tracing::debug!(conversation_id, proposal_id = proposal.id, "proposal received");
                self.proposals.receive(conversation_id, proposal);
            }
            SessionEvent::StreamEnded { turn_id, outcome } => self.end_turn(turn_id, outcome),
            SessionEvent::MessagesLoaded {
                conversation_id,
                messages,
            } => self.load_messages(conversation_id, messages),
            SessionEvent::PendingProposalLoaded {
                conversation_id,
                proposal,
            } => {
                if self.deciding == Some(conversation_id) {
                    self.deciding = None;
                }
                self.proposals.refreshed(conversation_id, proposal);
            }
            SessionEvent::PreferencesLoaded(snapshot) => self.preferences = snapshot,
            SessionEvent::ConversationsLoaded(conversations) => self.conversations = conversations,
            SessionEvent::ConversationSelected { conversation_id } => {
                if !self.switch_conversation(conversation_id) {
                    tracing::warn!(conversation_id, "conversation switch refused while streaming");
                }
            }
            SessionEvent::ToolsLoaded(tools) => self.tools.set_catalog(tools),
            SessionEvent::ToolRunFinished { selection, result } => {
                if !self.tools.record_result(selection, result) {
                    tracing::debug!(selection, "dropping result for an older tool selection");
                }
            }
            SessionEvent::BackendError { context, message } => {
                tracing::warn!(%context, %message, "backend request failed");
                self.last_error = Some(format!("{context}: {message}"));
            }
            SessionEvent::DecisionFailed {
                conversation_id,
                context,
                message,
            } => {
                tracing::warn!(conversation_id, %context, %message, "proposal decision failed");
                if self.deciding == Some(conversation_id) {
                    self.deciding = None;
                }
                self.last_error = Some(format!("{context}: {message}"));
            }
        }
    }

    fn end_turn(&mut self, turn_id: u64, outcome: StreamOutcome) {
        let Some(turn) = self.active_turn.filter(|turn| turn.turn_id == turn_id) else {
            tracing::debug!(turn_id, "ignoring end of a stale turn");
            return;
        };
        self.active_turn = None;
        self.store.set_streaming(false);

        if let StreamOutcome::Failed(reason) = outcome {
            let blank = self
                .store
                .message(turn.slot)
                .is_some_and(|message| message.content.trim().is_empty());
            if blank {
                self.store.set_content(turn.slot, STREAM_FAILURE_MARKER);
            }
            self.last_error = Some(reason);
        }
    }

    fn load_messages(&mut self, conversation_id: i64, messages: Vec<ChatMessage>) {
        if self.active_conversation_id() != Some(conversation_id) || self.is_streaming() {
            tracing::debug!(conversation_id, "dropping message list for an inactive or streaming view");
            return;
        }
        self.store.replace_messages(messages);

        let causal_still_listed = self
            .tools
            .causal_message_id()
            .is_some_and(|id| self.store.find(id).is_some());
        if self.tools.causal_message_id().is_some() && !causal_still_listed {
            self.tools.clear_causal_message();
        }
    }
}
