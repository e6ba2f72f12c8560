use super::history::{ConversationStore, MessageSlot};
use crate::state::proposals::{DecisionRequest, ProposalState, ProposalTracker};
use crate::state::tool_gate::{GateError, ToolGate, ToolRun};
use crate::types::{
    ChatMessage, Conversation, PreferenceProposal, PreferencesSnapshot, ProposalDecision, Role,
    StreamRequest, ToolDefinition, ToolRunResult,
};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Everything a background task needs to run one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnHandle {
    pub turn_id: u64,
    pub request: StreamRequest,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct ActiveTurn {
    pub(super) turn_id: u64,
    pub(super) slot: MessageSlot,
}

/// Results of background I/O. The session only changes through these.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Token {
        turn_id: u64,
        text: String,
    },
    ProposalReceived {
        conversation_id: i64,
        proposal: PreferenceProposal,
    },
    StreamEnded {
        turn_id: u64,
        outcome: StreamOutcome,
    },
    MessagesLoaded {
        conversation_id: i64,
        messages: Vec<ChatMessage>,
    },
    PendingProposalLoaded {
        conversation_id: i64,
        proposal: Option<PreferenceProposal>,
    },
    PreferencesLoaded(Option<PreferencesSnapshot>),
    ConversationsLoaded(Vec<Conversation>),
    ConversationSelected {
        conversation_id: i64,
    },
    ToolsLoaded(Vec<ToolDefinition>),
    ToolRunFinished {
        selection: u64,
        result: Result<ToolRunResult, String>,
    },
    BackendError {
        context: String,
        message: String,
    },
    /// A proposal decision the backend refused or never received.
    DecisionFailed {
        conversation_id: i64,
        context: String,
        message: String,
    },
}

pub struct ChatSession {
    pub(super) store: ConversationStore,
    pub(super) proposals: ProposalTracker,
    pub(super) tools: ToolGate,
    pub(super) preferences: Option<PreferencesSnapshot>,
    pub(super) conversations: Vec<Conversation>,
    pub(super) active_turn: Option<ActiveTurn>,
    pub(super) next_turn_id: u64,
    pub(super) last_error: Option<String>,
    /// Conversation whose proposal decision has been sent but not yet
    /// followed by a pending-proposal refresh.
    pub(super) deciding: Option<i64>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            store: ConversationStore::new(),
            proposals: ProposalTracker::new(),
            tools: ToolGate::new(),
            preferences: None,
            conversations: Vec::new(),
            active_turn: None,
            next_turn_id: 1,
            last_error: None,
            deciding: None,
        }
    }

    pub fn active_conversation_id(&self) -> Option<i64> {
        self.store.active_conversation_id()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    pub fn is_streaming(&self) -> bool {
        self.store.is_streaming()
    }

    pub fn active_turn_id(&self) -> Option<u64> {
        self.active_turn.map(|turn| turn.turn_id)
    }

    /// Index of the message the running turn writes into.
    pub fn streaming_slot(&self) -> Option<usize> {
        self.active_turn.map(|turn| turn.slot.index())
    }

    pub fn proposal_state(&self) -> ProposalState<'_> {
        match self.active_conversation_id() {
            Some(id) => self.proposals.state(id),
            None => ProposalState::None,
        }
    }

    pub fn pending_proposal(&self) -> Option<&PreferenceProposal> {
        self.proposals.current(self.active_conversation_id()?)
    }

    pub fn preferences(&self) -> Option<&PreferencesSnapshot> {
        self.preferences.as_ref()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn tool_gate(&self) -> &ToolGate {
        &self.tools
    }

    pub fn tool_gate_mut(&mut self) -> &mut ToolGate {
        &mut self.tools
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Switches the active conversation. Refused while a stream is running.
    pub fn switch_conversation(&mut self, conversation_id: i64) -> bool {
        if self.is_streaming() {
            return false;
        }
        self.store.switch_to(conversation_id);
        self.proposals.clear();
        self.tools.reset_for_conversation();
        self.last_error = None;
        self.deciding = None;
        true
    }

    pub fn is_deciding(&self) -> bool {
        self.deciding.is_some()
    }

    /// Claims the pending proposal for one decision. Refused while streaming
    /// and while an earlier decision is still awaiting its refresh.
    pub fn begin_decision(&mut self, decision: ProposalDecision) -> Option<DecisionRequest> {
        if self.is_streaming() || self.deciding.is_some() {
            return None;
        }
        let conversation_id = self.active_conversation_id()?;
        let proposal = self.proposals.current(conversation_id)?;
        self.deciding = Some(conversation_id);
        Some(DecisionRequest {
            proposal_id: proposal.id,
            conversation_id,
            decision,
        })
    }

    /// Picks the user message a tool run is attributed to.
    pub fn choose_causal_message(&mut self, message_id: i64) -> Result<(), GateError> {
        if self.active_conversation_id().is_none() {
            return Err(GateError::NoConversation);
        }
        match self.store.find(message_id) {
            Some(message) if message.role == Role::User => {
                self.tools.set_causal_message(Some(message_id));
                Ok(())
            }
            _ => Err(GateError::UnknownCausalMessage(message_id)),
        }
    }

    pub fn prepare_tool_run(&mut self) -> Result<ToolRun, GateError> {
        let conversation_id = self.active_conversation_id();
        self.tools.prepare_run(conversation_id)
    }

    pub(super) fn allocate_turn_id(&mut self) -> u64 {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        id
    }
}
