use crate::api::client::{ByteStream, ChatBackend};
use crate::types::{
    ChatMessage, Conversation, PreferenceProposal, PreferencesSnapshot, ProposalDecision,
    StreamRequest, ToolDefinition, ToolRunRequest, ToolRunResult,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// One scripted response for `open_stream`.
pub enum MockStream {
    Chunks(Vec<String>),
    ChunksThenError(Vec<String>, String),
    /// Serves the chunks, cancels the token, then never yields again.
    ChunksThenCancel(Vec<String>, CancellationToken),
    ChunksThenHang(Vec<String>),
    OpenError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    OpenStream(StreamRequest),
    ListMessages(i64),
    PendingProposals(i64),
    DecideProposal(i64, ProposalDecision),
    Preferences(String),
    ResetPreferences(String),
    ListTools,
    RunTool(ToolRunRequest),
    ListConversations,
    CreateConversation(Option<String>),
}

#[derive(Default)]
struct MockState {
    streams: VecDeque<MockStream>,
    messages: HashMap<i64, Vec<ChatMessage>>,
    pending: HashMap<i64, Vec<PreferenceProposal>>,
    preferences: Option<PreferencesSnapshot>,
    tools: Vec<ToolDefinition>,
    tool_results: VecDeque<ToolRunResult>,
    conversations: Vec<Conversation>,
    next_conversation_id: i64,
    failures: HashMap<&'static str, String>,
    calls: Vec<BackendCall>,
}

/// Scripted in-memory backend that records every call it receives.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

/// Frames one payload the way the backend writes it.
pub fn sse(payload: serde_json::Value) -> String {
    format!("data: {payload}\n\n")
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().next_conversation_id = 100;
        backend
    }

    pub fn push_stream(&self, stream: MockStream) {
        self.state.lock().unwrap().streams.push_back(stream);
    }

    pub fn set_messages(&self, conversation_id: i64, messages: Vec<ChatMessage>) {
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(conversation_id, messages);
    }

    pub fn set_pending(&self, conversation_id: i64, proposals: Vec<PreferenceProposal>) {
        self.state
            .lock()
            .unwrap()
            .pending
            .insert(conversation_id, proposals);
    }

    pub fn set_preferences(&self, snapshot: PreferencesSnapshot) {
        self.state.lock().unwrap().preferences = Some(snapshot);
    }

    pub fn set_tools(&self, tools: Vec<ToolDefinition>) {
        self.state.lock().unwrap().tools = tools;
    }

    pub fn push_tool_result(&self, result: ToolRunResult) {
        self.state.lock().unwrap().tool_results.push_back(result);
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.state.lock().unwrap().conversations = conversations;
    }

    /// Makes the named trait method fail with `message` until cleared.
    pub fn fail(&self, endpoint: &'static str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(endpoint, message.to_string());
    }

    pub fn clear_failure(&self, endpoint: &'static str) {
        self.state.lock().unwrap().failures.remove(endpoint);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, matches: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, endpoint: &'static str, call: BackendCall) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.get(endpoint) {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

fn chunk_stream(chunks: Vec<String>) -> impl futures::Stream<Item = Result<Bytes>> + Send {
    stream::iter(chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))))
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        self.record("open_stream", BackendCall::OpenStream(request.clone()))?;
        let scripted = self
            .state
            .lock()
            .unwrap()
            .streams
            .pop_front()
            .ok_or_else(|| anyhow!("MockBackend: no more streams configured"))?;

        let stream: ByteStream = match scripted {
            MockStream::Chunks(chunks) => Box::pin(chunk_stream(chunks)),
            MockStream::ChunksThenError(chunks, message) => Box::pin(
                chunk_stream(chunks).chain(stream::once(async move { Err(anyhow!(message)) })),
            ),
            MockStream::ChunksThenCancel(chunks, token) => Box::pin(
                chunk_stream(chunks)
                    .chain(
                        stream::once(async move { token.cancel() })
                            .filter_map(|()| future::ready(None::<Result<Bytes>>)),
                    )
                    .chain(stream::pending()),
            ),
            MockStream::ChunksThenHang(chunks) => {
                Box::pin(chunk_stream(chunks).chain(stream::pending()))
            }
            MockStream::OpenError(message) => return Err(anyhow!(message)),
        };
        Ok(stream)
    }

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessage>> {
        self.record("list_messages", BackendCall::ListMessages(conversation_id))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn pending_proposals(&self, conversation_id: i64) -> Result<Vec<PreferenceProposal>> {
        self.record(
            "pending_proposals",
            BackendCall::PendingProposals(conversation_id),
        )?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .pending
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn decide_proposal(&self, proposal_id: i64, decision: ProposalDecision) -> Result<()> {
        self.record(
            "decide_proposal",
            BackendCall::DecideProposal(proposal_id, decision),
        )?;
        let mut state = self.state.lock().unwrap();
        for proposals in state.pending.values_mut() {
            proposals.retain(|proposal| proposal.id != proposal_id);
        }
        Ok(())
    }

    async fn preferences(&self, scope: &str) -> Result<PreferencesSnapshot> {
        self.record("preferences", BackendCall::Preferences(scope.to_string()))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .preferences
            .clone()
            .unwrap_or_else(|| PreferencesSnapshot {
                scope: scope.to_string(),
                reset: None,
                preferences: Vec::new(),
            }))
    }

    async fn reset_preferences(&self, scope: &str) -> Result<()> {
        self.record(
            "reset_preferences",
            BackendCall::ResetPreferences(scope.to_string()),
        )?;
        if let Some(snapshot) = self.state.lock().unwrap().preferences.as_mut() {
            snapshot.preferences.clear();
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        self.record("list_tools", BackendCall::ListTools)?;
        Ok(self.state.lock().unwrap().tools.clone())
    }

    async fn run_tool(&self, request: &ToolRunRequest) -> Result<ToolRunResult> {
        self.record("run_tool", BackendCall::RunTool(request.clone()))?;
        self.state
            .lock()
            .unwrap()
            .tool_results
            .pop_front()
            .ok_or_else(|| anyhow!("MockBackend: no tool result configured"))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.record("list_conversations", BackendCall::ListConversations)?;
        Ok(self.state.lock().unwrap().conversations.clone())
    }

    async fn create_conversation(&self, title: Option<&str>) -> Result<i64> {
        self.record(
            "create_conversation",
            BackendCall::CreateConversation(title.map(str::to_string)),
        )?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_conversation_id;
        state.next_conversation_id += 1;
        state.conversations.insert(
            0,
            Conversation {
                id,
                title: title.map(str::to_string),
                created_at: "2025-01-01 00:00:00".to_string(),
                message_count: 0,
            },
        );
        Ok(id)
    }
}
