use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of a conversation. `id` is `None` for optimistic entries that the
/// backend has not persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects_message_id: Option<i64>,
}

impl ChatMessage {
    pub fn optimistic(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            timestamp: None,
            corrects_message_id: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub message_count: u64,
}

impl Conversation {
    pub fn label(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Conversation {}", self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceProposal {
    pub id: i64,
    pub conversation_id: i64,
    pub key: String,
    pub value: String,
    pub proposal_text: String,
    #[serde(default)]
    pub rationale: Option<String>,
    pub status: ProposalStatus,
    pub created_at: String,
    #[serde(default)]
    pub decided_at: Option<String>,
    #[serde(default)]
    pub causality_message_id: Option<i64>,
    #[serde(default)]
    pub assistant_message_id: Option<i64>,
}

impl PreferenceProposal {
    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PendingProposals {
    #[serde(default)]
    pub proposals: Vec<PreferenceProposal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalDecision {
    Approve,
    Reject,
}

impl ProposalDecision {
    pub fn path_segment(self) -> &'static str {
        match self {
            ProposalDecision::Approve => "approve",
            ProposalDecision::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredPreference {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub scope: String,
    pub created_at: String,
    #[serde(default)]
    pub approved_event_id: Option<i64>,
    #[serde(default)]
    pub source_proposal_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceReset {
    pub id: i64,
    pub created_at: String,
    #[serde(default)]
    pub reset_event_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferencesSnapshot {
    pub scope: String,
    #[serde(default)]
    pub reset: Option<PreferenceReset>,
    #[serde(default)]
    pub preferences: Vec<StoredPreference>,
}

impl PreferencesSnapshot {
    /// Key/value view where a later row for the same key shadows earlier ones.
    pub fn effective(&self) -> std::collections::BTreeMap<&str, &str> {
        self.preferences
            .iter()
            .map(|pref| (pref.key.as_str(), pref.value.as_str()))
            .collect()
    }
}

/// Tool catalog entry. Both requirement flags are mandatory on the wire: a
/// definition that omits either one does not decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(alias = "id")]
    pub tool_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Value,
    pub requires_confirmation: bool,
    pub requires_network: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolCatalog {
    Bare(Vec<ToolDefinition>),
    Wrapped { tools: Vec<ToolDefinition> },
}

impl ToolCatalog {
    pub fn into_tools(self) -> Vec<ToolDefinition> {
        match self {
            ToolCatalog::Bare(tools) | ToolCatalog::Wrapped { tools } => tools,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRunRequest {
    pub tool_id: String,
    pub tool_input: Value,
    pub conversation_id: i64,
    pub causality_message_id: i64,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRunResult {
    pub success: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub content: String,
    pub conversation_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegenerateRequest {
    pub conversation_id: i64,
    pub target_message_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest {
    Chat(ChatRequest),
    Regenerate(RegenerateRequest),
}

impl StreamRequest {
    pub fn conversation_id(&self) -> i64 {
        match self {
            StreamRequest::Chat(req) => req.conversation_id,
            StreamRequest::Regenerate(req) => req.conversation_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedConversation {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationCreate<'a> {
    pub title: Option<&'a str>,
}

/// One decoded record of the `/chat` stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub token: Option<String>,
    pub proposal: Option<PreferenceProposal>,
    pub done: bool,
}

impl StreamEvent {
    /// Builds an event from a frame payload. Only JSON objects are events; a
    /// `proposal` field that does not decode is dropped without losing the rest
    /// of the frame.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let Value::Object(mut fields) = payload else {
            return None;
        };

        let token = match fields.remove("token") {
            Some(Value::String(text)) => Some(text),
            _ => None,
        };
        let done = matches!(fields.get("done"), Some(Value::Bool(true)));
        let proposal = match fields.remove("proposal") {
            Some(raw @ Value::Object(_)) => match serde_json::from_value(raw) {
                Ok(proposal) => Some(proposal),
                Err(error) => {
                    tracing::debug!(%error, "ignoring undecodable proposal in stream frame");
                    None
                }
            },
            _ => None,
        };

        Some(Self {
            token,
            proposal,
            done,
        })
    }

    pub fn token_text(&self) -> Option<&str> {
        self.token.as_deref().filter(|text| !text.is_empty())
    }
}
