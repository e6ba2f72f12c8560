use crate::api::ChatBackend;
use crate::state::conversation::{emit_session_event, SessionEvent};
use crate::types::{ToolDefinition, ToolRunRequest, ToolRunResult};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

const TOOL_RUN_FAILED: &str = "Tool run failed.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("no active conversation")]
    NoConversation,
    #[error("select a tool first")]
    NoToolSelected,
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("choose the user message that caused this run")]
    MissingCausalMessage,
    #[error("message {0} is not a saved user message in this conversation")]
    UnknownCausalMessage(i64),
    #[error("tool '{0}' requires confirmation")]
    ConfirmationRequired(String),
    #[error("tool input is not valid JSON: {0}")]
    InvalidInput(String),
    #[error("a tool run is already in progress")]
    RunInProgress,
}

/// A validated request together with the selection generation it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub selection: u64,
    pub request: ToolRunRequest,
}

/// Tool selection and the checks that must pass before a run is sent.
#[derive(Debug, Default)]
pub struct ToolGate {
    catalog: Vec<ToolDefinition>,
    selected: Option<String>,
    causal_message_id: Option<i64>,
    confirmed: bool,
    input_text: String,
    last_result: Option<ToolRunResult>,
    error: Option<String>,
    running: bool,
    selection: u64,
}

impl ToolGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    pub fn set_catalog(&mut self, tools: Vec<ToolDefinition>) {
        self.catalog = tools;
        let still_listed = self
            .selected
            .as_deref()
            .is_some_and(|id| self.catalog.iter().any(|tool| tool.tool_id == id));
        if self.selected.is_some() && !still_listed {
            self.selected = None;
            self.reset_selection_state();
        }
    }

    pub fn select_tool(&mut self, tool_id: &str) -> Result<&ToolDefinition, GateError> {
        let Some(index) = self.catalog.iter().position(|tool| tool.tool_id == tool_id) else {
            return Err(GateError::UnknownTool(tool_id.to_string()));
        };
        self.selected = Some(tool_id.to_string());
        self.reset_selection_state();
        Ok(&self.catalog[index])
    }

    fn reset_selection_state(&mut self) {
        self.confirmed = false;
        self.last_result = None;
        self.error = None;
        self.running = false;
        self.selection += 1;
    }

    pub fn selected_tool(&self) -> Option<&ToolDefinition> {
        let id = self.selected.as_deref()?;
        self.catalog.iter().find(|tool| tool.tool_id == id)
    }

    pub fn causal_message_id(&self) -> Option<i64> {
        self.causal_message_id
    }

    pub(crate) fn set_causal_message(&mut self, message_id: Option<i64>) {
        self.causal_message_id = message_id;
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn set_confirmed(&mut self, confirmed: bool) {
        self.confirmed = confirmed;
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
    }

    pub fn last_result(&self) -> Option<&ToolRunResult> {
        self.last_result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn selection(&self) -> u64 {
        self.selection
    }

    /// `requires_network` is informational and never blocks a run.
    pub fn can_invoke(&self) -> bool {
        match self.selected_tool() {
            Some(tool) => {
                self.causal_message_id.is_some() && (!tool.requires_confirmation || self.confirmed)
            }
            None => false,
        }
    }

    /// Validates the run and builds its request. A failure is also kept as the
    /// gate's error text.
    pub fn prepare_run(&mut self, conversation_id: Option<i64>) -> Result<ToolRun, GateError> {
        match self.validate(conversation_id) {
            Ok(request) => {
                self.error = None;
                self.running = true;
                Ok(ToolRun {
                    selection: self.selection,
                    request,
                })
            }
            Err(error) => {
                self.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    fn validate(&self, conversation_id: Option<i64>) -> Result<ToolRunRequest, GateError> {
        let conversation_id = conversation_id.ok_or(GateError::NoConversation)?;
        if self.running {
            return Err(GateError::RunInProgress);
        }
        let tool = self.selected_tool().ok_or(GateError::NoToolSelected)?;
        let causality_message_id = self
            .causal_message_id
            .ok_or(GateError::MissingCausalMessage)?;
        if tool.requires_confirmation && !self.confirmed {
            return Err(GateError::ConfirmationRequired(tool.tool_id.clone()));
        }
        let tool_input = parse_tool_input(&self.input_text)?;

        Ok(ToolRunRequest {
            tool_id: tool.tool_id.clone(),
            tool_input,
            conversation_id,
            causality_message_id,
            confirmed: self.confirmed,
        })
    }

    /// Stores the outcome of a run. Returns `false` when the result belongs to
    /// an older selection and was dropped.
    pub fn record_result(&mut self, selection: u64, result: Result<ToolRunResult, String>) -> bool {
        if selection != self.selection {
            return false;
        }
        self.running = false;
        match result {
            Ok(result) if result.success => {
                self.error = None;
                self.last_result = Some(result);
            }
            Ok(result) => {
                let message = result
                    .error
                    .clone()
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| TOOL_RUN_FAILED.to_string());
                self.error = Some(message);
                self.last_result = Some(result);
            }
            Err(message) => {
                self.error = Some(message);
                self.last_result = None;
            }
        }
        true
    }

    pub fn clear_causal_message(&mut self) {
        self.causal_message_id = None;
        self.confirmed = false;
    }

    /// Drops everything tied to the previous conversation. The selected tool
    /// survives since the catalog is not per conversation, but a run still
    /// in flight is orphaned and its result will be discarded.
    pub fn reset_for_conversation(&mut self) {
        self.clear_causal_message();
        self.reset_selection_state();
    }
}

fn parse_tool_input(text: &str) -> Result<Value, GateError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(trimmed).map_err(|error| GateError::InvalidInput(error.to_string()))
}

pub async fn load_tools(backend: &dyn ChatBackend, events: &mpsc::UnboundedSender<SessionEvent>) {
    match backend.list_tools().await {
        Ok(tools) => {
            tracing::info!(count = tools.len(), "tool catalog loaded");
            emit_session_event(events, SessionEvent::ToolsLoaded(tools));
        }
        Err(error) => emit_session_event(
            events,
            SessionEvent::BackendError {
                context: "tool catalog".to_string(),
                message: error.to_string(),
            },
        ),
    }
}

pub async fn run_tool(
    backend: &dyn ChatBackend,
    run: ToolRun,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    tracing::info!(
        tool_id = %run.request.tool_id,
        causality_message_id = run.request.causality_message_id,
        confirmed = run.request.confirmed,
        "running tool"
    );
    let result = backend
        .run_tool(&run.request)
        .await
        .map_err(|error| error.to_string());
    emit_session_event(
        events,
        SessionEvent::ToolRunFinished {
            selection: run.selection,
            result,
        },
    );
}
