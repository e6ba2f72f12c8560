use crate::api::ChatBackend;
use crate::state::conversation::{self, SessionEvent};
use crate::state::{proposals, tool_gate, ChatSession, GateError};
use crate::types::ProposalDecision;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Owns the session and spawns the background requests that feed it. All
/// mutation happens on the loop task through [`RuntimeContext::apply`].
pub struct RuntimeContext {
    backend: Arc<dyn ChatBackend>,
    session: ChatSession,
    preference_scope: String,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    turn_cancel: Option<CancellationToken>,
}

impl RuntimeContext {
    pub fn new(backend: Arc<dyn ChatBackend>, preference_scope: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            session: ChatSession::new(),
            preference_scope: preference_scope.into(),
            events_tx,
            events_rx,
            turn_cancel: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.session
    }

    pub fn preference_scope(&self) -> &str {
        &self.preference_scope
    }

    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<dyn ChatBackend>, mpsc::UnboundedSender<SessionEvent>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(task(Arc::clone(&self.backend), self.events_tx.clone()));
    }

    pub fn bootstrap(&self) {
        let scope = self.preference_scope.clone();
        self.spawn(|backend, tx| async move {
            conversation::bootstrap(backend.as_ref(), &scope, &tx).await;
        });
    }

    /// Sends a user message. Returns `false` when the session refused it.
    pub fn start_turn(&mut self, input: &str) -> bool {
        let Some(turn) = self.session.begin_turn(input) else {
            return false;
        };
        self.launch_turn(turn);
        true
    }

    pub fn regenerate(&mut self, target_message_id: i64) -> bool {
        let Some(turn) = self.session.begin_regenerate(target_message_id) else {
            return false;
        };
        self.launch_turn(turn);
        true
    }

    fn launch_turn(&mut self, turn: conversation::TurnHandle) {
        let cancel = CancellationToken::new();
        self.turn_cancel = Some(cancel.clone());
        self.spawn(|backend, tx| async move {
            conversation::drive_turn(backend.as_ref(), turn, cancel, &tx).await;
        });
    }

    /// Signals the running stream to stop. Returns `false` when idle.
    pub fn cancel_turn(&mut self) -> bool {
        match self.turn_cancel.as_ref() {
            Some(token) if self.session.is_streaming() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn switch_conversation(&mut self, conversation_id: i64) -> bool {
        if !self.session.switch_conversation(conversation_id) {
            return false;
        }
        self.spawn(move |backend, tx| async move {
            conversation::load_conversation(backend.as_ref(), conversation_id, &tx).await;
        });
        true
    }

    pub fn new_conversation(&self) -> bool {
        if self.session.is_streaming() {
            return false;
        }
        self.spawn(|backend, tx| async move {
            conversation::create_conversation(backend.as_ref(), &tx).await;
        });
        true
    }

    pub fn refresh_conversations(&self) {
        self.spawn(|backend, tx| async move {
            conversation::refresh_conversations(backend.as_ref(), &tx).await;
        });
    }

    pub fn decide_proposal(&mut self, decision: ProposalDecision) -> bool {
        let Some(request) = self.session.begin_decision(decision) else {
            return false;
        };
        let scope = self.preference_scope.clone();
        self.spawn(move |backend, tx| async move {
            proposals::decide_proposal(backend.as_ref(), request, &scope, &tx).await;
        });
        true
    }

    pub fn refresh_preferences(&self) {
        let scope = self.preference_scope.clone();
        self.spawn(|backend, tx| async move {
            proposals::load_preferences(backend.as_ref(), &scope, &tx).await;
        });
    }

    pub fn reset_preferences(&self) {
        let scope = self.preference_scope.clone();
        self.spawn(|backend, tx| async move {
            proposals::reset_preferences(backend.as_ref(), &scope, &tx).await;
        });
    }

    pub fn refresh_tools(&self) {
        self.spawn(|backend, tx| async move {
            tool_gate::load_tools(backend.as_ref(), &tx).await;
        });
    }

    /// Validates the current tool form and sends it. Nothing reaches the
    /// backend when validation fails.
    pub fn run_tool(&mut self) -> Result<(), GateError> {
        let run = self.session.prepare_tool_run()?;
        self.spawn(|backend, tx| async move {
            tool_gate::run_tool(backend.as_ref(), run, &tx).await;
        });
        Ok(())
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn apply(&mut self, event: SessionEvent) {
        let ends_turn = matches!(
            &event,
            SessionEvent::StreamEnded { turn_id, .. } if Some(*turn_id) == self.session.active_turn_id()
        );
        self.session.apply(event);
        if ends_turn {
            self.turn_cancel = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{sse, BackendCall, MockBackend, MockStream};
    use crate::types::{ChatMessage, Role, ToolDefinition};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn context(backend: &MockBackend) -> RuntimeContext {
        RuntimeContext::new(Arc::new(backend.clone()), "global")
    }

    async fn pump_until(ctx: &mut RuntimeContext, done: impl Fn(&ChatSession) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done(ctx.session()) {
                let Some(event) = ctx.next_event().await else {
                    break;
                };
                ctx.apply(event);
            }
        })
        .await
        .expect("session reached the expected state");
    }

    #[tokio::test]
    async fn test_start_turn_streams_through_the_runtime() {
        let backend = MockBackend::new();
        backend.push_stream(MockStream::Chunks(vec![
            sse(json!({"token": "Hi"})),
            sse(json!({"done": true})),
        ]));
        let mut ctx = context(&backend);
        ctx.session_mut().switch_conversation(7);

        assert!(ctx.start_turn("Hello"));
        assert!(!ctx.start_turn("again"), "second send is refused mid-stream");
        pump_until(&mut ctx, |s| !s.is_streaming()).await;

        assert!(!ctx.cancel_turn());
        assert_eq!(
            backend.call_count(|c| matches!(c, BackendCall::OpenStream(_))),
            1
        );
    }

    #[tokio::test]
    async fn test_cancel_turn_stops_hanging_stream() {
        let backend = MockBackend::new();
        backend.push_stream(MockStream::ChunksThenHang(vec![sse(json!({"token": "Hi"}))]));
        let mut ctx = context(&backend);
        ctx.session_mut().switch_conversation(7);

        assert!(ctx.start_turn("Hello"));
        pump_until(&mut ctx, |s| s.messages().get(1).is_some_and(|m| m.content == "Hi")).await;
        assert!(ctx.cancel_turn());
        pump_until(&mut ctx, |s| !s.is_streaming()).await;
        assert!(ctx
            .session()
            .messages()
            .iter()
            .all(|m| !m.content.starts_with("(error)")));
    }

    #[tokio::test]
    async fn test_unconfirmed_run_command_sends_nothing() {
        let backend = MockBackend::new();
        let mut ctx = context(&backend);
        ctx.session_mut().switch_conversation(7);
        ctx.apply(SessionEvent::MessagesLoaded {
            conversation_id: 7,
            messages: vec![ChatMessage {
                id: Some(11),
                ..ChatMessage::optimistic(Role::User, "list the repo")
            }],
        });
        ctx.apply(SessionEvent::ToolsLoaded(vec![ToolDefinition {
            tool_id: "run_command".to_string(),
            description: "Run an allowlisted command".to_string(),
            input_schema: Value::Null,
            output_schema: Value::Null,
            requires_confirmation: true,
            requires_network: false,
        }]));

        let session = ctx.session_mut();
        session.tool_gate_mut().select_tool("run_command").unwrap();
        session.choose_causal_message(11).unwrap();
        session.tool_gate_mut().set_input(r#"{"command": "ls"}"#);

        assert!(matches!(
            ctx.run_tool(),
            Err(GateError::ConfirmationRequired(_))
        ));
        tokio::task::yield_now().await;
        assert!(backend.calls().is_empty());
        assert!(ctx.session().tool_gate().error().is_some());
    }

    #[tokio::test]
    async fn test_switch_is_refused_while_streaming() {
        let backend = MockBackend::new();
        backend.push_stream(MockStream::ChunksThenHang(Vec::new()));
        let mut ctx = context(&backend);
        ctx.session_mut().switch_conversation(7);
        assert!(ctx.start_turn("Hello"));

        assert!(!ctx.switch_conversation(8));
        assert!(!ctx.new_conversation());
        assert_eq!(ctx.session().active_conversation_id(), Some(7));
        ctx.cancel_turn();
    }
}
