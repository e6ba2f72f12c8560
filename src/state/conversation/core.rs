use super::state::{SessionEvent, StreamOutcome, TurnHandle};
use crate::api::{ChatBackend, StreamParser};
use crate::state::proposals::{load_preferences, refresh_pending};
use crate::state::tool_gate::load_tools;
use crate::types::StreamEvent;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_CONVERSATION_TITLE: &str = "Chat";

pub(crate) fn emit_session_event(
    events: &mpsc::UnboundedSender<SessionEvent>,
    event: SessionEvent,
) {
    // The receiver only goes away when the runtime is shutting down.
    let _ = events.send(event);
}

/// Runs one streamed turn to its end and reports the outcome. Completed and
/// cancelled turns are reconciled against the backend; failed ones keep the
/// local view.
pub async fn drive_turn(
    backend: &dyn ChatBackend,
    turn: TurnHandle,
    cancel: CancellationToken,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> StreamOutcome {
    let conversation_id = turn.request.conversation_id();
    let outcome = stream_turn(backend, &turn, conversation_id, &cancel, events).await;

    match &outcome {
        StreamOutcome::Failed(reason) => {
            tracing::warn!(turn_id = turn.turn_id, conversation_id, %reason, "stream failed")
        }
        other => tracing::info!(turn_id = turn.turn_id, conversation_id, outcome = ?other, "stream finished"),
    }
    emit_session_event(
        events,
        SessionEvent::StreamEnded {
            turn_id: turn.turn_id,
            outcome: outcome.clone(),
        },
    );

    if matches!(outcome, StreamOutcome::Completed | StreamOutcome::Cancelled) {
        reconcile(backend, conversation_id, events).await;
    }
    outcome
}

async fn stream_turn(
    backend: &dyn ChatBackend,
    turn: &TurnHandle,
    conversation_id: i64,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> StreamOutcome {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return StreamOutcome::Cancelled,
        opened = backend.open_stream(&turn.request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(error) => return StreamOutcome::Failed(error.to_string()),
    };

    let mut parser = StreamParser::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            next = stream.next() => next,
        };

        let frames = match next {
            Some(Ok(chunk)) => parser.process(&chunk),
            Some(Err(error)) => return StreamOutcome::Failed(error.to_string()),
            None => {
                if forward_frames(turn.turn_id, conversation_id, parser.finish(), events) {
                    return StreamOutcome::Completed;
                }
                return StreamOutcome::Failed("stream ended before completion".to_string());
            }
        };

        if forward_frames(turn.turn_id, conversation_id, frames, events) {
            return StreamOutcome::Completed;
        }
    }
}

/// Forwards decoded frames in order. Returns `true` once a completion frame is
/// seen; anything after it is ignored.
fn forward_frames(
    turn_id: u64,
    conversation_id: i64,
    frames: Vec<StreamEvent>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> bool {
    for frame in frames {
        if let Some(proposal) = frame.proposal {
            emit_session_event(
                events,
                SessionEvent::ProposalReceived {
                    conversation_id,
                    proposal,
                },
            );
        }
        if let Some(text) = frame.token.filter(|text| !text.is_empty()) {
            emit_session_event(events, SessionEvent::Token { turn_id, text });
        }
        if frame.done {
            return true;
        }
    }
    false
}

/// Replaces the optimistic view with the backend's record of the conversation.
pub async fn reconcile(
    backend: &dyn ChatBackend,
    conversation_id: i64,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    match backend.list_messages(conversation_id).await {
        Ok(messages) => {
            tracing::debug!(conversation_id, count = messages.len(), "messages reconciled");
            emit_session_event(
                events,
                SessionEvent::MessagesLoaded {
                    conversation_id,
                    messages,
                },
            );
        }
        Err(error) => emit_session_event(
            events,
            SessionEvent::BackendError {
                context: "reload messages".to_string(),
                message: error.to_string(),
            },
        ),
    }
    refresh_pending(backend, conversation_id, events).await;
}

pub async fn load_conversation(
    backend: &dyn ChatBackend,
    conversation_id: i64,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    reconcile(backend, conversation_id, events).await;
}

pub async fn refresh_conversations(
    backend: &dyn ChatBackend,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    match backend.list_conversations().await {
        Ok(conversations) => {
            emit_session_event(events, SessionEvent::ConversationsLoaded(conversations))
        }
        Err(error) => emit_session_event(
            events,
            SessionEvent::BackendError {
                context: "list conversations".to_string(),
                message: error.to_string(),
            },
        ),
    }
}

/// Start-up sequence: pick (or create) a conversation and load it, alongside
/// the preferences snapshot and the tool catalog.
pub async fn bootstrap(
    backend: &dyn ChatBackend,
    scope: &str,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    tokio::join!(
        open_first_conversation(backend, events),
        load_preferences(backend, scope, events),
        load_tools(backend, events),
    );
}

async fn open_first_conversation(
    backend: &dyn ChatBackend,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let mut conversations = match backend.list_conversations().await {
        Ok(conversations) => conversations,
        Err(error) => {
            emit_session_event(
                events,
                SessionEvent::BackendError {
                    context: "list conversations".to_string(),
                    message: error.to_string(),
                },
            );
            return;
        }
    };

    let selected = match conversations.first().map(|conversation| conversation.id) {
        Some(id) => id,
        None => {
            let created = match backend
                .create_conversation(Some(DEFAULT_CONVERSATION_TITLE))
                .await
            {
                Ok(id) => id,
                Err(error) => {
                    emit_session_event(
                        events,
                        SessionEvent::BackendError {
                            context: "create conversation".to_string(),
                            message: error.to_string(),
                        },
                    );
                    return;
                }
            };
            tracing::info!(conversation_id = created, "created initial conversation");
            conversations = backend.list_conversations().await.unwrap_or_default();
            created
        }
    };

    emit_session_event(events, SessionEvent::ConversationsLoaded(conversations));
    select_and_load(backend, selected, events).await;
}

async fn select_and_load(
    backend: &dyn ChatBackend,
    conversation_id: i64,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    emit_session_event(events, SessionEvent::ConversationSelected { conversation_id });
    load_conversation(backend, conversation_id, events).await;
}

/// Creates an untitled conversation and makes it active with an empty view.
pub async fn create_conversation(
    backend: &dyn ChatBackend,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let conversation_id = match backend.create_conversation(None).await {
        Ok(id) => id,
        Err(error) => {
            emit_session_event(
                events,
                SessionEvent::BackendError {
                    context: "create conversation".to_string(),
                    message: error.to_string(),
                },
            );
            return;
        }
    };
    tracing::info!(conversation_id, "conversation created");
    refresh_conversations(backend, events).await;
    emit_session_event(events, SessionEvent::ConversationSelected { conversation_id });
}
