use crate::api::ChatBackend;
use crate::state::conversation::{emit_session_event, SessionEvent};
use crate::types::{PreferenceProposal, ProposalDecision, ProposalStatus};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// What the tracker knows about one conversation's proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProposalState<'a> {
    None,
    Pending(&'a PreferenceProposal),
    Decided(ProposalStatus),
}

/// At most one proposal per conversation. Every update replaces the previous
/// value outright; proposal ids are not compared.
#[derive(Debug, Default)]
pub struct ProposalTracker {
    by_conversation: HashMap<i64, PreferenceProposal>,
}

impl ProposalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A proposal delivered inside the chat stream.
    pub fn receive(&mut self, conversation_id: i64, proposal: PreferenceProposal) {
        self.by_conversation.insert(conversation_id, proposal);
    }

    /// Result of the pending-proposal query.
    pub fn refreshed(&mut self, conversation_id: i64, proposal: Option<PreferenceProposal>) {
        match proposal {
            Some(proposal) => {
                self.by_conversation.insert(conversation_id, proposal);
            }
            None => {
                self.by_conversation.remove(&conversation_id);
            }
        }
    }

    pub fn state(&self, conversation_id: i64) -> ProposalState<'_> {
        match self.by_conversation.get(&conversation_id) {
            None => ProposalState::None,
            Some(proposal) if proposal.is_pending() => ProposalState::Pending(proposal),
            Some(proposal) => ProposalState::Decided(proposal.status),
        }
    }

    /// The proposal to show, which is only ever a pending one.
    pub fn current(&self, conversation_id: i64) -> Option<&PreferenceProposal> {
        match self.state(conversation_id) {
            ProposalState::Pending(proposal) => Some(proposal),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.by_conversation.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionRequest {
    pub proposal_id: i64,
    pub conversation_id: i64,
    pub decision: ProposalDecision,
}

/// Re-runs the pending query. A failed query counts as "no proposal".
pub async fn refresh_pending(
    backend: &dyn ChatBackend,
    conversation_id: i64,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let proposal = match backend.pending_proposals(conversation_id).await {
        Ok(proposals) => proposals.into_iter().next(),
        Err(error) => {
            tracing::warn!(conversation_id, %error, "pending proposal query failed");
            None
        }
    };
    emit_session_event(
        events,
        SessionEvent::PendingProposalLoaded {
            conversation_id,
            proposal,
        },
    );
}

pub async fn load_preferences(
    backend: &dyn ChatBackend,
    scope: &str,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    let snapshot = match backend.preferences(scope).await {
        Ok(snapshot) => Some(snapshot),
        Err(error) => {
            tracing::warn!(scope, %error, "preferences query failed");
            None
        }
    };
    emit_session_event(events, SessionEvent::PreferencesLoaded(snapshot));
}

/// Sends the decision, then trusts only what the backend reports afterwards.
pub async fn decide_proposal(
    backend: &dyn ChatBackend,
    request: DecisionRequest,
    scope: &str,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    if let Err(error) = backend
        .decide_proposal(request.proposal_id, request.decision)
        .await
    {
        tracing::warn!(proposal_id = request.proposal_id, %error, "proposal decision failed");
        emit_session_event(
            events,
            SessionEvent::DecisionFailed {
                conversation_id: request.conversation_id,
                context: format!("{} proposal", request.decision.path_segment()),
                message: error.to_string(),
            },
        );
        return;
    }

    tracing::info!(
        proposal_id = request.proposal_id,
        decision = request.decision.path_segment(),
        "proposal decided"
    );
    refresh_pending(backend, request.conversation_id, events).await;
    if request.decision == ProposalDecision::Approve {
        load_preferences(backend, scope, events).await;
    }
}

pub async fn reset_preferences(
    backend: &dyn ChatBackend,
    scope: &str,
    events: &mpsc::UnboundedSender<SessionEvent>,
) {
    if let Err(error) = backend.reset_preferences(scope).await {
        emit_session_event(
            events,
            SessionEvent::BackendError {
                context: "reset preferences".to_string(),
                message: error.to_string(),
            },
        );
        return;
    }
    load_preferences(backend, scope, events).await;
}
