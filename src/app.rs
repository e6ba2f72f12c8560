mod command;

pub use command::{parse_command, Command, CommandError, HELP_LINES};

use crate::api::ApiClient;
use crate::config::Config;
use crate::runtime::context::RuntimeContext;
use crate::runtime::frontend::ScrollAction;
use crate::runtime::mode::RuntimeMode;
use crate::runtime::r#loop::Runtime;
use crate::state::{ChatSession, SessionEvent, StreamOutcome};
use crate::types::ProposalDecision;
use crate::util::preview_text;
use anyhow::Result;
use std::sync::Arc;

const MAX_NOTICES: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SidePanel {
    #[default]
    Preferences,
    Tools,
}

/// Rows scrolled up from the newest message; zero means follow the stream.
#[derive(Debug, Default)]
struct ScrollState {
    offset_from_bottom: usize,
}

pub struct TuiMode {
    notices: Vec<String>,
    scroll: ScrollState,
    side_panel: SidePanel,
    cancel_pending: bool,
    reset_armed: bool,
    pending_quit: bool,
    quit_requested: bool,
}

impl Default for TuiMode {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiMode {
    pub fn new() -> Self {
        Self {
            notices: Vec::new(),
            scroll: ScrollState::default(),
            side_panel: SidePanel::default(),
            cancel_pending: false,
            reset_armed: false,
            pending_quit: false,
            quit_requested: false,
        }
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub fn side_panel(&self) -> SidePanel {
        self.side_panel
    }

    pub fn scroll_offset_from_bottom(&self) -> usize {
        self.scroll.offset_from_bottom
    }

    pub fn status_line(&self, session: &ChatSession) -> String {
        let conversation = match session.active_conversation_id() {
            Some(id) => {
                let label = session
                    .conversations()
                    .iter()
                    .find(|conversation| conversation.id == id)
                    .map(|conversation| conversation.label())
                    .unwrap_or_else(|| format!("Conversation {id}"));
                format!("#{id} {label}")
            }
            None => "no conversation".to_string(),
        };
        let activity = if self.cancel_pending {
            "cancelling"
        } else if session.is_streaming() {
            "streaming"
        } else {
            "ready"
        };
        let tool = session
            .tool_gate()
            .selected_tool()
            .map(|tool| format!(" | tool:{}", tool.tool_id))
            .unwrap_or_default();
        format!("mygpt | {conversation} | {activity}{tool}")
    }

    fn notice(&mut self, line: impl Into<String>) {
        self.notices.push(line.into());
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    fn busy_notice(&mut self) {
        if self.cancel_pending {
            self.notice("[busy - cancelling current turn, input discarded]");
        } else {
            self.notice("[busy - turn in progress, input discarded]");
        }
    }

    fn run_command(&mut self, command: Command, ctx: &mut RuntimeContext) {
        if command != Command::Reset {
            self.reset_armed = false;
        }

        match command {
            Command::Send(text) => self.send(text, ctx),
            Command::New => {
                if !ctx.new_conversation() {
                    self.busy_notice();
                }
            }
            Command::Switch(id) => {
                if ctx.switch_conversation(id) {
                    self.scroll.offset_from_bottom = 0;
                } else {
                    self.busy_notice();
                }
            }
            Command::List => {
                let lines: Vec<String> = ctx
                    .session()
                    .conversations()
                    .iter()
                    .map(|c| format!("[conversation #{} {} ({} messages)]", c.id, c.label(), c.message_count))
                    .collect();
                if lines.is_empty() {
                    self.notice("[no conversations loaded yet]");
                }
                for line in lines {
                    self.notice(line);
                }
                ctx.refresh_conversations();
            }
            Command::Stop => self.interrupt_turn(ctx),
            Command::Approve => self.decide(ProposalDecision::Approve, ctx),
            Command::Reject => self.decide(ProposalDecision::Reject, ctx),
            Command::Prefs => {
                self.side_panel = SidePanel::Preferences;
                ctx.refresh_preferences();
            }
            Command::Reset => {
                if self.reset_armed {
                    self.reset_armed = false;
                    self.side_panel = SidePanel::Preferences;
                    ctx.reset_preferences();
                    self.notice("[resetting preferences to baseline]");
                } else {
                    self.reset_armed = true;
                    self.notice("[press /reset again to clear approved preferences]");
                }
            }
            Command::Tools => {
                self.side_panel = SidePanel::Tools;
                ctx.refresh_tools();
            }
            Command::Tool(id) => {
                self.side_panel = SidePanel::Tools;
                match ctx.session_mut().tool_gate_mut().select_tool(&id) {
                    Ok(tool) => {
                        let mut flags = Vec::new();
                        if tool.requires_confirmation {
                            flags.push("needs /confirm");
                        }
                        if tool.requires_network {
                            flags.push("uses network");
                        }
                        let suffix = if flags.is_empty() {
                            String::new()
                        } else {
                            format!(" ({})", flags.join(", "))
                        };
                        let line = format!("[tool selected: {id}{suffix}]");
                        self.notice(line);
                    }
                    Err(error) => self.notice(format!("[tool] {error}")),
                }
            }
            Command::Cause(id) => match ctx.session_mut().choose_causal_message(id) {
                Ok(()) => self.notice(format!("[tool run attributed to message #{id}]")),
                Err(error) => self.notice(format!("[tool] {error}")),
            },
            Command::Confirm => ctx.session_mut().tool_gate_mut().set_confirmed(true),
            Command::Unconfirm => ctx.session_mut().tool_gate_mut().set_confirmed(false),
            Command::Input(json) => ctx.session_mut().tool_gate_mut().set_input(json),
            Command::Run => {
                if let Err(error) = ctx.run_tool() {
                    self.notice(format!("[tool] {error}"));
                }
            }
            Command::Regenerate(id) => {
                if ctx.session().is_streaming() {
                    self.busy_notice();
                } else if ctx.regenerate(id) {
                    self.scroll.offset_from_bottom = 0;
                } else {
                    self.notice(format!("[message #{id} is not a saved assistant reply]"));
                }
            }
            Command::Help => {
                for line in HELP_LINES {
                    self.notice(*line);
                }
            }
            Command::Quit => self.quit_requested = true,
        }
    }

    fn send(&mut self, text: String, ctx: &mut RuntimeContext) {
        if self.is_turn_in_progress(ctx) {
            self.busy_notice();
            return;
        }
        if ctx.session().active_conversation_id().is_none() {
            self.notice("[no conversation selected yet]");
            return;
        }
        if ctx.start_turn(&text) {
            self.pending_quit = false;
            self.quit_requested = false;
            self.cancel_pending = false;
            self.scroll.offset_from_bottom = 0;
        }
    }

    fn decide(&mut self, decision: ProposalDecision, ctx: &mut RuntimeContext) {
        if ctx.session().is_streaming() {
            self.busy_notice();
        } else if ctx.session().is_deciding() {
            self.notice("[a proposal decision is already in progress]");
        } else if !ctx.decide_proposal(decision) {
            self.notice("[no pending preference proposal]");
        }
    }

    fn interrupt_turn(&mut self, ctx: &mut RuntimeContext) {
        if self.cancel_pending {
            return;
        }
        if ctx.cancel_turn() {
            self.cancel_pending = true;
            self.notice("[turn cancellation requested]");
        } else {
            self.notice("[nothing is streaming]");
        }
    }
}

impl RuntimeMode for TuiMode {
    fn on_user_input(&mut self, input: String, ctx: &mut RuntimeContext) {
        match parse_command(&input) {
            Ok(command) => self.run_command(command, ctx),
            Err(error) => {
                self.reset_armed = false;
                self.notice(format!("[{error}]"));
            }
        }
    }

    fn on_session_event(&mut self, event: &SessionEvent, ctx: &RuntimeContext) {
        match event {
            SessionEvent::StreamEnded { outcome, .. } => {
                self.cancel_pending = false;
                match outcome {
                    StreamOutcome::Completed => {}
                    StreamOutcome::Cancelled => self.notice("[turn cancelled]"),
                    StreamOutcome::Failed(reason) => {
                        self.notice(format!("[error] stream failed: {reason}"))
                    }
                }
            }
            SessionEvent::ProposalReceived { proposal, .. } if proposal.is_pending() => {
                self.notice(format!(
                    "[preference proposal: {}] /approve or /reject",
                    preview_text(&proposal.proposal_text, 80)
                ));
            }
            SessionEvent::ConversationSelected { conversation_id } => {
                self.scroll.offset_from_bottom = 0;
                self.notice(format!("[conversation #{conversation_id}]"));
            }
            SessionEvent::ToolRunFinished { selection, result }
                if *selection == ctx.session().tool_gate().selection() =>
            {
                match result {
                    Ok(result) if result.success => self.notice("[tool run finished]"),
                    Ok(_) => self.notice("[tool run reported a failure]"),
                    Err(message) => self.notice(format!("[error] tool run: {message}")),
                }
            }
            SessionEvent::BackendError { context, message }
            | SessionEvent::DecisionFailed {
                context, message, ..
            } => {
                self.notice(format!("[error] {context}: {message}"));
            }
            _ => {}
        }
    }

    fn on_interrupt(&mut self, ctx: &mut RuntimeContext) {
        if ctx.session().is_streaming() {
            self.interrupt_turn(ctx);
            self.pending_quit = false;
            self.quit_requested = false;
            return;
        }

        if self.pending_quit {
            self.quit_requested = true;
        } else {
            self.pending_quit = true;
            self.notice("[press Ctrl+C again to exit]");
        }
    }

    fn on_scroll(&mut self, action: ScrollAction) {
        let offset = &mut self.scroll.offset_from_bottom;
        *offset = match action {
            ScrollAction::LineUp => offset.saturating_add(1),
            ScrollAction::LineDown => offset.saturating_sub(1),
            ScrollAction::PageUp(step) => offset.saturating_add(step.max(1)),
            ScrollAction::PageDown(step) => offset.saturating_sub(step.max(1)),
            ScrollAction::Home => usize::MAX / 2,
            ScrollAction::End => 0,
        };
    }

    fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}

pub fn build_runtime(config: &Config) -> Result<(Runtime<TuiMode>, RuntimeContext)> {
    let client = ApiClient::new(config)?;
    tracing::info!(backend = client.base_url(), scope = %config.preference_scope, "starting session");
    let ctx = RuntimeContext::new(Arc::new(client), config.preference_scope.clone());
    Ok((Runtime::new(TuiMode::new()), ctx))
}
