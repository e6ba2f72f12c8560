pub mod conversation;
pub mod proposals;
pub mod tool_gate;

pub use conversation::{ChatSession, SessionEvent, StreamOutcome, TurnHandle};
pub use proposals::{DecisionRequest, ProposalState, ProposalTracker};
pub use tool_gate::{GateError, ToolGate, ToolRun};
