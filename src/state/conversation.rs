mod core;
mod history;
mod state;
mod streaming;


pub use self::core::{
    bootstrap, create_conversation, drive_turn, load_conversation, reconcile,
    refresh_conversations,
};
pub(crate) use self::core::emit_session_event;
pub use history::{ConversationStore, MessageSlot};
pub use state::{ChatSession, SessionEvent, StreamOutcome, TurnHandle};
pub use streaming::STREAM_FAILURE_MARKER;
