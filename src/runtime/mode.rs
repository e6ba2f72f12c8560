use super::context::RuntimeContext;
use super::frontend::ScrollAction;
use crate::state::SessionEvent;

pub trait RuntimeMode {
    fn on_user_input(&mut self, input: String, ctx: &mut RuntimeContext);
    /// Sees each event just before the session applies it.
    fn on_session_event(&mut self, event: &SessionEvent, ctx: &RuntimeContext);
    fn on_interrupt(&mut self, _ctx: &mut RuntimeContext) {}
    fn on_scroll(&mut self, _action: ScrollAction) {}
    fn is_turn_in_progress(&self, ctx: &RuntimeContext) -> bool {
        ctx.session().is_streaming()
    }
    fn quit_requested(&self) -> bool;
}
