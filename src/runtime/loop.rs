use super::{
    context::RuntimeContext,
    frontend::{FrontendAdapter, UserInputEvent},
    mode::RuntimeMode,
};
use std::time::Duration;

const DEFAULT_TICK: Duration = Duration::from_millis(33);
const MAX_INPUT_EVENTS_PER_TICK: usize = 64;

pub struct Runtime<M: RuntimeMode> {
    pub mode: M,
    tick: Duration,
}

impl<M: RuntimeMode> Runtime<M> {
    pub fn new(mode: M) -> Self {
        Self {
            mode,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Drives the session until the frontend or the mode asks to quit.
    pub async fn run<F: FrontendAdapter<M>>(&mut self, frontend: &mut F, ctx: &mut RuntimeContext) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            frontend.render(&self.mode, ctx.session());

            for _ in 0..MAX_INPUT_EVENTS_PER_TICK {
                let Some(input) = frontend.poll_user_input(&self.mode) else {
                    break;
                };
                self.dispatch(input, ctx);
            }
            if frontend.should_quit() || self.mode.quit_requested() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                Some(event) = ctx.next_event() => {
                    self.mode.on_session_event(&event, ctx);
                    ctx.apply(event);
                    // Drain what is already queued so a burst of tokens renders once.
                    while let Some(event) = ctx.try_next_event() {
                        self.mode.on_session_event(&event, ctx);
                        ctx.apply(event);
                    }
                }
            }
        }

        ctx.cancel_turn();
        tracing::info!("runtime stopped");
    }

    fn dispatch(&mut self, input: UserInputEvent, ctx: &mut RuntimeContext) {
        match input {
            UserInputEvent::Text(text) => self.mode.on_user_input(text, ctx),
            UserInputEvent::Interrupt => self.mode.on_interrupt(ctx),
            UserInputEvent::Scroll(action) => self.mode.on_scroll(action),
        }
    }
}
