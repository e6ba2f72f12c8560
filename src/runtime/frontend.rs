use super::mode::RuntimeMode;
use crate::state::ChatSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollAction {
    LineUp,
    LineDown,
    PageUp(usize),
    PageDown(usize),
    Home,
    End,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UserInputEvent {
    Text(String),
    Interrupt,
    Scroll(ScrollAction),
}

pub trait FrontendAdapter<M: RuntimeMode> {
    /// Returns at most one pending input event without blocking.
    fn poll_user_input(&mut self, mode: &M) -> Option<UserInputEvent>;
    fn render(&mut self, mode: &M, session: &ChatSession);
    fn should_quit(&self) -> bool;
}
