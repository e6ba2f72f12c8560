use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use mygpt::api::logging::init_tracing;
use mygpt::app::{build_runtime, TuiMode};
use mygpt::config::Config;
use mygpt::runtime::{FrontendAdapter, RuntimeMode, ScrollAction, UserInputEvent};
use mygpt::state::ChatSession;
use mygpt::terminal::TerminalGuard;
use mygpt::ui::input_line::InputLine;
use mygpt::ui::render::draw_chat;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(16);
const PAGE_ROWS: usize = 10;

struct ManagedTuiFrontend {
    guard: TerminalGuard,
    input: InputLine,
    quit: bool,
}

impl ManagedTuiFrontend {
    fn new() -> Result<Self> {
        let guard = TerminalGuard::enter()?;
        Ok(Self {
            guard,
            input: InputLine::new(),
            quit: false,
        })
    }

    fn map_key(&mut self, key: KeyEvent) -> Option<UserInputEvent> {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if control => Some(UserInputEvent::Interrupt),
            KeyCode::Char('d') if control => {
                if self.input.is_empty() {
                    self.quit = true;
                }
                None
            }
            KeyCode::Char('j') if control => {
                self.input.insert_char('\n');
                None
            }
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
                self.input.insert_char('\n');
                None
            }
            KeyCode::Enter => self.input.submit().map(UserInputEvent::Text),
            KeyCode::Up => Some(UserInputEvent::Scroll(ScrollAction::LineUp)),
            KeyCode::Down => Some(UserInputEvent::Scroll(ScrollAction::LineDown)),
            KeyCode::PageUp => Some(UserInputEvent::Scroll(ScrollAction::PageUp(PAGE_ROWS))),
            KeyCode::PageDown => Some(UserInputEvent::Scroll(ScrollAction::PageDown(PAGE_ROWS))),
            KeyCode::Home if control => Some(UserInputEvent::Scroll(ScrollAction::Home)),
            KeyCode::End if control => Some(UserInputEvent::Scroll(ScrollAction::End)),
            KeyCode::Home => {
                self.input.move_home();
                None
            }
            KeyCode::End => {
                self.input.move_end();
                None
            }
            KeyCode::Left => {
                self.input.move_left();
                None
            }
            KeyCode::Right => {
                self.input.move_right();
                None
            }
            KeyCode::Backspace => {
                self.input.backspace();
                None
            }
            KeyCode::Delete => {
                self.input.delete();
                None
            }
            KeyCode::Char(ch) if !control && !key.modifiers.contains(KeyModifiers::ALT) => {
                self.input.insert_char(ch);
                None
            }
            _ => None,
        }
    }
}

impl FrontendAdapter<TuiMode> for ManagedTuiFrontend {
    fn poll_user_input(&mut self, mode: &TuiMode) -> Option<UserInputEvent> {
        if mode.quit_requested() {
            self.quit = true;
            return None;
        }

        let Ok(ready) = event::poll(POLL_INTERVAL) else {
            self.quit = true;
            return None;
        };
        if !ready {
            return None;
        }
        let Ok(ev) = event::read() else {
            self.quit = true;
            return None;
        };

        match ev {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.map_key(key),
            Event::Paste(text) => {
                self.input.insert_str(&text.replace('\r', ""));
                None
            }
            _ => None,
        }
    }

    fn render(&mut self, mode: &TuiMode, session: &ChatSession) {
        let input = self.input.text();
        let cursor = self.input.cursor();
        if let Err(error) = self
            .guard
            .terminal_mut()
            .draw(|frame| draw_chat(frame, mode, session, input, cursor))
        {
            tracing::warn!(%error, "failed to draw frame");
        }
    }

    fn should_quit(&self) -> bool {
        self.quit
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(config.log_path.clone())?;
    config.validate()?;

    let (mut runtime, mut ctx) = build_runtime(&config)?;
    let mut frontend = ManagedTuiFrontend::new()?;
    ctx.bootstrap();
    runtime.run(&mut frontend, &mut ctx).await;
    Ok(())
}
