use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, SVConfig, SVError};
use crate::model::Model;
use crate::session::ViewMode;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &SVConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, SVError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Ok(Some(Message::RawKey(key)))
                } else {
                    Ok(self.handle_key(key))
                }
            }
            Event::Resize(width, height) => {
                Ok(Some(Message::Resize(width as usize, height as usize)))
            }
            _ => Ok(None),
        }
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            let message = match key.code {
                KeyCode::Char('c') => Some(Message::Quit),
                KeyCode::Char('d') => Some(Message::MovePageDown),
                KeyCode::Char('u') => Some(Message::MovePageUp),
                _ => None,
            };
            trace!("Mapped: {key:?} => {message:?}");
            return message;
        }

        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Tab => Some(Message::FocusNext),
            KeyCode::BackTab => Some(Message::FocusPrevious),
            KeyCode::Up | KeyCode::Char('k') => Some(Message::MoveUp),
            KeyCode::Down | KeyCode::Char('j') => Some(Message::MoveDown),
            KeyCode::Left | KeyCode::Char('h') => Some(Message::MoveLeft),
            KeyCode::Right | KeyCode::Char('l') => Some(Message::MoveRight),
            KeyCode::PageUp => Some(Message::MovePageUp),
            KeyCode::PageDown => Some(Message::MovePageDown),
            KeyCode::Home | KeyCode::Char('g') => Some(Message::MoveBeginning),
            KeyCode::End | KeyCode::Char('G') => Some(Message::MoveEnd),
            KeyCode::Enter => Some(Message::Enter),
            KeyCode::Esc => Some(Message::Exit),
            KeyCode::Char('1') => Some(Message::ShowView(ViewMode::Overview)),
            KeyCode::Char('2') => Some(Message::ShowView(ViewMode::Detail)),
            KeyCode::Char('3') => Some(Message::ShowView(ViewMode::QuestionAnalysis)),
            KeyCode::Char('n') => Some(Message::NextItem),
            KeyCode::Char('p') => Some(Message::PreviousItem),
            KeyCode::Char(':') => Some(Message::GotoRecord),
            KeyCode::Char('s') => Some(Message::SortAscending),
            KeyCode::Char('S') => Some(Message::SortDescending),
            KeyCode::Char('c') => Some(Message::CopyCell),
            KeyCode::Char('C') => Some(Message::CopyRow),
            KeyCode::Char('o') => Some(Message::OpenFile),
            KeyCode::Char('e') => Some(Message::LoadExample),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
