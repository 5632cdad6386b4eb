use std::io;
use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    NewTab,
    CloseTab,
    NextTab,
    Run,
    ClearTerminal,
    ToggleAssistant,
    Explain,
    Fix,
    CycleProvider,
    NextLanguage,
    Rename,
    ToggleProblems,
    NextFocus,
    InputChar(char),
    Tab,
    Backspace,
    Delete,
    Submit,
    Cancel,
    MoveUp,
    MoveDown,
    CursorLeft,
    CursorRight,
    Home,
    End,
    ScrollUp,
    ScrollDown,
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key_event.modifiers.contains(KeyModifiers::SHIFT);
    if ctrl {
        match key_event.code {
            KeyCode::Char('a') | KeyCode::Char('A') if shift => return AppEvent::ToggleAssistant,
            KeyCode::Char('c') | KeyCode::Char('q') => return AppEvent::Quit,
            KeyCode::Char('n') => return AppEvent::NewTab,
            KeyCode::Char('w') => return AppEvent::CloseTab,
            KeyCode::Tab | KeyCode::PageDown => return AppEvent::NextTab,
            KeyCode::Char('l') => return AppEvent::ClearTerminal,
            KeyCode::Char('e') => return AppEvent::Explain,
            KeyCode::Char('f') => return AppEvent::Fix,
            KeyCode::Char('p') => return AppEvent::CycleProvider,
            _ => {}
        }
    }

    match key_event.code {
        KeyCode::F(2) => AppEvent::Rename,
        KeyCode::F(3) => AppEvent::ToggleAssistant,
        KeyCode::F(4) => AppEvent::NextLanguage,
        KeyCode::F(5) => AppEvent::Run,
        KeyCode::F(6) => AppEvent::NextFocus,
        KeyCode::F(8) => AppEvent::ToggleProblems,
        KeyCode::Tab => AppEvent::Tab,
        KeyCode::Esc => AppEvent::Cancel,
        KeyCode::PageUp => AppEvent::ScrollUp,
        KeyCode::PageDown => AppEvent::ScrollDown,
        KeyCode::Up => AppEvent::MoveUp,
        KeyCode::Down => AppEvent::MoveDown,
        KeyCode::Left => AppEvent::CursorLeft,
        KeyCode::Right => AppEvent::CursorRight,
        KeyCode::Home => AppEvent::Home,
        KeyCode::End => AppEvent::End,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Delete => AppEvent::Delete,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Char(c) if !ctrl => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

fn map_mouse_event_kind(kind: MouseEventKind) -> AppEvent {
    match kind {
        MouseEventKind::ScrollUp => AppEvent::ScrollUp,
        MouseEventKind::ScrollDown => AppEvent::ScrollDown,
        _ => AppEvent::Tick,
    }
}

pub fn next_event() -> io::Result<AppEvent> {
    if event::poll(Duration::from_millis(16))? {
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                return Ok(map_key_event(key_event));
            }
            Event::Mouse(mouse_event) => return Ok(map_mouse_event_kind(mouse_event.kind)),
            _ => {}
        }
    }

    Ok(AppEvent::Tick)
}
