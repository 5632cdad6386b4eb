use std::time::{Duration, Instant};

use crate::ai_client::{AiBackend, AiCompletion, Provider};
use crate::assistant::Assistant;
use crate::channel::{ChannelEvent, ExecutionChannel};
use crate::diagnostics::{DEFAULT_DEBOUNCE, DiagnosticsScheduler, ProblemsPanel};
use crate::editor::{BufferChange, EditKey, EditorFactory};
use crate::events::AppEvent;
use crate::language::Language;
use crate::notice::Notice;
use crate::session::{
    CloseOutcome, Confirmation, CreateOutcome, SessionId, SessionManager, SessionRequest,
    SwitchOutcome,
};
use crate::terminal::Terminal;
use crate::text_input::LineInput;

const MAX_EVENTS_PER_PUMP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Editor,
    TerminalInput,
    AiInput,
    Problems,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Alert(String),
    Rename { id: SessionId, input: LineInput },
    ConfirmClose { id: SessionId, name: String },
}

#[derive(Debug, Clone, Copy)]
pub struct AppOptions {
    pub default_language: Language,
    pub provider: Provider,
    pub diagnostics_debounce: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            default_language: Language::default(),
            provider: Provider::default(),
            diagnostics_debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Routes user input and background events to the component that owns the
/// affected state. Every handler resolves the active session at call time.
pub struct App {
    pub running: bool,
    pub ticks: u64,
    pub focus: Focus,
    sessions: SessionManager,
    terminal: Terminal,
    assistant: Assistant,
    problems: ProblemsPanel,
    diagnostics: DiagnosticsScheduler,
    channel: Box<dyn ExecutionChannel>,
    backend: Box<dyn AiBackend>,
    overlay: Option<Overlay>,
    default_language: Language,
    terminal_scroll: u16,
    assistant_scroll: u16,
}

impl App {
    pub fn new(
        factory: Box<dyn EditorFactory>,
        channel: Box<dyn ExecutionChannel>,
        backend: Box<dyn AiBackend>,
        options: AppOptions,
    ) -> Self {
        Self {
            running: true,
            ticks: 0,
            focus: Focus::Editor,
            sessions: SessionManager::new(factory),
            terminal: Terminal::default(),
            assistant: Assistant::new(options.provider),
            problems: ProblemsPanel::default(),
            diagnostics: DiagnosticsScheduler::new(options.diagnostics_debounce),
            channel,
            backend,
            overlay: None,
            default_language: options.default_language,
            terminal_scroll: 0,
            assistant_scroll: 0,
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, now: Instant) {
        match event {
            AppEvent::Tick => return self.on_tick(now),
            AppEvent::Quit => return self.quit(),
            _ => {}
        }
        if self.overlay.is_some() {
            self.handle_overlay_event(event);
            return;
        }

        match event {
            AppEvent::NewTab => {
                self.open_session(SessionRequest::new(self.default_language));
            }
            AppEvent::CloseTab => {
                if let Some(id) = self.sessions.active_id() {
                    self.request_close(id);
                }
            }
            AppEvent::NextTab => {
                if let Some(next) = self.sessions.next_session_id() {
                    self.switch_to(next);
                }
            }
            AppEvent::Run => self.run_active(),
            AppEvent::ClearTerminal => self.terminal.clear(),
            AppEvent::ToggleAssistant => self.toggle_assistant(),
            AppEvent::Explain => self.explain(),
            AppEvent::Fix => self.fix_error(),
            AppEvent::CycleProvider => {
                let provider = self.assistant.cycle_provider();
                tracing::info!(%provider, "ai provider changed");
            }
            AppEvent::NextLanguage => {
                if let Some(language) = self.sessions.active().map(|session| session.language()) {
                    self.change_language(language.next());
                }
            }
            AppEvent::Rename => self.open_rename(),
            AppEvent::ToggleProblems => {
                self.problems.toggle();
                if !self.problems.is_visible() && self.focus == Focus::Problems {
                    self.focus = Focus::Editor;
                }
            }
            AppEvent::NextFocus => self.next_focus(),
            AppEvent::ScrollUp => self.scroll(1),
            AppEvent::ScrollDown => self.scroll(-1),
            AppEvent::Cancel => self.focus = Focus::Editor,
            other => self.route_edit(other, now),
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Retries deferred tab creation, fires due diagnostics refreshes and
    /// drains background events.
    pub fn on_tick(&mut self, now: Instant) {
        self.ticks = self.ticks.saturating_add(1);
        for id in self.sessions.retry_pending() {
            self.after_activation(id);
        }
        if self.diagnostics.pending_count() > 0 {
            for id in self.diagnostics.take_due(now) {
                if self.sessions.active_id() == Some(id) {
                    self.problems.refresh(id, &self.sessions);
                }
            }
        }
        self.pump_background();
    }

    pub fn pump_background(&mut self) {
        for event in self.channel.drain_events_limited(MAX_EVENTS_PER_PUMP) {
            self.apply_channel_event(event);
        }
        for completion in self.backend.drain_completions_limited(MAX_EVENTS_PER_PUMP) {
            self.apply_ai_completion(completion);
        }
    }

    pub fn apply_channel_event(&mut self, event: ChannelEvent) {
        if matches!(event, ChannelEvent::Message(_)) {
            self.terminal_scroll = 0;
        }
        self.terminal.apply_event(event);
        if !self.terminal.input_enabled() && self.focus == Focus::TerminalInput {
            self.focus = Focus::Editor;
        }
    }

    pub fn apply_ai_completion(&mut self, completion: AiCompletion) {
        self.assistant_scroll = 0;
        self.assistant.apply_completion(completion);
    }

    pub fn open_session(&mut self, request: SessionRequest) -> Option<SessionId> {
        match self.sessions.create_session(request) {
            CreateOutcome::Created(id) => {
                self.after_activation(id);
                Some(id)
            }
            CreateOutcome::Deferred => None,
        }
    }

    pub fn switch_to(&mut self, id: SessionId) {
        if let SwitchOutcome::Switched { language } = self.sessions.switch_active(id) {
            tracing::debug!(%id, %language, "switched tab");
            self.after_activation(id);
        }
    }

    fn after_activation(&mut self, id: SessionId) {
        self.problems.refresh(id, &self.sessions);
        self.focus = Focus::Editor;
    }

    pub fn request_close(&mut self, id: SessionId) {
        match self.sessions.close_session(id, Confirmation::Unasked) {
            CloseOutcome::Closed { activated } => self.after_close(id, activated),
            CloseOutcome::NeedsConfirmation => {
                let name = self
                    .sessions
                    .get(id)
                    .map(|session| session.name().to_string())
                    .unwrap_or_default();
                self.overlay = Some(Overlay::ConfirmClose { id, name });
            }
            CloseOutcome::LastSession => tracing::debug!(%id, "refusing to close the last tab"),
            CloseOutcome::Declined | CloseOutcome::NotFound => {}
        }
    }

    fn resolve_close(&mut self, id: SessionId, accepted: bool) {
        let confirmation = if accepted {
            Confirmation::Accepted
        } else {
            Confirmation::Declined
        };
        if let CloseOutcome::Closed { activated } = self.sessions.close_session(id, confirmation) {
            self.after_close(id, activated);
        }
    }

    fn after_close(&mut self, closed: SessionId, activated: Option<SessionId>) {
        self.diagnostics.cancel(closed);
        if let Some(next) = activated {
            self.after_activation(next);
        }
    }

    pub fn run_active(&mut self) {
        match self.terminal.run(&self.sessions, self.channel.as_mut()) {
            Ok(()) => {
                self.terminal_scroll = 0;
                if self.terminal.input_enabled() {
                    self.focus = Focus::TerminalInput;
                }
            }
            Err(notice) => self.alert(notice),
        }
    }

    pub fn change_language(&mut self, language: Language) {
        if let Some(id) = self.sessions.change_language(language) {
            self.diagnostics.cancel(id);
            self.terminal
                .reset_with_notice(&format!("[Switched to {language}]\n"));
            self.problems.refresh(id, &self.sessions);
        }
    }

    fn toggle_assistant(&mut self) {
        if self.assistant.toggle_panel() {
            self.focus = Focus::AiInput;
        } else if self.focus == Focus::AiInput {
            self.focus = Focus::Editor;
        }
    }

    fn explain(&mut self) {
        match self.assistant.explain(&self.sessions, self.backend.as_ref()) {
            Ok(_) => self.focus = Focus::AiInput,
            Err(notice) => self.alert(notice),
        }
    }

    fn fix_error(&mut self) {
        match self
            .assistant
            .fix_error(&self.sessions, &self.terminal, self.backend.as_ref())
        {
            Ok(_) => self.focus = Focus::AiInput,
            Err(notice) => self.alert(notice),
        }
    }

    fn alert(&mut self, notice: Notice) {
        tracing::debug!(%notice, "showing notice");
        self.overlay = Some(Overlay::Alert(notice.to_string()));
    }

    fn open_rename(&mut self) {
        let Some(session) = self.sessions.active() else {
            return;
        };
        let mut input = LineInput::default();
        input.set(session.name());
        self.overlay = Some(Overlay::Rename {
            id: session.id(),
            input,
        });
    }

    fn next_focus(&mut self) {
        let order = [
            Focus::Editor,
            Focus::TerminalInput,
            Focus::AiInput,
            Focus::Problems,
        ];
        let start = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        for step in 1..=order.len() {
            let candidate = order[(start + step) % order.len()];
            let available = match candidate {
                Focus::Editor => true,
                Focus::TerminalInput => self.terminal.input_enabled(),
                Focus::AiInput => self.assistant.panel_open(),
                Focus::Problems => self.problems.is_visible(),
            };
            if available {
                self.focus = candidate;
                return;
            }
        }
    }

    fn scroll(&mut self, delta: i32) {
        match self.focus {
            Focus::Problems => {
                if delta > 0 {
                    self.problems.select_prev();
                } else {
                    self.problems.select_next();
                }
            }
            Focus::AiInput => self.assistant_scroll = step_scroll(self.assistant_scroll, delta),
            Focus::Editor | Focus::TerminalInput => {
                self.terminal_scroll = step_scroll(self.terminal_scroll, delta)
            }
        }
    }

    fn handle_overlay_event(&mut self, event: AppEvent) {
        let Some(overlay) = self.overlay.take() else {
            return;
        };
        match overlay {
            Overlay::Alert(message) => {
                if !matches!(event, AppEvent::Submit | AppEvent::Cancel) {
                    self.overlay = Some(Overlay::Alert(message));
                }
            }
            Overlay::ConfirmClose { id, name } => match event {
                AppEvent::Submit | AppEvent::InputChar('y') | AppEvent::InputChar('Y') => {
                    self.resolve_close(id, true)
                }
                AppEvent::Cancel | AppEvent::InputChar('n') | AppEvent::InputChar('N') => {
                    self.resolve_close(id, false)
                }
                _ => self.overlay = Some(Overlay::ConfirmClose { id, name }),
            },
            Overlay::Rename { id, mut input } => match event {
                AppEvent::Submit => {
                    if self.sessions.rename_session(id, input.text()) {
                        tracing::info!(%id, name = input.text(), "renamed tab");
                    }
                }
                AppEvent::Cancel => {}
                other => {
                    edit_line(&mut input, other);
                    self.overlay = Some(Overlay::Rename { id, input });
                }
            },
        }
    }

    fn route_edit(&mut self, event: AppEvent, now: Instant) {
        match self.focus {
            Focus::Editor => self.edit_active_buffer(event, now),
            Focus::TerminalInput => {
                if event == AppEvent::Submit {
                    self.terminal.submit_input(self.channel.as_mut());
                } else if let Some(input) = self.terminal.input_mut() {
                    edit_line(input, event);
                }
            }
            Focus::AiInput => {
                if event == AppEvent::Submit {
                    self.assistant
                        .submit_input(&self.sessions, self.backend.as_ref());
                } else {
                    edit_line(self.assistant.input_mut(), event);
                }
            }
            Focus::Problems => match event {
                AppEvent::MoveUp => self.problems.select_prev(),
                AppEvent::MoveDown => self.problems.select_next(),
                AppEvent::Submit => self.jump_to_problem(),
                _ => {}
            },
        }
    }

    fn edit_active_buffer(&mut self, event: AppEvent, now: Instant) {
        let Some(key) = edit_key(event) else {
            return;
        };
        let Some(session) = self.sessions.active_mut() else {
            return;
        };
        let id = session.id();
        if session.buffer_mut().apply_key(key) == BufferChange::Content {
            self.sessions.on_content_changed(id);
            self.diagnostics.schedule(id, now);
        }
    }

    fn jump_to_problem(&mut self) {
        if let Some(source) = self.problems.source()
            && self.sessions.get(source).is_some()
        {
            self.switch_to(source);
        }
        if self.problems.jump_to_selected(&mut self.sessions) {
            self.focus = Focus::Editor;
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn problems(&self) -> &ProblemsPanel {
        &self.problems
    }

    pub fn diagnostics(&self) -> &DiagnosticsScheduler {
        &self.diagnostics
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn terminal_scroll(&self) -> u16 {
        self.terminal_scroll
    }

    pub fn assistant_scroll(&self) -> u16 {
        self.assistant_scroll
    }
}

fn step_scroll(current: u16, delta: i32) -> u16 {
    if delta > 0 {
        current.saturating_add(delta as u16)
    } else {
        current.saturating_sub(delta.unsigned_abs() as u16)
    }
}

fn edit_key(event: AppEvent) -> Option<EditKey> {
    let key = match event {
        AppEvent::InputChar(c) => EditKey::Char(c),
        AppEvent::Submit => EditKey::Newline,
        AppEvent::Tab => EditKey::Tab,
        AppEvent::Backspace => EditKey::Backspace,
        AppEvent::Delete => EditKey::Delete,
        AppEvent::CursorLeft => EditKey::Left,
        AppEvent::CursorRight => EditKey::Right,
        AppEvent::MoveUp => EditKey::Up,
        AppEvent::MoveDown => EditKey::Down,
        AppEvent::Home => EditKey::Home,
        AppEvent::End => EditKey::End,
        _ => return None,
    };
    Some(key)
}

fn edit_line(input: &mut LineInput, event: AppEvent) {
    match event {
        AppEvent::InputChar(c) => input.insert_char(c),
        AppEvent::Backspace => input.backspace(),
        AppEvent::CursorLeft => input.move_left(),
        AppEvent::CursorRight => input.move_right(),
        AppEvent::Home => input.move_home(),
        AppEvent::End => input.move_end(),
        _ => {}
    }
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
