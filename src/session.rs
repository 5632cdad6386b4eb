use std::collections::VecDeque;
use std::fmt;

use crate::editor::{EditorFactory, EditorOptions, EditorWidget};
use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    language: Language,
    buffer: Box<dyn EditorWidget>,
    dirty: bool,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> &dyn EditorWidget {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> &mut dyn EditorWidget {
        self.buffer.as_mut()
    }

    pub fn code(&self) -> String {
        self.buffer.value()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub language: Language,
    pub name: Option<String>,
    pub initial_content: Option<String>,
}

impl SessionRequest {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            name: None,
            initial_content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(SessionId),
    /// The editor factory is still loading; the request is queued for `retry_pending`.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Unchanged,
    Switched { language: Language },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Unasked,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed { activated: Option<SessionId> },
    LastSession,
    NeedsConfirmation,
    Declined,
    NotFound,
}

pub struct SessionManager {
    factory: Box<dyn EditorFactory>,
    sessions: Vec<Session>,
    active: Option<SessionId>,
    next_id: u64,
    untitled_counter: u64,
    pending: VecDeque<SessionRequest>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions)
            .field("active", &self.active)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl SessionManager {
    pub fn new(factory: Box<dyn EditorFactory>) -> Self {
        Self {
            factory,
            sessions: Vec::new(),
            active: None,
            next_id: 0,
            untitled_counter: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn create_session(&mut self, request: SessionRequest) -> CreateOutcome {
        if !self.factory.is_ready() {
            tracing::debug!(language = %request.language, "editor factory not ready; deferring tab");
            self.pending.push_back(request);
            return CreateOutcome::Deferred;
        }
        CreateOutcome::Created(self.build_session(request))
    }

    /// Builds queued sessions once the factory is ready. Returns the ids created.
    pub fn retry_pending(&mut self) -> Vec<SessionId> {
        let mut created = Vec::new();
        while self.factory.is_ready() {
            let Some(request) = self.pending.pop_front() else {
                break;
            };
            created.push(self.build_session(request));
        }
        created
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn build_session(&mut self, request: SessionRequest) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        let name = match request
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
        {
            Some(name) => name,
            None => {
                self.untitled_counter += 1;
                format!("Untitled-{}", self.untitled_counter)
            }
        };
        let initial = request
            .initial_content
            .unwrap_or_else(|| request.language.starter_snippet().to_string());
        let buffer = self.factory.create(EditorOptions::new(
            initial,
            request.language.editor_mode(),
        ));
        tracing::info!(%id, %name, language = %request.language, "opened tab");
        self.sessions.push(Session {
            id,
            name,
            language: request.language,
            buffer,
            dirty: false,
        });
        self.switch_active(id);
        id
    }

    pub fn switch_active(&mut self, id: SessionId) -> SwitchOutcome {
        if self.active == Some(id) {
            return SwitchOutcome::Unchanged;
        }
        let Some(language) = self.get(id).map(Session::language) else {
            return SwitchOutcome::Unchanged;
        };
        if let Some(current) = self.active
            && let Some(session) = self.get_mut(current)
        {
            session.buffer.blur();
        }
        self.active = Some(id);
        if let Some(target) = self.get_mut(id) {
            target.buffer.focus();
        }
        SwitchOutcome::Switched { language }
    }

    pub fn close_session(&mut self, id: SessionId, confirmation: Confirmation) -> CloseOutcome {
        let Some(index) = self.index_of(id) else {
            return CloseOutcome::NotFound;
        };
        if self.sessions.len() == 1 {
            return CloseOutcome::LastSession;
        }
        if self.sessions[index].dirty {
            match confirmation {
                Confirmation::Unasked => return CloseOutcome::NeedsConfirmation,
                Confirmation::Declined => return CloseOutcome::Declined,
                Confirmation::Accepted => {}
            }
        }

        let mut session = self.sessions.remove(index);
        session.buffer.dispose();
        tracing::info!(%id, name = %session.name, "closed tab");

        let mut activated = None;
        if self.active == Some(id) {
            self.active = None;
            let neighbour = self
                .sessions
                .get(index)
                .or_else(|| self.sessions.get(index.saturating_sub(1)))
                .map(Session::id);
            if let Some(next) = neighbour {
                self.switch_active(next);
                activated = Some(next);
            }
        }
        CloseOutcome::Closed { activated }
    }

    /// Replaces the active buffer with the starter snippet of `language`.
    pub fn change_language(&mut self, language: Language) -> Option<SessionId> {
        let session = self.active_mut()?;
        session.buffer.set_language_mode(language.editor_mode());
        session.buffer.set_value(language.starter_snippet());
        session.language = language;
        session.dirty = false;
        tracing::info!(id = %session.id, %language, "changed tab language");
        Some(session.id)
    }

    pub fn rename_session(&mut self, id: SessionId, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let Some(session) = self.get_mut(id) else {
            return false;
        };
        session.name = name.to_string();
        true
    }

    pub fn on_content_changed(&mut self, id: SessionId) -> bool {
        let Some(session) = self.get_mut(id) else {
            return false;
        };
        session.dirty = true;
        true
    }

    pub fn next_session_id(&self) -> Option<SessionId> {
        let active = self.active?;
        let index = self.index_of(active)?;
        self.sessions
            .get((index + 1) % self.sessions.len())
            .map(Session::id)
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Session> {
        let id = self.active?;
        self.get_mut(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn index_of(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == id)
    }
}

#[cfg(test)]
#[path = "../tests/unit/session_tests.rs"]
mod tests;
