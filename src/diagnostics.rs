use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::editor::{Marker, Severity};
use crate::session::{SessionId, SessionManager};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const NO_PROBLEMS_TEXT: &str = "No problems detected";

/// Problems list for the most recently refreshed session.
#[derive(Debug, Clone, Default)]
pub struct ProblemsPanel {
    source: Option<SessionId>,
    markers: Vec<Marker>,
    visible: bool,
    selected: usize,
}

impl ProblemsPanel {
    /// Pulls a fresh marker snapshot from the session's buffer.
    pub fn refresh(&mut self, id: SessionId, sessions: &SessionManager) {
        let Some(session) = sessions.get(id) else {
            return;
        };
        self.source = Some(id);
        self.markers = session.buffer().markers();
        self.visible = !self.markers.is_empty();
        self.selected = self.selected.min(self.markers.len().saturating_sub(1));
        tracing::trace!(%id, count = self.markers.len(), "refreshed diagnostics");
    }

    /// Moves the caret of the source buffer to the marker at `index`.
    /// A marker whose session has since been closed is ignored.
    pub fn jump_to(&self, index: usize, sessions: &mut SessionManager) -> bool {
        let Some(marker) = self.markers.get(index) else {
            return false;
        };
        let Some(session) = self.source.and_then(|id| sessions.get_mut(id)) else {
            return false;
        };
        let buffer = session.buffer_mut();
        buffer.reveal_and_place_caret(marker.line, marker.column);
        buffer.focus();
        true
    }

    pub fn jump_to_selected(&self, sessions: &mut SessionManager) -> bool {
        self.jump_to(self.selected, sessions)
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn select_next(&mut self) {
        if !self.markers.is_empty() {
            self.selected = (self.selected + 1).min(self.markers.len() - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn count(&self) -> usize {
        self.markers.len()
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn source(&self) -> Option<SessionId> {
        self.source
    }

    pub fn display_lines(&self) -> Vec<String> {
        if self.markers.is_empty() {
            return vec![NO_PROBLEMS_TEXT.to_string()];
        }
        self.markers
            .iter()
            .map(|marker| {
                let tag = match marker.severity {
                    Severity::Error => "error",
                    Severity::Warning => "warning",
                };
                format!(
                    "{tag}: {} (Line {}, Column {})",
                    marker.message, marker.line, marker.column
                )
            })
            .collect()
    }
}

/// Debounced refresh deadlines keyed by session. Rescheduling replaces the
/// previous deadline for that session.
#[derive(Debug, Clone)]
pub struct DiagnosticsScheduler {
    delay: Duration,
    deadlines: HashMap<SessionId, Instant>,
}

impl Default for DiagnosticsScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl DiagnosticsScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, id: SessionId, now: Instant) {
        self.deadlines.insert(id, now + self.delay);
    }

    pub fn cancel(&mut self, id: SessionId) {
        self.deadlines.remove(&id);
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<SessionId> {
        let mut due: Vec<SessionId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        due.sort();
        for id in &due {
            self.deadlines.remove(id);
        }
        due
    }

    pub fn pending_count(&self) -> usize {
        self.deadlines.len()
    }
}
