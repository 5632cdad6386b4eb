use std::sync::OnceLock;

use regex::Regex;

use crate::ai_client::{AiBackend, AiCompletion, AiOutcome, AiRequest, CodeContext, Provider, RequestId};
use crate::notice::Notice;
use crate::session::SessionManager;
use crate::terminal::Terminal;
use crate::text_input::LineInput;

pub const CHAT_PLACEHOLDER: &str = "Thinking...";
pub const EXPLAIN_PLACEHOLDER: &str = "Analyzing code...";
pub const FIX_PLACEHOLDER: &str = "Finding solution...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Message,
    Error,
    /// Placeholder shown until the request with this id resolves.
    Working(RequestId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub kind: TurnKind,
}

impl Turn {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            kind: TurnKind::Message,
        }
    }

    fn assistant(content: impl Into<String>, kind: TurnKind) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            kind,
        }
    }
}

/// One global conversation shared by all tabs.
#[derive(Debug, Default)]
pub struct Assistant {
    turns: Vec<Turn>,
    panel_open: bool,
    provider: Provider,
    pending: Vec<RequestId>,
    next_request: u64,
    input: LineInput,
}

impl Assistant {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Sends a freeform message with the active buffer as context.
    pub fn chat(
        &mut self,
        message: &str,
        sessions: &SessionManager,
        backend: &dyn AiBackend,
    ) -> Option<RequestId> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }
        self.turns.push(Turn::user(message));
        let context = sessions.active().map(|session| CodeContext {
            language: session.language(),
            code: session.code(),
        });
        let request = AiRequest::Chat {
            provider: self.provider,
            message: message.to_string(),
            context,
        };
        Some(self.issue(request, CHAT_PLACEHOLDER, backend))
    }

    pub fn submit_input(
        &mut self,
        sessions: &SessionManager,
        backend: &dyn AiBackend,
    ) -> Option<RequestId> {
        let message = self.input.take();
        self.chat(&message, sessions, backend)
    }

    pub fn explain(
        &mut self,
        sessions: &SessionManager,
        backend: &dyn AiBackend,
    ) -> Result<RequestId, Notice> {
        let session = sessions.active().ok_or(Notice::NothingToExplain)?;
        let code = session.code();
        if code.trim().is_empty() {
            return Err(Notice::EditorEmpty);
        }
        let language = session.language();
        self.panel_open = true;
        self.turns
            .push(Turn::user(format!("Explain this {language} code")));
        let request = AiRequest::Explain {
            provider: self.provider,
            code,
            language,
        };
        Ok(self.issue(request, EXPLAIN_PLACEHOLDER, backend))
    }

    /// Asks for a fix using the error signature from the last run.
    pub fn fix_error(
        &mut self,
        sessions: &SessionManager,
        terminal: &Terminal,
        backend: &dyn AiBackend,
    ) -> Result<RequestId, Notice> {
        let session = sessions.active().ok_or(Notice::NothingToFix)?;
        let code = session.code();
        if code.trim().is_empty() {
            return Err(Notice::EditorEmpty);
        }
        let error = terminal.last_error().ok_or(Notice::NoErrorInTerminal)?;
        let language = session.language();
        self.panel_open = true;
        self.turns.push(Turn::user("Fix this error in my code"));
        let request = AiRequest::Fix {
            provider: self.provider,
            code,
            error,
            language,
        };
        Ok(self.issue(request, FIX_PLACEHOLDER, backend))
    }

    fn issue(&mut self, request: AiRequest, placeholder: &str, backend: &dyn AiBackend) -> RequestId {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.turns
            .push(Turn::assistant(placeholder, TurnKind::Working(id)));
        self.pending.push(id);
        tracing::debug!(%id, provider = %self.provider, kind = request.path(), "ai request issued");
        backend.dispatch(id, request);
        id
    }

    /// Replaces the request's placeholder with exactly one result turn.
    pub fn apply_completion(&mut self, completion: AiCompletion) {
        let AiCompletion { id, outcome } = completion;
        let Some(position) = self.pending.iter().position(|pending| *pending == id) else {
            tracing::warn!(%id, "ignoring completion for unknown request");
            return;
        };
        self.pending.remove(position);
        self.turns
            .retain(|turn| turn.kind != TurnKind::Working(id));
        let turn = match outcome {
            AiOutcome::Answer(text) => Turn::assistant(text, TurnKind::Message),
            AiOutcome::Rejected(error) => {
                Turn::assistant(format!("Error: {error}"), TurnKind::Error)
            }
            AiOutcome::Transport(message) => {
                Turn::assistant(format!("Network error: {message}"), TurnKind::Error)
            }
        };
        self.turns.push(turn);
    }

    pub fn cycle_provider(&mut self) -> Provider {
        self.provider = self.provider.next();
        self.provider
    }

    pub fn toggle_panel(&mut self) -> bool {
        self.panel_open = !self.panel_open;
        self.panel_open
    }

    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn input(&self) -> &LineInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut LineInput {
        &mut self.input
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    InlineCode(String),
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    LineBreak,
}

/// Splits a response into prose, inline code and fenced blocks.
pub fn format_response(text: &str) -> Vec<Fragment> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```(\w+)?\n((?s:.*?))```").expect("fenced block pattern")
    });

    let mut fragments = Vec::new();
    let mut last = 0;
    for caps in fence.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        push_prose(&text[last..whole.start()], &mut fragments);
        fragments.push(Fragment::CodeBlock {
            language: caps.get(1).map(|m| m.as_str().to_string()),
            code: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        });
        last = whole.end();
    }
    push_prose(&text[last..], &mut fragments);
    fragments
}

fn push_prose(text: &str, fragments: &mut Vec<Fragment>) {
    static INLINE: OnceLock<Regex> = OnceLock::new();
    let inline = INLINE.get_or_init(|| Regex::new(r"`([^`]+)`").expect("inline code pattern"));

    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            fragments.push(Fragment::LineBreak);
        }
        let mut last = 0;
        for caps in inline.captures_iter(line) {
            let (Some(whole), Some(code)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                fragments.push(Fragment::Text(line[last..whole.start()].to_string()));
            }
            fragments.push(Fragment::InlineCode(code.as_str().to_string()));
            last = whole.end();
        }
        if last < line.len() {
            fragments.push(Fragment::Text(line[last..].to_string()));
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/assistant_tests.rs"]
mod tests;
