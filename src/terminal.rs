use std::sync::OnceLock;

use regex::Regex;

use crate::channel::{ChannelEvent, ExecutionChannel, InboundMessage, OutboundMessage};
use crate::notice::Notice;
use crate::session::SessionManager;
use crate::text_input::LineInput;

pub const RUNNING_BANNER: &str = "▶ Running...\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanClass {
    Plain,
    Banner,
    Echo,
    Error,
    Warning,
    Location,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub class: SpanClass,
}

impl StyledSpan {
    fn new(text: impl Into<String>, class: SpanClass) -> Self {
        Self {
            text: text.into(),
            class,
        }
    }
}

/// The single execution terminal shared by every tab.
#[derive(Debug, Clone)]
pub struct Terminal {
    state: ProcessState,
    connection: ConnectionState,
    transcript: Vec<StyledSpan>,
    input: LineInput,
}

impl Default for Terminal {
    fn default() -> Self {
        Self {
            state: ProcessState::Idle,
            connection: ConnectionState::Connecting,
            transcript: Vec::new(),
            input: LineInput::default(),
        }
    }
}

impl Terminal {
    /// Sends the active buffer to the sandbox and starts a new transcript.
    pub fn run(
        &mut self,
        sessions: &SessionManager,
        channel: &mut dyn ExecutionChannel,
    ) -> Result<(), Notice> {
        let Some(session) = sessions.active() else {
            return Err(Notice::NoActiveEditor);
        };
        let code = session.code();
        let language = session.language();

        self.transcript.clear();
        self.transcript
            .push(StyledSpan::new(RUNNING_BANNER, SpanClass::Banner));
        match channel.emit(OutboundMessage::RunCode { code, language }) {
            Ok(()) => {
                tracing::info!(id = %session.id(), %language, "run requested");
                self.state = ProcessState::Running;
            }
            Err(err) => {
                tracing::warn!("run request failed: {err}");
                self.transcript.push(StyledSpan::new(
                    format!("Connection error: {err}\n"),
                    SpanClass::Error,
                ));
                self.state = ProcessState::Idle;
            }
        }
        Ok(())
    }

    pub fn apply_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.connection = ConnectionState::Connected,
            ChannelEvent::Disconnected(reason) => {
                self.connection = ConnectionState::Disconnected(reason)
            }
            ChannelEvent::Message(message) if self.state != ProcessState::Running => {
                tracing::debug!(?message, "dropping run event while idle");
            }
            ChannelEvent::Message(InboundMessage::TermOutput { data }) => self.on_output(&data),
            ChannelEvent::Message(InboundMessage::TermStop { data, success }) => {
                self.on_stop(&data, success)
            }
        }
    }

    pub fn on_output(&mut self, data: &str) {
        self.transcript.extend(highlight(data));
    }

    pub fn on_stop(&mut self, data: &str, success: bool) {
        tracing::info!(success, "run finished");
        self.state = ProcessState::Idle;
        self.input.clear();
        let class = if success {
            SpanClass::Success
        } else {
            SpanClass::Error
        };
        self.transcript.push(StyledSpan::new(data, class));
    }

    /// Echoes `text` and forwards it to the running process.
    pub fn send_input(&mut self, text: &str, channel: &mut dyn ExecutionChannel) -> bool {
        if text.is_empty() || !self.input_enabled() {
            return false;
        }
        self.transcript
            .push(StyledSpan::new(format!("{text}\n"), SpanClass::Echo));
        if let Err(err) = channel.emit(OutboundMessage::SendInput {
            input: text.to_string(),
        }) {
            tracing::warn!("input forward failed: {err}");
            self.transcript.push(StyledSpan::new(
                format!("Connection error: {err}\n"),
                SpanClass::Error,
            ));
        }
        true
    }

    pub fn submit_input(&mut self, channel: &mut dyn ExecutionChannel) -> bool {
        if !self.input_enabled() {
            return false;
        }
        let text = self.input.take();
        self.send_input(&text, channel)
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    pub fn reset_with_notice(&mut self, notice: &str) {
        self.transcript.clear();
        self.transcript
            .push(StyledSpan::new(notice, SpanClass::Banner));
    }

    pub fn plain_text(&self) -> String {
        self.transcript.iter().map(|span| span.text.as_str()).collect()
    }

    /// Everything from the first error keyword to the end of the transcript.
    pub fn last_error(&self) -> Option<String> {
        static ERROR_TAIL: OnceLock<Regex> = OnceLock::new();
        let pattern = ERROR_TAIL.get_or_init(|| {
            Regex::new(r"(?is)(?:error|exception|traceback).*$").expect("error tail pattern")
        });
        let text = self.plain_text();
        pattern.find(&text).map(|found| found.as_str().to_string())
    }

    pub fn transcript(&self) -> &[StyledSpan] {
        &self.transcript
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn input_enabled(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn input(&self) -> &LineInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> Option<&mut LineInput> {
        if self.input_enabled() {
            Some(&mut self.input)
        } else {
            None
        }
    }
}

fn highlight_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r#"(?P<location>File "[^"]+", line \d+)"#,
            r"|(?P<error_type>\b(?:SyntaxError|TypeError|ValueError|RuntimeError|NameError|ReferenceError|IndentationError)\b)",
            r"|(?P<error>(?i:ERROR!|error|exception|traceback|failed))",
            r"|(?P<warning>(?i:warning|deprecated))",
            r"|(?P<caret>\^+)",
            r"|(?P<success>(?i:success|passed))",
        ))
        .expect("terminal highlight pattern")
    })
}

/// Splits a chunk into styled spans. Classification never looks past the
/// current line, so chunk boundaries do not carry state.
pub fn highlight(chunk: &str) -> Vec<StyledSpan> {
    let pattern = highlight_pattern();
    let mut spans = Vec::new();
    for line in chunk.split_inclusive('\n') {
        let mut last = 0;
        for caps in pattern.captures_iter(line) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                spans.push(StyledSpan::new(&line[last..whole.start()], SpanClass::Plain));
            }
            let class = if caps.name("location").is_some() {
                SpanClass::Location
            } else if caps.name("warning").is_some() {
                SpanClass::Warning
            } else if caps.name("success").is_some() {
                SpanClass::Success
            } else {
                SpanClass::Error
            };
            spans.push(StyledSpan::new(whole.as_str(), class));
            last = whole.end();
        }
        if last < line.len() {
            spans.push(StyledSpan::new(&line[last..], SpanClass::Plain));
        }
    }
    spans
}

#[cfg(test)]
#[path = "../tests/unit/terminal_tests.rs"]
mod tests;
