use super::*;
use crate::ai_client::{AiOutcome, AiRequest};
use crate::channel::{InboundMessage, OutboundMessage};
use crate::editor::{EditorOptions, EditorWidget, TextBuffer, TextBufferFactory};
use crate::terminal::{ProcessState, SpanClass};
use crate::testing::{RecordingChannel, ScriptedBackend};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
struct GatedFactory {
    ready: Rc<Cell<bool>>,
}

impl EditorFactory for GatedFactory {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn create(&mut self, options: EditorOptions) -> Box<dyn EditorWidget> {
        Box::new(TextBuffer::new(options))
    }
}

fn app_with(channel: &RecordingChannel, backend: &ScriptedBackend) -> App {
    App::new(
        Box::new(TextBufferFactory),
        Box::new(channel.clone()),
        Box::new(backend.clone()),
        AppOptions::default(),
    )
}

fn open(app: &mut App, code: &str) -> SessionId {
    app.open_session(SessionRequest {
        language: Language::Python,
        name: None,
        initial_content: Some(code.to_string()),
    })
    .expect("text buffers are always ready")
}

fn type_text(app: &mut App, text: &str, now: Instant) {
    for ch in text.chars() {
        app.handle_event(AppEvent::InputChar(ch), now);
    }
}

fn alert_text(app: &App) -> Option<&str> {
    match app.overlay() {
        Some(Overlay::Alert(text)) => Some(text.as_str()),
        _ => None,
    }
}

#[test]
fn run_scenario_streams_into_shared_terminal() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    open(&mut app, "");
    type_text(&mut app, "print(1)", now);

    app.handle_event(AppEvent::Run, now);
    assert_eq!(
        channel.sent(),
        vec![OutboundMessage::RunCode {
            code: "print(1)".to_string(),
            language: Language::Python,
        }]
    );
    assert_eq!(app.focus, Focus::TerminalInput);

    channel.push_inbound(ChannelEvent::Connected);
    channel.push_inbound(ChannelEvent::Message(InboundMessage::TermOutput {
        data: "1\n".to_string(),
    }));
    channel.push_inbound(ChannelEvent::Message(InboundMessage::TermStop {
        data: "Exited 0".to_string(),
        success: true,
    }));
    app.handle_event(AppEvent::Tick, now);

    let terminal = app.terminal();
    assert!(terminal.plain_text().contains("1\n"));
    assert_eq!(
        terminal.transcript().last().map(|span| (span.text.as_str(), span.class)),
        Some(("Exited 0", SpanClass::Success))
    );
    assert_eq!(terminal.state(), ProcessState::Idle);
    assert!(!terminal.input_enabled());
    assert_eq!(app.focus, Focus::Editor);
}

#[test]
fn run_without_session_shows_notice_and_emits_nothing() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);

    app.handle_event(AppEvent::Run, Instant::now());
    assert_eq!(alert_text(&app), Some("No active editor"));
    assert!(channel.sent().is_empty());

    app.handle_event(AppEvent::Submit, Instant::now());
    assert!(app.overlay().is_none());
}

#[test]
fn alert_swallows_other_keys_until_dismissed() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    app.handle_event(AppEvent::Run, Instant::now());
    app.handle_event(AppEvent::NewTab, Instant::now());
    assert!(app.sessions().is_empty());
    app.handle_event(AppEvent::Cancel, Instant::now());
    app.handle_event(AppEvent::NewTab, Instant::now());
    assert_eq!(app.sessions().len(), 1);
}

#[test]
fn typing_marks_dirty_and_debounces_diagnostics() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let start = Instant::now();
    let id = open(&mut app, "");
    assert!(!app.sessions().get(id).expect("tab").is_dirty());

    type_text(&mut app, "print(1", start);
    assert!(app.sessions().get(id).expect("tab").is_dirty());
    assert_eq!(app.diagnostics().pending_count(), 1);
    assert_eq!(app.problems().count(), 0);

    app.handle_event(AppEvent::Tick, start + Duration::from_millis(100));
    assert_eq!(app.problems().count(), 0);

    app.handle_event(AppEvent::Tick, start + Duration::from_millis(400));
    assert_eq!(app.problems().count(), 1);
    assert!(app.problems().is_visible());
    assert_eq!(app.diagnostics().pending_count(), 0);
}

#[test]
fn cursor_movement_does_not_dirty_the_tab() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let id = open(&mut app, "abc");
    app.handle_event(AppEvent::CursorRight, Instant::now());
    app.handle_event(AppEvent::End, Instant::now());
    assert!(!app.sessions().get(id).expect("tab").is_dirty());
    assert_eq!(app.diagnostics().pending_count(), 0);
}

#[test]
fn declining_dirty_close_keeps_session_active_and_untouched() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    let first = open(&mut app, "a = 1");
    let second = open(&mut app, "");
    type_text(&mut app, "x = 2", now);

    app.handle_event(AppEvent::CloseTab, now);
    assert!(matches!(
        app.overlay(),
        Some(Overlay::ConfirmClose { id, .. }) if *id == second
    ));

    app.handle_event(AppEvent::InputChar('n'), now);
    assert!(app.overlay().is_none());
    assert_eq!(app.sessions().len(), 2);
    assert_eq!(app.sessions().active_id(), Some(second));
    let kept = app.sessions().get(second).expect("still open");
    assert_eq!(kept.code(), "x = 2");
    assert!(kept.is_dirty());
    assert!(app.sessions().get(first).is_some());
}

#[test]
fn accepting_dirty_close_activates_a_remaining_tab() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    let first = open(&mut app, "a = 1");
    open(&mut app, "");
    type_text(&mut app, "x", now);

    app.handle_event(AppEvent::CloseTab, now);
    app.handle_event(AppEvent::InputChar('y'), now);
    assert_eq!(app.sessions().len(), 1);
    assert_eq!(app.sessions().active_id(), Some(first));
    assert_eq!(app.problems().source(), Some(first));
}

#[test]
fn clean_tab_closes_without_confirmation() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    open(&mut app, "a");
    open(&mut app, "b");
    app.handle_event(AppEvent::CloseTab, Instant::now());
    assert!(app.overlay().is_none());
    assert_eq!(app.sessions().len(), 1);
}

#[test]
fn closing_the_last_tab_is_a_no_op() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let only = open(&mut app, "a");
    app.handle_event(AppEvent::CloseTab, Instant::now());
    assert_eq!(app.sessions().len(), 1);
    assert_eq!(app.sessions().active_id(), Some(only));
}

#[test]
fn next_tab_cycles_and_keeps_terminal_shared() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    let first = open(&mut app, "print('a')");
    let second = open(&mut app, "print('b')");

    app.handle_event(AppEvent::Run, now);
    app.handle_event(AppEvent::NextTab, now);
    assert_eq!(app.sessions().active_id(), Some(first));

    channel.push_inbound(ChannelEvent::Message(InboundMessage::TermOutput {
        data: "b\n".to_string(),
    }));
    app.handle_event(AppEvent::Tick, now);
    assert!(app.terminal().plain_text().contains("b\n"));
    assert!(app.terminal().input_enabled());

    app.handle_event(AppEvent::NextTab, now);
    assert_eq!(app.sessions().active_id(), Some(second));
}

#[test]
fn next_language_replaces_content_and_resets_terminal() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    let id = open(&mut app, "");
    type_text(&mut app, "garbage", now);

    app.handle_event(AppEvent::NextLanguage, now);
    let session = app.sessions().get(id).expect("tab");
    let expected = Language::Python.next();
    assert_eq!(session.language(), expected);
    assert_eq!(session.code(), expected.starter_snippet());
    assert!(!session.is_dirty());
    assert_eq!(
        app.terminal().plain_text(),
        format!("[Switched to {expected}]\n")
    );
    assert_eq!(app.diagnostics().pending_count(), 0);
}

#[test]
fn explain_on_empty_buffer_alerts_without_request() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    open(&mut app, "");
    app.handle_event(AppEvent::Explain, Instant::now());
    assert_eq!(alert_text(&app), Some("Editor is empty"));
    assert!(backend.dispatched().is_empty());
}

#[test]
fn fix_without_terminal_error_alerts() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    open(&mut app, "print(x)");
    app.handle_event(AppEvent::Fix, Instant::now());
    assert_eq!(
        alert_text(&app),
        Some("No error found in terminal. Run the code first.")
    );
    assert!(backend.dispatched().is_empty());
}

#[test]
fn chat_round_trip_through_background_queue() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    open(&mut app, "print(1)");

    app.handle_event(AppEvent::ToggleAssistant, now);
    assert_eq!(app.focus, Focus::AiInput);
    type_text(&mut app, "why?", now);
    app.handle_event(AppEvent::Submit, now);

    let dispatched = backend.dispatched();
    assert_eq!(dispatched.len(), 1);
    let (id, request) = &dispatched[0];
    assert!(matches!(request, AiRequest::Chat { message, .. } if message == "why?"));
    assert!(app.assistant().is_busy());

    backend.complete(AiCompletion {
        id: *id,
        outcome: AiOutcome::Transport("timed out".to_string()),
    });
    app.handle_event(AppEvent::Tick, now);
    assert!(!app.assistant().is_busy());
    let last = app.assistant().turns().last().expect("turn");
    assert_eq!(last.content, "Network error: timed out");
}

#[test]
fn toggling_assistant_closed_returns_focus_to_editor() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    app.handle_event(AppEvent::ToggleAssistant, Instant::now());
    app.handle_event(AppEvent::ToggleAssistant, Instant::now());
    assert!(!app.assistant().panel_open());
    assert_eq!(app.focus, Focus::Editor);
}

#[test]
fn rename_prompt_edits_tab_name() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    let id = open(&mut app, "");
    let original = app.sessions().get(id).expect("tab").name().to_string();

    app.handle_event(AppEvent::Rename, now);
    for _ in 0..original.chars().count() {
        app.handle_event(AppEvent::Backspace, now);
    }
    type_text(&mut app, "solver", now);
    app.handle_event(AppEvent::Submit, now);

    assert!(app.overlay().is_none());
    assert_eq!(app.sessions().get(id).expect("tab").name(), "solver");
    assert_eq!(app.sessions().get(id).expect("tab").code(), "");
}

#[test]
fn cancelled_rename_keeps_name() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let now = Instant::now();
    let id = open(&mut app, "");
    let original = app.sessions().get(id).expect("tab").name().to_string();
    app.handle_event(AppEvent::Rename, now);
    type_text(&mut app, "zzz", now);
    app.handle_event(AppEvent::Cancel, now);
    assert_eq!(app.sessions().get(id).expect("tab").name(), original);
}

#[test]
fn deferred_tab_is_created_once_factory_is_ready() {
    let ready = Rc::new(Cell::new(false));
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = App::new(
        Box::new(GatedFactory {
            ready: ready.clone(),
        }),
        Box::new(channel),
        Box::new(backend),
        AppOptions::default(),
    );

    assert_eq!(app.open_session(SessionRequest::new(Language::Go)), None);
    app.handle_event(AppEvent::Tick, Instant::now());
    assert!(app.sessions().is_empty());

    ready.set(true);
    app.handle_event(AppEvent::Tick, Instant::now());
    let active = app.sessions().active().expect("created after retry");
    assert_eq!(active.language(), Language::Go);
    assert_eq!(active.code(), Language::Go.starter_snippet());
}

#[test]
fn problems_selection_jumps_to_marker() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    let start = Instant::now();
    let id = open(&mut app, "");
    type_text(&mut app, "x = (", start);
    app.handle_event(AppEvent::Tick, start + Duration::from_secs(1));
    assert!(app.problems().is_visible());

    app.handle_event(AppEvent::NextFocus, start);
    assert_eq!(app.focus, Focus::Problems);
    app.handle_event(AppEvent::Submit, start);
    assert_eq!(app.focus, Focus::Editor);
    let marker = app.problems().markers()[0].clone();
    assert_eq!(
        app.sessions().get(id).expect("tab").buffer().caret(),
        (marker.line, marker.column)
    );
}

#[test]
fn quit_stops_the_loop_even_with_overlay() {
    let channel = RecordingChannel::default();
    let backend = ScriptedBackend::default();
    let mut app = app_with(&channel, &backend);
    app.handle_event(AppEvent::Run, Instant::now());
    app.handle_event(AppEvent::Quit, Instant::now());
    assert!(!app.running);
}
