use super::*;
use crate::editor::TextBufferFactory;
use crate::language::Language;
use crate::session::{SessionRequest, SessionManager};
use crate::testing::ScriptedBackend;

fn sessions_with(code: &str) -> SessionManager {
    let mut sessions = SessionManager::new(Box::new(TextBufferFactory));
    sessions.create_session(SessionRequest {
        language: Language::Python,
        name: None,
        initial_content: Some(code.to_string()),
    });
    sessions
}

fn working_turns(assistant: &Assistant) -> usize {
    assistant
        .turns()
        .iter()
        .filter(|turn| matches!(turn.kind, TurnKind::Working(_)))
        .count()
}

#[test]
fn chat_sends_active_buffer_as_context() {
    let sessions = sessions_with("print(1)");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::new(Provider::Claude);

    let id = assistant
        .chat("  what does this do?  ", &sessions, &backend)
        .expect("issued");
    assert_eq!(
        backend.dispatched(),
        vec![(
            id,
            AiRequest::Chat {
                provider: Provider::Claude,
                message: "what does this do?".to_string(),
                context: Some(CodeContext {
                    language: Language::Python,
                    code: "print(1)".to_string(),
                }),
            }
        )]
    );
    assert_eq!(assistant.turns()[0], Turn::user("what does this do?"));
    assert_eq!(
        assistant.turns()[1],
        Turn::assistant(CHAT_PLACEHOLDER, TurnKind::Working(id))
    );
    assert!(assistant.is_busy());
}

#[test]
fn chat_without_session_sends_null_context() {
    let sessions = SessionManager::new(Box::new(TextBufferFactory));
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assistant.chat("hello", &sessions, &backend).expect("issued");
    assert!(matches!(
        backend.dispatched()[0].1,
        AiRequest::Chat { context: None, .. }
    ));
}

#[test]
fn blank_chat_is_ignored() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assert_eq!(assistant.chat("   ", &sessions, &backend), None);
    assert!(assistant.turns().is_empty());
    assert!(backend.dispatched().is_empty());
}

#[test]
fn explain_on_empty_buffer_issues_no_request() {
    let sessions = sessions_with("   \n");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assert_eq!(
        assistant.explain(&sessions, &backend),
        Err(Notice::EditorEmpty)
    );
    assert!(backend.dispatched().is_empty());
    assert!(assistant.turns().is_empty());
    assert!(!assistant.panel_open());
}

#[test]
fn explain_without_session_reports_notice() {
    let sessions = SessionManager::new(Box::new(TextBufferFactory));
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assert_eq!(
        assistant.explain(&sessions, &backend),
        Err(Notice::NothingToExplain)
    );
    assert!(backend.dispatched().is_empty());
}

#[test]
fn explain_opens_panel_and_describes_action() {
    let sessions = sessions_with("fmt.Println(1)");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    let id = assistant.explain(&sessions, &backend).expect("issued");

    assert!(assistant.panel_open());
    assert_eq!(assistant.turns()[0].content, "Explain this python code");
    assert_eq!(
        assistant.turns()[1],
        Turn::assistant(EXPLAIN_PLACEHOLDER, TurnKind::Working(id))
    );
    assert_eq!(backend.dispatched()[0].1.path(), "explain");
}

#[test]
fn fix_requires_error_in_terminal() {
    let sessions = sessions_with("print(y)");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    let mut terminal = Terminal::default();

    assert_eq!(
        assistant.fix_error(&sessions, &terminal, &backend),
        Err(Notice::NoErrorInTerminal)
    );
    assert!(backend.dispatched().is_empty());

    terminal.on_output("Traceback (most recent call last):\nNameError: y\n");
    let id = assistant
        .fix_error(&sessions, &terminal, &backend)
        .expect("issued");
    assert_eq!(assistant.turns()[0].content, "Fix this error in my code");
    assert_eq!(
        backend.dispatched(),
        vec![(
            id,
            AiRequest::Fix {
                provider: Provider::OpenAi,
                code: "print(y)".to_string(),
                error: "Traceback (most recent call last):\nNameError: y\n".to_string(),
                language: Language::Python,
            }
        )]
    );
}

#[test]
fn fix_checks_session_before_anything_else() {
    let sessions = SessionManager::new(Box::new(TextBufferFactory));
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assert_eq!(
        assistant.fix_error(&sessions, &Terminal::default(), &backend),
        Err(Notice::NothingToFix)
    );
}

#[test]
fn transport_failure_replaces_placeholder_with_one_error_turn() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    let id = assistant.chat("hi", &sessions, &backend).expect("issued");

    assistant.apply_completion(AiCompletion {
        id,
        outcome: AiOutcome::Transport("connection refused".to_string()),
    });

    assert_eq!(working_turns(&assistant), 0);
    assert_eq!(assistant.turns().len(), 2);
    assert_eq!(
        assistant.turns()[1],
        Turn::assistant("Network error: connection refused", TurnKind::Error)
    );
    assert!(!assistant.is_busy());
}

#[test]
fn rejected_envelope_renders_error_turn() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    let id = assistant.explain(&sessions, &backend).expect("issued");
    assistant.apply_completion(AiCompletion {
        id,
        outcome: AiOutcome::Rejected("openai is not enabled".to_string()),
    });
    assert_eq!(
        assistant.turns().last(),
        Some(&Turn::assistant("Error: openai is not enabled", TurnKind::Error))
    );
}

#[test]
fn overlapping_requests_resolve_in_arrival_order() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    let first = assistant.chat("one", &sessions, &backend).expect("first");
    let second = assistant.chat("two", &sessions, &backend).expect("second");

    assistant.apply_completion(AiCompletion {
        id: second,
        outcome: AiOutcome::Answer("answer two".to_string()),
    });
    assert!(assistant.is_busy());
    assert_eq!(working_turns(&assistant), 1);

    assistant.apply_completion(AiCompletion {
        id: first,
        outcome: AiOutcome::Answer("answer one".to_string()),
    });
    assert!(!assistant.is_busy());
    let contents: Vec<&str> = assistant
        .turns()
        .iter()
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(contents, vec!["one", "two", "answer two", "answer one"]);
}

#[test]
fn duplicate_completion_is_ignored() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    let id = assistant.chat("hi", &sessions, &backend).expect("issued");
    let completion = AiCompletion {
        id,
        outcome: AiOutcome::Answer("hello".to_string()),
    };
    assistant.apply_completion(completion.clone());
    assistant.apply_completion(completion);
    assert_eq!(assistant.turns().len(), 2);
}

#[test]
fn provider_is_read_at_issue_time() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assistant.chat("a", &sessions, &backend);
    assert_eq!(assistant.cycle_provider(), Provider::Gemini);
    assistant.chat("b", &sessions, &backend);
    let providers: Vec<Provider> = backend
        .dispatched()
        .into_iter()
        .map(|(_, request)| match request {
            AiRequest::Chat { provider, .. } => provider,
            other => panic!("unexpected request {other:?}"),
        })
        .collect();
    assert_eq!(providers, vec![Provider::OpenAi, Provider::Gemini]);
}

#[test]
fn submit_input_takes_the_typed_message() {
    let sessions = sessions_with("x");
    let backend = ScriptedBackend::default();
    let mut assistant = Assistant::default();
    assistant.input_mut().set("explain loops");
    assistant.submit_input(&sessions, &backend).expect("issued");
    assert!(assistant.input().is_empty());
    assert_eq!(assistant.turns()[0].content, "explain loops");
}

#[test]
fn toggle_panel_flips_visibility() {
    let mut assistant = Assistant::default();
    assert!(assistant.toggle_panel());
    assert!(!assistant.toggle_panel());
}

#[test]
fn format_response_splits_code_and_prose() {
    let fragments = format_response("Use `len`:\n```python\nprint(len(x))\n```\nDone");
    assert_eq!(
        fragments,
        vec![
            Fragment::Text("Use ".to_string()),
            Fragment::InlineCode("len".to_string()),
            Fragment::Text(":".to_string()),
            Fragment::LineBreak,
            Fragment::CodeBlock {
                language: Some("python".to_string()),
                code: "print(len(x))\n".to_string(),
            },
            Fragment::LineBreak,
            Fragment::Text("Done".to_string()),
        ]
    );
}

#[test]
fn format_response_handles_unlabelled_fence() {
    let fragments = format_response("```\nraw\n```");
    assert_eq!(
        fragments,
        vec![Fragment::CodeBlock {
            language: None,
            code: "raw\n".to_string(),
        }]
    );
}
