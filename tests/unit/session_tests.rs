use super::*;
use crate::editor::{EditKey, TextBuffer, TextBufferFactory};
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

fn manager() -> SessionManager {
    SessionManager::new(Box::new(TextBufferFactory))
}

fn open(manager: &mut SessionManager, language: Language) -> SessionId {
    match manager.create_session(SessionRequest::new(language)) {
        CreateOutcome::Created(id) => id,
        CreateOutcome::Deferred => panic!("text buffer factory should always be ready"),
    }
}

fn type_text(manager: &mut SessionManager, id: SessionId, text: &str) {
    let session = manager.get_mut(id).expect("session should exist");
    for ch in text.chars() {
        session.buffer_mut().apply_key(EditKey::Char(ch));
    }
    manager.on_content_changed(id);
}

fn assert_active_is_member(manager: &SessionManager) {
    let active = manager.active_id().expect("active id should be set");
    assert!(manager.get(active).is_some(), "active id {active} is dangling");
}

#[test]
fn create_session_appends_activates_and_uses_starter_snippet() {
    let mut manager = manager();
    let first = open(&mut manager, Language::Python);
    let second = open(&mut manager, Language::Rust);

    assert_eq!(manager.len(), 2);
    assert_eq!(manager.active_id(), Some(second));
    let ids: Vec<SessionId> = manager.sessions().iter().map(Session::id).collect();
    assert_eq!(ids, vec![first, second]);

    let rust = manager.get(second).expect("rust tab");
    assert_eq!(rust.code(), Language::Rust.starter_snippet());
    assert_eq!(rust.buffer().language_mode(), "rust");
    assert!(!rust.is_dirty());
    assert!(rust.buffer().is_focused());
    assert!(!manager.get(first).expect("python tab").buffer().is_focused());
}

#[test]
fn explicit_name_and_content_are_used() {
    let mut manager = manager();
    let id = match manager.create_session(SessionRequest {
        language: Language::Bash,
        name: Some("  deploy.sh ".to_string()),
        initial_content: Some("echo hi".to_string()),
    }) {
        CreateOutcome::Created(id) => id,
        CreateOutcome::Deferred => panic!("should create"),
    };
    let session = manager.get(id).expect("session");
    assert_eq!(session.name(), "deploy.sh");
    assert_eq!(session.code(), "echo hi");
    assert_eq!(session.buffer().language_mode(), "shell");
}

#[test]
fn ids_are_never_reused_and_names_count_independently() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let named = match manager.create_session(SessionRequest {
        language: Language::Go,
        name: Some("main.go".to_string()),
        initial_content: None,
    }) {
        CreateOutcome::Created(id) => id,
        CreateOutcome::Deferred => panic!("should create"),
    };
    manager.close_session(a, Confirmation::Unasked);
    let c = open(&mut manager, Language::Python);

    assert_eq!(a.0, 1);
    assert_eq!(named.0, 2);
    assert_eq!(c.0, 3);
    assert_eq!(c.to_string(), "tab-3");
    assert_eq!(manager.get(c).expect("tab").name(), "Untitled-2");
}

#[test]
fn creation_is_deferred_until_factory_is_ready() {
    let ready = Rc::new(Cell::new(false));
    let mut manager = SessionManager::new(Box::new(GatedFactory {
        ready: ready.clone(),
    }));

    assert_eq!(
        manager.create_session(SessionRequest::new(Language::Lua)),
        CreateOutcome::Deferred
    );
    assert!(manager.is_empty());
    assert!(manager.active_id().is_none());
    assert!(manager.retry_pending().is_empty());
    assert!(manager.has_pending());

    ready.set(true);
    let created = manager.retry_pending();
    assert_eq!(created.len(), 1);
    assert_eq!(manager.active_id(), Some(created[0]));
    assert_eq!(
        manager.active().expect("active").language(),
        Language::Lua
    );
    assert!(!manager.has_pending());
}

#[test]
fn switch_active_is_idempotent_and_preserves_buffers() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Java);
    type_text(&mut manager, a, "x = 1\n");

    assert_eq!(
        manager.switch_active(a),
        SwitchOutcome::Switched {
            language: Language::Python
        }
    );
    assert_eq!(manager.switch_active(a), SwitchOutcome::Unchanged);
    assert_eq!(manager.active_id(), Some(a));
    assert!(manager.get(a).expect("a").buffer().is_focused());
    assert!(!manager.get(b).expect("b").buffer().is_focused());
    assert!(manager.get(a).expect("a").code().starts_with("x = 1\n"));
    assert_eq!(
        manager.get(b).expect("b").code(),
        Language::Java.starter_snippet()
    );
}

#[test]
fn switch_to_unknown_id_changes_nothing() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Python);
    manager.close_session(a, Confirmation::Unasked);
    assert_eq!(manager.switch_active(a), SwitchOutcome::Unchanged);
    assert_eq!(manager.active_id(), Some(b));
}

#[test]
fn closing_the_last_session_is_a_no_op() {
    let mut manager = manager();
    let only = open(&mut manager, Language::Python);
    type_text(&mut manager, only, "y");

    assert_eq!(
        manager.close_session(only, Confirmation::Accepted),
        CloseOutcome::LastSession
    );
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.active_id(), Some(only));
}

#[test]
fn dirty_close_needs_confirmation_and_decline_keeps_everything() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Cpp);
    type_text(&mut manager, b, "// edit");
    let before = manager.get(b).expect("b").code();

    assert_eq!(
        manager.close_session(b, Confirmation::Unasked),
        CloseOutcome::NeedsConfirmation
    );
    assert_eq!(
        manager.close_session(b, Confirmation::Declined),
        CloseOutcome::Declined
    );
    assert_eq!(manager.len(), 2);
    assert_eq!(manager.active_id(), Some(b));
    let session = manager.get(b).expect("b survives");
    assert!(session.is_dirty());
    assert_eq!(session.code(), before);
    assert!(manager.get(a).is_some());
}

#[test]
fn accepted_dirty_close_removes_and_moves_activation() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Cpp);
    type_text(&mut manager, b, "x");

    assert_eq!(
        manager.close_session(b, Confirmation::Accepted),
        CloseOutcome::Closed { activated: Some(a) }
    );
    assert!(manager.get(b).is_none());
    assert_eq!(manager.active_id(), Some(a));
    assert!(manager.get(a).expect("a").buffer().is_focused());
}

#[test]
fn clean_close_does_not_ask_for_confirmation() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Python);
    let c = open(&mut manager, Language::Python);
    manager.switch_active(b);

    assert_eq!(
        manager.close_session(b, Confirmation::Unasked),
        CloseOutcome::Closed { activated: Some(c) }
    );
    assert_eq!(
        manager.close_session(a, Confirmation::Unasked),
        CloseOutcome::Closed { activated: None }
    );
    assert_eq!(manager.active_id(), Some(c));
}

#[test]
fn closing_the_rightmost_active_tab_activates_its_left_neighbour() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Python);
    assert_eq!(
        manager.close_session(b, Confirmation::Unasked),
        CloseOutcome::Closed { activated: Some(a) }
    );
}

#[test]
fn close_unknown_session_reports_not_found() {
    let mut manager = manager();
    open(&mut manager, Language::Python);
    assert_eq!(
        manager.close_session(SessionId(99), Confirmation::Accepted),
        CloseOutcome::NotFound
    );
}

#[test]
fn interleaved_create_and_close_never_leave_a_dangling_active_id() {
    let mut manager = manager();
    open(&mut manager, Language::Python);
    let mut seed: u64 = 0x5eed;
    for _ in 0..200 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let roll = (seed >> 33) % 3;
        if roll == 0 || manager.len() == 1 {
            let lang = Language::ALL[((seed >> 40) % 12) as usize];
            open(&mut manager, lang);
        } else {
            let victim = manager.sessions()[((seed >> 20) as usize) % manager.len()].id();
            if roll == 1 {
                type_text(&mut manager, victim, "z");
            }
            manager.close_session(victim, Confirmation::Accepted);
        }
        assert!(!manager.is_empty());
        assert_active_is_member(&manager);
    }
}

#[test]
fn change_language_replaces_content_and_clears_dirty() {
    let mut manager = manager();
    let id = open(&mut manager, Language::Python);
    type_text(&mut manager, id, "print(1)");
    assert!(manager.get(id).expect("tab").is_dirty());

    assert_eq!(manager.change_language(Language::Go), Some(id));
    let session = manager.get(id).expect("tab");
    assert_eq!(session.language(), Language::Go);
    assert_eq!(session.code(), Language::Go.starter_snippet());
    assert_eq!(session.buffer().language_mode(), "go");
    assert!(!session.is_dirty());
}

#[test]
fn change_language_without_active_session_does_nothing() {
    let mut manager = manager();
    assert_eq!(manager.change_language(Language::Go), None);
}

#[test]
fn content_change_marks_dirty_even_when_text_is_identical() {
    let mut manager = manager();
    let id = open(&mut manager, Language::Python);
    let original = manager.get(id).expect("tab").code();
    manager
        .get_mut(id)
        .expect("tab")
        .buffer_mut()
        .set_value(&original);
    assert!(manager.on_content_changed(id));
    assert!(manager.get(id).expect("tab").is_dirty());
    assert_eq!(manager.active_id(), Some(id));
}

#[test]
fn content_change_does_not_move_activation() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Python);
    type_text(&mut manager, a, "q");
    assert_eq!(manager.active_id(), Some(b));
    assert!(manager.get(a).expect("a").is_dirty());
    assert!(!manager.get(b).expect("b").is_dirty());
}

#[test]
fn rename_trims_and_rejects_blank_names() {
    let mut manager = manager();
    let id = open(&mut manager, Language::Python);
    assert!(manager.rename_session(id, "  notes.py "));
    assert_eq!(manager.get(id).expect("tab").name(), "notes.py");
    assert!(!manager.rename_session(id, "   "));
    assert_eq!(manager.get(id).expect("tab").name(), "notes.py");
    assert!(!manager.rename_session(SessionId(42), "x"));
}

#[test]
fn next_session_cycles_in_tab_order() {
    let mut manager = manager();
    let a = open(&mut manager, Language::Python);
    let b = open(&mut manager, Language::Python);
    assert_eq!(manager.next_session_id(), Some(a));
    manager.switch_active(a);
    assert_eq!(manager.next_session_id(), Some(b));
}
